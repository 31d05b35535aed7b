//! Two-party exact substring matching over secret-shared characters.
//!
//! One party holds a pattern, the other a longer text. Both learn which
//! windows of the text equal the pattern (or, with
//! [`RevealPolicy::VerdictOnly`](config::RevealPolicy), only whether any
//! window does) and nothing else about the other's string.

#![forbid(unsafe_code)]

pub mod backend;
pub mod comm;
pub mod config;
pub mod error;
pub mod protocol;
pub mod stats;
pub mod window;
