//! Typed handles into a circuit arena.
//!
//! Handles are plain indices tagged with the id of the circuit that
//! created them. They are only meaningful through that circuit's
//! [`Evaluation`](super::Evaluation); any other lookup is rejected as stale.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use super::GateFactory;

static NEXT_CIRCUIT_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of one circuit arena (one backend lifetime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CircuitId(u64);

impl CircuitId {
    pub(crate) fn fresh() -> Self {
        CircuitId(NEXT_CIRCUIT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WireId {
    pub(crate) circuit: CircuitId,
    pub(crate) index: usize,
}

/// Handle to one 8-bit additive share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Arith8Wire(pub(crate) WireId);

/// Handle to one boolean XOR share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoolWire(pub(crate) WireId);

/// Handle to a value opened to both parties by a reveal gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Revealed(pub(crate) WireId);

/// A share handle of either kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShareWire {
    Arithmetic8(Arith8Wire),
    Boolean(BoolWire),
}

impl From<Arith8Wire> for ShareWire {
    fn from(wire: Arith8Wire) -> Self {
        ShareWire::Arithmetic8(wire)
    }
}

impl From<BoolWire> for ShareWire {
    fn from(wire: BoolWire) -> Self {
        ShareWire::Boolean(wire)
    }
}

impl ShareWire {
    pub fn kind(&self) -> &'static str {
        match self {
            ShareWire::Arithmetic8(_) => "arithmetic-8",
            ShareWire::Boolean(_) => "boolean",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Ham,
    Dpf,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    And,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnaryOp::Neg => "NEG",
            UnaryOp::Ham => "HAM",
            UnaryOp::Dpf => "DPF",
            UnaryOp::Not => "NOT",
        };
        f.write_str(name)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryOp::Add => "ADD",
            BinaryOp::And => "AND",
        };
        f.write_str(name)
    }
}

/// A write-once feed for one of this party's own input bytes.
///
/// The slot holds the gate factory mutably, so no other gate can be created
/// and the phase cannot execute until the slot is consumed. The input gate
/// itself only comes into existence in [`InputSlot::fulfill`], so a circuit
/// can never contain an owned input without a value.
#[must_use = "an input slot must be fulfilled before the phase executes"]
pub struct InputSlot<'a, G: ?Sized> {
    gates: &'a mut G,
}

impl<'a, G: GateFactory + ?Sized> InputSlot<'a, G> {
    pub(crate) fn new(gates: &'a mut G) -> Self {
        InputSlot { gates }
    }

    /// Feeds the plaintext byte and returns this party's share handle.
    pub fn fulfill(self, value: u8) -> Arith8Wire {
        self.gates.owned_input(value)
    }
}

impl<G: ?Sized> fmt::Debug for InputSlot<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSlot").finish_non_exhaustive()
    }
}
