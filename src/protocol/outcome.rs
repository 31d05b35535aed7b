use serde::Serialize;
use tracing::info;

use super::equality::EqualityOutputs;
use crate::{backend::ShareView, error::BackendError};

/// What both parties learn at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    /// Equality bit of every window, if they were revealed.
    pub window_bits: Option<Vec<bool>>,
    pub found: bool,
    /// Lowest matching window, if the window bits were revealed.
    pub first_match: Option<usize>,
}

/// Reads the revealed equality bits and derives the verdict.
pub fn aggregate<V>(view: &V, outputs: &EqualityOutputs) -> Result<MatchOutcome, BackendError>
where
    V: ShareView + ?Sized,
{
    let outcome = match outputs {
        EqualityOutputs::PerWindow(wires) => {
            let bits = wires
                .iter()
                .map(|&wire| view.revealed(wire))
                .collect::<Result<Vec<bool>, _>>()?;
            for (window, bit) in bits.iter().enumerate() {
                info!("window {}: {}", window, if *bit { "match" } else { "no match" });
            }
            let first_match = bits.iter().position(|&bit| bit);
            MatchOutcome {
                found: first_match.is_some(),
                first_match,
                window_bits: Some(bits),
            }
        }
        EqualityOutputs::Verdict(wire) => MatchOutcome {
            window_bits: None,
            found: wire.map(|wire| view.revealed(wire)).transpose()?.unwrap_or(false),
            first_match: None,
        },
    };

    match outcome.first_match {
        Some(window) => info!("pattern found, first at window {}", window),
        None if outcome.found => info!("pattern found"),
        None => info!("pattern not found"),
    }
    Ok(outcome)
}
