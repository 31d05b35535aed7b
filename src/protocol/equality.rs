use tracing::debug;

use super::{digest::DIGEST_LEN, reshare::DigestShares};
use crate::{
    backend::{BoolWire, GateFactory, Revealed},
    config::{PartyId, RevealPolicy},
};

/// The reveal gates of the equality circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EqualityOutputs {
    /// One opened bit per window.
    PerWindow(Vec<Revealed>),
    /// Only the OR of all window bits is opened. `None` when there are no
    /// windows to compare.
    Verdict(Option<Revealed>),
}

/// Builds the digest comparison for every window.
///
/// Each digest byte pair goes through `ADD(d0, NEG(d1))`, `HAM` and `DPF`,
/// so the byte bit is set iff both parties' bytes agree. The 32 byte bits
/// of a window are AND-folded left to right.
pub fn build_equality_circuit<G>(
    gates: &mut G,
    shares: &DigestShares,
    reveal: RevealPolicy,
) -> EqualityOutputs
where
    G: GateFactory + ?Sized,
{
    let zero = shares.digest_of(PartyId::Zero);
    let one = shares.digest_of(PartyId::One);

    let mut window_bits: Vec<BoolWire> = Vec::with_capacity(zero.len());
    for (d0, d1) in zero.iter().zip(one) {
        let bytes: [BoolWire; DIGEST_LEN] = std::array::from_fn(|j| {
            let neg = gates.neg(d1[j]);
            let diff = gates.add(d0[j], neg);
            let distance = gates.ham(diff);
            gates.dpf(distance)
        });
        let equal = bytes[1..]
            .iter()
            .fold(bytes[0], |acc, &bit| gates.and(acc, bit));
        window_bits.push(equal);
    }
    debug!(
        "equality circuit over {} windows, reveal policy {:?}",
        window_bits.len(),
        reveal
    );

    match reveal {
        RevealPolicy::PerWindow => EqualityOutputs::PerWindow(
            window_bits.into_iter().map(|bit| gates.reveal(bit)).collect(),
        ),
        RevealPolicy::VerdictOnly => {
            // OR(a, b) = NOT(AND(NOT a, NOT b)).
            let mut none: Option<BoolWire> = None;
            for bit in window_bits {
                let miss = gates.not(bit);
                none = Some(match none {
                    Some(acc) => gates.and(acc, miss),
                    None => miss,
                });
            }
            EqualityOutputs::Verdict(none.map(|none| {
                let any = gates.not(none);
                gates.reveal(any)
            }))
        }
    }
}
