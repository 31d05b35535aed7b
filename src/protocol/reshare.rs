use tracing::{Level, debug, enabled, trace};

use super::digest::{DIGEST_LEN, Digest};
use crate::{
    backend::{Arith8Wire, GateFactory, ShareView},
    config::PartyId,
    error::BackendError,
};

/// Arithmetic shares of both parties' digests, per window and byte.
#[derive(Debug, Clone)]
pub struct DigestShares {
    by_party: [Vec<[Arith8Wire; DIGEST_LEN]>; 2],
}

impl DigestShares {
    /// Shares of the digests computed by `party`.
    pub fn digest_of(&self, party: PartyId) -> &[[Arith8Wire; DIGEST_LEN]] {
        &self.by_party[party.index()]
    }

    pub fn num_windows(&self) -> usize {
        self.by_party[0].len()
    }

    /// This party's shares of every digest computed by `party`, read back
    /// after execution.
    pub fn read<V>(&self, view: &V, party: PartyId) -> Result<Vec<Digest>, BackendError>
    where
        V: ShareView + ?Sized,
    {
        self.digest_of(party)
            .iter()
            .map(|wires| {
                let mut digest = [0u8; DIGEST_LEN];
                for (byte, &wire) in digest.iter_mut().zip(wires) {
                    *byte = view.share(wire)?;
                }
                Ok(digest)
            })
            .collect()
    }
}

/// Logs this party's share of every digest byte of both parties.
pub fn trace_digest_shares<V>(shares: &DigestShares, view: &V) -> Result<(), BackendError>
where
    V: ShareView + ?Sized,
{
    if !enabled!(Level::DEBUG) {
        return Ok(());
    }
    for producer in [PartyId::Zero, PartyId::One] {
        for (window, digest) in shares.read(view, producer)?.iter().enumerate() {
            debug!(
                window,
                producer = %producer,
                share = %hex::encode(digest),
                "digest shares"
            );
            for (pos, share) in digest.iter().enumerate() {
                trace!(window, pos, producer = %producer, share, "digest byte share");
            }
        }
    }
    Ok(())
}

/// Feeds this party's digests into the circuit and requests the peer's.
///
/// For every window and byte, party 0 requests its owned gate before the
/// foreign one and party 1 the other way round, so each input position is
/// owned by exactly one party.
pub fn reshare_digests<G>(gates: &mut G, party: PartyId, digests: &[Digest]) -> DigestShares
where
    G: GateFactory + ?Sized,
{
    let mut mine = Vec::with_capacity(digests.len());
    let mut theirs = Vec::with_capacity(digests.len());
    for digest in digests {
        let mut own = Vec::with_capacity(DIGEST_LEN);
        let mut peer = Vec::with_capacity(DIGEST_LEN);
        for &byte in digest {
            match party {
                PartyId::Zero => {
                    own.push(gates.owned_input_gate().fulfill(byte));
                    peer.push(gates.foreign_input_gate());
                }
                PartyId::One => {
                    peer.push(gates.foreign_input_gate());
                    own.push(gates.owned_input_gate().fulfill(byte));
                }
            }
        }
        mine.push(to_array(own));
        theirs.push(to_array(peer));
    }

    let by_party = match party {
        PartyId::Zero => [mine, theirs],
        PartyId::One => [theirs, mine],
    };
    DigestShares { by_party }
}

fn to_array(wires: Vec<Arith8Wire>) -> [Arith8Wire; DIGEST_LEN] {
    std::array::from_fn(|i| wires[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{Backend, Circuit, share::reconstruct},
        comm::testing::{LocalLayer, run_two_party},
        config::Settings,
    };

    #[test]
    fn test_digest_shares_are_indexed_by_producer() {
        let digests = vec![[1u8; DIGEST_LEN], [2u8; DIGEST_LEN]];
        for party in [PartyId::Zero, PartyId::One] {
            let mut circuit = Circuit::new();
            let shares = reshare_digests(&mut circuit, party, &digests);
            assert_eq!(shares.num_windows(), 2);
            assert_eq!(circuit.stats().owned_inputs, 2 * DIGEST_LEN);
            assert_eq!(circuit.stats().foreign_inputs, 2 * DIGEST_LEN);
            // Party 0's byte always comes first in the input stream.
            let first = shares.digest_of(PartyId::Zero)[0][0];
            let second = shares.digest_of(PartyId::One)[0][0];
            assert!(first.0.index < second.0.index);
        }
    }

    #[test]
    fn test_read_shares_reconstruct_both_digests() {
        let digests: [Vec<Digest>; 2] = [
            vec![[0x11; DIGEST_LEN], std::array::from_fn(|i| i as u8)],
            vec![[0xee; DIGEST_LEN], [0x42; DIGEST_LEN]],
        ];
        let inputs = digests.clone();
        let party = move |mut comm: LocalLayer| {
            let mut backend = Backend::new(&mut comm, &Settings::default());
            let me = backend.party();
            let shares = reshare_digests(backend.gates(), me, &inputs[me.index()]);
            let evaluation = backend.execute().unwrap();
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(Level::TRACE)
                .with_test_writer()
                .finish();
            tracing::subscriber::with_default(subscriber, || {
                trace_digest_shares(&shares, &evaluation).unwrap()
            });
            [
                shares.read(&evaluation, PartyId::Zero).unwrap(),
                shares.read(&evaluation, PartyId::One).unwrap(),
            ]
        };
        let (a, b) = run_two_party(party.clone(), party);
        for producer in 0..2 {
            for window in 0..2 {
                let combined: Digest = std::array::from_fn(|j| {
                    reconstruct(a[producer][window][j], b[producer][window][j])
                });
                assert_eq!(combined, digests[producer][window]);
            }
        }
    }
}
