//! Correlated randomness for the interactive gates.
//!
//! The dealer is simulated: both parties expand the same seed and each keeps
//! only its own half of every correlation. Correlations are drawn in gate
//! creation order, so both parties must build structurally identical
//! circuits (which the input-stream and frame checks enforce).

use rand::{Rng, SeedableRng, distributions::Standard};
use rand_chacha::ChaCha20Rng;

use super::{gate::Gate, share};
use crate::config::PartyId;

pub(crate) const TABLE_SIZE: usize = 256;

/// One party's half of a masked lookup table for an 8-bit input.
///
/// With `x` shared additively, the parties open `c = x + mask` and each
/// outputs `table[c]`. The two halves of `table[c]` combine to `f(x)`.
#[derive(Debug, Clone)]
pub(crate) struct MaskedTable {
    pub(crate) mask: u8,
    pub(crate) table: Box<[u8; TABLE_SIZE]>,
}

/// One party's half of a Beaver triple over bits.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BitTriple {
    pub(crate) a: bool,
    pub(crate) b: bool,
    pub(crate) c: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum Correlation {
    /// Arithmetic shares of `popcount(c - r)`.
    Ham(MaskedTable),
    /// XOR shares of `c == r`, stored as 0/1.
    Dpf(MaskedTable),
    And(BitTriple),
}

#[derive(Debug, Clone, Copy)]
enum TableRing {
    /// Entries are additive shares mod 256.
    Arithmetic,
    /// Entries are XOR shares of a single bit.
    Boolean,
}

pub(crate) struct Dealer {
    rng: ChaCha20Rng,
    party: PartyId,
}

impl Dealer {
    pub(crate) fn new(seed: [u8; 32], party: PartyId) -> Self {
        Dealer {
            rng: ChaCha20Rng::from_seed(seed),
            party,
        }
    }

    /// Draws the correlation needed by `gate`, if any.
    pub(crate) fn correlation(&mut self, gate: &Gate) -> Option<Correlation> {
        match gate {
            Gate::Ham(_) => Some(Correlation::Ham(
                self.table(TableRing::Arithmetic, |x| x.count_ones() as u8),
            )),
            Gate::Dpf(_) => Some(Correlation::Dpf(
                self.table(TableRing::Boolean, |x| (x == 0) as u8),
            )),
            Gate::And(..) => Some(Correlation::And(self.triple())),
            _ => None,
        }
    }

    /// Builds `table[c] = f(c - r)` for a random mask `r`. Every entry and
    /// the mask are split from the shared stream; each party keeps its side.
    fn table(&mut self, ring: TableRing, f: impl Fn(u8) -> u8) -> MaskedTable {
        let mask: u8 = self.rng.sample(Standard);
        let mut table = Box::new([0u8; TABLE_SIZE]);
        for (c, entry) in table.iter_mut().enumerate() {
            let value = f((c as u8).wrapping_sub(mask));
            *entry = match ring {
                TableRing::Arithmetic => keep(self.party, share::split(value, &mut self.rng)),
                TableRing::Boolean => {
                    keep(self.party, share::split_bit(value == 1, &mut self.rng)) as u8
                }
            };
        }
        let mask = keep(self.party, share::split(mask, &mut self.rng));
        MaskedTable { mask, table }
    }

    fn triple(&mut self) -> BitTriple {
        let a: bool = self.rng.sample(Standard);
        let b: bool = self.rng.sample(Standard);
        let party = self.party;
        let [a, b, c] =
            [a, b, a & b].map(|bit| keep(party, share::split_bit(bit, &mut self.rng)));
        BitTriple { a, b, c }
    }
}

/// Party 0 keeps the first half of a split, party 1 the second.
fn keep<T>(party: PartyId, (first, second): (T, T)) -> T {
    match party {
        PartyId::Zero => first,
        PartyId::One => second,
    }
}
