//! Additive sharing over a wrapping integer ring, and XOR sharing of bits.

use num_traits::{WrappingAdd, WrappingNeg, WrappingSub};
use rand::{
    Rng,
    distributions::{Distribution, Standard},
};

/// An element of the ring that arithmetic shares live in (`Z_256` for `u8`).
pub trait RingElement: Copy + WrappingAdd + WrappingSub + WrappingNeg {}

impl<T> RingElement for T where T: Copy + WrappingAdd + WrappingSub + WrappingNeg {}

/// Splits `value` into `(kept, sent)` such that `kept + sent = value`.
pub fn split<T, R>(value: T, rng: &mut R) -> (T, T)
where
    T: RingElement,
    Standard: Distribution<T>,
    R: Rng + ?Sized,
{
    let kept: T = rng.sample(Standard);
    (kept, value.wrapping_sub(&kept))
}

pub fn reconstruct<T: RingElement>(a: T, b: T) -> T {
    a.wrapping_add(&b)
}

/// Splits a bit into two XOR shares.
pub fn split_bit<R: Rng + ?Sized>(value: bool, rng: &mut R) -> (bool, bool) {
    let kept: bool = rng.sample(Standard);
    (kept, value ^ kept)
}
