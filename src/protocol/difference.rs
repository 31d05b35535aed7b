//! Local difference shares between window and pattern characters.
//!
//! With `t = t0 + t1` and `p = p0 + p1`, the pattern holder keeps
//! `-(t0 - p0)` and the text holder keeps `t1 - p1`. The two values are
//! equal exactly when `t == p`, which is what the digest comparison relies
//! on.

use tracing::{debug, trace};

use super::sharing::CharacterShares;
use crate::{backend::ShareView, config::HolderKind, error::BackendError};

/// This party's difference share for one position.
pub fn difference_share(holder: HolderKind, text_share: u8, pattern_share: u8) -> u8 {
    let d = text_share.wrapping_sub(pattern_share);
    match holder {
        HolderKind::Pattern => d.wrapping_neg(),
        HolderKind::Text => d,
    }
}

/// Difference shares of every window, each `pattern_len` bytes long.
pub fn window_differences<V>(
    holder: HolderKind,
    shares: &CharacterShares,
    view: &V,
) -> Result<Vec<Vec<u8>>, BackendError>
where
    V: ShareView + ?Sized,
{
    let pattern = shares
        .pattern()
        .iter()
        .map(|&wire| view.share(wire))
        .collect::<Result<Vec<u8>, _>>()?;
    debug!(share = %hex::encode(&pattern), "pattern shares");

    (0..shares.num_windows())
        .map(|w| -> Result<Vec<u8>, BackendError> {
            let mut window = Vec::with_capacity(pattern.len());
            let mut diff = Vec::with_capacity(pattern.len());
            for (pos, (&wire, &p)) in shares.window(w).iter().zip(&pattern).enumerate() {
                let t = view.share(wire)?;
                let d = difference_share(holder, t, p);
                trace!(
                    window = w,
                    pos,
                    share = t,
                    pattern_share = p,
                    diff = d,
                    "character shares"
                );
                window.push(t);
                diff.push(d);
            }
            debug!(
                window = w,
                share = %hex::encode(&window),
                diff = %hex::encode(&diff),
                "window shares"
            );
            Ok(diff)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{Circuit, share::split},
        config::Role,
        protocol::sharing::share_characters,
    };
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;
    use rstest::rstest;

    #[rstest]
    #[case(b'A', b'A', true)]
    #[case(b'A', b'B', false)]
    #[case(0, 255, false)]
    #[case(255, 255, true)]
    fn test_shares_agree_iff_equal(#[case] t: u8, #[case] p: u8, #[case] equal: bool) {
        let mut rng = ChaCha12Rng::seed_from_u64(u64::from(t) << 8 | u64::from(p));
        for _ in 0..64 {
            let (t0, t1) = split(t, &mut rng);
            let (p0, p1) = split(p, &mut rng);
            let pattern_side = difference_share(HolderKind::Pattern, t0, p0);
            let text_side = difference_share(HolderKind::Text, t1, p1);
            assert_eq!(pattern_side == text_side, equal);
        }
    }

    /// Shares indexed by gate position, as if read back from an execution.
    struct FixedView(Vec<u8>);

    impl ShareView for FixedView {
        fn share(&self, wire: crate::backend::Arith8Wire) -> Result<u8, BackendError> {
            Ok(self.0[wire.0.index])
        }

        fn revealed(&self, _: crate::backend::Revealed) -> Result<bool, BackendError> {
            Ok(false)
        }
    }

    #[test]
    fn test_window_differences_per_position() {
        let role = Role::PatternHolder {
            pattern: b"AB".to_vec(),
            text_len: 4,
        };
        let mut circuit = Circuit::new();
        let shares = share_characters(&mut circuit, &role).unwrap();
        // Gate order: pattern [0, 1], then windows [2, 3], [4, 5], [6, 7].
        let view = FixedView(vec![1, 2, 10, 20, 1, 2, 0, 255]);

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .finish();
        let diffs = tracing::subscriber::with_default(subscriber, || {
            window_differences(HolderKind::Pattern, &shares, &view).unwrap()
        });
        assert_eq!(diffs, vec![vec![247, 238], vec![0, 0], vec![1, 3]]);
    }
}
