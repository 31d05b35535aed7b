use tracing::debug;

use crate::{
    backend::{Arith8Wire, GateFactory},
    config::Role,
    error::ConfigError,
};

/// Share handles of every pattern character and every window character.
#[derive(Debug, Clone)]
pub struct CharacterShares {
    pattern: Vec<Arith8Wire>,
    windows: Vec<Vec<Arith8Wire>>,
}

impl CharacterShares {
    pub fn pattern(&self) -> &[Arith8Wire] {
        &self.pattern
    }

    /// Handles of window `w`, one per pattern position.
    pub fn window(&self, w: usize) -> &[Arith8Wire] {
        &self.windows[w]
    }

    pub fn num_windows(&self) -> usize {
        self.windows.len()
    }
}

/// Requests one input gate per pattern character and per window character.
///
/// The request order is the same on both parties: the pattern first, then
/// the windows in order, each window position by position. Owned bytes get
/// an owned input gate fulfilled on the spot; the peer's bytes get a
/// foreign input gate. The window layout is derived from `role`, so an
/// inconsistent role is rejected before any gate is requested.
pub fn share_characters<G>(gates: &mut G, role: &Role) -> Result<CharacterShares, ConfigError>
where
    G: GateFactory + ?Sized,
{
    let layout = role.layout()?;
    let pattern: Vec<Arith8Wire> = match role {
        Role::PatternHolder { pattern, .. } => pattern
            .iter()
            .map(|&byte| gates.owned_input_gate().fulfill(byte))
            .collect(),
        Role::TextHolder { .. } => (0..layout.pattern_len())
            .map(|_| gates.foreign_input_gate())
            .collect(),
    };

    let windows: Vec<Vec<Arith8Wire>> = match role {
        Role::TextHolder { text, .. } => layout
            .windows(text)
            .map(|window| {
                window
                    .iter()
                    .map(|&byte| gates.owned_input_gate().fulfill(byte))
                    .collect()
            })
            .collect(),
        Role::PatternHolder { .. } => (0..layout.num_windows())
            .map(|_| {
                (0..layout.pattern_len())
                    .map(|_| gates.foreign_input_gate())
                    .collect()
            })
            .collect(),
    };

    debug!(
        "requested {} pattern and {} window input gates",
        layout.pattern_len(),
        layout.num_text_shares()
    );
    Ok(CharacterShares { pattern, windows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Circuit;

    #[test]
    fn test_gate_counts_per_role() {
        let mut circuit = Circuit::new();
        let role = Role::PatternHolder {
            pattern: b"AB".to_vec(),
            text_len: 4,
        };
        let shares = share_characters(&mut circuit, &role).unwrap();
        assert_eq!(shares.pattern().len(), 2);
        assert_eq!(shares.num_windows(), 3);
        assert_eq!(circuit.stats().owned_inputs, 2);
        assert_eq!(circuit.stats().foreign_inputs, 6);

        let mut circuit = Circuit::new();
        let role = Role::TextHolder {
            text: b"XABY".to_vec(),
            pattern_len: 2,
        };
        let shares = share_characters(&mut circuit, &role).unwrap();
        assert_eq!(shares.window(2).len(), 2);
        assert_eq!(circuit.stats().owned_inputs, 6);
        assert_eq!(circuit.stats().foreign_inputs, 2);
    }

    #[test]
    fn test_inconsistent_role_requests_no_gates() {
        let mut circuit = Circuit::new();
        let role = Role::TextHolder {
            text: b"AB".to_vec(),
            pattern_len: 3,
        };
        assert_eq!(
            share_characters(&mut circuit, &role).unwrap_err(),
            ConfigError::PatternNotShorter {
                pattern: 3,
                text: 2
            }
        );
        assert!(circuit.is_empty());
    }
}
