use serde::Serialize;

use super::{
    GateFactory,
    wire::{Arith8Wire, BoolWire, CircuitId, Revealed, WireId},
};
use crate::error::{BackendError, ErrorRepr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gate {
    OwnedInput { value: u8, position: u32 },
    ForeignInput { position: u32 },
    Neg(WireId),
    Add(WireId, WireId),
    Not(WireId),
    Ham(WireId),
    Dpf(WireId),
    And(WireId, WireId),
    Reveal(WireId),
}

impl Gate {
    pub(crate) fn operands(&self) -> impl Iterator<Item = WireId> {
        let (a, b) = match *self {
            Gate::OwnedInput { .. } | Gate::ForeignInput { .. } => (None, None),
            Gate::Neg(x) | Gate::Not(x) | Gate::Ham(x) | Gate::Dpf(x) | Gate::Reveal(x) => {
                (Some(x), None)
            }
            Gate::Add(x, y) | Gate::And(x, y) => (Some(x), Some(y)),
        };
        a.into_iter().chain(b)
    }

    /// Gates that need a message exchange with the peer before their output
    /// is known.
    pub(crate) fn is_interactive(&self) -> bool {
        matches!(
            self,
            Gate::Ham(_) | Gate::Dpf(_) | Gate::And(..) | Gate::Reveal(_)
        )
    }

    fn is_input(&self) -> bool {
        matches!(self, Gate::OwnedInput { .. } | Gate::ForeignInput { .. })
    }
}

/// Gate counts and depth of one circuit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CircuitStats {
    pub owned_inputs: usize,
    pub foreign_inputs: usize,
    pub linear: usize,
    pub ham: usize,
    pub dpf: usize,
    pub and: usize,
    pub reveal: usize,
    /// Number of communication rounds, including the input round.
    pub rounds: u32,
}

/// Arena of gates for one backend lifetime.
///
/// Gates are stored in creation order, which is also a topological order.
/// Every gate is assigned the round after which its output is known: inputs
/// are known after round 0, linear gates as soon as their operands are, and
/// interactive gates one round after their latest operand.
#[derive(Debug)]
pub struct Circuit {
    id: CircuitId,
    gates: Vec<Gate>,
    rounds: Vec<u32>,
    next_input_position: u32,
    stats: CircuitStats,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    pub fn new() -> Self {
        Circuit {
            id: CircuitId::fresh(),
            gates: Vec::new(),
            rounds: Vec::new(),
            next_input_position: 0,
            stats: CircuitStats {
                rounds: 1,
                ..Default::default()
            },
        }
    }

    pub fn id(&self) -> CircuitId {
        self.id
    }

    pub fn stats(&self) -> CircuitStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub(crate) fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub(crate) fn rounds(&self) -> &[u32] {
        &self.rounds
    }

    /// Checks that every operand was created by this circuit, before it.
    pub(crate) fn validate(&self) -> Result<(), BackendError> {
        for (index, gate) in self.gates.iter().enumerate() {
            for operand in gate.operands() {
                if operand.circuit != self.id || operand.index >= index {
                    return Err(ErrorRepr::StaleHandle {
                        index: operand.index,
                        expected: self.id.get(),
                        found: operand.circuit.get(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn push(&mut self, gate: Gate) -> WireId {
        let latest = gate
            .operands()
            .map(|w| self.rounds.get(w.index).copied().unwrap_or(0))
            .max()
            .unwrap_or(0);
        let round = if gate.is_input() {
            0
        } else if gate.is_interactive() {
            latest + 1
        } else {
            latest
        };
        self.stats.rounds = self.stats.rounds.max(round + 1);

        let index = self.gates.len();
        self.gates.push(gate);
        self.rounds.push(round);
        WireId {
            circuit: self.id,
            index,
        }
    }

    fn next_position(&mut self) -> u32 {
        let position = self.next_input_position;
        self.next_input_position += 1;
        position
    }
}

impl GateFactory for Circuit {
    fn owned_input(&mut self, value: u8) -> Arith8Wire {
        let position = self.next_position();
        self.stats.owned_inputs += 1;
        Arith8Wire(self.push(Gate::OwnedInput { value, position }))
    }

    fn foreign_input_gate(&mut self) -> Arith8Wire {
        let position = self.next_position();
        self.stats.foreign_inputs += 1;
        Arith8Wire(self.push(Gate::ForeignInput { position }))
    }

    fn neg(&mut self, x: Arith8Wire) -> Arith8Wire {
        self.stats.linear += 1;
        Arith8Wire(self.push(Gate::Neg(x.0)))
    }

    fn add(&mut self, x: Arith8Wire, y: Arith8Wire) -> Arith8Wire {
        self.stats.linear += 1;
        Arith8Wire(self.push(Gate::Add(x.0, y.0)))
    }

    fn ham(&mut self, x: Arith8Wire) -> Arith8Wire {
        self.stats.ham += 1;
        Arith8Wire(self.push(Gate::Ham(x.0)))
    }

    fn dpf(&mut self, x: Arith8Wire) -> BoolWire {
        self.stats.dpf += 1;
        BoolWire(self.push(Gate::Dpf(x.0)))
    }

    fn and(&mut self, x: BoolWire, y: BoolWire) -> BoolWire {
        self.stats.and += 1;
        BoolWire(self.push(Gate::And(x.0, y.0)))
    }

    fn not(&mut self, x: BoolWire) -> BoolWire {
        self.stats.linear += 1;
        BoolWire(self.push(Gate::Not(x.0)))
    }

    fn reveal(&mut self, x: BoolWire) -> Revealed {
        self.stats.reveal += 1;
        Revealed(self.push(Gate::Reveal(x.0)))
    }
}
