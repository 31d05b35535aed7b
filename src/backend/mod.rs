//! Reference two-party engine for 8-bit arithmetic and boolean circuits.
//!
//! A [`Backend`] owns one [`Circuit`] arena for its whole lifetime. Gates are
//! requested through [`GateFactory`]; nothing is computed until
//! [`Backend::execute`], which runs setup and then one frame exchange per
//! communication round, and hands back an [`Evaluation`] to read shares
//! and revealed bits from.

mod dealer;
mod gate;
pub mod share;
mod wire;

use std::{
    io::{Read, Write},
    time::Instant,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, info, trace};

pub use gate::{Circuit, CircuitStats};
pub use wire::{
    Arith8Wire, BinaryOp, BoolWire, CircuitId, InputSlot, Revealed, ShareWire, UnaryOp,
};

use self::{
    dealer::{Correlation, Dealer},
    gate::Gate,
    wire::WireId,
};
use crate::{
    comm::CommunicationLayer,
    config::{PartyId, Settings},
    error::{BackendError, ErrorRepr},
    stats::RunTimeStats,
};

/// Requests gates from a circuit under construction.
pub trait GateFactory {
    /// Creates an owned input gate carrying `value`. Callers normally go
    /// through [`GateFactory::owned_input_gate`].
    fn owned_input(&mut self, value: u8) -> Arith8Wire;

    /// Input gate whose value is provided by the peer.
    fn foreign_input_gate(&mut self) -> Arith8Wire;

    fn neg(&mut self, x: Arith8Wire) -> Arith8Wire;

    fn add(&mut self, x: Arith8Wire, y: Arith8Wire) -> Arith8Wire;

    /// Arithmetic share of the Hamming weight of `x`.
    fn ham(&mut self, x: Arith8Wire) -> Arith8Wire;

    /// Boolean share of `x == 0`.
    fn dpf(&mut self, x: Arith8Wire) -> BoolWire;

    fn and(&mut self, x: BoolWire, y: BoolWire) -> BoolWire;

    fn not(&mut self, x: BoolWire) -> BoolWire;

    /// Opens `x` to both parties.
    fn reveal(&mut self, x: BoolWire) -> Revealed;

    /// Returns a slot for one of this party's own input bytes.
    fn owned_input_gate(&mut self) -> InputSlot<'_, Self> {
        InputSlot::new(self)
    }

    /// Dynamically-typed form of the unary gates.
    fn unary_gate(&mut self, op: UnaryOp, x: ShareWire) -> Result<ShareWire, BackendError> {
        match (op, x) {
            (UnaryOp::Neg, ShareWire::Arithmetic8(x)) => Ok(self.neg(x).into()),
            (UnaryOp::Ham, ShareWire::Arithmetic8(x)) => Ok(self.ham(x).into()),
            (UnaryOp::Dpf, ShareWire::Arithmetic8(x)) => Ok(self.dpf(x).into()),
            (UnaryOp::Not, ShareWire::Boolean(x)) => Ok(self.not(x).into()),
            (op, x) => Err(ErrorRepr::WireKind {
                gate: op.to_string(),
                found: x.kind(),
            }
            .into()),
        }
    }

    /// Dynamically-typed form of the binary gates. Both operands must be of
    /// the kind the gate expects.
    fn binary_gate(
        &mut self,
        op: BinaryOp,
        x: ShareWire,
        y: ShareWire,
    ) -> Result<ShareWire, BackendError> {
        match (op, x, y) {
            (BinaryOp::Add, ShareWire::Arithmetic8(x), ShareWire::Arithmetic8(y)) => {
                Ok(self.add(x, y).into())
            }
            (BinaryOp::And, ShareWire::Boolean(x), ShareWire::Boolean(y)) => {
                Ok(self.and(x, y).into())
            }
            (op, x, y) => {
                // Report the operand that has the wrong kind.
                let first_ok = matches!(
                    (op, x),
                    (BinaryOp::Add, ShareWire::Arithmetic8(_))
                        | (BinaryOp::And, ShareWire::Boolean(_))
                );
                let found = if first_ok { y.kind() } else { x.kind() };
                Err(ErrorRepr::WireKind {
                    gate: op.to_string(),
                    found,
                }
                .into())
            }
        }
    }
}

/// Read access to the results of an executed circuit.
pub trait ShareView {
    /// This party's share of an arithmetic wire.
    fn share(&self, wire: Arith8Wire) -> Result<u8, BackendError>;

    /// A value opened by a reveal gate.
    fn revealed(&self, wire: Revealed) -> Result<bool, BackendError>;
}

/// One round's message: this party's contribution to every gate that
/// becomes known in that round, in gate creation order.
#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    round: u32,
    /// Input stream positions of the owned inputs carried by `payload`.
    positions: Vec<u32>,
    payload: Vec<u8>,
}

/// One backend lifetime over an established connection.
pub struct Backend<'c, R: Read, W: Write> {
    comm: &'c mut CommunicationLayer<R, W>,
    circuit: Circuit,
    settings: Settings,
}

impl<'c, R: Read, W: Write> Backend<'c, R, W> {
    pub fn new(comm: &'c mut CommunicationLayer<R, W>, settings: &Settings) -> Self {
        Backend {
            comm,
            circuit: Circuit::new(),
            settings: settings.clone(),
        }
    }

    pub fn party(&self) -> PartyId {
        self.comm.my_id()
    }

    /// The gate factory of this backend's circuit.
    pub fn gates(&mut self) -> &mut Circuit {
        &mut self.circuit
    }

    pub fn circuit_stats(&self) -> CircuitStats {
        self.circuit.stats()
    }

    /// Runs setup and the online rounds. Blocks until the peer has executed
    /// a structurally identical circuit.
    pub fn execute(self) -> Result<Evaluation, BackendError> {
        let Backend {
            comm,
            circuit,
            settings,
        } = self;
        let party = comm.my_id();
        let span = debug_span!("execute", party = %party, circuit = circuit.id().get());
        let _guard = span.enter();

        circuit.validate()?;
        let mut rng = ChaCha20Rng::from_entropy();

        let setup_start = Instant::now();
        let seed = match settings.dealer_seed {
            Some(seed) => seed,
            None => {
                let mut mine = [0u8; 32];
                rng.fill_bytes(&mut mine);
                let theirs: [u8; 32] = comm.exchange(&mine)?;
                std::array::from_fn(|i| mine[i] ^ theirs[i])
            }
        };
        let mut dealer = Dealer::new(seed, party);
        let correlations: Vec<Option<Correlation>> = circuit
            .gates()
            .iter()
            .map(|gate| dealer.correlation(gate))
            .collect();
        if settings.sync_between_setup_and_online {
            comm.sync()?;
        }
        let setup_time = setup_start.elapsed();
        debug!(
            "setup done: {} gates, {} correlations",
            circuit.len(),
            correlations.iter().flatten().count()
        );

        let online_start = Instant::now();
        let mut online = Online {
            party,
            circuit: &circuit,
            correlations: &correlations,
            values: vec![0u8; circuit.len()],
            rng,
        };
        let by_round = online.gates_by_round();
        for (round, indices) in by_round.iter().enumerate() {
            online.run_round(comm, round as u32, indices)?;
        }
        let online_time = online_start.elapsed();
        info!(
            "executed circuit with {} gates in {} rounds",
            circuit.len(),
            by_round.len()
        );

        Ok(Evaluation {
            circuit_id: circuit.id(),
            values: online.values,
            stats: RunTimeStats::new(setup_time, online_time),
            circuit_stats: circuit.stats(),
        })
    }
}

/// State of the online phase of one execution.
struct Online<'a> {
    party: PartyId,
    circuit: &'a Circuit,
    correlations: &'a [Option<Correlation>],
    /// Share (or opened value for reveal gates) of every gate output.
    /// Boolean values are stored as 0/1.
    values: Vec<u8>,
    rng: ChaCha20Rng,
}

impl Online<'_> {
    fn gates_by_round(&self) -> Vec<Vec<usize>> {
        let num_rounds = self.circuit.stats().rounds as usize;
        let mut by_round = vec![Vec::new(); num_rounds];
        for (index, &round) in self.circuit.rounds().iter().enumerate() {
            by_round[round as usize].push(index);
        }
        by_round
    }

    fn value(&self, wire: WireId) -> u8 {
        self.values[wire.index]
    }

    fn correlation(&self, index: usize) -> Option<&Correlation> {
        self.correlations[index].as_ref()
    }

    /// Exchanges the frame for `round`, then evaluates every gate whose
    /// output becomes known in it.
    ///
    /// A frame's payload holds the owned input shares followed by one byte
    /// per interactive gate, both in gate creation order.
    fn run_round<R: Read, W: Write>(
        &mut self,
        comm: &mut CommunicationLayer<R, W>,
        round: u32,
        indices: &[usize],
    ) -> Result<(), BackendError> {
        let gates = self.circuit.gates();
        let mut positions = Vec::new();
        let mut payload = Vec::new();
        let mut foreign_positions = Vec::new();
        let mut opened = Vec::new();

        for &index in indices {
            match gates[index] {
                Gate::OwnedInput { value, position } => {
                    let (kept, sent) = share::split(value, &mut self.rng);
                    trace!(position, kept, sent, "owned input share");
                    self.values[index] = kept;
                    positions.push(position);
                    payload.push(sent);
                }
                Gate::ForeignInput { position } => foreign_positions.push(position),
                gate if gate.is_interactive() => opened.push(self.open_share(index)?),
                _ => {}
            }
        }
        payload.extend_from_slice(&opened);

        trace!(round, bytes = payload.len(), "sending frame");
        let peer: Frame = comm.exchange(&Frame {
            round,
            positions,
            payload,
        })?;
        if peer.round != round {
            return Err(BackendError::frame(format!(
                "expected round {}, peer sent round {}",
                round, peer.round
            )));
        }
        if peer.positions != foreign_positions {
            return Err(BackendError::input_stream(format!(
                "round {}: peer owns input positions {:?}, expected {:?}",
                round, peer.positions, foreign_positions
            )));
        }
        if peer.payload.len() != foreign_positions.len() + opened.len() {
            return Err(BackendError::frame(format!(
                "round {}: peer sent {} bytes, expected {}",
                round,
                peer.payload.len(),
                foreign_positions.len() + opened.len()
            )));
        }
        let (peer_inputs, peer_opened) = peer.payload.split_at(foreign_positions.len());
        let mut peer_inputs = peer_inputs.iter().copied();
        let mut openings = opened.iter().copied().zip(peer_opened.iter().copied());

        for &index in indices {
            let gate = gates[index];
            let value = match gate {
                Gate::OwnedInput { .. } => continue,
                Gate::ForeignInput { position } => {
                    let received = peer_inputs
                        .next()
                        .ok_or_else(|| BackendError::frame("missing foreign input share"))?;
                    trace!(position, received, "foreign input share");
                    received
                }
                Gate::Neg(x) => self.value(x).wrapping_neg(),
                Gate::Add(x, y) => self.value(x).wrapping_add(self.value(y)),
                Gate::Not(x) => match self.party {
                    PartyId::Zero => self.value(x) ^ 1,
                    PartyId::One => self.value(x),
                },
                _ => {
                    let (own, theirs) = openings
                        .next()
                        .ok_or_else(|| BackendError::frame("missing opening"))?;
                    self.finish(index, own, theirs)?
                }
            };
            self.values[index] = value;
        }
        Ok(())
    }

    /// This party's contribution to opening the masked operands of an
    /// interactive gate.
    fn open_share(&self, index: usize) -> Result<u8, BackendError> {
        match (self.circuit.gates()[index], self.correlation(index)) {
            (Gate::Ham(x), Some(Correlation::Ham(t)))
            | (Gate::Dpf(x), Some(Correlation::Dpf(t))) => Ok(self.value(x).wrapping_add(t.mask)),
            (Gate::And(x, y), Some(Correlation::And(t))) => {
                let d = (self.value(x) & 1) ^ t.a as u8;
                let e = (self.value(y) & 1) ^ t.b as u8;
                Ok(d | (e << 1))
            }
            (Gate::Reveal(x), None) => Ok(self.value(x) & 1),
            (gate, _) => Err(missing_correlation(index, gate)),
        }
    }

    /// Output share of an interactive gate from both parties' openings.
    fn finish(&self, index: usize, own: u8, theirs: u8) -> Result<u8, BackendError> {
        match (self.circuit.gates()[index], self.correlation(index)) {
            (Gate::Ham(_), Some(Correlation::Ham(t))) => {
                Ok(t.table[own.wrapping_add(theirs) as usize])
            }
            (Gate::Dpf(_), Some(Correlation::Dpf(t))) => {
                Ok(t.table[own.wrapping_add(theirs) as usize] & 1)
            }
            (Gate::And(..), Some(Correlation::And(t))) => {
                let opened = own ^ theirs;
                let (d, e) = (opened & 1 == 1, opened & 2 == 2);
                let mut z = t.c ^ (d & t.b) ^ (e & t.a);
                if self.party == PartyId::Zero {
                    z ^= d & e;
                }
                Ok(z as u8)
            }
            (Gate::Reveal(_), None) => Ok((own ^ theirs) & 1),
            (gate, _) => Err(missing_correlation(index, gate)),
        }
    }
}

fn missing_correlation(index: usize, gate: Gate) -> BackendError {
    BackendError::frame(format!(
        "gate {} ({:?}) has no matching correlation",
        index, gate
    ))
}

/// Outputs of one executed circuit. Handles from any other circuit are
/// rejected as stale.
#[derive(Debug)]
pub struct Evaluation {
    circuit_id: CircuitId,
    values: Vec<u8>,
    stats: RunTimeStats,
    circuit_stats: CircuitStats,
}

impl Evaluation {
    pub fn stats(&self) -> RunTimeStats {
        self.stats
    }

    pub fn circuit_stats(&self) -> CircuitStats {
        self.circuit_stats
    }

    fn lookup(&self, wire: WireId) -> Result<u8, BackendError> {
        if wire.circuit != self.circuit_id || wire.index >= self.values.len() {
            return Err(ErrorRepr::StaleHandle {
                index: wire.index,
                expected: self.circuit_id.get(),
                found: wire.circuit.get(),
            }
            .into());
        }
        Ok(self.values[wire.index])
    }
}

impl ShareView for Evaluation {
    fn share(&self, wire: Arith8Wire) -> Result<u8, BackendError> {
        self.lookup(wire.0)
    }

    fn revealed(&self, wire: Revealed) -> Result<bool, BackendError> {
        Ok(self.lookup(wire.0)? == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::testing::{LocalLayer, run_two_party};

    /// What a test circuit wants to read back after execution.
    #[derive(Clone, Copy)]
    enum Readout {
        Share(Arith8Wire),
        Bit(Revealed),
    }

    fn read(evaluation: &Evaluation, readouts: &[Readout]) -> Vec<Option<u8>> {
        readouts
            .iter()
            .map(|readout| match *readout {
                Readout::Share(wire) => evaluation.share(wire).ok(),
                Readout::Bit(wire) => evaluation.revealed(wire).ok().map(u8::from),
            })
            .collect()
    }

    /// Party 0 inputs `inputs[0]` and party 1 inputs `inputs[1]`; both then
    /// build the circuit with `build` and execute it.
    fn run<F>(inputs: [u8; 2], build: F) -> (Vec<Option<u8>>, Vec<Option<u8>>)
    where
        F: Fn(&mut Circuit, Arith8Wire, Arith8Wire) -> Vec<Readout> + Copy + Send + 'static,
    {
        fn party<F>(mut comm: LocalLayer, inputs: [u8; 2], build: F) -> Vec<Option<u8>>
        where
            F: Fn(&mut Circuit, Arith8Wire, Arith8Wire) -> Vec<Readout>,
        {
            let mut backend = Backend::new(&mut comm, &Settings::default());
            let me = backend.party();
            let gates = backend.gates();
            let (x, y) = match me {
                PartyId::Zero => {
                    let x = gates.owned_input_gate().fulfill(inputs[0]);
                    (x, gates.foreign_input_gate())
                }
                PartyId::One => {
                    let x = gates.foreign_input_gate();
                    (x, gates.owned_input_gate().fulfill(inputs[1]))
                }
            };
            let readouts = build(gates, x, y);
            let evaluation = backend.execute().unwrap();
            read(&evaluation, &readouts)
        }
        run_two_party(
            move |comm| party(comm, inputs, build),
            move |comm| party(comm, inputs, build),
        )
    }

    fn combined_share(results: &(Vec<Option<u8>>, Vec<Option<u8>>), i: usize) -> u8 {
        results.0[i].unwrap().wrapping_add(results.1[i].unwrap())
    }

    #[test]
    fn test_linear_gates() {
        let results = run([200, 100], |g, x, y| {
            let neg = g.neg(y);
            vec![Readout::Share(g.add(x, neg))]
        });
        assert_eq!(combined_share(&results, 0), 100);
    }

    #[test]
    fn test_ham_gate() {
        let results = run([0b1011_0000, 0b0000_0001], |g, x, y| {
            let sum = g.add(x, y);
            vec![Readout::Share(g.ham(sum))]
        });
        assert_eq!(combined_share(&results, 0), 4);
    }

    #[test]
    fn test_dpf_and_reveal() {
        for (inputs, expected) in [([7u8, 7u8], 1u8), ([7, 8], 0)] {
            let (a, b) = run(inputs, |g, x, y| {
                let neg = g.neg(y);
                let diff = g.add(x, neg);
                let zero = g.dpf(diff);
                vec![Readout::Bit(g.reveal(zero))]
            });
            assert_eq!(a, vec![Some(expected)]);
            assert_eq!(b, vec![Some(expected)]);
        }
    }

    #[test]
    fn test_and_not_gates() {
        for (inputs, expected) in [([0u8, 0u8], 1u8), ([0, 3], 0), ([5, 0], 0)] {
            let (a, b) = run(inputs, |g, x, y| {
                let zx = g.dpf(x);
                let zy = g.dpf(y);
                let both = g.and(zx, zy);
                let not = g.not(both);
                vec![Readout::Bit(g.reveal(both)), Readout::Bit(g.reveal(not))]
            });
            assert_eq!(a, vec![Some(expected), Some(1 - expected)]);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_generic_gates_check_wire_kind() {
        let mut circuit = Circuit::new();
        let x = circuit.foreign_input_gate();
        let bit = circuit.dpf(x);
        assert!(circuit.unary_gate(UnaryOp::Ham, x.into()).is_ok());
        assert!(circuit.unary_gate(UnaryOp::Not, x.into()).is_err());
        assert!(circuit.binary_gate(BinaryOp::And, bit.into(), bit.into()).is_ok());
        assert!(circuit.binary_gate(BinaryOp::Add, x.into(), bit.into()).is_err());
    }

    #[test]
    fn test_input_stream_mismatch_is_detected() {
        // Both parties claim the first input.
        let party = |mut comm: LocalLayer| {
            let mut backend = Backend::new(&mut comm, &Settings::default());
            let gates = backend.gates();
            gates.owned_input_gate().fulfill(1);
            gates.foreign_input_gate();
            backend.execute().is_err()
        };
        let (a, b) = run_two_party(party, party);
        assert!(a && b);
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let stale = Circuit::new().foreign_input_gate();
        let (a, b) = run([1, 2], move |g, x, _| {
            vec![Readout::Share(g.add(x, x)), Readout::Share(stale)]
        });
        assert!(a[0].is_some() && b[0].is_some());
        assert_eq!(a[1], None);
        assert_eq!(b[1], None);
    }

    #[test]
    fn test_fixed_dealer_seed() {
        let settings = Settings {
            dealer_seed: Some([3u8; 32]),
            sync_between_setup_and_online: true,
            ..Default::default()
        };
        let party = move |mut comm: LocalLayer| {
            let mut backend = Backend::new(&mut comm, &settings);
            let me = backend.party();
            let gates = backend.gates();
            let x = match me {
                PartyId::Zero => gates.owned_input_gate().fulfill(0),
                PartyId::One => gates.foreign_input_gate(),
            };
            let zero = gates.dpf(x);
            let out = gates.reveal(zero);
            backend.execute().unwrap().revealed(out).unwrap()
        };
        let (a, b) = run_two_party(party.clone(), party);
        assert!(a && b);
    }
}
