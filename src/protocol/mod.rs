//! The two phases of an exact-match run.
//!
//! The character phase shares every pattern and window character, executes,
//! and turns this party's difference shares into one digest per window. The
//! digests then cross into the equality phase, which runs on a fresh backend,
//! re-shares them and compares them byte by byte inside the circuit.

pub mod difference;
pub mod digest;
pub mod equality;
pub mod outcome;
pub mod reshare;
pub mod sharing;

use std::{
    fmt,
    io::{Read, Write},
};

use tracing::{debug, info, info_span};

use self::{
    difference::window_differences,
    digest::{DIGEST_LEN, Digest, window_digests},
    equality::build_equality_circuit,
    outcome::{MatchOutcome, aggregate},
    reshare::{reshare_digests, trace_digest_shares},
    sharing::share_characters,
};
use crate::{
    backend::{Backend, Circuit, CircuitStats},
    comm::CommunicationLayer,
    config::{PartyId, Role, Settings},
    error::{BackendError, ConfigError, ProtocolError},
    stats::RunTimeStats,
    window::WindowLayout,
};

/// The backend lifetime an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CharacterSharing,
    Equality,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::CharacterSharing => f.write_str("character sharing phase"),
            Phase::Equality => f.write_str("equality phase"),
        }
    }
}

/// Output of the character phase.
#[derive(Debug, Clone)]
pub struct CharacterPhaseOutput {
    pub digests: Vec<Digest>,
    pub runtime: RunTimeStats,
    pub circuit: CircuitStats,
}

/// Output of the equality phase.
#[derive(Debug, Clone)]
pub struct EqualityPhaseOutput {
    pub outcome: MatchOutcome,
    pub runtime: RunTimeStats,
    pub circuit: CircuitStats,
}

/// One party of an exact-match run.
#[derive(Debug, Clone)]
pub struct ExactMatcher {
    party: PartyId,
    role: Role,
    layout: WindowLayout,
    settings: Settings,
}

impl ExactMatcher {
    /// Validates the role's lengths before anything touches the network.
    pub fn new(party: PartyId, role: Role, settings: Settings) -> Result<Self, ConfigError> {
        let layout = role.layout()?;
        Ok(ExactMatcher {
            party,
            role,
            layout,
            settings,
        })
    }

    pub fn party(&self) -> PartyId {
        self.party
    }

    pub fn layout(&self) -> WindowLayout {
        self.layout
    }

    /// Shares the characters, executes, and returns this party's digest of
    /// every window.
    pub fn run_character_phase<R: Read, W: Write>(
        &self,
        comm: &mut CommunicationLayer<R, W>,
    ) -> Result<CharacterPhaseOutput, ProtocolError> {
        let phase = Phase::CharacterSharing;
        let _span = info_span!("phase", %phase).entered();
        self.check_party(comm, phase)?;

        let mut backend = Backend::new(comm, &self.settings);
        let shares = share_characters(backend.gates(), &self.role)?;
        let evaluation = backend.execute().map_err(ProtocolError::phase(phase))?;

        let diffs = window_differences(self.role.kind(), &shares, &evaluation)
            .map_err(ProtocolError::phase(phase))?;
        let digests = window_digests(&diffs, self.settings.digest);
        for (window, digest) in digests.iter().enumerate() {
            debug!(window, digest = %hex::encode(digest), "window digest");
        }
        info!("computed {} window digests", digests.len());

        Ok(CharacterPhaseOutput {
            digests,
            runtime: evaluation.stats(),
            circuit: evaluation.circuit_stats(),
        })
    }

    /// Compares both parties' digests and reveals the result.
    pub fn run_equality_phase<R: Read, W: Write>(
        &self,
        comm: &mut CommunicationLayer<R, W>,
        digests: &[Digest],
    ) -> Result<EqualityPhaseOutput, ProtocolError> {
        let phase = Phase::Equality;
        let _span = info_span!("phase", %phase).entered();
        self.check_party(comm, phase)?;
        if digests.len() != self.layout.num_windows() {
            return Err(ProtocolError::phase(phase)(BackendError::input_stream(
                format!(
                    "got {} digests for {} windows",
                    digests.len(),
                    self.layout.num_windows()
                ),
            )));
        }

        let mut backend = Backend::new(comm, &self.settings);
        let shares = reshare_digests(backend.gates(), self.party, digests);
        let outputs = build_equality_circuit(backend.gates(), &shares, self.settings.reveal);
        let evaluation = backend.execute().map_err(ProtocolError::phase(phase))?;
        trace_digest_shares(&shares, &evaluation).map_err(ProtocolError::phase(phase))?;
        let outcome = aggregate(&evaluation, &outputs).map_err(ProtocolError::phase(phase))?;

        Ok(EqualityPhaseOutput {
            outcome,
            runtime: evaluation.stats(),
            circuit: evaluation.circuit_stats(),
        })
    }

    /// Runs both phases over one connection.
    pub fn run<R: Read, W: Write>(
        &self,
        comm: &mut CommunicationLayer<R, W>,
    ) -> Result<MatchOutcome, ProtocolError> {
        let characters = self.run_character_phase(comm)?;
        comm.sync()
            .map_err(ProtocolError::phase(Phase::CharacterSharing))?;
        Ok(self.run_equality_phase(comm, &characters.digests)?.outcome)
    }

    /// Gate counts of the character phase, without executing it.
    pub fn character_circuit_stats(&self) -> Result<CircuitStats, ConfigError> {
        let mut circuit = Circuit::new();
        share_characters(&mut circuit, &self.role)?;
        Ok(circuit.stats())
    }

    /// Gate counts of the equality phase, without executing it.
    pub fn equality_circuit_stats(&self) -> CircuitStats {
        let digests = vec![[0u8; DIGEST_LEN]; self.layout.num_windows()];
        let mut circuit = Circuit::new();
        let shares = reshare_digests(&mut circuit, self.party, &digests);
        build_equality_circuit(&mut circuit, &shares, self.settings.reveal);
        circuit.stats()
    }

    fn check_party<R: Read, W: Write>(
        &self,
        comm: &CommunicationLayer<R, W>,
        phase: Phase,
    ) -> Result<(), ProtocolError> {
        if comm.my_id() != self.party {
            return Err(ProtocolError::phase(phase)(BackendError::handshake(format!(
                "matcher is party {} but the connection belongs to party {}",
                self.party,
                comm.my_id()
            ))));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::{
        comm::{TcpCommunicationLayer, TcpSetupHelper, testing::run_two_party},
        config::{DigestMode, Endpoints, PartyEndpoint, RevealPolicy},
    };

    fn matchers(
        pattern: &[u8],
        text: &[u8],
        pattern_party: PartyId,
        settings: Settings,
    ) -> (ExactMatcher, ExactMatcher) {
        let pattern_role = Role::PatternHolder {
            pattern: pattern.to_vec(),
            text_len: text.len(),
        };
        let text_role = Role::TextHolder {
            text: text.to_vec(),
            pattern_len: pattern.len(),
        };
        let (zero, one) = match pattern_party {
            PartyId::Zero => (pattern_role, text_role),
            PartyId::One => (text_role, pattern_role),
        };
        (
            ExactMatcher::new(PartyId::Zero, zero, settings.clone()).unwrap(),
            ExactMatcher::new(PartyId::One, one, settings).unwrap(),
        )
    }

    fn run_match(pattern: &[u8], text: &[u8], settings: Settings) -> MatchOutcome {
        let (m0, m1) = matchers(pattern, text, PartyId::Zero, settings);
        let (a, b) = run_two_party(
            move |mut comm| m0.run(&mut comm).unwrap(),
            move |mut comm| m1.run(&mut comm).unwrap(),
        );
        assert_eq!(a, b);
        a
    }

    #[test]
    fn test_single_match() {
        let outcome = run_match(b"AB", b"XABY", Settings::default());
        assert_eq!(outcome.window_bits, Some(vec![false, true, false]));
        assert!(outcome.found);
        assert_eq!(outcome.first_match, Some(1));
    }

    #[test]
    fn test_no_match() {
        let outcome = run_match(b"ZZ", b"ABCDEF", Settings::default());
        assert_eq!(outcome.window_bits, Some(vec![false; 5]));
        assert!(!outcome.found);
        assert_eq!(outcome.first_match, None);
    }

    #[test]
    fn test_multiple_matches_with_pattern_on_party_one() {
        let (m0, m1) = matchers(b"ana", b"bananas", PartyId::One, Settings::default());
        let (a, b) = run_two_party(
            move |mut comm| m0.run(&mut comm).unwrap(),
            move |mut comm| m1.run(&mut comm).unwrap(),
        );
        assert_eq!(a, b);
        assert_eq!(a.window_bits, Some(vec![false, true, false, true, false]));
        assert_eq!(a.first_match, Some(1));
    }

    #[test]
    fn test_repetitions_are_identical() {
        let (m0, m1) = matchers(b"AB", b"XABY", PartyId::Zero, Settings::default());
        let repeat = |matcher: ExactMatcher| {
            move |mut comm: crate::comm::testing::LocalLayer| {
                let first = matcher.run(&mut comm).unwrap();
                comm.sync().unwrap();
                let second = matcher.run(&mut comm).unwrap();
                (first, second)
            }
        };
        let (a, b) = run_two_party(repeat(m0), repeat(m1));
        assert_eq!(a.0, a.1);
        assert_eq!(b.0, b.1);
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn test_verdict_only() {
        let settings = Settings {
            reveal: RevealPolicy::VerdictOnly,
            ..Default::default()
        };
        let found = run_match(b"AB", b"XABY", settings.clone());
        assert_eq!(found.window_bits, None);
        assert!(found.found);
        assert_eq!(found.first_match, None);

        let missing = run_match(b"ZZ", b"ABCDEF", settings);
        assert!(!missing.found);
    }

    #[test]
    fn test_long_pattern_chained_digest() {
        let text = b"the quick brown fox jumps over the lazy dog".to_vec();
        let pattern = b"brown fox jumps over".to_vec();
        let settings = Settings {
            digest: DigestMode::Chained,
            dealer_seed: Some([7u8; 32]),
            ..Default::default()
        };
        let outcome = run_match(&pattern, &text, settings);
        assert_eq!(outcome.first_match, Some(10));
        let bits = outcome.window_bits.unwrap();
        assert_eq!(bits.iter().filter(|&&bit| bit).count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_phases_over_tcp_with_reconnect() {
        // Grab a free port for party 0 to listen on in both phases.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let endpoint = |id| PartyEndpoint {
            id,
            host: "127.0.0.1".to_string(),
            port,
        };
        let endpoints =
            Endpoints::new(vec![endpoint(PartyId::Zero), endpoint(PartyId::One)]).unwrap();
        let (m0, m1) = matchers(b"AB", b"XABY", PartyId::Zero, Settings::default());

        let session = |matcher: ExactMatcher| {
            let helper = TcpSetupHelper::new(matcher.party(), endpoints.clone());
            async move {
                let party = matcher.party();
                let stream = helper.connect().await.unwrap();
                let worker = matcher.clone();
                let digests = tokio::task::spawn_blocking(move || {
                    let mut comm = TcpCommunicationLayer::from_tcp(party, stream).unwrap();
                    let output = worker.run_character_phase(&mut comm).unwrap();
                    comm.shutdown().unwrap();
                    output.digests
                })
                .await
                .unwrap();

                tokio::time::sleep(Duration::from_millis(100)).await;

                let stream = helper.connect().await.unwrap();
                tokio::task::spawn_blocking(move || {
                    let mut comm = TcpCommunicationLayer::from_tcp(party, stream).unwrap();
                    let output = matcher.run_equality_phase(&mut comm, &digests).unwrap();
                    comm.shutdown().unwrap();
                    output.outcome
                })
                .await
                .unwrap()
            }
        };
        let (a, b) = tokio::join!(session(m0), session(m1));
        assert_eq!(a.first_match, Some(1));
        assert_eq!(b.first_match, Some(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_bad_lengths_before_connecting() {
        let role = Role::PatternHolder {
            pattern: b"ABCD".to_vec(),
            text_len: 4,
        };
        assert_eq!(
            ExactMatcher::new(PartyId::Zero, role, Settings::default()).unwrap_err(),
            ConfigError::PatternNotShorter {
                pattern: 4,
                text: 4
            }
        );
    }

    #[test]
    fn test_dry_run_stats() {
        let (m0, m1) = matchers(b"AB", b"XABY", PartyId::Zero, Settings::default());
        let c0 = m0.character_circuit_stats().unwrap();
        let c1 = m1.character_circuit_stats().unwrap();
        assert_eq!(c0.owned_inputs, c1.foreign_inputs);
        assert_eq!(c0.owned_inputs + c0.foreign_inputs, 2 + 3 * 2);
        assert_eq!(m0.equality_circuit_stats(), m1.equality_circuit_stats());
    }
}
