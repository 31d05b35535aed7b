// exact-pm: runs one party of the exact-match protocol
use std::{error::Error, path::PathBuf, time::Duration};

use clap::Parser;
use en_exact_pm::{
    comm::{TcpCommunicationLayer, TcpSetupHelper},
    config::{DigestMode, Options, RawOptions, RevealPolicy},
    error::ProtocolError,
    protocol::{ExactMatcher, Phase, digest::Digest, outcome::MatchOutcome},
    stats::{PhaseStats, RunMeta, print_stats, to_json},
};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Pause before reconnecting for the second phase, so party 0 is
/// listening again when party 1 starts retrying.
const RECONNECT_PAUSE: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(
    name = "exact-pm",
    about = "Privacy-preserving exact pattern matching between two parties"
)]
struct Cli {
    /// This party's id (0 or 1)
    #[arg(long)]
    my_id: Option<u64>,
    /// Party endpoint as id,host,port; given once per party
    #[arg(long)]
    party: Vec<String>,
    /// pattern-holder or text-holder
    #[arg(long)]
    role: Option<String>,
    #[arg(long)]
    pattern: Option<String>,
    #[arg(long)]
    text: Option<String>,
    /// Pattern length expected by the text holder
    #[arg(long)]
    pattern_size: Option<usize>,
    /// Text length expected by the pattern holder
    #[arg(long)]
    text_size: Option<usize>,
    #[arg(long)]
    repetitions: Option<usize>,
    /// Worker threads for digest computation (0 = rayon default)
    #[arg(long)]
    threads: Option<usize>,
    /// Print statistics as JSON
    #[arg(long)]
    json: bool,
    /// Build the circuits and print their statistics without connecting
    #[arg(long)]
    no_run: bool,
    #[arg(long)]
    sync_between_setup_and_online: bool,
    /// TOML file with the same keys; command-line values take precedence
    #[arg(long)]
    config_file: Option<PathBuf>,
    /// Fixed dealer seed (64 hex characters) instead of a coin toss
    #[arg(long)]
    dealer_seed: Option<String>,
    #[arg(long, value_enum)]
    reveal: Option<RevealPolicy>,
    #[arg(long, value_enum)]
    digest: Option<DigestMode>,
}

impl Cli {
    fn into_raw(self) -> (RawOptions, Option<PathBuf>) {
        let raw = RawOptions {
            my_id: self.my_id,
            party: self.party,
            role: self.role,
            pattern: self.pattern,
            text: self.text,
            pattern_size: self.pattern_size,
            text_size: self.text_size,
            repetitions: self.repetitions,
            threads: self.threads,
            json: self.json,
            no_run: self.no_run,
            sync_between_setup_and_online: self.sync_between_setup_and_online,
            dealer_seed: self.dealer_seed,
            reveal: self.reveal,
            digest: self.digest,
        };
        (raw, self.config_file)
    }
}

fn run_meta(options: &Options) -> RunMeta {
    RunMeta {
        party_id: options.my_id.index(),
        threads: rayon::current_num_threads(),
        repetitions: options.repetitions,
        pattern_len: options.layout.pattern_len(),
        text_len: options.layout.text_len(),
        num_windows: options.layout.num_windows(),
        sync_between_setup_and_online: options.settings.sync_between_setup_and_online,
        no_run: options.no_run,
    }
}

fn report(
    options: &Options,
    outcome: Option<&MatchOutcome>,
    characters: &PhaseStats,
    equality: &PhaseStats,
) {
    let meta = run_meta(options);
    let phases = [("characters", characters), ("equality", equality)];
    if options.json {
        let record = json!({
            "outcome": outcome,
            "stats": to_json(&meta, &phases),
        });
        println!("{}", record);
        return;
    }
    if let Some(outcome) = outcome {
        match (outcome.found, outcome.first_match) {
            (true, Some(window)) => println!("pattern found, first match at window {}", window),
            (true, None) => println!("pattern found"),
            (false, _) => println!("pattern not found"),
        }
        if let Some(bits) = &outcome.window_bits {
            let line: String = bits.iter().map(|&bit| if bit { '1' } else { '0' }).collect();
            println!("window bits: {}", line);
        }
    }
    print!("{}", print_stats(&meta, &phases));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (raw, config_file) = Cli::parse().into_raw();
    let raw = match config_file {
        Some(path) => raw.or(RawOptions::from_file(&path)?),
        None => raw,
    };
    let options = raw.into_options()?;
    if options.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .build_global()?;
    }

    let matcher = ExactMatcher::new(
        options.my_id,
        options.role.clone(),
        options.settings.clone(),
    )?;
    let mut character_stats = PhaseStats {
        circuit: matcher.character_circuit_stats()?,
        ..Default::default()
    };
    let mut equality_stats = PhaseStats {
        circuit: matcher.equality_circuit_stats(),
        ..Default::default()
    };
    if options.no_run {
        report(&options, None, &character_stats, &equality_stats);
        return Ok(());
    }

    let my_id = options.my_id;
    let repetitions = options.repetitions;
    let helper = TcpSetupHelper::new(my_id, options.endpoints.clone());

    // Character phase: one connection for all repetitions.
    let stream = helper.connect().await?;
    let (digests, stats) = tokio::task::spawn_blocking({
        let matcher = matcher.clone();
        move || -> Result<(Vec<Vec<Digest>>, PhaseStats), ProtocolError> {
            let phase = ProtocolError::phase(Phase::CharacterSharing);
            let mut comm = TcpCommunicationLayer::from_tcp(my_id, stream).map_err(&phase)?;
            let mut stats = PhaseStats::default();
            let mut digests = Vec::with_capacity(repetitions);
            for rep in 0..repetitions {
                comm.reset_transport_statistics();
                let output = matcher.run_character_phase(&mut comm)?;
                stats.record(&output.runtime, &comm.transport_statistics());
                info!("repetition {}: character phase done", rep);
                digests.push(output.digests);
            }
            comm.shutdown().map_err(phase)?;
            Ok((digests, stats))
        }
    })
    .await??;
    character_stats.runtime = stats.runtime;
    character_stats.communication = stats.communication;

    tokio::time::sleep(RECONNECT_PAUSE).await;

    // Equality phase on a fresh connection, repetition i consuming digests[i].
    let stream = helper.connect().await?;
    let (outcomes, stats) = tokio::task::spawn_blocking({
        let matcher = matcher.clone();
        move || -> Result<(Vec<MatchOutcome>, PhaseStats), ProtocolError> {
            let phase = ProtocolError::phase(Phase::Equality);
            let mut comm = TcpCommunicationLayer::from_tcp(my_id, stream).map_err(&phase)?;
            let mut stats = PhaseStats::default();
            let mut outcomes = Vec::with_capacity(digests.len());
            for (rep, digests) in digests.iter().enumerate() {
                comm.reset_transport_statistics();
                let output = matcher.run_equality_phase(&mut comm, digests)?;
                stats.record(&output.runtime, &comm.transport_statistics());
                info!("repetition {}: equality phase done", rep);
                outcomes.push(output.outcome);
            }
            comm.shutdown().map_err(phase)?;
            Ok((outcomes, stats))
        }
    })
    .await??;
    equality_stats.runtime = stats.runtime;
    equality_stats.communication = stats.communication;

    if outcomes.windows(2).any(|pair| pair[0] != pair[1]) {
        warn!("repetitions disagree on the outcome");
    }
    report(&options, outcomes.last(), &character_stats, &equality_stats);
    Ok(())
}
