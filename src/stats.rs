//! Run-time and communication statistics, accumulated over repetitions.

use std::{fmt::Write as _, time::Duration};

use serde::Serialize;
use serde_json::{Value, json};

use crate::backend::CircuitStats;

/// Timings of one backend execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunTimeStats {
    pub setup_ms: f64,
    pub online_ms: f64,
}

impl RunTimeStats {
    pub fn new(setup: Duration, online: Duration) -> Self {
        RunTimeStats {
            setup_ms: setup.as_secs_f64() * 1000.0,
            online_ms: online.as_secs_f64() * 1000.0,
        }
    }

    pub fn total_ms(&self) -> f64 {
        self.setup_ms + self.online_ms
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AccumulatedRunTimeStats {
    pub count: usize,
    pub setup_ms: f64,
    pub online_ms: f64,
}

impl AccumulatedRunTimeStats {
    pub fn record(&mut self, stats: &RunTimeStats) {
        self.count += 1;
        self.setup_ms += stats.setup_ms;
        self.online_ms += stats.online_ms;
    }

    pub fn mean(&self) -> RunTimeStats {
        if self.count == 0 {
            return RunTimeStats::default();
        }
        let n = self.count as f64;
        RunTimeStats {
            setup_ms: self.setup_ms / n,
            online_ms: self.online_ms / n,
        }
    }
}

/// Bytes and frames moved over the channel since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CommunicationStats {
    pub kilobytes_sent: f64,
    pub kilobytes_received: f64,
    pub frames_sent: u64,
    pub frames_received: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AccumulatedCommunicationStats {
    pub count: usize,
    pub kilobytes_sent: f64,
    pub kilobytes_received: f64,
    pub frames_sent: u64,
    pub frames_received: u64,
}

impl AccumulatedCommunicationStats {
    pub fn record(&mut self, stats: &CommunicationStats) {
        self.count += 1;
        self.kilobytes_sent += stats.kilobytes_sent;
        self.kilobytes_received += stats.kilobytes_received;
        self.frames_sent += stats.frames_sent;
        self.frames_received += stats.frames_received;
    }

    pub fn mean(&self) -> CommunicationStats {
        if self.count == 0 {
            return CommunicationStats::default();
        }
        let n = self.count as f64;
        CommunicationStats {
            kilobytes_sent: self.kilobytes_sent / n,
            kilobytes_received: self.kilobytes_received / n,
            frames_sent: self.frames_sent / self.count as u64,
            frames_received: self.frames_received / self.count as u64,
        }
    }
}

/// Everything recorded for one protocol phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseStats {
    pub runtime: AccumulatedRunTimeStats,
    pub communication: AccumulatedCommunicationStats,
    pub circuit: CircuitStats,
}

impl PhaseStats {
    pub fn record(&mut self, runtime: &RunTimeStats, communication: &CommunicationStats) {
        self.runtime.record(runtime);
        self.communication.record(communication);
    }
}

/// Parameters of the run that are printed alongside the measurements.
#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub party_id: usize,
    pub threads: usize,
    pub repetitions: usize,
    pub pattern_len: usize,
    pub text_len: usize,
    pub num_windows: usize,
    pub sync_between_setup_and_online: bool,
    pub no_run: bool,
}

/// Builds the machine-readable statistics record.
pub fn to_json(meta: &RunMeta, phases: &[(&str, &PhaseStats)]) -> Value {
    let phases: serde_json::Map<String, Value> = phases
        .iter()
        .map(|(name, stats)| {
            let runtime = stats.runtime.mean();
            let communication = stats.communication.mean();
            let value = json!({
                "circuit": stats.circuit,
                "setup_ms": runtime.setup_ms,
                "online_ms": runtime.online_ms,
                "total_ms": runtime.total_ms(),
                "kilobytes_sent": communication.kilobytes_sent,
                "kilobytes_received": communication.kilobytes_received,
                "frames_sent": communication.frames_sent,
                "frames_received": communication.frames_received,
            });
            (name.to_string(), value)
        })
        .collect();
    json!({
        "meta": meta,
        "phases": phases,
    })
}

/// Renders the statistics as a plain-text table of per-repetition means.
pub fn print_stats(meta: &RunMeta, phases: &[(&str, &PhaseStats)]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "party {} | {} repetition(s) | {} thread(s) | |P| = {} | |T| = {} | {} window(s)",
        meta.party_id,
        meta.repetitions,
        meta.threads,
        meta.pattern_len,
        meta.text_len,
        meta.num_windows,
    );
    let _ = writeln!(
        out,
        "{:<12} {:>8} {:>8} {:>8} {:>8} {:>12} {:>12} {:>11} {:>11}",
        "phase", "gates", "rounds", "ham", "dpf", "setup ms", "online ms", "kB sent", "kB recv",
    );
    for (name, stats) in phases {
        let runtime = stats.runtime.mean();
        let communication = stats.communication.mean();
        let c = &stats.circuit;
        let gates = c.owned_inputs + c.foreign_inputs + c.linear + c.ham + c.dpf + c.and + c.reveal;
        let _ = writeln!(
            out,
            "{:<12} {:>8} {:>8} {:>8} {:>8} {:>12.3} {:>12.3} {:>11.3} {:>11.3}",
            name,
            gates,
            c.rounds,
            c.ham,
            c.dpf,
            runtime.setup_ms,
            runtime.online_ms,
            communication.kilobytes_sent,
            communication.kilobytes_received,
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> RunMeta {
        RunMeta {
            party_id: 1,
            threads: 4,
            repetitions: 2,
            pattern_len: 2,
            text_len: 4,
            num_windows: 3,
            sync_between_setup_and_online: false,
            no_run: false,
        }
    }

    #[test]
    fn test_accumulated_means() {
        let mut stats = PhaseStats::default();
        let comm = CommunicationStats {
            kilobytes_sent: 1.0,
            kilobytes_received: 3.0,
            frames_sent: 4,
            frames_received: 4,
        };
        let ms = Duration::from_millis;
        stats.record(&RunTimeStats::new(ms(10), ms(20)), &comm);
        stats.record(&RunTimeStats::new(ms(30), ms(40)), &comm);

        let runtime = stats.runtime.mean();
        assert!((runtime.setup_ms - 20.0).abs() < 1e-9);
        assert!((runtime.online_ms - 30.0).abs() < 1e-9);
        assert_eq!(stats.communication.mean(), comm);
    }

    #[test]
    fn test_json_record() {
        let stats = PhaseStats::default();
        let value = to_json(&meta(), &[("equality", &stats)]);
        assert_eq!(value["meta"]["party_id"], 1);
        assert_eq!(value["phases"]["equality"]["frames_sent"], 0);
    }

    #[test]
    fn test_text_table() {
        let stats = PhaseStats::default();
        let table = print_stats(&meta(), &[("characters", &stats)]);
        assert!(table.starts_with("party 1"));
        assert!(table.contains("characters"));
    }
}
