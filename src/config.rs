//! Validated run configuration.
//!
//! Everything here is checked before a connection is attempted. The
//! command-line layer produces a [`RawOptions`] (optionally merged with a
//! TOML config file) and turns it into [`Options`] with
//! [`RawOptions::into_options`].

use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, window::WindowLayout};

/// Identifier of one of the two parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartyId {
    /// Party 0, the listening side of the connection.
    Zero,
    /// Party 1, the connecting side of the connection.
    One,
}

impl PartyId {
    /// Parses a numeric party id.
    pub fn from_index(id: u64) -> Result<Self, ConfigError> {
        match id {
            0 => Ok(PartyId::Zero),
            1 => Ok(PartyId::One),
            other => Err(ConfigError::InvalidPartyId(other)),
        }
    }

    pub fn index(self) -> usize {
        match self {
            PartyId::Zero => 0,
            PartyId::One => 1,
        }
    }

    pub fn peer(self) -> PartyId {
        match self {
            PartyId::Zero => PartyId::One,
            PartyId::One => PartyId::Zero,
        }
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// A `(party id, host, port)` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyEndpoint {
    pub id: PartyId,
    pub host: String,
    pub port: u16,
}

impl PartyEndpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for PartyEndpoint {
    type Err = ConfigError;

    /// Parses `id,host,port`, e.g. `1,127.0.0.1,7777`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidParty(s.to_string());
        let mut parts = s.split(',');
        let (Some(id), Some(host), Some(port), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let id: u64 = id.trim().parse().map_err(|_| invalid())?;
        let host = host.trim();
        if host.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.trim().parse().map_err(|_| invalid())?;

        Ok(PartyEndpoint {
            id: PartyId::from_index(id)?,
            host: host.to_string(),
            port,
        })
    }
}

/// Endpoints of both parties, indexed by party id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints([PartyEndpoint; 2]);

impl Endpoints {
    /// Builds the endpoint table from exactly one entry per party.
    pub fn new(parties: Vec<PartyEndpoint>) -> Result<Self, ConfigError> {
        let [a, b]: [PartyEndpoint; 2] = parties
            .try_into()
            .map_err(|v: Vec<PartyEndpoint>| ConfigError::PartyCount(v.len()))?;
        if a.id == b.id {
            return Err(ConfigError::DuplicateParty);
        }
        Ok(match a.id {
            PartyId::Zero => Endpoints([a, b]),
            PartyId::One => Endpoints([b, a]),
        })
    }

    pub fn get(&self, party: PartyId) -> &PartyEndpoint {
        &self.0[party.index()]
    }
}

/// What this party holds. The peer's length travels with the variant, so
/// a text holder cannot be built without the expected pattern length.
#[derive(Clone, PartialEq, Eq)]
pub enum Role {
    PatternHolder { pattern: Vec<u8>, text_len: usize },
    TextHolder { text: Vec<u8>, pattern_len: usize },
}

/// Which string a party holds, without the string itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HolderKind {
    Pattern,
    Text,
}

impl Role {
    pub fn kind(&self) -> HolderKind {
        match self {
            Role::PatternHolder { .. } => HolderKind::Pattern,
            Role::TextHolder { .. } => HolderKind::Text,
        }
    }

    pub fn pattern_len(&self) -> usize {
        match self {
            Role::PatternHolder { pattern, .. } => pattern.len(),
            Role::TextHolder { pattern_len, .. } => *pattern_len,
        }
    }

    pub fn text_len(&self) -> usize {
        match self {
            Role::PatternHolder { text_len, .. } => *text_len,
            Role::TextHolder { text, .. } => text.len(),
        }
    }

    /// Derives the public window structure, rejecting inconsistent lengths.
    pub fn layout(&self) -> Result<WindowLayout, ConfigError> {
        WindowLayout::new(self.pattern_len(), self.text_len())
    }
}

// Never print the private string.
impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::PatternHolder { pattern, text_len } => f
                .debug_struct("PatternHolder")
                .field("pattern_len", &pattern.len())
                .field("text_len", text_len)
                .finish(),
            Role::TextHolder { text, pattern_len } => f
                .debug_struct("TextHolder")
                .field("text_len", &text.len())
                .field("pattern_len", pattern_len)
                .finish(),
        }
    }
}

/// Which equality bits are opened at the end of the equality phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RevealPolicy {
    /// Open every per-window bit. Leaks which windows do not match.
    #[default]
    PerWindow,
    /// OR the window bits inside the circuit and open only the verdict.
    VerdictOnly,
}

/// How a difference vector is absorbed before the final compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DigestMode {
    /// XOR-fold into 16 bytes.
    #[default]
    Folded,
    /// Chain 16-byte blocks through the block cipher.
    Chained,
}

/// Protocol knobs shared by both phases. Both parties must agree on all of
/// them except `dealer_seed`, which only needs to match when set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub reveal: RevealPolicy,
    pub digest: DigestMode,
    pub sync_between_setup_and_online: bool,
    pub dealer_seed: Option<[u8; 32]>,
}

/// Fully validated options for one party.
#[derive(Debug, Clone)]
pub struct Options {
    pub my_id: PartyId,
    pub endpoints: Endpoints,
    pub role: Role,
    pub layout: WindowLayout,
    pub repetitions: usize,
    pub threads: usize,
    pub json: bool,
    pub no_run: bool,
    pub settings: Settings,
}

/// Unvalidated options as they come from the command line or a config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RawOptions {
    pub my_id: Option<u64>,
    pub party: Vec<String>,
    pub role: Option<String>,
    pub pattern: Option<String>,
    pub text: Option<String>,
    pub pattern_size: Option<usize>,
    pub text_size: Option<usize>,
    pub repetitions: Option<usize>,
    pub threads: Option<usize>,
    pub json: bool,
    pub no_run: bool,
    pub sync_between_setup_and_online: bool,
    pub dealer_seed: Option<String>,
    pub reveal: Option<RevealPolicy>,
    pub digest: Option<DigestMode>,
}

impl RawOptions {
    /// Reads a TOML config file using the same keys as the command line.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::File(e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ConfigError::File(e.to_string()))
    }

    /// Fills every unset field of `self` from `base`.
    pub fn or(self, base: RawOptions) -> RawOptions {
        RawOptions {
            my_id: self.my_id.or(base.my_id),
            party: if self.party.is_empty() {
                base.party
            } else {
                self.party
            },
            role: self.role.or(base.role),
            pattern: self.pattern.or(base.pattern),
            text: self.text.or(base.text),
            pattern_size: self.pattern_size.or(base.pattern_size),
            text_size: self.text_size.or(base.text_size),
            repetitions: self.repetitions.or(base.repetitions),
            threads: self.threads.or(base.threads),
            json: self.json || base.json,
            no_run: self.no_run || base.no_run,
            sync_between_setup_and_online: self.sync_between_setup_and_online
                || base.sync_between_setup_and_online,
            dealer_seed: self.dealer_seed.or(base.dealer_seed),
            reveal: self.reveal.or(base.reveal),
            digest: self.digest.or(base.digest),
        }
    }

    pub fn into_options(self) -> Result<Options, ConfigError> {
        let my_id = PartyId::from_index(self.my_id.ok_or(ConfigError::MissingField {
            role: "every party",
            field: "--my-id",
        })?)?;

        let role = match self.role.as_deref() {
            Some("pattern-holder" | "pattern_holder") => {
                let pattern = self.pattern.ok_or(ConfigError::MissingField {
                    role: "pattern_holder",
                    field: "--pattern",
                })?;
                let text_len = self.text_size.ok_or(ConfigError::MissingField {
                    role: "pattern_holder",
                    field: "expected text size via --text-size",
                })?;
                Role::PatternHolder {
                    pattern: pattern.into_bytes(),
                    text_len,
                }
            }
            Some("text-holder" | "text_holder") => {
                let text = self.text.ok_or(ConfigError::MissingField {
                    role: "text_holder",
                    field: "--text",
                })?;
                let pattern_len = self.pattern_size.ok_or(ConfigError::MissingField {
                    role: "text_holder",
                    field: "expected pattern size via --pattern-size",
                })?;
                Role::TextHolder {
                    text: text.into_bytes(),
                    pattern_len,
                }
            }
            Some(other) => return Err(ConfigError::UnknownRole(other.to_string())),
            None => {
                return Err(ConfigError::MissingField {
                    role: "every party",
                    field: "--role",
                });
            }
        };
        let layout = role.layout()?;

        let endpoints = Endpoints::new(
            self.party
                .iter()
                .map(|p| p.parse())
                .collect::<Result<Vec<PartyEndpoint>, _>>()?,
        )?;

        let repetitions = self.repetitions.unwrap_or(1);
        if repetitions == 0 {
            return Err(ConfigError::NoRepetitions);
        }

        let dealer_seed = self.dealer_seed.as_deref().map(parse_seed).transpose()?;

        Ok(Options {
            my_id,
            endpoints,
            role,
            layout,
            repetitions,
            threads: self.threads.unwrap_or(0),
            json: self.json,
            no_run: self.no_run,
            settings: Settings {
                reveal: self.reveal.unwrap_or_default(),
                digest: self.digest.unwrap_or_default(),
                sync_between_setup_and_online: self.sync_between_setup_and_online,
                dealer_seed,
            },
        })
    }
}

fn parse_seed(s: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(s.trim()).map_err(|_| ConfigError::InvalidSeed)?;
    bytes.try_into().map_err(|_| ConfigError::InvalidSeed)
}
