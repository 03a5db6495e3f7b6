//! Engine configuration
//!
//! Central configuration for the engine: paths, collaborator endpoints,
//! integrity thresholds, trust table, and red-flag phrase lists. Defaults
//! reflect the shipped detection tables; deployments override via CLI flags.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// One red-flag phrase category
#[derive(Debug, Clone)]
pub struct RedFlagCategory {
    pub name: &'static str,
    pub phrases: Vec<String>,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Working root for all durable state
    pub working_root: PathBuf,
    pub host: String,
    pub port: u16,

    /// Ollama endpoint and models
    pub ollama_base_url: String,
    pub generation_model: String,
    pub embedding_model: String,

    /// Signal threshold Θ: a signal below this counts as a quarantine vote
    pub integrity_threshold: f64,
    /// Vote count Q: quarantine when at least this many signals are low
    pub quarantine_votes: usize,
    /// Identifier repetition count for query augmentation
    pub boost_factor: usize,
    /// Candidate over-fetch multiplier when excluding quarantined documents
    pub over_fetch_factor: usize,

    /// Default and bounds for the per-query retrieval count
    pub default_k: usize,
    pub max_k: usize,

    /// Per-query deadline (generation dominated)
    pub query_deadline: Duration,

    /// Source prefix -> trust score; longest matching prefix wins
    pub trust_sources: Vec<(String, f64)>,
    /// Red-flag keyword phrases grouped by semantic category
    pub red_flags: Vec<RedFlagCategory>,

    /// Demonstration path that skips integrity checks; off by default
    pub enable_unsafe_queries: bool,
    /// Destructive `/api/demo/reset` endpoint; off by default
    pub allow_demo_reset: bool,

    /// Corpus directory to ingest at startup, when given
    pub corpus_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn new(working_root: impl Into<PathBuf>) -> Self {
        Self {
            working_root: working_root.into(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            ollama_base_url: "http://localhost:11434".to_string(),
            generation_model: "mistral".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            integrity_threshold: 0.5,
            quarantine_votes: 2,
            boost_factor: 3,
            over_fetch_factor: 3,
            default_k: 5,
            max_k: 20,
            query_deadline: Duration::from_secs(30),
            trust_sources: default_trust_sources(),
            red_flags: default_red_flags(),
            enable_unsafe_queries: false,
            allow_demo_reset: false,
            corpus_dir: None,
        }
    }

    /// Validate threshold/bound combinations. Called once at startup;
    /// violations are configuration errors (exit code 2).
    pub fn validate(&self) -> Result<()> {
        if !(self.integrity_threshold > 0.0 && self.integrity_threshold < 1.0) {
            return Err(Error::Config(format!(
                "integrity threshold must lie in (0, 1), got {}",
                self.integrity_threshold
            )));
        }
        if !(1..=4).contains(&self.quarantine_votes) {
            return Err(Error::Config(format!(
                "quarantine vote count must lie in 1..=4, got {}",
                self.quarantine_votes
            )));
        }
        if self.boost_factor == 0 {
            return Err(Error::Config("boost factor must be at least 1".to_string()));
        }
        if self.over_fetch_factor == 0 {
            return Err(Error::Config("over-fetch factor must be at least 1".to_string()));
        }
        if self.default_k == 0 || self.max_k == 0 || self.default_k > self.max_k {
            return Err(Error::Config(format!(
                "retrieval bounds invalid: default_k={} max_k={}",
                self.default_k, self.max_k
            )));
        }
        if self.query_deadline.is_zero() {
            return Err(Error::Config("query deadline must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn events_log_path(&self) -> PathBuf {
        self.working_root.join("events.jsonl")
    }

    pub fn lineage_log_path(&self) -> PathBuf {
        self.working_root.join("query_lineage.jsonl")
    }

    pub fn vault_dir(&self) -> PathBuf {
        self.working_root.join("vault")
    }

    /// Opaque index directory owned by the retrieval adapter
    pub fn index_dir(&self) -> PathBuf {
        self.working_root.join("index")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Source reputation table. Known-good prefixes score high, known-bad score
/// zero; sources matching no prefix default to 0.5 in the trust scorer.
pub fn default_trust_sources() -> Vec<(String, f64)> {
    [
        ("nvd.nist.gov", 1.0),
        ("cve.mitre.org", 1.0),
        ("ubuntu.com/security", 0.9),
        ("redhat.com/security", 0.9),
        ("debian.org/security", 0.9),
        ("microsoft.com/security", 0.85),
        ("github.com/advisories", 0.8),
        ("internal_kb", 0.9),
        ("golden", 0.95),
        ("clean", 0.85),
        ("unknown", 0.0),
        ("poisoned", 0.0),
    ]
    .into_iter()
    .map(|(source, score)| (source.to_string(), score))
    .collect()
}

fn phrases(list: &[&str]) -> Vec<String> {
    list.iter().map(|p| p.to_string()).collect()
}

/// Red-flag keyword phrases, grouped into five semantic categories.
/// Matching is case-insensitive substring search.
pub fn default_red_flags() -> Vec<RedFlagCategory> {
    vec![
        RedFlagCategory {
            name: "security_downgrade",
            phrases: phrases(&[
                "disable firewall",
                "turn off waf",
                "skip security scan",
                "stop firewalld",
                "systemctl stop",
                "ufw disable",
                "temporarily disable security",
                "bypass security",
                "disable antivirus",
            ]),
        },
        RedFlagCategory {
            name: "dangerous_permissions",
            phrases: phrases(&[
                "chmod 777",
                "chmod -r 777",
                "permissive permissions",
                "world-writable",
                "grant full access",
                "0777",
            ]),
        },
        RedFlagCategory {
            name: "severity_downplay",
            phrases: phrases(&[
                "low priority",
                "not urgent",
                "ignore this cve",
                "can be deferred",
                "no immediate action",
                "largely mitigated",
                "low-medium severity",
                "adequate protection",
                "next maintenance window",
            ]),
        },
        RedFlagCategory {
            name: "unsafe_operations",
            phrases: phrases(&[
                "skip verification",
                "bypass check",
                "disable validation",
                "without security modules",
                "run as root",
                "disable selinux",
                "disable apparmor",
                "ignore warning",
            ]),
        },
        RedFlagCategory {
            name: "social_engineering",
            phrases: phrases(&[
                "trust this source",
                "urgent action required",
                "verify later",
                "verified by community",
                "everyone uses this",
                "no need to check",
                "pre-approved",
                "already validated",
            ]),
        },
    ]
}
