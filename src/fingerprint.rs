//! Client fingerprinting for traffic dedup and fraud heuristics.
//!
//! The fingerprint is a low-entropy digest over coarse environment signals.
//! It deliberately excludes anything directly identifying (no addresses, no
//! stored user ids) and is stable for the lifetime of one client session.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Placeholder substituted for any signal that cannot be read.
const UNAVAILABLE: &str = "unavailable";

/// Hex length of the emitted digest. Truncated to keep entropy low.
const DIGEST_LEN: usize = 32;

/// An opaque, session-stable client signal digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientFingerprint(String);

impl ClientFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of coarse environment signals.
///
/// Every accessor is fallible by contract: a `None` is substituted with a
/// fixed placeholder so fingerprint generation can never block ad loading.
pub trait SignalSource {
    /// UTC offset of the local clock, e.g. `"+02:00"`.
    fn timezone(&self) -> Option<String>;
    /// Configured locale, e.g. `"en_US.UTF-8"`.
    fn locale(&self) -> Option<String>;
    /// Operating system and architecture, e.g. `"linux/x86_64"`.
    fn platform(&self) -> Option<String>;
    /// Available hardware parallelism.
    fn parallelism(&self) -> Option<String>;
    /// Rendering-surface hint (terminal/display class of the embedding).
    fn surface(&self) -> Option<String>;
}

/// Default signal source reading the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSignals;

impl SignalSource for EnvSignals {
    fn timezone(&self) -> Option<String> {
        let offset = *chrono::Local::now().offset();
        Some(offset.to_string())
    }

    fn locale(&self) -> Option<String> {
        std::env::var("LANG").ok().filter(|s| !s.is_empty())
    }

    fn platform(&self) -> Option<String> {
        Some(format!(
            "{}/{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ))
    }

    fn parallelism(&self) -> Option<String> {
        std::thread::available_parallelism()
            .ok()
            .map(|n| n.get().to_string())
    }

    fn surface(&self) -> Option<String> {
        std::env::var("TERM").ok().filter(|s| !s.is_empty())
    }
}

/// Derive a fingerprint from the given signal source.
///
/// Deterministic for a fixed set of signal values. Unavailable signals are
/// replaced by a placeholder rather than failing generation.
pub fn generate(source: &impl SignalSource) -> ClientFingerprint {
    let joined = [
        source.timezone(),
        source.locale(),
        source.platform(),
        source.parallelism(),
        source.surface(),
    ]
    .into_iter()
    .map(|signal| signal.unwrap_or_else(|| UNAVAILABLE.to_string()))
    .collect::<Vec<_>>()
    .join("|");

    let digest = Keccak256::digest(joined.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(DIGEST_LEN);
    ClientFingerprint(hex)
}
