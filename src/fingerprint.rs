//! Content fingerprints used as cache keys
//!
//! A fingerprint is the SHA-256 of `(stage, normalized URL, config digest)`.
//! Config digests come from a canonical serialization of the relevant TOML
//! subtree with every table's keys sorted, so two configs that only differ in
//! key order produce the same digest.

use crate::config::Config;
use crate::state::Stage;
use crate::url::normalize_url;
use crate::UrlError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fmt::Write as _;
use url::Url;

/// Deterministic cache key for one stage of one URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of the hex encoding of a SHA-256 digest
    pub const LEN: usize = 64;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuilds a fingerprint from its hex form, e.g. a cache file name
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == Self::LEN
            && hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        valid.then(|| Self(hex.to_string()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of `url` for `stage` under `config_digest`
///
/// # Errors
///
/// Returns `UrlError` when the URL cannot be parsed or is not http(s).
///
/// # Example
///
/// ```
/// use summit_pipeline::fingerprint::fingerprint;
/// use summit_pipeline::Stage;
///
/// let a = fingerprint("HTTP://Example.com:80/", Stage::Collect, "digest").unwrap();
/// let b = fingerprint("http://example.com/", Stage::Collect, "digest").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn fingerprint(url: &str, stage: Stage, config_digest: &str) -> Result<Fingerprint, UrlError> {
    let normalized = normalize_url(url)?;
    Ok(fingerprint_normalized(&normalized, stage, config_digest))
}

/// Computes a fingerprint for a URL that has already been normalized
pub fn fingerprint_normalized(url: &Url, stage: Stage, config_digest: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(stage.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(url.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(config_digest.as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}

/// Hashes the canonical serialization of a TOML value
pub fn config_digest(value: &toml::Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Writes `value` with sorted table keys and explicit type markers
fn write_canonical(value: &toml::Value, out: &mut String) {
    match value {
        toml::Value::String(s) => write_quoted(s, out),
        toml::Value::Integer(i) => {
            let _ = write!(out, "i{}", i);
        }
        toml::Value::Float(f) => {
            let _ = write!(out, "f{:?}", f);
        }
        toml::Value::Boolean(b) => {
            let _ = write!(out, "b{}", b);
        }
        toml::Value::Datetime(d) => {
            let _ = write!(out, "d{}", d);
        }
        toml::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        toml::Value::Table(table) => {
            let mut entries: Vec<(&String, &toml::Value)> = table.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_quoted(key, out);
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

fn write_quoted(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

/// Per-stage config digests
///
/// Each digest covers the collaborator name and settings of its own stage and
/// of every upstream stage, so changing how content is collected also changes
/// the keys of the processed and analyzed results built on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDigests {
    collect: String,
    process: String,
    analyze: String,
}

impl StageDigests {
    pub fn from_config(config: &Config) -> Self {
        let names = &config.collectors;
        let stages = &config.stages;

        let parts = [
            (Stage::Collect, names.collector.as_str(), &stages.collect),
            (Stage::Process, names.processor.as_str(), &stages.process),
            (Stage::Analyze, names.analyzer.as_str(), &stages.analyze),
        ];

        let mut cumulative = toml::Table::new();
        let mut digests = Vec::with_capacity(parts.len());
        for (stage, collaborator, settings) in parts {
            let mut part = toml::Table::new();
            part.insert("collaborator".to_string(), collaborator.into());
            part.insert("settings".to_string(), toml::Value::Table(settings.clone()));
            cumulative.insert(stage.as_str().to_string(), toml::Value::Table(part));
            digests.push(config_digest(&toml::Value::Table(cumulative.clone())));
        }

        let mut digests = digests.into_iter();
        Self {
            collect: digests.next().unwrap_or_default(),
            process: digests.next().unwrap_or_default(),
            analyze: digests.next().unwrap_or_default(),
        }
    }

    pub fn get(&self, stage: Stage) -> &str {
        match stage {
            Stage::Collect => &self.collect,
            Stage::Process => &self.process,
            Stage::Analyze => &self.analyze,
        }
    }

    /// Fingerprint of `url` for `stage` under these digests
    pub fn fingerprint(&self, url: &Url, stage: Stage) -> Fingerprint {
        fingerprint_normalized(url, stage, self.get(stage))
    }
}
