use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three cached stages of a job's pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Collect,
    Process,
    Analyze,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 3] = [Stage::Collect, Stage::Process, Stage::Analyze];

    /// Stable identifier used in fingerprints and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collect => "collect",
            Self::Process => "process",
            Self::Analyze => "analyze",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "collect" => Some(Self::Collect),
            "process" => Some(Self::Process),
            "analyze" => Some(Self::Analyze),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
