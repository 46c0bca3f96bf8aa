#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Engine limits. Input shapes are caller-controlled, so recursion depth is
/// capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NestConfig {
    pub max_depth: usize,
}

impl Default for NestConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl NestConfig {
    /// Defaults, with `NX_MAX_NEST_DEPTH` overriding the depth limit when it
    /// holds a positive integer.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("NX_MAX_NEST_DEPTH")
            && let Ok(parsed) = raw.parse::<usize>()
            && parsed > 0
        {
            config.max_depth = parsed;
        }
        config
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
