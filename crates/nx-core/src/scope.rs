#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Hierarchical name scope; segments are joined with `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameScope {
    segments: Vec<String>,
}

impl NameScope {
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// A scope rooted at `name`. Empty names open no scope.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::root().child(name)
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        let trimmed = name.trim_matches('/');
        if !trimmed.is_empty() {
            segments.push(trimmed.to_owned());
        }
        Self { segments }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Fully qualified name of `leaf` inside this scope.
    #[must_use]
    pub fn qualify(&self, leaf: &str) -> String {
        if self.segments.is_empty() {
            return leaf.to_owned();
        }
        if leaf.is_empty() {
            return self.segments.join("/");
        }
        format!("{}/{}", self.segments.join("/"), leaf)
    }
}

impl std::fmt::Display for NameScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}
