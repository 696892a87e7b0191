//! Descriptor errors

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Class of a single validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Structural or syntactic defect
    Malformed,
    /// Exact and wildcard semantics combined on one claim
    Ambiguous,
}

/// One problem found while validating, with its location in the descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub location: String,
    pub reason: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.reason)
    }
}

fn list(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validation failure. Always carries every violation found, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("malformed descriptor ({} violation(s)): {}", .0.len(), list(.0))]
    MalformedDescriptor(Vec<Violation>),

    #[error("ambiguous trust condition ({} violation(s)): {}", .0.len(), list(.0))]
    AmbiguousTrustCondition(Vec<Violation>),
}

impl DescriptorError {
    pub fn violations(&self) -> &[Violation] {
        match self {
            DescriptorError::MalformedDescriptor(v) | DescriptorError::AmbiguousTrustCondition(v) => v,
        }
    }
}

/// Failure turning a validated descriptor into template JSON
#[derive(Debug, Error)]
#[error("failed to render template: {0}")]
pub struct RenderError(#[from] pub serde_json::Error);

/// Errors reading or writing descriptor files
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read descriptor '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON descriptor '{}': {source}", .path.display())]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse TOML descriptor '{}': {source}", .path.display())]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize descriptor: {0}")]
    Serialize(String),
}
