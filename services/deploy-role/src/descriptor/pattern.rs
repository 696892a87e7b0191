//! IAM wildcard patterns
//!
//! Actions (`s3:GetObject`, `ec2:Describe*`) and resources (`*`,
//! `arn:aws:s3:::infra-*`) both accept `*` (any run of characters) and `?`
//! (exactly one character). Action matching is case-insensitive, resource
//! matching is case-sensitive.

use regex::{Regex, RegexBuilder};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Partitions accepted in ARN patterns (besides a wildcard)
pub(crate) const PARTITIONS: &[&str] = &["aws", "aws-cn", "aws-us-gov"];

/// Errors produced while parsing a pattern
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("'{0}' is not a service:Action identifier")]
    InvalidAction(String),

    #[error("'{pattern}' is not '*' or an ARN pattern: {reason}")]
    InvalidResource { pattern: String, reason: String },

    #[error("cannot compile pattern '{pattern}': {reason}")]
    Compile { pattern: String, reason: String },
}

/// Returns true when the text contains an IAM wildcard character
pub fn has_wildcard(text: &str) -> bool {
    text.contains(['*', '?'])
}

/// Compile an IAM wildcard pattern into an anchored regex
pub fn compile_wildcard(pattern: &str, case_insensitive: bool) -> Result<Regex, PatternError> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    expr.push('$');

    RegexBuilder::new(&expr)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| PatternError::Compile {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// A permission action identifier, optionally with wildcards
#[derive(Debug, Clone)]
pub struct ActionPattern {
    text: String,
    matcher: Regex,
}

impl ActionPattern {
    /// Parse `*` or `service:Action` (e.g. `cloudformation:*`, `ec2:Describe*`)
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        if text.is_empty() {
            return Err(PatternError::Empty);
        }

        if text != "*" {
            let (service, action) = text
                .split_once(':')
                .ok_or_else(|| PatternError::InvalidAction(text.to_string()))?;

            let service_ok = !service.is_empty()
                && service
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-');
            let action_ok = !action.is_empty()
                && action
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '*' || c == '?');

            if !service_ok || !action_ok {
                return Err(PatternError::InvalidAction(text.to_string()));
            }
        }

        Ok(Self {
            text: text.to_string(),
            matcher: compile_wildcard(text, true)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Service prefix (`s3` for `s3:GetObject`), `None` for the lone `*`
    pub fn service(&self) -> Option<&str> {
        self.text.split_once(':').map(|(service, _)| service)
    }

    pub fn is_wildcard(&self) -> bool {
        has_wildcard(&self.text)
    }

    /// True for the lone `*`, which covers every action of every service
    pub fn is_any(&self) -> bool {
        self.text == "*"
    }

    pub fn matches(&self, action: &str) -> bool {
        self.matcher.is_match(action)
    }
}

/// A resource pattern: `*` or an ARN with optional wildcards
#[derive(Debug, Clone)]
pub struct ResourcePattern {
    text: String,
    matcher: Regex,
}

impl ResourcePattern {
    pub fn parse(text: &str) -> Result<Self, PatternError> {
        if text.is_empty() {
            return Err(PatternError::Empty);
        }

        if text != "*" {
            check_arn_pattern(text)?;
        }

        Ok(Self {
            text: text.to_string(),
            matcher: compile_wildcard(text, false)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_any(&self) -> bool {
        self.text == "*"
    }

    pub fn matches(&self, resource: &str) -> bool {
        self.matcher.is_match(resource)
    }
}

fn check_arn_pattern(text: &str) -> Result<(), PatternError> {
    let invalid = |reason: &str| PatternError::InvalidResource {
        pattern: text.to_string(),
        reason: reason.to_string(),
    };

    if text.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("contains whitespace"));
    }

    let parts: Vec<&str> = text.splitn(6, ':').collect();
    if parts.len() != 6 || parts[0] != "arn" {
        return Err(invalid("expected arn:partition:service:region:account:resource"));
    }

    let (partition, service, account, resource) = (parts[1], parts[2], parts[4], parts[5]);

    if !(PARTITIONS.contains(&partition) || has_wildcard(partition)) {
        return Err(invalid("unknown partition"));
    }
    if service.is_empty() {
        return Err(invalid("missing service"));
    }
    let account_ok = account.is_empty()
        || has_wildcard(account)
        || (account.len() == 12 && account.chars().all(|c| c.is_ascii_digit()))
        || account == "aws";
    if !account_ok {
        return Err(invalid("account must be empty, a wildcard or 12 digits"));
    }
    if resource.is_empty() {
        return Err(invalid("missing resource"));
    }

    Ok(())
}

macro_rules! pattern_identity {
    ($ty:ty) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.text == other.text
            }
        }

        impl Eq for $ty {}

        impl PartialOrd for $ty {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $ty {
            fn cmp(&self, other: &Self) -> Ordering {
                self.text.cmp(&other.text)
            }
        }

        impl Hash for $ty {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.text.hash(state);
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.text)
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.text)
            }
        }
    };
}

pattern_identity!(ActionPattern);
pattern_identity!(ResourcePattern);
