//! Trust condition: which federated tokens may assume the role
//!
//! A condition maps each recognised claim to exactly one rule. A rule has one
//! operator (`StringEquals` or `StringLike`) and one or more accepted values;
//! a token satisfies the condition when every rule accepts its claim.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use super::pattern::{compile_wildcard, PatternError};

/// Token claims the trust condition may constrain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Claim {
    /// Intended audience of the token
    Aud,
    /// Repository + ref identity, e.g. `repo:acme/infra:ref:refs/heads/main`
    Sub,
}

impl Claim {
    pub const ALL: [Claim; 2] = [Claim::Aud, Claim::Sub];

    pub fn as_str(&self) -> &'static str {
        match self {
            Claim::Aud => "aud",
            Claim::Sub => "sub",
        }
    }

    /// Parse a condition key, either bare (`sub`) or issuer-qualified
    /// (`token.actions.githubusercontent.com:sub`).
    pub fn parse_key(key: &str, issuer_host: &str) -> Result<Self, String> {
        let bare = match key.rsplit_once(':') {
            Some((host, claim)) if host == issuer_host => claim,
            Some((host, _)) => {
                return Err(format!(
                    "condition key '{}' is qualified with '{}' but the provider issuer is '{}'",
                    key, host, issuer_host
                ))
            }
            None => key,
        };

        Claim::ALL
            .into_iter()
            .find(|claim| claim.as_str() == bare)
            .ok_or_else(|| format!("unrecognised claim '{}' (expected aud or sub)", key))
    }

    /// Condition key as the platform expects it: `<issuer host>:<claim>`
    pub fn qualified(&self, issuer_host: &str) -> String {
        format!("{}:{}", issuer_host, self.as_str())
    }
}

impl std::fmt::Display for Claim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a claim value is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatchOperator {
    /// Exact, case-sensitive string comparison
    StringEquals,
    /// Case-sensitive comparison with `*` / `?` wildcards
    StringLike,
}

impl MatchOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOperator::StringEquals => "StringEquals",
            MatchOperator::StringLike => "StringLike",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "StringEquals" => Some(MatchOperator::StringEquals),
            "StringLike" => Some(MatchOperator::StringLike),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operator and its accepted values for a single claim
#[derive(Debug, Clone)]
pub struct ClaimRule {
    operator: MatchOperator,
    values: BTreeSet<String>,
    matchers: Vec<Regex>,
}

impl ClaimRule {
    pub fn new<I, S>(operator: MatchOperator, values: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        let matchers = match operator {
            MatchOperator::StringEquals => Vec::new(),
            MatchOperator::StringLike => values
                .iter()
                .map(|v| compile_wildcard(v, false))
                .collect::<Result<_, _>>()?,
        };

        Ok(Self {
            operator,
            values,
            matchers,
        })
    }

    pub fn operator(&self) -> MatchOperator {
        self.operator
    }

    pub fn values(&self) -> &BTreeSet<String> {
        &self.values
    }

    /// True when any accepted value matches the claim
    pub fn accepts(&self, claim_value: &str) -> bool {
        match self.operator {
            MatchOperator::StringEquals => self.values.contains(claim_value),
            MatchOperator::StringLike => self.matchers.iter().any(|m| m.is_match(claim_value)),
        }
    }
}

impl PartialEq for ClaimRule {
    fn eq(&self, other: &Self) -> bool {
        self.operator == other.operator && self.values == other.values
    }
}

impl Eq for ClaimRule {}

/// Raised when a second rule is inserted for a claim that already has one
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("claim '{claim}' already governed by {existing}, refusing to add {incoming}")]
pub struct ConditionConflict {
    pub claim: Claim,
    pub existing: MatchOperator,
    pub incoming: MatchOperator,
}

impl ConditionConflict {
    /// Exact and wildcard semantics on the same claim cannot be evaluated
    /// unambiguously; a repeated operator is merely a duplicate.
    pub fn is_ambiguous(&self) -> bool {
        self.existing != self.incoming
    }
}

/// Claims presented by a federated token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub aud: String,
    pub sub: String,
}

impl TokenClaims {
    pub fn new(aud: impl Into<String>, sub: impl Into<String>) -> Self {
        Self {
            aud: aud.into(),
            sub: sub.into(),
        }
    }

    pub fn get(&self, claim: Claim) -> &str {
        match claim {
            Claim::Aud => &self.aud,
            Claim::Sub => &self.sub,
        }
    }
}

/// Typed trust condition: at most one rule per claim
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustCondition {
    rules: BTreeMap<Claim, ClaimRule>,
}

impl TrustCondition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the rule for a claim. Never merges with an existing rule.
    pub fn insert(&mut self, claim: Claim, rule: ClaimRule) -> Result<(), ConditionConflict> {
        if let Some(existing) = self.rules.get(&claim) {
            return Err(ConditionConflict {
                claim,
                existing: existing.operator,
                incoming: rule.operator,
            });
        }
        self.rules.insert(claim, rule);
        Ok(())
    }

    pub fn rule(&self, claim: Claim) -> Option<&ClaimRule> {
        self.rules.get(&claim)
    }

    pub fn rules(&self) -> impl Iterator<Item = (Claim, &ClaimRule)> {
        self.rules.iter().map(|(claim, rule)| (*claim, rule))
    }

    /// Whether a token with these claims may assume the role
    pub fn admits(&self, token: &TokenClaims) -> bool {
        !self.rules.is_empty()
            && self
                .rules
                .iter()
                .all(|(claim, rule)| rule.accepts(token.get(*claim)))
    }

    /// Condition block grouped by operator, keys qualified with the issuer host
    pub fn by_operator(&self, issuer_host: &str) -> BTreeMap<MatchOperator, BTreeMap<String, Vec<&str>>> {
        let mut blocks: BTreeMap<MatchOperator, BTreeMap<String, Vec<&str>>> = BTreeMap::new();
        for (claim, rule) in &self.rules {
            blocks.entry(rule.operator).or_default().insert(
                claim.qualified(issuer_host),
                rule.values.iter().map(String::as_str).collect(),
            );
        }
        blocks
    }
}
