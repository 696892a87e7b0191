//! Least-privilege linter
//!
//! Runs on validated descriptors only. Findings never block rendering by
//! themselves; the caller decides via [`LintReport::has_errors`].

use serde::Serialize;
use tracing::warn;

use super::condition::{Claim, MatchOperator};
use super::model::ValidatedDescriptor;
use super::pattern::has_wildcard;
use super::types::Effect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// `sub` matched with `StringLike` and a wildcard
    WildcardSubject,
    /// Broad AWS-managed bundle attached
    AdministrativeBundle,
    /// Allow statement granting `*` on `*`
    FullWildcardStatement,
    /// `iam:PassRole` allowed on any resource
    PassRoleOnAnyResource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub location: String,
    pub message: String,
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{:?}] {}: {}", self.severity, self.kind, self.location, self.message)
    }
}

/// How findings are graded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LintPolicy {
    /// Promote findings to errors unless the descriptor opted into broad access
    pub strict: bool,
}

impl LintPolicy {
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LintReport {
    pub findings: Vec<Finding>,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Error)
    }

    pub fn has(&self, kind: FindingKind) -> bool {
        self.findings.iter().any(|f| f.kind == kind)
    }
}

/// Lint a validated descriptor
pub fn check(descriptor: &ValidatedDescriptor, policy: LintPolicy) -> LintReport {
    let role = &descriptor.role;
    let severity = if policy.strict && !role.broad_access_opt_in {
        Severity::Error
    } else {
        Severity::Warning
    };

    let mut findings = Vec::new();
    let mut report = |kind: FindingKind, location: String, message: String| {
        warn!(role = %role.name, ?kind, %location, "⚠️ {}", message);
        findings.push(Finding {
            kind,
            severity,
            location,
            message,
        });
    };

    if let Some(rule) = role.condition.rule(Claim::Sub) {
        if rule.operator() == MatchOperator::StringLike && rule.values().iter().any(|v| has_wildcard(v)) {
            let values: Vec<&str> = rule.values().iter().map(String::as_str).collect();
            report(
                FindingKind::WildcardSubject,
                "role.condition.sub".to_string(),
                format!("subject accepts wildcard values {:?}", values),
            );
        }
    }

    for bundle in role.managed_policies.iter().filter(|b| b.is_administrative()) {
        report(
            FindingKind::AdministrativeBundle,
            "role.managed_policies".to_string(),
            format!("administrative bundle '{}' attached", bundle.arn()),
        );
    }

    for (p, inline) in role.inline_policies.iter().enumerate() {
        for (s, statement) in inline.statements.iter().enumerate() {
            if statement.effect != Effect::Allow {
                continue;
            }
            let location = format!("role.inline_policies[{}].statements[{}]", p, s);

            if statement.is_unrestricted() {
                report(
                    FindingKind::FullWildcardStatement,
                    location,
                    format!("statement '{}' allows every action on every resource", statement.sid),
                );
                continue;
            }

            let passes_role = statement.actions.iter().any(|a| a.matches("iam:PassRole"));
            let any_resource = statement.resources.iter().any(|r| r.is_any());
            if passes_role && any_resource {
                report(
                    FindingKind::PassRoleOnAnyResource,
                    location,
                    format!("statement '{}' allows iam:PassRole on any resource", statement.sid),
                );
            }
        }
    }

    LintReport { findings }
}
