//! Effective permission set of a role
//!
//! The role's grants are the union of every inline Allow statement and every
//! resolvable managed bundle. A matching Deny always wins. Bundles whose
//! contents are not known locally never make a query "denied": the answer is
//! `Unresolved` instead.

use serde::Serialize;

use super::model::{ManagedPolicy, PermissionStatement, Role};
use super::types::Effect;

/// Outcome of evaluating one action on one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "bundles")]
pub enum Decision {
    Allowed,
    ExplicitlyDenied,
    ImplicitlyDenied,
    /// No local grant matched, but these bundles could not be inspected
    Unresolved(Vec<String>),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allowed => write!(f, "allowed"),
            Decision::ExplicitlyDenied => write!(f, "explicitly denied"),
            Decision::ImplicitlyDenied => write!(f, "implicitly denied"),
            Decision::Unresolved(bundles) => write!(f, "unresolved (depends on {})", bundles.join(", ")),
        }
    }
}

/// What a managed bundle is known to grant
enum BundleGrant {
    /// `*` on `*`
    Everything,
    /// Every action of one service on `*`
    Service(&'static str),
    Unknown,
}

fn bundle_grant(policy: &ManagedPolicy) -> BundleGrant {
    if !policy.is_aws_managed() {
        return BundleGrant::Unknown;
    }
    match policy.name() {
        "AdministratorAccess" => BundleGrant::Everything,
        "IAMFullAccess" => BundleGrant::Service("iam"),
        _ => BundleGrant::Unknown,
    }
}

/// Union of a role's inline statements and managed bundles
pub struct EffectivePermissions<'a> {
    statements: Vec<&'a PermissionStatement>,
    bundles: Vec<&'a ManagedPolicy>,
}

impl Role {
    pub fn effective_permissions(&self) -> EffectivePermissions<'_> {
        EffectivePermissions {
            statements: self.statements().collect(),
            bundles: self.managed_policies.iter().collect(),
        }
    }
}

impl EffectivePermissions<'_> {
    /// Evaluate `action` on `resource`
    pub fn evaluate(&self, action: &str, resource: &str) -> Decision {
        let matching = |effect: Effect| {
            self.statements
                .iter()
                .any(|s| s.effect == effect && s.covers(action, resource))
        };

        if matching(Effect::Deny) {
            return Decision::ExplicitlyDenied;
        }
        if matching(Effect::Allow) || self.bundle_allows(action) {
            return Decision::Allowed;
        }

        let unresolved: Vec<String> = self
            .bundles
            .iter()
            .filter(|b| matches!(bundle_grant(b), BundleGrant::Unknown))
            .map(|b| b.arn().to_string())
            .collect();
        if unresolved.is_empty() {
            Decision::ImplicitlyDenied
        } else {
            Decision::Unresolved(unresolved)
        }
    }

    /// True when some grant covers every action on every resource
    pub fn is_unrestricted(&self) -> bool {
        let has_deny = self.statements.iter().any(|s| s.effect == Effect::Deny);
        let grants_all = self
            .statements
            .iter()
            .any(|s| s.effect == Effect::Allow && s.is_unrestricted())
            || self
                .bundles
                .iter()
                .any(|b| matches!(bundle_grant(b), BundleGrant::Everything));
        grants_all && !has_deny
    }

    /// Action patterns granted by inline Allow statements, sorted
    pub fn allowed_actions(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = self
            .statements
            .iter()
            .filter(|s| s.effect == Effect::Allow)
            .flat_map(|s| s.actions.iter().map(|a| a.as_str()))
            .collect();
        actions.sort_unstable();
        actions.dedup();
        actions
    }

    fn bundle_allows(&self, action: &str) -> bool {
        self.bundles.iter().any(|b| match bundle_grant(b) {
            BundleGrant::Everything => true,
            BundleGrant::Service(service) => action
                .split_once(':')
                .is_some_and(|(prefix, _)| prefix.eq_ignore_ascii_case(service)),
            BundleGrant::Unknown => false,
        })
    }
}
