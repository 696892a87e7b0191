//! Validated descriptor model
//!
//! Values in this module have passed validation: patterns are parsed, the
//! trust condition is typed, and the provider is referenced explicitly.

use std::collections::{BTreeMap, BTreeSet};

use super::condition::TrustCondition;
use super::pattern::{ActionPattern, ResourcePattern, PARTITIONS};
use super::types::Effect;

/// Logical id of a provider declared in the same template
pub const PROVIDER_LOGICAL_ID: &str = "GitHubOidcProvider";

/// AWS-managed bundles that grant broad or administrative access
pub const ADMINISTRATIVE_BUNDLES: &[&str] = &["AdministratorAccess", "PowerUserAccess", "IAMFullAccess"];

/// OIDC identity provider declared by the descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProvider {
    pub issuer_url: String,
    pub audiences: BTreeSet<String>,
    pub thumbprints: BTreeSet<String>,
}

impl IdentityProvider {
    /// Host part of the issuer URL (the condition key prefix)
    pub fn issuer_host(&self) -> &str {
        issuer_host(&self.issuer_url).unwrap_or_default()
    }

    /// Reference handed to every role that trusts this provider
    pub fn reference(&self) -> ProviderRef {
        ProviderRef::Declared {
            logical_id: PROVIDER_LOGICAL_ID.to_string(),
            issuer_host: self.issuer_host().to_string(),
        }
    }
}

/// Host of an `https://host[/]` issuer URL
pub fn issuer_host(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("https://")?;
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// How a role points at the provider it trusts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderRef {
    /// Provider declared in the same template, referenced by logical id
    Declared { logical_id: String, issuer_host: String },
    /// Provider that already exists in the account
    Arn { arn: String, issuer_host: String },
}

impl ProviderRef {
    /// Parse `arn:<partition>:iam::<account>:oidc-provider/<host>`
    pub fn from_arn(arn: &str) -> Result<Self, String> {
        let parts: Vec<&str> = arn.splitn(6, ':').collect();
        if parts.len() != 6 || parts[0] != "arn" || parts[2] != "iam" || !parts[3].is_empty() {
            return Err(format!("'{}' is not an IAM ARN", arn));
        }
        if !PARTITIONS.contains(&parts[1]) {
            return Err(format!("'{}' has an unknown partition", arn));
        }
        let account = parts[4];
        if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("'{}' has an invalid account id", arn));
        }
        let host = parts[5]
            .strip_prefix("oidc-provider/")
            .filter(|h| !h.is_empty() && !h.contains('/'))
            .ok_or_else(|| format!("'{}' is not an oidc-provider ARN", arn))?;

        Ok(ProviderRef::Arn {
            arn: arn.to_string(),
            issuer_host: host.to_string(),
        })
    }

    pub fn issuer_host(&self) -> &str {
        match self {
            ProviderRef::Declared { issuer_host, .. } | ProviderRef::Arn { issuer_host, .. } => issuer_host,
        }
    }
}

/// Permission statement with parsed patterns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionStatement {
    pub sid: String,
    pub effect: Effect,
    pub actions: BTreeSet<ActionPattern>,
    pub resources: BTreeSet<ResourcePattern>,
}

impl PermissionStatement {
    /// Whether the statement applies to this action on this resource
    pub fn covers(&self, action: &str, resource: &str) -> bool {
        self.actions.iter().any(|a| a.matches(action))
            && self.resources.iter().any(|r| r.matches(resource))
    }

    /// `*` on `*`
    pub fn is_unrestricted(&self) -> bool {
        self.actions.iter().any(ActionPattern::is_any) && self.resources.iter().any(ResourcePattern::is_any)
    }
}

/// Named inline policy; statement order is kept as declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePolicy {
    pub name: String,
    pub statements: Vec<PermissionStatement>,
}

/// A managed permission bundle, always held as a full ARN
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManagedPolicy(String);

impl ManagedPolicy {
    /// AWS-managed bundle by name, e.g. `AdministratorAccess`
    pub fn aws_managed(name: &str) -> Self {
        Self(format!("arn:aws:iam::aws:policy/{}", name))
    }

    /// Accepts a bare AWS-managed name or a policy ARN
    pub fn parse(text: &str) -> Result<Self, String> {
        if text.is_empty() {
            return Err("managed policy is empty".to_string());
        }
        if !text.contains(':') {
            if text.chars().all(|c| c.is_ascii_alphanumeric() || "+=,.@_-/".contains(c)) {
                return Ok(Self::aws_managed(text));
            }
            return Err(format!("'{}' is not a managed policy name", text));
        }

        let parts: Vec<&str> = text.splitn(6, ':').collect();
        let valid = parts.len() == 6
            && parts[0] == "arn"
            && PARTITIONS.contains(&parts[1])
            && parts[2] == "iam"
            && parts[3].is_empty()
            && (parts[4] == "aws" || (parts[4].len() == 12 && parts[4].chars().all(|c| c.is_ascii_digit())))
            && parts[5].strip_prefix("policy/").is_some_and(|n| !n.is_empty());
        if valid {
            Ok(Self(text.to_string()))
        } else {
            Err(format!("'{}' is not a managed policy ARN", text))
        }
    }

    pub fn arn(&self) -> &str {
        &self.0
    }

    /// Last path segment of the ARN
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn is_aws_managed(&self) -> bool {
        self.0.contains(":iam::aws:policy/")
    }

    pub fn is_administrative(&self) -> bool {
        self.is_aws_managed() && ADMINISTRATIVE_BUNDLES.contains(&self.name())
    }
}

impl std::fmt::Display for ManagedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role that the CI system may assume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub description: Option<String>,
    pub provider: ProviderRef,
    pub condition: TrustCondition,
    pub max_session_duration: u32,
    pub path: String,
    pub inline_policies: Vec<InlinePolicy>,
    pub managed_policies: BTreeSet<ManagedPolicy>,
    pub tags: BTreeMap<String, String>,
    pub broad_access_opt_in: bool,
}

impl Role {
    /// Template logical id, derived from the role name
    pub fn logical_id(&self) -> String {
        let mut id: String = self.name.chars().filter(char::is_ascii_alphanumeric).collect();
        if id.is_empty() || id.starts_with(|c: char| c.is_ascii_digit()) {
            id.insert_str(0, "Deploy");
        }
        if !id.ends_with("Role") {
            id.push_str("Role");
        }
        id
    }

    /// All inline statements in declaration order
    pub fn statements(&self) -> impl Iterator<Item = &PermissionStatement> {
        self.inline_policies.iter().flat_map(|p| p.statements.iter())
    }
}

/// Descriptor that passed validation; the only input render accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDescriptor {
    /// Present when the descriptor declares the provider itself
    pub provider: Option<IdentityProvider>,
    pub role: Role,
}
