//! Descriptor file types
//!
//! The shape a descriptor has on disk (JSON or TOML). Nothing here is
//! trusted: values stay as written until [`Descriptor::validate`] turns them
//! into the typed model in [`super::model`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{DEFAULT_MAX_SESSION_SECS, FEDERATION_AUDIENCE, GITHUB_ISSUER_URL};

/// One deployable trust + role pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Descriptor {
    /// Where the OIDC provider comes from
    pub provider: ProviderSource,
    /// The role the CI system may assume
    pub role: RoleConfig,
}

/// The OIDC provider is either declared here or referenced by ARN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ProviderSource {
    /// Declare the provider alongside the role
    Managed(ProviderConfig),
    /// Provider already exists in the account and is shared between roles
    Existing { arn: String },
}

/// OIDC identity provider attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default = "default_issuer_url")]
    pub issuer_url: String,

    /// Accepted token audiences (client id list)
    #[serde(default = "default_audiences")]
    pub audiences: Vec<String>,

    /// Optional server certificate thumbprints (40 hex chars each)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thumbprints: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            issuer_url: default_issuer_url(),
            audiences: default_audiences(),
            thumbprints: Vec::new(),
        }
    }
}

fn default_issuer_url() -> String {
    GITHUB_ISSUER_URL.to_string()
}

fn default_audiences() -> Vec<String> {
    vec![FEDERATION_AUDIENCE.to_string()]
}

/// Role attributes as written in the descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Upper bound on one assumed session, in seconds
    #[serde(default = "default_max_session")]
    pub max_session_duration: u32,

    #[serde(default = "default_path")]
    pub path: String,

    /// Acknowledges a deliberately broad posture (wildcard subject,
    /// administrative bundle). Never set by the restrictive preset.
    #[serde(default)]
    pub broad_access_opt_in: bool,

    /// Operator -> claim key -> value(s), the way the platform writes it
    pub condition: RawCondition,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inline_policies: Vec<InlinePolicyConfig>,

    /// Managed policy ARNs, or bare AWS-managed policy names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_policies: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

fn default_max_session() -> u32 {
    DEFAULT_MAX_SESSION_SECS
}

fn default_path() -> String {
    "/".to_string()
}

/// Untyped trust condition, e.g.
/// `{"StringEquals": {"token.actions.githubusercontent.com:aud": "sts.amazonaws.com"}}`
pub type RawCondition = BTreeMap<String, BTreeMap<String, ConditionValue>>;

/// A condition value: one string or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    One(String),
    Many(Vec<String>),
}

impl ConditionValue {
    pub fn values(&self) -> Vec<&str> {
        match self {
            ConditionValue::One(v) => vec![v.as_str()],
            ConditionValue::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::One(value.to_string())
    }
}

/// A named inline policy document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InlinePolicyConfig {
    pub name: String,
    pub statements: Vec<StatementConfig>,
}

/// A permission statement as written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatementConfig {
    pub sid: String,

    #[serde(default)]
    pub effect: Effect,

    pub actions: Vec<String>,

    pub resources: Vec<String>,
}

impl StatementConfig {
    pub fn allow<A, R>(sid: &str, actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            sid: sid.to_string(),
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }
}

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Allow => write!(f, "Allow"),
            Effect::Deny => write!(f, "Deny"),
        }
    }
}
