//! Trust & permission descriptor
//!
//! A descriptor declares one OIDC federation (GitHub Actions -> AWS) and the
//! role the CI system may assume through it. The pipeline is
//! load -> [`Descriptor::validate`] -> [`lint::check`] -> [`ValidatedDescriptor::render`],
//! with [`diff::plan`] comparing two validated descriptors field by field.
//!
//! ## Security
//!
//! The defaults are restrictive: exact-match subject pinned to one branch,
//! scoped actions and resources, no managed bundles. Wildcard subjects and
//! administrative bundles are reported by the linter and must be opted into
//! explicitly with `broad_access_opt_in`.

pub mod condition;
pub mod diff;
pub mod effective;
pub mod error;
pub mod lint;
pub mod load;
pub mod model;
pub mod pattern;
pub mod presets;
pub mod render;
pub mod types;
mod validate;

pub use condition::{Claim, ClaimRule, MatchOperator, TokenClaims, TrustCondition};
pub use diff::{plan, ChangeAction, FieldChange, Plan, ResourceChange};
pub use effective::{Decision, EffectivePermissions};
pub use error::{DescriptorError, LoadError, RenderError, Violation, ViolationKind};
pub use lint::{Finding, FindingKind, LintPolicy, LintReport, Severity};
pub use load::DescriptorFormat;
pub use model::{
    IdentityProvider, InlinePolicy, ManagedPolicy, PermissionStatement, ProviderRef, Role,
    ValidatedDescriptor,
};
pub use render::RenderedTemplate;
pub use types::{
    ConditionValue, Descriptor, Effect, InlinePolicyConfig, ProviderConfig, ProviderSource,
    RoleConfig, StatementConfig,
};
pub use validate::validate;

/// GitHub Actions OIDC token issuer
pub const GITHUB_ISSUER_URL: &str = "https://token.actions.githubusercontent.com";

/// Host of [`GITHUB_ISSUER_URL`], the prefix of its condition keys
pub const GITHUB_ISSUER_HOST: &str = "token.actions.githubusercontent.com";

/// Audience AWS STS expects in federated tokens
pub const FEDERATION_AUDIENCE: &str = "sts.amazonaws.com";

/// Action granted to the federated principal by the trust policy
pub const ASSUME_ROLE_ACTION: &str = "sts:AssumeRoleWithWebIdentity";

/// IAM policy language version
pub const POLICY_VERSION: &str = "2012-10-17";

/// Session bounds enforced by the platform (1h ..= 12h)
pub const MIN_SESSION_SECS: u32 = 3600;
pub const MAX_SESSION_SECS: u32 = 43_200;
pub const DEFAULT_MAX_SESSION_SECS: u32 = 3600;
