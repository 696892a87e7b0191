//! Validate, lint, render and apply in one step
//!
//! Nothing reaches the provisioning engine unless the descriptor validates
//! and, under a strict lint policy, produces no lint errors.

use thiserror::Error;
use tracing::{info, warn};

use crate::descriptor::{lint, Descriptor, DescriptorError, LintPolicy, LintReport, RenderError};
use crate::provisioner::{ApplyOutcome, ProvisionError, ProvisioningEngine};

pub const DEFAULT_STACK_NAME: &str = "IamRoleStack";

const MAX_STACK_NAME_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("lint rejected the descriptor: {}", .0.errors().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Lint(LintReport),

    #[error("invalid stack name '{0}': must start with a letter and contain only letters, digits and hyphens (max 128)")]
    InvalidStackName(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

/// What an apply produced, with the lint findings that did not block it
#[derive(Debug)]
pub struct DeployReport {
    pub outcome: ApplyOutcome,
    pub lint: LintReport,
}

/// CloudFormation stack names: `[A-Za-z][A-Za-z0-9-]*`, at most 128 chars
pub fn is_valid_stack_name(name: &str) -> bool {
    let mut chars = name.chars();
    name.len() <= MAX_STACK_NAME_LEN
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Run the full pipeline against `engine`
pub async fn deploy(
    engine: &dyn ProvisioningEngine,
    stack_name: &str,
    descriptor: &Descriptor,
    policy: LintPolicy,
) -> Result<DeployReport, DeployError> {
    if !is_valid_stack_name(stack_name) {
        return Err(DeployError::InvalidStackName(stack_name.to_string()));
    }

    let validated = descriptor.validate()?;
    let report = lint::check(&validated, policy);
    if report.has_errors() {
        warn!(role = %validated.role.name, errors = report.errors().count(), "❌ Lint errors, not applying");
        return Err(DeployError::Lint(report));
    }

    let template = validated.render()?;
    info!(role = %validated.role.name, stack = %stack_name, "Applying deploy role");
    let outcome = engine.apply(stack_name, &template).await?;

    Ok(DeployReport { outcome, lint: report })
}
