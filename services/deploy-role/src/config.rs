//! Tool configuration from the environment
//!
//! Environment variables:
//! - `DEPLOY_ROLE_DESCRIPTOR` (required): path to the descriptor (JSON or TOML)
//! - `DEPLOY_ROLE_STRICT`: `true`/`1` promotes lint findings to errors
//! - `DEPLOY_ROLE_STACK_NAME`: stack to deploy (default `IamRoleStack`)
//! - `AWS_REGION`, `AWS_PROFILE`: forwarded to the provisioning engine

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::deploy::DEFAULT_STACK_NAME;
use crate::descriptor::LintPolicy;
use crate::provisioner::CloudFormationCli;

pub const DESCRIPTOR_VAR: &str = "DEPLOY_ROLE_DESCRIPTOR";
pub const STRICT_VAR: &str = "DEPLOY_ROLE_STRICT";
pub const STACK_NAME_VAR: &str = "DEPLOY_ROLE_STACK_NAME";
pub const REGION_VAR: &str = "AWS_REGION";
pub const PROFILE_VAR: &str = "AWS_PROFILE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub descriptor: PathBuf,
    pub strict: bool,
    pub stack_name: String,
    pub region: Option<String>,
    pub profile: Option<String>,
}

impl ToolConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(&HashMap::new())
    }

    /// Environment variables, with `overrides` (e.g. command-line values) taking precedence
    pub fn from_env_with(overrides: &HashMap<&str, String>) -> Result<Self> {
        Self::from_lookup(|name| overrides.get(name).cloned().or_else(|| env::var(name).ok()))
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let descriptor = lookup(DESCRIPTOR_VAR)
            .filter(|v| !v.is_empty())
            .with_context(|| format!("{} not set", DESCRIPTOR_VAR))?;

        let strict = match lookup(STRICT_VAR) {
            Some(value) => parse_flag(&value).with_context(|| format!("{} is not a boolean", STRICT_VAR))?,
            None => false,
        };

        Ok(Self {
            descriptor: PathBuf::from(descriptor),
            strict,
            stack_name: lookup(STACK_NAME_VAR)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_STACK_NAME.to_string()),
            region: lookup(REGION_VAR).filter(|v| !v.is_empty()),
            profile: lookup(PROFILE_VAR).filter(|v| !v.is_empty()),
        })
    }

    pub fn lint_policy(&self) -> LintPolicy {
        LintPolicy { strict: self.strict }
    }

    /// Provisioning engine targeting the configured region and profile
    pub fn engine(&self) -> CloudFormationCli {
        CloudFormationCli::new()
            .with_region(self.region.clone())
            .with_profile(self.profile.clone())
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("unrecognised flag value '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ToolConfig::from_lookup(lookup(&[(DESCRIPTOR_VAR, "role.json")])).unwrap();
        assert_eq!(config.descriptor, PathBuf::from("role.json"));
        assert!(!config.strict);
        assert_eq!(config.stack_name, "IamRoleStack");
        assert_eq!(config.region, None);
        assert_eq!(config.lint_policy(), LintPolicy::default());
    }

    #[test]
    fn test_all_variables() {
        let config = ToolConfig::from_lookup(lookup(&[
            (DESCRIPTOR_VAR, "ci/role.toml"),
            (STRICT_VAR, "TRUE"),
            (STACK_NAME_VAR, "ci-deploy-role"),
            (REGION_VAR, "us-east-1"),
            (PROFILE_VAR, "ops"),
        ]))
        .unwrap();

        assert!(config.strict);
        assert_eq!(config.stack_name, "ci-deploy-role");
        assert_eq!(config.region.as_deref(), Some("us-east-1"));
        assert_eq!(config.profile.as_deref(), Some("ops"));
    }

    #[test]
    fn test_overrides_win_over_environment() {
        // Only overridden fields are asserted; the rest may come from the real environment
        let overrides = HashMap::from([
            (DESCRIPTOR_VAR, "from-cli.json".to_string()),
            (STRICT_VAR, "yes".to_string()),
            (STACK_NAME_VAR, "cli-stack".to_string()),
        ]);
        let config = ToolConfig::from_env_with(&overrides).unwrap();

        assert_eq!(config.descriptor, PathBuf::from("from-cli.json"));
        assert!(config.strict);
        assert_eq!(config.lint_policy(), LintPolicy::strict());
        assert_eq!(config.stack_name, "cli-stack");
    }

    #[test]
    fn test_missing_descriptor_and_bad_flag() {
        let err = ToolConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains(DESCRIPTOR_VAR));

        let err = ToolConfig::from_lookup(lookup(&[(DESCRIPTOR_VAR, "r.json"), (STRICT_VAR, "maybe")])).unwrap_err();
        assert!(err.to_string().contains(STRICT_VAR));
    }
}
