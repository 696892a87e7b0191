//! Provisioning engine seam
//!
//! The rendered template is handed to an external engine that owns
//! deployment state. The shipped engine shells out to the AWS CLI
//! (`aws cloudformation deploy`). Failures are surfaced with the engine's
//! stderr untouched and are never retried here.

use async_trait::async_trait;
use std::io::Write;
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::descriptor::RenderedTemplate;

/// Message the CLI prints when the change set is empty
const NO_CHANGES_MARKER: &str = "No changes to deploy";

/// Result of a successful apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The engine created or updated the stack
    Applied,
    /// The deployed stack already matches the template
    NoChange,
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to launch provisioning engine '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to stage template for the provisioning engine: {0}")]
    Stage(#[source] std::io::Error),

    /// The engine ran and reported failure. `stderr` is passed through verbatim.
    #[error("external provisioning failure (exit status {}): {stderr}", .status.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    ExternalProvisioningFailure { status: Option<i32>, stderr: String },
}

/// Something that can deploy a rendered template as a named stack
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    async fn apply(&self, stack_name: &str, template: &RenderedTemplate) -> Result<ApplyOutcome, ProvisionError>;
}

/// `aws cloudformation deploy` driven through the AWS CLI
#[derive(Debug, Clone)]
pub struct CloudFormationCli {
    program: String,
    region: Option<String>,
    profile: Option<String>,
}

impl Default for CloudFormationCli {
    fn default() -> Self {
        Self {
            program: "aws".to_string(),
            region: None,
            profile: None,
        }
    }
}

impl CloudFormationCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable (tests, wrapped CLIs)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    fn args(&self, stack_name: &str, template_file: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "cloudformation",
            "deploy",
            "--template-file",
            template_file,
            "--stack-name",
            stack_name,
            "--capabilities",
            "CAPABILITY_NAMED_IAM",
            "--no-fail-on-empty-changeset",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if let Some(region) = &self.region {
            args.extend(["--region".to_string(), region.clone()]);
        }
        if let Some(profile) = &self.profile {
            args.extend(["--profile".to_string(), profile.clone()]);
        }
        args
    }
}

#[async_trait]
impl ProvisioningEngine for CloudFormationCli {
    async fn apply(&self, stack_name: &str, template: &RenderedTemplate) -> Result<ApplyOutcome, ProvisionError> {
        // The file must outlive the child process
        let mut staged = tempfile::Builder::new()
            .prefix("deploy-role-")
            .suffix(".json")
            .tempfile()
            .map_err(ProvisionError::Stage)?;
        staged
            .write_all(template.as_str().as_bytes())
            .and_then(|_| staged.flush())
            .map_err(ProvisionError::Stage)?;

        let template_file = staged.path().to_string_lossy().to_string();
        let args = self.args(stack_name, &template_file);
        info!(stack = %stack_name, program = %self.program, "🚀 Handing template to provisioning engine");
        debug!(?args, "engine arguments");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|source| ProvisionError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        classify(output.status, &stdout, &stderr)
    }
}

/// Map the engine's exit status and output to an outcome
fn classify(status: ExitStatus, stdout: &str, stderr: &str) -> Result<ApplyOutcome, ProvisionError> {
    if !status.success() {
        return Err(ProvisionError::ExternalProvisioningFailure {
            status: status.code(),
            stderr: stderr.to_string(),
        });
    }

    if stdout.contains(NO_CHANGES_MARKER) {
        info!("✅ Stack already up to date");
        Ok(ApplyOutcome::NoChange)
    } else {
        info!("✅ Stack deployed");
        Ok(ApplyOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(unix)]
    #[test]
    fn test_classify() {
        assert_eq!(
            classify(status(0), "Waiting for changeset...\nSuccessfully created/updated stack", "").unwrap(),
            ApplyOutcome::Applied
        );
        assert_eq!(
            classify(status(0), "\nNo changes to deploy. Stack IamRoleStack is up to date\n", "").unwrap(),
            ApplyOutcome::NoChange
        );

        let stderr = "\nAn error occurred (ValidationError) when calling the CreateChangeSet operation: Role name exists\n";
        match classify(status(255), "", stderr) {
            Err(ProvisionError::ExternalProvisioningFailure { status, stderr: captured }) => {
                assert_eq!(status, Some(255));
                assert_eq!(captured, stderr);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_args_carry_iam_capability_and_optional_target() {
        let cli = CloudFormationCli::new()
            .with_region(Some("eu-west-1".to_string()))
            .with_profile(None);
        let args = cli.args("IamRoleStack", "/tmp/t.json");

        assert_eq!(&args[..2], &["cloudformation", "deploy"]);
        assert!(args.windows(2).any(|w| w == ["--capabilities", "CAPABILITY_NAMED_IAM"]));
        assert!(args.contains(&"--no-fail-on-empty-changeset".to_string()));
        assert!(args.windows(2).any(|w| w == ["--region", "eu-west-1"]));
        assert!(!args.contains(&"--profile".to_string()));
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let cli = CloudFormationCli::new().with_program("deploy-role-no-such-binary");
        let template = crate::descriptor::presets::broad_admin("acme")
            .validate()
            .unwrap()
            .render()
            .unwrap();

        let err = cli.apply("IamRoleStack", &template).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Launch { .. }));
    }
}
