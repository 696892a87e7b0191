//! deploy-role - Standalone Binary
//!
//! Validates, lints, renders and applies the GitHub Actions OIDC deploy role.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use deploy_role::descriptor::presets::{self, RepositoryRef};
use deploy_role::config::{DESCRIPTOR_VAR, PROFILE_VAR, REGION_VAR, STACK_NAME_VAR, STRICT_VAR};
use deploy_role::descriptor::{diff, lint, Decision, Descriptor, DescriptorFormat, ValidatedDescriptor};
use deploy_role::{deploy, ApplyOutcome, ToolConfig};

/// GitHub Actions OIDC deploy role for AWS
#[derive(Parser, Debug)]
#[command(name = "deploy-role", version, about)]
struct Cli {
    /// Descriptor file (.json or .toml), else DEPLOY_ROLE_DESCRIPTOR
    #[arg(long, short, global = true)]
    descriptor: Option<PathBuf>,

    /// Treat lint findings as errors unless the descriptor opts into broad access (or DEPLOY_ROLE_STRICT)
    #[arg(long, global = true)]
    strict: bool,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "DEPLOY_ROLE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a descriptor from a preset
    Init {
        #[arg(long, value_enum, default_value = "least-privilege")]
        preset: Preset,

        /// Repository owner (user or organisation)
        #[arg(long)]
        owner: String,

        /// Repository name (least-privilege preset)
        #[arg(long)]
        repo: Option<String>,

        /// Branch allowed to assume the role (least-privilege preset)
        #[arg(long, default_value = "main")]
        branch: String,

        /// AWS account the permissions are scoped to (least-privilege preset)
        #[arg(long, env = "AWS_ACCOUNT_ID")]
        account_id: Option<String>,

        /// Output file; format follows the extension. Stdout (JSON) when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Validate the descriptor and report every violation
    Validate,

    /// Report least-privilege findings
    Lint,

    /// Render the CloudFormation template
    Render {
        /// Output file. Stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show what would change going from another descriptor to this one
    Diff {
        /// Descriptor currently deployed
        #[arg(long)]
        against: PathBuf,
    },

    /// Evaluate whether the role may perform an action on a resource
    Evaluate {
        /// Action, e.g. s3:GetObject
        action: String,

        /// Resource ARN or `*`
        #[arg(default_value = "*")]
        resource: String,
    },

    /// Validate, lint, render and hand the template to CloudFormation
    Apply {
        /// Stack name, else DEPLOY_ROLE_STACK_NAME, else IamRoleStack
        #[arg(long)]
        stack_name: Option<String>,

        /// Region, else AWS_REGION
        #[arg(long)]
        region: Option<String>,

        /// Profile, else AWS_PROFILE
        #[arg(long)]
        profile: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Preset {
    LeastPrivilege,
    BroadAdmin,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match &cli.command {
        Command::Init {
            preset,
            owner,
            repo,
            branch,
            account_id,
            output,
        } => {
            let descriptor = match preset {
                Preset::LeastPrivilege => {
                    let repo = repo.as_deref().context("--repo is required for the least-privilege preset")?;
                    let account_id = account_id
                        .as_deref()
                        .context("--account-id is required for the least-privilege preset")?;
                    presets::least_privilege(&RepositoryRef::new(owner.as_str(), repo, branch.as_str()), account_id)
                }
                Preset::BroadAdmin => {
                    warn!(owner = %owner, "⚠️ broad-admin preset grants AdministratorAccess to every repository of the owner");
                    presets::broad_admin(owner)
                }
            };
            // Refuse to emit something that would not validate
            descriptor.validate()?;

            let format = output.as_deref().map(DescriptorFormat::from_path).unwrap_or_default();
            let text = descriptor.to_string(format)?;
            write_output(output.as_deref(), &text)?;
        }

        Command::Validate => {
            let validated = load(&tool_config(&cli)?)?;
            info!(role = %validated.role.name, "✅ Descriptor is valid");
        }

        Command::Lint => {
            let config = tool_config(&cli)?;
            let validated = load(&config)?;
            let report = lint::check(&validated, config.lint_policy());
            for finding in &report.findings {
                println!("{}", finding);
            }
            if report.has_errors() {
                bail!("{} lint error(s)", report.errors().count());
            }
            info!(findings = report.findings.len(), "Lint complete");
        }

        Command::Render { output } => {
            let config = tool_config(&cli)?;
            let validated = load(&config)?;
            let report = lint::check(&validated, config.lint_policy());
            if report.has_errors() {
                bail!("{} lint error(s), not rendering", report.errors().count());
            }
            let template = validated.render()?;
            write_output(output.as_deref(), template.as_str())?;
        }

        Command::Diff { against } => {
            let after = load(&tool_config(&cli)?)?;
            let before = Descriptor::from_path(against)?
                .validate()
                .with_context(|| format!("descriptor '{}' is invalid", against.display()))?;
            let plan = diff::plan(&before, &after)?;
            print!("{}", plan);
        }

        Command::Evaluate { action, resource } => {
            let validated = load(&tool_config(&cli)?)?;
            let effective = validated.role.effective_permissions();
            let decision = effective.evaluate(action, resource);
            println!("{}", decision);
            if let Decision::Unresolved(bundles) = &decision {
                warn!(action = %action, bundles = bundles.len(), "Managed bundles could not be resolved locally");
            }
            if effective.is_unrestricted() {
                warn!(role = %validated.role.name, "⚠️ Role grants every action on every resource");
            }
        }

        Command::Apply { .. } => {
            let config = tool_config(&cli)?;
            let descriptor = Descriptor::from_path(&config.descriptor)?;

            let report = deploy(&config.engine(), &config.stack_name, &descriptor, config.lint_policy()).await?;
            match report.outcome {
                ApplyOutcome::Applied => info!(stack = %config.stack_name, "✅ Deploy role applied"),
                ApplyOutcome::NoChange => info!(stack = %config.stack_name, "✅ No changes"),
            }
        }
    }

    Ok(())
}

// ============================================================
// Helpers
// ============================================================

fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Command-line values layered over the environment
fn tool_config(cli: &Cli) -> Result<ToolConfig> {
    let mut overrides: HashMap<&str, String> = HashMap::new();
    if let Some(descriptor) = &cli.descriptor {
        overrides.insert(DESCRIPTOR_VAR, descriptor.to_string_lossy().into_owned());
    }
    if cli.strict {
        overrides.insert(STRICT_VAR, "true".to_string());
    }
    if let Command::Apply {
        stack_name,
        region,
        profile,
    } = &cli.command
    {
        for (var, value) in [(STACK_NAME_VAR, stack_name), (REGION_VAR, region), (PROFILE_VAR, profile)] {
            if let Some(value) = value {
                overrides.insert(var, value.clone());
            }
        }
    }
    ToolConfig::from_env_with(&overrides)
}

fn load(config: &ToolConfig) -> Result<ValidatedDescriptor> {
    let descriptor = Descriptor::from_path(&config.descriptor)?;
    let validated = descriptor.validate().map_err(|err| {
        for violation in err.violations() {
            eprintln!("  {}", violation);
        }
        err
    })?;
    Ok(validated)
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote output");
        }
        None => print!("{}", text),
    }
    Ok(())
}
