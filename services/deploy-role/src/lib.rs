//! GitHub Actions -> AWS deploy role
//!
//! Declares an OIDC federation between the GitHub Actions token issuer and an
//! AWS account, plus the role CI workflows assume through it. A descriptor is
//! validated, linted for least privilege, rendered to a deterministic
//! CloudFormation template and handed to a provisioning engine.
//!
//! ```rust,no_run
//! use deploy_role::descriptor::presets::{self, RepositoryRef};
//! use deploy_role::descriptor::{lint, LintPolicy};
//!
//! let descriptor = presets::least_privilege(&RepositoryRef::new("acme", "infra", "main"), "123456789012");
//! let validated = descriptor.validate().unwrap();
//! assert!(!lint::check(&validated, LintPolicy::strict()).has_errors());
//! println!("{}", validated.render().unwrap());
//! ```

pub mod config;
pub mod deploy;
pub mod descriptor;
pub mod provisioner;

pub use config::ToolConfig;
pub use deploy::{deploy, DeployError, DeployReport, DEFAULT_STACK_NAME};
pub use descriptor::{Descriptor, DescriptorError, ValidatedDescriptor};
pub use provisioner::{ApplyOutcome, CloudFormationCli, ProvisionError, ProvisioningEngine};
