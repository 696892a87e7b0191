//! Ready-made descriptors
//!
//! `least_privilege` is the default starting point: one repository, one
//! branch, CDK deployment permissions scoped to the account. `broad_admin`
//! exists for organisations that knowingly want every repository of an
//! owner to administer the account; it sets `broad_access_opt_in`.

use std::collections::BTreeMap;

use super::condition::{Claim, MatchOperator};
use super::types::{
    ConditionValue, Descriptor, InlinePolicyConfig, ProviderConfig, ProviderSource, RawCondition,
    RoleConfig, StatementConfig,
};
use super::{DEFAULT_MAX_SESSION_SECS, FEDERATION_AUDIENCE, GITHUB_ISSUER_HOST};

pub const DEFAULT_ROLE_NAME: &str = "GitHubActionsRole";
pub const DEFAULT_POLICY_NAME: &str = "GitHubActionsPolicy";
pub const DEFAULT_ROLE_PATH: &str = "/github-actions/";

/// Repository and branch whose workflows may assume the role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
        }
    }

    /// Token subject issued to workflows running on this branch
    pub fn subject(&self) -> String {
        format!("repo:{}/{}:ref:refs/heads/{}", self.owner, self.repo, self.branch)
    }
}

fn condition(operator_for_sub: MatchOperator, subject: String) -> RawCondition {
    let aud_key = Claim::Aud.qualified(GITHUB_ISSUER_HOST);
    let sub_key = Claim::Sub.qualified(GITHUB_ISSUER_HOST);

    let mut condition = RawCondition::new();
    condition
        .entry(MatchOperator::StringEquals.as_str().to_string())
        .or_default()
        .insert(aud_key, ConditionValue::from(FEDERATION_AUDIENCE));
    condition
        .entry(operator_for_sub.as_str().to_string())
        .or_default()
        .insert(sub_key, ConditionValue::One(subject));
    condition
}

fn default_tags() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Environment".to_string(), "CI/CD".to_string()),
        ("Owner".to_string(), "GitHubActions".to_string()),
    ])
}

/// Restrictive descriptor: exact subject, CDK deployment actions only
pub fn least_privilege(repository: &RepositoryRef, account_id: &str) -> Descriptor {
    let statements = vec![
        StatementConfig::allow(
            "AllowCDKDeployments",
            [
                "cloudformation:CreateStack",
                "cloudformation:DeleteStack",
                "cloudformation:DescribeStacks",
                "cloudformation:UpdateStack",
                "cloudformation:DescribeStackResources",
                "cloudformation:DescribeStackEvents",
                "cloudformation:GetTemplate",
            ],
            [format!("arn:aws:cloudformation:*:{}:stack/*", account_id)],
        ),
        StatementConfig::allow(
            "AllowCDKAssets",
            ["s3:ListBucket", "s3:GetObject", "s3:PutObject"],
            ["arn:aws:s3:::cdk-*", "arn:aws:s3:::cdk-*/*"],
        ),
        StatementConfig::allow(
            "AllowCDKPassRole",
            ["iam:PassRole"],
            [format!("arn:aws:iam::{}:role/cdk-*", account_id)],
        ),
        StatementConfig::allow(
            "AllowCDKBootstrapLookup",
            ["ssm:GetParameter", "ssm:GetParameters"],
            [format!("arn:aws:ssm:*:{}:parameter/cdk-bootstrap/*", account_id)],
        ),
        StatementConfig::allow(
            "AllowReadOnlyDiscovery",
            ["cloudformation:ValidateTemplate", "ec2:Describe*", "ssm:DescribeParameters"],
            ["*"],
        ),
        StatementConfig::allow(
            "AllowEC2Operations",
            ["ec2:CreateTags", "ec2:DeleteTags"],
            [format!("arn:aws:ec2:*:{}:*", account_id)],
        ),
        StatementConfig::allow(
            "AllowLambdaOperations",
            [
                "lambda:CreateFunction",
                "lambda:DeleteFunction",
                "lambda:InvokeFunction",
                "lambda:UpdateFunctionCode",
                "lambda:UpdateFunctionConfiguration",
            ],
            [format!("arn:aws:lambda:*:{}:function:*", account_id)],
        ),
    ];

    Descriptor {
        provider: ProviderSource::Managed(ProviderConfig::default()),
        role: RoleConfig {
            name: DEFAULT_ROLE_NAME.to_string(),
            description: Some("Role for GitHub Actions to deploy using CDK".to_string()),
            max_session_duration: DEFAULT_MAX_SESSION_SECS,
            path: DEFAULT_ROLE_PATH.to_string(),
            broad_access_opt_in: false,
            condition: condition(MatchOperator::StringEquals, repository.subject()),
            inline_policies: vec![InlinePolicyConfig {
                name: DEFAULT_POLICY_NAME.to_string(),
                statements,
            }],
            managed_policies: Vec::new(),
            tags: default_tags(),
        },
    }
}

/// Any repository of `owner`, any ref, with administrator access
pub fn broad_admin(owner: &str) -> Descriptor {
    Descriptor {
        provider: ProviderSource::Managed(ProviderConfig::default()),
        role: RoleConfig {
            name: DEFAULT_ROLE_NAME.to_string(),
            description: Some("Role for GitHub Actions with administrator access".to_string()),
            max_session_duration: DEFAULT_MAX_SESSION_SECS,
            path: DEFAULT_ROLE_PATH.to_string(),
            broad_access_opt_in: true,
            condition: condition(MatchOperator::StringLike, format!("repo:{}/*:*", owner)),
            inline_policies: Vec::new(),
            managed_policies: vec!["AdministratorAccess".to_string()],
            tags: default_tags(),
        },
    }
}
