//! CloudFormation rendering
//!
//! Serializes a validated descriptor into a CloudFormation template. Output is
//! deterministic: maps are ordered, sets are sorted, statements keep their
//! declared order, and the JSON is pretty-printed with a trailing newline.
//! Re-rendering an unchanged descriptor therefore produces identical bytes and
//! a zero-change deployment.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::error::RenderError;
use super::model::{IdentityProvider, PermissionStatement, ProviderRef, Role, ValidatedDescriptor, PROVIDER_LOGICAL_ID};
use super::{ASSUME_ROLE_ACTION, POLICY_VERSION};

const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Rendered template body, ready for the provisioning engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate(String);

impl RenderedTemplate {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for RenderedTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValidatedDescriptor {
    /// Render the descriptor as CloudFormation template JSON
    pub fn render(&self) -> Result<RenderedTemplate, RenderError> {
        let role_id = self.role.logical_id();

        let template = Template {
            format_version: TEMPLATE_FORMAT_VERSION,
            description: format!("GitHub Actions OIDC deploy role {}", self.role.name),
            resources: resources(self),
            outputs: BTreeMap::from([(
                "RoleArn".to_string(),
                Output {
                    description: "ARN the CI workflow assumes".to_string(),
                    value: GetAtt {
                        get_att: [role_id, "Arn".to_string()],
                    },
                },
            )]),
        };

        let mut body = serde_json::to_string_pretty(&template)?;
        body.push('\n');

        debug!(role = %self.role.name, bytes = body.len(), "rendered template");
        Ok(RenderedTemplate(body))
    }
}

/// Template resources keyed by logical id
pub(crate) fn resources(descriptor: &ValidatedDescriptor) -> BTreeMap<String, Resource<'_>> {
    let mut resources = BTreeMap::new();
    if let Some(provider) = &descriptor.provider {
        resources.insert(PROVIDER_LOGICAL_ID.to_string(), Resource::OidcProvider(provider_props(provider)));
    }
    resources.insert(descriptor.role.logical_id(), Resource::Role(role_props(&descriptor.role)));
    resources
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Template<'a> {
    #[serde(rename = "AWSTemplateFormatVersion")]
    format_version: &'static str,
    description: String,
    resources: BTreeMap<String, Resource<'a>>,
    outputs: BTreeMap<String, Output>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Output {
    description: String,
    value: GetAtt,
}

#[derive(Serialize)]
struct GetAtt {
    #[serde(rename = "Fn::GetAtt")]
    get_att: [String; 2],
}

/// A template resource with its type tag
#[derive(Debug, Serialize)]
#[serde(tag = "Type", content = "Properties")]
pub(crate) enum Resource<'a> {
    #[serde(rename = "AWS::IAM::OIDCProvider")]
    OidcProvider(OidcProviderProps<'a>),
    #[serde(rename = "AWS::IAM::Role")]
    Role(RoleProps<'a>),
}

impl Resource<'_> {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Resource::OidcProvider(_) => "AWS::IAM::OIDCProvider",
            Resource::Role(_) => "AWS::IAM::Role",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct OidcProviderProps<'a> {
    url: &'a str,
    client_id_list: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    thumbprint_list: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RoleProps<'a> {
    role_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    path: &'a str,
    max_session_duration: u32,
    assume_role_policy_document: PolicyDocument<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    policies: Vec<NamedPolicy<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    managed_policy_arns: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<Tag<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct NamedPolicy<'a> {
    policy_name: &'a str,
    policy_document: PolicyDocument<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Tag<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PolicyDocument<'a> {
    version: &'static str,
    statement: Vec<Statement<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Statement<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    sid: Option<&'a str>,
    effect: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    principal: Option<Principal<'a>>,
    action: OneOrMany<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource: Option<OneOrMany<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    condition: Option<BTreeMap<&'static str, BTreeMap<String, OneOrMany<'a>>>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Principal<'a> {
    federated: FederatedRef<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum FederatedRef<'a> {
    Ref {
        #[serde(rename = "Ref")]
        logical_id: &'a str,
    },
    Arn(&'a str),
}

/// IAM writes a single value as a string and several as a list
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OneOrMany<'a> {
    One(&'a str),
    Many(Vec<&'a str>),
}

impl<'a> FromIterator<&'a str> for OneOrMany<'a> {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut values: Vec<&'a str> = iter.into_iter().collect();
        if values.len() == 1 {
            OneOrMany::One(values.remove(0))
        } else {
            OneOrMany::Many(values)
        }
    }
}

fn provider_props(provider: &IdentityProvider) -> OidcProviderProps<'_> {
    OidcProviderProps {
        url: &provider.issuer_url,
        client_id_list: provider.audiences.iter().map(String::as_str).collect(),
        thumbprint_list: provider.thumbprints.iter().map(String::as_str).collect(),
    }
}

fn role_props(role: &Role) -> RoleProps<'_> {
    RoleProps {
        role_name: &role.name,
        description: role.description.as_deref(),
        path: &role.path,
        max_session_duration: role.max_session_duration,
        assume_role_policy_document: trust_policy(role),
        policies: role
            .inline_policies
            .iter()
            .map(|policy| NamedPolicy {
                policy_name: &policy.name,
                policy_document: PolicyDocument {
                    version: POLICY_VERSION,
                    statement: policy.statements.iter().map(permission_statement).collect(),
                },
            })
            .collect(),
        managed_policy_arns: role.managed_policies.iter().map(|p| p.arn()).collect(),
        tags: role
            .tags
            .iter()
            .map(|(key, value)| Tag { key, value })
            .collect(),
    }
}

fn trust_policy(role: &Role) -> PolicyDocument<'_> {
    let federated = match &role.provider {
        ProviderRef::Declared { logical_id, .. } => FederatedRef::Ref { logical_id },
        ProviderRef::Arn { arn, .. } => FederatedRef::Arn(arn),
    };

    let condition: BTreeMap<&'static str, BTreeMap<String, OneOrMany<'_>>> = role
        .condition
        .by_operator(role.provider.issuer_host())
        .into_iter()
        .map(|(operator, claims)| {
            let claims: BTreeMap<String, OneOrMany<'_>> = claims
                .into_iter()
                .map(|(key, values)| (key, values.into_iter().collect()))
                .collect();
            (operator.as_str(), claims)
        })
        .collect();

    PolicyDocument {
        version: POLICY_VERSION,
        statement: vec![Statement {
            sid: None,
            effect: "Allow".to_string(),
            principal: Some(Principal { federated }),
            action: OneOrMany::One(ASSUME_ROLE_ACTION),
            resource: None,
            condition: Some(condition),
        }],
    }
}

fn permission_statement(statement: &PermissionStatement) -> Statement<'_> {
    Statement {
        sid: Some(&statement.sid),
        effect: statement.effect.to_string(),
        principal: None,
        action: statement.actions.iter().map(|a| a.as_str()).collect(),
        resource: Some(statement.resources.iter().map(|r| r.as_str()).collect()),
        condition: None,
    }
}
