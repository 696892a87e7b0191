//! Descriptor validation
//!
//! Walks the whole descriptor and records every violation before deciding.
//! A descriptor with any violation never reaches render or the provisioning
//! engine.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

use super::condition::{Claim, ClaimRule, MatchOperator, TrustCondition};
use super::error::{DescriptorError, Violation, ViolationKind};
use super::model::{
    issuer_host, IdentityProvider, InlinePolicy, ManagedPolicy, PermissionStatement, ProviderRef,
    Role, ValidatedDescriptor,
};
use super::pattern::{has_wildcard, ActionPattern, ResourcePattern};
use super::types::{Descriptor, ProviderConfig, ProviderSource, RawCondition, RoleConfig, StatementConfig};
use super::{FEDERATION_AUDIENCE, GITHUB_ISSUER_URL, MAX_SESSION_SECS, MIN_SESSION_SECS};

const MAX_ROLE_NAME_LEN: usize = 64;
const MAX_DESCRIPTION_LEN: usize = 1000;
const MAX_PATH_LEN: usize = 512;
const MAX_POLICY_NAME_LEN: usize = 128;
const MAX_MANAGED_POLICIES: usize = 20;
const MAX_TAGS: usize = 50;
const MAX_TAG_KEY_LEN: usize = 128;
const MAX_TAG_VALUE_LEN: usize = 256;
const MAX_AUDIENCES: usize = 100;
const MAX_THUMBPRINTS: usize = 5;

/// Accumulates violations across the walk
#[derive(Default)]
struct Violations(Vec<Violation>);

impl Violations {
    fn malformed(&mut self, location: impl Into<String>, reason: impl Into<String>) {
        self.push(ViolationKind::Malformed, location.into(), reason.into());
    }

    fn ambiguous(&mut self, location: impl Into<String>, reason: impl Into<String>) {
        self.push(ViolationKind::Ambiguous, location.into(), reason.into());
    }

    fn push(&mut self, kind: ViolationKind, location: String, reason: String) {
        debug!(%location, %reason, ?kind, "descriptor violation");
        self.0.push(Violation {
            kind,
            location,
            reason,
        });
    }
}

impl Descriptor {
    /// Validate the descriptor and build its typed model
    pub fn validate(&self) -> Result<ValidatedDescriptor, DescriptorError> {
        validate(self)
    }
}

/// Validate a descriptor, reporting every violation found
pub fn validate(descriptor: &Descriptor) -> Result<ValidatedDescriptor, DescriptorError> {
    let mut violations = Violations::default();

    // Role checks still run when the provider is broken, so one pass reports
    // both; the audience cross-check is skipped in that case.
    let (provider, provider_ref, host, audiences) = match &descriptor.provider {
        ProviderSource::Managed(config) => {
            let host = fallback_host(&config.issuer_url).to_string();
            match check_provider(config, &mut violations) {
                Some(provider) => {
                    let reference = provider.reference();
                    let audiences = provider.audiences.clone();
                    (Some(provider), Some(reference), host, Some(audiences))
                }
                None => (None, None, host, None),
            }
        }
        ProviderSource::Existing { arn } => match ProviderRef::from_arn(arn) {
            Ok(reference) => {
                let host = reference.issuer_host().to_string();
                let audiences = BTreeSet::from([FEDERATION_AUDIENCE.to_string()]);
                (None, Some(reference), host, Some(audiences))
            }
            Err(reason) => {
                violations.malformed("provider.arn", reason);
                let host = arn
                    .rsplit_once("oidc-provider/")
                    .map(|(_, host)| host)
                    .unwrap_or_else(|| fallback_host(GITHUB_ISSUER_URL));
                (None, None, host.to_string(), None)
            }
        },
    };

    let role = check_role(
        &descriptor.role,
        provider_ref,
        &host,
        audiences.as_ref(),
        &mut violations,
    );

    let Violations(found) = violations;
    if !found.is_empty() {
        if found.iter().any(|v| v.kind == ViolationKind::Ambiguous) {
            return Err(DescriptorError::AmbiguousTrustCondition(found));
        }
        return Err(DescriptorError::MalformedDescriptor(found));
    }

    match role {
        Some(role) => {
            debug!(role = %role.name, "descriptor validated");
            Ok(ValidatedDescriptor { provider, role })
        }
        None => Err(DescriptorError::MalformedDescriptor(vec![Violation {
            kind: ViolationKind::Malformed,
            location: "role".to_string(),
            reason: "role could not be built".to_string(),
        }])),
    }
}

fn check_provider(config: &ProviderConfig, violations: &mut Violations) -> Option<IdentityProvider> {
    let before = violations.0.len();

    match issuer_host(&config.issuer_url) {
        Some(host) if host.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') => {}
        Some(_) => violations.malformed("provider.issuer_url", "issuer host contains invalid characters"),
        None => violations.malformed("provider.issuer_url", "issuer must be an https:// URL with a host"),
    }

    if config.audiences.is_empty() {
        violations.malformed("provider.audiences", "at least one audience is required");
    } else if !config.audiences.iter().any(|a| a == FEDERATION_AUDIENCE) {
        violations.malformed(
            "provider.audiences",
            format!("must include the federation audience '{}'", FEDERATION_AUDIENCE),
        );
    }
    if config.audiences.len() > MAX_AUDIENCES {
        violations.malformed("provider.audiences", format!("at most {} audiences", MAX_AUDIENCES));
    }
    for (i, audience) in config.audiences.iter().enumerate() {
        if audience.is_empty() || audience.len() > 255 {
            violations.malformed(format!("provider.audiences[{}]", i), "audience must be 1-255 chars");
        }
    }

    if config.thumbprints.len() > MAX_THUMBPRINTS {
        violations.malformed("provider.thumbprints", format!("at most {} thumbprints", MAX_THUMBPRINTS));
    }
    for (i, thumbprint) in config.thumbprints.iter().enumerate() {
        if thumbprint.len() != 40 || !thumbprint.chars().all(|c| c.is_ascii_hexdigit()) {
            violations.malformed(
                format!("provider.thumbprints[{}]", i),
                "thumbprint must be 40 hex characters",
            );
        }
    }

    if violations.0.len() > before {
        return None;
    }

    Some(IdentityProvider {
        issuer_url: config.issuer_url.trim_end_matches('/').to_string(),
        audiences: config.audiences.iter().cloned().collect(),
        thumbprints: config.thumbprints.iter().map(|t| t.to_ascii_lowercase()).collect(),
    })
}

/// Host of the issuer URL, tolerating a wrong scheme
fn fallback_host(url: &str) -> &str {
    issuer_host(url)
        .or_else(|| url.split_once("://").and_then(|(_, rest)| rest.split('/').next()))
        .unwrap_or(url)
}

fn check_role(
    config: &RoleConfig,
    provider: Option<ProviderRef>,
    issuer_host: &str,
    audiences: Option<&BTreeSet<String>>,
    violations: &mut Violations,
) -> Option<Role> {
    let before = violations.0.len();

    let name_ok = !config.name.is_empty()
        && config.name.len() <= MAX_ROLE_NAME_LEN
        && config.name.chars().all(is_iam_name_char);
    if !name_ok {
        violations.malformed(
            "role.name",
            format!("must be 1-{} characters of [A-Za-z0-9+=,.@_-]", MAX_ROLE_NAME_LEN),
        );
    }

    if let Some(description) = &config.description {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            violations.malformed("role.description", format!("at most {} characters", MAX_DESCRIPTION_LEN));
        }
    }

    if !(MIN_SESSION_SECS..=MAX_SESSION_SECS).contains(&config.max_session_duration) {
        violations.malformed(
            "role.max_session_duration",
            format!(
                "{}s is outside {}..={} seconds",
                config.max_session_duration, MIN_SESSION_SECS, MAX_SESSION_SECS
            ),
        );
    }

    if !is_valid_path(&config.path) {
        violations.malformed("role.path", "must be '/' or '/segment/.../' of at most 512 characters");
    }

    let condition = check_condition(&config.condition, issuer_host, audiences, violations);
    let inline_policies = check_inline_policies(config, violations);

    let mut managed_policies = BTreeSet::new();
    if config.managed_policies.len() > MAX_MANAGED_POLICIES {
        violations.malformed(
            "role.managed_policies",
            format!("at most {} managed policies", MAX_MANAGED_POLICIES),
        );
    }
    for (i, text) in config.managed_policies.iter().enumerate() {
        match ManagedPolicy::parse(text) {
            Ok(policy) => {
                managed_policies.insert(policy);
            }
            Err(reason) => violations.malformed(format!("role.managed_policies[{}]", i), reason),
        }
    }

    check_tags(&config.tags, violations);

    if violations.0.len() > before {
        return None;
    }

    Some(Role {
        provider: provider?,
        name: config.name.clone(),
        description: config.description.clone(),
        condition,
        max_session_duration: config.max_session_duration,
        path: config.path.clone(),
        inline_policies,
        managed_policies,
        tags: config.tags.clone(),
        broad_access_opt_in: config.broad_access_opt_in,
    })
}

fn check_condition(
    raw: &RawCondition,
    issuer_host: &str,
    audiences: Option<&BTreeSet<String>>,
    violations: &mut Violations,
) -> TrustCondition {
    // claim -> every (operator, values) that mentions it
    let mut by_claim: BTreeMap<Claim, Vec<(MatchOperator, String, Vec<&str>)>> = BTreeMap::new();
    // claims written in the condition at all, even when the entry was rejected
    let mut mentioned: BTreeSet<Claim> = BTreeSet::new();

    for (operator_key, claims) in raw {
        let Some(operator) = MatchOperator::parse(operator_key) else {
            violations.malformed(
                format!("role.condition.{}", operator_key),
                "unsupported operator (expected StringEquals or StringLike)",
            );
            continue;
        };

        for (claim_key, value) in claims {
            let location = format!("role.condition.{}.{}", operator_key, claim_key);
            let claim = match Claim::parse_key(claim_key, issuer_host) {
                Ok(claim) => claim,
                Err(reason) => {
                    // Qualified with the wrong issuer: the claim itself is still named
                    if let Some((_, bare)) = claim_key.rsplit_once(':') {
                        mentioned.extend(Claim::ALL.into_iter().filter(|c| c.as_str() == bare));
                    }
                    violations.malformed(location, reason);
                    continue;
                }
            };
            mentioned.insert(claim);

            let values = value.values();
            if values.is_empty() {
                violations.malformed(&location, "at least one value is required");
                continue;
            }
            if values.iter().any(|v| v.is_empty()) {
                violations.malformed(&location, "values must not be empty");
                continue;
            }
            by_claim.entry(claim).or_default().push((operator, location, values));
        }
    }

    let mut condition = TrustCondition::new();
    for (claim, entries) in by_claim {
        for (operator, location, values) in &entries {
            check_claim_values(claim, *operator, location, values, audiences, violations);
        }

        let operators: BTreeSet<MatchOperator> = entries.iter().map(|(op, _, _)| *op).collect();
        if operators.len() > 1 {
            let locations: Vec<&str> = entries.iter().map(|(_, loc, _)| loc.as_str()).collect();
            violations.ambiguous(
                format!("role.condition.*.{}", claim),
                format!(
                    "claim '{}' is constrained by both StringEquals and StringLike ({})",
                    claim,
                    locations.join(", ")
                ),
            );
            continue;
        }
        if entries.len() > 1 {
            violations.malformed(
                format!("role.condition.{}", entries[0].0),
                format!("claim '{}' is listed more than once", claim),
            );
            continue;
        }

        let (operator, location, values) = &entries[0];
        match ClaimRule::new(*operator, values.iter().copied()) {
            Ok(rule) => {
                if let Err(conflict) = condition.insert(claim, rule) {
                    violations.malformed(location.clone(), conflict.to_string());
                }
            }
            Err(e) => violations.malformed(location.clone(), e.to_string()),
        }
    }

    // A claim that was written but rejected already has its own violation
    for claim in Claim::ALL.into_iter().filter(|c| !mentioned.contains(c)) {
        let reason = match claim {
            Claim::Aud => "the audience claim must be pinned with StringEquals",
            Claim::Sub => "a subject claim is required; without it any repository on the issuer could assume the role",
        };
        violations.malformed(format!("role.condition.{}", claim), reason);
    }

    condition
}

fn check_claim_values(
    claim: Claim,
    operator: MatchOperator,
    location: &str,
    values: &[&str],
    audiences: Option<&BTreeSet<String>>,
    violations: &mut Violations,
) {
    match claim {
        Claim::Aud => {
            if operator != MatchOperator::StringEquals {
                violations.malformed(location, "the audience claim must use StringEquals");
            }
            if let Some(audiences) = audiences {
                for value in values.iter().filter(|v| !audiences.contains(**v)) {
                    violations.malformed(
                        location,
                        format!("audience '{}' is not accepted by the provider", value),
                    );
                }
            }
        }
        Claim::Sub => {
            for value in values {
                if !value.starts_with("repo:") {
                    violations.malformed(
                        location,
                        format!("subject '{}' must start with 'repo:'", value),
                    );
                }
                if operator == MatchOperator::StringEquals && has_wildcard(value) {
                    violations.malformed(
                        location,
                        format!("subject '{}' contains wildcards but uses exact match", value),
                    );
                }
            }
        }
    }
}

fn check_inline_policies(config: &RoleConfig, violations: &mut Violations) -> Vec<InlinePolicy> {
    let mut policy_names = HashSet::new();
    let mut sids = HashSet::new();
    let mut policies = Vec::with_capacity(config.inline_policies.len());

    for (p, policy) in config.inline_policies.iter().enumerate() {
        let base = format!("role.inline_policies[{}]", p);

        let name_ok = !policy.name.is_empty()
            && policy.name.len() <= MAX_POLICY_NAME_LEN
            && policy.name.chars().all(is_iam_name_char);
        if !name_ok {
            violations.malformed(format!("{}.name", base), "must be 1-128 characters of [A-Za-z0-9+=,.@_-]");
        } else if !policy_names.insert(policy.name.as_str()) {
            violations.malformed(format!("{}.name", base), format!("duplicate policy name '{}'", policy.name));
        }

        if policy.statements.is_empty() {
            violations.malformed(format!("{}.statements", base), "a policy needs at least one statement");
        }

        let statements = policy
            .statements
            .iter()
            .enumerate()
            .filter_map(|(s, statement)| {
                check_statement(statement, &format!("{}.statements[{}]", base, s), &mut sids, violations)
            })
            .collect();

        policies.push(InlinePolicy {
            name: policy.name.clone(),
            statements,
        });
    }

    policies
}

fn check_statement<'a>(
    statement: &'a StatementConfig,
    base: &str,
    sids: &mut HashSet<&'a str>,
    violations: &mut Violations,
) -> Option<PermissionStatement> {
    let before = violations.0.len();

    if statement.sid.is_empty() || !statement.sid.chars().all(|c| c.is_ascii_alphanumeric()) {
        violations.malformed(format!("{}.sid", base), "sid must be non-empty and alphanumeric");
    } else if !sids.insert(statement.sid.as_str()) {
        violations.malformed(format!("{}.sid", base), format!("duplicate sid '{}'", statement.sid));
    }

    if statement.actions.is_empty() {
        violations.malformed(format!("{}.actions", base), "at least one action is required");
    }
    let mut actions = BTreeSet::new();
    for (i, text) in statement.actions.iter().enumerate() {
        match ActionPattern::parse(text) {
            Ok(action) => {
                actions.insert(action);
            }
            Err(e) => violations.malformed(format!("{}.actions[{}]", base, i), e.to_string()),
        }
    }

    if statement.resources.is_empty() {
        violations.malformed(format!("{}.resources", base), "at least one resource is required");
    }
    let mut resources = BTreeSet::new();
    for (i, text) in statement.resources.iter().enumerate() {
        match ResourcePattern::parse(text) {
            Ok(resource) => {
                resources.insert(resource);
            }
            Err(e) => violations.malformed(format!("{}.resources[{}]", base, i), e.to_string()),
        }
    }

    if violations.0.len() > before {
        return None;
    }

    Some(PermissionStatement {
        sid: statement.sid.clone(),
        effect: statement.effect,
        actions,
        resources,
    })
}

fn check_tags(tags: &BTreeMap<String, String>, violations: &mut Violations) {
    if tags.len() > MAX_TAGS {
        violations.malformed("role.tags", format!("at most {} tags", MAX_TAGS));
    }
    for (key, value) in tags {
        if key.is_empty() || key.chars().count() > MAX_TAG_KEY_LEN {
            violations.malformed(format!("role.tags.{}", key), "tag keys must be 1-128 characters");
        }
        if key.to_ascii_lowercase().starts_with("aws:") {
            violations.malformed(format!("role.tags.{}", key), "the aws: prefix is reserved");
        }
        if value.chars().count() > MAX_TAG_VALUE_LEN {
            violations.malformed(format!("role.tags.{}", key), "tag values must be at most 256 characters");
        }
    }
}

fn is_iam_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "+=,.@_-".contains(c)
}

fn is_valid_path(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    path.len() <= MAX_PATH_LEN
        && path.starts_with('/')
        && path.ends_with('/')
        && path[1..path.len() - 1]
            .split('/')
            .all(|segment| !segment.is_empty() && segment.chars().all(|c| c.is_ascii_graphic()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::types::{ConditionValue, InlinePolicyConfig};

    const HOST: &str = "token.actions.githubusercontent.com";

    fn condition(entries: &[(&str, &str, &str)]) -> RawCondition {
        let mut raw = RawCondition::new();
        for (operator, claim, value) in entries {
            raw.entry(operator.to_string())
                .or_default()
                .insert(format!("{}:{}", HOST, claim), ConditionValue::from(*value));
        }
        raw
    }

    fn descriptor() -> Descriptor {
        Descriptor {
            provider: ProviderSource::Managed(ProviderConfig::default()),
            role: RoleConfig {
                name: "GitHubActionsRole".to_string(),
                description: Some("Role for GitHub Actions to deploy using CDK".to_string()),
                max_session_duration: 3600,
                path: "/github-actions/".to_string(),
                broad_access_opt_in: false,
                condition: condition(&[
                    ("StringEquals", "aud", "sts.amazonaws.com"),
                    ("StringEquals", "sub", "repo:acme/infra:ref:refs/heads/main"),
                ]),
                inline_policies: vec![InlinePolicyConfig {
                    name: "GitHubActionsPolicy".to_string(),
                    statements: vec![StatementConfig::allow(
                        "AllowArtifacts",
                        ["s3:GetObject", "s3:PutObject"],
                        ["arn:aws:s3:::infra-*/*"],
                    )],
                }],
                managed_policies: Vec::new(),
                tags: BTreeMap::from([("Owner".to_string(), "GitHubActions".to_string())]),
            },
        }
    }

    #[test]
    fn test_valid_descriptor() {
        let validated = descriptor().validate().unwrap();
        assert!(validated.provider.is_some());
        assert_eq!(validated.role.name, "GitHubActionsRole");
        assert_eq!(validated.role.provider.issuer_host(), HOST);
        assert_eq!(validated.role.statements().count(), 1);
    }

    #[test]
    fn test_every_violation_is_reported() {
        let mut d = descriptor();
        d.role.name = "bad name!".to_string();
        d.role.max_session_duration = 60;
        d.role.path = "no-slashes".to_string();
        d.role.inline_policies[0].statements[0].actions.push("s3".to_string());
        d.role.inline_policies[0].statements[0].resources.push("bucket/x".to_string());

        let err = d.validate().unwrap_err();
        assert!(matches!(err, DescriptorError::MalformedDescriptor(_)));

        let locations: Vec<&str> = err.violations().iter().map(|v| v.location.as_str()).collect();
        assert!(locations.contains(&"role.name"));
        assert!(locations.contains(&"role.max_session_duration"));
        assert!(locations.contains(&"role.path"));
        assert!(locations.contains(&"role.inline_policies[0].statements[0].actions[2]"));
        assert!(locations.contains(&"role.inline_policies[0].statements[0].resources[1]"));
        assert_eq!(err.violations().len(), 5);
    }

    #[test]
    fn test_mixed_operators_on_sub_are_ambiguous() {
        let mut d = descriptor();
        d.role.condition = condition(&[
            ("StringEquals", "aud", "sts.amazonaws.com"),
            ("StringEquals", "sub", "repo:acme/infra:ref:refs/heads/main"),
            ("StringLike", "sub", "repo:acme/*:*"),
        ]);

        let err = d.validate().unwrap_err();
        let DescriptorError::AmbiguousTrustCondition(violations) = &err else {
            panic!("expected ambiguous trust condition, got {:?}", err);
        };
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Ambiguous);
        // The missing-sub check must not pile on once the conflict is reported
        assert!(!violations.iter().any(|v| v.location == "role.condition.sub"));
    }

    #[test]
    fn test_ambiguity_wins_but_keeps_other_violations() {
        let mut d = descriptor();
        d.role.max_session_duration = 50_000;
        d.role.condition = condition(&[
            ("StringEquals", "aud", "sts.amazonaws.com"),
            ("StringEquals", "sub", "repo:acme/infra:ref:refs/heads/main"),
            ("StringLike", "sub", "repo:acme/*"),
        ]);

        let err = d.validate().unwrap_err();
        assert!(matches!(err, DescriptorError::AmbiguousTrustCondition(_)));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn test_bare_and_qualified_keys_for_same_claim_are_duplicates() {
        let mut d = descriptor();
        d.role
            .condition
            .get_mut("StringEquals")
            .unwrap()
            .insert("sub".to_string(), ConditionValue::from("repo:acme/infra:ref:refs/heads/dev"));

        let err = d.validate().unwrap_err();
        assert!(matches!(err, DescriptorError::MalformedDescriptor(_)));
        assert!(err.violations()[0].reason.contains("more than once"));
    }

    #[test]
    fn test_missing_subject_is_rejected() {
        let mut d = descriptor();
        d.role.condition = condition(&[("StringEquals", "aud", "sts.amazonaws.com")]);

        let err = d.validate().unwrap_err();
        assert_eq!(err.violations().len(), 1);
        assert_eq!(err.violations()[0].location, "role.condition.sub");
    }

    #[test]
    fn test_missing_subject_reported_alongside_bad_audience() {
        let mut d = descriptor();
        d.role.condition = condition(&[("StringEquals", "aud", "api://wrong")]);

        let err = d.validate().unwrap_err();
        let locations: Vec<&str> = err.violations().iter().map(|v| v.location.as_str()).collect();
        assert_eq!(
            locations,
            vec![
                "role.condition.StringEquals.token.actions.githubusercontent.com:aud",
                "role.condition.sub",
            ]
        );
    }

    #[test]
    fn test_conflicting_entries_still_have_values_checked() {
        let mut d = descriptor();
        d.role.condition = condition(&[
            ("StringEquals", "aud", "sts.amazonaws.com"),
            ("StringEquals", "sub", "acme/infra"),
            ("StringLike", "sub", "repo:acme/*"),
        ]);

        let err = d.validate().unwrap_err();
        assert!(matches!(err, DescriptorError::AmbiguousTrustCondition(_)));
        let reasons: Vec<&str> = err.violations().iter().map(|v| v.reason.as_str()).collect();
        assert_eq!(reasons.len(), 2, "{:?}", reasons);
        assert!(reasons.iter().any(|r| r.contains("must start with 'repo:'")));
        assert!(reasons.iter().any(|r| r.contains("both StringEquals and StringLike")));
    }

    #[test]
    fn test_claim_qualified_with_wrong_issuer_is_not_also_missing() {
        let mut d = descriptor();
        d.role.condition = condition(&[("StringEquals", "aud", "sts.amazonaws.com")]);
        d.role
            .condition
            .get_mut("StringEquals")
            .unwrap()
            .insert("accounts.google.com:sub".to_string(), ConditionValue::from("repo:acme/infra:ref:refs/heads/main"));

        let err = d.validate().unwrap_err();
        assert_eq!(err.violations().len(), 1);
        assert!(err.violations()[0].reason.contains("accounts.google.com"));
    }

    #[test]
    fn test_unrecognised_claims_and_operators() {
        let mut d = descriptor();
        d.role
            .condition
            .get_mut("StringEquals")
            .unwrap()
            .insert(format!("{}:repository", HOST), ConditionValue::from("acme/infra"));
        d.role
            .condition
            .insert("ForAnyValue:StringLike".to_string(), BTreeMap::new());

        let err = d.validate().unwrap_err();
        let reasons: Vec<&str> = err.violations().iter().map(|v| v.reason.as_str()).collect();
        assert_eq!(reasons.len(), 2);
        assert!(reasons.iter().any(|r| r.contains("unrecognised claim")));
        assert!(reasons.iter().any(|r| r.contains("unsupported operator")));
    }

    #[test]
    fn test_exact_subject_with_wildcard_is_malformed() {
        let mut d = descriptor();
        d.role.condition = condition(&[
            ("StringEquals", "aud", "sts.amazonaws.com"),
            ("StringEquals", "sub", "repo:acme/*"),
        ]);
        let err = d.validate().unwrap_err();
        assert!(err.violations()[0].reason.contains("exact match"));
    }

    #[test]
    fn test_audience_must_be_accepted_by_provider() {
        let mut d = descriptor();
        d.role.condition = condition(&[
            ("StringEquals", "aud", "api://somewhere-else"),
            ("StringEquals", "sub", "repo:acme/infra:ref:refs/heads/main"),
        ]);
        let err = d.validate().unwrap_err();
        assert!(err.violations()[0].reason.contains("not accepted by the provider"));
    }

    #[test]
    fn test_provider_checks() {
        let mut d = descriptor();
        d.provider = ProviderSource::Managed(ProviderConfig {
            issuer_url: "http://token.actions.githubusercontent.com".to_string(),
            audiences: vec!["something".to_string()],
            thumbprints: vec!["xyz".to_string()],
        });
        let err = d.validate().unwrap_err();
        let locations: Vec<&str> = err.violations().iter().map(|v| v.location.as_str()).collect();
        assert_eq!(
            locations,
            vec!["provider.issuer_url", "provider.audiences", "provider.thumbprints[0]"]
        );
    }

    #[test]
    fn test_existing_provider_arn() {
        let mut d = descriptor();
        d.provider = ProviderSource::Existing {
            arn: format!("arn:aws:iam::123456789012:oidc-provider/{}", HOST),
        };
        let validated = d.validate().unwrap();
        assert!(validated.provider.is_none());
        assert!(matches!(validated.role.provider, ProviderRef::Arn { .. }));

        d.provider = ProviderSource::Existing {
            arn: "arn:aws:iam::123456789012:oidc-provider/accounts.google.com".to_string(),
        };
        let err = d.validate().unwrap_err();
        assert!(err.violations()[0].reason.contains("accounts.google.com"));
    }

    #[test]
    fn test_duplicate_sids_across_policies() {
        let mut d = descriptor();
        let duplicate = d.role.inline_policies[0].clone();
        d.role.inline_policies.push(InlinePolicyConfig {
            name: "Second".to_string(),
            ..duplicate
        });
        let err = d.validate().unwrap_err();
        assert_eq!(err.violations().len(), 1);
        assert!(err.violations()[0].reason.contains("duplicate sid"));
    }

    #[test]
    fn test_tags_and_managed_policies() {
        let mut d = descriptor();
        d.role.tags.insert("aws:owner".to_string(), "x".to_string());
        d.role.managed_policies.push("arn:aws:iam::aws:role/Nope".to_string());
        let err = d.validate().unwrap_err();
        let locations: Vec<&str> = err.violations().iter().map(|v| v.location.as_str()).collect();
        assert!(locations.contains(&"role.managed_policies[0]"));
        assert!(locations.contains(&"role.tags.aws:owner"));
    }

    #[test]
    fn test_paths() {
        assert!(is_valid_path("/"));
        assert!(is_valid_path("/github-actions/"));
        assert!(is_valid_path("/a/b/"));
        assert!(!is_valid_path("github-actions/"));
        assert!(!is_valid_path("/github-actions"));
        assert!(!is_valid_path("//"));
        assert!(!is_valid_path("/a b/"));
    }
}
