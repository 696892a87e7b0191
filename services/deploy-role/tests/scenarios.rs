//! End-to-end descriptor scenarios: load -> validate -> lint -> evaluate -> render -> diff

use deploy_role::descriptor::presets::{self, RepositoryRef};
use deploy_role::descriptor::{
    diff, lint, Decision, Descriptor, DescriptorError, FindingKind, LintPolicy, ProviderSource, ViolationKind,
};

const SHARED_PROVIDER_ARN: &str = "arn:aws:iam::123456789012:oidc-provider/token.actions.githubusercontent.com";

fn scoped_deployer() -> Descriptor {
    Descriptor::from_json_str(
        r#"{
            "provider": { "source": "managed" },
            "role": {
                "name": "InfraDeployer",
                "condition": {
                    "StringEquals": {
                        "token.actions.githubusercontent.com:aud": "sts.amazonaws.com",
                        "token.actions.githubusercontent.com:sub": "repo:acme/infra:ref:refs/heads/main"
                    }
                },
                "inline_policies": [{
                    "name": "Deploy",
                    "statements": [{
                        "sid": "InfraBuckets",
                        "actions": ["s3:GetObject", "s3:PutObject", "cloudformation:*"],
                        "resources": ["arn:aws:s3:::infra-*"]
                    }]
                }]
            }
        }"#,
    )
    .unwrap()
}

#[test]
fn scoped_role_grants_only_declared_actions() {
    let validated = scoped_deployer().validate().unwrap();
    let effective = validated.role.effective_permissions();

    assert_eq!(effective.evaluate("s3:GetObject", "arn:aws:s3:::infra-assets"), Decision::Allowed);
    assert_eq!(effective.evaluate("s3:putobject", "arn:aws:s3:::infra-assets"), Decision::Allowed);
    assert_eq!(effective.evaluate("cloudformation:CreateStack", "arn:aws:s3:::infra-x"), Decision::Allowed);
    assert_eq!(
        effective.evaluate("s3:DeleteObject", "arn:aws:s3:::infra-assets"),
        Decision::ImplicitlyDenied
    );
    assert_eq!(effective.evaluate("iam:CreateUser", "*"), Decision::ImplicitlyDenied);
    assert_eq!(
        effective.evaluate("s3:GetObject", "arn:aws:s3:::INFRA-assets"),
        Decision::ImplicitlyDenied
    );
    assert!(!effective.is_unrestricted());

    assert!(lint::check(&validated, LintPolicy::strict()).is_clean());
}

#[test]
fn wildcard_subject_with_admin_bundle_is_valid_but_flagged() {
    let validated = presets::broad_admin("acme").validate().unwrap();

    let report = lint::check(&validated, LintPolicy::default());
    assert!(report.has(FindingKind::WildcardSubject));
    assert!(report.has(FindingKind::AdministrativeBundle));
    assert!(!report.has_errors());

    assert!(validated.role.effective_permissions().is_unrestricted());
}

#[test]
fn exact_and_wildcard_on_same_claim_is_ambiguous() {
    let descriptor = Descriptor::from_json_str(
        r#"{
            "provider": { "source": "managed" },
            "role": {
                "name": "Ambiguous",
                "condition": {
                    "StringEquals": {
                        "token.actions.githubusercontent.com:aud": "sts.amazonaws.com",
                        "token.actions.githubusercontent.com:sub": "repo:acme/infra:ref:refs/heads/main"
                    },
                    "StringLike": {
                        "token.actions.githubusercontent.com:sub": "repo:acme/*"
                    }
                }
            }
        }"#,
    )
    .unwrap();

    let err = descriptor.validate().unwrap_err();
    assert!(matches!(err, DescriptorError::AmbiguousTrustCondition(_)));
    assert!(err.violations().iter().any(|v| v.kind == ViolationKind::Ambiguous));
}

#[test]
fn every_violation_is_reported_at_once() {
    let mut descriptor = scoped_deployer();
    descriptor.role.name = "has spaces".to_string();
    descriptor.role.max_session_duration = 100_000;
    descriptor.role.inline_policies[0].statements[0].actions.push("not-an-action".to_string());

    let err = descriptor.validate().unwrap_err();
    assert!(matches!(err, DescriptorError::MalformedDescriptor(_)));

    let locations: Vec<&str> = err.violations().iter().map(|v| v.location.as_str()).collect();
    assert!(locations.contains(&"role.name"), "{:?}", locations);
    assert!(locations.contains(&"role.max_session_duration"), "{:?}", locations);
    assert!(
        locations.contains(&"role.inline_policies[0].statements[0].actions[3]"),
        "{:?}",
        locations
    );
}

#[test]
fn roles_sharing_one_provider_render_distinct_templates() {
    let repository = RepositoryRef::new("acme", "infra", "main");
    let mut deploy = presets::least_privilege(&repository, "123456789012");
    deploy.provider = ProviderSource::Existing {
        arn: SHARED_PROVIDER_ARN.to_string(),
    };
    let mut release = deploy.clone();
    release.role.name = "ReleaseRole".to_string();

    let first = deploy.validate().unwrap().render().unwrap();
    let second = release.validate().unwrap().render().unwrap();
    assert_ne!(first, second);

    for template in [&first, &second] {
        let value: serde_json::Value = serde_json::from_str(template.as_str()).unwrap();
        let resources = value["Resources"].as_object().unwrap();
        assert_eq!(resources.len(), 1);

        let (_, role) = resources.iter().next().unwrap();
        let federated = &role["Properties"]["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Federated"];
        assert_eq!(federated, SHARED_PROVIDER_ARN);
    }
}

#[test]
fn render_is_deterministic_and_reload_is_noop() {
    let descriptor = presets::least_privilege(&RepositoryRef::new("acme", "infra", "main"), "123456789012");
    let validated = descriptor.validate().unwrap();

    let a = validated.render().unwrap();
    let b = validated.render().unwrap();
    assert_eq!(a.as_str(), b.as_str());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("role.toml");
    std::fs::write(&path, descriptor.to_string(deploy_role::descriptor::DescriptorFormat::Toml).unwrap()).unwrap();
    let reloaded = Descriptor::from_path(&path).unwrap().validate().unwrap();

    assert!(diff::plan(&validated, &reloaded).unwrap().is_noop());
    assert_eq!(reloaded.render().unwrap(), a);
}
