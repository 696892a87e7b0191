//! Descriptor files (JSON or TOML)

use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::LoadError;
use super::types::Descriptor;

/// On-disk descriptor format, picked by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DescriptorFormat {
    #[default]
    Json,
    Toml,
}

impl DescriptorFormat {
    /// `.toml` is TOML, everything else is treated as JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => DescriptorFormat::Toml,
            _ => DescriptorFormat::Json,
        }
    }
}

impl Descriptor {
    /// Read a descriptor from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let format = DescriptorFormat::from_path(path);
        debug!(path = %path.display(), ?format, "loading descriptor");
        match format {
            DescriptorFormat::Json => Self::parse_json(&text, path.to_path_buf()),
            DescriptorFormat::Toml => Self::parse_toml(&text, path.to_path_buf()),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, LoadError> {
        Self::parse_json(text, PathBuf::from("<inline>"))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, LoadError> {
        Self::parse_toml(text, PathBuf::from("<inline>"))
    }

    /// Serialize in the given format (JSON is pretty-printed)
    pub fn to_string(&self, format: DescriptorFormat) -> Result<String, LoadError> {
        match format {
            DescriptorFormat::Json => serde_json::to_string_pretty(self)
                .map(|mut s| {
                    s.push('\n');
                    s
                })
                .map_err(|e| LoadError::Serialize(e.to_string())),
            DescriptorFormat::Toml => toml::to_string_pretty(self).map_err(|e| LoadError::Serialize(e.to_string())),
        }
    }

    fn parse_json(text: &str, path: PathBuf) -> Result<Self, LoadError> {
        serde_json::from_str(text).map_err(|source| LoadError::ParseJson { path, source })
    }

    fn parse_toml(text: &str, path: PathBuf) -> Result<Self, LoadError> {
        toml::from_str(text).map_err(|source| LoadError::ParseToml { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::presets::{self, RepositoryRef};
    use std::io::Write;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DescriptorFormat::from_path(Path::new("role.toml")), DescriptorFormat::Toml);
        assert_eq!(DescriptorFormat::from_path(Path::new("role.TOML")), DescriptorFormat::Toml);
        assert_eq!(DescriptorFormat::from_path(Path::new("role.json")), DescriptorFormat::Json);
        assert_eq!(DescriptorFormat::from_path(Path::new("role")), DescriptorFormat::Json);
    }

    #[test]
    fn test_toml_descriptor() {
        let text = r#"
[provider]
source = "existing"
arn = "arn:aws:iam::123456789012:oidc-provider/token.actions.githubusercontent.com"

[role]
name = "ReleaseRole"
managed_policies = ["ReadOnlyAccess"]

[role.condition.StringEquals]
"token.actions.githubusercontent.com:aud" = "sts.amazonaws.com"
"token.actions.githubusercontent.com:sub" = ["repo:acme/infra:ref:refs/heads/main", "repo:acme/infra:environment:prod"]
"#;
        let descriptor = Descriptor::from_toml_str(text).unwrap();
        assert_eq!(descriptor.role.name, "ReleaseRole");

        let validated = descriptor.validate().unwrap();
        assert!(validated.provider.is_none());
        assert_eq!(validated.role.managed_policies.len(), 1);
    }

    #[test]
    fn test_file_roundtrip_through_both_formats() {
        let descriptor = presets::least_privilege(&RepositoryRef::new("acme", "infra", "main"), "123456789012");
        let dir = tempfile::tempdir().unwrap();

        for (name, format) in [("role.json", DescriptorFormat::Json), ("role.toml", DescriptorFormat::Toml)] {
            let path = dir.path().join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(descriptor.to_string(format).unwrap().as_bytes()).unwrap();

            assert_eq!(Descriptor::from_path(&path).unwrap(), descriptor);
        }
    }

    #[test]
    fn test_errors_name_the_file() {
        let err = Descriptor::from_path("/nonexistent/role.json").unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/role.json"));

        let err = Descriptor::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, LoadError::ParseJson { .. }));
    }
}
