// Image reference construction and validation
//
// References have the form `<host>:<port>/<namespace>/<repository>:<tag>`,
// e.g. `localhost:80/a/180:testing`.

use std::fmt;

use serde::{Serialize, Serializer};

const MAX_TAG_LEN: usize = 128;

/// Destination reference for one tag/push pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub namespace: String,
    pub repository: u32,
    pub tag: String,
}

impl ImageReference {
    pub fn new(registry: &str, namespace: &str, repository: u32, tag: &str) -> Self {
        Self {
            registry: registry.to_string(),
            namespace: namespace.to_string(),
            repository,
            tag: tag.to_string(),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}:{}",
            self.registry, self.namespace, self.repository, self.tag
        )
    }
}

impl Serialize for ImageReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Check a `<host>:<port>` registry address
pub fn validate_registry(registry: &str) -> Result<(), String> {
    let Some((host, port)) = registry.rsplit_once(':') else {
        return Err(format!("registry '{registry}' must be <host>:<port>"));
    };
    if host.is_empty() || host.contains('/') || host.chars().any(char::is_whitespace) {
        return Err(format!("registry '{registry}' has an invalid host"));
    }
    if port.parse::<u16>().is_err() {
        return Err(format!("registry '{registry}' has an invalid port '{port}'"));
    }
    Ok(())
}

/// Check a repository namespace: lowercase path components separated by `/`
pub fn validate_namespace(namespace: &str) -> Result<(), String> {
    if namespace.is_empty() {
        return Err("namespace must not be empty".to_string());
    }
    for component in namespace.split('/') {
        let valid_chars = component
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
        let starts_ok = component
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let ends_ok = component
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !(valid_chars && starts_ok && ends_ok) {
            return Err(format!(
                "namespace '{namespace}' must be lowercase letters, digits and separators (. _ -)"
            ));
        }
    }
    Ok(())
}

/// Check an image tag
pub fn validate_tag(tag: &str) -> Result<(), String> {
    if tag.is_empty() || tag.len() > MAX_TAG_LEN {
        return Err(format!("tag must be 1 to {MAX_TAG_LEN} characters"));
    }
    let valid_chars = tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !valid_chars || tag.starts_with(['.', '-']) {
        return Err(format!("tag '{tag}' contains invalid characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_format() {
        let reference = ImageReference::new("localhost:80", "a", 180, "testing");
        assert_eq!(reference.to_string(), "localhost:80/a/180:testing");
    }

    #[test]
    fn test_reference_serializes_as_string() {
        let reference = ImageReference::new("registry.local:5000", "team/x", 7, "v1");
        assert_eq!(
            serde_json::to_value(&reference).unwrap(),
            serde_json::json!("registry.local:5000/team/x/7:v1")
        );
    }

    #[test]
    fn test_validate_registry() {
        assert!(validate_registry("localhost:80").is_ok());
        assert!(validate_registry("10.0.0.1:5000").is_ok());
        assert!(validate_registry("localhost").is_err());
        assert!(validate_registry(":80").is_err());
        assert!(validate_registry("localhost:http").is_err());
        assert!(validate_registry("localhost:70000").is_err());
        assert!(validate_registry("a/b:80").is_err());
    }

    #[test]
    fn test_validate_namespace() {
        assert!(validate_namespace("a").is_ok());
        assert!(validate_namespace("team-1/sub_project").is_ok());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("Upper").is_err());
        assert!(validate_namespace("-lead").is_err());
        assert!(validate_namespace("trail.").is_err());
        assert!(validate_namespace("a//b").is_err());
        assert!(validate_namespace("has space").is_err());
    }

    #[test]
    fn test_validate_tag() {
        assert!(validate_tag("testing").is_ok());
        assert!(validate_tag("V1.2_rc-3").is_ok());
        assert!(validate_tag("").is_err());
        assert!(validate_tag(".hidden").is_err());
        assert!(validate_tag("-dash").is_err());
        assert!(validate_tag("a:b").is_err());
        assert!(validate_tag(&"x".repeat(129)).is_err());
    }
}
