// Seeding configuration
//
// Design Decision: Precedence is flag > environment > config file > default.
// clap resolves flag vs environment; the file only fills what neither set.
// Design Decision: Defaults reproduce the original seeding run.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use regseed_fanout::RetryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reference::{validate_namespace, validate_registry, validate_tag, ImageReference};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Target selection flags shared by `push` and `plan`
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Namespaces to seed, repeatable or comma separated [default: a,b,c,d]
    #[arg(
        long = "namespace",
        short = 'n',
        env = "REGSEED_NAMESPACES",
        value_delimiter = ','
    )]
    pub namespaces: Vec<String>,

    /// Registry address as <host>:<port> [default: localhost:80]
    #[arg(long, env = "REGSEED_REGISTRY")]
    pub registry: Option<String>,

    /// Image to re-tag [default: alpine]
    #[arg(long, env = "REGSEED_SOURCE_IMAGE")]
    pub source_image: Option<String>,

    /// First repository number, inclusive [default: 180]
    #[arg(long)]
    pub first_tag: Option<u32>,

    /// Last repository number, inclusive [default: 184]
    #[arg(long)]
    pub last_tag: Option<u32>,

    /// Tag applied to every reference [default: testing]
    #[arg(long, env = "REGSEED_TAG_SUFFIX")]
    pub tag_suffix: Option<String>,

    /// Number of namespaces processed at once [default: 4]
    #[arg(long, short = 'j', env = "REGSEED_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Image tool binary [default: docker]
    #[arg(long, env = "REGSEED_TOOL")]
    pub tool: Option<String>,

    /// Argument passed to the tool before its subcommand (repeatable)
    #[arg(long = "tool-arg", allow_hyphen_values = true)]
    pub tool_args: Vec<String>,

    /// Timeout for each tool invocation, in seconds [default: 300]
    #[arg(long)]
    pub command_timeout_secs: Option<u64>,

    /// Attempts per tool invocation, 1 disables retries [default: 1]
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

/// Fully resolved seeding configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeedConfig {
    pub namespaces: Vec<String>,
    pub registry: String,
    pub source_image: String,
    pub first_tag: u32,
    pub last_tag: u32,
    pub tag_suffix: String,
    pub concurrency: usize,
    pub tool: String,
    pub tool_args: Vec<String>,
    pub command_timeout_secs: u64,
    pub max_attempts: u32,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            namespaces: ["a", "b", "c", "d"].map(String::from).to_vec(),
            registry: "localhost:80".to_string(),
            source_image: "alpine".to_string(),
            first_tag: 180,
            last_tag: 184,
            tag_suffix: "testing".to_string(),
            concurrency: 4,
            tool: "docker".to_string(),
            tool_args: vec![],
            command_timeout_secs: 300,
            max_attempts: 1,
        }
    }
}

impl SeedConfig {
    /// Resolve configuration from an optional file plus command-line flags
    pub fn load(path: Option<&Path>, args: &TargetArgs) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML config file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields with values given on the command line or environment
    pub fn apply_args(&mut self, args: &TargetArgs) {
        if !args.namespaces.is_empty() {
            self.namespaces = args
                .namespaces
                .iter()
                .map(|ns| ns.trim().to_string())
                .collect();
        }
        if let Some(registry) = &args.registry {
            self.registry = registry.clone();
        }
        if let Some(image) = &args.source_image {
            self.source_image = image.clone();
        }
        if let Some(first) = args.first_tag {
            self.first_tag = first;
        }
        if let Some(last) = args.last_tag {
            self.last_tag = last;
        }
        if let Some(suffix) = &args.tag_suffix {
            self.tag_suffix = suffix.clone();
        }
        if let Some(concurrency) = args.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(tool) = &args.tool {
            self.tool = tool.clone();
        }
        if !args.tool_args.is_empty() {
            self.tool_args = args.tool_args.clone();
        }
        if let Some(timeout) = args.command_timeout_secs {
            self.command_timeout_secs = timeout;
        }
        if let Some(attempts) = args.max_attempts {
            self.max_attempts = attempts;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.namespaces.is_empty() {
            return invalid("at least one namespace is required".into());
        }
        for (i, namespace) in self.namespaces.iter().enumerate() {
            validate_namespace(namespace).map_err(ConfigError::Invalid)?;
            if self.namespaces[..i].contains(namespace) {
                return invalid(format!("namespace '{namespace}' is listed more than once"));
            }
        }
        validate_registry(&self.registry).map_err(ConfigError::Invalid)?;
        validate_tag(&self.tag_suffix).map_err(ConfigError::Invalid)?;

        if self.source_image.trim().is_empty() {
            return invalid("source_image must not be empty".into());
        }
        if self.first_tag > self.last_tag {
            return invalid(format!(
                "first_tag ({}) must not be greater than last_tag ({})",
                self.first_tag, self.last_tag
            ));
        }
        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1".into());
        }
        if self.tool.trim().is_empty() {
            return invalid("tool must not be empty".into());
        }
        if self.command_timeout_secs == 0 {
            return invalid("command_timeout_secs must be at least 1".into());
        }
        if self.max_attempts == 0 {
            return invalid("max_attempts must be at least 1".into());
        }
        Ok(())
    }

    /// Repository numbers to seed in every namespace
    pub fn repositories(&self) -> RangeInclusive<u32> {
        self.first_tag..=self.last_tag
    }

    /// All destination references for one namespace, in repository order
    pub fn references(&self, namespace: &str) -> Vec<ImageReference> {
        self.repositories()
            .map(|n| ImageReference::new(&self.registry, namespace, n, &self.tag_suffix))
            .collect()
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Retry policy for each tool invocation
    pub fn retry_policy(&self) -> RetryPolicy {
        if self.max_attempts <= 1 {
            RetryPolicy::no_retry()
        } else {
            RetryPolicy::exponential()
                .with_max_attempts(self.max_attempts)
                .with_max_interval(Duration::from_secs(30))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_original_run() {
        let config = SeedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.namespaces, vec!["a", "b", "c", "d"]);
        assert_eq!(config.concurrency, 4);

        let references: Vec<String> = config
            .references("a")
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            references,
            vec![
                "localhost:80/a/180:testing",
                "localhost:80/a/181:testing",
                "localhost:80/a/182:testing",
                "localhost:80/a/183:testing",
                "localhost:80/a/184:testing",
            ]
        );
    }

    #[test]
    fn test_args_override_defaults() {
        let args = TargetArgs {
            namespaces: vec!["x".into(), " y ".into()],
            registry: Some("registry.local:5000".into()),
            first_tag: Some(1),
            last_tag: Some(2),
            concurrency: Some(2),
            tool: Some("podman".into()),
            tool_args: vec!["--log-level=debug".into()],
            max_attempts: Some(3),
            ..Default::default()
        };

        let config = SeedConfig::load(None, &args).unwrap();
        assert_eq!(config.namespaces, vec!["x", "y"]);
        assert_eq!(config.registry, "registry.local:5000");
        assert_eq!(config.repositories(), 1..=2);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.tool, "podman");
        assert_eq!(config.tool_args, vec!["--log-level=debug"]);
        assert_eq!(config.source_image, "alpine");
        assert_eq!(config.retry_policy().max_attempts, 3);
    }

    #[test]
    fn test_file_values_with_flag_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "namespaces: [team-a, team-b]\nregistry: \"localhost:5000\"\ntag_suffix: nightly\nconcurrency: 8"
        )
        .unwrap();

        let args = TargetArgs {
            concurrency: Some(1),
            ..Default::default()
        };
        let config = SeedConfig::load(Some(file.path()), &args).unwrap();

        assert_eq!(config.namespaces, vec!["team-a", "team-b"]);
        assert_eq!(config.registry, "localhost:5000");
        assert_eq!(config.tag_suffix, "nightly");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.first_tag, 180);
    }

    #[test]
    fn test_unknown_file_keys_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "namespace: a").unwrap();

        let err = SeedConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = SeedConfig::from_file(Path::new("/nonexistent/regseed.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_validation_errors() {
        let cases: Vec<(&str, Box<dyn Fn(&mut SeedConfig)>)> = vec![
            ("no namespaces", Box::new(|c| c.namespaces.clear())),
            (
                "duplicate namespace",
                Box::new(|c| c.namespaces = vec!["a".into(), "a".into()]),
            ),
            ("bad namespace", Box::new(|c| c.namespaces = vec!["A".into()])),
            ("bad registry", Box::new(|c| c.registry = "localhost".into())),
            ("bad tag", Box::new(|c| c.tag_suffix = "a:b".into())),
            ("empty image", Box::new(|c| c.source_image = " ".into())),
            (
                "inverted range",
                Box::new(|c| {
                    c.first_tag = 10;
                    c.last_tag = 9;
                }),
            ),
            ("zero concurrency", Box::new(|c| c.concurrency = 0)),
            ("empty tool", Box::new(|c| c.tool = String::new())),
            ("zero timeout", Box::new(|c| c.command_timeout_secs = 0)),
            ("zero attempts", Box::new(|c| c.max_attempts = 0)),
        ];

        for (name, mutate) in cases {
            let mut config = SeedConfig::default();
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_single_tag_range() {
        let config = SeedConfig {
            first_tag: 5,
            last_tag: 5,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.references("a").len(), 1);
    }

    #[test]
    fn test_retry_policy_disabled_by_default() {
        let config = SeedConfig::default();
        assert_eq!(config.retry_policy(), RetryPolicy::no_retry());
        assert_eq!(config.command_timeout(), Duration::from_secs(300));
    }
}
