//! Configuration loading.
//!
//! Lookup order: `--config`, `~/.crewforge/config.yaml`, `./crewforge.yaml`,
//! then built-in defaults. A missing `llm.api_key` is filled from the
//! provider's environment variable.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use pipeline::TeamConfig;
use tracing::{debug, info};

const USER_CONFIG: &str = ".crewforge/config.yaml";
const LOCAL_CONFIG: &str = "crewforge.yaml";

/// Loads and resolves the configuration. Validation is left to the caller,
/// which may still override fields from the command line.
pub fn load(explicit: Option<&Path>) -> Result<TeamConfig> {
    let source = match explicit {
        Some(path) if !path.is_file() => bail!("config file not found: {}", path.display()),
        Some(path) => Some(path.to_path_buf()),
        None => default_locations().into_iter().find(|p| p.is_file()),
    };

    let mut config = match &source {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let config = parse(&text).with_context(|| format!("invalid config file {}", path.display()))?;
            info!(path = %path.display(), "Loaded configuration");
            config
        }
        None => {
            debug!("No config file found, using defaults");
            TeamConfig::default()
        }
    };
    fill_api_key(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Parses YAML config text; blank text yields the defaults.
pub fn parse(text: &str) -> Result<TeamConfig> {
    if text.trim().is_empty() {
        return Ok(TeamConfig::default());
    }
    Ok(serde_yaml::from_str(text)?)
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(home) = std::env::var_os("HOME").filter(|h| !h.is_empty()) {
        locations.push(PathBuf::from(home).join(USER_CONFIG));
    }
    locations.push(PathBuf::from(LOCAL_CONFIG));
    locations
}

fn fill_api_key(config: &mut TeamConfig, lookup: impl Fn(&str) -> Option<String>) {
    let configured = config
        .llm
        .api_key
        .as_deref()
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false);
    if !configured {
        config.llm.api_key = lookup(config.llm.provider.api_key_env()).filter(|k| !k.trim().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::LlmProviderKind;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = parse(
            "llm:\n  provider: openai\n  model_id: gpt-4o\nnum_developers: 3\nexecution:\n  max_remediation_rounds: 2\n",
        )
        .unwrap();
        assert_eq!(config.llm.provider, LlmProviderKind::OpenAi);
        assert_eq!(config.llm.model(), "gpt-4o");
        assert_eq!(config.llm.max_tokens, 8192);
        assert_eq!(config.num_developers, 3);
        assert_eq!(config.execution.max_remediation_rounds, 2);
        assert_eq!(config.execution.max_attempts, 3);
    }

    #[test]
    fn test_blank_text_is_default() {
        assert_eq!(parse("  \n").unwrap(), TeamConfig::default());
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        assert!(parse("llm:\n  provider: watson\n").is_err());
    }

    #[test]
    fn test_api_key_falls_back_to_provider_env() {
        let mut config = parse("llm:\n  provider: anthropic\n").unwrap();
        fill_api_key(&mut config, |name| {
            (name == "ANTHROPIC_API_KEY").then(|| "sk-ant".to_string())
        });
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-ant"));

        let mut explicit = parse("llm:\n  provider: anthropic\n  api_key: from-file\n").unwrap();
        fill_api_key(&mut explicit, |_| Some("from-env".into()));
        assert_eq!(explicit.llm.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("team.yaml");
        std::fs::write(&path, "num_developers: 4\nworkspace_dir: ./generated\n").unwrap();
        let config = load(Some(&path)).unwrap();
        assert_eq!(config.num_developers, 4);
        assert_eq!(config.workspace_dir, PathBuf::from("./generated"));

        assert!(load(Some(&dir.path().join("missing.yaml"))).is_err());
    }
}
