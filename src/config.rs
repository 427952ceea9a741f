use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PunitoError, Result};
use crate::pipeline::Stage;
use crate::prompts::BUILTIN_TEST_EXAMPLE;

/// Config filename looked up in the project root.
pub const CONFIG_FILE: &str = "punito.toml";

/// Project-level configuration resolved from the working directory.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory relative paths in the settings are resolved against.
    pub project_root: PathBuf,
    /// Path to the config file.
    pub config_path: PathBuf,
    /// User settings loaded from the config file.
    pub settings: UserSettings,
}

/// User-configurable settings from punito.toml.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub llm: LlmSettings,
    pub generation: GenerationSettings,
}

/// Chat-completions backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Model name sent with every request.
    pub model: String,
    pub base_url: String,
    /// Path appended to `base_url`.
    pub endpoint: String,
    /// Sent as a bearer token when set.
    pub api_key: Option<String>,
    /// Request server-sent events instead of a single response.
    pub streaming: bool,
    /// Whole-request timeout; no limit when absent.
    pub timeout_secs: Option<u64>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            base_url: "http://localhost:8000/v1".into(),
            endpoint: "/chat/completions".into(),
            api_key: None,
            streaming: true,
            timeout_secs: None,
        }
    }
}

/// Test generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Bundles generated in parallel.
    pub concurrency: usize,
    /// Stage names in pipeline order.
    pub stages: Vec<String>,
    /// Appended to the class name to name the test class.
    pub test_suffix: String,
    pub output_dir: String,
    /// Example test class offered to the model.
    pub test_example: Option<String>,
    /// Directory of YAML prompt templates overriding the built-in ones.
    pub prompts_dir: Option<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            stages: Stage::ALL.iter().map(|s| s.name().to_string()).collect(),
            test_suffix: "MockitoTest".into(),
            output_dir: "generated_tests".into(),
            test_example: None,
            prompts_dir: None,
        }
    }
}

impl GenerationSettings {
    /// Parsed stage list, rejecting unknown names and out-of-order stages.
    pub fn stages(&self) -> Result<Vec<Stage>> {
        Stage::parse_list(&self.stages)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(PunitoError::Config(
                "generation.concurrency must be at least 1".into(),
            ));
        }
        if self.test_suffix.trim().is_empty() {
            return Err(PunitoError::Config(
                "generation.test_suffix must not be empty".into(),
            ));
        }
        self.stages().map(|_| ())
    }
}

impl Config {
    /// Create config for a given project root, reading `punito.toml` if present.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let config_path = project_root.join(CONFIG_FILE);
        let settings = Self::load_settings(&config_path).unwrap_or_default();
        Self {
            project_root,
            config_path,
            settings,
        }
    }

    /// Create config from an explicit file; relative settings resolve against its directory.
    pub fn from_file(config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        let project_root = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let settings = Self::load_settings(&config_path).unwrap_or_default();
        Self {
            project_root,
            config_path,
            settings,
        }
    }

    /// Create config from the current working directory.
    pub fn from_cwd() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| PunitoError::Config(format!("cannot get cwd: {e}")))?;
        Ok(Self::new(cwd))
    }

    /// Load settings from the config file if it exists.
    fn load_settings(config_path: &Path) -> Option<UserSettings> {
        if !config_path.exists() {
            return None;
        }
        let content = std::fs::read_to_string(config_path).ok()?;
        match toml::from_str(&content) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "invalid config, using defaults");
                None
            }
        }
    }

    /// Save current settings to the config file.
    pub fn save_settings(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&self.settings)
            .map_err(|e| PunitoError::Config(format!("failed to serialize settings: {e}")))?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.settings.generation.output_dir)
    }

    #[must_use]
    pub fn prompts_dir(&self) -> Option<PathBuf> {
        self.settings
            .generation
            .prompts_dir
            .as_deref()
            .map(|p| self.resolve(p))
    }

    /// Example test class text; the built-in example when none is configured.
    pub fn test_example(&self) -> Result<String> {
        match self.settings.generation.test_example.as_deref() {
            Some(path) => Ok(std::fs::read_to_string(self.resolve(path))?),
            None => Ok(BUILTIN_TEST_EXAMPLE.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_new_sets_paths() {
        let cfg = Config::new("/tmp/project");
        assert_eq!(cfg.project_root, PathBuf::from("/tmp/project"));
        assert_eq!(cfg.config_path, PathBuf::from("/tmp/project/punito.toml"));
        assert_eq!(cfg.output_dir(), PathBuf::from("/tmp/project/generated_tests"));
    }

    #[test]
    fn default_settings() {
        let settings = UserSettings::default();
        assert_eq!(settings.llm.endpoint, "/chat/completions");
        assert!(settings.llm.streaming);
        assert!(settings.llm.timeout_secs.is_none());
        assert_eq!(settings.generation.concurrency, 3);
        assert_eq!(
            settings.generation.stages,
            vec!["plan", "tests", "review", "refine"]
        );
        assert_eq!(settings.generation.test_suffix, "MockitoTest");
        assert!(settings.generation.validate().is_ok());
    }

    #[test]
    fn save_and_load_settings() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = Config::new(tmp.path());
        cfg.settings.llm.model = "codellama".into();
        cfg.settings.llm.timeout_secs = Some(120);
        cfg.settings.generation.concurrency = 5;

        cfg.save_settings().unwrap();
        assert!(cfg.config_path.exists());

        let cfg2 = Config::new(tmp.path());
        assert_eq!(cfg2.settings, cfg.settings);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "[llm]\nmodel = \"qwen\"\n\n[generation]\nstages = [\"tests\"]\n",
        )
        .unwrap();
        let cfg = Config::new(tmp.path());
        assert_eq!(cfg.settings.llm.model, "qwen");
        assert_eq!(cfg.settings.llm.endpoint, "/chat/completions");
        assert_eq!(cfg.settings.generation.stages().unwrap(), vec![Stage::Tests]);
    }

    #[test]
    fn load_invalid_config_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "invalid toml {{{{").unwrap();
        let cfg = Config::new(tmp.path());
        assert_eq!(cfg.settings, UserSettings::default());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut settings = GenerationSettings {
            concurrency: 0,
            ..GenerationSettings::default()
        };
        assert!(settings.validate().is_err());
        settings.concurrency = 2;
        settings.stages = vec!["review".into(), "plan".into()];
        assert!(settings.validate().is_err());
        settings.stages = vec!["polish".into()];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn relative_paths_resolve_against_the_config_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("Example.java"), "class Example {}").unwrap();
        let mut cfg = Config::from_file(tmp.path().join("custom.toml"));
        assert!(cfg.test_example().unwrap().contains("@InjectMocks"));
        cfg.settings.generation.test_example = Some("Example.java".into());
        cfg.settings.generation.prompts_dir = Some("/abs/prompts".into());
        assert_eq!(cfg.test_example().unwrap(), "class Example {}");
        assert_eq!(cfg.prompts_dir(), Some(PathBuf::from("/abs/prompts")));
    }
}
