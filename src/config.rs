//! Settings for the mining pipeline, read from `alphamill.toml`.
//!
//! Every field has a default, so an empty (or absent) file yields a working
//! configuration with five provider profiles and one sample task. API keys
//! never live in the file; each profile names the environment variable that
//! holds its key.
//!
//! # Configuration File Format
//!
//! ```toml
//! active_provider = "deepseek"
//! max_retries = 2
//! request_timeout_secs = 180
//! output_dir = "output"
//!
//! [data]
//! panel = "data/panel.json"
//! index = "data/index.json"
//!
//! [providers.deepseek]
//! base_url = "https://api.deepseek.com"
//! ideation_model = "deepseek-reasoner"
//! coding_model = "deepseek-chat"
//! temperature_ideation = 0.7
//! temperature_coding = 0.0
//! api_key_env = "DEEPSEEK_API_KEY"
//!
//! [[tasks]]
//! idea = "Momentum crash: fast reversal after a sustained run-up"
//! variations = 3
//! ```

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Repair attempts after the first failed execution.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Variants requested per seed idea.
pub const DEFAULT_NUM_VARIATIONS: usize = 3;
/// Per-request timeout for provider calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;
/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "alphamill.toml";

/// Columns of the daily stock panel, as advertised to collaborators.
pub const STOCK_COLUMNS_DESC: [&str; 11] = [
    "TradingDay",
    "SecuCode",
    "PrevClosePrice",
    "OpenPrice",
    "HighPrice",
    "LowPrice",
    "ClosePrice",
    "TurnOverVolume",
    "TurnOverValue",
    "TurnOverRate",
    "FloatMarketValue",
];

/// Columns of the daily index panel.
pub const INDEX_COLUMNS_DESC: [&str; 5] = ["TradingDay", "HS300", "ZZ500", "ZZ1000", "SZ"];

/// Top-level settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Provider used when the CLI does not name one.
    pub active_provider: String,
    /// Repair attempts after the first failed execution.
    pub max_retries: u32,
    /// Per-request timeout for provider calls, in seconds.
    pub request_timeout_secs: u64,
    /// Root for generated code, factor values, and audit records.
    pub output_dir: PathBuf,
    pub data: DataPaths,
    /// Provider profiles keyed by label. Labels from the file extend or
    /// replace the built-in set.
    pub providers: IndexMap<String, ProviderProfile>,
    /// Seed ideas processed by `run` when no ad-hoc idea is given.
    pub tasks: Vec<SeedTask>,
}

/// Input data locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub panel: PathBuf,
    pub index: PathBuf,
}

/// One chat-completions provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderProfile {
    /// Base URL; `/chat/completions` is appended unless already present.
    pub base_url: String,
    /// Model used to propose factor ideas.
    pub ideation_model: String,
    /// Model used to generate and repair code.
    pub coding_model: String,
    #[serde(default = "default_temperature_ideation")]
    pub temperature_ideation: f32,
    #[serde(default = "default_temperature_coding")]
    pub temperature_coding: f32,
    /// Environment variable holding the API key. Keys are never read from
    /// the config file itself.
    pub api_key_env: String,
}

/// One seed idea to expand into variants.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedTask {
    pub idea: String,
    #[serde(default = "default_variations")]
    pub variations: usize,
}

/// Directory layout for one provider's outputs.
#[derive(Debug, Clone)]
pub struct MiningPaths {
    /// Generated factor scripts.
    pub codes_dir: PathBuf,
    /// Persisted factor value tables.
    pub factors_dir: PathBuf,
    /// Audit ledgers.
    pub records_dir: PathBuf,
}

fn default_temperature_ideation() -> f32 {
    0.7
}

fn default_temperature_coding() -> f32 {
    0.0
}

fn default_variations() -> usize {
    DEFAULT_NUM_VARIATIONS
}

fn default_providers() -> IndexMap<String, ProviderProfile> {
    let mut providers = IndexMap::new();
    providers.insert(
        "deepseek".to_string(),
        ProviderProfile {
            base_url: "https://api.deepseek.com".to_string(),
            ideation_model: "deepseek-reasoner".to_string(),
            coding_model: "deepseek-chat".to_string(),
            temperature_ideation: default_temperature_ideation(),
            temperature_coding: default_temperature_coding(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
        },
    );
    providers.insert(
        "gemini".to_string(),
        ProviderProfile {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            ideation_model: "gemini-2.5-pro".to_string(),
            coding_model: "gemini-2.5-flash".to_string(),
            temperature_ideation: default_temperature_ideation(),
            temperature_coding: default_temperature_coding(),
            api_key_env: "GEMINI_API_KEY".to_string(),
        },
    );
    providers.insert(
        "kimi".to_string(),
        ProviderProfile {
            base_url: "https://api.moonshot.cn/v1".to_string(),
            ideation_model: "moonshot-v1-32k".to_string(),
            coding_model: "moonshot-v1-8k".to_string(),
            temperature_ideation: default_temperature_ideation(),
            temperature_coding: default_temperature_coding(),
            api_key_env: "MOONSHOT_API_KEY".to_string(),
        },
    );
    providers.insert(
        "qwen".to_string(),
        ProviderProfile {
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            ideation_model: "qwen-max".to_string(),
            coding_model: "qwen-coder-plus".to_string(),
            temperature_ideation: default_temperature_ideation(),
            temperature_coding: default_temperature_coding(),
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
        },
    );
    providers.insert(
        "zhipu".to_string(),
        ProviderProfile {
            base_url: "https://open.bigmodel.cn/api/paas/v4".to_string(),
            ideation_model: "glm-4-plus".to_string(),
            coding_model: "glm-4-flash".to_string(),
            temperature_ideation: default_temperature_ideation(),
            temperature_coding: default_temperature_coding(),
            api_key_env: "ZHIPU_API_KEY".to_string(),
        },
    );
    providers
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            active_provider: "deepseek".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            output_dir: PathBuf::from("output"),
            data: DataPaths::default(),
            providers: default_providers(),
            tasks: vec![SeedTask {
                idea: "Price-volume divergence: price makes a new high while volume does not"
                    .to_string(),
                variations: DEFAULT_NUM_VARIATIONS,
            }],
        }
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            panel: PathBuf::from("data/panel.json"),
            index: PathBuf::from("data/index.json"),
        }
    }
}

impl Settings {
    /// Load settings, layering the file over built-in defaults.
    ///
    /// An explicitly given path must exist. Without one, `alphamill.toml`
    /// in the working directory is used when present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    bail!("config file not found: {}", path.display());
                }
                Self::from_file(path)
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        // Profiles from the file extend the built-in set rather than
        // replacing it wholesale.
        let mut providers = default_providers();
        for (label, profile) in settings.providers {
            providers.insert(label, profile);
        }
        settings.providers = providers;
        Ok(settings)
    }

    pub fn profile(&self, label: &str) -> Option<&ProviderProfile> {
        self.providers.get(label)
    }

    pub fn provider_labels(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Output layout for one provider: scripts under `codes/`, factor
    /// tables under `factors/`, ledgers at the provider root.
    pub fn paths_for(&self, provider: &str) -> MiningPaths {
        let root = self.output_dir.join(provider);
        MiningPaths {
            codes_dir: root.join("codes"),
            factors_dir: root.join("factors"),
            records_dir: root,
        }
    }
}

impl MiningPaths {
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.codes_dir).context("Failed to create codes directory")?;
        std::fs::create_dir_all(&self.factors_dir)
            .context("Failed to create factors directory")?;
        std::fs::create_dir_all(&self.records_dir)
            .context("Failed to create records directory")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_cover_all_builtin_providers() {
        let settings = Settings::default();
        assert_eq!(settings.active_provider, "deepseek");
        assert_eq!(settings.max_retries, 2);
        for label in ["deepseek", "gemini", "kimi", "qwen", "zhipu"] {
            assert!(settings.profile(label).is_some(), "missing {label}");
        }
        let deepseek = settings.profile("deepseek").unwrap();
        assert_eq!(deepseek.coding_model, "deepseek-chat");
        assert_eq!(deepseek.api_key_env, "DEEPSEEK_API_KEY");
        assert_eq!(deepseek.temperature_coding, 0.0);
        assert_eq!(settings.tasks.len(), 1);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alphamill.toml");
        fs::write(&path, "active_provider = \"kimi\"\nmax_retries = 5\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.active_provider, "kimi");
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(settings.providers.len(), 5);
    }

    #[test]
    fn file_providers_extend_the_builtin_set() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alphamill.toml");
        fs::write(
            &path,
            r#"
[providers.local]
base_url = "http://localhost:8000/v1"
ideation_model = "local-large"
coding_model = "local-small"
api_key_env = "LOCAL_API_KEY"

[[tasks]]
idea = "Overnight gap persistence"
variations = 2
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.providers.len(), 6);
        let local = settings.profile("local").unwrap();
        assert_eq!(local.temperature_ideation, 0.7);
        assert_eq!(local.temperature_coding, 0.0);
        assert_eq!(settings.tasks.len(), 1);
        assert_eq!(settings.tasks[0].variations, 2);
    }

    #[test]
    fn paths_for_nests_outputs_under_the_provider() {
        let settings = Settings::default();
        let paths = settings.paths_for("kimi");
        assert_eq!(paths.codes_dir, PathBuf::from("output/kimi/codes"));
        assert_eq!(paths.factors_dir, PathBuf::from("output/kimi/factors"));
        assert_eq!(paths.records_dir, PathBuf::from("output/kimi"));
    }

    #[test]
    fn ensure_directories_creates_the_layout() {
        let dir = tempdir().unwrap();
        let mut settings = Settings::default();
        settings.output_dir = dir.path().join("out");
        let paths = settings.paths_for("deepseek");
        paths.ensure_directories().unwrap();
        assert!(paths.codes_dir.is_dir());
        assert!(paths.factors_dir.is_dir());
        assert!(paths.records_dir.is_dir());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Settings::load(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
