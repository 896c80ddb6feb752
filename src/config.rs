use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

// ── Profile ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// OpenAI-compatible base URL; `/chat/completions` is appended
    pub endpoint: String,
    /// Model identifier
    pub model: String,
    /// Optional API key (sent as Bearer token)
    pub api_key: Option<String>,
    /// Sampling seed sent with every request. Omit to let the server choose.
    #[serde(default = "default_seed")]
    pub seed: Option<i64>,
    /// Sent as a system message ahead of the conversation on every request
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Column at which the transcript wraps on wide terminals
    #[serde(default = "default_word_wrap")]
    pub word_wrap: u16,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Exit the program when a reply fails instead of reporting it inline.
    #[serde(default)]
    pub fail_fast: bool,
}

fn default_seed() -> Option<i64> {
    Some(1)
}

fn default_word_wrap() -> u16 {
    180
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            endpoint: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            model: "deepseek-v3".to_string(),
            api_key: None,
            seed: default_seed(),
            system_prompt: None,
            word_wrap: default_word_wrap(),
            connect_timeout_secs: default_connect_timeout_secs(),
            fail_fast: false,
        }
    }
}

// ── Config file ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Which profile to use when none is specified
    #[serde(default = "default_profile_name")]
    pub default_profile: String,

    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

fn default_profile_name() -> String {
    "default".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            default_profile: default_profile_name(),
            profiles: HashMap::new(),
        }
    }
}

impl ConfigFile {
    /// Load from the standard location, or defaults if the file doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    /// Write a starter config file to disk (only if it doesn't exist).
    pub fn write_default_if_missing() -> Result<PathBuf> {
        let path = config_path();
        write_default_to(&path)?;
        Ok(path)
    }

    /// Resolve the active profile given an optional override name.
    pub fn resolve_profile(&self, name: Option<&str>) -> Option<&Profile> {
        let key = name.unwrap_or(&self.default_profile);
        self.profiles.get(key)
    }
}

fn write_default_to(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

// ── Resolved runtime config (after merging file + CLI overrides) ──────────────

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Profile name that was resolved (for display)
    pub profile_name: String,
    pub seed: Option<i64>,
    pub system_prompt: Option<String>,
    pub word_wrap: u16,
    pub connect_timeout_secs: u64,
    pub fail_fast: bool,
}

impl ResolvedConfig {
    /// Merge config file profile with CLI overrides.
    /// Priority: CLI args > env vars (handled by clap) > config file profile > built-in defaults
    pub fn resolve(
        file: &ConfigFile,
        profile_override: Option<&str>,
        endpoint_override: Option<&str>,
        model_override: Option<&str>,
        api_key_override: Option<&str>,
    ) -> Self {
        let profile_name = profile_override
            .unwrap_or(&file.default_profile)
            .to_string();

        let base = file
            .resolve_profile(profile_override)
            .cloned()
            .unwrap_or_default();

        Self {
            endpoint: endpoint_override
                .map(str::to_string)
                .unwrap_or(base.endpoint),
            model: model_override
                .map(str::to_string)
                .unwrap_or(base.model),
            api_key: api_key_override
                .map(str::to_string)
                .or(base.api_key)
                .filter(|k| !k.trim().is_empty()),
            profile_name,
            seed: base.seed,
            system_prompt: base.system_prompt.filter(|s| !s.trim().is_empty()),
            word_wrap: base.word_wrap.max(20),
            connect_timeout_secs: base.connect_timeout_secs,
            fail_fast: base.fail_fast,
        }
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn config_path() -> PathBuf {
    dirs_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("askgpt")
        .join("config.toml")
}

fn dirs_config_dir() -> Option<PathBuf> {
    // XDG_CONFIG_HOME or ~/.config on Linux/macOS, %APPDATA% on Windows
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("APPDATA").ok().map(PathBuf::from))
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
}

/// Where the log file lives: `$XDG_STATE_HOME/askgpt` or `~/.local/state/askgpt`.
pub fn state_dir() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".local/state")
        })
        .join("askgpt")
}

// ── Default config template written on first run ──────────────────────────────

const DEFAULT_CONFIG_TOML: &str = r#"# askgpt configuration
# Run `askgpt --init` to regenerate this file.

default_profile = "default"

# ── DashScope compatible mode (default) ───────────────────────────────────────
[profiles.default]
endpoint = "https://dashscope.aliyuncs.com/compatible-mode/v1"
model    = "deepseek-v3"
seed     = 1
# api_key = "sk-..."        # or export API_KEY / ASKGPT_API_KEY
# system_prompt = "You are a concise assistant."
# word_wrap = 180            # transcript wrap column on wide terminals
# connect_timeout_secs = 10
# fail_fast = false          # exit on the first failed reply

# ── OpenAI ───────────────────────────────────────────────────────────────────
# [profiles.openai]
# endpoint = "https://api.openai.com/v1"
# model    = "gpt-4o"
# api_key  = "sk-..."

# ── Local Ollama ─────────────────────────────────────────────────────────────
# [profiles.local]
# endpoint = "http://localhost:11434/v1"
# model    = "qwen3:14b"
# api_key  = "ollama"
"#;
