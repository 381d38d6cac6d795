use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ExpanderError, ExpanderResult};

const CONFIG_FILE: &str = "config.toml";
const APP_DIR: &str = "thread-expander";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpanderConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default)]
    pub labels: LabelRulesConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Consecutive empty scans before a run is considered complete.
    pub idle_limit: u32,
    /// Hard ceiling on loop iterations per run.
    pub safety_limit: u32,
    /// Polls performed by the state-change strategy.
    pub state_checks: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            idle_limit: 10,
            safety_limit: 600,
            state_checks: 12,
        }
    }
}

/// Fixed pauses, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub idle_delay_ms: u64,
    pub scroll_delay_ms: u64,
    pub post_click_delay_ms: u64,
    pub state_check_interval_ms: u64,
    pub mutation_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            idle_delay_ms: 450,
            scroll_delay_ms: 220,
            post_click_delay_ms: 180,
            state_check_interval_ms: 150,
            mutation_timeout_ms: 6500,
        }
    }
}

impl TimingConfig {
    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn scroll_delay(&self) -> Duration {
        Duration::from_millis(self.scroll_delay_ms)
    }

    pub fn post_click_delay(&self) -> Duration {
        Duration::from_millis(self.post_click_delay_ms)
    }

    pub fn state_check_interval(&self) -> Duration {
        Duration::from_millis(self.state_check_interval_ms)
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }
}

/// Selector strings in the supported CSS subset (see `perception::selector`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub primary_column: String,
    pub quoted_post: String,
    pub show_more_text: String,
    pub control: String,
    pub post: String,
    pub link: String,
    /// Fragments of `data-testid` that mark an inline show-more control.
    pub marker_test_ids: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            primary_column: r#"[data-testid="primaryColumn"]"#.into(),
            quoted_post: r#"[data-testid="quoteTweet"], [data-testid="quoted_tweet"]"#.into(),
            show_more_text: r#"button[data-testid="tweet-text-show-more-link"]"#.into(),
            control: "button".into(),
            post: "article".into(),
            link: "a[href]".into(),
            marker_test_ids: vec!["tweet-text-show-more".into(), "show-more".into()],
        }
    }
}

/// Ordered, case-insensitive label pattern tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelRulesConfig {
    pub forbidden: Vec<String>,
    pub replies: Vec<String>,
    pub show_more: Vec<String>,
}

impl Default for LabelRulesConfig {
    fn default() -> Self {
        Self {
            forbidden: vec![
                r"quote\s+tweets?".into(),
                r"quoted\s+reply".into(),
                r"share\s+tweet".into(),
            ],
            replies: vec![
                r"^\s*(show|view|load)\s+(more\s+)?repl(y|ies)\b.*$".into(),
                r"^\s*more\s+repl(y|ies)\b.*$".into(),
                r"^\s*show\s+additional\s+repl(y|ies)\b.*$".into(),
                r"^\s*show\s+\d+\s+more\s+repl(y|ies)\b.*$".into(),
                r"^\s*show\s+replies\b.*$".into(),
                r"^\s*view\s+replies\b.*$".into(),
            ],
            show_more: vec![
                r"^\s*(show|see|read|view)\s+(more|all)\b.*$".into(),
                r"^\s*show\s+(entire|complete|full)\b.*$".into(),
                r"^\s*show\s+(this\s+)?thread\b.*$".into(),
                r"^\s*show\s+conversation\b.*$".into(),
                r"^\s*show\s*more\s*$".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Count a trigger whose effect was never observed as an expansion.
    pub count_unverified_as_success: bool,
}

fn resolve_config_path() -> ExpanderResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join(APP_DIR).join(CONFIG_FILE);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config directory");
            return Ok(candidate);
        }
    }

    Err(ExpanderError::Config(
        "config.toml not found next to executable, in working directory or user config directory"
            .into(),
    ))
}

pub fn load_config() -> ExpanderResult<ExpanderConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> ExpanderResult<ExpanderConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: ExpanderConfig = toml::from_str(&content)?;
    tracing::info!(
        path = %path.display(),
        idle_limit = config.limits.idle_limit,
        safety_limit = config.limits.safety_limit,
        "config loaded"
    );
    Ok(config)
}

/// Loads the config file if one exists, otherwise the built-in defaults.
pub fn load_or_default() -> ExpanderConfig {
    match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "using default expander config");
            ExpanderConfig::default()
        }
    }
}

pub fn save_config(config: &ExpanderConfig, path: &Path) -> ExpanderResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
