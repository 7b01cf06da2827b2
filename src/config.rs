//! Configuration file (`~/.riplrc.toml`)
//!
//! ```toml
//! memory_size = 100
//! prompt = "default"      # "default", "simple" or "none"
//! eval_path = "(ripl)"
//!
//! [history]
//! should_save = true
//! should_load = true
//! file = "~/.ripl_history"
//! ```
//!
//! Every key is optional.

use crate::error::ReplError;
use crate::prompt::Prompt;
use crate::registry::DEFAULT_EVAL_PATH;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_MEMORY_SIZE: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// Capacity of the input and output histories
    pub memory_size: usize,
    pub prompt: PromptStyle,
    /// Virtual file name input is evaluated under
    pub eval_path: String,
    pub history: HistoryConfig,
}

impl Default for ReplConfig {
    fn default() -> Self {
        ReplConfig {
            memory_size: DEFAULT_MEMORY_SIZE,
            prompt: PromptStyle::Default,
            eval_path: DEFAULT_EVAL_PATH.to_string(),
            history: HistoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    #[default]
    Default,
    Simple,
    None,
}

impl PromptStyle {
    pub fn prompt(self) -> Prompt {
        match self {
            PromptStyle::Default => Prompt::default_prompt(),
            PromptStyle::Simple => Prompt::simple(),
            PromptStyle::None => Prompt::none(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub should_save: bool,
    pub should_load: bool,
    /// History file; `~` expands to the home directory. Unset means
    /// `~/.ripl_history`.
    pub file: Option<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            should_save: true,
            should_load: true,
            file: None,
        }
    }
}

impl ReplConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ReplError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ReplError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}
