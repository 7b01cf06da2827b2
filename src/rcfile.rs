use crate::cli::CliArgs;
use ripl::{HistoryStore, PromptStyle, ReplConfig, SessionRegistry};
use std::env;
use std::path::PathBuf;

/// Get home directory
pub(crate) fn dirs_home() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

/// Expand a leading `~/` to the home directory
pub(crate) fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs_home()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if path == "~" => dirs_home().unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    }
}

/// `$RIPL_CONFIG`, else `~/.riplrc.toml`
pub(crate) fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os("RIPL_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs_home().map(|h| h.join(".riplrc.toml"))
}

/// Load the config file, then apply command-line overrides.
/// A broken config file is reported and ignored.
pub(crate) fn load_config(cli: &CliArgs) -> ReplConfig {
    let mut config = match config_path() {
        Some(path) => ReplConfig::load(&path).unwrap_or_else(|e| {
            eprintln!("Warning: {}: {}", path.display(), e);
            ReplConfig::default()
        }),
        None => ReplConfig::default(),
    };
    if cli.simple_prompt {
        config.prompt = PromptStyle::Simple;
    }
    if cli.no_history {
        config.history.should_load = false;
        config.history.should_save = false;
    }
    config
}

/// History file named by the config, defaulting to `~/.ripl_history`
pub(crate) fn history_path(config: &ReplConfig) -> Option<PathBuf> {
    match &config.history.file {
        Some(file) => Some(expand_home(file)),
        None => dirs_home().map(|h| h.join(".ripl_history")),
    }
}

/// Registry for interactive sessions, persisting typed lines per the config
pub(crate) fn registry(config: &ReplConfig) -> SessionRegistry {
    let registry = SessionRegistry::new().with_eval_path(config.eval_path.clone());
    match history_path(config) {
        Some(path) => registry.with_history_store(
            HistoryStore::new(path)
                .with_load(config.history.should_load)
                .with_save(config.history.should_save),
        ),
        None => registry,
    }
}
