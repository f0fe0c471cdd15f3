use anyhow::{Context, Result};
use clap::ValueEnum;
use perch_browser::Engine;
use perch_core::config::{AppConfig, ConfigStore};
use perch_core::resolver::PathResolver;
use std::path::PathBuf;

pub mod commands;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
    Table,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Pretty => "pretty",
            OutputFormat::Json => "json",
            OutputFormat::Table => "table",
        }
    }
}

/// Loaded config plus an engine rooted next to it.
pub struct Session {
    pub store: ConfigStore,
    pub config: AppConfig,
    pub engine: Engine,
}

impl Session {
    /// Open the config at `path`, or `~/.perch/config.json`. Deleted
    /// profiles go to `TrashProfiles` beside the config file.
    pub fn open(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => ConfigStore::default_path()?,
        };
        let trash_root = path
            .parent()
            .map(|dir| dir.join("TrashProfiles"))
            .context("Config path has no parent directory")?;

        let store = ConfigStore::new(path);
        let config = store.load();
        let engine = Engine::new(PathResolver::from_env(), trash_root)?;

        Ok(Self {
            store,
            config,
            engine,
        })
    }

    pub fn save(&self) -> Result<()> {
        self.store
            .save(&self.config)
            .with_context(|| format!("Failed to save {}", self.store.path().display()))
    }
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}
