use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, EngineChoice, InitArgs};

/// Config file names probed in the working directory, first hit wins
pub const CONFIG_FILES: [&str; 4] = ["itf.toml", "itf.yaml", "itf.json", ".itf.toml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Where input comes from and which paths are accepted
    pub input: InputConfig,

    /// Apply-time behavior
    pub apply: ApplyConfig,

    /// Undo/redo history file
    pub history: HistoryConfig,

    /// Per-file snapshot journal
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig
{
    /// File read when neither --clipboard nor --input is given
    pub source_file: PathBuf,
    /// Extension allow-list (empty = everything)
    pub extensions: Vec<String>,
    /// Ordered lookup directories (empty = working directory)
    pub lookup_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig
{
    pub engine: EngineChoice,
    /// Create missing directories without prompting
    pub assume_yes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig
{
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig
{
    pub dir: PathBuf,
    /// Snapshots kept per file; older ones are dropped
    pub max_snapshots: usize,
}

impl Default for InputConfig
{
    fn default() -> Self
    {
        Self {
            source_file: PathBuf::from("itf.txt"),
            extensions: Vec::new(),
            lookup_dirs: Vec::new(),
        }
    }
}

impl Default for ApplyConfig
{
    fn default() -> Self
    {
        Self { engine: EngineChoice::Internal, assume_yes: false }
    }
}

impl Default for HistoryConfig
{
    fn default() -> Self
    {
        Self { state_file: PathBuf::from(".itf_state.json") }
    }
}

impl Default for JournalConfig
{
    fn default() -> Self
    {
        Self { dir: PathBuf::from(".itf/journal"), max_snapshots: 32 }
    }
}

impl Config
{
    /// History file location, anchored at `root` when relative
    pub fn state_path(
        &self,
        root: &Path,
    ) -> PathBuf
    {
        root.join(&self.history.state_file)
    }

    /// Journal directory, anchored at `root` when relative
    pub fn journal_path(
        &self,
        root: &Path,
    ) -> PathBuf
    {
        root.join(&self.journal.dir)
    }
}

/// Load config from the current working directory
pub fn load_config() -> Result<Config>
{
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    load_config_from(&cwd)
}

/// Load config from `dir`, then layer ITF_* environment variables on top
pub fn load_config_from(dir: &Path) -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    for name in &CONFIG_FILES
    {
        let path = dir.join(name);
        if path.exists()
        {
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    // ITF_APPLY__ENGINE=patch, ITF_JOURNAL__MAX_SNAPSHOTS=8, ...
    builder = builder.add_source(
        config::Environment::with_prefix("ITF")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("itf.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    if ctx.dry_run
    {
        println!("DRY RUN: would write {}:\n{}", config_path.display(), toml_string);
        return Ok(());
    }

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
