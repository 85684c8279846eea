use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use oskit::os;

use crate::cli::{Cli, Command, ConfigCommand, CreateArgs, MkdirArgs};
use crate::config::{self, OsKitConfig};

const CONFIG_DIR: &str = ".oskit";
const CONFIG_FILE: &str = "config.toml";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ConfigPathSource {
    Explicit,
    Discovered,
    HomeDefault,
}

impl ConfigPathSource {
    fn as_str(&self) -> &'static str {
        match self {
            ConfigPathSource::Explicit => "explicit",
            ConfigPathSource::Discovered => "discovered",
            ConfigPathSource::HomeDefault => "home-default",
        }
    }
}

#[derive(Clone, Debug)]
struct ResolvedConfigPath {
    path: Utf8PathBuf,
    source: ConfigPathSource,
}

pub fn run(cli: Cli) -> Result<()> {
    let ctx = CliContext::from(&cli);
    ctx.apply_chdir()?;
    dispatch(&ctx, cli.command, &mut io::stdout().lock())
}

/// Path queries never touch the config, so a broken config file can't turn a
/// `false` or `-1` answer into an error.
fn dispatch(ctx: &CliContext, command: Command, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Exists { path, any } => {
            let path = utf8(path)?;
            writeln!(out, "{}", os::file_exists(&path, !any))?;
            Ok(())
        }
        Command::DirExists { path } => {
            let path = utf8(path)?;
            writeln!(out, "{}", os::directory_exists(&path))?;
            Ok(())
        }
        Command::Size { path } => {
            let path = utf8(path)?;
            match os::file_size_bytes(&path) {
                Some(size) => writeln!(out, "{}", size)?,
                None => writeln!(out, "-1")?,
            }
            Ok(())
        }
        Command::Cat { path } => handle_cat(&utf8(path)?, out),
        Command::Mkdir(args) => handle_mkdir(&AppState::new(ctx)?, args),
        Command::Create(args) => handle_create(&AppState::new(ctx)?, args),
        Command::Config { command } => handle_config(ctx, command),
    }
}

fn handle_mkdir(state: &AppState, args: MkdirArgs) -> Result<()> {
    let path = utf8(args.path)?;
    let mode = match args.mode.as_deref() {
        Some(raw) => config::parse_mode(raw)?,
        None => state.config.directories.mode()?,
    };

    os::create_directory(&path, mode)
        .with_context(|| format!("creating directory {} (mode {:o})", path, mode))?;
    tracing::debug!(path = %path, mode = %format!("{:o}", mode), "directory ready");
    Ok(())
}

fn handle_create(state: &AppState, args: CreateArgs) -> Result<()> {
    let path = utf8(args.path)?;
    let mut file = if args.write_only {
        os::create_empty_file_write_only(&path)
    } else {
        os::create_empty_file(&path)
    }
    .with_context(|| format!("creating {}", path))?;

    if !state.config.files.auto_flush {
        file.mark_unchecked();
    }

    if args.stdin {
        let copied = io::copy(&mut io::stdin().lock(), &mut file)
            .with_context(|| format!("writing stdin into {}", path))?;
        tracing::debug!(path = %path, bytes = copied, "copied stdin");
    }

    file.flush_close()
        .with_context(|| format!("closing {}", path))
}

fn handle_cat(path: &Utf8Path, out: &mut dyn Write) -> Result<()> {
    let mut file = os::open_file_for_reading(path).with_context(|| format!("opening {}", path))?;
    io::copy(&mut file, out).with_context(|| format!("reading {}", path))?;
    file.close().with_context(|| format!("closing {}", path))
}

fn handle_config(ctx: &CliContext, command: Option<ConfigCommand>) -> Result<()> {
    let resolved = ctx.resolve_config_path()?;
    match command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Show => {
            let config = config::load_or_default(&resolved.path)?;
            println!(
                "Config: {} ({}{})",
                resolved.path,
                resolved.source.as_str(),
                if os::file_exists(&resolved.path, true) {
                    ""
                } else {
                    ", not present; showing defaults"
                }
            );
            print!("{}", config::format_summary(&config));
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", resolved.path);
            Ok(())
        }
        ConfigCommand::Generate { path, force } => {
            let target = match path {
                Some(path) => utf8(path)?,
                None => resolved.path,
            };
            config::write_example_config(&target, force)?;
            println!("Wrote example config to {}", target);
            Ok(())
        }
        ConfigCommand::Set { key, value } => {
            config::set_value(&resolved.path, &key, &value)?;
            println!("Set `{}` in {} ({})", key, resolved.path, resolved.source.as_str());
            Ok(())
        }
    }
}

fn utf8(path: PathBuf) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path).map_err(|path| anyhow!("path {} is not valid UTF-8", path.display()))
}

/// Walk up from `start` looking for `.oskit/config.toml`.
fn discover_config(start: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILE);
        if os::file_exists(&candidate, true) {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}

#[derive(Clone, Debug)]
struct CliContext {
    chdir: Option<PathBuf>,
    file: Option<PathBuf>,
}

impl CliContext {
    fn apply_chdir(&self) -> Result<()> {
        if let Some(path) = &self.chdir {
            std::env::set_current_dir(path)
                .with_context(|| format!("changing directory to {}", path.display()))?;
        }
        Ok(())
    }

    fn resolve_config_path(&self) -> Result<ResolvedConfigPath> {
        let cwd = std::env::current_dir()
            .ok()
            .and_then(|cwd| Utf8PathBuf::from_path_buf(cwd).ok());
        self.resolve_config_path_from(cwd.as_deref())
    }

    fn resolve_config_path_from(&self, cwd: Option<&Utf8Path>) -> Result<ResolvedConfigPath> {
        if let Some(path) = &self.file {
            return Ok(ResolvedConfigPath {
                path: utf8(path.clone())?,
                source: ConfigPathSource::Explicit,
            });
        }

        if let Some(path) = cwd.and_then(discover_config) {
            return Ok(ResolvedConfigPath {
                path,
                source: ConfigPathSource::Discovered,
            });
        }

        let home = dirs::home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
        let path = utf8(home.join(CONFIG_DIR).join(CONFIG_FILE))?;
        Ok(ResolvedConfigPath {
            path,
            source: ConfigPathSource::HomeDefault,
        })
    }
}

impl From<&Cli> for CliContext {
    fn from(cli: &Cli) -> Self {
        Self {
            chdir: cli.chdir.clone(),
            file: cli.file.clone(),
        }
    }
}

struct AppState {
    config: OsKitConfig,
}

impl AppState {
    fn new(ctx: &CliContext) -> Result<Self> {
        let resolved = ctx.resolve_config_path()?;
        tracing::debug!(
            path = %resolved.path,
            source = resolved.source.as_str(),
            "using config"
        );
        let config = config::load_or_default(&resolved.path)?;
        Ok(Self { config })
    }
}
