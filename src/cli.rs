use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "oskit", version, about = "File-system helpers from the command line")]
pub struct Cli {
    #[arg(short = 'C', long = "chdir")]
    pub chdir: Option<PathBuf>,
    #[arg(short = 'f', long = "file", global = true)]
    pub file: Option<PathBuf>,
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print whether PATH is a regular file (or anything at all with --any).
    Exists {
        path: PathBuf,
        #[arg(long)]
        any: bool,
    },
    /// Print whether PATH is a directory.
    DirExists { path: PathBuf },
    /// Create a directory and any missing ancestors.
    Mkdir(MkdirArgs),
    /// Print the size of PATH in bytes, or -1 if it can't be stat'ed.
    Size { path: PathBuf },
    /// Replace PATH with a new empty file.
    Create(CreateArgs),
    /// Copy a file to stdout.
    Cat { path: PathBuf },
    /// Configuration display, template generation, and editing.
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommand>,
    },
}

#[derive(Args, Debug)]
pub struct MkdirArgs {
    pub path: PathBuf,
    /// Octal permission bits for every created level; defaults to the config value.
    #[arg(long = "mode")]
    pub mode: Option<String>,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub path: PathBuf,
    /// Open write-only, refusing symlinks at PATH.
    #[arg(long = "write-only", default_value_t = false)]
    pub write_only: bool,
    /// Fill the new file from stdin.
    #[arg(long = "stdin", default_value_t = false)]
    pub stdin: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    Show,
    Path,
    Generate {
        #[arg()]
        path: Option<PathBuf>,
        #[arg(long = "force", default_value_t = false)]
        force: bool,
    },
    /// Set `files.auto_flush` or `directories.mode`, keeping comments intact.
    Set { key: String, value: String },
}

/// Helper entry point so `main` can stay minimal.
pub fn parse() -> Cli {
    Cli::parse()
}
