//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Continuous directory synchronization
#[derive(Parser)]
#[command(
    name = "dirsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Keep target directories identical to their sources",
    long_about = "Mirror source directory trees into one or more targets, first with a full walk and then incrementally from file system events.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ dirsync init\n  $ dirsync add-source ~/photos\n  $ dirsync add-target 0 /mnt/backup/photos\n  $ dirsync add-exception 0 ~/photos/.cache\n  $ dirsync run"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .dirsync directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .dirsync/settings.toml")]
    Config,

    /// List sources with their targets and exceptions
    #[command(about = "List sources, targets and exceptions with their ids")]
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a source directory
    AddSource {
        /// Directory to mirror
        path: PathBuf,

        /// Only mirror files and directories directly in the root
        #[arg(long)]
        non_recursive: bool,
    },

    /// Remove a source. Its targets are left as they are
    RemoveSource {
        /// Source id as shown by `list`
        source: usize,
    },

    /// Add a target to a source
    AddTarget {
        /// Source id as shown by `list`
        source: usize,

        /// Directory that will mirror the source
        path: PathBuf,

        /// Don't copy existing source content into the new target
        #[arg(long)]
        no_sync: bool,
    },

    /// Remove a target from a source
    RemoveTarget {
        /// Source id as shown by `list`
        source: usize,

        /// Target id as shown by `list`
        target: usize,
    },

    /// Exclude a sub-directory of a source
    AddException {
        /// Source id as shown by `list`
        source: usize,

        /// Sub-directory to exclude
        path: PathBuf,
    },

    /// Stop excluding a sub-directory
    RemoveException {
        /// Source id as shown by `list`
        source: usize,

        /// Exception id as shown by `list`
        exception: usize,
    },

    /// Synchronize all sources and keep watching
    #[command(
        about = "Synchronize all sources and watch for changes",
        after_help = "Commands while running:\n  jobs      Show queued and processing jobs\n  sources   Show configured sources\n  quit      Stop (asks for confirmation while jobs are pending)"
    )]
    Run,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_target() {
        let cli = Cli::try_parse_from(["dirsync", "add-target", "1", "/mnt/b", "--no-sync"]).unwrap();
        match cli.command {
            Commands::AddTarget {
                source,
                path,
                no_sync,
            } => {
                assert_eq!(source, 1);
                assert_eq!(path, PathBuf::from("/mnt/b"));
                assert!(no_sync);
            }
            _ => panic!("expected add-target"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["dirsync", "list", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
