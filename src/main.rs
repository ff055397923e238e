use anyhow::Context;
use clap::Parser;

use dirsync::Settings;
use dirsync::cli::commands::sources::SourceEdit;
use dirsync::cli::{Cli, Commands};
use dirsync::cli::commands;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Init writes the settings file, so it runs before any is loaded
    if let Commands::Init { force } = cli.command {
        dirsync::logging::init();
        return commands::init::run_init(force);
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| anyhow::anyhow!("{e}"))
    .context("cannot load configuration")?;
    dirsync::logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Config => commands::init::run_config(&settings),
        Commands::List { json } => commands::sources::run_list(&settings, json),
        Commands::AddSource {
            path,
            non_recursive,
        } => commands::sources::run_edit(
            &settings,
            SourceEdit::AddSource {
                path,
                recursive: !non_recursive,
            },
        ),
        Commands::RemoveSource { source } => {
            commands::sources::run_edit(&settings, SourceEdit::RemoveSource { source })
        }
        Commands::AddTarget {
            source,
            path,
            no_sync,
        } => commands::sources::run_edit(
            &settings,
            SourceEdit::AddTarget {
                source,
                path,
                sync: !no_sync,
            },
        ),
        Commands::RemoveTarget { source, target } => {
            commands::sources::run_edit(&settings, SourceEdit::RemoveTarget { source, target })
        }
        Commands::AddException { source, path } => {
            commands::sources::run_edit(&settings, SourceEdit::AddException { source, path })
        }
        Commands::RemoveException { source, exception } => commands::sources::run_edit(
            &settings,
            SourceEdit::RemoveException { source, exception },
        ),
        Commands::Run => commands::run::run(&settings),
    }
}
