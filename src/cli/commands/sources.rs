//! Source list commands (list, add-source, add-target, ...).
//!
//! Every mutation loads the stored list into an engine, applies the change
//! through the engine's validation, and saves the result.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::config::Settings;
use crate::engine::SyncEngine;
use crate::source::SourceConfig;
use crate::store;

/// One configuration change requested on the command line.
#[derive(Debug, Clone)]
pub enum SourceEdit {
    AddSource { path: PathBuf, recursive: bool },
    RemoveSource { source: usize },
    AddTarget { source: usize, path: PathBuf, sync: bool },
    RemoveTarget { source: usize, target: usize },
    AddException { source: usize, path: PathBuf },
    RemoveException { source: usize, exception: usize },
}

/// Write sources with their ids, targets and exceptions.
pub fn write_sources(out: &mut impl Write, sources: &[SourceConfig]) -> std::io::Result<()> {
    if sources.is_empty() {
        writeln!(out, "No sources")?;
        return Ok(());
    }
    for (i, source) in sources.iter().enumerate() {
        writeln!(out, "[{i}] {source}")?;
        for (t, target) in source.targets.iter().enumerate() {
            writeln!(out, "    target [{t}] {target}")?;
        }
        for (e, exception) in source.exceptions.iter().enumerate() {
            writeln!(out, "    exception [{e}] {exception}")?;
        }
    }
    Ok(())
}

/// Run list command.
pub fn run_list(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let sources = store::load(&settings.state_file)?;
    let mut out = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &sources)?;
        writeln!(out)?;
    } else {
        write_sources(&mut out, &sources)?;
    }
    Ok(())
}

/// Apply one edit to the stored source list.
pub fn apply_edit(settings: &Settings, edit: SourceEdit) -> anyhow::Result<String> {
    let engine = SyncEngine::new(settings.clone())?;
    engine
        .load()
        .with_context(|| format!("stored sources in {} are invalid", settings.state_file.display()))?;

    let message = match edit {
        SourceEdit::AddSource { path, recursive } => {
            let id = engine.add_source(path, recursive)?;
            format!("Added source [{id}]")
        }
        SourceEdit::RemoveSource { source } => {
            let removed = engine.remove_source(source)?;
            format!("Removed source {removed}")
        }
        SourceEdit::AddTarget { source, path, sync } => {
            let added = engine.add_target(source, path, Some(sync))?;
            if sync {
                // One-shot command; finish the copy before exiting
                while !engine.wait_idle(Duration::from_secs(1)) {
                    crate::debug_event!("cli", "waiting", "{} jobs pending", engine.pending_jobs());
                }
            }
            format!("Added target {added}")
        }
        SourceEdit::RemoveTarget { source, target } => {
            let removed = engine.remove_target(source, target)?;
            format!("Removed target {removed}")
        }
        SourceEdit::AddException { source, path } => {
            let added = engine.add_exception(source, path)?;
            format!("Added exception {added}")
        }
        SourceEdit::RemoveException { source, exception } => {
            let removed = engine.remove_exception(source, exception)?;
            format!("Removed exception {removed}")
        }
    };

    engine.save()?;
    engine.shutdown(true)?;
    Ok(message)
}

/// Run a source list command and report the result.
pub fn run_edit(settings: &Settings, edit: SourceEdit) -> anyhow::Result<()> {
    let message = apply_edit(settings, edit)?;
    println!("{message}");
    println!("Sources saved to: {}", settings.state_file.display());
    Ok(())
}
