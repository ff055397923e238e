//! Run command: synchronize, watch, and answer commands on stdin.

use std::io::{BufRead, Write};
use std::time::Duration;

use crate::config::Settings;
use crate::engine::SyncEngine;
use crate::error::EngineError;

use super::sources::write_sources;

/// What the loop should do after one input line.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Quit,
}

/// Run command - start the engine and serve console commands until quit.
pub fn run(settings: &Settings) -> anyhow::Result<()> {
    let engine = SyncEngine::new(settings.clone())?;
    if let Err(e) = engine.load() {
        // Invalid stored list: report it and run with no sources
        eprintln!("Stored sources ignored: {e}");
    }

    let submitted = engine.start();
    println!(
        "Watching {} sources, {submitted} initial jobs. Type `help` for commands.",
        engine.sources().len()
    );

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(&engine, stdin.lock(), stdout.lock())?;
    Ok(())
}

/// Read commands from `input` until `quit` is confirmed or input ends.
///
/// At end of input the queue is drained before the engine stops.
pub fn serve(engine: &SyncEngine, mut input: impl BufRead, mut out: impl Write) -> anyhow::Result<()> {
    let mut line = String::new();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            while !engine.wait_idle(Duration::from_secs(1)) {}
            engine.shutdown(true)?;
            return Ok(());
        }

        if handle_line(engine, line.trim(), &mut input, &mut out)? == Step::Quit {
            return Ok(());
        }
    }
}

fn handle_line(
    engine: &SyncEngine,
    command: &str,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> anyhow::Result<Step> {
    match command {
        "" => {}
        "jobs" => {
            let jobs = engine.list_jobs();
            if jobs.is_empty() {
                writeln!(out, "No jobs")?;
            }
            for job in jobs {
                writeln!(out, "{job}")?;
            }
        }
        "sources" => write_sources(out, &engine.sources())?,
        "help" => {
            writeln!(out, "jobs      Show queued and processing jobs")?;
            writeln!(out, "sources   Show configured sources")?;
            writeln!(out, "quit      Stop synchronizing")?;
        }
        "quit" | "exit" => return quit(engine, input, out),
        other => writeln!(out, "Unknown command: {other}")?,
    }
    Ok(Step::Continue)
}

fn quit(engine: &SyncEngine, input: &mut impl BufRead, out: &mut impl Write) -> anyhow::Result<Step> {
    match engine.shutdown(false) {
        Ok(_) => Ok(Step::Quit),
        Err(EngineError::PendingJobs(pending)) => {
            write!(out, "{pending} jobs are still pending. Quit anyway? (y/n) ")?;
            out.flush()?;

            let mut answer = String::new();
            input.read_line(&mut answer)?;
            if answer.trim().eq_ignore_ascii_case("y") {
                let dropped = engine.shutdown(true)?;
                if dropped > 0 {
                    writeln!(out, "{dropped} jobs were not started")?;
                }
                Ok(Step::Quit)
            } else {
                Ok(Step::Continue)
            }
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{EntryExecutor, JobEntry, JobError};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn engine(temp: &TempDir) -> SyncEngine {
        let settings = Settings {
            state_file: temp.path().join("sources.toml"),
            ..Settings::default()
        };
        let executor: Arc<dyn EntryExecutor> = Arc::new(|_: &JobEntry| -> Result<(), JobError> { Ok(()) });
        SyncEngine::with_executor(settings, executor).unwrap()
    }

    #[test]
    fn test_serve_lists_and_quits() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let input = b"jobs\nsources\nbogus\nquit\n".as_slice();
        let mut out = Vec::new();

        serve(&engine, input, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("No jobs"));
        assert!(text.contains("No sources"));
        assert!(text.contains("Unknown command: bogus"));
        assert!(!engine.has_pending_work());
    }

    #[test]
    fn test_end_of_input_stops_engine() {
        let temp = TempDir::new().unwrap();
        let engine = engine(&temp);
        let mut out = Vec::new();

        serve(&engine, b"".as_slice(), &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("> "));
    }
}
