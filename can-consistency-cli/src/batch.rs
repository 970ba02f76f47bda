//! Batch execution
//!
//! Sessions are independent, so they run in parallel on a rayon pool. A
//! session that cannot be loaded is recorded as failed and the rest of the
//! batch continues.

use crate::config::SessionConfig;
use crate::report::SessionReport;
use anyhow::{Context, Result};
use can_consistency::{Engine, Session};
use rayon::prelude::*;
use std::fs;
use std::path::Path;

/// Read a log file as lines; bytes that are not UTF-8 are replaced
pub fn read_log_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read log file: {:?}", path))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.lines().map(str::to_string).collect())
}

/// Load both logs and the names of interest for one session
pub fn load_session(config: &SessionConfig) -> Result<Session> {
    let upper = read_log_lines(&config.upper_log)?;
    let bus = read_log_lines(&config.bus_log)?;

    let mut session = Session::new(config.id.clone())
        .with_upper_lines(upper)
        .with_bus_lines(bus)
        .with_names(config.names.iter().cloned());

    if let Some(path) = &config.comments {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read comments file: {:?}", path))?;
        session = session.with_comment_names(&String::from_utf8_lossy(&bytes));
    }

    log::debug!(
        "Session '{}': {} upper line(s), {} bus line(s), {} name(s)",
        session.id,
        session.upper_lines.len(),
        session.bus_lines.len(),
        session.names.len()
    );
    Ok(session)
}

/// Load and analyze one session, never failing
pub fn run_session(engine: &Engine, config: &SessionConfig) -> SessionReport {
    match load_session(config) {
        Ok(session) => SessionReport::analyzed(engine.analyze(&session)),
        Err(e) => {
            log::error!("Session '{}' failed: {:#}", config.id, e);
            SessionReport::failed(&config.id, &e)
        }
    }
}

/// Run all sessions, in input order, optionally on a dedicated pool
pub fn run_batch(
    engine: &Engine,
    sessions: &[SessionConfig],
    threads: Option<usize>,
) -> Result<Vec<SessionReport>> {
    let run = || {
        sessions
            .par_iter()
            .map(|config| run_session(engine, config))
            .collect::<Vec<_>>()
    };

    match threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .context("Failed to build thread pool")?;
            log::debug!("Running {} session(s) on {} thread(s)", sessions.len(), n);
            Ok(pool.install(run))
        }
        None => Ok(run()),
    }
}
