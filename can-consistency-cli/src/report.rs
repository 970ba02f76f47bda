//! Batch report generation
//!
//! The report is a single JSON document: generation time, engine version and
//! one entry per session, either a verdict or the error that stopped it.

use anyhow::{Context, Result};
use can_consistency::ConsistencyVerdict;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Result of one session in the batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ConsistencyVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionReport {
    pub fn analyzed(verdict: ConsistencyVerdict) -> Self {
        Self {
            id: verdict.session_id.clone(),
            verdict: Some(verdict),
            error: None,
        }
    }

    pub fn failed(id: &str, error: &anyhow::Error) -> Self {
        Self {
            id: id.to_string(),
            verdict: None,
            error: Some(format!("{:#}", error)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// RFC 3339 UTC timestamp
    pub generated_at: String,
    pub engine_version: String,
    pub sessions: Vec<SessionReport>,
}

impl BatchReport {
    pub fn new(sessions: Vec<SessionReport>) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            engine_version: can_consistency::VERSION.to_string(),
            sessions,
        }
    }

    /// Number of sessions per overall outcome, plus `failed`
    pub fn outcome_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for session in &self.sessions {
            let key = match &session.verdict {
                Some(verdict) => verdict.overall_outcome.to_string(),
                None => "failed".to_string(),
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    /// One-line summary for the log
    pub fn summary_line(&self) -> String {
        let counts: Vec<String> = self
            .outcome_counts()
            .iter()
            .map(|(outcome, n)| format!("{} {}", outcome, n))
            .collect();
        format!("{} session(s): {}", self.sessions.len(), counts.join(", "))
    }

    /// Write the report as JSON to `path`, or stdout if `None`
    pub fn write_json(&self, path: Option<&Path>, pretty: bool) -> Result<()> {
        match path {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create report file: {:?}", path))?;
                let mut writer = BufWriter::new(file);
                self.write_to(&mut writer, pretty)?;
                writer.flush()?;
                log::info!("Report written to {:?}", path);
            }
            None => {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                self.write_to(&mut handle, pretty)?;
            }
        }
        Ok(())
    }

    fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<()> {
        if pretty {
            serde_json::to_writer_pretty(&mut *writer, self)?;
        } else {
            serde_json::to_writer(&mut *writer, self)?;
        }
        writeln!(writer)?;
        Ok(())
    }
}
