//! Main engine API
//!
//! The `Engine` is the entry point of the library. It owns the configuration
//! and a shared read-only property table, and runs the whole pipeline for one
//! session: parse both logs, resolve directions, build trends, align, match
//! transitions and aggregate the verdict.

use crate::align::{AlignmentFailure, WindowAligner};
use crate::config::EngineConfig;
use crate::matcher::TransitionMatcher;
use crate::parse::{resolve_directions, EventParser};
use crate::properties::{extract_property_names, PropertyTable, TableStats};
use crate::trend::TrendSet;
use crate::types::{ConsistencyVerdict, Diagnostic, ParseSummary, Result, SignalEvent, Source};
use crate::verdict;
use std::path::Path;
use std::sync::Arc;

/// Input of one analysis: the two logs and the names to look for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    /// Upper-layer (VHAL) log lines
    pub upper_lines: Vec<String>,
    /// Bus (CAN trace) log lines
    pub bus_lines: Vec<String>,
    /// Property or signal names of interest
    pub names: Vec<String>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Builder method: set the upper-layer lines
    pub fn with_upper_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.upper_lines = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method: set the bus lines
    pub fn with_bus_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bus_lines = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method: add explicit names of interest
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.push_name(name.into());
        }
        self
    }

    /// Builder method: add the property names mentioned in bug-comment text
    pub fn with_comment_names(mut self, text: &str) -> Self {
        for name in extract_property_names(text) {
            self.push_name(name);
        }
        self
    }

    fn push_name(&mut self, name: String) {
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }
}

/// The consistency engine - entry point for all analysis operations
///
/// `Engine` is `Send + Sync`; one instance can analyze many sessions in
/// parallel.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    properties: Arc<PropertyTable>,
}

impl Engine {
    /// Create an engine with an empty property table
    ///
    /// # Example
    /// ```
    /// use can_consistency::{Engine, EngineConfig, Session};
    ///
    /// let engine = Engine::new(EngineConfig::default()).unwrap();
    /// let session = Session::new("demo")
    ///     .with_names(["ICC_SetCLMOn"])
    ///     .with_upper_lines(["0.000 Tx ICC_SetCLMOn 0", "0.100 Tx ICC_SetCLMOn 1"])
    ///     .with_bus_lines(["5.000 Rx ICC_SetCLMOn 0", "5.120 Rx ICC_SetCLMOn 1"]);
    /// let verdict = engine.analyze(&session);
    /// assert!(verdict.window.is_some());
    /// ```
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_properties(config, Arc::new(PropertyTable::new()))
    }

    /// Create an engine sharing an existing property table
    pub fn with_properties(config: EngineConfig, properties: Arc<PropertyTable>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, properties })
    }

    /// Load a property table JSON file and add its records
    ///
    /// # Example
    /// ```no_run
    /// use can_consistency::{Engine, EngineConfig};
    /// use std::path::Path;
    ///
    /// let mut engine = Engine::new(EngineConfig::default()).unwrap();
    /// engine.add_property_file(Path::new("property_table.json")).unwrap();
    /// ```
    pub fn add_property_file(&mut self, path: &Path) -> Result<()> {
        log::info!("Loading property table: {:?}", path);
        let records = crate::properties::json::parse_property_file(path)?;

        let table = Arc::make_mut(&mut self.properties);
        for record in records {
            table.add_record(record);
        }

        log::info!("Property table loaded successfully: {:?}", path);
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn properties(&self) -> &PropertyTable {
        &self.properties
    }

    /// Get statistics about the loaded property table
    pub fn property_stats(&self) -> TableStats {
        self.properties.stats()
    }

    /// Analyze one session from raw log lines
    pub fn analyze(&self, session: &Session) -> ConsistencyVerdict {
        let mut names = session.names.clone();
        for name in self.config.referenced_signals() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        if names.is_empty() {
            log::warn!("Session '{}' has no names of interest", session.id);
        }

        let upper = EventParser::new(Source::UpperLayer, &names, &self.properties)
            .parse_lines(&session.upper_lines);
        let bus = EventParser::new(Source::Bus, &names, &self.properties)
            .parse_lines(&session.bus_lines);

        let summary = ParseSummary {
            upper: upper.stats,
            bus: bus.stats,
        };
        let mut diagnostics = upper.diagnostics;
        diagnostics.extend(bus.diagnostics);

        self.evaluate(&session.id, upper.events, bus.events, diagnostics, summary)
    }

    /// Analyze already parsed events
    pub fn analyze_events(
        &self,
        session_id: &str,
        upper_events: Vec<SignalEvent>,
        bus_events: Vec<SignalEvent>,
    ) -> ConsistencyVerdict {
        self.evaluate(
            session_id,
            upper_events,
            bus_events,
            Vec::new(),
            ParseSummary::default(),
        )
    }

    fn evaluate(
        &self,
        session_id: &str,
        upper_events: Vec<SignalEvent>,
        bus_events: Vec<SignalEvent>,
        mut diagnostics: Vec<Diagnostic>,
        parse: ParseSummary,
    ) -> ConsistencyVerdict {
        let upper_events = resolve_directions(&upper_events, &self.properties, &mut diagnostics);
        let bus_events = resolve_directions(&bus_events, &self.properties, &mut diagnostics);

        let upper = TrendSet::build(Source::UpperLayer, &upper_events);
        let bus = TrendSet::build(Source::Bus, &bus_events);
        log::debug!(
            "Session '{}': {} upper trend(s), {} bus trend(s)",
            session_id,
            upper.len(),
            bus.len()
        );

        let aligner = WindowAligner::from_config(&self.config);
        let collapse = self.config.collapse_repeats;
        let (window, pairs) = match aligner.align(&upper.view(collapse), &bus.view(collapse)) {
            Ok(window) => {
                log::debug!(
                    "Session '{}': window on '{}', offset {:.3}s, mean error {:.4}",
                    session_id,
                    window.anchor_signal,
                    window.offset(),
                    window.mean_interval_error
                );
                let matched = TransitionMatcher::new(&self.config, &self.properties)
                    .match_window(&upper, &bus, &window);
                diagnostics.extend(matched.diagnostics);
                (Some(window), matched.pairs)
            }
            Err(failure) => {
                log::debug!("Session '{}': no alignment window ({:?})", session_id, failure);
                diagnostics.push(match failure {
                    AlignmentFailure::NoAnchorSignal => Diagnostic::NoAnchorSignal,
                    AlignmentFailure::NoQualifyingWindow { anchors_tried } => {
                        Diagnostic::NoQualifyingWindow { anchors_tried }
                    }
                });
                (None, Vec::new())
            }
        };

        verdict::aggregate(session_id, window, pairs, diagnostics, parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, OutcomeKind};

    fn ev(source: Source, t: f64, name: &str, value: f64, direction: Direction) -> SignalEvent {
        SignalEvent::new(t, source, name, value, direction)
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig::default().with_response_window(-1.0);
        assert!(Engine::new(config).is_err());
    }

    #[test]
    fn test_five_second_offset_scenario() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let upper = vec![
            ev(Source::UpperLayer, 0.0, "A", 0.0, Direction::Downlink),
            ev(Source::UpperLayer, 0.1, "A", 1.0, Direction::Downlink),
        ];
        let bus = vec![
            ev(Source::Bus, 5.0, "A", 0.0, Direction::Uplink),
            ev(Source::Bus, 5.12, "A", 1.0, Direction::Uplink),
        ];
        let verdict = engine.analyze_events("scenario", upper, bus);

        let window = verdict.window.as_ref().unwrap();
        assert!((window.offset() - 5.0).abs() < 1e-9);
        assert!((window.mean_interval_error - 0.2).abs() < 1e-9);
        assert_eq!(verdict.pairs.len(), 1);
        assert_eq!(verdict.pairs[0].outcome, OutcomeKind::Responded);
        assert_eq!(verdict.overall_outcome, OutcomeKind::Responded);
    }

    #[test]
    fn test_no_anchor_is_unmatched() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let upper = vec![ev(Source::UpperLayer, 0.0, "A", 1.0, Direction::Downlink)];
        let bus = vec![ev(Source::Bus, 5.0, "A", 1.0, Direction::Uplink)];
        let verdict = engine.analyze_events("s", upper, bus);

        assert_eq!(verdict.overall_outcome, OutcomeKind::Unmatched);
        assert!(verdict.window.is_none());
        assert!(verdict.diagnostics.contains(&Diagnostic::NoAnchorSignal));
    }

    #[test]
    fn test_session_names_are_deduplicated() {
        let session = Session::new("s")
            .with_names(["TEMP_SET_VALUE"])
            .with_comment_names("空调TEMP_SET_VALUE和HVAC_FAN_SPEED设置无效");
        assert_eq!(session.names, vec!["TEMP_SET_VALUE", "HVAC_FAN_SPEED"]);
    }
}
