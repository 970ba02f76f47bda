//! CAN Signal Consistency Library
//!
//! A stateless, deterministic library that judges whether an upper-layer
//! signal (Android VHAL property traffic) and a bus signal (CAN trace) behave
//! consistently.
//!
//! # Architecture
//!
//! One analysis is a strict pipeline:
//! - Parses raw log lines into directed signal events
//! - Builds per-signal trends (values + intervals)
//! - Finds the one time window where both traces show the same sequence
//! - Pairs each command transition with its response on the bus
//! - Folds the pair outcomes into a single verdict with evidence
//!
//! The library does NOT:
//! - Acquire or extract logs
//! - Resolve property names to signals (the property table is supplied)
//! - Generate natural-language reports
//!
//! Batch execution and report files are in the application layer
//! (can-consistency-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use can_consistency::{Engine, EngineConfig, Session};
//! use std::path::Path;
//!
//! let config = EngineConfig::new()
//!     .with_response_window(2.0)
//!     .add_feedback_pair("ICC_SetCLMOn", &["TMS_CLMSts"]);
//!
//! let mut engine = Engine::new(config).unwrap();
//! engine.add_property_file(Path::new("property_table.json")).unwrap();
//!
//! let upper = std::fs::read_to_string("vhal.log").unwrap();
//! let bus = std::fs::read_to_string("can.asc").unwrap();
//! let session = Session::new("bug-1234")
//!     .with_comment_names("CLM_SWITCH_REQUEST set, no feedback")
//!     .with_upper_lines(upper.lines())
//!     .with_bus_lines(bus.lines());
//!
//! let verdict = engine.analyze(&session);
//! println!("{}: {}", verdict.session_id, verdict.overall_outcome);
//! ```

// Public modules
pub mod align;
pub mod config;
pub mod engine;
pub mod matcher;
pub mod parse;
pub mod properties;
pub mod trend;
pub mod types;
pub mod verdict;

// Re-export main types for convenience
pub use align::{AlignmentFailure, WindowAligner};
pub use config::{EngineConfig, FeedbackPair, ValidValueSet};
pub use engine::{Engine, Session};
pub use matcher::TransitionMatcher;
pub use parse::{EventParser, ParseReport};
pub use properties::{extract_property_names, Access, PropertyRecord, PropertyTable, TableStats};
pub use trend::{SignalTrend, TrendSet};
pub use types::{
    AlignmentWindow, ConsistencyVerdict, Diagnostic, Direction, EngineError, Evidence,
    OutcomeKind, ParseStats, Result, SignalEvent, Source, Timestamp, TransitionPair,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
