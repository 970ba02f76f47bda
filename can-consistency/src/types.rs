//! Core types for the consistency engine
//!
//! This module defines the records that flow through the pipeline: parsed
//! events, alignment windows, transition pairs and the final verdict. Every
//! record is plain data and serializable, so a verdict can be rendered into any
//! report format without re-running the analysis.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used throughout the engine (seconds on the source's own clock)
pub type Timestamp = f64;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Two values closer than this are considered the same signal value
pub const VALUE_EPSILON: f64 = 1e-6;

/// Slack applied to ratio and time comparisons so that boundary values computed
/// in floating point (e.g. `0.03 / 0.1`) land on the inclusive side
pub const RATIO_EPSILON: f64 = 1e-9;

/// Compare two signal values
pub fn values_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= VALUE_EPSILON
}

/// Errors that can occur while setting up an analysis
///
/// The analysis itself never fails: unreadable lines, missing anchors and
/// ambiguous directions are reported as data inside the verdict.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to load property table: {0}")]
    PropertyTableError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Which log a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Android / VHAL side log
    UpperLayer,
    /// CAN trace
    Bus,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::UpperLayer => write!(f, "UpperLayer"),
            Source::Bus => write!(f, "Bus"),
        }
    }
}

/// Direction of a signal event relative to the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Upper layer writes toward the bus/controller
    Downlink,
    /// Bus/controller reports back to the upper layer
    Uplink,
    /// No (or conflicting) lexical marker on the line
    Unknown,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Downlink => write!(f, "Downlink"),
            Direction::Uplink => write!(f, "Uplink"),
            Direction::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A single parsed signal observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    /// Seconds, monotonic within one log source
    pub timestamp: Timestamp,
    /// Log the event was parsed from
    pub source: Source,
    /// Signal name (property names are resolved to their signal)
    pub signal_name: String,
    /// Value in the signal domain
    pub value: f64,
    /// Inferred direction
    pub direction: Direction,
    /// Originating line number (1-based, or the `Line N:` prefix if present)
    pub line_number: usize,
}

impl SignalEvent {
    /// Create an event without line information (mostly for tests)
    pub fn new(
        timestamp: Timestamp,
        source: Source,
        signal_name: impl Into<String>,
        value: f64,
        direction: Direction,
    ) -> Self {
        Self {
            timestamp,
            source,
            signal_name: signal_name.into(),
            value,
            direction,
            line_number: 0,
        }
    }

    /// Copy of this event with a different direction
    pub fn with_direction(&self, direction: Direction) -> Self {
        Self {
            direction,
            ..self.clone()
        }
    }
}

/// Outcome taxonomy for one transition pair and for a whole session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeKind {
    /// Target value reached promptly
    Responded,
    /// Target value reached after the prompt threshold, still inside the response window
    DelayedButCorrect,
    /// Target value never observed inside the response window
    NotResponded,
    /// Responder moved to a value outside its valid set
    DirectionMismatch,
    /// Responder has zero events in the bus trace
    NoFeedbackChannel,
    /// No alignment window could be established
    Unmatched,
}

impl OutcomeKind {
    /// Severity rank, higher is worse
    pub fn severity(&self) -> u8 {
        match self {
            OutcomeKind::Responded => 0,
            OutcomeKind::DelayedButCorrect => 1,
            OutcomeKind::NotResponded => 2,
            OutcomeKind::DirectionMismatch => 3,
            OutcomeKind::NoFeedbackChannel => 4,
            OutcomeKind::Unmatched => 5,
        }
    }

    /// True for the two outcomes that count as a correct response
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeKind::Responded | OutcomeKind::DelayedButCorrect)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutcomeKind::Responded => "Responded",
            OutcomeKind::DelayedButCorrect => "DelayedButCorrect",
            OutcomeKind::NotResponded => "NotResponded",
            OutcomeKind::DirectionMismatch => "DirectionMismatch",
            OutcomeKind::NoFeedbackChannel => "NoFeedbackChannel",
            OutcomeKind::Unmatched => "Unmatched",
        };
        write!(f, "{}", name)
    }
}

/// Which trace played the query role during alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// Upper-layer anchor trend found inside the bus trend
    UpperInBus,
    /// Bus anchor trend found inside the upper-layer trend
    BusInUpper,
}

/// The accepted time span in both traces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentWindow {
    /// `(start, end)` on the upper-layer clock
    pub upper_range: (Timestamp, Timestamp),
    /// `(start, end)` on the bus clock
    pub bus_range: (Timestamp, Timestamp),
    /// Signal whose trend established the window
    pub anchor_signal: String,
    pub orientation: Orientation,
    /// Mean proportional interval error over the matched steps
    pub mean_interval_error: f64,
    /// Largest single-step interval error
    pub max_interval_error: f64,
}

impl AlignmentWindow {
    /// Clock offset from the upper layer to the bus
    pub fn offset(&self) -> f64 {
        self.bus_range.0 - self.upper_range.0
    }

    /// Map an upper-layer timestamp onto the bus clock
    pub fn to_bus_time(&self, upper_time: Timestamp) -> Timestamp {
        upper_time + self.offset()
    }

    /// True if `t` lies inside the upper-layer range
    pub fn contains_upper(&self, t: Timestamp) -> bool {
        t >= self.upper_range.0 - RATIO_EPSILON && t <= self.upper_range.1 + RATIO_EPSILON
    }
}

/// How the responder behaved after first reaching the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseShape {
    /// No response observed
    None,
    /// Target held until the end of the response window
    Held,
    /// Target reached, then the signal went back to the idle baseline
    RevertedToIdle,
    /// Target reached, then the signal moved to some other value
    ChangedAfter,
}

/// One downlink transition and its matched (or absent) response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionPair {
    /// The command event (upper-layer clock)
    pub downlink_event: SignalEvent,
    /// Value the command moved away from (`None` if it was the first command)
    pub previous_value: Option<f64>,
    /// Value the command moved to
    pub target_value: f64,
    /// Command time mapped onto the bus clock
    pub bus_time: Timestamp,
    /// Bus signal searched for the response
    pub responder: String,
    /// First responder event equal to the target
    pub uplink_event: Option<SignalEvent>,
    /// Seconds between `bus_time` and `uplink_event`
    pub response_latency: Option<f64>,
    pub outcome: OutcomeKind,
    /// First non-target value the responder moved to, if it never reached the target
    pub unexpected_value: Option<f64>,
    pub response_shape: ResponseShape,
}

/// Role of a value inside the evidence bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueRole {
    Commanded,
    Observed,
    Unexpected,
}

/// A signal value that drove the session outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceValue {
    pub signal: String,
    pub value: f64,
    pub role: ValueRole,
    pub timestamp: Option<Timestamp>,
}

/// Evidence needed to explain a verdict without re-running the algorithm
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Command signals, first-seen order
    pub downlink_signals: Vec<String>,
    /// Responder signals, first-seen order
    pub uplink_signals: Vec<String>,
    /// Values of the deciding pairs
    pub values_involved: Vec<EvidenceValue>,
    /// Indices into `ConsistencyVerdict::pairs` whose outcome set the overall outcome
    pub deciding_pairs: Vec<usize>,
}

/// How an `Unknown` direction was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionRule {
    /// Other lines of the same signal carry an explicit marker
    SameSignal,
    /// Property table declares READ or WRITE access
    DeclaredAccess,
    /// Signal name looks like a status/feedback signal
    FeedbackName,
    /// Earliest changing signal is the command
    TemporalPrecedence,
}

/// Non-fatal findings surfaced as data in the verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Diagnostic {
    AmbiguousDirection {
        source: Source,
        signal: String,
        events: usize,
        resolved: Direction,
        rule: ResolutionRule,
    },
    AccessConflict {
        source: Source,
        signal: String,
        declared: String,
        observed: Direction,
        line_number: usize,
    },
    InvalidStatus {
        source: Source,
        signal: String,
        status: i64,
        flag_signal: Option<String>,
        timestamp: Timestamp,
        line_number: usize,
    },
    OutOfRange {
        source: Source,
        signal: String,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
        line_number: usize,
    },
    NoAnchorSignal,
    NoQualifyingWindow {
        anchors_tried: Vec<String>,
    },
    NoDownlinkTransitions,
    UnsolicitedFeedback {
        signal: String,
        value: f64,
        timestamp: Timestamp,
    },
    /// A response evidenced by a value the responder held since before the
    /// previous command, so it may be left over from an earlier transition
    CarriedOverResponse {
        signal: String,
        value: f64,
        held_since: Timestamp,
        command_time: Timestamp,
    },
}

/// Per-source parse counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    /// Lines handed to the parser
    pub lines_seen: usize,
    /// Lines that referenced a name of interest
    pub lines_referenced: usize,
    /// Events produced
    pub events: usize,
    /// Referenced lines without a readable timestamp
    pub malformed_timestamp: usize,
    /// Referenced lines without a readable value
    pub unparsable_value: usize,
    /// Lines dropped because they reported a non-zero status
    pub invalid_status: usize,
}

impl ParseStats {
    /// Total parse failures (timestamp + value)
    pub fn failures(&self) -> usize {
        self.malformed_timestamp + self.unparsable_value
    }
}

/// Parse counters of both sources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseSummary {
    pub upper: ParseStats,
    pub bus: ParseStats,
}

/// The terminal artifact of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyVerdict {
    pub session_id: String,
    pub window: Option<AlignmentWindow>,
    pub pairs: Vec<TransitionPair>,
    pub overall_outcome: OutcomeKind,
    pub evidence: Evidence,
    pub diagnostics: Vec<Diagnostic>,
    pub parse: ParseSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        let ordered = [
            OutcomeKind::Responded,
            OutcomeKind::DelayedButCorrect,
            OutcomeKind::NotResponded,
            OutcomeKind::DirectionMismatch,
            OutcomeKind::NoFeedbackChannel,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].severity() < pair[1].severity());
        }
        assert!(OutcomeKind::DelayedButCorrect.is_success());
        assert!(!OutcomeKind::NotResponded.is_success());
    }

    #[test]
    fn test_window_offset() {
        let window = AlignmentWindow {
            upper_range: (10.0, 12.0),
            bus_range: (15.0, 17.1),
            anchor_signal: "A".to_string(),
            orientation: Orientation::UpperInBus,
            mean_interval_error: 0.05,
            max_interval_error: 0.05,
        };
        assert!((window.offset() - 5.0).abs() < 1e-12);
        assert!((window.to_bus_time(11.0) - 16.0).abs() < 1e-12);
        assert!(window.contains_upper(12.0));
        assert!(!window.contains_upper(12.5));
    }

    #[test]
    fn test_diagnostic_serialization_is_tagged() {
        let json = serde_json::to_string(&Diagnostic::NoAnchorSignal).unwrap();
        assert_eq!(json, r#"{"kind":"NoAnchorSignal"}"#);
    }
}
