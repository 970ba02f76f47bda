//! Engine configuration types
//!
//! Thresholds and pairing rules for one analysis. The configuration is plain
//! data: every run is a pure function of its inputs and this struct.

use crate::properties::PropertyTable;
use crate::types::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the consistency engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long after a command a response may arrive (seconds)
    #[serde(default = "default_response_window")]
    pub response_window_seconds: f64,

    /// Responses slower than this are `DelayedButCorrect` (seconds)
    #[serde(default = "default_prompt_threshold")]
    pub prompt_threshold_seconds: f64,

    /// Maximum proportional interval error per aligned step
    #[serde(default = "default_interval_tolerance")]
    pub interval_tolerance_ratio: f64,

    /// Align on collapsed trends (repeats folded) instead of raw events
    #[serde(default)]
    pub collapse_repeats: bool,

    /// Idle/baseline value of command and status signals
    #[serde(default)]
    pub idle_value: f64,

    /// Also pair transitions back to the idle value
    #[serde(default)]
    pub pair_release_transitions: bool,

    /// Explicit command → feedback signal pairs
    #[serde(default)]
    pub feedback_pairs: Vec<FeedbackPair>,

    /// Declared valid value sets per responder signal
    #[serde(default)]
    pub valid_values: Vec<ValidValueSet>,
}

fn default_response_window() -> f64 {
    2.0
}

fn default_prompt_threshold() -> f64 {
    0.5
}

fn default_interval_tolerance() -> f64 {
    0.30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_window_seconds: default_response_window(),
            prompt_threshold_seconds: default_prompt_threshold(),
            interval_tolerance_ratio: default_interval_tolerance(),
            collapse_repeats: false,
            idle_value: 0.0,
            pair_release_transitions: false,
            feedback_pairs: Vec::new(),
            valid_values: Vec::new(),
        }
    }
}

/// A command signal and the bus signals that report its effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPair {
    /// Command (downlink) signal
    pub command: String,
    /// Feedback (uplink) signals
    pub feedback: Vec<String>,
}

impl FeedbackPair {
    /// Create a new pair
    pub fn new(command: impl Into<String>, feedback: Vec<String>) -> Self {
        Self {
            command: command.into(),
            feedback,
        }
    }
}

/// Values a responder may legitimately take
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidValueSet {
    pub signal: String,
    pub values: Vec<f64>,
}

impl EngineConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the response window
    pub fn with_response_window(mut self, seconds: f64) -> Self {
        self.response_window_seconds = seconds;
        self
    }

    /// Builder method: set the prompt threshold
    pub fn with_prompt_threshold(mut self, seconds: f64) -> Self {
        self.prompt_threshold_seconds = seconds;
        self
    }

    /// Builder method: set the interval tolerance ratio
    pub fn with_interval_tolerance(mut self, ratio: f64) -> Self {
        self.interval_tolerance_ratio = ratio;
        self
    }

    /// Builder method: align on collapsed trends
    pub fn with_collapse_repeats(mut self, enabled: bool) -> Self {
        self.collapse_repeats = enabled;
        self
    }

    /// Builder method: pair transitions back to idle
    pub fn with_release_transitions(mut self, enabled: bool) -> Self {
        self.pair_release_transitions = enabled;
        self
    }

    /// Builder method: add a command → feedback pair
    pub fn add_feedback_pair(mut self, command: impl Into<String>, feedback: &[&str]) -> Self {
        self.feedback_pairs.push(FeedbackPair::new(
            command,
            feedback.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Builder method: declare the valid values of a responder
    pub fn add_valid_values(mut self, signal: impl Into<String>, values: Vec<f64>) -> Self {
        self.valid_values.push(ValidValueSet {
            signal: signal.into(),
            values,
        });
        self
    }

    /// Feedback signals declared for a command signal, if any
    ///
    /// Pairs may name the command by property name; it is resolved through
    /// `properties` before comparing.
    pub fn feedback_for(&self, command: &str, properties: &PropertyTable) -> Option<&[String]> {
        self.feedback_pairs
            .iter()
            .find(|p| properties.resolve_signal_name(&p.command) == command)
            .map(|p| p.feedback.as_slice())
    }

    /// Valid value set declared for a responder signal, if any
    pub fn valid_values_for(&self, signal: &str, properties: &PropertyTable) -> Option<&[f64]> {
        self.valid_values
            .iter()
            .find(|v| properties.resolve_signal_name(&v.signal) == signal)
            .map(|v| v.values.as_slice())
    }

    /// Every signal name mentioned in the pairing rules
    pub fn referenced_signals(&self) -> Vec<String> {
        let mut names = Vec::new();
        for pair in &self.feedback_pairs {
            for name in std::iter::once(&pair.command).chain(pair.feedback.iter()) {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Check that thresholds are usable
    pub fn validate(&self) -> Result<()> {
        if !(self.response_window_seconds > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "response_window_seconds must be positive, got {}",
                self.response_window_seconds
            )));
        }
        if !(self.prompt_threshold_seconds >= 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "prompt_threshold_seconds must not be negative, got {}",
                self.prompt_threshold_seconds
            )));
        }
        if self.prompt_threshold_seconds > self.response_window_seconds {
            return Err(EngineError::InvalidConfig(format!(
                "prompt_threshold_seconds ({}) exceeds response_window_seconds ({})",
                self.prompt_threshold_seconds, self.response_window_seconds
            )));
        }
        if !(self.interval_tolerance_ratio >= 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "interval_tolerance_ratio must not be negative, got {}",
                self.interval_tolerance_ratio
            )));
        }
        if let Some(pair) = self.feedback_pairs.iter().find(|p| p.feedback.is_empty()) {
            return Err(EngineError::InvalidConfig(format!(
                "feedback pair for '{}' lists no feedback signals",
                pair.command
            )));
        }
        Ok(())
    }
}
