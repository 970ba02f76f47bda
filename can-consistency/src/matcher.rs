//! Transition matcher
//!
//! Pairs every downlink value transition inside the alignment window with the
//! response of its responder signal on the bus. Each transition is judged on
//! its own: there is no notion of a test "start" or "end", and what the
//! responder does after first reaching the target never changes the outcome.

use crate::config::EngineConfig;
use crate::parse::is_feedback_signal;
use crate::properties::PropertyTable;
use crate::trend::{SignalTrend, TrendSet};
use crate::types::{
    values_equal, AlignmentWindow, Diagnostic, Direction, OutcomeKind, ResponseShape,
    SignalEvent, Timestamp, TransitionPair, RATIO_EPSILON,
};

/// A downlink event whose value differs from the previous command value
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub event: SignalEvent,
    /// Previous downlink value of the signal (`None` for the first command)
    pub previous_value: Option<f64>,
    /// Timestamp of the previous downlink event of the signal
    pub previous_time: Option<Timestamp>,
    /// True if the command returns to the idle value
    pub is_release: bool,
}

/// Pairs and findings produced for one window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchReport {
    pub pairs: Vec<TransitionPair>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Bus-clock interval searched for one transition's response
#[derive(Debug, Clone, Copy, PartialEq)]
struct SearchInterval {
    mapped: Timestamp,
    start: Timestamp,
    end: Timestamp,
}

pub struct TransitionMatcher<'a> {
    config: &'a EngineConfig,
    properties: &'a PropertyTable,
}

impl<'a> TransitionMatcher<'a> {
    pub fn new(config: &'a EngineConfig, properties: &'a PropertyTable) -> Self {
        Self { config, properties }
    }

    /// Value changes of a command trend's downlink events
    ///
    /// The first command is compared against the idle value. Releases are
    /// returned too and flagged; callers decide whether to pair them.
    pub fn transitions(&self, trend: &SignalTrend) -> Vec<Transition> {
        let idle = self.config.idle_value;
        let mut transitions = Vec::new();
        let mut previous: Option<&SignalEvent> = None;

        for event in trend
            .events()
            .iter()
            .filter(|e| e.direction == Direction::Downlink)
        {
            let baseline = previous.map_or(idle, |p| p.value);
            if !values_equal(event.value, baseline) {
                transitions.push(Transition {
                    event: event.clone(),
                    previous_value: previous.map(|p| p.value),
                    previous_time: previous.map(|p| p.timestamp),
                    is_release: values_equal(event.value, idle),
                });
            }
            previous = Some(event);
        }
        transitions
    }

    /// Bus signals that report the effect of `command`
    ///
    /// Configured pairs may name either side by property name.
    pub fn responders_for(&self, command: &str) -> Vec<String> {
        match self.config.feedback_for(command, self.properties) {
            Some(feedback) if !feedback.is_empty() => feedback
                .iter()
                .map(|name| self.properties.resolve_signal_name(name).to_string())
                .collect(),
            _ => vec![command.to_string()],
        }
    }

    /// Command signals of the upper-layer set, first-seen order
    pub fn command_signals<'t>(&self, upper: &'t TrendSet) -> Vec<&'t SignalTrend> {
        upper
            .iter()
            .filter(|t| t.has_direction(Direction::Downlink))
            .collect()
    }

    /// Pair all transitions inside the window
    pub fn match_window(
        &self,
        upper: &TrendSet,
        bus: &TrendSet,
        window: &AlignmentWindow,
    ) -> MatchReport {
        let mut report = MatchReport::default();
        // responder -> search intervals of every command change routed to it
        let mut solicited: Vec<(String, Vec<SearchInterval>)> = Vec::new();

        for command in self.command_signals(upper) {
            let responders = self.responders_for(command.name());
            let transitions = self.transitions(command);

            for responder in &responders {
                let intervals: Vec<SearchInterval> = transitions
                    .iter()
                    .map(|t| self.search_interval(t, window))
                    .collect();
                match solicited.iter_mut().find(|(name, _)| name == responder) {
                    Some((_, existing)) => existing.extend(intervals),
                    None => solicited.push((responder.clone(), intervals)),
                }
            }

            for transition in &transitions {
                if !window.contains_upper(transition.event.timestamp) {
                    continue;
                }
                if transition.is_release && !self.config.pair_release_transitions {
                    log::trace!(
                        "Skipping release of '{}' at {:.3}",
                        command.name(),
                        transition.event.timestamp
                    );
                    continue;
                }
                for responder in &responders {
                    let pair = self.pair(
                        transition,
                        responder,
                        bus.get(responder),
                        window,
                        &mut report.diagnostics,
                    );
                    log::debug!(
                        "{} -> {} at {:.3}: {}",
                        command.name(),
                        responder,
                        transition.event.timestamp,
                        pair.outcome
                    );
                    report.pairs.push(pair);
                }
            }
        }

        for (responder, intervals) in &solicited {
            if !is_feedback_signal(responder) {
                continue;
            }
            if let Some(trend) = bus.get(responder) {
                unsolicited_changes(trend, intervals, window, &mut report.diagnostics);
            }
        }

        report
    }

    fn search_interval(&self, transition: &Transition, window: &AlignmentWindow) -> SearchInterval {
        let mapped = window.to_bus_time(transition.event.timestamp);
        SearchInterval {
            mapped,
            start: mapped,
            end: mapped + self.config.response_window_seconds,
        }
    }

    fn pair(
        &self,
        transition: &Transition,
        responder: &str,
        trend: Option<&SignalTrend>,
        window: &AlignmentWindow,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> TransitionPair {
        let interval = self.search_interval(transition, window);
        let target = transition.event.value;
        let mut pair = TransitionPair {
            downlink_event: transition.event.clone(),
            previous_value: transition.previous_value,
            target_value: target,
            bus_time: interval.mapped,
            responder: responder.to_string(),
            uplink_event: None,
            response_latency: None,
            outcome: OutcomeKind::NotResponded,
            unexpected_value: None,
            response_shape: ResponseShape::None,
        };

        let Some(trend) = trend.filter(|t| !t.is_empty()) else {
            pair.outcome = OutcomeKind::NoFeedbackChannel;
            return pair;
        };

        let searched = trend.events_in(interval.start, interval.end + RATIO_EPSILON);
        let held = trend.event_before(interval.start);

        // Already holding the target when the search starts
        if let Some(before) = held.filter(|e| values_equal(e.value, target)) {
            let previous_command = transition.previous_time.map(|t| window.to_bus_time(t));
            if previous_command.is_some_and(|t| before.timestamp < t - RATIO_EPSILON) {
                log::debug!(
                    "'{}' already held {} since {:.3}, before the previous command",
                    responder,
                    target,
                    before.timestamp
                );
                diagnostics.push(Diagnostic::CarriedOverResponse {
                    signal: responder.to_string(),
                    value: target,
                    held_since: before.timestamp,
                    command_time: interval.mapped,
                });
            }
            pair.uplink_event = Some(before.clone());
            pair.response_latency = Some(0.0);
            pair.outcome = OutcomeKind::Responded;
            pair.response_shape = self.shape_after(searched, target);
            return pair;
        }

        if let Some(pos) = searched.iter().position(|e| values_equal(e.value, target)) {
            let hit = &searched[pos];
            let latency = (hit.timestamp - interval.mapped).max(0.0);
            pair.outcome = if latency <= self.config.prompt_threshold_seconds + RATIO_EPSILON {
                OutcomeKind::Responded
            } else {
                OutcomeKind::DelayedButCorrect
            };
            pair.uplink_event = Some(hit.clone());
            pair.response_latency = Some(latency);
            pair.response_shape = self.shape_after(&searched[pos + 1..], target);
            return pair;
        }

        // Never reached: the first movement away from the baseline decides
        let baseline = held.map_or(self.config.idle_value, |e| e.value);
        if let Some(moved) = searched.iter().find(|e| !values_equal(e.value, baseline)) {
            pair.unexpected_value = Some(moved.value);
            pair.uplink_event = Some(moved.clone());
            if !self.is_valid_value(responder, moved.value) {
                pair.outcome = OutcomeKind::DirectionMismatch;
            }
        }
        pair
    }

    fn shape_after(&self, rest: &[SignalEvent], target: f64) -> ResponseShape {
        match rest.iter().find(|e| !values_equal(e.value, target)) {
            None => ResponseShape::Held,
            Some(e) if values_equal(e.value, self.config.idle_value) => ResponseShape::RevertedToIdle,
            Some(_) => ResponseShape::ChangedAfter,
        }
    }

    /// Whether `value` belongs to the declared valid set of `signal`
    ///
    /// Configuration takes precedence over the property range; a signal with
    /// neither has no valid set and every movement counts as unexpected.
    pub fn is_valid_value(&self, signal: &str, value: f64) -> bool {
        if let Some(values) = self.config.valid_values_for(signal, self.properties) {
            return values.iter().any(|v| values_equal(*v, value));
        }
        match self.properties.lookup(signal) {
            Some(record) if record.has_range() => record.in_range(value),
            _ => false,
        }
    }
}

fn unsolicited_changes(
    trend: &SignalTrend,
    intervals: &[SearchInterval],
    window: &AlignmentWindow,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (start, end) = window.bus_range;
    for step in trend.events().windows(2) {
        let (before, change) = (&step[0], &step[1]);
        if values_equal(before.value, change.value) {
            continue;
        }
        if change.timestamp < start - RATIO_EPSILON || change.timestamp > end + RATIO_EPSILON {
            continue;
        }
        let explained = intervals.iter().any(|i| {
            change.timestamp >= i.start - RATIO_EPSILON && change.timestamp <= i.end + RATIO_EPSILON
        });
        if !explained {
            log::debug!(
                "Unsolicited change of '{}' to {} at {:.3}",
                change.signal_name,
                change.value,
                change.timestamp
            );
            diagnostics.push(Diagnostic::UnsolicitedFeedback {
                signal: change.signal_name.clone(),
                value: change.value,
                timestamp: change.timestamp,
            });
        }
    }
}
