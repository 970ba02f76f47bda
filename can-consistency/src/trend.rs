//! Trend builder
//!
//! Groups events per signal into ordered trends. A trend is built once and
//! never mutated; appending events means building a new trend.

use crate::types::{values_equal, Direction, SignalEvent, Source, Timestamp};
use std::collections::HashMap;

/// Ordered events of one signal within one source
#[derive(Debug, Clone, PartialEq)]
pub struct SignalTrend {
    name: String,
    source: Source,
    events: Vec<SignalEvent>,
    values: Vec<f64>,
    intervals: Vec<f64>,
}

impl SignalTrend {
    /// Build a trend, sorting events by timestamp (stable for equal timestamps)
    pub fn new(name: impl Into<String>, source: Source, mut events: Vec<SignalEvent>) -> Self {
        events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        let values = events.iter().map(|e| e.value).collect();
        let intervals = events
            .windows(2)
            .map(|w| w[1].timestamp - w[0].timestamp)
            .collect();
        Self {
            name: name.into(),
            source,
            events,
            values,
            intervals,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn events(&self) -> &[SignalEvent] {
        &self.events
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Consecutive timestamp deltas (`values().len() - 1` entries)
    pub fn intervals(&self) -> &[f64] {
        &self.intervals
    }

    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.events.iter().map(|e| e.timestamp)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Fold runs of identical consecutive values into the run's first event
    pub fn collapsed(&self) -> SignalTrend {
        let mut kept: Vec<SignalEvent> = Vec::with_capacity(self.events.len());
        for event in &self.events {
            match kept.last() {
                Some(last) if values_equal(last.value, event.value) => {}
                _ => kept.push(event.clone()),
            }
        }
        SignalTrend::new(self.name.clone(), self.source, kept)
    }

    pub fn has_direction(&self, direction: Direction) -> bool {
        self.events.iter().any(|e| e.direction == direction)
    }

    /// Last event strictly before `t`
    pub fn event_before(&self, t: Timestamp) -> Option<&SignalEvent> {
        let idx = self.events.partition_point(|e| e.timestamp < t);
        idx.checked_sub(1).map(|i| &self.events[i])
    }

    /// Events with `start <= timestamp <= end`
    pub fn events_in(&self, start: Timestamp, end: Timestamp) -> &[SignalEvent] {
        let lo = self.events.partition_point(|e| e.timestamp < start);
        let hi = self.events.partition_point(|e| e.timestamp <= end);
        &self.events[lo..hi.max(lo)]
    }
}

/// All trends of one source, in first-seen signal order
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSet {
    source: Source,
    trends: Vec<SignalTrend>,
    index: HashMap<String, usize>,
}

impl TrendSet {
    /// Group events by signal name
    pub fn build(source: Source, events: &[SignalEvent]) -> Self {
        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<&str, Vec<SignalEvent>> = HashMap::new();
        for event in events {
            let name = event.signal_name.as_str();
            if !grouped.contains_key(name) {
                order.push(name.to_string());
            }
            grouped.entry(name).or_default().push(event.clone());
        }

        let trends: Vec<SignalTrend> = order
            .into_iter()
            .map(|name| {
                let events = grouped.remove(name.as_str()).unwrap_or_default();
                SignalTrend::new(name, source, events)
            })
            .collect();
        Self::from_trends(source, trends)
    }

    fn from_trends(source: Source, trends: Vec<SignalTrend>) -> Self {
        let index = trends
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Self {
            source,
            trends,
            index,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn get(&self, name: &str) -> Option<&SignalTrend> {
        self.index.get(name).map(|&i| &self.trends[i])
    }

    /// Trends in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &SignalTrend> {
        self.trends.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.trends.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.trends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trends.is_empty()
    }

    /// Set with every trend collapsed
    pub fn collapsed(&self) -> TrendSet {
        Self::from_trends(self.source, self.trends.iter().map(|t| t.collapsed()).collect())
    }

    /// Raw view (`false`) or collapsed view (`true`)
    pub fn view(&self, collapse_repeats: bool) -> TrendSet {
        if collapse_repeats {
            self.collapsed()
        } else {
            self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(t: f64, name: &str, value: f64) -> SignalEvent {
        SignalEvent::new(t, Source::Bus, name, value, Direction::Uplink)
    }

    #[test]
    fn test_values_and_intervals() {
        let trend = SignalTrend::new(
            "A",
            Source::Bus,
            vec![ev(1.5, "A", 2.0), ev(1.0, "A", 1.0), ev(2.5, "A", 3.0)],
        );
        assert_eq!(trend.values(), &[1.0, 2.0, 3.0]);
        assert_eq!(trend.intervals(), &[0.5, 1.0]);
        assert_eq!(trend.values().len(), trend.intervals().len() + 1);
    }

    #[test]
    fn test_empty_trend() {
        let trend = SignalTrend::new("A", Source::Bus, Vec::new());
        assert!(trend.is_empty());
        assert!(trend.intervals().is_empty());
        assert!(trend.event_before(10.0).is_none());
    }

    #[test]
    fn test_collapsed_view_keeps_run_starts() {
        let trend = SignalTrend::new(
            "A",
            Source::Bus,
            vec![
                ev(0.0, "A", 0.0),
                ev(0.1, "A", 0.0),
                ev(0.2, "A", 1.0),
                ev(0.3, "A", 1.0),
                ev(0.4, "A", 0.0),
            ],
        );
        let collapsed = trend.collapsed();
        assert_eq!(collapsed.values(), &[0.0, 1.0, 0.0]);
        let times: Vec<f64> = collapsed.timestamps().collect();
        assert_eq!(times, vec![0.0, 0.2, 0.4]);
        // the raw trend is untouched
        assert_eq!(trend.len(), 5);
    }

    #[test]
    fn test_trend_set_preserves_first_seen_order() {
        let events = vec![
            ev(0.0, "B", 0.0),
            ev(0.1, "A", 0.0),
            ev(0.2, "B", 1.0),
            ev(0.3, "C", 1.0),
        ];
        let set = TrendSet::build(Source::Bus, &events);
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["B", "A", "C"]);
        assert_eq!(set.get("B").unwrap().len(), 2);
        assert!(set.get("D").is_none());
        assert_eq!(set.view(true).get("B").unwrap().len(), 2);
    }

    #[test]
    fn test_lookups() {
        let trend = SignalTrend::new(
            "A",
            Source::Bus,
            vec![ev(1.0, "A", 0.0), ev(2.0, "A", 1.0), ev(3.0, "A", 0.0)],
        );
        assert_eq!(trend.event_before(2.0).map(|e| e.value), Some(0.0));
        assert_eq!(trend.event_before(2.5).map(|e| e.timestamp), Some(2.0));
        assert!(trend.event_before(1.0).is_none());
        assert_eq!(trend.events_in(1.5, 3.0).len(), 2);
        assert!(trend.events_in(3.5, 4.0).is_empty());
    }
}
