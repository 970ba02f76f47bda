//! Event parser
//!
//! Turns raw log lines into `SignalEvent`s. Parsing never fails: lines that do
//! not reference a name of interest are skipped, unreadable lines are counted
//! in `ParseStats`, and findings such as invalid status reports are returned as
//! diagnostics alongside the events.

pub mod lexicon;
pub mod line;

use crate::properties::{Access, PropertyTable};
use crate::types::{
    values_equal, Diagnostic, Direction, ParseStats, ResolutionRule, SignalEvent, Source,
};
use std::collections::{HashMap, HashSet};

pub use lexicon::{infer_direction, is_feedback_signal};

/// Output of one parser run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseReport {
    pub events: Vec<SignalEvent>,
    pub stats: ParseStats,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parser for one log source
pub struct EventParser<'a> {
    source: Source,
    names: HashSet<String>,
    properties: &'a PropertyTable,
}

impl<'a> EventParser<'a> {
    /// Create a parser for `source` that keeps lines referencing any of `names`
    ///
    /// Property names in `names` also make their mapped signal a name of interest.
    pub fn new<S: AsRef<str>>(source: Source, names: &[S], properties: &'a PropertyTable) -> Self {
        let mut set = HashSet::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            set.insert(name.to_string());
            if let Some(record) = properties.get_property(name) {
                set.insert(record.signal.clone());
            }
        }
        Self {
            source,
            names: set,
            properties,
        }
    }

    /// Parse all lines
    pub fn parse_lines<S: AsRef<str>>(&self, lines: &[S]) -> ParseReport {
        let mut report = ParseReport::default();
        for (idx, raw) in lines.iter().enumerate() {
            report.stats.lines_seen += 1;
            self.parse_line(raw.as_ref(), idx + 1, &mut report);
        }
        report.stats.events = report.events.len();

        log::debug!(
            "{}: {} lines, {} referenced, {} events, {} parse failures",
            self.source,
            report.stats.lines_seen,
            report.stats.lines_referenced,
            report.stats.events,
            report.stats.failures()
        );
        report
    }

    fn parse_line(&self, raw: &str, position: usize, report: &mut ParseReport) {
        let (text, explicit_number) = line::strip_line_prefix(raw);
        let line_number = explicit_number.unwrap_or(position);

        let Some((name, name_end)) = line::find_name(text, |token| self.names.contains(token))
        else {
            return;
        };
        report.stats.lines_referenced += 1;

        // Direction is decided on the untouched line
        let direction = infer_direction(raw);

        let Some(timestamp) = line::parse_timestamp(text) else {
            log::trace!("{}: malformed timestamp on line {}", self.source, line_number);
            report.stats.malformed_timestamp += 1;
            return;
        };

        let record = self.properties.get_property(name);
        let signal_name = record.map(|r| r.signal.as_str()).unwrap_or(name);

        if let Some(status) = line::parse_status(&text[name_end..]).filter(|&s| s != 0) {
            report.stats.invalid_status += 1;
            report.diagnostics.push(Diagnostic::InvalidStatus {
                source: self.source,
                signal: signal_name.to_string(),
                status,
                flag_signal: (status == 2)
                    .then(|| record.and_then(|r| r.status_flag_signal()))
                    .flatten(),
                timestamp,
                line_number,
            });
            return;
        }

        let Some(raw_value) = line::parse_value(&text[name_end..]) else {
            log::trace!("{}: unparsable value on line {}", self.source, line_number);
            report.stats.unparsable_value += 1;
            return;
        };

        let value = match record {
            Some(r) => r.to_signal_value(raw_value),
            None => raw_value,
        };

        let limits = record.or_else(|| self.properties.lookup(signal_name));
        if let Some(r) = limits {
            if !r.in_range(value) {
                report.diagnostics.push(Diagnostic::OutOfRange {
                    source: self.source,
                    signal: signal_name.to_string(),
                    value,
                    min: r.min,
                    max: r.max,
                    line_number,
                });
            }
            let conflict = matches!(
                (r.access, direction),
                (Access::Read, Direction::Downlink) | (Access::Write, Direction::Uplink)
            );
            if conflict {
                report.diagnostics.push(Diagnostic::AccessConflict {
                    source: self.source,
                    signal: signal_name.to_string(),
                    declared: r.access.to_string(),
                    observed: direction,
                    line_number,
                });
            }
        }

        report.events.push(SignalEvent {
            timestamp,
            source: self.source,
            signal_name: signal_name.to_string(),
            value,
            direction,
            line_number,
        });
    }
}

/// Resolve `Unknown` directions and report each resolution
///
/// Each signal with unknown events is resolved, in order, by the unanimous
/// explicit direction of its other events, its declared access, the feedback
/// name pattern, and finally temporal precedence: the signal whose first value
/// change comes before every other signal's first change is the command.
pub fn resolve_directions(
    events: &[SignalEvent],
    properties: &PropertyTable,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<SignalEvent> {
    let mut order: Vec<&str> = Vec::new();
    let mut explicit: HashMap<&str, (bool, bool)> = HashMap::new();
    let mut unknown_counts: HashMap<&str, usize> = HashMap::new();

    for event in events {
        let name = event.signal_name.as_str();
        if !explicit.contains_key(name) {
            order.push(name);
        }
        let entry = explicit.entry(name).or_insert((false, false));
        match event.direction {
            Direction::Downlink => entry.0 = true,
            Direction::Uplink => entry.1 = true,
            Direction::Unknown => *unknown_counts.entry(name).or_insert(0) += 1,
        }
    }

    if unknown_counts.is_empty() {
        return events.to_vec();
    }

    let first_changes = first_change_times(events);
    let mut resolved: HashMap<&str, Direction> = HashMap::new();

    for &name in &order {
        let Some(&count) = unknown_counts.get(name) else {
            continue;
        };
        let (has_down, has_up) = explicit[name];

        let (direction, rule) = if has_down != has_up {
            let direction = if has_down { Direction::Downlink } else { Direction::Uplink };
            (direction, ResolutionRule::SameSignal)
        } else if let Some(direction) = properties.declared_access(name).and_then(access_direction) {
            (direction, ResolutionRule::DeclaredAccess)
        } else if is_feedback_signal(name) {
            (Direction::Uplink, ResolutionRule::FeedbackName)
        } else {
            (temporal_direction(name, &first_changes), ResolutionRule::TemporalPrecedence)
        };

        let source = events
            .iter()
            .find(|e| e.signal_name == name)
            .map(|e| e.source)
            .unwrap_or(Source::UpperLayer);
        log::warn!(
            "{}: direction of '{}' ambiguous on {} line(s), resolved to {} by {:?}",
            source,
            name,
            count,
            direction,
            rule
        );
        diagnostics.push(Diagnostic::AmbiguousDirection {
            source,
            signal: name.to_string(),
            events: count,
            resolved: direction,
            rule,
        });
        resolved.insert(name, direction);
    }

    events
        .iter()
        .map(|event| match event.direction {
            Direction::Unknown => {
                let direction = resolved[event.signal_name.as_str()];
                event.with_direction(direction)
            }
            _ => event.clone(),
        })
        .collect()
}

fn access_direction(access: Access) -> Option<Direction> {
    match access {
        Access::Read => Some(Direction::Uplink),
        Access::Write => Some(Direction::Downlink),
        Access::ReadWrite => None,
    }
}

/// Time of each signal's first value change (or first event if it never changes)
fn first_change_times(events: &[SignalEvent]) -> Vec<(&str, f64)> {
    let mut last_value: HashMap<&str, f64> = HashMap::new();
    let mut first_seen: Vec<(&str, f64)> = Vec::new();
    let mut changes: HashMap<&str, f64> = HashMap::new();

    let mut sorted: Vec<&SignalEvent> = events.iter().collect();
    sorted.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    for event in sorted {
        let name = event.signal_name.as_str();
        match last_value.get(name) {
            None => first_seen.push((name, event.timestamp)),
            Some(&prev) if !values_equal(prev, event.value) => {
                changes.entry(name).or_insert(event.timestamp);
            }
            Some(_) => {}
        }
        last_value.insert(name, event.value);
    }

    first_seen
        .into_iter()
        .map(|(name, seen)| (name, changes.get(name).copied().unwrap_or(seen)))
        .collect()
}

fn temporal_direction(name: &str, first_changes: &[(&str, f64)]) -> Direction {
    let Some(&(_, own)) = first_changes.iter().find(|(n, _)| *n == name) else {
        return Direction::Uplink;
    };
    let others: Vec<f64> = first_changes
        .iter()
        .filter(|(n, _)| *n != name)
        .map(|&(_, t)| t)
        .collect();
    if !others.is_empty() && others.iter().all(|&t| own < t) {
        Direction::Downlink
    } else {
        Direction::Uplink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::PropertyRecord;

    fn table() -> PropertyTable {
        PropertyTable::from_records(vec![
            PropertyRecord {
                scale: 0.5,
                max: Some(100.0),
                ..PropertyRecord::new("TARGET_CHARGE_LEVEL_REQUEST", "TgtChrgLvlReq", Access::Write)
            },
            PropertyRecord {
                valid_bit: Some(3),
                ..PropertyRecord::new("CHARGE_LEVEL", "TgtChrgLvl", Access::Read)
            },
        ])
    }

    #[test]
    fn test_parse_vhal_lines() {
        let table = table();
        let parser = EventParser::new(
            Source::UpperLayer,
            &["TARGET_CHARGE_LEVEL_REQUEST", "CHARGE_LEVEL"],
            &table,
        );
        let lines = [
            "Line 118869: 01-25 10:53:34.102  1491  1610 D GMVHAL  : vhal_set Property: VendorProperty::TARGET_CHARGE_LEVEL_REQUEST AreaID: 16777216 Status: 0 int32Values: 40",
            "01-25 10:53:34.235  1491  1669 D GMVHAL  : setPropFromVehicle Property: VendorProperty::CHARGE_LEVEL AreaID: 16777216 Status: 0 int32Values: 80",
            "01-25 10:53:34.300  1491  1669 D GMVHAL  : unrelated line",
        ];
        let report = parser.parse_lines(&lines);

        assert_eq!(report.stats.lines_seen, 3);
        assert_eq!(report.stats.lines_referenced, 2);
        assert_eq!(report.events.len(), 2);

        let cmd = &report.events[0];
        assert_eq!(cmd.signal_name, "TgtChrgLvlReq");
        assert_eq!(cmd.value, 80.0); // 40 / 0.5
        assert_eq!(cmd.direction, Direction::Downlink);
        assert_eq!(cmd.line_number, 118869);

        let fb = &report.events[1];
        assert_eq!(fb.signal_name, "TgtChrgLvl");
        assert_eq!(fb.direction, Direction::Uplink);
        assert_eq!(fb.line_number, 2);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_failures_are_counted_not_raised() {
        let table = PropertyTable::new();
        let parser = EventParser::new(Source::Bus, &["TMS_CLMSts"], &table);
        let lines = [
            "no timestamp Rx TMS_CLMSts 1",
            "1.000 Rx TMS_CLMSts no-value",
            "1.100 Rx TMS_CLMSts 1",
        ];
        let report = parser.parse_lines(&lines);
        assert_eq!(report.stats.malformed_timestamp, 1);
        assert_eq!(report.stats.unparsable_value, 1);
        assert_eq!(report.stats.failures(), 2);
        assert_eq!(report.events.len(), 1);
    }

    #[test]
    fn test_invalid_status_is_reported() {
        let table = table();
        let parser = EventParser::new(Source::UpperLayer, &["CHARGE_LEVEL"], &table);
        let lines = ["01-25 10:53:34.235 1 2 D GMVHAL : setPropFromVehicle Property: VendorProperty::CHARGE_LEVEL AreaID: 1 Status: 2 int32Values: 0"];
        let report = parser.parse_lines(&lines);

        assert!(report.events.is_empty());
        assert_eq!(report.stats.invalid_status, 1);
        match &report.diagnostics[0] {
            Diagnostic::InvalidStatus { status, flag_signal, .. } => {
                assert_eq!(*status, 2);
                assert_eq!(flag_signal.as_deref(), Some("TgtChrgLvl_Inv"));
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[test]
    fn test_range_and_access_conflicts() {
        let table = table();
        let parser = EventParser::new(Source::UpperLayer, &["TARGET_CHARGE_LEVEL_REQUEST"], &table);
        let lines = ["01-25 10:53:34.102 1 2 D GMVHAL : setPropFromVehicle Property: VendorProperty::TARGET_CHARGE_LEVEL_REQUEST AreaID: 1 Status: 0 int32Values: 60"];
        let report = parser.parse_lines(&lines);

        assert_eq!(report.events.len(), 1);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::OutOfRange { value, .. } if *value == 120.0)));
        assert!(report
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::AccessConflict { observed: Direction::Uplink, .. })));
    }

    #[test]
    fn test_resolve_by_same_signal_and_feedback_name() {
        let table = PropertyTable::new();
        let events = vec![
            SignalEvent::new(0.0, Source::Bus, "ICC_SetCLMOn", 0.0, Direction::Downlink),
            SignalEvent::new(0.1, Source::Bus, "ICC_SetCLMOn", 1.0, Direction::Unknown),
            SignalEvent::new(0.2, Source::Bus, "TMS_CLMSts", 1.0, Direction::Unknown),
        ];
        let mut diagnostics = Vec::new();
        let resolved = resolve_directions(&events, &table, &mut diagnostics);

        assert_eq!(resolved[1].direction, Direction::Downlink);
        assert_eq!(resolved[2].direction, Direction::Uplink);
        assert_eq!(diagnostics.len(), 2);
        assert!(matches!(
            diagnostics[0],
            Diagnostic::AmbiguousDirection { rule: ResolutionRule::SameSignal, .. }
        ));
        assert!(matches!(
            diagnostics[1],
            Diagnostic::AmbiguousDirection { rule: ResolutionRule::FeedbackName, .. }
        ));
    }

    #[test]
    fn test_resolve_by_temporal_precedence() {
        let table = PropertyTable::new();
        let events = vec![
            SignalEvent::new(0.0, Source::Bus, "ModeCmd", 0.0, Direction::Unknown),
            SignalEvent::new(0.0, Source::Bus, "ModeEcho", 0.0, Direction::Unknown),
            SignalEvent::new(1.0, Source::Bus, "ModeCmd", 2.0, Direction::Unknown),
            SignalEvent::new(1.2, Source::Bus, "ModeEcho", 2.0, Direction::Unknown),
        ];
        let mut diagnostics = Vec::new();
        let resolved = resolve_directions(&events, &table, &mut diagnostics);

        assert_eq!(resolved[0].direction, Direction::Downlink);
        assert_eq!(resolved[1].direction, Direction::Uplink);
        assert!(diagnostics.iter().all(|d| matches!(
            d,
            Diagnostic::AmbiguousDirection { rule: ResolutionRule::TemporalPrecedence, .. }
        )));
    }

    #[test]
    fn test_resolve_by_declared_access() {
        let table = table();
        let events = vec![SignalEvent::new(0.0, Source::Bus, "TgtChrgLvlReq", 1.0, Direction::Unknown)];
        let mut diagnostics = Vec::new();
        let resolved = resolve_directions(&events, &table, &mut diagnostics);
        assert_eq!(resolved[0].direction, Direction::Downlink);
    }

    #[test]
    fn test_no_unknown_is_untouched() {
        let table = PropertyTable::new();
        let events = vec![SignalEvent::new(0.0, Source::Bus, "A", 1.0, Direction::Uplink)];
        let mut diagnostics = Vec::new();
        assert_eq!(resolve_directions(&events, &table, &mut diagnostics), events);
        assert!(diagnostics.is_empty());
    }
}
