//! Direction marker table
//!
//! Direction is inferred from fixed lexical markers on the original log line.
//! Matching is case-insensitive. A marker is either a plain substring or a whole
//! word (bounded by non-alphanumeric characters, so `_` separates words). A
//! match that lies inside a longer match of any marker is shadowed: the
//! `set` in `setPropFromVehicle` never counts as a downlink marker.

use crate::types::Direction;

/// How a marker is matched against the line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Substring,
    Word,
}

/// One row of the marker table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    /// Lower-case marker text
    pub text: &'static str,
    pub kind: MarkerKind,
    pub direction: Direction,
}

const fn marker(text: &'static str, kind: MarkerKind, direction: Direction) -> Marker {
    Marker {
        text,
        kind,
        direction,
    }
}

/// The complete marker table
pub const DIRECTION_MARKERS: &[Marker] = &[
    // Downlink: upper layer writes toward the bus
    marker("vhal_set", MarkerKind::Substring, Direction::Downlink),
    marker("set prop", MarkerKind::Substring, Direction::Downlink),
    marker("cansetvehicleparam", MarkerKind::Substring, Direction::Downlink),
    marker("send", MarkerKind::Substring, Direction::Downlink),
    marker("set", MarkerKind::Word, Direction::Downlink),
    marker("tx", MarkerKind::Word, Direction::Downlink),
    // Uplink: bus reports back to the upper layer
    marker("setpropfromvehicle", MarkerKind::Substring, Direction::Uplink),
    marker("feedback-from-vehicle", MarkerKind::Substring, Direction::Uplink),
    marker("vhal_get", MarkerKind::Substring, Direction::Uplink),
    marker("recv", MarkerKind::Substring, Direction::Uplink),
    marker("receive", MarkerKind::Substring, Direction::Uplink),
    marker("get", MarkerKind::Word, Direction::Uplink),
    marker("rx", MarkerKind::Word, Direction::Uplink),
];

/// Name fragments that mark a status/feedback signal
const FEEDBACK_FRAGMENTS: &[&str] = &["sts", "status", "fb", "feedback", "fed"];

#[derive(Debug, Clone, Copy)]
struct Hit {
    start: usize,
    end: usize,
    direction: Direction,
}

/// Infer the direction of a log line
///
/// Returns `Unknown` when no marker matches or when markers of both
/// directions survive shadowing.
pub fn infer_direction(line: &str) -> Direction {
    let lower = line.to_ascii_lowercase();
    let hits = marker_hits(&lower);

    // Drop hits contained in a strictly longer hit
    let surviving = hits.iter().filter(|hit| {
        !hits.iter().any(|other| {
            other.start <= hit.start
                && other.end >= hit.end
                && (other.end - other.start) > (hit.end - hit.start)
        })
    });

    let mut downlink = false;
    let mut uplink = false;
    for hit in surviving {
        match hit.direction {
            Direction::Downlink => downlink = true,
            Direction::Uplink => uplink = true,
            Direction::Unknown => {}
        }
    }

    match (downlink, uplink) {
        (true, false) => Direction::Downlink,
        (false, true) => Direction::Uplink,
        _ => Direction::Unknown,
    }
}

fn marker_hits(lower: &str) -> Vec<Hit> {
    let bytes = lower.as_bytes();
    let mut hits = Vec::new();
    for marker in DIRECTION_MARKERS {
        for (start, _) in lower.match_indices(marker.text) {
            let end = start + marker.text.len();
            if marker.kind == MarkerKind::Word {
                let before_ok = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
                let after_ok = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
                if !(before_ok && after_ok) {
                    continue;
                }
            }
            hits.push(Hit {
                start,
                end,
                direction: marker.direction,
            });
        }
    }
    hits
}

/// True if a signal name looks like a status/feedback signal
///
/// The name is split into word parts on `_` and on lower→upper case changes
/// (`TMS_First_BlowingSts` → `tms`, `first`, `blowing`, `sts`); a part must
/// equal one of the fragments or end with it (`THRCLMSWITCHFB`). A glued
/// `sts` after a vowel is an English plural (`REQUESTS`, `ADJUSTS`), not a
/// status suffix.
pub fn is_feedback_signal(name: &str) -> bool {
    name_parts(name).iter().any(|part| {
        FEEDBACK_FRAGMENTS
            .iter()
            .any(|fragment| part == fragment || is_glued_suffix(part, fragment))
    })
}

fn is_glued_suffix(part: &str, fragment: &str) -> bool {
    if part.len() <= 4 || !part.ends_with(fragment) {
        return false;
    }
    if fragment != "sts" {
        return true;
    }
    let stem = &part[..part.len() - fragment.len()];
    !stem.ends_with(['a', 'e', 'i', 'o', 'u'])
}

fn name_parts(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
