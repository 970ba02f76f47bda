//! Verdict aggregation
//!
//! Folds the per-pair outcomes of one session into a single verdict and
//! collects the evidence that decided it.

use crate::types::{
    AlignmentWindow, ConsistencyVerdict, Diagnostic, Evidence, EvidenceValue, OutcomeKind,
    ParseSummary, TransitionPair, ValueRole,
};

/// Overall outcome and the indices of the pairs that decided it
///
/// All-success (including no pairs at all) is `Responded` and every pair
/// decides; otherwise the worst outcome by severity wins.
pub fn overall_outcome(pairs: &[TransitionPair]) -> (OutcomeKind, Vec<usize>) {
    if pairs.iter().all(|p| p.outcome.is_success()) {
        return (OutcomeKind::Responded, (0..pairs.len()).collect());
    }

    let worst = pairs
        .iter()
        .map(|p| p.outcome)
        .max_by_key(|o| o.severity())
        .unwrap_or(OutcomeKind::Responded);
    let deciding = pairs
        .iter()
        .enumerate()
        .filter(|(_, p)| p.outcome == worst)
        .map(|(i, _)| i)
        .collect();
    (worst, deciding)
}

/// Build the final verdict of a session
pub fn aggregate(
    session_id: &str,
    window: Option<AlignmentWindow>,
    pairs: Vec<TransitionPair>,
    mut diagnostics: Vec<Diagnostic>,
    parse: ParseSummary,
) -> ConsistencyVerdict {
    let (overall, deciding) = if window.is_none() {
        (OutcomeKind::Unmatched, Vec::new())
    } else {
        if pairs.is_empty() {
            diagnostics.push(Diagnostic::NoDownlinkTransitions);
        }
        overall_outcome(&pairs)
    };

    let evidence = collect_evidence(&pairs, deciding);
    log::info!(
        "Session '{}': {} ({} pair(s), {} diagnostic(s))",
        session_id,
        overall,
        pairs.len(),
        diagnostics.len()
    );

    ConsistencyVerdict {
        session_id: session_id.to_string(),
        window,
        pairs,
        overall_outcome: overall,
        evidence,
        diagnostics,
        parse,
    }
}

fn collect_evidence(pairs: &[TransitionPair], deciding: Vec<usize>) -> Evidence {
    let mut evidence = Evidence::default();
    for pair in pairs {
        push_unique(&mut evidence.downlink_signals, &pair.downlink_event.signal_name);
        push_unique(&mut evidence.uplink_signals, &pair.responder);
    }

    for &idx in &deciding {
        let pair = &pairs[idx];
        evidence.values_involved.push(EvidenceValue {
            signal: pair.downlink_event.signal_name.clone(),
            value: pair.target_value,
            role: ValueRole::Commanded,
            timestamp: Some(pair.downlink_event.timestamp),
        });
        match (&pair.uplink_event, pair.unexpected_value) {
            (Some(event), Some(value)) => evidence.values_involved.push(EvidenceValue {
                signal: pair.responder.clone(),
                value,
                role: ValueRole::Unexpected,
                timestamp: Some(event.timestamp),
            }),
            (Some(event), None) => evidence.values_involved.push(EvidenceValue {
                signal: pair.responder.clone(),
                value: event.value,
                role: ValueRole::Observed,
                timestamp: Some(event.timestamp),
            }),
            _ => {}
        }
    }

    evidence.deciding_pairs = deciding;
    evidence
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}
