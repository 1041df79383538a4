//! Choosing one unit among several matches from the same tier.
//!
//! Rules, in order:
//! 1. better match kind wins (exact > alias > substring)
//! 2. smaller area wins when areas differ by more than [`AREA_TIE_TOLERANCE`]
//! 3. candidates describing the same unit (same name and parent) collapse to
//!    the first in dataset order
//! 4. anything still tied is ambiguous

use crate::boundary::BoundaryMatch;
use crate::normalize::normalize_name;

/// Relative area difference under which two candidates count as tied.
pub const AREA_TIE_TOLERANCE: f64 = 0.005;

/// Outcome of tie-breaking.
#[derive(Debug, Clone)]
pub enum Selection {
    Unique(BoundaryMatch),
    /// Tied candidates first, then the remaining matches by rank.
    Ambiguous(Vec<BoundaryMatch>),
}

/// Pick a single match or report ambiguity. Returns `None` for no matches.
pub fn select(matches: Vec<BoundaryMatch>) -> Option<Selection> {
    let mut ranked = matches;
    ranked.sort_by(|a, b| {
        a.match_kind
            .cmp(&b.match_kind)
            .then(a.area_km2.total_cmp(&b.area_km2))
            .then(a.order.cmp(&b.order))
    });

    let best = ranked.first()?.clone();
    let tied: Vec<&BoundaryMatch> = ranked
        .iter()
        .filter(|m| m.match_kind == best.match_kind && areas_tied(m.area_km2, best.area_km2))
        .collect();

    if tied.len() == 1 {
        return Some(Selection::Unique(best));
    }

    let best_identity = identity(&best);
    if tied.iter().all(|m| identity(m) == best_identity) {
        let first_in_dataset = tied
            .iter()
            .min_by_key(|m| m.order)
            .map(|m| (*m).clone())
            .unwrap_or(best);
        return Some(Selection::Unique(first_in_dataset));
    }

    Some(Selection::Ambiguous(ranked))
}

fn areas_tied(a: f64, b: f64) -> bool {
    let larger = a.abs().max(b.abs());
    if larger == 0.0 {
        return true;
    }
    (a - b).abs() / larger <= AREA_TIE_TOLERANCE
}

fn identity(m: &BoundaryMatch) -> (String, Option<String>) {
    (
        normalize_name(&m.feature.name),
        m.feature.parent.as_deref().map(normalize_name),
    )
}
