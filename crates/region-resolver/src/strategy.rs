//! Ordered lookup plan for name resolution.
//!
//! A plan is a flat list of steps; the resolver runs them in order and stops
//! at the first step that produces an exact or alias match. Tiers come
//! finest first, and within a tier:
//! 1. canonical name (with parent filter, if a parent is known)
//! 2. alternate names (with parent filter)
//! 3. canonical name, then alternates, without the parent filter

use std::sync::Arc;

use crate::boundary::BoundarySource;
use crate::tier::Tier;

/// Which names to query and whether to apply the parent filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Canonical { with_parent: bool },
    Alternates { with_parent: bool },
}

impl Attempt {
    pub fn uses_parent(&self) -> bool {
        match self {
            Attempt::Canonical { with_parent } | Attempt::Alternates { with_parent } => {
                *with_parent
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Attempt::Canonical { with_parent: true } => "canonical+parent",
            Attempt::Canonical { with_parent: false } => "canonical",
            Attempt::Alternates { with_parent: true } => "alternates+parent",
            Attempt::Alternates { with_parent: false } => "alternates",
        }
    }
}

/// Attempts to run against one source.
pub fn attempts(has_parent: bool) -> Vec<Attempt> {
    if has_parent {
        vec![
            Attempt::Canonical { with_parent: true },
            Attempt::Alternates { with_parent: true },
            Attempt::Canonical { with_parent: false },
            Attempt::Alternates { with_parent: false },
        ]
    } else {
        vec![
            Attempt::Canonical { with_parent: false },
            Attempt::Alternates { with_parent: false },
        ]
    }
}

/// One source/attempt pair.
#[derive(Clone)]
pub struct Step {
    pub source: Arc<dyn BoundarySource>,
    pub attempt: Attempt,
}

/// Build the full plan for a query.
///
/// Sources coarser-or-equal to `tier_hint` take part (no hint = all),
/// ordered finest tier first and by registration order within a tier.
pub fn plan(
    sources: &[Arc<dyn BoundarySource>],
    tier_hint: Option<Tier>,
    has_parent: bool,
) -> Vec<Step> {
    let floor = tier_hint.unwrap_or(Tier::District);
    let mut eligible: Vec<&Arc<dyn BoundarySource>> = sources
        .iter()
        .filter(|s| s.tier() != Tier::Raw && floor.is_at_least_as_fine_as(s.tier()))
        .collect();
    // stable: registration order is kept within a tier
    eligible.sort_by_key(|s| s.tier().rank());

    eligible
        .into_iter()
        .flat_map(|source| {
            attempts(has_parent).into_iter().map(move |attempt| Step {
                source: Arc::clone(source),
                attempt,
            })
        })
        .collect()
}
