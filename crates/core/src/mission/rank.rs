use serde::{Deserialize, Serialize};

/// Letter grade for a finished run. Declaration order is best-first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum Rank {
    S,
    A,
    B,
    C,
    D,
    F,
}

impl Rank {
    /// `true` if `self` is strictly better than `other`.
    pub fn beats(self, other: Rank) -> bool {
        self < other
    }

    pub fn best(a: Option<Rank>, b: Option<Rank>) -> Option<Rank> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Minutes per kilometer each rank has to beat.
const PACE_S: f64 = 6.0;
const PACE_A: f64 = 8.0;
const PACE_B: f64 = 10.0;
const PACE_C: f64 = 12.0;

/// Grade a run. Pure: the same inputs always give the same rank.
pub fn rank(
    duration_seconds: f64,
    target_distance_km: f64,
    completed_objectives: u32,
    total_objectives: u32,
    captured: bool,
) -> Rank {
    if captured {
        return Rank::F;
    }

    let limit = |minutes_per_km: f64| target_distance_km * minutes_per_km * 60.0;

    if duration_seconds <= limit(PACE_S) && completed_objectives >= total_objectives {
        Rank::S
    } else if duration_seconds <= limit(PACE_A) && completed_objectives >= 2 {
        Rank::A
    } else if duration_seconds <= limit(PACE_B) && completed_objectives >= 1 {
        Rank::B
    } else if duration_seconds <= limit(PACE_C) {
        Rank::C
    } else {
        Rank::D
    }
}
