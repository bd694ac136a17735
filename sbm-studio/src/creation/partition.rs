//! Session partitioning
//!
//! The number of browser sessions grows with the batch size in fixed tiers
//! (at most four), and each session gets an equal share of the prompts so
//! tabs per session stay bounded.

use std::ops::Range;

/// Sessions used for a batch of `total` prompts
pub fn session_count_for(total: usize) -> usize {
    match total {
        0 => 0,
        1..=10 => 1,
        11..=20 => 2,
        21..=30 => 3,
        _ => 4,
    }
}

/// Prompts per session for a batch of `total` prompts
pub fn songs_per_session(total: usize) -> usize {
    match session_count_for(total) {
        0 => 0,
        sessions => total.div_ceil(sessions),
    }
}

/// Index ranges of each session, in order
///
/// The last session may be shorter; no session is empty.
pub fn partition(total: usize) -> Vec<Range<usize>> {
    let size = songs_per_session(total);
    if size == 0 {
        return Vec::new();
    }
    (0..total)
        .step_by(size)
        .map(|start| start..(start + size).min(total))
        .collect()
}
