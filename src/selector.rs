//! Least-used provider selection.
//!
//! Pure selection logic, separated from the stateful registry so the policy
//! can be tested without locks or clocks. The registry calls
//! [`least_used`] under its write lock, which is what serialises the
//! select-then-record sequence.

use crate::registry::ProviderEntry;

/// Pick the best eligible entry: smallest `request_count`, ties broken by
/// the smallest (oldest) `last_used_ms`.
///
/// Ineligible entries are skipped. Returns the index into `entries`, or
/// `None` when nothing is eligible. Entries must already have had lazy
/// resets applied for the instant being evaluated.
pub fn least_used(entries: &[ProviderEntry]) -> Option<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_eligible())
        .min_by_key(|(_, e)| (e.request_count, e.last_used_ms))
        .map(|(idx, _)| idx)
}
