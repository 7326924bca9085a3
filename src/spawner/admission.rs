//! Admission control.

/// Number of agents that may be admitted.
///
/// `min(requested, floor(available * fraction / per_agent))`. A zero
/// per-agent estimate admits nothing.
pub fn admissible(
    requested: usize,
    available_bytes: u64,
    fraction: f64,
    per_agent_bytes: u64,
) -> usize {
    if per_agent_bytes == 0 || fraction.is_nan() || fraction <= 0.0 {
        return 0;
    }
    let budget = (available_bytes as f64 * fraction.min(1.0)).floor();
    let ceiling = (budget / per_agent_bytes as f64).floor();
    if ceiling >= usize::MAX as f64 {
        return requested;
    }
    requested.min(ceiling as usize)
}
