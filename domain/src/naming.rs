//! Naming strategies for the throwaway container and its credentials.
//!
//! Randomness is supplied by the caller as plain seeds, which keeps this
//! module deterministic and the domain crate free of RNG dependencies.

use crate::base62::{encode_padded, MAX_U64_WIDTH};

/// Prefix for every container this tool starts, handy for `docker ps --filter`.
pub const CONTAINER_PREFIX: &str = "temp_postgres_";

/// Container name derived from a seed, e.g. `temp_postgres_00000004c92`.
pub fn container_name(seed: u64) -> String {
    format!("{}{}", CONTAINER_PREFIX, encode_padded(seed, MAX_U64_WIDTH))
}

/// Alphanumeric secret built from one or more seeds, fixed width per seed.
pub fn secret(seeds: &[u64]) -> String {
    seeds
        .iter()
        .map(|&s| encode_padded(s, MAX_U64_WIDTH))
        .collect()
}

/// Map a seed onto an inclusive port range. Returns `lo` when the range is empty.
pub fn port_in_range(seed: u64, lo: u16, hi: u16) -> u16 {
    if hi <= lo {
        return lo;
    }
    let span = u64::from(hi - lo) + 1;
    lo + (seed % span) as u16
}
