//! Ranking and filtering
//!
//! Pure functions over the candidate set; no I/O. Sorts are stable and
//! ascending, so equal keys keep the set's iteration order.

use crate::models::{Server, NOT_ALIVE};

/// Candidates whose TCP connect succeeded within the timeout.
pub fn alive_by_connection(servers: &[Server]) -> Vec<&Server> {
    servers
        .iter()
        .filter(|s| s.measurement.connection_time < NOT_ALIVE)
        .collect()
}

/// Candidates where every probed URL succeeded. One failed URL poisons the
/// aggregate: its sentinel dominates the sum.
pub fn alive_by_http(servers: &[Server]) -> Vec<&Server> {
    servers
        .iter()
        .filter(|s| s.measurement.http_time_total() < NOT_ALIVE)
        .collect()
}

/// The `n` fastest candidates by connection time; `n == 0` returns all,
/// sorted.
pub fn fastest_by_connection(servers: &[Server], n: usize) -> Vec<&Server> {
    sorted_by_key(servers, n, |s| s.measurement.connection_time)
}

/// The `n` fastest candidates by aggregate HTTP time; `n == 0` returns all,
/// sorted.
pub fn fastest_by_http(servers: &[Server], n: usize) -> Vec<&Server> {
    sorted_by_key(servers, n, |s| s.measurement.http_time_total())
}

fn sorted_by_key<F>(servers: &[Server], n: usize, key: F) -> Vec<&Server>
where
    F: Fn(&Server) -> f64,
{
    let mut sorted: Vec<&Server> = servers.iter().collect();
    sorted.sort_by(|a, b| key(a).total_cmp(&key(b)));
    if n > 0 {
        sorted.truncate(n);
    }
    sorted
}
