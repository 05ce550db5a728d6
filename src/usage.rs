//! RPC usage reporting

use crate::engine::RpcStats;
use crate::util::fmt::human_size;

/// One-line summary of the RPC traffic recorded so far.
///
/// The time is the running sum of the response-time summary, rounded to
/// milliseconds. Never-used counters render as zeroes.
pub fn summarize(stats: &RpcStats) -> String {
    let [_, total_time] = stats.response_time().samples();
    format!(
        "{} requests ({}) in {:.3}s (response {})",
        stats.requests(),
        human_size(stats.request_bytes()),
        total_time.value,
        human_size(stats.response_bytes()),
    )
}
