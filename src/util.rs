//! Small helpers shared by the client and the intel modules.

use colored::Colorize;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::{Duration, Instant};

pub use ::backoff::future::retry_notify;
pub use ::backoff::Error as BackoffError;
pub use ::backoff::ExponentialBackoff;

/// Splits `items` into consecutive chunks of at most `size`.
///
/// `size` must be greater than zero.
pub fn batch<T>(items: &[T], size: usize) -> impl Iterator<Item = &[T]> {
    items.chunks(size)
}

/// Runs `f`, logging how long it took at debug level.
pub async fn timeit<F, T>(name: &str, f: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let result = f.await;
    log::debug!(
        "{name} took {elapsed:.2?}",
        name = name.cyan(),
        elapsed = start.elapsed()
    );
    result
}

const RETRY_INITIAL_INTERVAL: Duration = Duration::from_secs(1);
const RETRY_MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Backoff for retrying graph writes: 1s, 2s, 4s, ... capped at a minute.
///
/// Never gives up on its own; callers bound the number of attempts.
pub fn graph_retry_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: RETRY_INITIAL_INTERVAL,
        initial_interval: RETRY_INITIAL_INTERVAL,
        randomization_factor: 0.0,
        multiplier: 2.0,
        max_interval: RETRY_MAX_INTERVAL,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}

/// Runs `f` over `items` with at most `max_workers` futures in flight. Result order is not kept.
pub async fn run_bounded<I, F, Fut, T>(items: I, max_workers: usize, f: F) -> Vec<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(items)
        .map(f)
        .buffer_unordered(max_workers.max(1))
        .collect()
        .await
}
