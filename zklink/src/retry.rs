//! Bounded retries for operations that can come back empty-handed

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::error::Result;

/// One boxed attempt borrowing its target for `'a`
pub type Attempt<'a, T> = Pin<Box<dyn Future<Output = Result<Option<T>>> + Send + 'a>>;

/// Run `op` against `target` until it yields a value, at most `attempts`
/// times
///
/// `Ok(None)` from an attempt means "try again"; errors end the loop at
/// once. Returns `Ok(None)` when every attempt came back empty.
pub async fn bounded<S, T, F>(target: &mut S, attempts: usize, mut op: F) -> Result<Option<T>>
where
    F: for<'a> FnMut(&'a mut S) -> Attempt<'a, T>,
{
    for attempt in 1..=attempts {
        if let Some(value) = op(target).await? {
            return Ok(Some(value));
        }
        debug!(attempt, attempts, "Attempt came back empty");
    }
    Ok(None)
}
