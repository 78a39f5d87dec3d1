//! Deadlines for shared-state calls.
//!
//! Every store and identity lookup made on the request path goes through
//! [`with_deadline`]. A call that misses its deadline is reported as
//! [`StoreError::Timeout`], which the pipeline turns into a fail-closed
//! rejection.

use std::future::Future;
use std::time::Duration;

use crate::store::StoreError;

/// Run `call`, failing with [`StoreError::Timeout`] once `deadline` elapses.
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}
