//! Cancellation helpers shared by the provider adapters.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::Error;

/// Run `future` until it completes or `cancel` fires, whichever comes first.
pub(crate) async fn with_cancel<T, F>(cancel: &CancellationToken, future: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}
