//! crates/vaccimap_core/src/guard.rs
//!
//! Races a flow's suspension points against its teardown token, so a result
//! that arrives after the screen is gone is dropped instead of applied.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// The owning flow was torn down while the call was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("the screen was closed before the operation finished")]
pub struct Detached;

pub(crate) async fn while_mounted<F, T>(token: &CancellationToken, call: F) -> Result<T, Detached>
where
    F: Future<Output = T>,
{
    if token.is_cancelled() {
        return Err(Detached);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Detached),
        out = call => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_while_mounted() {
        let token = CancellationToken::new();
        assert_eq!(while_mounted(&token, async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn drops_result_after_teardown() {
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(while_mounted(&token, async { 7 }).await, Err(Detached));
    }

    #[tokio::test]
    async fn teardown_mid_flight_wins_over_a_pending_call() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        let call = async {
            canceller.cancel();
            futures::future::pending::<()>().await
        };
        assert_eq!(while_mounted(&token, call).await, Err(Detached));
    }
}
