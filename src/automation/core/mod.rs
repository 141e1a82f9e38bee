pub mod browser;
pub mod session;

pub use browser::{AcquiredPage, BrowserActor, BrowserCommand, PageQuery};
pub use session::SessionPool;

use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{AutomationError, Result};

/// Bound on any single actor round-trip. Page creation can take seconds on a
/// cold browser, so this is generous.
pub const ACTOR_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Await an actor reply with an explicit timeout; a dropped or late reply
/// surfaces as a routing failure instead of hanging the caller.
pub async fn await_reply<T>(rx: oneshot::Receiver<T>, what: &str) -> Result<T> {
    match tokio::time::timeout(ACTOR_REPLY_TIMEOUT, rx).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(AutomationError::Routing(format!(
            "{what}: reply channel dropped"
        ))),
        Err(_) => Err(AutomationError::Routing(format!("{what}: reply timed out"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_reply_is_a_routing_failure() {
        let (tx, rx) = oneshot::channel::<u32>();
        drop(tx);
        let err = await_reply(rx, "test").await.unwrap_err();
        assert!(matches!(err, AutomationError::Routing(_)));
        assert!(err.to_string().contains("reply channel dropped"));
    }

    #[tokio::test]
    async fn delivered_reply_passes_through() {
        let (tx, rx) = oneshot::channel();
        tx.send(7u32).unwrap();
        assert_eq!(await_reply(rx, "test").await.unwrap(), 7);
    }
}
