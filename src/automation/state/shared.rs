use tokio::sync::{mpsc, oneshot};

use crate::models::PageStatus;

#[derive(Debug)]
pub enum StateCommand {
    /// Take the single automation run token. Replies false while a run is
    /// already active.
    TryBeginRun { reply: oneshot::Sender<bool> },
    EndRun,
    SetPageStatus { status: PageStatus },
    GetPageStatus {
        reply: oneshot::Sender<Option<PageStatus>>,
    },
}

/// Process-scoped mutable state, serialized on one command loop: the run
/// lock that keeps automation runs from overlapping, and the last observed
/// page status.
pub struct StateActor {
    run_active: bool,
    page_status: Option<PageStatus>,
    rx: mpsc::Receiver<StateCommand>,
}

impl StateActor {
    pub fn new(rx: mpsc::Receiver<StateCommand>) -> Self {
        Self {
            run_active: false,
            page_status: None,
            rx,
        }
    }

    pub async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                StateCommand::TryBeginRun { reply } => {
                    let granted = !self.run_active;
                    if granted {
                        self.run_active = true;
                    }
                    let _ = reply.send(granted);
                }
                StateCommand::EndRun => {
                    self.run_active = false;
                }
                StateCommand::SetPageStatus { status } => {
                    self.page_status = Some(status);
                }
                StateCommand::GetPageStatus { reply } => {
                    let _ = reply.send(self.page_status.clone());
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct StateClient {
    tx: mpsc::Sender<StateCommand>,
}

impl StateClient {
    pub fn new(tx: mpsc::Sender<StateCommand>) -> Self {
        Self { tx }
    }

    /// Spawn a state actor and return its client handle.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(StateActor::new(rx).run());
        Self::new(tx)
    }

    pub async fn try_begin_run(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(StateCommand::TryBeginRun { reply: tx }).await;
        rx.await.unwrap_or(false)
    }

    pub async fn end_run(&self) {
        let _ = self.tx.send(StateCommand::EndRun).await;
    }

    pub async fn set_page_status(&self, status: PageStatus) {
        let _ = self.tx.send(StateCommand::SetPageStatus { status }).await;
    }

    pub async fn page_status(&self) -> Option<PageStatus> {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(StateCommand::GetPageStatus { reply: tx }).await;
        rx.await.unwrap_or(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_token_is_exclusive() {
        let state = StateClient::spawn();
        assert!(state.try_begin_run().await);
        assert!(!state.try_begin_run().await);
        state.end_run().await;
        assert!(state.try_begin_run().await);
    }

    #[tokio::test]
    async fn page_status_round_trip() {
        let state = StateClient::spawn();
        assert!(state.page_status().await.is_none());

        state
            .set_page_status(PageStatus {
                in_target_group: true,
                url: "https://www.facebook.com/groups/123".into(),
            })
            .await;

        let status = state.page_status().await.unwrap();
        assert!(status.in_target_group);
        assert!(status.url.contains("/groups/123"));
    }
}
