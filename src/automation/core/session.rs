use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::info;

use crate::automation::core::browser::{BrowserActor, BrowserCommand};
use crate::config::AppConfig;
use crate::error::Result;

pub struct SessionEntry {
    pub tx: mpsc::Sender<BrowserCommand>,
    pub task_count: usize,
    pub created_at: Instant,
}

/// One recyclable browser session per profile name. A session past its
/// task or age limit is closed and relaunched on next use.
pub struct SessionPool {
    sessions: HashMap<String, SessionEntry>,
    max_tasks: usize,
    max_age: Duration,
}

impl SessionPool {
    pub fn new(max_tasks: usize, max_age: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            max_tasks,
            max_age,
        }
    }

    pub async fn get_or_create(
        &mut self,
        name: &str,
        config: &AppConfig,
    ) -> Result<mpsc::Sender<BrowserCommand>> {
        if let Some(entry) = self.sessions.get(name) {
            let age = entry.created_at.elapsed();
            if entry.task_count < self.max_tasks && age < self.max_age {
                return Ok(entry.tx.clone());
            }

            info!(session = name, "session limit reached, restarting");
            let _ = entry.tx.send(BrowserCommand::Close).await;
            self.sessions.remove(name);
        }

        let (tx, rx) = mpsc::channel(32);
        let actor = BrowserActor::new(config, rx).await?;
        tokio::spawn(actor.run());

        self.sessions.insert(
            name.to_string(),
            SessionEntry {
                tx: tx.clone(),
                task_count: 0,
                created_at: Instant::now(),
            },
        );

        Ok(tx)
    }

    /// A live session handle without launching anything.
    pub fn existing(&self, name: &str) -> Option<mpsc::Sender<BrowserCommand>> {
        self.sessions.get(name).map(|e| e.tx.clone())
    }

    pub fn increment_task(&mut self, name: &str) {
        if let Some(entry) = self.sessions.get_mut(name) {
            entry.task_count += 1;
        }
    }

    pub async fn purge(&mut self, name: &str) {
        if let Some(entry) = self.sessions.remove(name) {
            let _ = entry.tx.send(BrowserCommand::Close).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_does_not_launch() {
        let pool = SessionPool::new(50, Duration::from_secs(3600));
        assert!(pool.existing("target").is_none());
    }

    #[test]
    fn task_increment_is_scoped_per_session() {
        let mut pool = SessionPool::new(50, Duration::from_secs(3600));
        // No entry yet; incrementing a missing session is a no-op.
        pool.increment_task("target");
        assert!(pool.existing("target").is_none());
    }
}
