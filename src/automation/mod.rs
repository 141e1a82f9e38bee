pub mod agents;
pub mod core;
pub mod state;

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::automation::agents::{extractor, poster::Sequencer, scroller};
use crate::automation::core::{await_reply, BrowserCommand, PageQuery, SessionPool};
use crate::automation::state::StateClient;
use crate::config::AppConfig;
use crate::error::{AutomationError, Result};
use crate::groups::GroupCache;
use crate::logbook::Logbook;
use crate::models::{
    GroupRecord, GroupsResponse, LogStatus, PageStatus, PostRequest, PostResponse,
};
use crate::storage::Store;

const TARGET_SESSION: &str = "target";

/// Routes commands to the browser session, the cache and the log, and holds
/// the single-run lock for post automation.
pub struct Orchestrator {
    config: AppConfig,
    sessions: tokio::sync::Mutex<SessionPool>,
    state: StateClient,
    cache: GroupCache,
    logbook: Logbook,
}

impl Orchestrator {
    pub fn new(config: AppConfig, store: Store) -> Self {
        let cache = GroupCache::new(
            store.clone(),
            config.target_host.clone(),
            config.canonical_origin.clone(),
            config.cache_ttl(),
        );
        let logbook = Logbook::load(store, config.log_cap);
        let sessions = tokio::sync::Mutex::new(SessionPool::new(
            config.session_max_tasks,
            Duration::from_secs(config.session_max_age_secs),
        ));
        Self {
            config,
            sessions,
            state: StateClient::spawn(),
            cache,
            logbook,
        }
    }

    pub fn logbook(&self) -> &Logbook {
        &self.logbook
    }

    /// Serve groups from the cache when it is fresh and non-empty, otherwise
    /// run a discovery pass against the live page. A fresh but empty envelope
    /// (what an explicit clear leaves behind) deliberately counts as a miss:
    /// a cleared cache should repopulate on the next fetch instead of serving
    /// an empty list for the rest of the TTL window.
    pub async fn fetch_groups(&self) -> GroupsResponse {
        if let Some(groups) = self.cache.load_fresh() {
            if !groups.is_empty() {
                info!(count = groups.len(), "serving groups from cache");
                self.logbook.append(
                    "fetch groups",
                    LogStatus::Info,
                    &format!("{} groups from cache", groups.len()),
                );
                return GroupsResponse {
                    success: true,
                    groups,
                    message: None,
                };
            }
        }

        match self.discover_groups().await {
            Ok(groups) => {
                self.logbook.append(
                    "fetch groups",
                    LogStatus::Success,
                    &format!("{} groups discovered", groups.len()),
                );
                GroupsResponse {
                    success: true,
                    groups,
                    message: None,
                }
            }
            Err(e) => {
                self.logbook
                    .append("fetch groups", LogStatus::Error, &e.to_string());
                GroupsResponse {
                    success: false,
                    groups: Vec::new(),
                    message: Some(e.to_string()),
                }
            }
        }
    }

    /// Scroll the group-listing page and merge each batch of candidates into
    /// the cache as it arrives. When the listing page cannot be acquired,
    /// falls back to a single harvest pass on whatever target-domain tab is
    /// already open.
    async fn discover_groups(&self) -> Result<Vec<GroupRecord>> {
        let browser = {
            let mut pool = self.sessions.lock().await;
            let tx = pool.get_or_create(TARGET_SESSION, &self.config).await?;
            pool.increment_task(TARGET_SESSION);
            tx
        };

        let (tx, rx) = oneshot::channel();
        browser
            .send(BrowserCommand::AcquirePage {
                query: PageQuery {
                    target_url: self.config.groups_page_url(),
                    group_path: Some(self.config.groups_page_path.clone()),
                    allow_create: true,
                    background: false,
                },
                reply: tx,
            })
            .await
            .map_err(|_| AutomationError::Routing("browser actor gone".into()))?;

        let acquired = match await_reply(rx, "acquire groups page").await? {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(error = %e, "groups page unavailable, trying open tabs");
                return self.harvest_open_tab(&browser).await;
            }
        };

        self.state
            .set_page_status(PageStatus {
                in_target_group: acquired.url.contains("/groups/"),
                url: acquired.url.clone(),
            })
            .await;

        sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        let (batch_tx, mut batch_rx) = mpsc::channel(8);
        let plan = scroller::ScrollPlan {
            iterations: self.config.scroll_iterations,
            pause: Duration::from_millis(self.config.scroll_pause_ms),
        };
        let page = acquired.page;
        let host = self.config.target_host.clone();
        let origin = self.config.canonical_origin.clone();
        let scroll_task = tokio::spawn(async move {
            scroller::run(&page, plan, &host, &origin, batch_tx).await
        });

        let mut merged: Vec<GroupRecord> = Vec::new();
        while let Some(batch) = batch_rx.recv().await {
            match self.cache.merge_and_store(&batch) {
                Ok(groups) => merged = groups,
                Err(e) => {
                    warn!(error = %e, "batch merge failed");
                    self.logbook
                        .append("merge groups", LogStatus::Warning, &e.to_string());
                }
            }
        }

        match scroll_task.await {
            Ok(Ok(())) => {}
            // Partial results beat none; a late scroll failure only matters
            // when nothing was harvested at all.
            Ok(Err(e)) if merged.is_empty() => return Err(e),
            Ok(Err(e)) => warn!(error = %e, "scroll pass ended early"),
            Err(e) => {
                if merged.is_empty() {
                    return Err(AutomationError::Routing(format!(
                        "scroll task panicked: {e}"
                    )));
                }
            }
        }

        Ok(merged)
    }

    async fn harvest_open_tab(
        &self,
        browser: &mpsc::Sender<BrowserCommand>,
    ) -> Result<Vec<GroupRecord>> {
        let (tx, rx) = oneshot::channel();
        browser
            .send(BrowserCommand::AcquirePage {
                query: PageQuery {
                    target_url: self.config.groups_page_url(),
                    group_path: None,
                    allow_create: false,
                    background: true,
                },
                reply: tx,
            })
            .await
            .map_err(|_| AutomationError::Routing("browser actor gone".into()))?;
        let acquired = await_reply(rx, "acquire open tab").await??;

        sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
        let candidates = extractor::extract(
            &acquired.page,
            &self.config.target_host,
            &self.config.canonical_origin,
        )
        .await?;
        self.cache.merge_and_store(&candidates)
    }

    /// Run the post sequence. At most one run at a time; a second request
    /// while one is active is rejected, not queued.
    pub async fn test_post(&self, request: PostRequest) -> PostResponse {
        if request.content.trim().is_empty() {
            let err = AutomationError::Validation("post content is empty".into());
            self.logbook.append("post", LogStatus::Error, &err.to_string());
            return PostResponse {
                success: false,
                message: err.to_string(),
            };
        }

        if !self.state.try_begin_run().await {
            self.logbook
                .append("post", LogStatus::Warning, "automation already running");
            return PostResponse {
                success: false,
                message: "automation already running".to_string(),
            };
        }

        let result = self.run_sequence(&request).await;
        self.state.end_run().await;

        match result {
            Ok(message) => PostResponse {
                success: true,
                message,
            },
            Err(e) => PostResponse {
                success: false,
                message: e.to_string(),
            },
        }
    }

    async fn run_sequence(&self, request: &PostRequest) -> Result<String> {
        let browser = {
            let mut pool = self.sessions.lock().await;
            let tx = pool.get_or_create(TARGET_SESSION, &self.config).await?;
            pool.increment_task(TARGET_SESSION);
            tx
        };

        let state = self.state.clone();
        let sequencer = Sequencer::new(&self.config, browser, &self.logbook, move |status| {
            let state = state.clone();
            tokio::spawn(async move { state.set_page_status(status).await });
        });
        sequencer.run(request).await
    }

    /// Current page status. Answers from the last observed status when one
    /// exists, otherwise probes an already-live browser session. Never
    /// launches a browser.
    pub async fn check_status(&self) -> PageStatus {
        if let Some(status) = self.state.page_status().await {
            return status;
        }

        let browser = { self.sessions.lock().await.existing(TARGET_SESSION) };
        let Some(browser) = browser else {
            return PageStatus {
                in_target_group: false,
                url: String::new(),
            };
        };

        let (tx, rx) = oneshot::channel();
        if browser.send(BrowserCommand::ObserveUrl { reply: tx }).await.is_err() {
            return PageStatus {
                in_target_group: false,
                url: String::new(),
            };
        }
        let url = await_reply(rx, "observe url")
            .await
            .ok()
            .flatten()
            .unwrap_or_default();

        let status = PageStatus {
            in_target_group: url.contains("/groups/"),
            url,
        };
        self.state.set_page_status(status.clone()).await;
        status
    }
}
