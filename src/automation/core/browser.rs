use std::path::PathBuf;
use std::time::Instant;

use chromiumoxide::browser::HeadlessMode;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{AutomationError, Result};

/// How a page should be obtained. The actor is the only entity that opens,
/// activates or closes pages; callers hold a `Page` only to drive its DOM.
#[derive(Debug)]
pub struct PageQuery {
    /// URL to navigate or create at when no suitable tab is open.
    pub target_url: String,
    /// Preferred path fragment; an open tab already on it wins over one that
    /// merely matches the domain.
    pub group_path: Option<String>,
    /// Whether a fresh page may be created when nothing matches. When false
    /// the acquisition is read-only: an open tab is taken as it stands, never
    /// navigated.
    pub allow_create: bool,
    /// Create the page without stealing focus.
    pub background: bool,
}

#[derive(Debug)]
pub struct AcquiredPage {
    pub page: Page,
    pub url: String,
    pub reused: bool,
}

#[derive(Debug)]
pub enum BrowserCommand {
    AcquirePage {
        query: PageQuery,
        reply: oneshot::Sender<Result<AcquiredPage>>,
    },
    /// URL of the first open tab on the target domain, without activating it.
    ObserveUrl {
        reply: oneshot::Sender<Option<String>>,
    },
    ClosePage {
        page: Page,
    },
    Ping {
        reply: oneshot::Sender<bool>,
    },
    Close,
}

/// Owns one browser connection and serializes all page-lifecycle work on a
/// single command loop.
pub struct BrowserActor {
    browser: Browser,
    handler: Option<JoinHandle<()>>,
    target_host: String,
    _created_at: Instant,
    rx: mpsc::Receiver<BrowserCommand>,
}

impl BrowserActor {
    /// Reconnect to a browser already listening on the debug port, or launch
    /// a new one with a persistent profile.
    pub async fn new(config: &AppConfig, rx: mpsc::Receiver<BrowserCommand>) -> Result<Self> {
        let (browser, mut handler) = match Self::connect_existing(config.debug_port).await {
            Some(pair) => pair,
            None => {
                info!(port = config.debug_port, "launching browser");
                let browser_cfg = Self::browser_config(config)?;
                Browser::launch(browser_cfg).await?
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("browser handler ended: {e}");
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler: Some(handler_task),
            target_host: config.target_host.clone(),
            _created_at: Instant::now(),
            rx,
        })
    }

    async fn connect_existing(debug_port: u16) -> Option<(Browser, chromiumoxide::Handler)> {
        let version_url = format!("http://127.0.0.1:{debug_port}/json/version");
        let resp = reqwest::get(&version_url).await.ok()?;
        let json: serde_json::Value = resp.json().await.ok()?;
        let ws_url = json.get("webSocketDebuggerUrl")?.as_str()?;
        info!(port = debug_port, "reconnecting to running browser");
        Browser::connect(ws_url).await.ok()
    }

    fn browser_config(config: &AppConfig) -> Result<BrowserConfig> {
        let headless = if config.headless {
            HeadlessMode::New
        } else {
            HeadlessMode::False
        };
        BrowserConfig::builder()
            .user_data_dir(PathBuf::from(config.profile_dir()))
            .headless_mode(headless)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-session-crashed-bubble")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg(format!("--remote-debugging-port={}", config.debug_port))
            .window_size(1280, 800)
            .build()
            .map_err(AutomationError::Browser)
    }

    pub async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                BrowserCommand::AcquirePage { query, reply } => {
                    let result = self.acquire_page(query).await;
                    let _ = reply.send(result);
                }
                BrowserCommand::ObserveUrl { reply } => {
                    let _ = reply.send(self.observe_url().await);
                }
                BrowserCommand::ClosePage { page } => {
                    debug!("closing page");
                    if let Err(e) = page.close().await {
                        warn!("page close failed: {e}");
                    }
                }
                BrowserCommand::Ping { reply } => {
                    let _ = reply.send(self.browser.version().await.is_ok());
                }
                BrowserCommand::Close => {
                    if let Err(e) = self.browser.close().await {
                        warn!("browser close failed: {e}");
                    }
                    if let Some(h) = self.handler.take() {
                        h.abort();
                    }
                    break;
                }
            }
        }
    }

    /// Tab selection policy: prefer an open tab on the target domain, among
    /// those one already on the desired group path; otherwise navigate the
    /// first domain match; otherwise create.
    async fn acquire_page(&self, query: PageQuery) -> Result<AcquiredPage> {
        let mut matches = Vec::new();
        if let Ok(pages) = self.browser.pages().await {
            for p in pages {
                if let Ok(Some(u)) = p.url().await {
                    if u.contains(&self.target_host) {
                        matches.push((p, u));
                    }
                }
            }
        }

        if let Some(path) = query.group_path.as_deref() {
            if let Some((page, url)) = matches.iter().find(|(_, u)| u.contains(path)) {
                debug!(%url, "reusing tab already on target path");
                page.activate().await?;
                return Ok(AcquiredPage {
                    page: page.clone(),
                    url: url.clone(),
                    reused: true,
                });
            }
        }

        if let Some((page, url)) = matches.into_iter().next() {
            page.activate().await?;
            if !query.allow_create {
                // Read-only acquisition: take the tab as it stands.
                debug!(%url, "reusing open tab without navigating");
                return Ok(AcquiredPage {
                    page,
                    url,
                    reused: true,
                });
            }
            debug!(%url, "navigating existing tab");
            page.goto(query.target_url.clone()).await?;
            return Ok(AcquiredPage {
                page,
                url: query.target_url,
                reused: true,
            });
        }

        if !query.allow_create {
            return Err(AutomationError::PageUnavailable(format!(
                "no open tab on {}",
                self.target_host
            )));
        }

        debug!(url = %query.target_url, background = query.background, "opening new page");
        let params = CreateTargetParams::builder()
            .url(query.target_url.clone())
            .background(query.background)
            .build()
            .map_err(AutomationError::Browser)?;
        let page = self
            .browser
            .new_page(params)
            .await
            .map_err(|e| AutomationError::PageUnavailable(e.to_string()))?;
        Ok(AcquiredPage {
            page,
            url: query.target_url,
            reused: false,
        })
    }

    async fn observe_url(&self) -> Option<String> {
        let pages = self.browser.pages().await.ok()?;
        for p in pages {
            if let Ok(Some(u)) = p.url().await {
                if u.contains(&self.target_host) {
                    return Some(u);
                }
            }
        }
        None
    }
}
