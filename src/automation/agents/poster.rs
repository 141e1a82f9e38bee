use std::fmt;
use std::time::Duration;

use chromiumoxide::Page;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::automation::agents::locator;
use crate::automation::core::{await_reply, BrowserCommand, PageQuery};
use crate::config::AppConfig;
use crate::error::{AutomationError, Result};
use crate::logbook::Logbook;
use crate::models::{LogStatus, PageStatus, PostMode, PostRequest};

/// Stages of one automation run. Strictly sequential within a run; an error
/// is reachable from any non-terminal stage and is never retried here —
/// retrying means re-invoking the whole sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStage {
    AcquiringPage,
    WaitingForLoad,
    LocatingComposer,
    FillingContent,
    Submitting,
    ClosingPage,
    Done,
}

impl fmt::Display for PostStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PostStage::AcquiringPage => "acquiring page",
            PostStage::WaitingForLoad => "waiting for load",
            PostStage::LocatingComposer => "locating composer",
            PostStage::FillingContent => "filling content",
            PostStage::Submitting => "submitting",
            PostStage::ClosingPage => "closing page",
            PostStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Per-post state machine. Holds no page lifecycle authority of its own:
/// pages are acquired and closed through the browser actor.
pub struct Sequencer<'a> {
    config: &'a AppConfig,
    browser: mpsc::Sender<BrowserCommand>,
    logbook: &'a Logbook,
    on_status: Box<dyn Fn(PageStatus) + Send + Sync + 'a>,
}

impl<'a> Sequencer<'a> {
    pub fn new(
        config: &'a AppConfig,
        browser: mpsc::Sender<BrowserCommand>,
        logbook: &'a Logbook,
        on_status: impl Fn(PageStatus) + Send + Sync + 'a,
    ) -> Self {
        Self {
            config,
            browser,
            logbook,
            on_status: Box::new(on_status),
        }
    }

    /// Run the full sequence for one request. The page is closed after the
    /// run when the request asks for it, regardless of outcome.
    pub async fn run(&self, request: &PostRequest) -> Result<String> {
        self.stage(PostStage::AcquiringPage, LogStatus::Info, "");
        let acquired = self.acquire_page(request).await.inspect_err(|e| {
            self.stage(PostStage::AcquiringPage, LogStatus::Error, &e.to_string());
        })?;

        (self.on_status)(PageStatus {
            in_target_group: acquired.url.contains("/groups/"),
            url: acquired.url.clone(),
        });

        let page = acquired.page.clone();
        let result = self.drive(&page, request).await;

        let outcome = conclude(&result, request.close_tab_after_post);
        if outcome.close_page {
            self.stage(PostStage::ClosingPage, LogStatus::Info, "");
            let _ = self.browser.send(BrowserCommand::ClosePage { page }).await;
        }
        self.stage(PostStage::Done, outcome.status, &outcome.message);
        result
    }

    async fn acquire_page(
        &self,
        request: &PostRequest,
    ) -> Result<crate::automation::core::AcquiredPage> {
        let (target_url, group_path) = match request.target_group_id.as_deref() {
            Some(id) => (self.config.group_url(id), format!("/groups/{id}")),
            None => (self.config.groups_page_url(), "/groups/".to_string()),
        };

        let (tx, rx) = oneshot::channel();
        self.browser
            .send(BrowserCommand::AcquirePage {
                query: PageQuery {
                    target_url,
                    group_path: Some(group_path),
                    allow_create: true,
                    background: true,
                },
                reply: tx,
            })
            .await
            .map_err(|_| AutomationError::Routing("browser actor gone".into()))?;
        await_reply(rx, "acquire page").await?
    }

    async fn drive(&self, page: &Page, request: &PostRequest) -> Result<String> {
        self.settle(page).await;

        let locator_timeout = Duration::from_millis(self.config.locator_timeout_ms);

        // Composer trigger is optional: on some layouts the text field is
        // already visible and there is nothing to click first.
        self.stage(PostStage::LocatingComposer, LogStatus::Info, "");
        match locator::locate(page, &self.config.composer_selectors, locator_timeout).await {
            Ok(found) => {
                debug!(selector = %found.selector, "composer trigger found");
                found.element.click().await?;
                sleep(Duration::from_millis(800)).await;
            }
            Err(AutomationError::LocatorTimeout { .. }) => {
                self.stage(
                    PostStage::LocatingComposer,
                    LogStatus::Warning,
                    "no composer trigger, assuming text field is visible",
                );
            }
            Err(e) => return Err(e),
        }

        self.stage(PostStage::FillingContent, LogStatus::Info, "");
        let field =
            locator::locate(page, &self.config.textbox_selectors, locator_timeout).await?;
        self.fill(page, &field, &request.content).await?;

        if request.mode == PostMode::Post {
            self.stage(PostStage::Submitting, LogStatus::Info, "");
            let submit =
                locator::locate(page, &self.config.submit_selectors, locator_timeout).await?;
            submit.element.scroll_into_view().await?;
            submit.element.click().await?;
            // Optimistic: the control was activated; the target site gives
            // no reliable confirmation signal.
            return Ok("post submitted".to_string());
        }

        Ok("post composer filled".to_string())
    }

    /// Fixed settle delay with a little jitter before the first interaction.
    /// The target renders client-side; this is a bound, not a readiness
    /// signal.
    async fn settle(&self, page: &Page) {
        self.stage(PostStage::WaitingForLoad, LogStatus::Info, "");
        let jitter = if self.config.settle_jitter_ms > 0 {
            rand::random_range(0..self.config.settle_jitter_ms)
        } else {
            0
        };
        sleep(Duration::from_millis(self.config.settle_delay_ms + jitter)).await;
        locator::dismiss_overlays(page).await;
    }

    /// Insert the content as plain text. `execCommand('insertText')` goes
    /// through the editor's own input pipeline, which direct innerText
    /// assignment bypasses; the input/change events wake the framework's
    /// listeners.
    async fn fill(&self, page: &Page, field: &locator::Located, content: &str) -> Result<()> {
        field.element.focus().await?;

        let selector_json = serde_json::to_string(&field.selector)?;
        let content_json = serde_json::to_string(content)?;
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({selector_json});
                if (!el) return false;
                el.focus();
                document.execCommand('insertText', false, {content_json});
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#
        );

        let filled = page
            .evaluate(js)
            .await?
            .value()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !filled {
            warn!(selector = %field.selector, "text field vanished before fill");
            return Err(AutomationError::LocatorTimeout {
                selectors: vec![field.selector.clone()],
                timeout_ms: self.config.locator_timeout_ms,
            });
        }
        Ok(())
    }

    fn stage(&self, stage: PostStage, status: LogStatus, details: &str) {
        self.logbook
            .append(&format!("post: {stage}"), status, details);
    }
}

/// Terminal bookkeeping for one run. The close decision depends only on the
/// request, never on how the run ended.
struct RunOutcome {
    close_page: bool,
    status: LogStatus,
    message: String,
}

fn conclude(result: &Result<String>, close_requested: bool) -> RunOutcome {
    let (status, message) = match result {
        Ok(message) => (LogStatus::Success, message.clone()),
        Err(e) => (LogStatus::Error, e.to_string()),
    };
    RunOutcome {
        close_page: close_requested,
        status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_are_human_readable() {
        assert_eq!(PostStage::AcquiringPage.to_string(), "acquiring page");
        assert_eq!(PostStage::Submitting.to_string(), "submitting");
    }

    #[test]
    fn fill_failure_still_closes_the_page_when_requested() {
        let failed: Result<String> = Err(AutomationError::LocatorTimeout {
            selectors: vec!["[role=\"textbox\"]".into()],
            timeout_ms: 10_000,
        });
        let outcome = conclude(&failed, true);
        assert!(outcome.close_page);
        assert_eq!(outcome.status, LogStatus::Error);
        assert!(outcome.message.contains("[role=\"textbox\"]"));
    }

    #[test]
    fn close_follows_the_request_not_the_outcome() {
        let ok: Result<String> = Ok("post composer filled".into());
        let failed: Result<String> = Err(AutomationError::Validation("x".into()));

        assert!(conclude(&ok, true).close_page);
        assert!(!conclude(&ok, false).close_page);
        assert!(!conclude(&failed, false).close_page);
        assert_eq!(conclude(&ok, true).status, LogStatus::Success);
    }
}
