use std::time::{Duration, Instant};

use chromiumoxide::{Element, Page};
use tokio::time::sleep;
use tracing::debug;

use crate::error::{AutomationError, Result};

/// Interval for the polling fallback when the in-page observer wait cannot
/// be installed.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A successfully located element together with the candidate that matched,
/// so callers can re-query the same node from injected scripts.
pub struct Located {
    pub element: Element,
    pub selector: String,
}

#[derive(Debug, PartialEq)]
enum LocateOutcome {
    Found(String),
    NotFound,
}

/// Bounded-time search for the first element matching any candidate
/// selector, preferring earlier candidates. The document is probed
/// immediately; when nothing matches, a MutationObserver installed in the
/// page re-checks on every mutation batch until the bound elapses. If the
/// observer cannot be installed the search degrades to bounded polling.
///
/// While waiting, a modal overlay with a dismiss control is clicked once,
/// best-effort. There are no retries beyond the single bounded wait;
/// callers compose calls for fallback tiers.
pub async fn locate(page: &Page, candidates: &[String], timeout: Duration) -> Result<Located> {
    let deadline = Instant::now() + timeout;

    if let Some(found) = probe(page, candidates).await {
        return Ok(found);
    }

    dismiss_overlays(page).await;

    // The probe and overlay pass already consumed part of the bound; the
    // in-page timer gets only what is left.
    let outcome = match observer_wait(page, candidates, remaining(deadline)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            debug!("observer wait unavailable, falling back to polling: {e}");
            poll_until(page, candidates, deadline).await
        }
    };

    match outcome {
        LocateOutcome::Found(selector) => match page.find_element(&selector).await {
            Ok(element) => Ok(Located { element, selector }),
            // Matched during the wait but gone by the time we re-queried.
            Err(_) => Err(timeout_error(candidates, timeout)),
        },
        LocateOutcome::NotFound => Err(timeout_error(candidates, timeout)),
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn timeout_error(candidates: &[String], timeout: Duration) -> AutomationError {
    AutomationError::LocatorTimeout {
        selectors: candidates.to_vec(),
        timeout_ms: timeout.as_millis() as u64,
    }
}

/// One synchronous pass over the current DOM, in candidate order.
async fn probe(page: &Page, candidates: &[String]) -> Option<Located> {
    for selector in candidates {
        if let Ok(element) = page.find_element(selector.as_str()).await {
            return Some(Located {
                element,
                selector: selector.clone(),
            });
        }
    }
    None
}

/// Install a promise in the page that resolves with the first matching
/// candidate, re-checking on every mutation batch, or with null when the
/// remaining bound elapses. The observer disconnects itself in both cases.
async fn observer_wait(
    page: &Page,
    candidates: &[String],
    remaining: Duration,
) -> Result<LocateOutcome> {
    let expr = build_observer_expression(candidates, remaining)?;
    let result = page.evaluate(expr).await?;
    match result.value().and_then(|v| v.as_str()) {
        Some(selector) => Ok(LocateOutcome::Found(selector.to_string())),
        None => Ok(LocateOutcome::NotFound),
    }
}

fn build_observer_expression(candidates: &[String], timeout: Duration) -> Result<String> {
    let selectors_json = serde_json::to_string(candidates)?;
    let timeout_ms = timeout.as_millis() as u64;
    Ok(format!(
        r#"((selectors, timeoutMs) => new Promise(resolve => {{
            const find = () => {{
                for (const sel of selectors) {{
                    try {{
                        if (document.querySelector(sel)) return sel;
                    }} catch (e) {{}}
                }}
                return null;
            }};
            const first = find();
            if (first) {{ resolve(first); return; }}
            const obs = new MutationObserver(() => {{
                const hit = find();
                if (hit) {{
                    obs.disconnect();
                    clearTimeout(timer);
                    resolve(hit);
                }}
            }});
            obs.observe(document.body, {{ childList: true, subtree: true, attributes: true }});
            const timer = setTimeout(() => {{
                obs.disconnect();
                resolve(null);
            }}, timeoutMs);
        }}))({selectors_json}, {timeout_ms})"#
    ))
}

async fn poll_until(page: &Page, candidates: &[String], deadline: Instant) -> LocateOutcome {
    while Instant::now() < deadline {
        for selector in candidates {
            if page.find_element(selector.as_str()).await.is_ok() {
                return LocateOutcome::Found(selector.clone());
            }
        }
        sleep(POLL_INTERVAL).await;
    }
    LocateOutcome::NotFound
}

/// Click a dismiss/continue control on a blocking overlay, once. Permission
/// prompts and cookie banners otherwise swallow the first interaction.
/// Best-effort: failure is ignored.
pub async fn dismiss_overlays(page: &Page) {
    let js = r#"(() => {
        const byLabel = document.querySelector(
            '[role="dialog"] [aria-label="Close"], [role="dialog"] [aria-label="Dismiss"]');
        if (byLabel) { byLabel.click(); return 'closed dialog'; }
        const buttons = [...document.querySelectorAll('div[role="button"], button')];
        const hit = buttons.find(b => {
            const t = (b.textContent || '').trim();
            return t === 'Continue' || t === 'Allow' || t === 'OK' || t === 'Accept all';
        });
        if (hit) { hit.click(); return 'clicked prompt'; }
        return null;
    })()"#;

    if let Ok(result) = page.evaluate(js).await {
        if let Some(action) = result.value().and_then(|v| v.as_str()) {
            debug!("overlay dismissed: {action}");
        }
    }
}
