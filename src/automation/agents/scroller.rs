use std::time::Duration;

use chromiumoxide::Page;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::debug;

use crate::automation::agents::extractor;
use crate::error::Result;
use crate::models::GroupCandidate;

#[derive(Debug, Clone, Copy)]
pub struct ScrollPlan {
    pub iterations: u32,
    pub pause: Duration,
}

const INSTALL_OBSERVER_JS: &str = r#"(() => {
    if (window.__gfScan) { window.__gfScan.obs.disconnect(); }
    const state = { count: 0 };
    const obs = new MutationObserver(() => { state.count++; });
    obs.observe(document.body, { childList: true, subtree: true });
    window.__gfScan = { obs, state };
    return true;
})()"#;

const READ_MUTATIONS_JS: &str = "window.__gfScan ? window.__gfScan.state.count : 0";

const CLEANUP_OBSERVER_JS: &str = r#"(() => {
    if (window.__gfScan) {
        window.__gfScan.obs.disconnect();
        delete window.__gfScan;
    }
    return true;
})()"#;

const SCROLL_JS: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// Drive the page through a bounded number of scroll-and-wait iterations,
/// emitting an extraction batch after each. A mutation counter installed in
/// the page triggers an extra mid-pause extraction when lazily-rendered
/// content arrived between scrolls. The loop stops early when the receiver
/// disconnects, and always tears down its in-page observer.
///
/// Batches are incremental and may overlap; the consumer merges.
pub async fn run(
    page: &Page,
    plan: ScrollPlan,
    target_host: &str,
    canonical_origin: &str,
    batch_tx: mpsc::Sender<Vec<GroupCandidate>>,
) -> Result<()> {
    page.evaluate(INSTALL_OBSERVER_JS).await?;

    let result = drive(page, plan, target_host, canonical_origin, &batch_tx).await;

    // Leaving a live observer on someone else's page leaks callbacks.
    let _ = page.evaluate(CLEANUP_OBSERVER_JS).await;
    result
}

async fn drive(
    page: &Page,
    plan: ScrollPlan,
    target_host: &str,
    canonical_origin: &str,
    batch_tx: &mpsc::Sender<Vec<GroupCandidate>>,
) -> Result<()> {
    // Immediate pass before any scrolling.
    if !emit(page, target_host, canonical_origin, batch_tx).await? {
        return Ok(());
    }
    let mut last_mutations = read_mutations(page).await;

    for iteration in 0..plan.iterations {
        page.evaluate(SCROLL_JS).await?;

        let half = plan.pause / 2;
        sleep(half).await;

        // Reactive pass: only worth re-extracting when the DOM moved.
        let mutations = read_mutations(page).await;
        if mutations != last_mutations {
            last_mutations = mutations;
            if !emit(page, target_host, canonical_origin, batch_tx).await? {
                return Ok(());
            }
        }

        sleep(plan.pause - half).await;

        debug!(iteration, "scroll pass complete");
        if !emit(page, target_host, canonical_origin, batch_tx).await? {
            return Ok(());
        }
    }

    Ok(())
}

/// Extract and send one batch. Returns false when the consumer is gone.
async fn emit(
    page: &Page,
    target_host: &str,
    canonical_origin: &str,
    batch_tx: &mpsc::Sender<Vec<GroupCandidate>>,
) -> Result<bool> {
    let batch = extractor::extract(page, target_host, canonical_origin).await?;
    if batch.is_empty() {
        return Ok(true);
    }
    Ok(batch_tx.send(batch).await.is_ok())
}

async fn read_mutations(page: &Page) -> u64 {
    match page.evaluate(READ_MUTATIONS_JS).await {
        Ok(result) => result.value().and_then(|v| v.as_u64()).unwrap_or(0),
        Err(_) => 0,
    }
}
