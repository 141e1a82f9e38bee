use thiserror::Error;

/// Failures the automation core can surface. Every variant is recovered at
/// the boundary where it occurs and reported as `{ success: false, message }`
/// plus one activity-log entry; none are fatal to the host process.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("no element matched any of [{}] within {timeout_ms}ms", selectors.join(", "))]
    LocatorTimeout {
        selectors: Vec<String>,
        timeout_ms: u64,
    },

    #[error("no page could be found or created: {0}")]
    PageUnavailable(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("no response from page agent: {0}")]
    Routing(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<chromiumoxide::error::CdpError> for AutomationError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        AutomationError::Browser(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AutomationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_timeout_carries_selector_list() {
        let err = AutomationError::LocatorTimeout {
            selectors: vec!["[role=\"textbox\"]".into(), ".composer".into()],
            timeout_ms: 10_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("[role=\"textbox\"]"));
        assert!(msg.contains(".composer"));
        assert!(msg.contains("10000ms"));
    }
}
