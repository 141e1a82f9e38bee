use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Runtime configuration. Every field has a workable default so the server
/// can boot without a config file; a JSON file overrides per-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// HTTP port for the command surface.
    pub port: u16,
    /// Directory for the cache envelope, the activity log and the browser profile.
    pub data_dir: PathBuf,
    /// Host the automation is allowed to touch. Group URLs are validated
    /// against this.
    pub target_host: String,
    /// Canonical origin used when normalizing group URLs.
    pub canonical_origin: String,
    /// Path of the page listing the user's groups.
    pub groups_page_path: String,
    /// Chrome remote debugging port; an already-running instance on this
    /// port is reconnected instead of launching a new one.
    pub debug_port: u16,
    pub headless: bool,
    /// Settle delay after acquiring a page, before any interaction. The
    /// target renders client-side; this is a pragmatic bound, not a
    /// load-complete signal.
    pub settle_delay_ms: u64,
    /// Random jitter added on top of the settle delay.
    pub settle_jitter_ms: u64,
    /// Bound for a single element-location attempt.
    pub locator_timeout_ms: u64,
    /// Scroll-and-wait iterations for group discovery.
    pub scroll_iterations: u32,
    /// Pause between scroll iterations.
    pub scroll_pause_ms: u64,
    pub cache_ttl_hours: i64,
    pub log_cap: usize,
    /// Browser session recycling limits.
    pub session_max_tasks: usize,
    pub session_max_age_secs: u64,
    /// Selector fallback chains, most specific first.
    pub composer_selectors: Vec<String>,
    pub textbox_selectors: Vec<String>,
    pub submit_selectors: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            data_dir: PathBuf::from("./groupsflow_data"),
            target_host: "facebook.com".to_string(),
            canonical_origin: "https://www.facebook.com".to_string(),
            groups_page_path: "/groups/".to_string(),
            debug_port: 9222,
            headless: false,
            settle_delay_ms: 3000,
            settle_jitter_ms: 500,
            locator_timeout_ms: 10_000,
            scroll_iterations: 8,
            scroll_pause_ms: 1500,
            cache_ttl_hours: 24,
            log_cap: 100,
            session_max_tasks: 50,
            session_max_age_secs: 3600,
            composer_selectors: vec![
                "[role=\"button\"][aria-label*=\"Create a post\"]".to_string(),
                // The target site localizes aria-labels; Hebrew is a primary
                // locale for this deployment.
                "[role=\"button\"][aria-label*=\"צור פוסט\"]".to_string(),
                "[role=\"button\"][aria-label*=\"post\"]".to_string(),
                "[aria-label=\"Create Post\"]".to_string(),
                "[role=\"main\"] [role=\"button\"][tabindex=\"0\"]".to_string(),
            ],
            textbox_selectors: vec![
                "[contenteditable=\"true\"][role=\"textbox\"]".to_string(),
                "[contenteditable=\"true\"][aria-label*=\"post\"]".to_string(),
                "div[contenteditable=\"true\"]".to_string(),
            ],
            submit_selectors: vec![
                "div[aria-label=\"Post\"][role=\"button\"]".to_string(),
                "div[aria-label=\"פרסם\"][role=\"button\"]".to_string(),
                "[aria-label=\"Post\"]".to_string(),
                "[aria-label=\"פרסם\"]".to_string(),
                "div[role=\"button\"][aria-label*=\"Publish\"]".to_string(),
            ],
        }
    }
}

impl AppConfig {
    /// Load from a JSON file, falling back to defaults when the file is
    /// missing. A present-but-malformed file is an error.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours)
    }

    /// URL of a specific group on the target site.
    pub fn group_url(&self, group_id: &str) -> String {
        format!("{}/groups/{}", self.canonical_origin, group_id)
    }

    /// URL of the group-listing page.
    pub fn groups_page_url(&self) -> String {
        format!(
            "{}{}",
            self.canonical_origin.trim_end_matches('/'),
            self.groups_page_path
        )
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.data_dir.join("browser-profile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.log_cap, 100);
        assert_eq!(cfg.cache_ttl_hours, 24);
        assert!(!cfg.composer_selectors.is_empty());
        // Both locales of the target UI are covered out of the box.
        assert!(cfg.composer_selectors.iter().any(|s| s.contains("צור פוסט")));
        assert!(cfg.submit_selectors.iter().any(|s| s.contains("פרסם")));
        assert_eq!(cfg.groups_page_url(), "https://www.facebook.com/groups/");
        assert_eq!(
            cfg.group_url("123abc"),
            "https://www.facebook.com/groups/123abc"
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = AppConfig::load(Path::new("/nonexistent/groupsflow.json")).unwrap();
        assert_eq!(cfg.port, 8000);
    }

    #[test]
    fn partial_file_overrides_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"port": 9000, "scrollIterations": 3}"#).unwrap();
        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.scroll_iterations, 3);
        assert_eq!(cfg.log_cap, 100);
    }
}
