use std::collections::HashSet;

use chromiumoxide::Page;
use serde::Deserialize;

use crate::error::Result;
use crate::groups::normalize_group_url;
use crate::models::GroupCandidate;

/// Anchor data harvested from the page in one pass. The ancestor search for
/// a nearby heading is bounded to three levels.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawAnchor {
    pub href: String,
    pub label: String,
    pub heading: String,
    pub text: String,
}

const HARVEST_JS: &str = r#"(() => {
    const out = [];
    for (const a of document.querySelectorAll('a[href*="/groups/"]')) {
        let heading = '';
        let node = a;
        for (let depth = 0; depth < 3 && node.parentElement; depth++) {
            node = node.parentElement;
            const h = node.querySelector('h1, h2, h3, h4, strong, [role="heading"]');
            if (h && h.textContent.trim()) { heading = h.textContent.trim(); break; }
        }
        out.push({
            href: a.getAttribute('href') || '',
            label: a.getAttribute('aria-label') || '',
            heading,
            text: (a.textContent || '').trim(),
        });
    }
    return out;
})()"#;

/// Single synchronous pass over the current DOM state. Pure apart from the
/// read; safe to call repeatedly while the page keeps rendering.
pub async fn extract(
    page: &Page,
    target_host: &str,
    canonical_origin: &str,
) -> Result<Vec<GroupCandidate>> {
    let raw: Vec<RawAnchor> = page
        .evaluate(HARVEST_JS)
        .await?
        .into_value()
        .unwrap_or_default();
    Ok(refine(&raw, target_host, canonical_origin))
}

/// Turn harvested anchors into normalized candidates: filter to the group
/// URL shape, derive a name through the priority chain (accessible label →
/// nearby heading → anchor text → generated fallback), canonicalize the
/// URL, and de-duplicate first-occurrence-wins.
pub fn refine(
    raw: &[RawAnchor],
    target_host: &str,
    canonical_origin: &str,
) -> Vec<GroupCandidate> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();

    for anchor in raw {
        let Some(normalized) = normalize_group_url(&anchor.href, target_host, canonical_origin)
        else {
            continue;
        };
        if !seen.insert(normalized.url.clone()) {
            continue;
        }

        let name = [&anchor.label, &anchor.heading, &anchor.text]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Group {}", normalized.id));

        candidates.push(GroupCandidate {
            id: normalized.id,
            name,
            url: normalized.url,
        });
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "facebook.com";
    const ORIGIN: &str = "https://www.facebook.com";

    fn anchor(href: &str, text: &str) -> RawAnchor {
        RawAnchor {
            href: href.to_string(),
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn duplicate_urls_collapse_first_name_wins() {
        let raw = vec![
            anchor("/groups/123abc/", "Foo"),
            anchor("https://x.facebook.com/groups/123abc?ref=1", "Foo Dup"),
        ];
        let candidates = refine(&raw, HOST, ORIGIN);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Foo");
        assert_eq!(candidates[0].url, "https://www.facebook.com/groups/123abc");
    }

    #[test]
    fn name_priority_chain() {
        let labeled = RawAnchor {
            href: "/groups/a1".into(),
            label: "Gardeners of Haifa".into(),
            heading: "Wrong".into(),
            text: "Also wrong".into(),
        };
        let headed = RawAnchor {
            href: "/groups/b2".into(),
            heading: "Bakers United".into(),
            text: "ignored".into(),
            ..Default::default()
        };
        let texted = anchor("/groups/c3", "Plain Text Crew");
        let bare = anchor("/groups/d4", "");

        let candidates = refine(&[labeled, headed, texted, bare], HOST, ORIGIN);
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Gardeners of Haifa",
                "Bakers United",
                "Plain Text Crew",
                "Group d4"
            ]
        );
    }

    #[test]
    fn non_group_anchors_are_dropped() {
        let raw = vec![
            anchor("/groups/feed/", "Feed"),
            anchor("/groups/discover/", "Discover"),
            anchor("/groups/123/members/", "Members"),
            anchor("/watch", "Watch"),
            anchor("/groups/real1", "Real"),
        ];
        let candidates = refine(&raw, HOST, ORIGIN);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "real1");
    }

    #[test]
    fn whitespace_names_fall_through_the_chain() {
        let raw = vec![RawAnchor {
            href: "/groups/e5".into(),
            label: "   ".into(),
            heading: "\n\t".into(),
            text: "Actual Name".into(),
        }];
        let candidates = refine(&raw, HOST, ORIGIN);
        assert_eq!(candidates[0].name, "Actual Name");
    }

    #[test]
    fn refine_is_stable_across_repeat_passes() {
        let raw = vec![anchor("/groups/a1", "One"), anchor("/groups/b2", "Two")];
        assert_eq!(refine(&raw, HOST, ORIGIN), refine(&raw, HOST, ORIGIN));
    }
}
