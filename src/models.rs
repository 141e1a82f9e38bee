use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A validated group membership record. Identity is the normalized URL;
/// two records in a cache never share one.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    pub url: String,
    pub status: GroupStatus,
    pub last_checked: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Active,
    Inactive,
}

/// An unvalidated group entry as produced by the extractor. Becomes a
/// `GroupRecord` only through a cache merge.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupCandidate {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostMode {
    /// Fill the composer but do not submit.
    Fill,
    /// Fill and activate the submit control.
    Post,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PostRequest {
    pub content: String,
    pub mode: PostMode,
    #[serde(default)]
    pub target_group_id: Option<String>,
    #[serde(default)]
    pub close_tab_after_post: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageStatus {
    pub in_target_group: bool,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Warning,
    Error,
    Info,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub status: LogStatus,
    pub details: String,
}

/// The persisted unit for the group cache. Invalidated wholesale on expiry.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CacheEnvelope {
    pub groups: Vec<GroupRecord>,
    pub timestamp: DateTime<Utc>,
}

impl CacheEnvelope {
    pub fn new(groups: Vec<GroupRecord>, timestamp: DateTime<Utc>) -> Self {
        Self { groups, timestamp }
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.timestamp > ttl
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GroupsResponse {
    pub success: bool,
    pub groups: Vec<GroupRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub success: bool,
    pub message: String,
}

/// Client-reported log entry; the logbook assigns id and timestamp.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LogRequest {
    pub action: String,
    pub status: LogStatus,
    pub details: String,
}
