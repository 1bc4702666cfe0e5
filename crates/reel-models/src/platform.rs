//! Social platforms and per-platform posting state.
//!
//! Each video keeps at most one [`PlatformEntry`] per platform. Entries are
//! persisted in a compact wire shape:
//!
//! ```json
//! {"platform": "youtube", "success": true, "postId": "abc", "url": "..."}
//! {"platform": "tiktok", "success": false, "error": "..."}
//! {"platform": "tiktok", "success": false, "error": "...", "retryAfter": "..."}
//! {"platform": "instagram", "success": "uploading", "startedAt": "..."}
//! ```
//!
//! Older records stored a bare platform name (`"youtube"`) once a post
//! succeeded. Those are read back as a [`PostOutcome::Posted`] entry without
//! a post id.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Supported publishing targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Youtube,
    Tiktok,
    Instagram,
    Facebook,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Youtube,
        Platform::Tiktok,
        Platform::Instagram,
        Platform::Facebook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" | "youtube_shorts" => Ok(Platform::Youtube),
            "tiktok" => Ok(Platform::Tiktok),
            "instagram" | "instagram_reels" => Ok(Platform::Instagram),
            "facebook" => Ok(Platform::Facebook),
            other => Err(ModelError::UnknownPlatform(other.to_string())),
        }
    }
}

/// Result of the latest posting attempt for one platform.
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    /// Published. Never overwritten once written.
    Posted {
        post_id: Option<String>,
        url: Option<String>,
        posted_at: Option<DateTime<Utc>>,
    },
    /// Last attempt failed; the platform may be claimed again.
    Failed {
        error: String,
        failed_at: Option<DateTime<Utc>>,
        /// Set when the failure was a wait (cooldown) rather than an error;
        /// the sweep picks the platform up again once this has passed.
        retry_after: Option<DateTime<Utc>>,
    },
    /// A poster claimed the platform and is uploading.
    Uploading { started_at: DateTime<Utc> },
}

/// Posting state of one platform for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireSlot", into = "WireEntry")]
pub struct PlatformEntry {
    pub platform: Platform,
    pub outcome: PostOutcome,
}

impl PlatformEntry {
    pub fn posted(platform: Platform, post_id: Option<String>, url: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            platform,
            outcome: PostOutcome::Posted {
                post_id,
                url,
                posted_at: Some(at),
            },
        }
    }

    pub fn failed(platform: Platform, error: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            platform,
            outcome: PostOutcome::Failed {
                error: error.into(),
                failed_at: Some(at),
                retry_after: None,
            },
        }
    }

    /// A failure that clears by itself at `retry_after`.
    pub fn deferred(
        platform: Platform,
        error: impl Into<String>,
        at: DateTime<Utc>,
        retry_after: DateTime<Utc>,
    ) -> Self {
        Self {
            platform,
            outcome: PostOutcome::Failed {
                error: error.into(),
                failed_at: Some(at),
                retry_after: Some(retry_after),
            },
        }
    }

    pub fn uploading(platform: Platform, started_at: DateTime<Utc>) -> Self {
        Self {
            platform,
            outcome: PostOutcome::Uploading { started_at },
        }
    }

    pub fn is_posted(&self) -> bool {
        matches!(self.outcome, PostOutcome::Posted { .. })
    }

    /// An upload claim older than `stale_after` belongs to a poster that died.
    pub fn is_stale_upload(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        match self.outcome {
            PostOutcome::Uploading { started_at } => now - started_at >= stale_after,
            _ => false,
        }
    }

    /// A deferred failure whose wait is over.
    pub fn is_retry_due(&self, now: DateTime<Utc>) -> bool {
        match self.outcome {
            PostOutcome::Failed {
                retry_after: Some(at), ..
            } => at <= now,
            _ => false,
        }
    }

    /// Timestamp of a successful post, if known.
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        match self.outcome {
            PostOutcome::Posted { posted_at, .. } => posted_at,
            _ => None,
        }
    }

    /// Normalize a raw stored list into one entry per platform.
    ///
    /// Slots for unsupported platforms are skipped (see
    /// [`PlatformEntry::recognizes`]). When a platform appears more than once
    /// (legacy append-style writes) a posted entry wins, otherwise the last
    /// one does.
    pub fn normalize(raw: Vec<serde_json::Value>) -> Vec<PlatformEntry> {
        let mut entries: Vec<PlatformEntry> = Vec::new();
        for value in raw {
            let Ok(entry) = serde_json::from_value::<PlatformEntry>(value) else {
                continue;
            };
            match entries.iter_mut().find(|e| e.platform == entry.platform) {
                Some(existing) if existing.is_posted() => {}
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
        }
        entries
    }

    /// Whether a raw stored slot reads as an entry for a supported platform.
    ///
    /// Writers must carry the other slots through unchanged; they may belong
    /// to platforms a newer build knows about.
    pub fn recognizes(raw: &serde_json::Value) -> bool {
        PlatformEntry::deserialize(raw).is_ok()
    }

    /// Replace the entry for `entry.platform`, or append it.
    pub fn upsert(entries: &mut Vec<PlatformEntry>, entry: PlatformEntry) {
        match entries.iter_mut().find(|e| e.platform == entry.platform) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }
}

/// What a poster may do with a platform right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    /// Free to claim: no entry, a failed entry, or an abandoned upload.
    Claim,
    /// Already published; nothing to do.
    AlreadyPosted,
    /// Another poster holds a fresh claim.
    InProgress,
}

/// Decide whether `platform` can be claimed given the current entries.
pub fn claim_decision(
    entries: &[PlatformEntry],
    platform: Platform,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> ClaimDecision {
    let Some(entry) = entries.iter().find(|e| e.platform == platform) else {
        return ClaimDecision::Claim;
    };

    match entry.outcome {
        PostOutcome::Posted { .. } => ClaimDecision::AlreadyPosted,
        PostOutcome::Failed { .. } => ClaimDecision::Claim,
        PostOutcome::Uploading { .. } if entry.is_stale_upload(now, stale_after) => ClaimDecision::Claim,
        PostOutcome::Uploading { .. } => ClaimDecision::InProgress,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry {
    platform: String,
    success: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    posted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_after: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireSlot {
    Legacy(String),
    Entry(WireEntry),
}

impl TryFrom<WireSlot> for PlatformEntry {
    type Error = ModelError;

    fn try_from(slot: WireSlot) -> Result<Self, Self::Error> {
        let wire = match slot {
            WireSlot::Legacy(name) => {
                return Ok(PlatformEntry {
                    platform: name.parse()?,
                    outcome: PostOutcome::Posted {
                        post_id: None,
                        url: None,
                        posted_at: None,
                    },
                });
            }
            WireSlot::Entry(wire) => wire,
        };

        let platform: Platform = wire.platform.parse()?;
        let outcome = match &wire.success {
            serde_json::Value::Bool(true) => PostOutcome::Posted {
                post_id: wire.post_id,
                url: wire.url,
                posted_at: wire.posted_at,
            },
            serde_json::Value::String(s) if s == "uploading" => PostOutcome::Uploading {
                // A claim without a start time cannot be aged; treat it as abandoned.
                started_at: wire.started_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            },
            _ => PostOutcome::Failed {
                error: wire.error.unwrap_or_else(|| "Unknown error".to_string()),
                failed_at: wire.failed_at,
                retry_after: wire.retry_after,
            },
        };

        Ok(PlatformEntry { platform, outcome })
    }
}

impl From<PlatformEntry> for WireEntry {
    fn from(entry: PlatformEntry) -> Self {
        let mut wire = WireEntry {
            platform: entry.platform.as_str().to_string(),
            success: serde_json::Value::Bool(false),
            post_id: None,
            url: None,
            error: None,
            started_at: None,
            posted_at: None,
            failed_at: None,
            retry_after: None,
        };
        match entry.outcome {
            PostOutcome::Posted { post_id, url, posted_at } => {
                wire.success = serde_json::Value::Bool(true);
                wire.post_id = post_id;
                wire.url = url;
                wire.posted_at = posted_at;
            }
            PostOutcome::Failed {
                error,
                failed_at,
                retry_after,
            } => {
                wire.error = Some(error);
                wire.failed_at = failed_at;
                wire.retry_after = retry_after;
            }
            PostOutcome::Uploading { started_at } => {
                wire.success = serde_json::Value::String("uploading".to_string());
                wire.started_at = Some(started_at);
            }
        }
        wire
    }
}

/// OAuth material for one connected social account.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlatformCredentials {
    pub platform: Platform,

    /// Account id on the platform (channel, page, business account)
    #[serde(default)]
    pub account_id: String,

    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl PlatformCredentials {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now) && self.refresh_token.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(minutes_ago: i64) -> DateTime<Utc> {
        Utc::now() - Duration::minutes(minutes_ago)
    }

    #[test]
    fn test_legacy_bare_name_reads_as_posted() {
        let entries = PlatformEntry::normalize(vec![json!("youtube")]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].platform, Platform::Youtube);
        assert!(entries[0].is_posted());
    }

    #[test]
    fn test_wire_shapes() {
        let raw = vec![
            json!({"platform": "tiktok", "success": false, "error": "Token expired"}),
            json!({"platform": "instagram", "success": "uploading", "startedAt": "2025-01-01T10:00:00Z"}),
            json!({"platform": "facebook", "success": true, "postId": "fb-1"}),
            json!({"platform": "myspace", "success": true}),
        ];
        let entries = PlatformEntry::normalize(raw);
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[0].outcome, PostOutcome::Failed { ref error, .. } if error == "Token expired"));
        assert!(matches!(entries[1].outcome, PostOutcome::Uploading { .. }));
        assert!(matches!(entries[2].outcome, PostOutcome::Posted { ref post_id, .. } if post_id.as_deref() == Some("fb-1")));
    }

    #[test]
    fn test_serialize_uploading() {
        let started = "2025-01-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let value = serde_json::to_value(PlatformEntry::uploading(Platform::Tiktok, started)).unwrap();
        assert_eq!(value["platform"], "tiktok");
        assert_eq!(value["success"], "uploading");
        assert_eq!(value["startedAt"], "2025-01-01T10:00:00Z");
    }

    #[test]
    fn test_normalize_keeps_posted_over_later_failure() {
        let raw = vec![
            json!("youtube"),
            json!({"platform": "youtube", "success": false, "error": "dup"}),
        ];
        let entries = PlatformEntry::normalize(raw);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_posted());
    }

    #[test]
    fn test_claim_decisions() {
        let stale = Duration::minutes(10);
        let now = Utc::now();

        assert_eq!(claim_decision(&[], Platform::Youtube, now, stale), ClaimDecision::Claim);

        let posted = vec![PlatformEntry::posted(Platform::Youtube, None, None, at(60))];
        assert_eq!(
            claim_decision(&posted, Platform::Youtube, now, stale),
            ClaimDecision::AlreadyPosted
        );

        let failed = vec![PlatformEntry::failed(Platform::Youtube, "boom", at(5))];
        assert_eq!(claim_decision(&failed, Platform::Youtube, now, stale), ClaimDecision::Claim);

        let fresh = vec![PlatformEntry::uploading(Platform::Youtube, at(2))];
        assert_eq!(
            claim_decision(&fresh, Platform::Youtube, now, stale),
            ClaimDecision::InProgress
        );
    }

    #[test]
    fn test_stale_upload_is_reclaimable() {
        let now = Utc::now();
        let entries = vec![PlatformEntry::uploading(Platform::Instagram, now - Duration::minutes(15))];
        assert_eq!(
            claim_decision(&entries, Platform::Instagram, now, Duration::minutes(10)),
            ClaimDecision::Claim
        );
    }

    #[test]
    fn test_deferred_failure_comes_due() {
        let now = Utc::now();
        let cooling = PlatformEntry::deferred(
            Platform::Tiktok,
            "Cooldown active: wait 40 minutes",
            now,
            now + Duration::minutes(40),
        );
        assert!(!cooling.is_retry_due(now));
        assert!(cooling.is_retry_due(now + Duration::minutes(40)));
        assert!(!PlatformEntry::failed(Platform::Tiktok, "boom", at(90)).is_retry_due(now));

        let value = serde_json::to_value(&cooling).unwrap();
        assert_eq!(value["success"], false);
        assert!(value["retryAfter"].is_string());
        let back: PlatformEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, cooling);
    }

    #[test]
    fn test_recognizes_only_supported_platforms() {
        assert!(PlatformEntry::recognizes(&json!("youtube")));
        assert!(PlatformEntry::recognizes(&json!({"platform": "tiktok", "success": false})));
        assert!(!PlatformEntry::recognizes(&json!({"platform": "threads", "success": true, "postId": "t-1"})));
        assert!(!PlatformEntry::recognizes(&json!("myspace")));
        assert!(!PlatformEntry::recognizes(&json!(42)));
    }

    #[test]
    fn test_upsert_replaces_entry() {
        let mut entries = vec![PlatformEntry::uploading(Platform::Youtube, at(1))];
        PlatformEntry::upsert(&mut entries, PlatformEntry::failed(Platform::Youtube, "x", at(0)));
        PlatformEntry::upsert(&mut entries, PlatformEntry::uploading(Platform::Tiktok, at(0)));
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0].outcome, PostOutcome::Failed { .. }));
    }
}
