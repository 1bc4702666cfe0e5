//! Firestore-backed stores.
//!
//! Collections:
//! - `automations/{id}`
//! - `videos/{id}` with the platform entries in `posted_platforms`
//! - `users/{uid}/connected_accounts/{platform}`

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use reel_models::{
    Automation, GenerationUpdate, Platform, PlatformCredentials, PlatformEntry, Scene, VideoId, VideoRecord,
    VideoStatus,
};

use crate::client::{FirestoreClient, Precondition};
use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{latest_post_at, AccountStore, AutomationStore, PlatformSnapshot, VideoStore};
use crate::types::{
    fields_from_serde, ArrayValue, Direction, Document, FieldOp, StructuredQuery, ToFirestoreValue, Value,
};

const AUTOMATIONS: &str = "automations";
const VIDEOS: &str = "videos";
const POSTED_PLATFORMS: &str = "posted_platforms";

/// How many recent posted videos the cooldown lookup scans.
const COOLDOWN_SCAN_LIMIT: u32 = 50;

fn json_value<T: serde::Serialize>(value: &T) -> FirestoreResult<Value> {
    Ok(Value::from_json(&serde_json::to_value(value)?))
}

/// Store RFC 3339 strings produced by serde as native timestamps.
fn promote_timestamps(fields: &mut HashMap<String, Value>, names: &[&str]) {
    for name in names {
        if let Some(Value::StringValue(s)) = fields.get(*name) {
            if let Ok(at) = DateTime::parse_from_rfc3339(s) {
                let at = at.with_timezone(&Utc);
                fields.insert(name.to_string(), at.to_firestore_value());
            }
        }
    }
}

// ============================================================================
// Automations
// ============================================================================

#[derive(Clone)]
pub struct AutomationRepository {
    client: FirestoreClient,
}

impl AutomationRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    fn decode(doc: &Document) -> FirestoreResult<Automation> {
        doc.to_serde(Some("id"))
            .map_err(|e| FirestoreError::invalid_document(format!("automation {:?}: {}", doc.id(), e)))
    }
}

#[async_trait]
impl AutomationStore for AutomationRepository {
    async fn list_enabled_automations(&self) -> FirestoreResult<Vec<Automation>> {
        let docs = self
            .client
            .with_retry("list_enabled_automations", || {
                let query =
                    StructuredQuery::collection(AUTOMATIONS).filter("enabled", FieldOp::Equal, true.to_firestore_value());
                self.client.run_query("", query)
            })
            .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match Self::decode(doc) {
                Ok(automation) => Some(automation),
                Err(e) => {
                    warn!("Skipping unreadable automation: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn get_automation(&self, id: &str) -> FirestoreResult<Option<Automation>> {
        let doc = self
            .client
            .with_retry("get_automation", || self.client.get_document(AUTOMATIONS, id))
            .await?;
        doc.as_ref().map(Self::decode).transpose()
    }

    async fn record_run(&self, id: &str, at: DateTime<Utc>) -> FirestoreResult<()> {
        let fields = HashMap::from([
            ("last_run_at".to_string(), at.to_firestore_value()),
            ("updated_at".to_string(), Utc::now().to_firestore_value()),
        ]);
        self.client.update_document(AUTOMATIONS, id, fields).await?;
        Ok(())
    }
}

// ============================================================================
// Videos
// ============================================================================

#[derive(Clone)]
pub struct VideoRepository {
    client: FirestoreClient,
}

impl VideoRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    fn decode(doc: &Document) -> FirestoreResult<VideoRecord> {
        let mut video: VideoRecord = doc
            .to_serde(Some("id"))
            .map_err(|e| FirestoreError::invalid_document(format!("video {:?}: {}", doc.id(), e)))?;
        video.posted_platforms = Self::entries(doc);
        Ok(video)
    }

    fn entries(doc: &Document) -> Vec<PlatformEntry> {
        match doc.field(POSTED_PLATFORMS).map(Value::to_json) {
            Some(serde_json::Value::Array(raw)) => PlatformEntry::normalize(raw),
            _ => Vec::new(),
        }
    }

    /// Stored slots `entries` skips, kept as they are.
    fn unrecognized_slots(doc: &Document) -> Vec<Value> {
        match doc.field(POSTED_PLATFORMS) {
            Some(Value::ArrayValue(array)) => array
                .values
                .iter()
                .flatten()
                .filter(|slot| !PlatformEntry::recognizes(&slot.to_json()))
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }

    async fn update(&self, id: &VideoId, mut fields: HashMap<String, Value>) -> FirestoreResult<()> {
        fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());
        self.client.update_document(VIDEOS, id.as_str(), fields).await?;
        Ok(())
    }

    async fn query(&self, operation: &str, query: StructuredQuery) -> FirestoreResult<Vec<VideoRecord>> {
        let docs = self
            .client
            .with_retry(operation, || self.client.run_query("", query.clone()))
            .await?;
        Ok(docs
            .iter()
            .filter_map(|doc| match Self::decode(doc) {
                Ok(video) => Some(video),
                Err(e) => {
                    warn!("Skipping unreadable video: {}", e);
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl VideoStore for VideoRepository {
    async fn create_video(&self, video: &VideoRecord) -> FirestoreResult<()> {
        let mut fields = fields_from_serde(video)?;
        promote_timestamps(&mut fields, &["created_at", "updated_at"]);
        fields.insert(POSTED_PLATFORMS.to_string(), json_value(&video.posted_platforms)?);

        self.client.create_document(VIDEOS, video.id.as_str(), fields).await?;
        debug!(video_id = %video.id, "Created video record");
        Ok(())
    }

    async fn get_video(&self, id: &VideoId) -> FirestoreResult<Option<VideoRecord>> {
        let doc = self
            .client
            .with_retry("get_video", || self.client.get_document(VIDEOS, id.as_str()))
            .await?;
        doc.as_ref().map(Self::decode).transpose()
    }

    async fn save_script(&self, id: &VideoId, title: &str, script: &str, scenes: &[Scene]) -> FirestoreResult<()> {
        let fields = HashMap::from([
            ("title".to_string(), title.to_firestore_value()),
            ("script".to_string(), script.to_firestore_value()),
            ("scenes".to_string(), json_value(&scenes)?),
        ]);
        self.update(id, fields).await
    }

    async fn update_generation(&self, id: &VideoId, update: &GenerationUpdate) -> FirestoreResult<()> {
        let mut fields = HashMap::from([
            ("status".to_string(), update.status().as_str().to_firestore_value()),
            (
                "generation_stage".to_string(),
                update.stage().map(|s| s.as_str().to_string()).to_firestore_value(),
            ),
        ]);
        match update {
            GenerationUpdate::Stage(_) => {}
            GenerationUpdate::Ready { video_url, duration_ms } => {
                fields.insert("video_url".to_string(), video_url.to_firestore_value());
                fields.insert("duration_ms".to_string(), duration_ms.to_firestore_value());
                fields.insert("error_message".to_string(), Value::NullValue(()));
            }
            GenerationUpdate::Failed { error } => {
                fields.insert("error_message".to_string(), error.to_firestore_value());
            }
        }
        self.update(id, fields).await
    }

    async fn set_status(&self, id: &VideoId, status: VideoStatus) -> FirestoreResult<()> {
        let fields = HashMap::from([("status".to_string(), status.as_str().to_firestore_value())]);
        self.update(id, fields).await
    }

    async fn has_unfinished_in_series(&self, user_id: &str, series_id: &str) -> FirestoreResult<bool> {
        let unfinished = Value::from_json(&serde_json::json!([
            VideoStatus::Queued.as_str(),
            VideoStatus::Generating.as_str()
        ]));
        let query = StructuredQuery::collection(VIDEOS)
            .filter("user_id", FieldOp::Equal, user_id.to_firestore_value())
            .filter("series_id", FieldOp::Equal, series_id.to_firestore_value())
            .filter("status", FieldOp::In, unfinished)
            .limit(1);
        let docs = self
            .client
            .with_retry("has_unfinished_in_series", || self.client.run_query("", query.clone()))
            .await?;
        Ok(!docs.is_empty())
    }

    async fn platform_snapshot(&self, id: &VideoId) -> FirestoreResult<PlatformSnapshot> {
        let doc = self
            .client
            .with_retry("platform_snapshot", || self.client.get_document(VIDEOS, id.as_str()))
            .await?
            .ok_or_else(|| FirestoreError::not_found(format!("{}/{}", VIDEOS, id)))?;
        Ok(PlatformSnapshot {
            entries: Self::entries(&doc),
            version: doc.update_time.clone(),
        })
    }

    async fn write_platform_entries(
        &self,
        id: &VideoId,
        entries: &[PlatformEntry],
        version: Option<&str>,
    ) -> FirestoreResult<()> {
        let current = self
            .client
            .with_retry("platform_snapshot", || self.client.get_document(VIDEOS, id.as_str()))
            .await?
            .ok_or_else(|| FirestoreError::not_found(format!("{}/{}", VIDEOS, id)))?;
        if let Some(v) = version {
            if current.update_time.as_deref() != Some(v) {
                crate::metrics::record_conflict(VIDEOS);
                return Err(FirestoreError::PreconditionFailed(format!(
                    "{}/{}: version {} is stale",
                    VIDEOS, id, v
                )));
            }
        }

        let mut slots = entries.iter().map(json_value).collect::<FirestoreResult<Vec<_>>>()?;
        let kept = Self::unrecognized_slots(&current);
        if !kept.is_empty() {
            debug!(video_id = %id, count = kept.len(), "Keeping unrecognized platform entries");
            slots.extend(kept);
        }

        let fields = HashMap::from([
            (
                POSTED_PLATFORMS.to_string(),
                Value::ArrayValue(ArrayValue { values: Some(slots) }),
            ),
            ("updated_at".to_string(), Utc::now().to_firestore_value()),
        ]);
        // Guard on the version the kept slots were read at
        let precondition = match version.or(current.update_time.as_deref()) {
            Some(v) => Precondition::UpdateTime(v.to_string()),
            None => Precondition::Exists,
        };
        self.client
            .update_document_with_precondition(VIDEOS, id.as_str(), fields, precondition)
            .await?;
        Ok(())
    }

    async fn last_successful_post(&self, user_id: &str, platform: Platform) -> FirestoreResult<Option<DateTime<Utc>>> {
        let query = StructuredQuery::collection(VIDEOS)
            .filter("user_id", FieldOp::Equal, user_id.to_firestore_value())
            .filter("status", FieldOp::Equal, VideoStatus::Posted.as_str().to_firestore_value())
            .order_by("updated_at", Direction::Descending)
            .limit(COOLDOWN_SCAN_LIMIT);
        let videos = self.query("last_successful_post", query).await?;
        Ok(latest_post_at(&videos, platform))
    }

    async fn list_postable(&self, limit: u32) -> FirestoreResult<Vec<VideoRecord>> {
        let postable = Value::from_json(&serde_json::json!([
            VideoStatus::Ready.as_str(),
            VideoStatus::Posted.as_str()
        ]));
        let query = StructuredQuery::collection(VIDEOS)
            .filter("status", FieldOp::In, postable)
            .order_by("updated_at", Direction::Descending)
            .limit(limit);
        self.query("list_postable", query).await
    }
}

// ============================================================================
// Connected accounts
// ============================================================================

#[derive(Clone)]
pub struct AccountRepository {
    client: FirestoreClient,
}

impl AccountRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AccountStore for AccountRepository {
    async fn credentials(&self, user_id: &str, platform: Platform) -> FirestoreResult<Option<PlatformCredentials>> {
        let collection = format!("users/{}/connected_accounts", user_id);
        let doc = self
            .client
            .with_retry("get_credentials", || self.client.get_document(&collection, platform.as_str()))
            .await?;

        // The document id is the platform name.
        doc.map(|doc| {
            doc.to_serde(Some("platform"))
                .map_err(|e| FirestoreError::invalid_document(format!("{} account of {}: {}", platform, user_id, e)))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authenticator;
    use crate::client::FirestoreConfig;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCS: &str = "/v1/projects/demo/databases/test/documents";

    fn client(server: &MockServer) -> FirestoreClient {
        let mut config = FirestoreConfig::new("demo");
        config.database_id = "test".to_string();
        FirestoreClient::with_endpoint(config, &server.uri(), Authenticator::emulator()).unwrap()
    }

    #[tokio::test]
    async fn test_video_decode_normalizes_legacy_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/videos/v1", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/demo/databases/test/documents/videos/v1",
                "updateTime": "2026-03-01T09:00:00.5Z",
                "fields": {
                    "user_id": {"stringValue": "u1"},
                    "series_id": {"stringValue": "s1"},
                    "status": {"stringValue": "POSTED"},
                    "duration_ms": {"integerValue": "31500"},
                    "created_at": {"timestampValue": "2026-03-01T08:00:00Z"},
                    "updated_at": {"timestampValue": "2026-03-01T09:00:00Z"},
                    "posted_platforms": {"arrayValue": {"values": [
                        {"stringValue": "youtube"},
                        {"mapValue": {"fields": {
                            "platform": {"stringValue": "tiktok"},
                            "success": {"stringValue": "uploading"},
                            "startedAt": {"stringValue": "2026-03-01T08:59:00Z"}
                        }}}
                    ]}}
                }
            })))
            .mount(&server)
            .await;

        let repo = VideoRepository::new(client(&server));
        let video = repo.get_video(&VideoId::from("v1")).await.unwrap().unwrap();
        assert_eq!(video.id.as_str(), "v1");
        assert_eq!(video.status, VideoStatus::Posted);
        assert_eq!(video.duration_ms, Some(31500));
        assert_eq!(video.posted_platforms.len(), 2);
        assert!(video.posted_platforms[0].is_posted());

        let snapshot = repo.platform_snapshot(&VideoId::from("v1")).await.unwrap();
        assert_eq!(snapshot.version.as_deref(), Some("2026-03-01T09:00:00.5Z"));
    }

    fn video_with_slots(update_time: &str) -> serde_json::Value {
        json!({
            "name": "projects/demo/databases/test/documents/videos/v1",
            "updateTime": update_time,
            "fields": {
                "user_id": {"stringValue": "u1"},
                "series_id": {"stringValue": "s1"},
                "posted_platforms": {"arrayValue": {"values": [
                    {"mapValue": {"fields": {
                        "platform": {"stringValue": "threads"},
                        "success": {"booleanValue": true},
                        "postId": {"stringValue": "th-9"}
                    }}},
                    {"mapValue": {"fields": {
                        "platform": {"stringValue": "youtube"},
                        "success": {"stringValue": "uploading"},
                        "startedAt": {"stringValue": "2026-03-01T08:59:00Z"}
                    }}}
                ]}}
            }
        })
    }

    #[tokio::test]
    async fn test_platform_write_keeps_unrecognized_slots() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/videos/v1", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(video_with_slots("2026-03-01T09:00:00.5Z")))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/videos/v1", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(video_with_slots("2026-03-01T09:01:00Z")))
            .expect(1)
            .mount(&server)
            .await;

        let repo = VideoRepository::new(client(&server));
        let id = VideoId::from("v1");
        let snapshot = repo.platform_snapshot(&id).await.unwrap();
        assert_eq!(snapshot.entries.len(), 1);

        let posted = vec![PlatformEntry::posted(Platform::Youtube, Some("yt-1".into()), None, Utc::now())];
        repo.write_platform_entries(&id, &posted, snapshot.version.as_deref())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let patch = requests
            .iter()
            .find(|r| r.method.to_string() == "PATCH")
            .expect("patch sent");
        assert!(patch.url.query().unwrap_or_default().contains("currentDocument.updateTime="));
        let body: serde_json::Value = serde_json::from_slice(&patch.body).unwrap();
        let slots = body["fields"]["posted_platforms"]["arrayValue"]["values"]
            .as_array()
            .unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0]["mapValue"]["fields"]["platform"]["stringValue"], "youtube");
        assert_eq!(slots[0]["mapValue"]["fields"]["success"]["booleanValue"], true);
        assert_eq!(slots[1]["mapValue"]["fields"]["platform"]["stringValue"], "threads");
        assert_eq!(slots[1]["mapValue"]["fields"]["postId"]["stringValue"], "th-9");
    }

    #[tokio::test]
    async fn test_platform_write_with_stale_version_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/videos/v1", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(video_with_slots("2026-03-01T09:05:00Z")))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let repo = VideoRepository::new(client(&server));
        let err = repo
            .write_platform_entries(&VideoId::from("v1"), &[], Some("2026-03-01T09:00:00.5Z"))
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
    }

    #[tokio::test]
    async fn test_unfinished_query_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}:runQuery", DOCS)))
            .and(body_partial_json(json!({
                "structuredQuery": {"from": [{"collectionId": "videos"}], "limit": 1}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"readTime": "t"}])))
            .mount(&server)
            .await;

        let repo = VideoRepository::new(client(&server));
        assert!(!repo.has_unfinished_in_series("u1", "s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_credentials_take_platform_from_doc_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/users/u1/connected_accounts/youtube", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/demo/databases/test/documents/users/u1/connected_accounts/youtube",
                "fields": {
                    "access_token": {"stringValue": "ya29"},
                    "account_id": {"stringValue": "UC123"}
                }
            })))
            .mount(&server)
            .await;

        let repo = AccountRepository::new(client(&server));
        let creds = repo.credentials("u1", Platform::Youtube).await.unwrap().unwrap();
        assert_eq!(creds.platform, Platform::Youtube);
        assert_eq!(creds.access_token, "ya29");
    }

    #[test]
    fn test_promote_timestamps() {
        let mut fields = HashMap::from([
            ("created_at".to_string(), Value::StringValue("2026-03-01T08:00:00Z".into())),
            ("title".to_string(), Value::StringValue("2026-03-01T08:00:00Z".into())),
        ]);
        promote_timestamps(&mut fields, &["created_at"]);
        assert!(matches!(fields["created_at"], Value::TimestampValue(_)));
        assert!(matches!(fields["title"], Value::StringValue(_)));
    }
}
