//! Content-syndication backend: pushes article documents to a remote
//! revisioned document store (Apple-News-style REST).
//!
//! The remote requires an exact revision token to accept an overwrite,
//! so the update path runs a bounded conflict-resolution cascade:
//! content-item revision, then the revision recorded on the last
//! successfully sent record for the same (channel, content) pair, then
//! the authoritative revision read back from the remote. If all three
//! are rejected the failing result is surfaced and an operator alert
//! goes out; retrying further against a remote whose revision moves
//! faster than we can write would loop forever.

use std::sync::Arc;

use async_trait::async_trait;
use pressline_core::config::ProviderConfig;
use pressline_core::error::{PresslineError, Result};
use pressline_core::traits::{Notifier, OperatorAlerts, SearchIndex};
use pressline_core::types::{
    Channel, ContentItem, Notification, NotificationKind, NotificationQuery, NotifierResult,
    OutcomeCode, SendStatus, SyncOperation,
};
use pressline_security::CredentialCipher;

/// Result tag carrying the remote document revision.
pub const TAG_REVISION: &str = "revision";
/// Result tag carrying the remote article id.
pub const TAG_ARTICLE_ID: &str = "article_id";

// ─── Remote document API ──────────────────────────────────────

/// Decrypted credentials for one syndication channel.
#[derive(Debug, Clone)]
pub struct SyndicationCredentials {
    pub api_key: String,
    pub channel_id: String,
}

/// One answer from the remote document store.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: u16,
    pub article_id: Option<String>,
    pub revision: Option<String>,
    pub body: String,
}

impl RemoteResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The remote rejects stale writes with 409.
    pub fn is_wrong_revision(&self) -> bool {
        self.status == 409
    }
}

/// The remote store's document operations. Split out as a trait so the
/// conflict cascade is testable without a live remote.
#[async_trait]
pub trait RemoteDocumentApi: Send + Sync {
    async fn create_document(
        &self,
        creds: &SyndicationCredentials,
        document: &serde_json::Value,
    ) -> Result<RemoteResponse>;

    async fn update_document(
        &self,
        creds: &SyndicationCredentials,
        article_id: &str,
        revision: &str,
        document: &serde_json::Value,
    ) -> Result<RemoteResponse>;

    async fn delete_document(
        &self,
        creds: &SyndicationCredentials,
        article_id: &str,
    ) -> Result<RemoteResponse>;

    async fn read_document(
        &self,
        creds: &SyndicationCredentials,
        article_id: &str,
    ) -> Result<RemoteResponse>;
}

/// reqwest implementation against the real remote.
pub struct HttpDocumentApi {
    base_url: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpDocumentApi {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs,
            client: reqwest::Client::new(),
        }
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<RemoteResponse> {
        let response = request
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| PresslineError::Scheduler(format!("Syndication transport: {e}")))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
        Ok(RemoteResponse {
            status,
            article_id: parsed["data"]["id"].as_str().map(String::from),
            revision: parsed["data"]["revision"].as_str().map(String::from),
            body,
        })
    }
}

#[async_trait]
impl RemoteDocumentApi for HttpDocumentApi {
    async fn create_document(
        &self,
        creds: &SyndicationCredentials,
        document: &serde_json::Value,
    ) -> Result<RemoteResponse> {
        let url = format!("{}/channels/{}/articles", self.base_url, creds.channel_id);
        self.execute(
            self.client
                .post(&url)
                .bearer_auth(&creds.api_key)
                .json(document),
        )
        .await
    }

    async fn update_document(
        &self,
        creds: &SyndicationCredentials,
        article_id: &str,
        revision: &str,
        document: &serde_json::Value,
    ) -> Result<RemoteResponse> {
        let url = format!("{}/articles/{article_id}", self.base_url);
        self.execute(
            self.client
                .post(&url)
                .bearer_auth(&creds.api_key)
                .header("X-Revision", revision)
                .json(document),
        )
        .await
    }

    async fn delete_document(
        &self,
        creds: &SyndicationCredentials,
        article_id: &str,
    ) -> Result<RemoteResponse> {
        let url = format!("{}/articles/{article_id}", self.base_url);
        self.execute(self.client.delete(&url).bearer_auth(&creds.api_key))
            .await
    }

    async fn read_document(
        &self,
        creds: &SyndicationCredentials,
        article_id: &str,
    ) -> Result<RemoteResponse> {
        let url = format!("{}/articles/{article_id}", self.base_url);
        self.execute(self.client.get(&url).bearer_auth(&creds.api_key))
            .await
    }
}

// ─── Notifier ──────────────────────────────────────

pub struct SyndicationNotifier {
    config: ProviderConfig,
    cipher: CredentialCipher,
    api: Arc<dyn RemoteDocumentApi>,
    index: Arc<dyn SearchIndex>,
    alerts: Arc<dyn OperatorAlerts>,
}

impl SyndicationNotifier {
    pub fn new(
        config: ProviderConfig,
        cipher: CredentialCipher,
        api: Arc<dyn RemoteDocumentApi>,
        index: Arc<dyn SearchIndex>,
        alerts: Arc<dyn OperatorAlerts>,
    ) -> Self {
        Self {
            config,
            cipher,
            api,
            index,
            alerts,
        }
    }

    /// Article document sent to the remote.
    pub fn build_document(
        notification: &Notification,
        content: Option<&ContentItem>,
    ) -> serde_json::Value {
        serde_json::json!({
            "title": content.map(|c| c.title.as_str()).unwrap_or(&notification.title),
            "body": notification.body,
            "content_ref": notification.content_ref,
            "notify": notification.operation == SyncOperation::Notify,
        })
    }

    fn credentials(&self, channel: &Channel) -> Result<SyndicationCredentials> {
        let api_key = self.cipher.decrypt(channel.setting("api_key"))?;
        let channel_id = channel.setting("channel_id").to_string();
        if channel_id.is_empty() {
            return Err(PresslineError::Validation(
                "syndication channel has no channel_id".into(),
            ));
        }
        Ok(SyndicationCredentials {
            api_key,
            channel_id,
        })
    }

    fn map_response(response: &RemoteResponse) -> NotifierResult {
        let code = OutcomeCode::from_http_status(response.status);
        let mut result = if code == OutcomeCode::Ok {
            NotifierResult::success(OutcomeCode::Ok)
        } else {
            NotifierResult::failure(code, "SyndicationError", &response.body)
        };
        result = result
            .with_http_code(response.status)
            .with_raw_response(response.body.clone());
        if let Some(revision) = &response.revision {
            result = result.with_tag(TAG_REVISION, revision.clone());
        }
        if let Some(article_id) = &response.article_id {
            result = result.with_tag(TAG_ARTICLE_ID, article_id.clone());
        }
        result
    }

    fn map_transport_error(error: &PresslineError) -> NotifierResult {
        NotifierResult::failure(
            OutcomeCode::Unavailable,
            "SyndicationTransportError",
            &error.to_string(),
        )
    }

    /// Most recent successfully sent record for the same (channel,
    /// content) pair. Pages through the index; creation order is
    /// ascending so the last item of the last page wins.
    async fn last_sent(&self, channel_ref: &str, content_ref: &str) -> Option<Notification> {
        let mut query = NotificationQuery::for_content(content_ref)
            .with_channel(channel_ref)
            .with_status(SendStatus::Sent);
        query.kind = Some(NotificationKind::Syndication);

        let mut latest = None;
        loop {
            let page = self.index.query(&query).await.ok()?;
            if page.items.is_empty() {
                break;
            }
            latest = page.items.into_iter().last();
            query = query.next_page();
        }
        latest
    }

    /// The remote article id this record addresses, recorded on the
    /// last successful send.
    async fn remote_article_id(&self, channel_ref: &str, content_ref: &str) -> Option<String> {
        self.last_sent(channel_ref, content_ref)
            .await
            .and_then(|record| record.result)
            .and_then(|result| result.tag(TAG_ARTICLE_ID).map(String::from))
    }

    /// Revision-conflict recovery cascade for the update path.
    async fn update_with_cascade(
        &self,
        creds: &SyndicationCredentials,
        article_id: &str,
        document: &serde_json::Value,
        notification: &Notification,
        content: Option<&ContentItem>,
    ) -> NotifierResult {
        let content_ref = notification.content_ref.as_deref().unwrap_or_default();
        let first = content
            .and_then(|c| c.revision.clone())
            .unwrap_or_default();

        let mut tried = vec![first.clone()];
        let mut last_response = match self
            .api
            .update_document(creds, article_id, &first, document)
            .await
        {
            Ok(resp) => resp,
            Err(e) => return Self::map_transport_error(&e),
        };
        if !last_response.is_wrong_revision() {
            return Self::map_response(&last_response);
        }

        // Second chance: the revision recorded on the last Sent record.
        if let Some(prior) = self
            .last_sent(&notification.channel_ref, content_ref)
            .await
            .and_then(|record| record.result)
            .and_then(|result| result.tag(TAG_REVISION).map(String::from))
        {
            if !tried.contains(&prior) {
                tracing::debug!(
                    "🔁 Revision conflict on {article_id}, retrying with last-sent revision"
                );
                tried.push(prior.clone());
                last_response = match self
                    .api
                    .update_document(creds, article_id, &prior, document)
                    .await
                {
                    Ok(resp) => resp,
                    Err(e) => return Self::map_transport_error(&e),
                };
                if !last_response.is_wrong_revision() {
                    return Self::map_response(&last_response);
                }
            }
        }

        // Third chance: the authoritative revision from the remote.
        if let Ok(current) = self.api.read_document(creds, article_id).await {
            if let Some(revision) = current.revision {
                if !tried.contains(&revision) {
                    tracing::debug!(
                        "🔁 Revision conflict on {article_id}, retrying with remote revision"
                    );
                    tried.push(revision.clone());
                    last_response = match self
                        .api
                        .update_document(creds, article_id, &revision, document)
                        .await
                    {
                        Ok(resp) => resp,
                        Err(e) => return Self::map_transport_error(&e),
                    };
                    if !last_response.is_wrong_revision() {
                        return Self::map_response(&last_response);
                    }
                }
            }
        }

        // The remote's revision is moving faster than we can write.
        self.alerts
            .alert(
                "Syndication revision conflict unresolved",
                &format!(
                    "article {article_id} (notification {}): {} revisions rejected",
                    notification.id,
                    tried.len()
                ),
            )
            .await;
        Self::map_response(&last_response)
    }
}

#[async_trait]
impl Notifier for SyndicationNotifier {
    fn name(&self) -> &str {
        "syndication"
    }

    async fn send(
        &self,
        notification: &Notification,
        channel: &Channel,
        content: Option<&ContentItem>,
    ) -> NotifierResult {
        if !self.config.enabled {
            return NotifierResult::failure(
                OutcomeCode::Cancelled,
                "BackendDisabled",
                "syndication backend disabled by operator flag",
            );
        }

        let creds = match self.credentials(channel) {
            Ok(c) => c,
            Err(e) => {
                return NotifierResult::failure(
                    OutcomeCode::InvalidArgument,
                    "CredentialError",
                    &e.to_string(),
                );
            }
        };
        let document = Self::build_document(notification, content);
        let content_ref = notification.content_ref.as_deref().unwrap_or_default();

        match notification.operation {
            SyncOperation::Create | SyncOperation::Notify => {
                match self.api.create_document(&creds, &document).await {
                    Ok(resp) => Self::map_response(&resp),
                    Err(e) => Self::map_transport_error(&e),
                }
            }
            SyncOperation::Delete => {
                let Some(article_id) = self
                    .remote_article_id(&notification.channel_ref, content_ref)
                    .await
                else {
                    return NotifierResult::failure(
                        OutcomeCode::NotFound,
                        "NoRemoteArticle",
                        "no previously sent article to delete",
                    );
                };
                match self.api.delete_document(&creds, &article_id).await {
                    Ok(resp) => Self::map_response(&resp),
                    Err(e) => Self::map_transport_error(&e),
                }
            }
            SyncOperation::Update => {
                let Some(article_id) = self
                    .remote_article_id(&notification.channel_ref, content_ref)
                    .await
                else {
                    return NotifierResult::failure(
                        OutcomeCode::NotFound,
                        "NoRemoteArticle",
                        "no previously sent article to update",
                    );
                };
                self.update_with_cascade(&creds, &article_id, &document, notification, content)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressline_core::types::ContentStatus;
    use pressline_store::{MemorySearchIndex, RecordingAlerts};
    use std::sync::Mutex;

    /// Scripted remote: accepts exactly one revision, reports another
    /// as current, and counts calls.
    struct FakeApi {
        accepted_revision: String,
        remote_revision: String,
        calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn new(accepted: &str, remote: &str) -> Self {
            Self {
                accepted_revision: accepted.into(),
                remote_revision: remote.into(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteDocumentApi for FakeApi {
        async fn create_document(
            &self,
            _creds: &SyndicationCredentials,
            _document: &serde_json::Value,
        ) -> Result<RemoteResponse> {
            self.calls.lock().unwrap().push("create".into());
            Ok(RemoteResponse {
                status: 201,
                article_id: Some("art-1".into()),
                revision: Some("r1".into()),
                body: String::new(),
            })
        }

        async fn update_document(
            &self,
            _creds: &SyndicationCredentials,
            _article_id: &str,
            revision: &str,
            _document: &serde_json::Value,
        ) -> Result<RemoteResponse> {
            self.calls.lock().unwrap().push(format!("update:{revision}"));
            if revision == self.accepted_revision {
                Ok(RemoteResponse {
                    status: 200,
                    article_id: Some("art-1".into()),
                    revision: Some("r-next".into()),
                    body: String::new(),
                })
            } else {
                Ok(RemoteResponse {
                    status: 409,
                    article_id: None,
                    revision: None,
                    body: "WRONG_REVISION".into(),
                })
            }
        }

        async fn delete_document(
            &self,
            _creds: &SyndicationCredentials,
            article_id: &str,
        ) -> Result<RemoteResponse> {
            self.calls.lock().unwrap().push(format!("delete:{article_id}"));
            Ok(RemoteResponse {
                status: 204,
                article_id: None,
                revision: None,
                body: String::new(),
            })
        }

        async fn read_document(
            &self,
            _creds: &SyndicationCredentials,
            _article_id: &str,
        ) -> Result<RemoteResponse> {
            self.calls.lock().unwrap().push("read".into());
            Ok(RemoteResponse {
                status: 200,
                article_id: Some("art-1".into()),
                revision: Some(self.remote_revision.clone()),
                body: String::new(),
            })
        }
    }

    fn cipher() -> CredentialCipher {
        CredentialCipher::from_secret("s")
    }

    fn channel() -> Channel {
        Channel::new(
            "ch-synd",
            "pressline-syndication-app",
            serde_json::json!({
                "api_key": cipher().encrypt("synd-key"),
                "channel_id": "remote-ch-1",
            }),
        )
    }

    fn update_record() -> Notification {
        Notification::new(NotificationKind::Syndication, "ch-synd", "Title", "Body")
            .with_content("article-7", false)
            .with_operation(SyncOperation::Update)
    }

    /// A prior Sent record whose result carries article id + revision.
    async fn seed_sent(index: &MemorySearchIndex, revision: &str) {
        let mut prior =
            Notification::new(NotificationKind::Syndication, "ch-synd", "Title", "Body")
                .with_content("article-7", false);
        prior.send_status = SendStatus::Sent;
        prior.result = Some(
            NotifierResult::success(OutcomeCode::Ok)
                .with_tag(TAG_ARTICLE_ID, "art-1")
                .with_tag(TAG_REVISION, revision),
        );
        index.index(&prior).await.unwrap();
    }

    fn notifier(
        api: Arc<FakeApi>,
        index: Arc<MemorySearchIndex>,
        alerts: Arc<RecordingAlerts>,
    ) -> SyndicationNotifier {
        SyndicationNotifier::new(ProviderConfig::default(), cipher(), api, index, alerts)
    }

    #[tokio::test]
    async fn test_update_first_revision_accepted() {
        let api = Arc::new(FakeApi::new("r1", "r9"));
        let index = Arc::new(MemorySearchIndex::new());
        seed_sent(&index, "r1").await;
        let alerts = Arc::new(RecordingAlerts::new());
        let n = notifier(api.clone(), index, alerts);

        let mut content = ContentItem::new("article-7", "Title", ContentStatus::Published);
        content.revision = Some("r1".into());
        let result = n.send(&update_record(), &channel(), Some(&content)).await;

        assert!(result.ok);
        assert_eq!(result.tag(TAG_REVISION), Some("r-next"));
        assert_eq!(api.calls(), vec!["update:r1"]);
    }

    #[tokio::test]
    async fn test_update_recovers_via_last_sent_revision() {
        let api = Arc::new(FakeApi::new("r2", "r9"));
        let index = Arc::new(MemorySearchIndex::new());
        seed_sent(&index, "r2").await;
        let alerts = Arc::new(RecordingAlerts::new());
        let n = notifier(api.clone(), index, alerts.clone());

        let mut content = ContentItem::new("article-7", "Title", ContentStatus::Published);
        content.revision = Some("r1".into());
        let result = n.send(&update_record(), &channel(), Some(&content)).await;

        assert!(result.ok);
        assert_eq!(result.tag(TAG_REVISION), Some("r-next"));
        assert_eq!(result.tag(TAG_ARTICLE_ID), Some("art-1"));
        assert_eq!(api.calls(), vec!["update:r1", "update:r2"]);
        assert!(alerts.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_update_recovers_via_remote_revision() {
        let api = Arc::new(FakeApi::new("r9", "r9"));
        let index = Arc::new(MemorySearchIndex::new());
        seed_sent(&index, "r2").await;
        let alerts = Arc::new(RecordingAlerts::new());
        let n = notifier(api.clone(), index, alerts.clone());

        let mut content = ContentItem::new("article-7", "Title", ContentStatus::Published);
        content.revision = Some("r1".into());
        let result = n.send(&update_record(), &channel(), Some(&content)).await;

        assert!(result.ok);
        assert_eq!(
            api.calls(),
            vec!["update:r1", "update:r2", "read", "update:r9"]
        );
        assert!(alerts.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_update_exhausted_alerts_operator() {
        // Remote reports r9 as current but rejects it too.
        let api = Arc::new(FakeApi::new("never", "r9"));
        let index = Arc::new(MemorySearchIndex::new());
        seed_sent(&index, "r2").await;
        let alerts = Arc::new(RecordingAlerts::new());
        let n = notifier(api.clone(), index, alerts.clone());

        let mut content = ContentItem::new("article-7", "Title", ContentStatus::Published);
        content.revision = Some("r1".into());
        let result = n.send(&update_record(), &channel(), Some(&content)).await;

        assert!(!result.ok);
        assert_eq!(result.http_code, Some(409));
        assert_eq!(alerts.alerts().len(), 1);
        // Exactly three update attempts, never more.
        assert_eq!(
            api.calls(),
            vec!["update:r1", "update:r2", "read", "update:r9"]
        );
    }

    #[tokio::test]
    async fn test_update_without_prior_send_is_not_found() {
        let api = Arc::new(FakeApi::new("r1", "r1"));
        let index = Arc::new(MemorySearchIndex::new());
        let alerts = Arc::new(RecordingAlerts::new());
        let n = notifier(api.clone(), index, alerts);

        let result = n.send(&update_record(), &channel(), None).await;
        assert!(!result.ok);
        assert_eq!(result.code, OutcomeCode::NotFound);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_uses_recorded_article_id() {
        let api = Arc::new(FakeApi::new("r1", "r1"));
        let index = Arc::new(MemorySearchIndex::new());
        seed_sent(&index, "r1").await;
        let alerts = Arc::new(RecordingAlerts::new());
        let n = notifier(api.clone(), index, alerts);

        let record = update_record().with_operation(SyncOperation::Delete);
        let result = n.send(&record, &channel(), None).await;
        assert!(result.ok);
        assert_eq!(api.calls(), vec!["delete:art-1"]);
    }

    #[tokio::test]
    async fn test_create_records_ids() {
        let api = Arc::new(FakeApi::new("r1", "r1"));
        let index = Arc::new(MemorySearchIndex::new());
        let alerts = Arc::new(RecordingAlerts::new());
        let n = notifier(api.clone(), index, alerts);

        let record = update_record().with_operation(SyncOperation::Create);
        let result = n.send(&record, &channel(), None).await;
        assert!(result.ok);
        assert_eq!(result.tag(TAG_ARTICLE_ID), Some("art-1"));
        assert_eq!(result.tag(TAG_REVISION), Some("r1"));
    }
}
