//! Mirror-service client.
//!
//! Everything the bridge consumes from the external timeline/location
//! service lives here:
//!
//! - `ServiceFactory` turns a stored credential into an authenticated
//!   `MirrorClient`. Construction fails when the token blob is absent or
//!   empty; remote rejection surfaces on the first authenticated call.
//! - `MirrorApi` is the narrow read/write surface the notification router
//!   needs, kept as a trait so tests can substitute a stub.
//! - `BatchExecutor` is the batched-call primitive: one wire round trip
//!   carrying N logical sub-requests, each answered with an independent
//!   per-item outcome.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::protocol::{
    BatchItemResult, BatchRequest, Contact, LocationInfo, Subscription, TimelineItem,
};

/// The mirror-service operations the notification router depends on.
#[allow(async_fn_in_trait)]
pub trait MirrorApi {
    async fn timeline_insert(&self, item: &TimelineItem) -> Result<TimelineItem>;
    async fn timeline_get(&self, item_id: &str) -> Result<TimelineItem>;
    async fn location_get(&self, item_id: &str) -> Result<LocationInfo>;
}

/// The batched multi-request execution primitive.
///
/// `execute` submits all sub-requests as a single network operation and
/// blocks until every per-item outcome has arrived (or the batch itself
/// fails outright, which propagates as an error). Outcome order follows
/// wire arrival, not enqueue order.
#[allow(async_fn_in_trait)]
pub trait BatchExecutor {
    async fn execute(&self, requests: Vec<BatchRequest>) -> Result<Vec<BatchItemResult>>;
}

// ── Service Factory ───────────────────────────────────────────────────────────

/// Builds per-user authenticated clients.
#[derive(Clone)]
pub struct ServiceFactory {
    http: reqwest::Client,
    base_url: String,
}

impl ServiceFactory {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Build a client scoped to one user's stored credential.
    ///
    /// Only a credential with a non-empty token blob may construct a
    /// client. Does not cache or mutate stored credentials.
    pub fn client_for(&self, credentials: &CredentialStore, user_id: &str) -> Result<MirrorClient> {
        let token = credentials
            .get_token(user_id)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth(format!("no stored credential for user {}", user_id)))?;

        Ok(MirrorClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token,
        })
    }
}

// ── Authenticated Client ──────────────────────────────────────────────────────

/// A mirror-service client bound to one user's token.
#[derive(Clone)]
pub struct MirrorClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl MirrorClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        read_response(resp).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        read_response(resp).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check_response(resp).await?;
        Ok(())
    }

    // ── Timeline ─────────────────────────────────────────────────────────

    pub async fn insert_timeline_item(&self, item: &TimelineItem) -> Result<TimelineItem> {
        self.post_json("/timeline", item).await
    }

    pub async fn get_timeline_item(&self, item_id: &str) -> Result<TimelineItem> {
        self.get_json(&format!("/timeline/{}", item_id)).await
    }

    /// Attach binary media to an already-inserted timeline item.
    pub async fn attach_media(
        &self,
        item_id: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let resp = self
            .http
            .post(self.url(&format!("/timeline/{}/media", item_id)))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        check_response(resp).await?;
        Ok(())
    }

    /// Build a timeline-insert sub-request for a batched call without
    /// executing it. The correlation id tags the eventual per-item
    /// outcome back to its user.
    pub fn timeline_insert_request(
        &self,
        correlation_id: impl Into<String>,
        item: TimelineItem,
    ) -> BatchRequest {
        BatchRequest {
            correlation_id: correlation_id.into(),
            token: self.token.clone(),
            item,
        }
    }

    // ── Locations ────────────────────────────────────────────────────────

    pub async fn get_location(&self, item_id: &str) -> Result<LocationInfo> {
        self.get_json(&format!("/locations/{}", item_id)).await
    }

    // ── Subscriptions ────────────────────────────────────────────────────

    pub async fn insert_subscription(&self, subscription: &Subscription) -> Result<Subscription> {
        self.post_json("/subscriptions", subscription).await
    }

    pub async fn delete_subscription(&self, subscription_id: &str) -> Result<()> {
        self.delete(&format!("/subscriptions/{}", subscription_id))
            .await
    }

    // ── Contacts ─────────────────────────────────────────────────────────

    pub async fn insert_contact(&self, contact: &Contact) -> Result<Contact> {
        self.post_json("/contacts", contact).await
    }

    pub async fn delete_contact(&self, contact_id: &str) -> Result<()> {
        self.delete(&format!("/contacts/{}", contact_id)).await
    }
}

impl MirrorApi for MirrorClient {
    async fn timeline_insert(&self, item: &TimelineItem) -> Result<TimelineItem> {
        self.insert_timeline_item(item).await
    }

    async fn timeline_get(&self, item_id: &str) -> Result<TimelineItem> {
        self.get_timeline_item(item_id).await
    }

    async fn location_get(&self, item_id: &str) -> Result<LocationInfo> {
        self.get_location(item_id).await
    }
}

// ── Batched execution over HTTP ───────────────────────────────────────────────

/// Production batch executor: one POST carrying the whole request array,
/// one response array of per-item outcomes.
#[derive(Clone)]
pub struct HttpBatchExecutor {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBatchExecutor {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

impl BatchExecutor for HttpBatchExecutor {
    async fn execute(&self, requests: Vec<BatchRequest>) -> Result<Vec<BatchItemResult>> {
        let resp = self
            .http
            .post(format!("{}/batch", self.base_url))
            .json(&requests)
            .send()
            .await?;
        read_response(resp).await
    }
}

// ── Response handling ─────────────────────────────────────────────────────────

async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Auth(format!(
            "mirror service rejected credential ({})",
            status
        )));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}

async fn read_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let resp = check_response(resp).await?;
    Ok(resp.json().await?)
}

/// Download binary media for re-upload, returning bytes and content type.
pub async fn fetch_media(http: &reqwest::Client, url: &str) -> Result<(Vec<u8>, String)> {
    let resp = http.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            body: format!("media fetch from {} failed", url),
        });
    }
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();
    let bytes = resp.bytes().await?;
    Ok((bytes.to_vec(), content_type))
}
