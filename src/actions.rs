//! Contributor action endpoints.
//!
//! POST /contributor dispatches an explicit operation enum (no dynamic
//! string→handler table): each operation produces a short human-readable
//! status string, which is written to the flash mailbox and read back by
//! the next GET /contributor render. An unrecognized operation yields a
//! literal "I don't know how to {operation}" with no side effect.
//!
//! The acting user id arrives as a request parameter; session handling
//! is a front-door concern outside this service.

use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;

use crate::error::Result;
use crate::mirror::fetch_media;
use crate::protocol::{Contact, MenuAction, Subscription, TimelineItem};
use crate::state::AppState;

/// A named contributor operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    InsertSubscription,
    DeleteSubscription,
    InsertItem,
    InsertItemWithAction,
    InsertItemAllUsers,
    InsertContact,
    DeleteContact,
    ChangeDisplayName,
}

impl Operation {
    /// Parse the form's operation field. `None` becomes the literal
    /// unknown-operation status string, never an error.
    pub fn parse(operation: &str) -> Option<Self> {
        match operation {
            "insertSubscription" => Some(Self::InsertSubscription),
            "deleteSubscription" => Some(Self::DeleteSubscription),
            "insertItem" => Some(Self::InsertItem),
            "insertItemWithAction" => Some(Self::InsertItemWithAction),
            "insertItemAllUsers" => Some(Self::InsertItemAllUsers),
            "insertContact" => Some(Self::InsertContact),
            "deleteContact" => Some(Self::DeleteContact),
            "changeDisplayName" => Some(Self::ChangeDisplayName),
            _ => None,
        }
    }
}

/// Form body of POST /contributor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionForm {
    /// Acting user (authenticated upstream).
    pub user_id: String,
    pub operation: String,

    // Operation-specific fields, all optional at the wire level.
    #[serde(default)]
    pub message: Option<String>,
    /// "on" switches the inserted item from text to html.
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

// ── POST /contributor ─────────────────────────────────────────────────────────

/// Execute one operation, flash its status string, redirect back.
pub async fn handle_contributor_post(
    State(state): State<AppState>,
    Form(form): Form<ActionForm>,
) -> Response {
    let message = match Operation::parse(&form.operation) {
        None => format!("I don't know how to {}", form.operation),
        Some(operation) => match perform_operation(&state, operation, &form).await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(
                    user = form.user_id.as_str(),
                    operation = form.operation.as_str(),
                    error = %e,
                    "Contributor operation failed"
                );
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": e.to_string() })),
                )
                    .into_response();
            }
        },
    };

    state.mailbox.set(&form.user_id, message);
    Redirect::to(&format!("/contributor?userId={}", form.user_id)).into_response()
}

async fn perform_operation(
    state: &AppState,
    operation: Operation,
    form: &ActionForm,
) -> Result<String> {
    match operation {
        Operation::InsertSubscription => insert_subscription(state, form).await,
        Operation::DeleteSubscription => delete_subscription(state, form).await,
        Operation::InsertItem => insert_item(state, form).await,
        Operation::InsertItemWithAction => insert_item_with_action(state, form).await,
        Operation::InsertItemAllUsers => {
            state.broadcast(TimelineItem::text("Hello Everyone!")).await
        }
        Operation::InsertContact => insert_contact(state, form).await,
        Operation::DeleteContact => delete_contact(state, form).await,
        Operation::ChangeDisplayName => Ok(change_display_name(state, form)),
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

async fn insert_subscription(state: &AppState, form: &ActionForm) -> Result<String> {
    let client = state.services.client_for(&state.credentials, &form.user_id)?;
    let subscription = Subscription {
        id: None,
        collection: form
            .collection
            .clone()
            .unwrap_or_else(|| "timeline".to_string()),
        user_token: form.user_id.clone(),
        callback_url: format!("{}/notify", state.config.public_base_url),
    };
    client.insert_subscription(&subscription).await?;
    Ok("Application is now subscribed to updates.".to_string())
}

async fn delete_subscription(state: &AppState, form: &ActionForm) -> Result<String> {
    let subscription_id = match form.subscription_id.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => return Ok("Must specify subscriptionId to unsubscribe".to_string()),
    };
    let client = state.services.client_for(&state.credentials, &form.user_id)?;
    client.delete_subscription(subscription_id).await?;
    Ok("Application has been unsubscribed.".to_string())
}

async fn insert_item(state: &AppState, form: &ActionForm) -> Result<String> {
    tracing::info!(user = form.user_id.as_str(), "Inserting timeline item");
    let client = state.services.client_for(&state.credentials, &form.user_id)?;

    let message = form.message.clone().unwrap_or_default();
    let item = if form.html.as_deref() == Some("on") {
        TimelineItem::html(message)
    } else {
        TimelineItem::text(message)
    };

    let inserted = client.insert_timeline_item(&item).await?;

    // Optional image: fetched here and re-uploaded as binary media.
    if let Some(url) = form.image_url.as_deref().filter(|u| !u.is_empty()) {
        let url = resolve_url(state, url);
        let (bytes, content_type) = fetch_media(state.http(), &url).await?;
        if let Some(item_id) = inserted.id.as_deref() {
            client.attach_media(item_id, &content_type, bytes).await?;
        }
    }

    Ok("A timeline item has been inserted.".to_string())
}

async fn insert_item_with_action(state: &AppState, form: &ActionForm) -> Result<String> {
    tracing::info!(user = form.user_id.as_str(), "Inserting timeline item with action");
    let client = state.services.client_for(&state.credentials, &form.user_id)?;

    let item = TimelineItem::text("Reply to this to log a message.")
        .with_creator("notebridge", "Notebridge")
        .with_menu_item(MenuAction::Reply)
        .with_menu_item(MenuAction::TogglePinned);
    client.insert_timeline_item(&item).await?;

    Ok("A timeline item with action has been inserted.".to_string())
}

async fn insert_contact(state: &AppState, form: &ActionForm) -> Result<String> {
    let (name, image_url) = match (
        form.name.as_deref().filter(|n| !n.is_empty()),
        form.image_url.as_deref().filter(|u| !u.is_empty()),
    ) {
        (Some(name), Some(url)) => (name, url),
        _ => return Ok("Must specify imageUrl and name to insert contact".to_string()),
    };

    let client = state.services.client_for(&state.credentials, &form.user_id)?;
    let contact = Contact {
        id: name.to_string(),
        display_name: name.to_string(),
        image_urls: vec![resolve_url(state, image_url)],
    };
    client.insert_contact(&contact).await?;

    Ok(format!("Inserted contact: {}", name))
}

async fn delete_contact(state: &AppState, form: &ActionForm) -> Result<String> {
    let contact_id = match form.id.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => return Ok("Must specify id to delete contact".to_string()),
    };
    let client = state.services.client_for(&state.credentials, &form.user_id)?;
    client.delete_contact(contact_id).await?;
    Ok("Contact has been deleted.".to_string())
}

fn change_display_name(state: &AppState, form: &ActionForm) -> String {
    state
        .credentials
        .put_display_name(&form.user_id, form.display_name.clone().unwrap_or_default());
    "Display name changed.".to_string()
}

/// Resolve a site-relative URL against the public base.
fn resolve_url(state: &AppState, url: &str) -> String {
    if url.starts_with('/') {
        format!("{}{}", state.config.public_base_url, url)
    } else {
        url.to_string()
    }
}

// ── POST /credentials ─────────────────────────────────────────────────────────

/// Credential deposit request. Only the fields present are written; the
/// store keeps absent fields absent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertCredentialRequest {
    pub user_id: String,
    #[serde(default)]
    pub token_blob: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub approved: Option<bool>,
}

/// Deposit point for the external OAuth flow and for moderation.
///
/// Token acquisition itself happens upstream; whatever completes that
/// flow stores the resulting blob (and later the approval flag) here.
pub async fn upsert_credential(
    State(state): State<AppState>,
    Json(request): Json<UpsertCredentialRequest>,
) -> Response {
    if request.user_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Missing userId" })),
        )
            .into_response();
    }

    if let Some(token_blob) = request.token_blob {
        state.credentials.put_token(&request.user_id, token_blob);
    }
    if let Some(display_name) = request.display_name {
        state
            .credentials
            .put_display_name(&request.user_id, display_name);
    }
    if let Some(approved) = request.approved {
        state.credentials.put_approved(&request.user_id, approved);
    }

    tracing::info!(user = request.user_id.as_str(), "Credential updated");
    Json(serde_json::json!({ "success": true })).into_response()
}

// ── GET /contributor and /notes ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorQuery {
    pub user_id: String,
}

/// The contributor's own notes, display name, and pending flash message
/// (consumed on read).
pub async fn contributor_page(
    State(state): State<AppState>,
    Query(query): Query<ContributorQuery>,
) -> impl IntoResponse {
    let message = state.mailbox.take(&query.user_id);
    let display_name = state.credentials.get_display_name(&query.user_id);
    let notes = state.notes.notes_for_user(&query.user_id);

    Json(serde_json::json!({
        "displayName": display_name,
        "message": message,
        "notes": notes,
    }))
}

/// Public notes, newest first.
pub async fn list_public_notes(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "notes": state.notes.public_notes() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::BridgeConfig;

    fn test_state() -> AppState {
        AppState::new(BridgeConfig {
            port: 8080,
            mirror_base_url: "http://localhost:9000".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            broadcast_quota: 10,
            flash_ttl_secs: 5,
            cleanup_interval_secs: 60,
            data_dir: None,
        })
    }

    fn form(user_id: &str, operation: &str) -> ActionForm {
        ActionForm {
            user_id: user_id.to_string(),
            operation: operation.to_string(),
            ..ActionForm::default()
        }
    }

    #[test]
    fn test_operation_parsing() {
        assert_eq!(
            Operation::parse("insertSubscription"),
            Some(Operation::InsertSubscription)
        );
        assert_eq!(
            Operation::parse("insertItemAllUsers"),
            Some(Operation::InsertItemAllUsers)
        );
        assert_eq!(
            Operation::parse("changeDisplayName"),
            Some(Operation::ChangeDisplayName)
        );
        assert_eq!(Operation::parse("foo"), None);
        assert_eq!(Operation::parse(""), None);
        // Case sensitive, like the form values themselves.
        assert_eq!(Operation::parse("insertitem"), None);
    }

    #[tokio::test]
    async fn test_unknown_operation_flashes_literal_message() {
        let state = test_state();

        handle_contributor_post(State(state.clone()), Form(form("user-1", "foo"))).await;

        assert_eq!(
            state.mailbox.take("user-1").as_deref(),
            Some("I don't know how to foo")
        );
        // No side effect on any store.
        assert_eq!(state.credentials.user_count(), 0);
        assert_eq!(state.notes.note_count(), 0);
    }

    #[tokio::test]
    async fn test_change_display_name_round_trip() {
        let state = test_state();

        let mut f = form("user-1", "changeDisplayName");
        f.display_name = Some("Alice".to_string());
        handle_contributor_post(State(state.clone()), Form(f)).await;

        assert_eq!(
            state.mailbox.take("user-1").as_deref(),
            Some("Display name changed.")
        );
        assert_eq!(
            state.credentials.get_display_name("user-1").as_deref(),
            Some("Alice")
        );
    }

    #[tokio::test]
    async fn test_broadcast_over_quota_flashes_abort_message() {
        let state = test_state();
        for i in 0..11 {
            state
                .credentials
                .put_token(&format!("user-{}", i), format!("blob-{}", i));
        }

        // Over quota: aborts before any network call, so no mirror
        // service is needed here.
        handle_contributor_post(State(state.clone()), Form(form("user-0", "insertItemAllUsers")))
            .await;

        assert_eq!(
            state.mailbox.take("user-0").as_deref(),
            Some("Total user count is 11. Aborting broadcast to save your quota")
        );
    }

    #[tokio::test]
    async fn test_insert_contact_requires_name_and_image() {
        let state = test_state();
        state.credentials.put_token("user-1", "blob");

        let mut f = form("user-1", "insertContact");
        f.name = Some("Buddy".to_string());
        handle_contributor_post(State(state.clone()), Form(f)).await;

        assert_eq!(
            state.mailbox.take("user-1").as_deref(),
            Some("Must specify imageUrl and name to insert contact")
        );
    }

    #[tokio::test]
    async fn test_upsert_credential_writes_only_present_fields() {
        let state = test_state();

        upsert_credential(
            State(state.clone()),
            Json(UpsertCredentialRequest {
                user_id: "user-1".to_string(),
                token_blob: Some("oauth-blob".to_string()),
                display_name: None,
                approved: None,
            }),
        )
        .await;

        assert_eq!(state.credentials.get_token("user-1").as_deref(), Some("oauth-blob"));
        assert!(state.credentials.get_display_name("user-1").is_none());
        assert!(state.credentials.get_approved("user-1").is_none());
    }

    #[tokio::test]
    async fn test_contributor_page_consumes_flash_message() {
        let state = test_state();
        state.mailbox.set("user-1", "Display name changed.");

        contributor_page(
            State(state.clone()),
            Query(ContributorQuery {
                user_id: "user-1".to_string(),
            }),
        )
        .await;

        // Consumed by the render: gone on the next read.
        assert!(state.mailbox.take("user-1").is_none());
    }
}
