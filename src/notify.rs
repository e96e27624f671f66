//! Webhook notification routing.
//!
//! Single pass per inbound ping:
//!
//! 1. Parse the body as a notification payload. Unparseable bodies are
//!    logged and dropped — the sender only ever gets an acknowledgment,
//!    and retries are its responsibility.
//! 2. Look up the user's credential and build an authenticated client.
//!    A missing credential drops the notification with a diagnostic; no
//!    partial state is persisted.
//! 3. Dispatch on the collection tag: `locations` writes a position card
//!    back to the user's timeline, `timeline` feeds the note ingestor,
//!    anything else is a deliberate no-op.

use axum::extract::State;
use axum::http::StatusCode;

use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::mirror::MirrorApi;
use crate::notes::NoteStore;
use crate::protocol::{Collection, MenuAction, NotificationPayload, TimelineItem};
use crate::state::AppState;

/// POST /notify — webhook ingestion endpoint.
///
/// Always acknowledges with 200; failures are logged, never surfaced to
/// the sender.
pub async fn handle_notify(State(state): State<AppState>, body: String) -> StatusCode {
    tracing::info!(payload = body.as_str(), "Got a notification");

    let payload: NotificationPayload = match serde_json::from_str(&body)
        .map_err(|e| Error::MalformedPayload(e.to_string()))
    {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping notification");
            return StatusCode::OK;
        }
    };

    let client = match state
        .services
        .client_for(&state.credentials, &payload.user_token)
    {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(
                user = payload.user_token.as_str(),
                error = %e,
                "Dropping notification without usable credential"
            );
            return StatusCode::OK;
        }
    };

    if let Err(e) = route_notification(&client, &state.credentials, &state.notes, &payload).await {
        tracing::warn!(
            user = payload.user_token.as_str(),
            error = %e,
            "Notification handling failed"
        );
    }

    StatusCode::OK
}

/// Dispatch one parsed notification through its collection handler.
pub async fn route_notification(
    api: &impl MirrorApi,
    credentials: &CredentialStore,
    notes: &NoteStore,
    payload: &NotificationPayload,
) -> Result<()> {
    match payload.collection() {
        Collection::Locations => handle_locations_notification(api, payload).await,
        Collection::Timeline => ingest_timeline_notification(api, credentials, notes, payload).await,
        Collection::Other => {
            // Unknown or absent collection: intentional no-op.
            tracing::debug!(
                collection = payload.collection.as_deref().unwrap_or("<none>"),
                "Ignoring notification for unhandled collection"
            );
            Ok(())
        }
    }
}

/// Fetch the referenced location and write a position card back to the
/// user's timeline. One external write, no local persistence.
async fn handle_locations_notification(
    api: &impl MirrorApi,
    payload: &NotificationPayload,
) -> Result<()> {
    let item_id = match payload.item_id.as_deref() {
        Some(id) => id,
        None => {
            tracing::warn!("Location notification without itemId, dropping");
            return Ok(());
        }
    };

    let location = api.location_get(item_id).await?;
    let text = format!(
        "New location is {}, {}",
        format_coord(location.latitude),
        format_coord(location.longitude)
    );

    let item = TimelineItem::text(text)
        .with_location(location)
        .with_menu_item(MenuAction::Navigate);
    api.timeline_insert(&item).await?;
    Ok(())
}

fn format_coord(coord: Option<f64>) -> String {
    match coord {
        Some(v) => v.to_string(),
        None => "unknown".to_string(),
    }
}

/// Note ingestor: act on the FIRST `LAUNCH` action and stop scanning.
///
/// The persisted note snapshots the author's display name and approval
/// flag at creation time; the approval flag is never re-evaluated later.
/// A payload without any `LAUNCH` action produces no note.
async fn ingest_timeline_notification(
    api: &impl MirrorApi,
    credentials: &CredentialStore,
    notes: &NoteStore,
    payload: &NotificationPayload,
) -> Result<()> {
    for action in &payload.user_actions {
        if !action.is_launch() {
            tracing::info!(
                action = action.action_type.as_deref().unwrap_or("<untyped>"),
                "I don't know what to do with this notification action"
            );
            continue;
        }

        let item_id = match payload.item_id.as_deref() {
            Some(id) => id,
            None => {
                tracing::warn!("Reply notification without itemId, dropping");
                return Ok(());
            }
        };

        let item = api.timeline_get(item_id).await?;
        let text = item.text.unwrap_or_default();

        let creator_id = payload.user_token.as_str();
        let creator_name = credentials.get_display_name(creator_id);
        let approved = credentials.get_approved(creator_id).unwrap_or(false);

        let note = notes.insert(&text, creator_id, creator_name, approved);
        tracing::info!(
            note_id = note.id.as_str(),
            user = creator_id,
            public = note.public,
            "Reply received"
        );

        // First match wins; later actions in the same payload are ignored.
        break;
    }

    Ok(())
}
