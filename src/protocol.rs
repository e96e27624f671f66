//! Wire types for the bridge.
//!
//! Two surfaces speak JSON here:
//!
//! 1. **Inbound webhook**: the mirror service POSTs notification payloads
//!    to `/notify` describing what changed (`locations` or `timeline`) and
//!    which user it concerns.
//!
//! 2. **Outbound mirror API**: timeline items, subscriptions and contacts
//!    the bridge writes back through per-user authenticated clients, plus
//!    the batched-call envelope used for broadcasts.

use serde::{Deserialize, Serialize};

// ── Inbound: webhook notifications ────────────────────────────────────────────

/// A push notification delivered by the mirror service.
///
/// Lives only for the duration of one webhook request; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Stable external identity of the user this notification concerns.
    pub user_token: String,

    /// Which sub-resource changed. Anything other than `locations` or
    /// `timeline` is ignored by design.
    #[serde(default)]
    pub collection: Option<String>,

    /// Id of the changed item, resolved through the authenticated client.
    #[serde(default)]
    pub item_id: Option<String>,

    /// Ordered user-interaction events attached to the notification.
    #[serde(default)]
    pub user_actions: Vec<UserAction>,
}

impl NotificationPayload {
    /// Resolve the collection tag into the routing enum.
    pub fn collection(&self) -> Collection {
        match self.collection.as_deref() {
            Some("locations") => Collection::Locations,
            Some("timeline") => Collection::Timeline,
            _ => Collection::Other,
        }
    }
}

/// Routing target derived from the payload's collection tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Locations,
    Timeline,
    /// Unknown or absent collection. Handled as a silent no-op.
    Other,
}

/// One user-interaction event inside a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAction {
    /// Event type, e.g. `LAUNCH` for a reply to a timeline item.
    #[serde(rename = "type", default)]
    pub action_type: Option<String>,

    /// Any extra event-specific fields, kept opaque.
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl UserAction {
    /// Whether this action is a reply event (the only type acted on).
    pub fn is_launch(&self) -> bool {
        self.action_type.as_deref() == Some("LAUNCH")
    }
}

// ── Outbound: mirror-service resources ────────────────────────────────────────

/// A timeline card inserted into a user's timeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Rendered instead of `text` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<Creator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_items: Option<Vec<MenuItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationConfig>,
}

impl TimelineItem {
    /// A plain text card with default notification level.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            notification: Some(NotificationConfig::default_level()),
            ..Self::default()
        }
    }

    /// An html card with default notification level.
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: Some(vec![html.into()]),
            notification: Some(NotificationConfig::default_level()),
            ..Self::default()
        }
    }

    pub fn with_menu_item(mut self, action: MenuAction) -> Self {
        self.menu_items
            .get_or_insert_with(Vec::new)
            .push(MenuItem { action });
        self
    }

    pub fn with_creator(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.creator = Some(Creator {
            id: Some(id.into()),
            display_name: Some(name.into()),
        });
        self
    }

    pub fn with_location(mut self, location: LocationInfo) -> Self {
        self.location = Some(location);
        self
    }
}

/// Attribution shown on a timeline card.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// A menu entry attached to a timeline card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItem {
    pub action: MenuAction,
}

/// Built-in menu actions the mirror service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MenuAction {
    Navigate,
    Reply,
    TogglePinned,
}

/// How prominently the card is announced to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub level: NotificationLevel,
}

impl NotificationConfig {
    pub fn default_level() -> Self {
        Self {
            level: NotificationLevel::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationLevel {
    Default,
}

/// A geographic fix returned by `locations.get`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// A webhook subscription registered with the mirror service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub collection: String,
    pub user_token: String,
    pub callback_url: String,
}

/// A share target registered with the mirror service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub display_name: String,
    pub image_urls: Vec<String>,
}

// ── Batched calls ─────────────────────────────────────────────────────────────

/// One logical sub-request inside a batched call.
///
/// The correlation id tags the sub-response back to the user it was
/// enqueued for; each sub-request carries its own bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub correlation_id: String,
    pub token: String,
    pub item: TimelineItem,
}

/// Per-item outcome of a batched call, delivered in wire-arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub correlation_id: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItemResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
