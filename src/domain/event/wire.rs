//! Wire types for event delivery and debug logging (REST).

use crate::domain::event::{ClientMetadata, RenderInfo, TrackingEvent};
use crate::shared::serde_util;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body for `POST /events`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventBody {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub ad_id: String,
    pub campaign_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_info: Option<RenderInfoBody>,
    pub client_metadata: MetadataBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderInfoBody {
    pub rendered: bool,
    pub viewport_visible: bool,
    #[serde(rename = "renderTime")]
    pub render_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBody {
    pub fingerprint: String,
    pub site_id: String,
    #[serde(with = "serde_util::timestamp_ms")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_id: Option<String>,
}

impl From<&RenderInfo> for RenderInfoBody {
    fn from(info: &RenderInfo) -> Self {
        Self {
            rendered: info.rendered,
            viewport_visible: info.viewport_visible,
            render_time_ms: info.render_time_ms,
        }
    }
}

impl From<&ClientMetadata> for MetadataBody {
    fn from(meta: &ClientMetadata) -> Self {
        Self {
            fingerprint: meta.fingerprint.to_string(),
            site_id: meta.site_id.to_string(),
            timestamp: meta.timestamp,
            consumer_id: meta.consumer_id.as_ref().map(|c| c.to_string()),
        }
    }
}

impl From<&TrackingEvent> for EventBody {
    fn from(event: &TrackingEvent) -> Self {
        Self {
            id: event.id,
            kind: event.kind.as_str().to_string(),
            ad_id: event.ad_id.to_string(),
            campaign_id: event.campaign_id.to_string(),
            render_info: event.render_info.as_ref().map(RenderInfoBody::from),
            client_metadata: MetadataBody::from(&event.metadata),
        }
    }
}

// ─── Debug log channel ───────────────────────────────────────────────────────

/// Structured debug payload kind for `POST /debug/log`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DebugKind {
    #[serde(rename = "SDK_REQUEST")]
    SdkRequest,
    #[serde(rename = "SDK_INTERACTION")]
    SdkInteraction,
}

/// Body for `POST /debug/log`. Only sent when debug mode is enabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DebugLogBody {
    pub kind: DebugKind,
    pub site_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(with = "serde_util::timestamp_ms")]
    pub timestamp: DateTime<Utc>,
}
