//! Tracking event domain — event kinds, render verification, client metadata.

pub mod wire;

use crate::fingerprint::ClientFingerprint;
use crate::shared::{AdId, CampaignId, ConsumerId, SiteId};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Kind of a tracking event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Impression,
    Click,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Impression => "IMPRESSION",
            EventKind::Click => "CLICK",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Render verification produced once per slot by the visibility observer.
///
/// Consumed exactly once by the event tracker to gate impression counting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderInfo {
    pub rendered: bool,
    pub viewport_visible: bool,
    /// Milliseconds from observation start to the visibility verdict.
    pub render_time_ms: u64,
}

/// Metadata attached to every outbound event.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMetadata {
    pub fingerprint: ClientFingerprint,
    pub site_id: SiteId,
    pub timestamp: DateTime<Utc>,
    pub consumer_id: Option<ConsumerId>,
}

/// A tracking event, never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub ad_id: AdId,
    pub campaign_id: CampaignId,
    pub render_info: Option<RenderInfo>,
    pub metadata: ClientMetadata,
}

impl TrackingEvent {
    pub fn new(
        kind: EventKind,
        ad_id: AdId,
        campaign_id: CampaignId,
        render_info: Option<RenderInfo>,
        metadata: ClientMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            ad_id,
            campaign_id,
            render_info,
            metadata,
        }
    }
}
