//! Event tracking — the fraud-resistant core.
//!
//! Turns a verified render into exactly one impression notification and a
//! user click into exactly one click notification. Impressions are gated on
//! the visibility verdict and deduplicated through the slot registry's
//! check-and-set; both event kinds leave the page over the unload-safe
//! beacon transport because either can race page teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_lock::RwLock;
use chrono::Utc;

use crate::domain::event::wire::{DebugKind, DebugLogBody, EventBody};
use crate::domain::event::{ClientMetadata, EventKind, RenderInfo, TrackingEvent};
use crate::fingerprint::ClientFingerprint;
use crate::http::SovHttp;
use crate::registry::{ClaimOutcome, SlotRegistry};
use crate::shared::{AdId, CampaignId, ConsumerId, SiteId};

/// Tracks impressions and clicks for live slots.
pub struct EventTracker {
    http: SovHttp,
    registry: Arc<RwLock<SlotRegistry>>,
    fingerprint: ClientFingerprint,
    site_id: SiteId,
    default_consumer_id: Option<ConsumerId>,
    debug: bool,
    destroyed: Arc<AtomicBool>,
}

impl EventTracker {
    pub(crate) fn new(
        http: SovHttp,
        registry: Arc<RwLock<SlotRegistry>>,
        fingerprint: ClientFingerprint,
        site_id: SiteId,
        default_consumer_id: Option<ConsumerId>,
        debug: bool,
        destroyed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            http,
            registry,
            fingerprint,
            site_id,
            default_consumer_id,
            debug,
            destroyed,
        }
    }

    /// Record a tracking event for an ad.
    ///
    /// Impressions require a `viewport_visible` verdict and are delivered at
    /// most once per slot lifetime; a duplicate is a silent no-op. Clicks are
    /// always allowed and attach the slot's render verification when
    /// available. Never errors toward the caller; delivery problems are
    /// debug-logged only.
    pub async fn track_event(
        &self,
        kind: EventKind,
        ad_id: &AdId,
        campaign_id: &CampaignId,
        render_info: Option<RenderInfo>,
    ) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }

        let (render_info, consumer_id) = match kind {
            EventKind::Impression => {
                let info = match render_info {
                    Some(info) if info.viewport_visible => info,
                    _ => {
                        tracing::debug!(ad_id = %ad_id, "Impression without visibility verdict, ignored");
                        return;
                    }
                };

                // Check-and-set under one write acquisition. No await between
                // the check and the set, so a synchronous double-call cannot
                // claim twice.
                let mut registry = self.registry.write().await;
                match registry.claim_impression(ad_id) {
                    ClaimOutcome::Claimed => {}
                    ClaimOutcome::AlreadyTracked => {
                        return;
                    }
                    ClaimOutcome::UnknownAd => {
                        tracing::debug!(ad_id = %ad_id, "Impression for unknown slot, ignored");
                        return;
                    }
                }
                let consumer = registry
                    .find_by_ad(ad_id)
                    .and_then(|entry| entry.ad.consumer_id.clone());
                drop(registry);

                (Some(info), consumer)
            }
            EventKind::Click => {
                let registry = self.registry.read().await;
                let entry = registry.find_by_ad(ad_id);
                let info = render_info.or_else(|| entry.and_then(|e| e.render_info));
                let consumer = entry.and_then(|e| e.ad.consumer_id.clone());
                drop(registry);

                (info, consumer)
            }
        };

        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }

        let metadata = ClientMetadata {
            fingerprint: self.fingerprint.clone(),
            site_id: self.site_id.clone(),
            timestamp: Utc::now(),
            consumer_id: consumer_id.or_else(|| self.default_consumer_id.clone()),
        };
        let event = TrackingEvent::new(
            kind,
            ad_id.clone(),
            campaign_id.clone(),
            render_info,
            metadata,
        );

        // Both kinds can fire from a context the page is about to tear down
        // (visibility callbacks, click-through navigation), so they take the
        // unload-safe path rather than the retrying one.
        self.http.send_beacon(&EventBody::from(&event));

        self.debug_interaction(&event).await;
    }

    /// Emit an `SDK_REQUEST` debug record. No-op unless debug mode is on.
    pub async fn debug_request(&self, message: &str, context: Option<serde_json::Value>) {
        self.debug_log(DebugKind::SdkRequest, message, context).await;
    }

    async fn debug_interaction(&self, event: &TrackingEvent) {
        let context = serde_json::json!({
            "eventId": event.id,
            "adId": event.ad_id.as_str(),
            "campaignId": event.campaign_id.as_str(),
        });
        self.debug_log(
            DebugKind::SdkInteraction,
            event.kind.as_str(),
            Some(context),
        )
        .await;
    }

    async fn debug_log(&self, kind: DebugKind, message: &str, context: Option<serde_json::Value>) {
        if !self.debug || self.destroyed.load(Ordering::SeqCst) {
            return;
        }

        let body = DebugLogBody {
            kind,
            site_id: self.site_id.to_string(),
            message: message.to_string(),
            context,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.http.post_debug_log(&body).await {
            tracing::debug!("Debug log delivery failed: {}", e);
        }
    }
}
