//! High-level client — `SovAdsClient`.
//!
//! The public entry point: composes the fingerprint, site resolver, HTTP
//! layer, slot registry, render observer, and event tracker behind an
//! explicit construction/teardown lifecycle. Nothing here throws into the
//! embedding page; the only observable failure mode is `load_ad` returning
//! `None`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_lock::RwLock;
use tokio::time::Instant;

use crate::domain::ad::AdComponent;
use crate::domain::event::{EventKind, RenderInfo};
use crate::error::SdkError;
use crate::fingerprint::{self, ClientFingerprint, EnvSignals};
use crate::http::SovHttp;
use crate::observer::{self, AdElement, ObserverConfig};
use crate::registry::{RenderState, SlotRegistry};
use crate::shared::{ConsumerId, ContainerId, SiteId};
use crate::site;
use crate::tracker::EventTracker;

/// The primary entry point for the SovAds SDK.
///
/// One instance per embedding context. Construct with [`SovAdsClient::builder`],
/// tear down with [`SovAdsClient::destroy`]; there is no implicit process-wide
/// singleton (a wrapper layer may memoize one instance per page if it wants).
pub struct SovAdsClient {
    http: SovHttp,
    tracker: Arc<EventTracker>,
    registry: Arc<RwLock<SlotRegistry>>,
    observer_config: ObserverConfig,
    site_id: SiteId,
    fingerprint: ClientFingerprint,
    default_consumer_id: Option<ConsumerId>,
    destroyed: Arc<AtomicBool>,
}

impl SovAdsClient {
    pub fn builder() -> SovAdsClientBuilder {
        SovAdsClientBuilder::default()
    }

    /// The session-stable client fingerprint.
    pub fn fingerprint(&self) -> &ClientFingerprint {
        &self.fingerprint
    }

    /// The resolved publisher site id.
    pub fn site_id(&self) -> &SiteId {
        &self.site_id
    }

    /// The event tracker, for wrappers that report events directly.
    pub fn tracker(&self) -> &EventTracker {
        &self.tracker
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    // ── Ad loading ───────────────────────────────────────────────────────

    /// Fetch a candidate creative for the resolved site.
    ///
    /// Resolves to `None` on network exhaustion or when the creative fails
    /// validation (a malformed target URL never reaches the presentation
    /// layer). Never panics or surfaces an error into the host page.
    pub async fn load_ad(&self, consumer_id: Option<&str>) -> Option<AdComponent> {
        if self.is_destroyed() {
            return None;
        }

        let consumer = consumer_id
            .map(str::to_string)
            .or_else(|| self.default_consumer_id.as_ref().map(|c| c.to_string()));

        self.tracker
            .debug_request(
                "ad request",
                Some(serde_json::json!({
                    "siteId": self.site_id.as_str(),
                    "consumerId": consumer,
                })),
            )
            .await;

        let resp = match self.http.get_ad(&self.site_id, consumer.as_deref()).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!("Ad request failed: {}", e);
                return None;
            }
        };

        match AdComponent::try_from(resp) {
            Ok(ad) => Some(ad),
            Err(e) => {
                tracing::warn!("Discarding creative: {}", e);
                None
            }
        }
    }

    // ── Slot lifecycle ───────────────────────────────────────────────────

    /// Register a loaded creative under a container id.
    pub async fn add_component(
        &self,
        container_id: ContainerId,
        ad: AdComponent,
    ) -> Result<(), SdkError> {
        if self.is_destroyed() {
            return Err(SdkError::Other("client destroyed".into()));
        }
        let mut registry = self.registry.write().await;
        registry.add(container_id, ad)?;
        Ok(())
    }

    /// The creative currently mounted under a container id, if any.
    pub async fn get_component(&self, container_id: &ContainerId) -> Option<AdComponent> {
        let registry = self.registry.read().await;
        registry.get(container_id).map(|entry| entry.ad.clone())
    }

    /// Attach the render-visibility observer to a mounted slot.
    ///
    /// On the verified-visible verdict the slot's render info is recorded,
    /// the slot moves to `rendered`, and exactly one impression fires
    /// through the tracker. A `false` verdict records the failed
    /// verification and fires nothing.
    pub async fn observe_slot(
        &self,
        container_id: &ContainerId,
        element: Arc<dyn AdElement>,
    ) -> Result<(), SdkError> {
        if self.is_destroyed() {
            return Ok(());
        }

        let mut registry = self.registry.write().await;
        registry.transition(container_id, RenderState::Rendering)?;
        let ad_id = match registry.get(container_id) {
            Some(entry) => entry.ad.id.clone(),
            None => return Ok(()),
        };

        let started = Instant::now();
        let tracker = Arc::clone(&self.tracker);
        let slot_registry = Arc::clone(&self.registry);
        let destroyed = Arc::clone(&self.destroyed);
        let slot = container_id.clone();
        let observed_ad = ad_id.clone();

        let handle = observer::setup_render_observer(
            element,
            ad_id,
            self.observer_config.clone(),
            move |visible| {
                // The verdict arrives on the observer task; finish the slot
                // bookkeeping and delivery on a task of its own.
                tokio::spawn(async move {
                    if destroyed.load(Ordering::SeqCst) {
                        return;
                    }

                    let info = RenderInfo {
                        rendered: true,
                        viewport_visible: visible,
                        render_time_ms: started.elapsed().as_millis() as u64,
                    };

                    let campaign_id = {
                        let mut registry = slot_registry.write().await;
                        // The slot may have been removed while the verdict
                        // was in flight.
                        let Some(entry) = registry.get_mut(&slot) else {
                            return;
                        };
                        entry.render_info = Some(info);
                        let campaign_id = entry.ad.campaign_id.clone();
                        if visible {
                            let _ = registry.transition(&slot, RenderState::Rendered);
                        }
                        campaign_id
                    };

                    if visible {
                        tracker
                            .track_event(
                                EventKind::Impression,
                                &observed_ad,
                                &campaign_id,
                                Some(info),
                            )
                            .await;
                    }
                });
            },
        );

        if let Some(entry) = registry.get_mut(container_id) {
            entry.observer = Some(handle);
        } else {
            handle.unsubscribe();
        }
        Ok(())
    }

    /// Record a user click on a slot. Clicks are not visibility-gated.
    pub async fn track_click(&self, container_id: &ContainerId) {
        if self.is_destroyed() {
            return;
        }

        let (ad_id, campaign_id, render_info) = {
            let registry = self.registry.read().await;
            match registry.get(container_id) {
                Some(entry) => (
                    entry.ad.id.clone(),
                    entry.ad.campaign_id.clone(),
                    entry.render_info,
                ),
                None => {
                    tracing::debug!(container = %container_id, "Click on unknown slot, ignored");
                    return;
                }
            }
        };

        self.tracker
            .track_event(EventKind::Click, &ad_id, &campaign_id, render_info)
            .await;
    }

    /// Detach a slot: stop its observation and free its container id.
    pub async fn remove_component(&self, container_id: &ContainerId) {
        let entry = {
            let mut registry = self.registry.write().await;
            registry.remove(container_id)
        };
        if let Some(entry) = entry {
            if let Some(observer) = &entry.observer {
                observer.unsubscribe();
            }
        }
    }

    /// Scoped teardown.
    ///
    /// Releases every observer registration, clears the registry, and
    /// cancels pending retries. No tracking call delivers after this
    /// returns.
    pub async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.http.close();

        let entries = {
            let mut registry = self.registry.write().await;
            registry.drain()
        };
        for entry in &entries {
            if let Some(observer) = &entry.observer {
                observer.unsubscribe();
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Builder
// ═════════════════════════════════════════════════════════════════════════════

pub struct SovAdsClientBuilder {
    site_id: Option<String>,
    page_host: Option<String>,
    api_url: String,
    debug: bool,
    consumer_id: Option<String>,
    observer_config: ObserverConfig,
}

impl Default for SovAdsClientBuilder {
    fn default() -> Self {
        Self {
            site_id: None,
            page_host: None,
            api_url: crate::network::DEFAULT_API_URL.to_string(),
            debug: false,
            consumer_id: None,
            observer_config: ObserverConfig::default(),
        }
    }
}

impl SovAdsClientBuilder {
    /// Explicit publisher site id. Overrides host-based detection.
    pub fn site_id(mut self, id: &str) -> Self {
        self.site_id = Some(id.to_string());
        self
    }

    /// Host of the embedding page, used to derive the site id when no
    /// explicit override is configured.
    pub fn page_host(mut self, host: &str) -> Self {
        self.page_host = Some(host.to_string());
        self
    }

    pub fn api_url(mut self, url: &str) -> Self {
        self.api_url = url.to_string();
        self
    }

    /// Enable verbose logging plus the debug-log delivery channel.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Default end-user correlation id attached to events.
    pub fn consumer_id(mut self, id: &str) -> Self {
        self.consumer_id = Some(id.to_string());
        self
    }

    /// Visibility policy (threshold, polling cadence and bound).
    pub fn observer_config(mut self, config: ObserverConfig) -> Self {
        self.observer_config = config;
        self
    }

    pub fn build(self) -> Result<SovAdsClient, SdkError> {
        let site_id = site::detect_site_id(self.site_id.as_deref(), self.page_host.as_deref());
        let fingerprint = fingerprint::generate(&EnvSignals);
        let http = SovHttp::new(&self.api_url)?;
        let registry = Arc::new(RwLock::new(SlotRegistry::new()));
        let destroyed = Arc::new(AtomicBool::new(false));
        let default_consumer_id = self.consumer_id.map(ConsumerId::from);

        let tracker = Arc::new(EventTracker::new(
            http.clone(),
            Arc::clone(&registry),
            fingerprint.clone(),
            site_id.clone(),
            default_consumer_id.clone(),
            self.debug,
            Arc::clone(&destroyed),
        ));

        Ok(SovAdsClient {
            http,
            tracker,
            registry,
            observer_config: self.observer_config,
            site_id,
            fingerprint,
            default_consumer_id,
            destroyed,
        })
    }
}
