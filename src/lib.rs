//! # SovAds SDK
//!
//! An embeddable ad-delivery and fraud-resistant tracking client for the
//! SovAds network. The SDK decides *whether an impression counts* — a
//! creative must be verifiably rendered and in-viewport before it is billed —
//! and *how that fact gets off the page reliably*, even mid-teardown. It does
//! not select auction winners or style creatives.
//!
//! ## Architecture
//!
//! The SDK is organized in layers:
//!
//! 1. **Core** — Shared newtypes, domain models, fingerprinting, site
//!    resolution, the render-visibility observer, the slot registry (always
//!    available)
//! 2. **HTTP** — `SovHttp` with per-endpoint retry policies and an
//!    unload-safe beacon path
//! 3. **High-Level Client** — `SovAdsClient` with the slot lifecycle and the
//!    event tracker
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sovads::prelude::*;
//!
//! let client = SovAdsClient::builder()
//!     .page_host("news.example.com")
//!     .build()?;
//!
//! if let Some(ad) = client.load_ad(None).await {
//!     client.add_component(ContainerId::from("slot-1"), ad).await?;
//!     client.observe_slot(&ContainerId::from("slot-1"), element).await?;
//! }
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared newtypes used across all domains.
pub mod shared;

/// Domain modules (vertical slices): types, wire types, conversions.
pub mod domain;

/// Session-stable client fingerprinting.
pub mod fingerprint;

/// Publisher site resolution.
pub mod site;

/// Render-visibility observation.
pub mod observer;

/// Live ad slot registry.
pub mod registry;

/// Unified SDK error types.
pub mod error;

/// Network URL constants.
pub mod network;

// ── Layer 2: HTTP ────────────────────────────────────────────────────────────

/// HTTP client with retry policies and the unload-safe beacon.
#[cfg(feature = "http")]
pub mod http;

// ── Layer 3: High-Level Client ───────────────────────────────────────────────

/// Event tracking — impressions, clicks, dedupe.
#[cfg(feature = "http")]
pub mod tracker;

/// `SovAdsClient` — the primary entry point.
#[cfg(feature = "http")]
pub mod client;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared newtypes
    pub use crate::shared::{AdId, CampaignId, ConsumerId, ContainerId, SiteId};

    // Domain types — ad
    pub use crate::domain::ad::{AdComponent, AdValidationError};

    // Domain types — event
    pub use crate::domain::event::{ClientMetadata, EventKind, RenderInfo, TrackingEvent};

    // Fingerprint + site resolution
    pub use crate::fingerprint::{ClientFingerprint, EnvSignals, SignalSource};
    pub use crate::site::detect_site_id;

    // Observer
    pub use crate::observer::{
        setup_render_observer, AdElement, IntersectionStream, ObserverConfig, ObserverHandle,
        Rect, Viewport,
    };

    // Registry
    pub use crate::registry::{ClaimOutcome, RenderState, SlotEntry, SlotRegistry};

    // Errors
    pub use crate::error::{HttpError, RegistryError, SdkError};

    // Network
    pub use crate::network::DEFAULT_API_URL;

    // HTTP + client
    #[cfg(feature = "http")]
    pub use crate::client::{SovAdsClient, SovAdsClientBuilder};
    #[cfg(feature = "http")]
    pub use crate::http::retry::{RetryConfig, RetryPolicy};
    #[cfg(feature = "http")]
    pub use crate::http::SovHttp;
    #[cfg(feature = "http")]
    pub use crate::tracker::EventTracker;
}
