//! Render-visibility observation.
//!
//! Determines, asynchronously, whether a mounted creative actually entered
//! the viewport. Visibility is a gate, not a continuous stream: each
//! observation fires its callback at most once and then stops.
//!
//! Primary strategy: consume the platform's intersection event stream.
//! Fallback when that capability is absent: poll the element's bounding
//! geometry on a fixed interval, bounded in total duration.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::shared::AdId;

// ─── Geometry ────────────────────────────────────────────────────────────────

/// Bounding box of an element, relative to the viewport origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Viewport dimensions of the hosting page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Fraction of this rect's area that lies inside the viewport.
    ///
    /// Zero-area rects are never visible.
    pub fn intersection_ratio(&self, viewport: &Viewport) -> f64 {
        let area = self.width * self.height;
        if area <= 0.0 {
            return 0.0;
        }

        let left = self.x.max(0.0);
        let top = self.y.max(0.0);
        let right = (self.x + self.width).min(viewport.width);
        let bottom = (self.y + self.height).min(viewport.height);

        let visible_w = (right - left).max(0.0);
        let visible_h = (bottom - top).max(0.0);
        (visible_w * visible_h) / area
    }
}

// ─── Element probe ───────────────────────────────────────────────────────────

/// Intersection ratio updates pushed by the platform's observation API.
pub type IntersectionStream = Pin<Box<dyn Stream<Item = f64> + Send>>;

/// A mounted creative's container, as exposed by the embedding layer.
pub trait AdElement: Send + Sync + 'static {
    /// Current bounding box. `None` once the element left the document.
    fn bounds(&self) -> Option<Rect>;

    /// Current viewport dimensions.
    fn viewport(&self) -> Viewport;

    /// Push-based intersection updates, when the platform supports them.
    ///
    /// Returning `None` selects the manual-polling fallback; that is a
    /// capability gap, not an error.
    fn intersection_events(&self) -> Option<IntersectionStream> {
        None
    }
}

// ─── Config ──────────────────────────────────────────────────────────────────

/// Visibility policy constants. Defaults are deliberately conservative and
/// every knob is overridable by the embedder.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    /// Intersection ratio at which the creative counts as visible.
    pub visibility_threshold: f64,
    /// Polling cadence for the fallback strategy.
    pub poll_interval: Duration,
    /// Upper bound on total fallback polling, after which `false` is reported.
    pub max_poll_duration: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.5,
            poll_interval: Duration::from_millis(200),
            max_poll_duration: Duration::from_secs(10),
        }
    }
}

// ─── Subscription handle ─────────────────────────────────────────────────────

/// Owner of one observation resource.
///
/// `unsubscribe` stops the observation and guarantees the callback will not
/// fire afterwards. Dropping the handle without unsubscribing leaves the
/// observation running (the registry owns handles for exactly this reason).
pub struct ObserverHandle {
    cancelled: Arc<AtomicBool>,
    fired: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ObserverHandle {
    /// Stop observing. Idempotent; no callback fires after this returns.
    pub fn unsubscribe(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }

    /// Whether the visibility verdict has already been delivered.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("fired", &self.has_fired())
            .finish()
    }
}

/// At-most-once callback dispatch, gated on the cancellation flag.
struct OneShot {
    callback: Option<Box<dyn FnOnce(bool) + Send>>,
    cancelled: Arc<AtomicBool>,
    fired: Arc<AtomicBool>,
}

impl OneShot {
    fn fire(&mut self, visible: bool) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(cb) = self.callback.take() {
            cb(visible);
        }
    }
}

// ─── Observation ─────────────────────────────────────────────────────────────

/// Attach a one-shot render observer to a mounted creative's container.
///
/// The callback receives the visibility verdict exactly once:
/// - `true` as soon as the intersection ratio crosses the threshold,
///   including the element already being visible at registration time;
/// - `false` when the element leaves the document first, or when fallback
///   polling exhausts its duration bound.
pub fn setup_render_observer(
    element: Arc<dyn AdElement>,
    ad_id: AdId,
    config: ObserverConfig,
    callback: impl FnOnce(bool) + Send + 'static,
) -> ObserverHandle {
    let cancelled = Arc::new(AtomicBool::new(false));
    let fired = Arc::new(AtomicBool::new(false));

    let mut shot = OneShot {
        callback: Some(Box::new(callback)),
        cancelled: Arc::clone(&cancelled),
        fired: Arc::clone(&fired),
    };

    let task = tokio::spawn(async move {
        // Already-visible fast path: no intersection change will come for an
        // element that is fully in view at registration, so check eagerly.
        if visible_now(element.as_ref(), config.visibility_threshold) {
            shot.fire(true);
            return;
        }

        match element.intersection_events() {
            Some(events) => {
                watch_intersections(events, config.visibility_threshold, &mut shot).await;
            }
            None => {
                tracing::debug!(ad_id = %ad_id, "Intersection observation unavailable, polling");
                poll_geometry(element.as_ref(), &config, &mut shot).await;
            }
        }
    });

    ObserverHandle {
        cancelled,
        fired,
        task,
    }
}

fn visible_now(element: &dyn AdElement, threshold: f64) -> bool {
    match element.bounds() {
        Some(rect) => rect.intersection_ratio(&element.viewport()) >= threshold,
        None => false,
    }
}

async fn watch_intersections(mut events: IntersectionStream, threshold: f64, shot: &mut OneShot) {
    while let Some(ratio) = events.next().await {
        if ratio >= threshold {
            shot.fire(true);
            return;
        }
    }
    // Stream ended before the threshold was crossed: the element was
    // removed from the document.
    shot.fire(false);
}

async fn poll_geometry(element: &dyn AdElement, config: &ObserverConfig, shot: &mut OneShot) {
    let deadline = Instant::now() + config.max_poll_duration;

    loop {
        if Instant::now() >= deadline {
            shot.fire(false);
            return;
        }

        futures_timer::Delay::new(config.poll_interval).await;

        match element.bounds() {
            None => {
                // Element left the document while we were waiting.
                shot.fire(false);
                return;
            }
            Some(rect) => {
                if rect.intersection_ratio(&element.viewport()) >= config.visibility_threshold {
                    shot.fire(true);
                    return;
                }
            }
        }
    }
}
