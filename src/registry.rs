//! Slot registry — live ad slots keyed by container id.
//!
//! One entry per mounted slot, so each can be independently rendered,
//! observed, and torn down without contaminating others. The registry is the
//! SDK's only mutable shared state; the high-level client wraps it in a
//! single lock and every mutation site re-validates that its entry still
//! exists (a concurrent teardown may have removed it).

use std::collections::HashMap;

use crate::domain::ad::AdComponent;
use crate::domain::event::RenderInfo;
use crate::error::RegistryError;
use crate::observer::ObserverHandle;
use crate::shared::{AdId, ContainerId};

// ─── Render state ────────────────────────────────────────────────────────────

/// Lifecycle state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Rendering,
    Rendered,
    TornDown,
}

impl RenderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderState::Idle => "idle",
            RenderState::Rendering => "rendering",
            RenderState::Rendered => "rendered",
            RenderState::TornDown => "torn_down",
        }
    }

    /// Whether `next` is a legal successor of this state.
    fn allows(&self, next: RenderState) -> bool {
        matches!(
            (self, next),
            (RenderState::Idle, RenderState::Rendering)
                | (RenderState::Rendering, RenderState::Rendered)
                | (RenderState::Idle, RenderState::TornDown)
                | (RenderState::Rendering, RenderState::TornDown)
                | (RenderState::Rendered, RenderState::TornDown)
        )
    }
}

impl std::fmt::Display for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── Slot entry ──────────────────────────────────────────────────────────────

/// One live ad slot: the loaded creative plus its tracking state.
#[derive(Debug)]
pub struct SlotEntry {
    pub container_id: ContainerId,
    pub ad: AdComponent,
    pub render_state: RenderState,
    /// Transitions false→true exactly once per entry lifetime. Nothing may
    /// reset it while the entry is alive.
    pub has_tracked_impression: bool,
    /// Verification produced by the render observer, once available.
    pub render_info: Option<RenderInfo>,
    /// The slot's observation resource, detached on removal.
    pub observer: Option<ObserverHandle>,
}

/// Outcome of an impression claim.
#[derive(Debug, PartialEq)]
pub enum ClaimOutcome {
    /// First claim for this slot; the caller now owns delivery.
    Claimed,
    /// The impression was already tracked. Deliberate silent no-op upstream.
    AlreadyTracked,
    /// No live slot holds this ad (removed or never registered).
    UnknownAd,
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Strongly-typed table of live slots.
#[derive(Debug, Default)]
pub struct SlotRegistry {
    slots: HashMap<ContainerId, SlotEntry>,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot. At most one live entry per container id.
    pub fn add(&mut self, container_id: ContainerId, ad: AdComponent) -> Result<(), RegistryError> {
        if self.slots.contains_key(&container_id) {
            return Err(RegistryError::SlotOccupied(container_id));
        }
        self.slots.insert(
            container_id.clone(),
            SlotEntry {
                container_id,
                ad,
                render_state: RenderState::Idle,
                has_tracked_impression: false,
                render_info: None,
                observer: None,
            },
        );
        Ok(())
    }

    pub fn get(&self, container_id: &ContainerId) -> Option<&SlotEntry> {
        self.slots.get(container_id)
    }

    pub fn get_mut(&mut self, container_id: &ContainerId) -> Option<&mut SlotEntry> {
        self.slots.get_mut(container_id)
    }

    /// Remove a slot, returning its entry so the caller can detach the
    /// observer. The id is immediately reusable.
    pub fn remove(&mut self, container_id: &ContainerId) -> Option<SlotEntry> {
        self.slots.remove(container_id)
    }

    /// Remove every slot. Used by client teardown.
    pub fn drain(&mut self) -> Vec<SlotEntry> {
        self.slots.drain().map(|(_, entry)| entry).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Move a slot to `next`, validating the transition.
    pub fn transition(
        &mut self,
        container_id: &ContainerId,
        next: RenderState,
    ) -> Result<(), RegistryError> {
        let entry = self
            .slots
            .get_mut(container_id)
            .ok_or_else(|| RegistryError::UnknownSlot(container_id.clone()))?;

        if !entry.render_state.allows(next) {
            return Err(RegistryError::InvalidTransition {
                from: entry.render_state.to_string(),
                to: next.to_string(),
            });
        }
        entry.render_state = next;
        Ok(())
    }

    /// Find the slot currently holding `ad_id`.
    pub fn find_by_ad(&self, ad_id: &AdId) -> Option<&SlotEntry> {
        self.slots.values().find(|entry| &entry.ad.id == ad_id)
    }

    /// Atomically check-and-set the impression flag for the slot holding
    /// `ad_id`.
    ///
    /// Callers must hold the registry lock across this call; there is no
    /// await inside, so the check and the set cannot be interleaved.
    pub fn claim_impression(&mut self, ad_id: &AdId) -> ClaimOutcome {
        let entry = self
            .slots
            .values_mut()
            .find(|entry| &entry.ad.id == ad_id);

        match entry {
            None => ClaimOutcome::UnknownAd,
            Some(entry) if entry.has_tracked_impression => ClaimOutcome::AlreadyTracked,
            Some(entry) => {
                entry.has_tracked_impression = true;
                ClaimOutcome::Claimed
            }
        }
    }
}
