//! Shadow Caster Registry
//!
//! Generational slot storage for registered casters. Each renderer instance
//! owns one registry; it is written only from the main/update thread and
//! read (never mutated) by the culling pass through [`ShadowCasterRegistry::build_candidates`].
//!
//! Freed slots go to a FIFO queue and are reused oldest first. A slot's
//! generation is bumped when it is freed, so every handle issued for the
//! previous occupant stops validating.

use std::collections::VecDeque;
use std::ops::Range;

use penumbra_structures::Handle;
use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;
use crate::culler::CullCandidate;
use crate::error::{ShadowError, ShadowResult};

/// Handle to a registered caster
pub type CasterHandle = Handle<CasterRecord>;

/// Slots reserved on first growth
pub const MIN_REGISTRY_CAPACITY: usize = 64;

/// Range into a host-owned renderer list
///
/// The registry never looks inside; it hands the range back to the host's
/// draw sink for every caster that makes it into the atlas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RendererRange {
    pub start: u32,
    pub count: u32,
}

impl RendererRange {
    pub const EMPTY: Self = Self { start: 0, count: 0 };

    #[inline]
    pub const fn new(start: u32, count: u32) -> Self {
        Self { start, count }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// As a `usize` range for slicing the host's list
    #[inline]
    pub fn range(&self) -> Range<usize> {
        let start = self.start as usize;
        start..start + self.count as usize
    }
}

/// Per-slot caster state
#[derive(Clone, Debug)]
pub struct CasterRecord {
    bounds: Aabb,
    enabled: bool,
    renderers: RendererRange,
    generation: u32,
    live: bool,
}

impl CasterRecord {
    /// World-space bounds
    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn renderers(&self) -> RendererRange {
        self.renderers
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// Generational registry of shadow casters
#[derive(Debug, Default)]
pub struct ShadowCasterRegistry {
    records: Vec<CasterRecord>,
    free: VecDeque<u32>,
    live: usize,
}

impl ShadowCasterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with room for `capacity` casters before the first growth
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            free: VecDeque::new(),
            live: 0,
        }
    }

    /// Register a caster with no renderers attached yet
    pub fn register(&mut self, initial_bounds: Aabb) -> CasterHandle {
        self.register_with_renderers(initial_bounds, RendererRange::EMPTY)
    }

    /// Register a caster drawing `renderers` from the host's list
    pub fn register_with_renderers(
        &mut self,
        initial_bounds: Aabb,
        renderers: RendererRange,
    ) -> CasterHandle {
        let handle = if let Some(index) = self.free.pop_front() {
            let record = &mut self.records[index as usize];
            record.bounds = initial_bounds;
            record.enabled = true;
            record.renderers = renderers;
            record.live = true;
            CasterHandle::new(index, record.generation)
        } else {
            self.grow_if_full();
            let index = self.records.len();
            assert!(
                index < CasterHandle::NULL_INDEX as usize,
                "shadow caster registry exhausted"
            );
            self.records.push(CasterRecord {
                bounds: initial_bounds,
                enabled: true,
                renderers,
                generation: 0,
                live: true,
            });
            CasterHandle::new(index as u32, 0)
        };

        self.live += 1;
        log::trace!("registered shadow caster {}", handle);
        handle
    }

    /// Free a caster's slot
    ///
    /// Returns `false` if the handle is stale.
    pub fn unregister(&mut self, handle: CasterHandle) -> bool {
        let Some(record) = self.record_mut(handle) else {
            return false;
        };

        record.bounds = Aabb::ZERO;
        record.enabled = false;
        record.renderers = RendererRange::EMPTY;
        record.live = false;
        record.generation = record.generation.wrapping_add(1);

        self.free.push_back(handle.index());
        self.live -= 1;
        log::trace!("unregistered shadow caster {}", handle);
        true
    }

    /// Check whether `handle` still refers to a live caster
    pub fn is_valid(&self, handle: CasterHandle) -> bool {
        self.record(handle).is_some()
    }

    /// Replace a caster's world bounds; `false` if the handle is stale
    pub fn update_bounds(&mut self, handle: CasterHandle, bounds: Aabb) -> bool {
        match self.record_mut(handle) {
            Some(record) => {
                record.bounds = bounds;
                true
            }
            None => false,
        }
    }

    /// World bounds of a live caster
    pub fn bounds(&self, handle: CasterHandle) -> Option<Aabb> {
        self.record(handle).map(|r| r.bounds)
    }

    /// Checked variant of [`ShadowCasterRegistry::bounds`]
    pub fn try_bounds(&self, handle: CasterHandle) -> ShadowResult<Aabb> {
        self.bounds(handle).ok_or(ShadowError::StaleHandle(handle))
    }

    /// Include or exclude a caster from culling; `false` if stale
    pub fn set_enabled(&mut self, handle: CasterHandle, enabled: bool) -> bool {
        match self.record_mut(handle) {
            Some(record) => {
                record.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, handle: CasterHandle) -> Option<bool> {
        self.record(handle).map(|r| r.enabled)
    }

    /// Point a caster at a different renderer range; `false` if stale
    pub fn set_renderers(&mut self, handle: CasterHandle, renderers: RendererRange) -> bool {
        match self.record_mut(handle) {
            Some(record) => {
                record.renderers = renderers;
                true
            }
            None => false,
        }
    }

    pub fn renderers(&self, handle: CasterHandle) -> Option<RendererRange> {
        self.record(handle).map(|r| r.renderers)
    }

    /// Record of a live caster
    pub fn get(&self, handle: CasterHandle) -> Option<&CasterRecord> {
        self.record(handle)
    }

    /// Clear `out` and fill it with every live caster in slot order
    pub fn build_candidates(&self, out: &mut Vec<CullCandidate>) {
        out.clear();
        out.reserve(self.live);
        out.extend(self.iter().map(|(handle, record)| CullCandidate {
            handle,
            bounds: record.bounds,
            enabled: record.enabled,
            renderers: record.renderers,
        }));
    }

    /// Iterate over live casters
    pub fn iter(&self) -> impl Iterator<Item = (CasterHandle, &CasterRecord)> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.live)
            .map(|(i, r)| (CasterHandle::new(i as u32, r.generation), r))
    }

    /// Number of live casters
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots ever allocated (live and free)
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.records.len()
    }

    /// Slots available before the next growth
    #[inline]
    pub fn capacity(&self) -> usize {
        self.records.capacity()
    }

    /// Unregister every caster, invalidating all outstanding handles
    pub fn clear(&mut self) {
        let handles: Vec<CasterHandle> = self.iter().map(|(h, _)| h).collect();
        for handle in handles {
            self.unregister(handle);
        }
    }

    fn grow_if_full(&mut self) {
        if self.records.len() == self.records.capacity() {
            let additional = self.records.capacity().max(MIN_REGISTRY_CAPACITY);
            self.records.reserve_exact(additional);
        }
    }

    fn record(&self, handle: CasterHandle) -> Option<&CasterRecord> {
        let record = self.records.get(handle.index() as usize)?;
        (record.live && record.generation == handle.generation()).then_some(record)
    }

    fn record_mut(&mut self, handle: CasterHandle) -> Option<&mut CasterRecord> {
        let record = self.records.get_mut(handle.index() as usize)?;
        (record.live && record.generation == handle.generation()).then_some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::collections::HashSet;

    fn unit_box() -> Aabb {
        Aabb::new(Vec3::ZERO, Vec3::ONE)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ShadowCasterRegistry::new();
        let a = registry.register(unit_box());
        let b = registry.register_with_renderers(unit_box(), RendererRange::new(4, 2));

        assert!(registry.is_valid(a));
        assert!(registry.is_valid(b));
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.renderers(b), Some(RendererRange::new(4, 2)));
        assert_eq!(registry.is_enabled(a), Some(true));
    }

    #[test]
    fn test_unregister_invalidates_handle() {
        let mut registry = ShadowCasterRegistry::new();
        let a = registry.register(unit_box());

        assert!(registry.unregister(a));
        assert!(!registry.is_valid(a));
        assert!(!registry.unregister(a));
        assert!(!registry.update_bounds(a, unit_box()));
        assert!(!registry.set_enabled(a, false));
        assert_eq!(registry.bounds(a), None);
        assert!(matches!(registry.try_bounds(a), Err(ShadowError::StaleHandle(h)) if h == a));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut registry = ShadowCasterRegistry::new();
        let a = registry.register(unit_box());
        registry.unregister(a);

        let b = registry.register(unit_box());
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(!registry.is_valid(a));
        assert!(registry.is_valid(b));
    }

    #[test]
    fn test_freed_slot_is_zeroed() {
        let mut registry = ShadowCasterRegistry::new();
        let a = registry.register_with_renderers(unit_box(), RendererRange::new(1, 3));
        registry.unregister(a);

        let record = &registry.records[a.index() as usize];
        assert_eq!(record.bounds(), Aabb::ZERO);
        assert!(!record.is_enabled());
        assert!(record.renderers().is_empty());
        assert!(!record.is_live());
    }

    #[test]
    fn test_free_queue_is_fifo() {
        let mut registry = ShadowCasterRegistry::new();
        let handles: Vec<_> = (0..3).map(|_| registry.register(unit_box())).collect();
        registry.unregister(handles[2]);
        registry.unregister(handles[0]);

        assert_eq!(registry.register(unit_box()).index(), handles[2].index());
        assert_eq!(registry.register(unit_box()).index(), handles[0].index());
        assert_eq!(registry.register(unit_box()).index(), 3);
    }

    #[test]
    fn test_geometric_growth() {
        let mut registry = ShadowCasterRegistry::new();
        registry.register(unit_box());
        assert!(registry.capacity() >= MIN_REGISTRY_CAPACITY);

        for _ in 0..MIN_REGISTRY_CAPACITY {
            registry.register(unit_box());
        }
        assert!(registry.capacity() >= 2 * MIN_REGISTRY_CAPACITY);
    }

    #[test]
    fn test_handles_unique_under_churn() {
        let mut registry = ShadowCasterRegistry::new();
        let mut live: Vec<CasterHandle> = Vec::new();
        let mut ever_issued = HashSet::new();

        for round in 0..200u32 {
            let h = registry.register(unit_box());
            assert!(ever_issued.insert(h), "handle {} issued twice", h);
            live.push(h);

            if round % 3 == 0 {
                let victim = live.remove((round as usize * 7) % live.len());
                assert!(registry.unregister(victim));
            }

            let valid: HashSet<_> = live.iter().copied().filter(|h| registry.is_valid(*h)).collect();
            assert_eq!(valid.len(), live.len());
            assert_eq!(registry.len(), live.len());
        }
    }

    #[test]
    fn test_build_candidates_skips_free_slots() {
        let mut registry = ShadowCasterRegistry::new();
        let a = registry.register(unit_box());
        let b = registry.register(unit_box());
        let c = registry.register(unit_box());
        registry.unregister(b);
        registry.set_enabled(c, false);

        let mut candidates = vec![CullCandidate::default(); 10];
        registry.build_candidates(&mut candidates);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].handle, a);
        assert!(candidates[0].enabled);
        assert_eq!(candidates[1].handle, c);
        assert!(!candidates[1].enabled);
    }

    #[test]
    fn test_clear_invalidates_everything() {
        let mut registry = ShadowCasterRegistry::new();
        let handles: Vec<_> = (0..5).map(|_| registry.register(unit_box())).collect();
        registry.clear();

        assert!(registry.is_empty());
        assert!(handles.iter().all(|h| !registry.is_valid(*h)));
        assert_eq!(registry.slot_count(), 5);
    }

    #[test]
    fn test_null_handle_never_valid() {
        let mut registry = ShadowCasterRegistry::new();
        registry.register(unit_box());
        assert!(!registry.is_valid(CasterHandle::null()));
    }
}
