//! Shadow Caster System
//!
//! Host-facing facade tying the registry, culler and atlas packer together.
//! One instance lives per renderer; every mutation takes `&mut self`, so
//! registration and culling can never overlap.
//!
//! Per frame:
//!
//! 1. [`ShadowCasterSystem::cull`] (or [`ShadowCasterSystem::cull_dual`])
//!    snapshots the registry, culls, packs the atlas and fills the GPU
//!    staging buffer for that usage.
//! 2. The host uploads [`ShadowCasterPass::gpu_data`] and renders each tile
//!    through a [`ShadowDrawSink`].
//!
//! A pass is fully overwritten every time it is culled.

use glam::{Mat4, Quat, UVec4, Vec4};

use crate::atlas::{AtlasLayout, AtlasPacker};
use crate::bounds::Aabb;
use crate::camera::CameraFrustum;
use crate::config::{ShadowCasterConfig, ShadowUsage};
use crate::culler::{self_shadow_rotation, CasterCuller, CullCandidate, CullResult, CullStats};
use crate::data::ShadowCasterBuffer;
use crate::registry::{CasterHandle, RendererRange, ShadowCasterRegistry};

/// Everything the host needs to render one caster into its tile
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CasterDraw {
    pub handle: CasterHandle,
    pub renderers: RendererRange,
    pub view: Mat4,
    pub projection: Mat4,
    /// Texel viewport as (x, y, width, height)
    pub viewport: UVec4,
    /// Normalized atlas rect as (u_min, u_max, v_min, v_max)
    pub atlas_rect: Vec4,
}

/// Host-side draw submission
pub trait ShadowDrawSink {
    /// Render `draw.renderers` with the given matrices into `draw.viewport`
    fn draw_caster(&mut self, draw: &CasterDraw);
}

impl<F: FnMut(&CasterDraw)> ShadowDrawSink for F {
    fn draw_caster(&mut self, draw: &CasterDraw) {
        self(draw)
    }
}

/// Output of one culling pass for one usage
#[derive(Clone, Debug)]
pub struct ShadowCasterPass {
    usage: ShadowUsage,
    results: Vec<CullResult>,
    handles: Vec<CasterHandle>,
    renderers: Vec<RendererRange>,
    layout: AtlasLayout,
    gpu_data: ShadowCasterBuffer,
    stats: CullStats,
}

impl ShadowCasterPass {
    pub fn new(usage: ShadowUsage) -> Self {
        Self {
            usage,
            results: Vec::new(),
            handles: Vec::new(),
            renderers: Vec::new(),
            layout: AtlasLayout::default(),
            gpu_data: ShadowCasterBuffer::new(),
            stats: CullStats::default(),
        }
    }

    #[inline]
    pub fn usage(&self) -> ShadowUsage {
        self.usage
    }

    /// Casters that made it into the atlas
    #[inline]
    pub fn visible_count(&self) -> usize {
        self.results.len()
    }

    /// Sorted cull results, best first
    #[inline]
    pub fn results(&self) -> &[CullResult] {
        &self.results
    }

    /// View and projection matrices of caster `index`
    pub fn matrices(&self, index: usize) -> Option<(Mat4, Mat4)> {
        self.results
            .get(index)
            .map(|r| (r.view_matrix, r.proj_matrix))
    }

    /// Normalized atlas rect of caster `index`
    pub fn tile_rect(&self, index: usize) -> Option<Vec4> {
        self.layout.tile(index).map(|t| t.atlas_rect)
    }

    /// World to atlas matrix of caster `index`
    pub fn texture_matrix(&self, index: usize) -> Option<Mat4> {
        self.layout.tile(index).map(|t| t.texture_matrix)
    }

    /// Registry handle of caster `index`
    pub fn handle(&self, index: usize) -> Option<CasterHandle> {
        self.handles.get(index).copied()
    }

    #[inline]
    pub fn layout(&self) -> &AtlasLayout {
        &self.layout
    }

    #[inline]
    pub fn gpu_data(&self) -> &ShadowCasterBuffer {
        &self.gpu_data
    }

    #[inline]
    pub fn stats(&self) -> &CullStats {
        &self.stats
    }

    /// Submit caster `index` to `sink`; `false` if out of range
    pub fn draw<S: ShadowDrawSink + ?Sized>(&self, sink: &mut S, index: usize) -> bool {
        let (Some(result), Some(tile)) = (self.results.get(index), self.layout.tile(index)) else {
            return false;
        };

        sink.draw_caster(&CasterDraw {
            handle: self.handles[index],
            renderers: self.renderers[index],
            view: result.view_matrix,
            projection: result.proj_matrix,
            viewport: tile.viewport,
            atlas_rect: tile.atlas_rect,
        });
        true
    }

    /// Submit every caster in tile order, returning how many were drawn
    pub fn draw_all<S: ShadowDrawSink + ?Sized>(&self, sink: &mut S) -> usize {
        let mut drawn = 0;
        for index in 0..self.visible_count() {
            if self.draw(&mut *sink, index) {
                drawn += 1;
            }
        }
        drawn
    }

    fn clear(&mut self) {
        self.results.clear();
        self.handles.clear();
        self.renderers.clear();
        self.layout = AtlasLayout::default();
        self.gpu_data.clear();
        self.stats = CullStats::default();
    }
}

/// Per-object shadow casters for one renderer
#[derive(Debug)]
pub struct ShadowCasterSystem {
    config: ShadowCasterConfig,
    registry: ShadowCasterRegistry,
    culler: CasterCuller,
    packer: AtlasPacker,
    candidates: Vec<CullCandidate>,
    passes: [ShadowCasterPass; ShadowUsage::COUNT],
}

impl ShadowCasterSystem {
    /// Create a system; `config` is validated first
    pub fn new(mut config: ShadowCasterConfig) -> Self {
        config.validate();
        Self {
            registry: ShadowCasterRegistry::new(),
            culler: CasterCuller::new(&config),
            packer: AtlasPacker::new(config.tile_resolution, config.reversed_z),
            candidates: Vec::new(),
            passes: ShadowUsage::ALL.map(ShadowCasterPass::new),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &ShadowCasterConfig {
        &self.config
    }

    /// Apply a new configuration, taking effect on the next cull
    pub fn set_config(&mut self, mut config: ShadowCasterConfig) {
        config.validate();
        self.culler.set_config(&config);
        self.packer.set_tile_resolution(config.tile_resolution);
        self.packer.set_reversed_z(config.reversed_z);
        self.config = config;
    }

    #[inline]
    pub fn registry(&self) -> &ShadowCasterRegistry {
        &self.registry
    }

    #[inline]
    pub fn packer(&self) -> &AtlasPacker {
        &self.packer
    }

    pub fn register(&mut self, bounds: Aabb) -> CasterHandle {
        self.registry.register(bounds)
    }

    pub fn register_with_renderers(&mut self, bounds: Aabb, renderers: RendererRange) -> CasterHandle {
        self.registry.register_with_renderers(bounds, renderers)
    }

    pub fn unregister(&mut self, handle: CasterHandle) -> bool {
        self.registry.unregister(handle)
    }

    pub fn set_enabled(&mut self, handle: CasterHandle, enabled: bool) -> bool {
        self.registry.set_enabled(handle, enabled)
    }

    pub fn update_bounds(&mut self, handle: CasterHandle, bounds: Aabb) -> bool {
        self.registry.update_bounds(handle, bounds)
    }

    pub fn set_renderers(&mut self, handle: CasterHandle, renderers: RendererRange) -> bool {
        self.registry.set_renderers(handle, renderers)
    }

    /// Cull, pack and stage one usage's pass
    ///
    /// `max_count` is capped at the configured `max_shadow_count`.
    pub fn cull(
        &mut self,
        camera: &CameraFrustum,
        light_rotation: Quat,
        usage: ShadowUsage,
        max_count: u32,
    ) -> &ShadowCasterPass {
        let max_count = if max_count > self.config.max_shadow_count {
            log::warn!(
                "requested {} shadow casters, capped at {}",
                max_count,
                self.config.max_shadow_count
            );
            self.config.max_shadow_count
        } else {
            max_count
        };

        let pass = &mut self.passes[usage.index()];
        pass.clear();

        if !self.config.enabled {
            return pass;
        }

        self.registry.build_candidates(&mut self.candidates);
        pass.stats = self.culler.cull_into(
            &self.candidates,
            camera,
            light_rotation,
            usage,
            max_count,
            &mut pass.results,
        );

        for result in &pass.results {
            let candidate = &self.candidates[result.candidate_index as usize];
            pass.handles.push(candidate.handle);
            pass.renderers.push(candidate.renderers);
        }

        self.packer.pack_into(&pass.results, &mut pass.layout);
        pass.gpu_data.fill(&pass.layout);

        pass
    }

    /// Cull both usages: scene shadows with the light rotation, self shadows
    /// with the light blended toward the view
    pub fn cull_dual(&mut self, camera: &CameraFrustum, light_rotation: Quat, max_count: u32) {
        self.cull(camera, light_rotation, ShadowUsage::Scene, max_count);

        let self_rotation =
            self_shadow_rotation(light_rotation, camera.forward, self.config.self_shadow_view_blend);
        self.cull(camera, self_rotation, ShadowUsage::SelfShadow, max_count);
    }

    /// Latest pass for `usage`
    #[inline]
    pub fn pass(&self, usage: ShadowUsage) -> &ShadowCasterPass {
        &self.passes[usage.index()]
    }

    pub fn visible_count(&self, usage: ShadowUsage) -> usize {
        self.pass(usage).visible_count()
    }

    pub fn matrices(&self, usage: ShadowUsage, index: usize) -> Option<(Mat4, Mat4)> {
        self.pass(usage).matrices(index)
    }

    pub fn tile_rect(&self, usage: ShadowUsage, index: usize) -> Option<Vec4> {
        self.pass(usage).tile_rect(index)
    }

    pub fn texture_matrix(&self, usage: ShadowUsage, index: usize) -> Option<Mat4> {
        self.pass(usage).texture_matrix(index)
    }

    pub fn draw<S: ShadowDrawSink + ?Sized>(&self, usage: ShadowUsage, sink: &mut S, index: usize) -> bool {
        self.pass(usage).draw(sink, index)
    }

    pub fn draw_all<S: ShadowDrawSink + ?Sized>(&self, usage: ShadowUsage, sink: &mut S) -> usize {
        self.pass(usage).draw_all(sink)
    }
}

impl Default for ShadowCasterSystem {
    fn default() -> Self {
        Self::new(ShadowCasterConfig::default())
    }
}
