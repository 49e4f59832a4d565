//! Per-Object Shadow Culling
//!
//! Selects which registered casters get a tile in the shadow atlas this
//! frame and fits a light-space orthographic projection around each.
//!
//! # Algorithm
//!
//! For every candidate, independently:
//!
//! 1. Skip disabled casters and degenerate bounds.
//! 2. Build the light view: translate by `-center`, rotate by the inverse
//!    light rotation, flip Z so the light looks down -Z.
//! 3. Take light-space bounds of the caster corners and of the camera
//!    frustum corners (the frustum is rotated once per pass; only the
//!    per-caster translation differs).
//! 4. Reject when the boxes miss each other in X/Y, when the caster lies
//!    wholly beyond the frustum along the light, and for self-shadows when
//!    it lies wholly between the light and the frustum.
//! 5. Scene shadows push the far depth bound out to cover receivers in the
//!    frustum, by at most `scene_depth_extension`; the depth span is then
//!    clamped to `max_depth_span`.
//! 6. Orthographic projection around the resulting box.
//! 7. Priority = proximity + view misalignment, lower is better.
//!
//! # Concurrency
//!
//! Map-reduce over candidates with rayon. Every worker folds into its own
//! [`BoundedTopK`] and [`CullStats`]; the reduce step merges them. The heap
//! key is `(priority, candidate_index)`, a total order, so the surviving set
//! and its order do not depend on how work was split between threads.

use core::cmp::Ordering;
use core::ops::Add;

use glam::{Mat3, Mat4, Quat, Vec3};
use penumbra_structures::BoundedTopK;
use rayon::prelude::*;

use crate::bounds::Aabb;
use crate::camera::CameraFrustum;
use crate::config::{ShadowCasterConfig, ShadowUsage};
use crate::registry::{CasterHandle, RendererRange};

/// Smallest light-space extent handed to the projection
const MIN_PROJECTION_EXTENT: f32 = 1e-3;

/// Flip from light space (+Z toward the scene) to view space (-Z forward)
const Z_FLIP: Mat3 = Mat3::from_cols(Vec3::X, Vec3::Y, Vec3::NEG_Z);

/// Per-frame view of one registered caster
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CullCandidate {
    pub handle: CasterHandle,
    pub bounds: Aabb,
    pub enabled: bool,
    pub renderers: RendererRange,
}

/// A caster that made it through culling
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CullResult {
    /// Lower is more important
    pub priority: f32,
    /// World to light view
    pub view_matrix: Mat4,
    /// Light view to clip (GL depth)
    pub proj_matrix: Mat4,
    /// Index into the candidate slice the pass ran over
    pub candidate_index: u32,
}

impl CullResult {
    /// Combined world to clip transform
    #[inline]
    pub fn view_projection(&self) -> Mat4 {
        self.proj_matrix * self.view_matrix
    }

    #[inline]
    fn key(&self) -> CullKey {
        CullKey {
            priority: self.priority,
            candidate_index: self.candidate_index,
        }
    }
}

/// Total order over results: priority, then candidate index
#[derive(Clone, Copy, Debug)]
pub struct CullKey {
    pub priority: f32,
    pub candidate_index: u32,
}

impl PartialEq for CullKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CullKey {}

impl PartialOrd for CullKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CullKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then(self.candidate_index.cmp(&other.candidate_index))
    }
}

/// Counters for one culling pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullStats {
    /// Candidates examined
    pub candidates: u32,
    /// Disabled casters
    pub skipped_disabled: u32,
    /// Casters with empty or collapsed bounds
    pub skipped_degenerate: u32,
    /// Missed the frustum's light-space footprint
    pub rejected_outside: u32,
    /// Wrong side of the frustum along the light direction
    pub rejected_depth: u32,
    /// Passed every test
    pub visible: u32,
    /// Survived the priority cut
    pub kept: u32,
}

impl Add for CullStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            candidates: self.candidates + rhs.candidates,
            skipped_disabled: self.skipped_disabled + rhs.skipped_disabled,
            skipped_degenerate: self.skipped_degenerate + rhs.skipped_degenerate,
            rejected_outside: self.rejected_outside + rhs.rejected_outside,
            rejected_depth: self.rejected_depth + rhs.rejected_depth,
            visible: self.visible + rhs.visible,
            kept: self.kept + rhs.kept,
        }
    }
}

/// Tuning constants taken from [`ShadowCasterConfig`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CullParams {
    pub priority_distance_squared: f32,
    pub scene_depth_extension: f32,
    pub max_depth_span: f32,
    pub parallel_threshold: usize,
}

impl From<&ShadowCasterConfig> for CullParams {
    fn from(config: &ShadowCasterConfig) -> Self {
        Self {
            priority_distance_squared: config.priority_distance_squared(),
            scene_depth_extension: config.scene_depth_extension,
            max_depth_span: config.max_depth_span,
            parallel_threshold: config.parallel_threshold,
        }
    }
}

impl Default for CullParams {
    fn default() -> Self {
        Self::from(&ShadowCasterConfig::default())
    }
}

/// Why a candidate was dropped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Rejection {
    Disabled,
    Degenerate,
    Outside,
    Depth,
}

/// Immutable inputs shared by every worker for one pass
struct PassContext {
    world_to_light: Mat3,
    frustum_min: Vec3,
    frustum_max: Vec3,
    camera_position: Vec3,
    camera_forward: Vec3,
    usage: ShadowUsage,
    params: CullParams,
}

impl PassContext {
    fn new(
        camera: &CameraFrustum,
        light_rotation: Quat,
        usage: ShadowUsage,
        params: CullParams,
    ) -> Self {
        let world_to_light = Z_FLIP * Mat3::from_quat(light_rotation.normalize().inverse());

        let mut frustum_min = Vec3::splat(f32::MAX);
        let mut frustum_max = Vec3::splat(f32::MIN);
        for &corner in &camera.corners {
            let p = world_to_light * corner;
            frustum_min = frustum_min.min(p);
            frustum_max = frustum_max.max(p);
        }

        Self {
            world_to_light,
            frustum_min,
            frustum_max,
            camera_position: camera.position,
            camera_forward: camera.forward,
            usage,
            params,
        }
    }

    fn fit(&self, candidate_index: u32, candidate: &CullCandidate) -> Result<CullResult, Rejection> {
        if !candidate.enabled {
            return Err(Rejection::Disabled);
        }
        if candidate.bounds.is_degenerate() {
            return Err(Rejection::Degenerate);
        }

        let center = candidate.bounds.center();
        let offset = self.world_to_light * center;

        let mut shadow_min = Vec3::splat(f32::MAX);
        let mut shadow_max = Vec3::splat(f32::MIN);
        for corner in candidate.bounds.corners() {
            let p = self.world_to_light * corner - offset;
            shadow_min = shadow_min.min(p);
            shadow_max = shadow_max.max(p);
        }

        let frustum_min = self.frustum_min - offset;
        let frustum_max = self.frustum_max - offset;

        if shadow_max.x < frustum_min.x
            || shadow_min.x > frustum_max.x
            || shadow_max.y < frustum_min.y
            || shadow_min.y > frustum_max.y
        {
            return Err(Rejection::Outside);
        }

        // +Z points toward the light; the scene lies toward -Z
        if shadow_max.z < frustum_min.z {
            return Err(Rejection::Depth);
        }
        if self.usage.is_self_shadow() && shadow_min.z > frustum_max.z {
            return Err(Rejection::Depth);
        }

        let z_max = shadow_max.z;
        let mut z_min = shadow_min.z;
        if self.usage == ShadowUsage::Scene {
            let reach = (z_min - frustum_min.z).clamp(0.0, self.params.scene_depth_extension);
            z_min -= reach;
        }
        if z_max - z_min > self.params.max_depth_span {
            z_min = z_max - self.params.max_depth_span;
        }
        if z_max - z_min < MIN_PROJECTION_EXTENT {
            z_min = z_max - MIN_PROJECTION_EXTENT;
        }

        let (left, right) = widen(shadow_min.x, shadow_max.x);
        let (bottom, top) = widen(shadow_min.y, shadow_max.y);

        let view_matrix = Mat4::from_mat3(self.world_to_light) * Mat4::from_translation(-center);
        let proj_matrix = Mat4::orthographic_rh_gl(left, right, bottom, top, -z_max, -z_min);

        Ok(CullResult {
            priority: self.priority(center),
            view_matrix,
            proj_matrix,
            candidate_index,
        })
    }

    fn priority(&self, center: Vec3) -> f32 {
        let to_caster = center - self.camera_position;
        let proximity =
            (to_caster.length_squared() / self.params.priority_distance_squared).clamp(0.0, 1.0);
        let alignment = self.camera_forward.dot(to_caster.normalize_or_zero());
        proximity + (1.0 - alignment) * 0.5
    }
}

/// Keep an extent from collapsing to zero width
#[inline]
fn widen(min: f32, max: f32) -> (f32, f32) {
    if max - min < MIN_PROJECTION_EXTENT {
        let mid = (min + max) * 0.5;
        let half = MIN_PROJECTION_EXTENT * 0.5;
        (mid - half, mid + half)
    } else {
        (min, max)
    }
}

/// Per-worker fold state
struct Accumulator {
    selector: BoundedTopK<CullKey, CullResult>,
    stats: CullStats,
}

impl Accumulator {
    fn new(capacity: usize) -> Self {
        Self {
            selector: BoundedTopK::new(capacity),
            stats: CullStats::default(),
        }
    }

    fn offer(mut self, ctx: &PassContext, index: usize, candidate: &CullCandidate) -> Self {
        self.stats.candidates += 1;
        match ctx.fit(index as u32, candidate) {
            Ok(result) => {
                self.stats.visible += 1;
                self.selector.try_append(result.key(), result);
            }
            Err(Rejection::Disabled) => self.stats.skipped_disabled += 1,
            Err(Rejection::Degenerate) => self.stats.skipped_degenerate += 1,
            Err(Rejection::Outside) => self.stats.rejected_outside += 1,
            Err(Rejection::Depth) => self.stats.rejected_depth += 1,
        }
        self
    }

    fn merge(mut self, other: Self) -> Self {
        self.selector.merge(other.selector);
        self.stats = self.stats + other.stats;
        self
    }
}

/// Culls candidates and fits their light-space projections
#[derive(Clone, Debug, Default)]
pub struct CasterCuller {
    params: CullParams,
}

impl CasterCuller {
    /// Create a culler with tuning taken from `config`
    pub fn new(config: &ShadowCasterConfig) -> Self {
        Self {
            params: CullParams::from(config),
        }
    }

    /// Create from explicit parameters
    pub fn with_params(params: CullParams) -> Self {
        Self { params }
    }

    /// Pick up new tuning after a config reload
    pub fn set_config(&mut self, config: &ShadowCasterConfig) {
        self.params = CullParams::from(config);
    }

    pub fn params(&self) -> &CullParams {
        &self.params
    }

    /// Cull and return at most `max_count` results, best first
    pub fn cull(
        &self,
        candidates: &[CullCandidate],
        camera: &CameraFrustum,
        light_rotation: Quat,
        usage: ShadowUsage,
        max_count: u32,
    ) -> Vec<CullResult> {
        let mut results = Vec::with_capacity((max_count as usize).min(candidates.len()));
        self.cull_into(candidates, camera, light_rotation, usage, max_count, &mut results);
        results
    }

    /// Like [`CasterCuller::cull`], reusing `results` and reporting counters
    ///
    /// `results` is cleared first; nothing from a previous pass survives.
    pub fn cull_into(
        &self,
        candidates: &[CullCandidate],
        camera: &CameraFrustum,
        light_rotation: Quat,
        usage: ShadowUsage,
        max_count: u32,
        results: &mut Vec<CullResult>,
    ) -> CullStats {
        results.clear();

        // Never more survivors than candidates
        let capacity = (max_count as usize).min(candidates.len());
        let ctx = PassContext::new(camera, light_rotation, usage, self.params);

        let Accumulator {
            mut selector,
            mut stats,
        } = if candidates.len() < self.params.parallel_threshold {
            candidates
                .iter()
                .enumerate()
                .fold(Accumulator::new(capacity), |acc, (i, c)| acc.offer(&ctx, i, c))
        } else {
            candidates
                .par_iter()
                .enumerate()
                .fold(
                    || Accumulator::new(capacity),
                    |acc, (i, c)| acc.offer(&ctx, i, c),
                )
                .reduce(|| Accumulator::new(capacity), Accumulator::merge)
        };

        selector.drain_sorted_into(results);
        results.truncate(capacity);
        stats.kept = results.len() as u32;

        log::debug!(
            "shadow cull {:?}: {} candidates, {} visible, {} kept",
            usage,
            stats.candidates,
            stats.visible,
            stats.kept
        );

        stats
    }
}

/// Rotation for self-shadow passes: the light direction blended toward the
/// camera's view direction
///
/// `blend = 0` keeps the light, `blend = 1` shines straight along the view.
/// Falls back to the light rotation when the blend cancels out.
pub fn self_shadow_rotation(light_rotation: Quat, camera_forward: Vec3, blend: f32) -> Quat {
    let light_rotation = light_rotation.normalize();
    let light_dir = light_rotation * Vec3::Z;
    let blended = light_dir
        .lerp(camera_forward.normalize_or_zero(), blend.clamp(0.0, 1.0))
        .normalize_or_zero();

    if blended == Vec3::ZERO {
        return light_rotation;
    }

    (Quat::from_rotation_arc(light_dir, blended) * light_rotation).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn camera() -> CameraFrustum {
        // Looking down -Z from the origin, 20 units deep
        CameraFrustum::from_perspective(
            Vec3::ZERO,
            Quat::IDENTITY,
            core::f32::consts::FRAC_PI_2,
            1.0,
            0.1,
            20.0,
        )
    }

    /// Light shining straight down (-Y)
    fn down_light() -> Quat {
        Quat::from_rotation_arc(Vec3::Z, Vec3::NEG_Y)
    }

    fn candidate(center: Vec3) -> CullCandidate {
        CullCandidate {
            handle: CasterHandle::new(0, 0),
            bounds: Aabb::from_center_half_extents(center, Vec3::splat(0.5)),
            enabled: true,
            renderers: RendererRange::EMPTY,
        }
    }

    fn ctx(usage: ShadowUsage) -> PassContext {
        PassContext::new(&camera(), down_light(), usage, CullParams::default())
    }

    #[test]
    fn test_view_matrix_centers_caster() {
        let center = Vec3::new(1.0, 2.0, -5.0);
        let result = ctx(ShadowUsage::Scene).fit(0, &candidate(center)).unwrap();

        let origin = result.view_matrix.transform_point3(center);
        assert!(origin.abs_diff_eq(Vec3::ZERO, 1e-5));

        // Light looks down -Z in view space: a point below the caster is deeper
        let below = result.view_matrix.transform_point3(center + Vec3::NEG_Y);
        assert_abs_diff_eq!(below.z, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_projection_contains_caster() {
        let c = candidate(Vec3::new(0.0, 0.0, -5.0));
        let result = ctx(ShadowUsage::SelfShadow).fit(0, &c).unwrap();
        let view_proj = result.view_projection();

        for corner in c.bounds.corners() {
            let clip = view_proj.project_point3(corner);
            assert!(clip.x >= -1.0 - 1e-4 && clip.x <= 1.0 + 1e-4, "{:?}", clip);
            assert!(clip.y >= -1.0 - 1e-4 && clip.y <= 1.0 + 1e-4, "{:?}", clip);
            assert!(clip.z >= -1.0 - 1e-4 && clip.z <= 1.0 + 1e-4, "{:?}", clip);
        }
    }

    #[test]
    fn test_scene_usage_extends_depth_toward_receivers() {
        // Caster high above the frustum: scene shadows reach down to it,
        // self shadows stay tight around the caster
        let c = candidate(Vec3::new(0.0, 3.0, -10.0));
        let scene = ctx(ShadowUsage::Scene).fit(0, &c).unwrap();
        let own = ctx(ShadowUsage::SelfShadow).fit(0, &c).unwrap();

        let depth = |m: &Mat4| 2.0 / m.z_axis.z.abs();
        assert_abs_diff_eq!(depth(&own.proj_matrix), 1.0, epsilon = 1e-4);
        assert!(depth(&scene.proj_matrix) > 1.0);
        assert!(depth(&scene.proj_matrix) <= 1.0 + CullParams::default().scene_depth_extension + 1e-3);
    }

    #[test]
    fn test_depth_span_clamped() {
        let params = CullParams {
            scene_depth_extension: 1000.0,
            max_depth_span: 4.0,
            ..CullParams::default()
        };
        let ctx = PassContext::new(&camera(), down_light(), ShadowUsage::Scene, params);
        let result = ctx.fit(0, &candidate(Vec3::new(0.0, 15.0, -10.0))).unwrap();

        let depth = 2.0 / result.proj_matrix.z_axis.z.abs();
        assert_abs_diff_eq!(depth, 4.0, epsilon = 1e-3);
    }

    #[test]
    fn test_rejections() {
        let scene = ctx(ShadowUsage::Scene);
        let own = ctx(ShadowUsage::SelfShadow);

        let mut disabled = candidate(Vec3::new(0.0, 0.0, -5.0));
        disabled.enabled = false;
        assert_eq!(scene.fit(0, &disabled), Err(Rejection::Disabled));

        let mut empty = candidate(Vec3::new(0.0, 0.0, -5.0));
        empty.bounds = Aabb::ZERO;
        assert_eq!(scene.fit(0, &empty), Err(Rejection::Degenerate));

        // Off to the side of the frustum footprint
        let side = candidate(Vec3::new(100.0, 0.0, -5.0));
        assert_eq!(scene.fit(0, &side), Err(Rejection::Outside));

        // Far below everything the camera sees
        let below = candidate(Vec3::new(0.0, -100.0, -10.0));
        assert_eq!(scene.fit(0, &below), Err(Rejection::Depth));

        // Far above: scene shadow may land in view, self shadow cannot
        let above = candidate(Vec3::new(0.0, 100.0, -10.0));
        assert!(scene.fit(0, &above).is_ok());
        assert_eq!(own.fit(0, &above), Err(Rejection::Depth));
    }

    #[test]
    fn test_priority_prefers_close_and_centered() {
        let ctx = ctx(ShadowUsage::Scene);
        let near_center = ctx.priority(Vec3::new(0.0, 0.0, -2.0));
        let far_center = ctx.priority(Vec3::new(0.0, 0.0, -15.0));
        let near_edge = ctx.priority(Vec3::new(1.8, 0.0, -2.0));

        assert!(near_center < far_center);
        assert!(near_center < near_edge);
        assert_abs_diff_eq!(near_center, 4.0 / 10_000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cull_key_total_order() {
        let a = CullKey { priority: 0.5, candidate_index: 3 };
        let b = CullKey { priority: 0.5, candidate_index: 1 };
        let c = CullKey { priority: 0.25, candidate_index: 9 };
        assert!(b < a);
        assert!(c < b);
        assert_eq!(a, a);
    }

    #[test]
    fn test_cull_sorted_and_truncated() {
        let candidates: Vec<_> = (0..10)
            .map(|i| candidate(Vec3::new(0.0, 0.0, -1.5 - i as f32)))
            .collect();
        let culler = CasterCuller::default();

        let mut results = vec![];
        let stats = culler.cull_into(
            &candidates,
            &camera(),
            down_light(),
            ShadowUsage::Scene,
            4,
            &mut results,
        );

        assert_eq!(results.len(), 4);
        assert_eq!(stats.visible, 10);
        assert_eq!(stats.kept, 4);
        let indices: Vec<u32> = results.iter().map(|r| r.candidate_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(results.windows(2).all(|w| w[0].priority <= w[1].priority));
    }

    #[test]
    fn test_cull_zero_max_count() {
        let candidates = vec![candidate(Vec3::new(0.0, 0.0, -5.0))];
        let results = CasterCuller::default().cull(
            &candidates,
            &camera(),
            down_light(),
            ShadowUsage::Scene,
            0,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_self_shadow_rotation_blend() {
        let light = down_light();
        let forward = Vec3::NEG_Z;

        let unchanged = self_shadow_rotation(light, forward, 0.0);
        assert!((unchanged * Vec3::Z).abs_diff_eq(Vec3::NEG_Y, 1e-5));

        let full = self_shadow_rotation(light, forward, 1.0);
        assert!((full * Vec3::Z).abs_diff_eq(Vec3::NEG_Z, 1e-5));

        let half = self_shadow_rotation(light, forward, 0.5);
        let expected = Vec3::new(0.0, -1.0, -1.0).normalize();
        assert!((half * Vec3::Z).abs_diff_eq(expected, 1e-5));

        // Opposed directions cancel: keep the light
        let cancelled = self_shadow_rotation(light, Vec3::Y, 0.5);
        assert!((cancelled * Vec3::Z).abs_diff_eq(Vec3::NEG_Y, 1e-5));
    }
}
