//! Shadow Caster Configuration
//!
//! Caller-supplied knobs for per-object shadows, with serde support for
//! hot-reload. Nothing here is parsed from disk by the subsystem itself;
//! hosts that keep the config in a file go through [`ShadowCasterConfig::from_json`].

use serde::{Deserialize, Serialize};

use crate::error::{ShadowError, ShadowResult};

/// Hard cap on casters packed into one atlas per pass
pub const MAX_SHADOW_CASTERS: u32 = 16;

/// Smallest tile resolution accepted by [`ShadowCasterConfig::validate`]
pub const MIN_TILE_RESOLUTION: u32 = 64;

/// Largest tile resolution accepted by [`ShadowCasterConfig::validate`]
pub const MAX_TILE_RESOLUTION: u32 = 4096;

/// Per-object shadow configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowCasterConfig {
    /// Enable per-object shadows
    pub enabled: bool,

    /// Maximum casters kept per pass (1..=MAX_SHADOW_CASTERS)
    pub max_shadow_count: u32,

    /// Texel size of one atlas tile (power of 2)
    pub tile_resolution: u32,

    /// Depth bits of the backing texture (16, 24 or 32)
    pub depth_bits: u32,

    /// Distance at which the proximity term of the priority saturates
    pub priority_distance: f32,

    /// How far a scene shadow's depth range may be pushed away from the
    /// light to cover receivers inside the camera frustum
    pub scene_depth_extension: f32,

    /// Upper bound on the light-space depth span of one caster
    pub max_depth_span: f32,

    /// Blend from light direction (0) toward camera forward (1) for
    /// self-shadow casters
    pub self_shadow_view_blend: f32,

    /// Depth buffer uses reversed Z (1 = near)
    pub reversed_z: bool,

    /// Candidate count below which culling runs on the calling thread
    pub parallel_threshold: usize,
}

impl Default for ShadowCasterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_shadow_count: MAX_SHADOW_CASTERS,
            tile_resolution: 512,
            depth_bits: 16,
            priority_distance: 100.0,
            scene_depth_extension: 100.0,
            max_depth_span: 5000.0,
            self_shadow_view_blend: 0.5,
            reversed_z: false,
            parallel_threshold: 64,
        }
    }
}

impl ShadowCasterConfig {
    /// Few, small tiles
    pub fn low_quality() -> Self {
        Self {
            max_shadow_count: 4,
            tile_resolution: 256,
            ..Default::default()
        }
    }

    /// All slots, large tiles, 24-bit depth
    pub fn high_quality() -> Self {
        Self {
            max_shadow_count: MAX_SHADOW_CASTERS,
            tile_resolution: 1024,
            depth_bits: 24,
            ..Default::default()
        }
    }

    /// Per-object shadows turned off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Clamp every field to its valid range, warning about each change
    pub fn validate(&mut self) {
        let max_shadow_count = self.max_shadow_count.clamp(1, MAX_SHADOW_CASTERS);
        if max_shadow_count != self.max_shadow_count {
            log::warn!(
                "max_shadow_count {} clamped to {}",
                self.max_shadow_count,
                max_shadow_count
            );
            self.max_shadow_count = max_shadow_count;
        }

        let tile_resolution = self
            .tile_resolution
            .clamp(MIN_TILE_RESOLUTION, MAX_TILE_RESOLUTION)
            .next_power_of_two();
        if tile_resolution != self.tile_resolution {
            log::warn!(
                "tile_resolution {} adjusted to {}",
                self.tile_resolution,
                tile_resolution
            );
            self.tile_resolution = tile_resolution;
        }

        let depth_bits = match self.depth_bits {
            0..=16 => 16,
            17..=24 => 24,
            _ => 32,
        };
        if depth_bits != self.depth_bits {
            log::warn!("depth_bits {} adjusted to {}", self.depth_bits, depth_bits);
            self.depth_bits = depth_bits;
        }

        if !(self.priority_distance >= 1.0) {
            log::warn!("priority_distance {} raised to 1", self.priority_distance);
            self.priority_distance = 1.0;
        }

        if !(self.scene_depth_extension >= 0.0) {
            log::warn!(
                "scene_depth_extension {} raised to 0",
                self.scene_depth_extension
            );
            self.scene_depth_extension = 0.0;
        }

        if !(self.max_depth_span >= 1.0) {
            log::warn!("max_depth_span {} raised to 1", self.max_depth_span);
            self.max_depth_span = 1.0;
        }

        let blend = if self.self_shadow_view_blend.is_nan() {
            0.0
        } else {
            self.self_shadow_view_blend.clamp(0.0, 1.0)
        };
        if blend != self.self_shadow_view_blend {
            log::warn!(
                "self_shadow_view_blend {} clamped to {}",
                self.self_shadow_view_blend,
                blend
            );
            self.self_shadow_view_blend = blend;
        }
    }

    /// Squared priority distance, the `D` in the proximity term
    #[inline]
    pub fn priority_distance_squared(&self) -> f32 {
        self.priority_distance * self.priority_distance
    }

    /// Parse from JSON and validate
    pub fn from_json(json: &str) -> ShadowResult<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        config.validate();
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> ShadowResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Which light direction a pass renders with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ShadowUsage {
    /// True main-light direction, shadows land on the scene
    Scene = 0,
    /// Light direction blended toward the camera, shadows stay on the caster
    SelfShadow = 1,
}

impl ShadowUsage {
    /// Number of usage variants
    pub const COUNT: usize = 2;

    /// All usages in discriminant order
    pub const ALL: [ShadowUsage; Self::COUNT] = [ShadowUsage::Scene, ShadowUsage::SelfShadow];

    /// Decode a raw discriminant
    ///
    /// # Panics
    ///
    /// Panics on an unknown value. A bad discriminant is a caller bug, not a
    /// runtime condition; use `ShadowUsage::try_from` for untrusted input.
    pub fn from_raw(raw: u32) -> Self {
        match Self::try_from(raw) {
            Ok(usage) => usage,
            Err(_) => panic!("unsupported shadow usage value {}", raw),
        }
    }

    /// Dense index for per-usage storage
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Self-shadows never extend past the caster onto the scene
    #[inline]
    pub const fn is_self_shadow(self) -> bool {
        matches!(self, ShadowUsage::SelfShadow)
    }
}

impl TryFrom<u32> for ShadowUsage {
    type Error = ShadowError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(ShadowUsage::Scene),
            1 => Ok(ShadowUsage::SelfShadow),
            other => Err(ShadowError::InvalidUsage(other)),
        }
    }
}

/// Shadow caster quality preset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowCasterQuality {
    /// No per-object shadows
    Off,
    /// Few casters, small tiles
    Low,
    /// Defaults
    Medium,
    /// All casters, large tiles
    High,
}

impl ShadowCasterQuality {
    /// Convert to a ShadowCasterConfig
    pub fn to_config(self) -> ShadowCasterConfig {
        match self {
            Self::Off => ShadowCasterConfig::disabled(),
            Self::Low => ShadowCasterConfig::low_quality(),
            Self::Medium => ShadowCasterConfig::default(),
            Self::High => ShadowCasterConfig::high_quality(),
        }
    }
}
