//! GPU Shadow Caster Data
//!
//! Upload-ready records for the per-object shadow atlas. All structures are
//! bytemuck Pod/Zeroable so the host can copy them straight into its
//! uniform or storage buffers.

use serde::{Deserialize, Serialize};

use crate::atlas::{AtlasLayout, AtlasTile};
use crate::config::MAX_SHADOW_CASTERS;

/// Per-caster shadow lookup data
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuShadowCaster {
    /// World to atlas UV/depth
    pub texture_matrix: [[f32; 4]; 4],

    /// Tile rect as (u_min, u_max, v_min, v_max)
    pub atlas_rect: [f32; 4],
}

impl GpuShadowCaster {
    pub fn from_tile(tile: &AtlasTile) -> Self {
        Self {
            texture_matrix: tile.texture_matrix.to_cols_array_2d(),
            atlas_rect: tile.atlas_rect.to_array(),
        }
    }
}

/// Header shared by every caster record of a pass
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuShadowCasterUniforms {
    /// Active caster records
    pub caster_count: u32,

    /// Atlas grid cells per side
    pub tiles_per_side: u32,

    /// 1 / atlas size in texels, for filtering
    pub texel_size: f32,

    /// Padding to align to 16 bytes
    pub _pad: f32,
}

/// CPU-side staging for one pass's shadow caster data
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShadowCasterBuffer {
    /// Caster records in tile order
    pub casters: Vec<GpuShadowCaster>,

    /// Header
    pub uniforms: GpuShadowCasterUniforms,
}

impl ShadowCasterBuffer {
    pub fn new() -> Self {
        Self {
            casters: Vec::with_capacity(MAX_SHADOW_CASTERS as usize),
            uniforms: GpuShadowCasterUniforms::default(),
        }
    }

    /// Build directly from a packed layout
    pub fn from_layout(layout: &AtlasLayout) -> Self {
        let mut buffer = Self::new();
        buffer.fill(layout);
        buffer
    }

    pub fn clear(&mut self) {
        self.casters.clear();
        self.uniforms = GpuShadowCasterUniforms::default();
    }

    /// Replace the contents with `layout`, keeping at most
    /// [`MAX_SHADOW_CASTERS`] records
    pub fn fill(&mut self, layout: &AtlasLayout) {
        self.casters.clear();
        self.casters.extend(
            layout
                .tiles
                .iter()
                .take(MAX_SHADOW_CASTERS as usize)
                .map(GpuShadowCaster::from_tile),
        );

        self.uniforms = GpuShadowCasterUniforms {
            caster_count: self.casters.len() as u32,
            tiles_per_side: layout.tiles_per_side,
            texel_size: layout.texel_size(),
            _pad: 0.0,
        };
    }

    /// Get caster records as bytes
    pub fn casters_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.casters)
    }

    /// Get the header as bytes
    pub fn uniforms_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.uniforms)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.casters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.casters.is_empty()
    }
}
