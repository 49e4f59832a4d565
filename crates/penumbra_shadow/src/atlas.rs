//! Shadow Atlas Packing
//!
//! Lays the culled casters out on a square grid of equally sized tiles in a
//! single depth texture. This module only computes the layout; the host
//! owns the texture and issues the draws.
//!
//! # Atlas Organization
//!
//! For `n` casters the atlas is `s x s` tiles with `s = ceil(sqrt(n))`.
//! Tile `i` sits at column `i % s`, row `i / s`. Trailing tiles on the last
//! row stay empty and are never drawn.

use glam::{Mat4, UVec2, UVec4, Vec4};
use serde::{Deserialize, Serialize};

use crate::culler::CullResult;

/// Placement of one caster in the atlas
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AtlasTile {
    /// Grid cell (column, row)
    pub tile_position: UVec2,
    /// Normalized atlas UV rect as (u_min, u_max, v_min, v_max)
    pub atlas_rect: Vec4,
    /// World to atlas UV/depth for shadow lookups
    pub texture_matrix: Mat4,
    /// Texel viewport as (x, y, width, height)
    pub viewport: UVec4,
}

/// Result of packing one pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AtlasLayout {
    /// Tiles in result order
    pub tiles: Vec<AtlasTile>,
    /// Grid cells per side
    pub tiles_per_side: u32,
    /// Texels per tile side
    pub tile_resolution: u32,
    /// Texels per atlas side, 0 when nothing was packed
    pub atlas_size: u32,
}

impl AtlasLayout {
    #[inline]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    #[inline]
    pub fn tile(&self, index: usize) -> Option<&AtlasTile> {
        self.tiles.get(index)
    }

    /// Size of one atlas texel in UV units
    #[inline]
    pub fn texel_size(&self) -> f32 {
        if self.atlas_size == 0 {
            0.0
        } else {
            1.0 / self.atlas_size as f32
        }
    }

    /// Tile cells left empty on the last row
    #[inline]
    pub fn unused_tiles(&self) -> u32 {
        self.tiles_per_side * self.tiles_per_side - self.tiles.len() as u32
    }

    fn clear(&mut self) {
        self.tiles.clear();
        self.tiles_per_side = 0;
        self.atlas_size = 0;
    }
}

/// Atlas packing statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AtlasStats {
    /// Layouts produced
    pub packs: u64,
    /// Tiles placed by the last pack
    pub last_tile_count: u32,
    /// Largest atlas side seen, in texels
    pub peak_atlas_size: u32,
}

/// Packs culled casters into a square tile grid
#[derive(Clone, Debug)]
pub struct AtlasPacker {
    tile_resolution: u32,
    reversed_z: bool,
    stats: AtlasStats,
}

impl AtlasPacker {
    pub fn new(tile_resolution: u32, reversed_z: bool) -> Self {
        Self {
            tile_resolution,
            reversed_z,
            stats: AtlasStats::default(),
        }
    }

    #[inline]
    pub fn tile_resolution(&self) -> u32 {
        self.tile_resolution
    }

    #[inline]
    pub fn reversed_z(&self) -> bool {
        self.reversed_z
    }

    pub fn set_tile_resolution(&mut self, tile_resolution: u32) {
        self.tile_resolution = tile_resolution;
    }

    pub fn set_reversed_z(&mut self, reversed_z: bool) {
        self.reversed_z = reversed_z;
    }

    pub fn stats(&self) -> &AtlasStats {
        &self.stats
    }

    /// Pack `results` into a fresh layout
    pub fn pack(&mut self, results: &[CullResult]) -> AtlasLayout {
        let mut layout = AtlasLayout::default();
        self.pack_into(results, &mut layout);
        layout
    }

    /// Pack `results` into `layout`, replacing its previous contents
    pub fn pack_into(&mut self, results: &[CullResult], layout: &mut AtlasLayout) {
        layout.clear();
        layout.tile_resolution = self.tile_resolution;

        if !results.is_empty() {
            let side = tiles_per_side(results.len() as u32);
            layout.tiles_per_side = side;
            layout.atlas_size = side * self.tile_resolution;
            layout.tiles.reserve(results.len());

            for (i, result) in results.iter().enumerate() {
                let tile = tile_position(i as u32, side);
                let scale_bias = scale_bias_matrix(tile, side, self.reversed_z);
                layout.tiles.push(AtlasTile {
                    tile_position: tile,
                    atlas_rect: atlas_rect(tile, side),
                    texture_matrix: scale_bias * result.proj_matrix * result.view_matrix,
                    viewport: UVec4::new(
                        tile.x * self.tile_resolution,
                        tile.y * self.tile_resolution,
                        self.tile_resolution,
                        self.tile_resolution,
                    ),
                });
            }
        }

        self.stats.packs += 1;
        self.stats.last_tile_count = layout.tiles.len() as u32;
        self.stats.peak_atlas_size = self.stats.peak_atlas_size.max(layout.atlas_size);

        log::trace!(
            "packed {} shadow casters into {}x{} tiles ({} texels)",
            layout.tiles.len(),
            layout.tiles_per_side,
            layout.tiles_per_side,
            layout.atlas_size
        );
    }
}

/// Smallest `s` with `s * s >= count`
pub fn tiles_per_side(count: u32) -> u32 {
    if count == 0 {
        return 0;
    }
    // Float estimate, then fix up so large counts stay exact
    let mut side = (count as f64).sqrt() as u32;
    while (side as u64) * (side as u64) < count as u64 {
        side += 1;
    }
    while side > 1 && ((side - 1) as u64) * ((side - 1) as u64) >= count as u64 {
        side -= 1;
    }
    side
}

/// Grid cell of tile `index`
#[inline]
pub fn tile_position(index: u32, tiles_per_side: u32) -> UVec2 {
    UVec2::new(index % tiles_per_side, index / tiles_per_side)
}

/// Normalized UV rect of a tile as (u_min, u_max, v_min, v_max)
pub fn atlas_rect(tile: UVec2, tiles_per_side: u32) -> Vec4 {
    let inv = 1.0 / tiles_per_side as f32;
    Vec4::new(
        tile.x as f32 * inv,
        (tile.x + 1) as f32 * inv,
        tile.y as f32 * inv,
        (tile.y + 1) as f32 * inv,
    )
}

/// Clip space to tile UV and [0, 1] depth
///
/// X/Y go from [-1, 1] to the tile's `1/s` sub-rectangle. Depth goes from
/// [-1, 1] to [0, 1], or to [1, 0] for reversed-Z targets.
pub fn scale_bias_matrix(tile: UVec2, tiles_per_side: u32, reversed_z: bool) -> Mat4 {
    let inv = 1.0 / tiles_per_side as f32;
    let half = 0.5 * inv;
    let depth_scale = if reversed_z { -0.5 } else { 0.5 };

    Mat4::from_cols(
        Vec4::new(half, 0.0, 0.0, 0.0),
        Vec4::new(0.0, half, 0.0, 0.0),
        Vec4::new(0.0, 0.0, depth_scale, 0.0),
        Vec4::new(
            (tile.x as f32 + 0.5) * inv,
            (tile.y as f32 + 0.5) * inv,
            0.5,
            1.0,
        ),
    )
}
