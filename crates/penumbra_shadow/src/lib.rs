//! Per-Object Shadow Casters
//!
//! Dedicated shadow maps for a handful of important objects, packed into a
//! single atlas each frame.
//!
//! # Architecture
//!
//! - **Registry**: generational handles for registered casters
//! - **Culler**: parallel light-space fitting and priority selection
//! - **Atlas**: square tile layout and per-tile texture matrices
//! - **Data**: GPU-ready records for shader lookups
//! - **System**: host facade driving the per-frame flow
//!
//! # Usage
//!
//! ```ignore
//! use penumbra_shadow::prelude::*;
//!
//! let mut shadows = ShadowCasterSystem::new(ShadowCasterConfig::default());
//! let hero = shadows.register_with_renderers(hero_bounds, RendererRange::new(0, 3));
//!
//! // Per frame
//! shadows.update_bounds(hero, hero_bounds);
//! let camera = CameraFrustum::from_view_projection(&view, &projection);
//! shadows.cull_dual(&camera, sun_rotation, 8);
//!
//! for usage in ShadowUsage::ALL {
//!     let pass = shadows.pass(usage);
//!     upload(pass.gpu_data().casters_bytes());
//!     pass.draw_all(&mut my_sink);
//! }
//! ```
//!
//! # Hot-Reload Support
//!
//! [`ShadowCasterConfig`] round-trips through serde; apply a reloaded config
//! with [`ShadowCasterSystem::set_config`]. Atlas textures are owned by the
//! host and must be resized by it when the layout grows.

pub mod atlas;
pub mod bounds;
pub mod camera;
pub mod config;
pub mod culler;
pub mod data;
pub mod error;
pub mod registry;
pub mod system;

pub use atlas::{AtlasLayout, AtlasPacker, AtlasStats, AtlasTile};
pub use bounds::Aabb;
pub use camera::CameraFrustum;
pub use config::{
    ShadowCasterConfig,
    ShadowCasterQuality,
    ShadowUsage,
    MAX_SHADOW_CASTERS,
};
pub use culler::{
    self_shadow_rotation,
    CasterCuller,
    CullCandidate,
    CullParams,
    CullResult,
    CullStats,
};
pub use data::{GpuShadowCaster, GpuShadowCasterUniforms, ShadowCasterBuffer};
pub use error::{ShadowError, ShadowResult};
pub use registry::{CasterHandle, CasterRecord, RendererRange, ShadowCasterRegistry};
pub use system::{CasterDraw, ShadowCasterPass, ShadowCasterSystem, ShadowDrawSink};

pub mod prelude {
    pub use crate::atlas::{AtlasLayout, AtlasPacker};
    pub use crate::bounds::Aabb;
    pub use crate::camera::CameraFrustum;
    pub use crate::config::{ShadowCasterConfig, ShadowUsage};
    pub use crate::culler::{CasterCuller, CullResult};
    pub use crate::registry::{CasterHandle, RendererRange};
    pub use crate::system::{CasterDraw, ShadowCasterSystem, ShadowDrawSink};
}
