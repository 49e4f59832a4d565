//! # penumbra_structures - Per-Frame Selection Structures
//!
//! Small, allocation-conscious building blocks for culling passes:
//! - Handle: typed generational `(index, generation)` key
//! - BoundedTopK: fixed-capacity max-heap keeping the K best entries

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod handle;
pub mod top_k;

pub use handle::Handle;
pub use top_k::BoundedTopK;

pub mod prelude {
    pub use crate::handle::Handle;
    pub use crate::top_k::BoundedTopK;
}
