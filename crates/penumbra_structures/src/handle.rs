//! Typed generational handles
//!
//! A [`Handle`] pairs a slot index with the generation the slot had when the
//! handle was issued. Owners bump a slot's generation whenever it is freed, so
//! a handle kept past its slot's lifetime stops matching and is rejected
//! instead of silently aliasing whatever reuses the slot.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// Generational key for a slot holding a `T`
#[repr(C)]
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Index reserved for the null handle
    pub const NULL_INDEX: u32 = u32::MAX;

    /// Create a handle from raw parts
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Create a null handle that no owner ever considers valid
    #[inline]
    pub const fn null() -> Self {
        Self::new(Self::NULL_INDEX, 0)
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.index == Self::NULL_INDEX
    }

    /// Slot index
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack into a single `u64` (generation in the high half)
    #[inline]
    pub const fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Inverse of [`Handle::to_bits`]
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self::new(bits as u32, (bits >> 32) as u32)
    }
}

// Manual impls so `T` needs no bounds
impl<T> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_bits().hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Handle(null)")
        } else {
            write!(f, "Handle({}v{})", self.index, self.generation)
        }
    }
}

impl<T> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn test_handle_null() {
        let h: Handle<Marker> = Handle::default();
        assert!(h.is_null());
        assert!(!Handle::<Marker>::new(0, 0).is_null());
    }

    #[test]
    fn test_handle_bits_round_trip() {
        let h: Handle<Marker> = Handle::new(7, 3);
        let back = Handle::<Marker>::from_bits(h.to_bits());
        assert_eq!(back, h);
        assert_eq!(back.index(), 7);
        assert_eq!(back.generation(), 3);
    }

    #[test]
    fn test_handle_equality_includes_generation() {
        let a: Handle<Marker> = Handle::new(1, 0);
        let b: Handle<Marker> = Handle::new(1, 1);
        assert_ne!(a, b);
        assert_eq!(format!("{:?}", b), "Handle(1v1)");
    }
}
