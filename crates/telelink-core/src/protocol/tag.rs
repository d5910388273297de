//! Delivery tags: random per-send identifiers.
//!
//! Tags are drawn from the OS CSPRNG; there is no counter to coordinate, so
//! allocation is lock-free and safe from any task. With the default 16 bytes
//! a collision among in-flight sends is negligible.

use std::fmt;

use bytes::Bytes;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

/// Default tag length (bytes).
pub const DEFAULT_TAG_LEN: usize = 16;
/// Shortest tag the allocator will produce.
pub const MIN_TAG_LEN: usize = 8;
/// Longest tag the wire allows.
pub const MAX_TAG_LEN: usize = 32;

/// Opaque per-send identifier.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DeliveryTag(Bytes);

impl DeliveryTag {
    pub fn from_bytes(b: impl Into<Bytes>) -> Self {
        Self(b.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeliveryTag({self})")
    }
}

/// Stateless tag allocator.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryTagAllocator {
    len: usize,
}

impl Default for DeliveryTagAllocator {
    fn default() -> Self {
        Self { len: DEFAULT_TAG_LEN }
    }
}

impl DeliveryTagAllocator {
    /// Allocator producing `len`-byte tags, clamped to the allowed range.
    pub fn new(len: usize) -> Self {
        Self {
            len: len.clamp(MIN_TAG_LEN, MAX_TAG_LEN),
        }
    }

    pub fn tag_len(&self) -> usize {
        self.len
    }

    /// Fresh tag from the OS randomness source.
    pub fn allocate(&self) -> DeliveryTag {
        self.allocate_with(&mut OsRng)
    }

    /// Fresh tag from a caller-supplied cryptographic RNG.
    pub fn allocate_with<R: RngCore + CryptoRng>(&self, rng: &mut R) -> DeliveryTag {
        let mut buf = vec![0u8; self.len];
        rng.fill_bytes(&mut buf);
        DeliveryTag(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn ten_thousand_tags_are_unique() {
        let alloc = DeliveryTagAllocator::default();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(alloc.allocate()));
        }
    }

    #[test]
    fn concurrent_allocation_is_unique() {
        let alloc = DeliveryTagAllocator::default();
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let seen = Arc::clone(&seen);
                std::thread::spawn(move || {
                    let local: Vec<_> = (0..2_500).map(|_| alloc.allocate()).collect();
                    let mut g = seen.lock().unwrap_or_else(|p| p.into_inner());
                    for t in local {
                        assert!(g.insert(t));
                    }
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().is_ok());
        }
        assert_eq!(seen.lock().map(|g| g.len()).unwrap_or(0), 10_000);
    }

    #[test]
    fn length_is_clamped() {
        assert_eq!(DeliveryTagAllocator::new(1).tag_len(), MIN_TAG_LEN);
        assert_eq!(DeliveryTagAllocator::new(64).tag_len(), MAX_TAG_LEN);
        assert_eq!(DeliveryTagAllocator::new(20).allocate().as_bytes().len(), 20);
    }

    #[test]
    fn display_is_hex() {
        let t = DeliveryTag::from_bytes(vec![0x0a, 0xff]);
        assert_eq!(t.to_string(), "0aff");
    }
}
