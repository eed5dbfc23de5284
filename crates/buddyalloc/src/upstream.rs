//! Upstream allocators that provide arena backing buffers.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Source of arena backing buffers.
pub trait UpstreamAllocator: Send + Sync {
    /// Allocate a buffer for `layout`, or `None` on failure.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return a buffer produced by [`Self::allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `self.allocate(layout)` with the same `layout`
    /// and must not have been returned already.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process heap, via the global allocator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SystemHeap;

impl UpstreamAllocator for SystemHeap {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: layout has non-zero size.
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded caller contract.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

/// Upstream wrapper that counts calls and can be told to refuse requests.
#[derive(Debug, Default)]
pub struct TrackingUpstream<U = SystemHeap> {
    inner: U,
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    live_bytes: AtomicUsize,
    refuse: AtomicBool,
}

impl TrackingUpstream<SystemHeap> {
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(SystemHeap)
    }
}

impl<U: UpstreamAllocator> TrackingUpstream<U> {
    #[must_use]
    pub fn wrap(inner: U) -> Self {
        Self {
            inner,
            allocations: AtomicUsize::new(0),
            deallocations: AtomicUsize::new(0),
            live_bytes: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
        }
    }

    /// Make subsequent [`UpstreamAllocator::allocate`] calls fail.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of `allocate` calls, successful or not.
    #[must_use]
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn deallocations(&self) -> usize {
        self.deallocations.load(Ordering::SeqCst)
    }

    /// Bytes handed out and not yet returned.
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::SeqCst)
    }
}

impl<U: UpstreamAllocator> UpstreamAllocator for TrackingUpstream<U> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return None;
        }
        let ptr = self.inner.allocate(layout)?;
        self.live_bytes.fetch_add(layout.size(), Ordering::SeqCst);
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.deallocations.fetch_add(1, Ordering::SeqCst);
        self.live_bytes.fetch_sub(layout.size(), Ordering::SeqCst);
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.deallocate(ptr, layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_heap_roundtrip() {
        let layout = Layout::from_size_align(64, 16).unwrap();
        let ptr = SystemHeap.allocate(layout).expect("alloc");
        assert_eq!(ptr.as_ptr().addr() % 16, 0);
        // SAFETY: pointer came from the same allocator and layout.
        unsafe { SystemHeap.deallocate(ptr, layout) };
    }

    #[test]
    fn system_heap_rejects_zero_size() {
        let layout = Layout::from_size_align(0, 1).unwrap();
        assert!(SystemHeap.allocate(layout).is_none());
    }

    #[test]
    fn tracking_counts_and_refuses() {
        let upstream = TrackingUpstream::new();
        let layout = Layout::from_size_align(128, 16).unwrap();

        let ptr = upstream.allocate(layout).expect("alloc");
        assert_eq!(upstream.allocations(), 1);
        assert_eq!(upstream.live_bytes(), 128);

        // SAFETY: pointer came from the same allocator and layout.
        unsafe { upstream.deallocate(ptr, layout) };
        assert_eq!(upstream.deallocations(), 1);
        assert_eq!(upstream.live_bytes(), 0);

        upstream.set_refuse(true);
        assert!(upstream.allocate(layout).is_none());
        assert_eq!(upstream.allocations(), 2);
        assert_eq!(upstream.live_bytes(), 0);
    }
}
