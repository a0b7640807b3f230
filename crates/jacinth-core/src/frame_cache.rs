//! Per-thread pool of retired frames
//!
//! Frames are created and destroyed on every call. The cache keeps a bounded
//! number of popped managed frames, bucketed by their slot shape, and hands
//! them back out for methods of the same shape. Every frame is cleared when
//! it is returned so pooled frames never keep objects alive.
//!
//! The cache is owned by a single [`crate::thread::Thread`] and is not
//! synchronized.

use crate::class::Method;
use crate::frame::{Frame, FrameKind};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Slot dimensions of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameShape {
    /// Number of local variable slots
    pub max_locals: usize,
    /// Operand stack capacity
    pub max_stack: usize,
}

impl FrameShape {
    /// Shape of frames for `method`
    pub fn of(method: &Method) -> Self {
        Self {
            max_locals: method.max_locals(),
            max_stack: method.max_stack(),
        }
    }
}

/// Frame cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCacheStats {
    /// Borrows served from the pool
    pub hits: u64,
    /// Borrows that allocated a fresh frame
    pub misses: u64,
    /// Frames currently pooled
    pub pooled: usize,
    /// Maximum number of pooled frames
    pub capacity: usize,
}

/// Bounded pool of reusable frames
pub struct FrameCache {
    pools: FxHashMap<FrameShape, Vec<Frame>>,
    capacity: usize,
    pooled: usize,
    hits: u64,
    misses: u64,
}

impl FrameCache {
    /// Create a cache that pools at most `capacity` frames
    pub fn new(capacity: usize) -> Self {
        Self {
            pools: FxHashMap::default(),
            capacity,
            pooled: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Get a cleared managed frame sized for `method`
    pub fn borrow(&mut self, method: &Arc<Method>) -> Frame {
        let shape = FrameShape::of(method);
        if let Some(mut frame) = self.pools.get_mut(&shape).and_then(Vec::pop) {
            self.pooled -= 1;
            self.hits += 1;
            frame.rebind(Arc::clone(method));
            return frame;
        }

        self.misses += 1;
        log::debug!(
            "frame cache miss for {:?} ({} locals, {} stack)",
            method,
            shape.max_locals,
            shape.max_stack
        );
        Frame::new(Arc::clone(method), FrameKind::Managed)
    }

    /// Return a popped frame to the pool
    ///
    /// The frame is cleared first. Native and shim frames, and frames beyond
    /// the pool capacity, are dropped.
    pub fn release(&mut self, mut frame: Frame) {
        frame.clear();
        if frame.kind() != FrameKind::Managed || self.pooled >= self.capacity {
            return;
        }
        self.pools.entry(frame.shape()).or_default().push(frame);
        self.pooled += 1;
    }

    /// Number of frames currently pooled
    pub fn len(&self) -> usize {
        self.pooled
    }

    /// Check if no frames are pooled
    pub fn is_empty(&self) -> bool {
        self.pooled == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> FrameCacheStats {
        FrameCacheStats {
            hits: self.hits,
            misses: self.misses,
            pooled: self.pooled,
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{flags, Class, ClassBuilder};
    use crate::heap::Heap;
    use crate::runtime::HeapOptions;
    use crate::value::Slot;

    fn class() -> Arc<Class> {
        ClassBuilder::new("Shapes")
            .method("a", "()V", flags::ACC_STATIC, 2, 3)
            .method("b", "()V", flags::ACC_STATIC, 2, 3)
            .method("c", "()V", flags::ACC_STATIC, 1, 1)
            .native_method("n", "()V", flags::ACC_STATIC)
            .build()
            .unwrap()
    }

    #[test]
    fn test_borrow_fresh_then_recycled() {
        let class = class();
        let a = class.get_method("a", "()V").unwrap();
        let b = class.get_method("b", "()V").unwrap();
        let mut cache = FrameCache::new(4);

        let frame = cache.borrow(&a);
        assert_eq!(cache.stats().misses, 1);
        cache.release(frame);
        assert_eq!(cache.len(), 1);

        // Same shape, different method
        let frame = cache.borrow(&b);
        assert!(Arc::ptr_eq(frame.method(), &b));
        assert_eq!(cache.stats().hits, 1);
        assert!(cache.is_empty());

        let c = class.get_method("c", "()V").unwrap();
        let frame = cache.borrow(&c);
        assert_eq!(frame.locals().len(), 1);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_release_clears_slots() {
        let class = class();
        let a = class.get_method("a", "()V").unwrap();
        let heap = Heap::new(&HeapOptions::default());
        let obj = heap.alloc_object(&class).unwrap();
        let mut cache = FrameCache::new(4);

        let mut frame = cache.borrow(&a);
        frame.locals_mut().set_ref(0, Some(Arc::clone(&obj))).unwrap();
        frame.operand_stack_mut().push_ref(Some(Arc::clone(&obj))).unwrap();
        frame.set_next_pc(12);
        frame.on_exit(|| Ok(()));
        assert_eq!(Arc::strong_count(&obj), 4);

        cache.release(frame);
        // heap + local handle only: the pooled frame holds nothing
        assert_eq!(Arc::strong_count(&obj), 2);

        let frame = cache.borrow(&a);
        assert!(frame.locals().slots().iter().all(Slot::is_empty));
        assert!(frame.operand_stack().is_empty());
        assert_eq!(frame.next_pc(), 0);
        assert_eq!(frame.exit_hook_count(), 0);
    }

    #[test]
    fn test_capacity_bound() {
        let class = class();
        let a = class.get_method("a", "()V").unwrap();
        let mut cache = FrameCache::new(1);

        let f1 = cache.borrow(&a);
        let f2 = cache.borrow(&a);
        cache.release(f1);
        cache.release(f2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_native_frames_not_pooled() {
        let class = class();
        let n = class.get_method("n", "()V").unwrap();
        let mut cache = FrameCache::new(4);

        cache.release(Frame::new(n, FrameKind::Native));
        assert!(cache.is_empty());
    }
}
