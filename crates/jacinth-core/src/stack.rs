//! Call stack management
//!
//! This module provides the bounded, thread-owned stack of [`Frame`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Frame N (current)                   │  ← top()
//! │   operand stack / locals / hooks    │
//! ├─────────────────────────────────────┤
//! │ Frame N-1 (caller)                  │  ← top_n(1)
//! ├─────────────────────────────────────┤
//! │ ...                                 │
//! ├─────────────────────────────────────┤
//! │ Frame 0                             │
//! └─────────────────────────────────────┘
//! ```
//!
//! Exceeding `max_depth` is a stack overflow. The stack itself never runs
//! exit hooks or recycles frames; [`crate::thread::Thread::pop_frame`] does.

use crate::frame::Frame;
use crate::object::ObjectRef;
use crate::{VmError, VmResult};

/// Default maximum call depth (in frames)
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Bounded LIFO of frames
pub struct CallStack {
    /// Frames, bottom first
    frames: Vec<Frame>,

    /// Maximum number of frames
    max_depth: usize,
}

impl CallStack {
    /// Create a stack with the default depth limit
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Create a stack with a specific depth limit
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            frames: Vec::with_capacity(max_depth.min(64)),
            max_depth,
        }
    }

    /// Push a frame
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackOverflow` if the stack is full. The stack is
    /// left unchanged and `frame` is dropped.
    #[inline]
    pub fn push(&mut self, frame: Frame) -> VmResult<()> {
        if self.is_full() {
            log::warn!(
                "call stack overflow at depth {} pushing {:?}",
                self.max_depth,
                frame.method()
            );
            return Err(VmError::StackOverflow {
                max_depth: self.max_depth,
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Remove the top frame
    #[inline]
    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Get the top frame
    #[inline]
    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Get mutable reference to the top frame
    #[inline]
    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Get the frame N below the top (0 = top)
    #[inline]
    pub fn top_n(&self, n: usize) -> Option<&Frame> {
        let len = self.frames.len();
        if n >= len {
            return None;
        }
        self.frames.get(len - 1 - n)
    }

    /// Get current depth
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Check if stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Check if another push would overflow
    #[inline]
    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.max_depth
    }

    /// Get maximum depth
    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    // ========================================================================
    // GC Root Integration
    // ========================================================================

    /// Visit every object referenced from any frame (for precise GC)
    pub fn visit_roots<F>(&self, mut visitor: F)
    where
        F: FnMut(&ObjectRef),
    {
        for frame in &self.frames {
            frame.visit_roots(&mut visitor);
        }
    }

    /// Iterate over frames, bottom first
    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    // ========================================================================
    // Debugging & Inspection
    // ========================================================================

    /// Render a stack trace, innermost frame first
    pub fn trace(&self) -> String {
        let mut out = String::new();
        for frame in self.frames.iter().rev() {
            let method = frame.method();
            out.push_str(&format!(
                "\tat {}.{}{} (pc {})\n",
                method.class_name(),
                method.name(),
                method.descriptor(),
                frame.next_pc()
            ));
        }
        out
    }

    /// Get stack statistics
    pub fn stats(&self) -> StackStats {
        StackStats {
            depth: self.frames.len(),
            max_depth: self.max_depth,
            utilization: if self.max_depth > 0 {
                (self.frames.len() as f64 / self.max_depth as f64) * 100.0
            } else {
                0.0
            },
        }
    }
}

impl<'a> IntoIterator for &'a CallStack {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Stack statistics
#[derive(Debug, Clone)]
pub struct StackStats {
    /// Current number of frames
    pub depth: usize,
    /// Maximum number of frames
    pub max_depth: usize,
    /// Utilization percentage
    pub utilization: f64,
}
