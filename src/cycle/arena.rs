//! Fixed-capacity arenas with stable index handles.
//!
//! Every pool in a loaded cycle (components, motor configs, motor steps,
//! sensor triggers) is an [`Arena`].  Allocation never grows past `N`
//! entries; a full pool is reported as [`CapacityExceeded`] and the caller
//! decides how to degrade.  Handles are plain indices, so a [`Cycle`]
//! can be shared across tasks without self-references.
//!
//! [`Cycle`]: super::Cycle

use core::fmt;
use core::marker::PhantomData;

use crate::error::{CapacityExceeded, Pool};

/// Index of one element in an [`Arena<T, N>`].
pub struct Handle<T> {
    index: u16,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    const fn new(index: usize) -> Self {
        Self { index: index as u16, _marker: PhantomData }
    }

    pub const fn index(self) -> usize {
        self.index as usize
    }
}

// Manual impls: derives would require `T: Clone` etc.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// A contiguous run of elements in an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    start: u16,
    len: u16,
}

impl Span {
    pub const EMPTY: Span = Span { start: 0, len: 0 };

    pub const fn len(self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    pub const fn start(self) -> usize {
        self.start as usize
    }

    pub const fn end(self) -> usize {
        self.start as usize + self.len as usize
    }
}

/// Bounded pool of `T` with room for exactly `N` elements.
///
/// The `N` slots live in one heap block taken when the arena is created,
/// so a [`Cycle`](super::Cycle) stays small enough to move between tasks.
#[derive(Debug)]
pub struct Arena<T, const N: usize> {
    pool: Pool,
    items: Box<heapless::Vec<T, N>>,
}

impl<T, const N: usize> Arena<T, N> {
    pub fn new(pool: Pool) -> Self {
        Self { pool, items: Box::default() }
    }

    pub fn alloc(&mut self, item: T) -> Result<Handle<T>, CapacityExceeded> {
        let index = self.items.len();
        self.items
            .push(item)
            .map_err(|_| CapacityExceeded { pool: self.pool, capacity: N })?;
        Ok(Handle::new(index))
    }

    /// Allocate consecutive elements until `items` ends or the pool fills.
    ///
    /// Returns the span of what fit and whether anything was cut off.
    pub fn alloc_run(&mut self, items: impl IntoIterator<Item = T>) -> (Span, bool) {
        let start = self.items.len();
        let mut truncated = false;
        for item in items {
            if self.items.push(item).is_err() {
                truncated = true;
                break;
            }
        }
        let span = Span { start: start as u16, len: (self.items.len() - start) as u16 };
        (span, truncated)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.index())
    }

    /// Elements covered by `span`; empty if the span is foreign to this arena.
    pub fn slice(&self, span: Span) -> &[T] {
        self.items.get(span.start()..span.end()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn remaining(&self) -> usize {
        N - self.items.len()
    }

    /// Drop every element.  Slots are reused from index 0.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
