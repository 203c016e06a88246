//! Object pooling utilities for allocation reuse.
//!
//! This module provides [`ObjectPool`], a per-type free list shared by the
//! entity tree, the timer scheduler and the coroutine lock. Instead of
//! dropping a value that is no longer in use, its owner recycles it into
//! the pool; the next `fetch` of the same type hands it back.
//!
//! # Contract
//!
//! The pool performs **no** initialization or reset. Whoever recycles a
//! value resets it first (see [`Poolable`]), and whoever fetches a value
//! fully reinitializes every field it relies on.
//!
//! Free lists are keyed by a stable type tag ([`TypeId`]). Values whose
//! concrete type is only known at runtime go through the `*_erased`
//! methods with an explicit key.
//!
//! The pool is not thread-safe: it assumes single-threaded cooperative
//! access and uses interior mutability so it can be shared via `Rc`.
//!
//! # Example
//!
//! ```
//! use moye_core::pool::{ObjectPool, Poolable};
//!
//! #[derive(Debug, Default)]
//! struct Buffer {
//!     data: Vec<u8>,
//! }
//!
//! impl Poolable for Buffer {
//!     fn reset(&mut self) {
//!         self.data.clear();
//!     }
//! }
//!
//! let pool = ObjectPool::new();
//!
//! let mut buf = pool.fetch::<Buffer>(); // nothing recycled yet: fresh default
//! buf.data.extend_from_slice(&[1, 2, 3]);
//!
//! // Reset before recycling; capacity is kept for the next user.
//! buf.reset();
//! pool.recycle(buf);
//!
//! let buf = pool.fetch::<Buffer>();
//! assert!(buf.data.capacity() >= 3);
//! ```

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

/// Default number of instances a single free list may hold.
pub const DEFAULT_POOL_CAPACITY: usize = 1000;

/// Trait for types that are recycled through an [`ObjectPool`].
///
/// Owners call [`reset`](Poolable::reset) right before
/// [`ObjectPool::recycle`], so the pool never hands out stale state.
pub trait Poolable: Default + 'static {
    /// Clear the value, preserving allocated capacity where possible.
    fn reset(&mut self);
}

impl<K: 'static, V: 'static> Poolable for HashMap<K, V> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl<T: 'static> Poolable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Per-type free lists of recycled instances.
pub struct ObjectPool {
    queues: RefCell<HashMap<TypeId, VecDeque<Box<dyn Any>>>>,
    capacity: usize,
}

impl ObjectPool {
    /// Creates an empty pool with [`DEFAULT_POOL_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }

    /// Creates an empty pool whose free lists stop growing past `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queues: RefCell::new(HashMap::new()),
            capacity,
        }
    }

    /// Returns the per-type capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a recycled `T` if one is available, otherwise `T::default()`.
    pub fn fetch<T: Default + 'static>(&self) -> T {
        self.try_fetch::<T>().unwrap_or_default()
    }

    /// Returns a recycled `T`, or `None` if the free list is empty.
    pub fn try_fetch<T: 'static>(&self) -> Option<T> {
        self.fetch_erased(TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Pushes `value` onto its type's free list.
    ///
    /// Returns `false` (and drops the value) when the list already holds
    /// more than [`capacity`](Self::capacity) entries.
    pub fn recycle<T: 'static>(&self, value: T) -> bool {
        self.recycle_erased(
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            Box::new(value),
        )
    }

    /// Pops the oldest recycled value stored under `key`.
    pub fn fetch_erased(&self, key: TypeId) -> Option<Box<dyn Any>> {
        self.queues
            .borrow_mut()
            .get_mut(&key)
            .and_then(|queue| queue.pop_front())
    }

    /// Pushes a type-erased value under `key`. `name` is used for diagnostics.
    pub fn recycle_erased(&self, key: TypeId, name: &str, value: Box<dyn Any>) -> bool {
        let mut queues = self.queues.borrow_mut();
        let queue = queues.entry(key).or_default();
        if queue.len() > self.capacity {
            log::warn!("pool {name} is too large");
            return false;
        }
        queue.push_back(value);
        true
    }

    /// Number of recycled `T` instances currently held.
    pub fn len<T: 'static>(&self) -> usize {
        self.len_erased(TypeId::of::<T>())
    }

    /// Number of recycled values held under `key`.
    pub fn len_erased(&self, key: TypeId) -> usize {
        self.queues.borrow().get(&key).map_or(0, VecDeque::len)
    }

    /// Returns `true` if no free list holds any value.
    pub fn is_empty(&self) -> bool {
        self.queues.borrow().values().all(VecDeque::is_empty)
    }

    /// Drops every recycled value.
    pub fn clear(&self) {
        self.queues.borrow_mut().clear();
    }
}

impl Default for ObjectPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("types", &self.queues.borrow().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct TestBuffer {
        data: Vec<u32>,
    }

    impl Poolable for TestBuffer {
        fn reset(&mut self) {
            self.data.clear();
        }
    }

    #[test]
    fn test_fetch_from_empty_pool_constructs_default() {
        let pool = ObjectPool::new();
        let buf = pool.fetch::<TestBuffer>();
        assert_eq!(buf, TestBuffer::default());
        assert!(pool.try_fetch::<TestBuffer>().is_none());
    }

    #[test]
    fn test_recycle_then_fetch_reuses_instance() {
        let pool = ObjectPool::new();
        let mut buf = TestBuffer {
            data: vec![1, 2, 3, 4, 5],
        };
        buf.reset();
        assert!(pool.recycle(buf));
        assert_eq!(pool.len::<TestBuffer>(), 1);

        let buf = pool.fetch::<TestBuffer>();
        assert!(buf.data.is_empty());
        assert!(buf.data.capacity() >= 5);
        assert_eq!(pool.len::<TestBuffer>(), 0);
    }

    #[test]
    fn test_pool_does_not_reset() {
        let pool = ObjectPool::new();
        pool.recycle(TestBuffer { data: vec![7] });
        assert_eq!(pool.fetch::<TestBuffer>().data, vec![7]);
    }

    #[test]
    fn test_fetch_is_fifo() {
        let pool = ObjectPool::new();
        pool.recycle(TestBuffer { data: vec![1] });
        pool.recycle(TestBuffer { data: vec![2] });
        assert_eq!(pool.fetch::<TestBuffer>().data, vec![1]);
        assert_eq!(pool.fetch::<TestBuffer>().data, vec![2]);
    }

    #[test]
    fn test_types_are_isolated() {
        let pool = ObjectPool::new();
        pool.recycle(TestBuffer { data: vec![1] });
        pool.recycle(vec![1u8, 2]);
        assert_eq!(pool.len::<TestBuffer>(), 1);
        assert_eq!(pool.len::<Vec<u8>>(), 1);
        assert!(pool.try_fetch::<Vec<u16>>().is_none());
    }

    #[test]
    fn test_capacity_cap_drops_overflow() {
        let pool = ObjectPool::with_capacity(2);
        // "more than capacity" means the list may reach capacity + 1.
        assert!(pool.recycle(1u32));
        assert!(pool.recycle(2u32));
        assert!(pool.recycle(3u32));
        assert!(!pool.recycle(4u32));
        assert_eq!(pool.len::<u32>(), 3);
    }

    #[test]
    fn test_default_capacity_keeps_every_instance_up_to_cap() {
        let pool = ObjectPool::new();
        for i in 0..=DEFAULT_POOL_CAPACITY {
            assert!(pool.recycle(i));
        }
        assert!(!pool.recycle(0usize));
        assert_eq!(pool.len::<usize>(), DEFAULT_POOL_CAPACITY + 1);
    }

    #[test]
    fn test_erased_round_trip() {
        struct Marker;
        let pool = ObjectPool::new();
        let key = TypeId::of::<Marker>();
        assert!(pool.recycle_erased(key, "Marker", Box::new(String::from("node"))));
        assert_eq!(pool.len_erased(key), 1);
        let value = pool.fetch_erased(key).unwrap();
        assert_eq!(*value.downcast::<String>().unwrap(), "node");
    }

    #[test]
    fn test_live_instances_bounded_by_recycled_plus_new() {
        let pool = ObjectPool::new();
        let mut constructed = 0;
        let mut live = Vec::new();
        for round in 0..5 {
            for _ in 0..round {
                if pool.try_fetch::<TestBuffer>().is_none() {
                    constructed += 1;
                }
                live.push(TestBuffer::default());
            }
            let recycled = live.len();
            for mut buf in live.drain(..) {
                buf.reset();
                pool.recycle(buf);
            }
            assert!(pool.len::<TestBuffer>() <= recycled);
        }
        assert!(constructed <= 4);
    }

    #[test]
    fn test_clear() {
        let pool = ObjectPool::new();
        pool.recycle(1u8);
        assert!(!pool.is_empty());
        pool.clear();
        assert!(pool.is_empty());
    }
}
