//! Reusable byte buffers shared between streams.
//!
//! Parsers and generators check a buffer out of a [`BufferPool`] when they
//! are created and hand it back when closed or dropped. A checked-out
//! buffer is owned by exactly one stream; the pool only holds buffers that
//! nobody uses.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Default number of idle buffers a pool keeps.
pub const DEFAULT_MAX_POOLED: usize = 16;

/// A set of idle byte buffers available for checkout.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_pooled: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOLED)
    }
}

impl BufferPool {
    /// Pool keeping at most `max_pooled` idle buffers.
    pub fn new(max_pooled: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_pooled,
        }
    }

    /// Shared pool, ready to pass to parser and generator configs.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take an empty buffer with at least `min_capacity` bytes reserved.
    pub fn checkout(self: &Arc<Self>, min_capacity: usize) -> PooledBuffer {
        let recycled = {
            let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
            free.pop()
        };
        let mut buf = recycled.unwrap_or_default();
        buf.clear();
        buf.reserve(min_capacity);
        PooledBuffer {
            buf,
            pool: Some(Arc::clone(self)),
        }
    }

    /// Number of idle buffers currently held.
    pub fn available(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn checkin(&self, buf: Vec<u8>) {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.max_pooled {
            trace!(capacity = buf.capacity(), "buffer returned to pool");
            free.push(buf);
        }
    }
}

/// A byte buffer that returns to its pool when dropped.
#[derive(Debug, Default)]
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Option<Arc<BufferPool>>,
}

impl PooledBuffer {
    /// Buffer that belongs to no pool.
    pub fn unpooled(min_capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(min_capacity),
            pool: None,
        }
    }

    /// Checkout from `pool` when given, else a fresh buffer.
    pub fn acquire(pool: Option<&Arc<BufferPool>>, min_capacity: usize) -> Self {
        match pool {
            Some(pool) => pool.checkout(min_capacity),
            None => Self::unpooled(min_capacity),
        }
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.checkin(std::mem::take(&mut self.buf));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_and_return() {
        let pool = BufferPool::shared();
        assert_eq!(pool.available(), 0);
        {
            let mut buf = pool.checkout(64);
            buf.extend_from_slice(b"abc");
            assert!(buf.capacity() >= 64);
        }
        assert_eq!(pool.available(), 1);

        let buf = pool.checkout(8);
        assert!(buf.is_empty(), "recycled buffers come back cleared");
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_pool_is_bounded() {
        let pool = Arc::new(BufferPool::new(1));
        let a = pool.checkout(8);
        let b = pool.checkout(8);
        drop(a);
        drop(b);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_unpooled_is_not_returned() {
        let pool = BufferPool::shared();
        drop(PooledBuffer::acquire(None, 8));
        assert_eq!(pool.available(), 0);
    }
}
