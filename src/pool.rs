//! Buffer pool for relay copying.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use bytes::BytesMut;

/// One MTU; the size of every relay buffer.
pub const RELAY_BUFFER_SIZE: usize = 1500;

static RELAY_POOL: LazyLock<BufferPool> = LazyLock::new(BufferPool::default);

/// The process-wide pool shared by all relays.
pub fn relay_pool() -> &'static BufferPool {
    &RELAY_POOL
}

/// Configuration for buffer pool
#[derive(Debug, Clone, Copy)]
pub struct BufferPoolConfig {
    /// Length of each buffer
    pub buffer_size: usize,
    /// Maximum number of idle buffers kept in the pool
    pub max_pooled: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            buffer_size: RELAY_BUFFER_SIZE,
            max_pooled: 64,
        }
    }
}

/// A thread-safe pool of reusable [`BytesMut`] buffers of a fixed length.
///
/// [`BufferPool::acquire`] hands out a [`PooledBuf`] guard that returns its
/// buffer on drop, so a buffer comes back even when the holder errors out or
/// is cancelled.
#[derive(Clone, Debug)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    buffers: Mutex<VecDeque<BytesMut>>,
    config: BufferPoolConfig,
}

impl BufferPool {
    /// Creates an empty pool; buffers are allocated on first use.
    pub fn new(config: BufferPoolConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                buffers: Mutex::new(VecDeque::with_capacity(config.max_pooled)),
                config,
            }),
        }
    }

    /// Get a buffer from the pool, or allocate one if none is idle.
    pub fn acquire(&self) -> PooledBuf {
        let reused = self
            .inner
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let size = self.inner.config.buffer_size;
        let buf = match reused {
            Some(mut buf) => {
                buf.resize(size, 0);
                buf
            }
            None => BytesMut::zeroed(size),
        };
        PooledBuf {
            buf: Some(buf),
            pool: self.clone(),
        }
    }

    fn release(&self, mut buf: BytesMut) {
        let mut buffers = self
            .inner
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if buffers.len() < self.inner.config.max_pooled {
            buf.clear();
            buffers.push_back(buf);
        }
    }

    /// Number of idle buffers.
    pub fn count(&self) -> usize {
        self.inner
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(BufferPoolConfig::default())
    }
}

/// A buffer on loan from a [`BufferPool`].
pub struct PooledBuf {
    buf: Option<BytesMut>,
    pool: BufferPool,
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
