use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct Inner {
    cached: Mutex<VecDeque<Vec<u8>>>,
    reserve_size: usize,
    max_cached: usize,
}

/// A cache of reusable byte buffers, avoiding a fresh heap allocation on
/// every acquire once the pool has warmed up.
///
/// Grounded on `BufferMgr<ContainerType>`: `acquire` hands back a cached,
/// cleared buffer if one is available or allocates a new one reserved to
/// `reserve_size`; `release` clears the buffer and returns it to the cache,
/// unless the cache already holds `max_cached` entries, in which case the
/// buffer is simply dropped. A released buffer is never handed out again
/// without first being cleared, so a caller can never observe another
/// caller's bytes.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

impl BufferPool {
    pub fn new(reserve_size: usize, max_cached: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                cached: Mutex::new(VecDeque::with_capacity(max_cached)),
                reserve_size,
                max_cached,
            }),
        }
    }

    pub fn acquire(&self) -> Vec<u8> {
        let mut cached = self.inner.cached.lock().unwrap();
        cached.pop_front().unwrap_or_else(|| Vec::with_capacity(self.inner.reserve_size))
    }

    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut cached = self.inner.cached.lock().unwrap();
        if cached.len() < self.inner.max_cached {
            cached.push_back(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_released_buffers() {
        let pool = BufferPool::new(64, 2);
        let mut buf = pool.acquire();
        assert!(buf.capacity() >= 64);
        buf.extend_from_slice(b"hello");
        pool.release(buf);

        let reused = pool.acquire();
        assert!(reused.is_empty(), "a released buffer must never be handed out with old contents");
        assert!(reused.capacity() >= 64);
    }

    #[test]
    fn caps_cached_instances() {
        let pool = BufferPool::new(8, 1);
        pool.release(Vec::new());
        pool.release(Vec::new());
        assert_eq!(pool.inner.cached.lock().unwrap().len(), 1);
    }
}
