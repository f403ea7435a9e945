use std::sync::{Arc, Mutex};

const MIN_CLASS_SHIFT: u32 = 12;
const MAX_CLASS_SHIFT: u32 = 24;
const CLASS_COUNT: usize = (MAX_CLASS_SHIFT - MIN_CLASS_SHIFT + 1) as usize;
const MAX_RETAINED_PER_CLASS: usize = 8;

/// Size-class pool for contiguous scratch buffers.
///
/// Message reassembly, decompression, and the outbound write path all rent
/// from here instead of allocating per block. Buffers return to their class
/// on drop, so every exit path, including errors, gives storage back.
pub struct BufferPool {
    classes: Mutex<Vec<Vec<Vec<u8>>>>,
}

impl BufferPool {
    pub fn new() -> Arc<Self> {
        Arc::new(BufferPool {
            classes: Mutex::new(vec![Vec::new(); CLASS_COUNT]),
        })
    }

    fn class_for(len: usize) -> Option<usize> {
        let shift = usize::BITS - len.max(1).next_power_of_two().leading_zeros() - 1;
        let shift = shift.max(MIN_CLASS_SHIFT);
        if shift > MAX_CLASS_SHIFT {
            None
        } else {
            Some((shift - MIN_CLASS_SHIFT) as usize)
        }
    }

    /// Rent an empty buffer with capacity for at least `len` bytes. Requests
    /// past the largest class fall back to a plain allocation that is not
    /// retained on drop.
    pub fn rent(self: &Arc<Self>, len: usize) -> PooledBuffer {
        match Self::class_for(len) {
            Some(class) => {
                let reused = self.classes.lock().unwrap()[class].pop();
                let buf = reused
                    .unwrap_or_else(|| Vec::with_capacity(1usize << (class as u32 + MIN_CLASS_SHIFT)));
                PooledBuffer {
                    buf,
                    pool: Some(self.clone()),
                }
            }
            None => PooledBuffer {
                buf: Vec::with_capacity(len),
                pool: None,
            },
        }
    }

    fn put_back(&self, mut buf: Vec<u8>) {
        let Some(class) = Self::class_for(buf.capacity()) else {
            return;
        };
        buf.clear();
        let mut classes = self.classes.lock().unwrap();
        if classes[class].len() < MAX_RETAINED_PER_CLASS {
            classes[class].push(buf);
        }
    }
}

/// A rented scratch buffer. Dereferences to `Vec<u8>`; storage returns to the
/// owning pool on drop.
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Option<Arc<BufferPool>>,
}

impl std::ops::Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.put_back(std::mem::take(&mut self.buf));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_reuses_returned_storage() {
        let pool = BufferPool::new();
        let mut first = pool.rent(100);
        first.extend_from_slice(&[1, 2, 3]);
        let cap = first.capacity();
        drop(first);

        let second = pool.rent(100);
        assert_eq!(second.capacity(), cap);
        assert!(second.is_empty());
    }

    #[test]
    fn oversized_rents_are_not_retained() {
        let pool = BufferPool::new();
        let huge = pool.rent(1 << 26);
        assert!(huge.capacity() >= 1 << 26);
        drop(huge);
        assert!(pool.classes.lock().unwrap().iter().all(|c| c.is_empty()));
    }

    #[test]
    fn class_boundaries() {
        assert_eq!(BufferPool::class_for(1), Some(0));
        assert_eq!(BufferPool::class_for(4096), Some(0));
        assert_eq!(BufferPool::class_for(4097), Some(1));
        assert_eq!(BufferPool::class_for(1 << 24), Some(CLASS_COUNT - 1));
        assert_eq!(BufferPool::class_for((1 << 24) + 1), None);
    }
}
