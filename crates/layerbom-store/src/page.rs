//! Ring buffer and buffer pool
//!
//! A bounded FIFO/LIFO queue used to page database-backed iterators
//! without reallocating per page. Capacity is a power of two so slot
//! indexing is a mask and the u32 head/tail counters wrap correctly on
//! overflow.

use std::mem;
use std::sync::Mutex;

/// Autosize a capacity hint: round up to a power of two, floor 16, cap 64.
pub fn autosize(hint: usize) -> usize {
    hint.next_power_of_two().clamp(16, 64)
}

/// Estimated footprint above which returned buffers are dropped instead of
/// pooled.
const POOL_FOOTPRINT_CEILING: usize = 4 << 20;

/// Bounded-capacity ring buffer.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    mask: u32,
    head: u32,
    tail: u32,
}

impl<T> RingBuffer<T> {
    /// Create with the given capacity, rounded up to a power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        RingBuffer {
            slots,
            mask: capacity as u32 - 1,
            head: 0,
            tail: 0,
        }
    }

    #[cfg(test)]
    fn with_counters(capacity: usize, origin: u32) -> Self {
        let mut rb = Self::new(capacity);
        rb.head = origin;
        rb.tail = origin;
        rb
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.tail.wrapping_sub(self.head) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Append at the tail. Returns the value back when full.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        let idx = (self.tail & self.mask) as usize;
        self.slots[idx] = Some(value);
        self.tail = self.tail.wrapping_add(1);
        Ok(())
    }

    /// FIFO drain order.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let idx = (self.head & self.mask) as usize;
        self.head = self.head.wrapping_add(1);
        self.slots[idx].take()
    }

    /// LIFO drain order.
    pub fn pop_back(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        self.tail = self.tail.wrapping_sub(1);
        let idx = (self.tail & self.mask) as usize;
        self.slots[idx].take()
    }

    /// Drop remaining contents, keeping the allocation.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.tail = 0;
    }
}

/// Per-type pool of ring buffers.
#[derive(Debug)]
pub struct Pool<T> {
    free: Mutex<Vec<RingBuffer<T>>>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Pool {
            free: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a buffer of at least `autosize(hint)` capacity, reusing a
    /// pooled one when available.
    pub fn get(&self, hint: usize) -> RingBuffer<T> {
        let want = autosize(hint);
        let mut free = self.free.lock().expect("buffer pool poisoned");
        if let Some(pos) = free.iter().position(|b| b.capacity() >= want) {
            return free.swap_remove(pos);
        }
        drop(free);
        RingBuffer::new(want)
    }

    /// Return a buffer. Oversized buffers are dropped rather than pooled.
    pub fn put(&self, mut buffer: RingBuffer<T>) {
        if buffer.capacity().saturating_mul(mem::size_of::<T>()) > POOL_FOOTPRINT_CEILING {
            return;
        }
        buffer.clear();
        let mut free = self.free.lock().expect("buffer pool poisoned");
        free.push(buffer);
    }
}

/// Iterator over a paged backing query.
///
/// Pulls one buffer's worth of rows at a time through `fetch(offset,
/// buffer)`, which returns how many rows it appended; zero ends the
/// iteration. The buffer comes from (and returns to) a shared pool, so
/// iterating large result sets reuses one allocation.
pub struct Paged<T, F>
where
    F: FnMut(usize, &mut RingBuffer<T>) -> crate::StoreResult<usize>,
{
    pool: std::sync::Arc<Pool<T>>,
    buffer: Option<RingBuffer<T>>,
    fetch: F,
    offset: usize,
    exhausted: bool,
}

impl<T, F> Paged<T, F>
where
    F: FnMut(usize, &mut RingBuffer<T>) -> crate::StoreResult<usize>,
{
    pub fn new(pool: std::sync::Arc<Pool<T>>, page_hint: usize, fetch: F) -> Self {
        let buffer = pool.get(page_hint);
        Paged {
            pool,
            buffer: Some(buffer),
            fetch,
            offset: 0,
            exhausted: false,
        }
    }
}

impl<T, F> Iterator for Paged<T, F>
where
    F: FnMut(usize, &mut RingBuffer<T>) -> crate::StoreResult<usize>,
{
    type Item = crate::StoreResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let buffer = self.buffer.as_mut()?;
        if let Some(row) = buffer.pop_front() {
            return Some(Ok(row));
        }
        if self.exhausted {
            return None;
        }
        match (self.fetch)(self.offset, buffer) {
            Ok(0) => {
                self.exhausted = true;
                None
            }
            Ok(n) => {
                self.offset += n;
                buffer.pop_front().map(Ok)
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

impl<T, F> Drop for Paged<T, F>
where
    F: FnMut(usize, &mut RingBuffer<T>) -> crate::StoreResult<usize>,
{
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.put(buffer);
        }
    }
}
