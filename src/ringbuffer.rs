//! Ringbuffer module for bounded in-memory history.
//!
//! A fixed-capacity circular buffer. Once full, each push overwrites the
//! oldest entry so memory stays predictable no matter how long the guard runs.

/// A circular buffer with fixed capacity.
#[derive(Debug, Clone)]
pub struct Ringbuffer<T> {
    entries: Vec<Option<T>>,
    capacity: usize,
    write_index: usize,
    count: usize,
}

impl<T: Clone> Ringbuffer<T> {
    /// Creates a new ringbuffer with the specified capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);

        Self {
            entries,
            capacity,
            write_index: 0,
            count: 0,
        }
    }

    /// Pushes a new entry into the ringbuffer.
    ///
    /// If the buffer is full, the oldest entry will be overwritten.
    pub fn push(&mut self, entry: T) {
        self.entries[self.write_index] = Some(entry);
        self.write_index = (self.write_index + 1) % self.capacity;

        if self.count < self.capacity {
            self.count += 1;
        }
    }

    /// Returns all entries in chronological order (oldest to newest).
    pub fn get_history(&self) -> Vec<T> {
        if self.count == 0 {
            return Vec::new();
        }

        // Oldest entry sits at write_index once the buffer has wrapped.
        let start = if self.count < self.capacity {
            0
        } else {
            self.write_index
        };

        (0..self.count)
            .filter_map(|i| self.entries[(start + i) % self.capacity].clone())
            .collect()
    }

    /// Returns up to `n` most recent entries, newest first.
    pub fn latest(&self, n: usize) -> Vec<T> {
        let mut history = self.get_history();
        history.reverse();
        history.truncate(n);
        history
    }

    /// Returns the newest entry.
    pub fn last(&self) -> Option<&T> {
        if self.count == 0 {
            return None;
        }
        let idx = (self.write_index + self.capacity - 1) % self.capacity;
        self.entries[idx].as_ref()
    }

    /// Returns the current number of entries in the buffer.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns the maximum capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ringbuffer_push_and_read() {
        let mut rb = Ringbuffer::new(3);

        assert_eq!(rb.len(), 0);
        assert_eq!(rb.capacity(), 3);

        rb.push(1000);

        assert_eq!(rb.len(), 1);
        assert_eq!(rb.get_history(), vec![1000]);
        assert_eq!(rb.last(), Some(&1000));
    }

    #[test]
    fn test_ringbuffer_chronological_order() {
        let mut rb = Ringbuffer::new(3);
        for i in 0..3 {
            rb.push(1000 + i * 100);
        }

        assert_eq!(rb.get_history(), vec![1000, 1100, 1200]);
    }

    #[test]
    fn test_ringbuffer_wraparound() {
        let mut rb = Ringbuffer::new(3);

        // Push 5 entries (will wrap around)
        for i in 0..5 {
            rb.push(1000 + i * 100);
        }

        // Should only have the last 3 entries in chronological order
        assert_eq!(rb.get_history(), vec![1200, 1300, 1400]);
        assert_eq!(rb.last(), Some(&1400));
        assert_eq!(rb.latest(2), vec![1400, 1300]);
    }

    #[test]
    fn test_ringbuffer_empty() {
        let rb: Ringbuffer<u32> = Ringbuffer::new(10);
        assert!(rb.is_empty());
        assert!(rb.get_history().is_empty());
        assert!(rb.last().is_none());
    }

    #[test]
    fn test_ringbuffer_zero_capacity_is_bumped() {
        let mut rb = Ringbuffer::new(0);
        rb.push("a");
        rb.push("b");
        assert_eq!(rb.capacity(), 1);
        assert_eq!(rb.get_history(), vec!["b"]);
    }
}
