// StrikeTrigger - Fixed-Capacity Ring Buffer

/// Keeps the `N` most recent values, overwriting the oldest. Never allocates.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    slots: [T; N],
    next: usize,
    len: usize,
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        Self {
            slots: [T::default(); N],
            next: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, value: T) {
        self.slots[self.next] = value;
        self.next = (self.next + 1) % N;
        if self.len < N {
            self.len += 1;
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// The value pushed `age` pushes ago (`0` is the newest).
    pub fn recent(&self, age: usize) -> Option<T> {
        if age >= self.len {
            return None;
        }
        Some(self.slots[(self.next + N - 1 - age) % N])
    }

    /// Valid entries, in storage order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        // Until the first wrap the valid entries are the prefix.
        self.slots[..self.len].iter()
    }
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
