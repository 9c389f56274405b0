//! Fixed-capacity FIFO of frame indices.

/// FIFO of frame indices, oldest at position 0.
///
/// Capacity equals the frame manager's frame count, so a queue can hold every
/// frame at once and a push on a correctly partitioned manager never fails.
/// Removal from any position is needed because ring slots and flushed frames
/// leave their queue out of order.
pub(crate) struct IndexQueue<const N: usize> {
    slots: [usize; N],
    len: usize,
}

impl<const N: usize> IndexQueue<N> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [0; N],
            len: 0,
        }
    }

    #[inline(always)]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Oldest index in the queue
    #[inline]
    pub(crate) fn front(&self) -> Option<usize> {
        self.as_slice().first().copied()
    }

    /// Append an index; `false` when the queue is full
    pub(crate) fn push_back(&mut self, index: usize) -> bool {
        if self.len == N {
            return false;
        }
        self.slots[self.len] = index;
        self.len += 1;
        true
    }

    /// Remove `index` wherever it sits, preserving the order of the rest.
    ///
    /// Returns `false` if the index is not queued.
    pub(crate) fn remove(&mut self, index: usize) -> bool {
        let Some(pos) = self.as_slice().iter().position(|&queued| queued == index) else {
            return false;
        };
        self.slots.copy_within(pos + 1..self.len, pos);
        self.len -= 1;
        true
    }

    pub(crate) fn contains(&self, index: usize) -> bool {
        self.as_slice().contains(&index)
    }

    /// Iterate oldest first
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.as_slice().iter().copied()
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    /// Replace the contents with every index `0..N` in order
    pub(crate) const fn fill_in_order(&mut self) {
        let mut i = 0;
        while i < N {
            self.slots[i] = i;
            i += 1;
        }
        self.len = N;
    }

    #[inline(always)]
    fn as_slice(&self) -> &[usize] {
        &self.slots[..self.len]
    }
}
