//! Compact allocator for channel numbers.

/// Hands out integers from `1..=max`, always the lowest free one.
#[derive(Debug)]
pub(crate) struct NumberAllocator {
    max: u16,
    words: Vec<u64>,
}

impl NumberAllocator {
    /// An allocator for `1..=max`; a `max` of zero means `1..=65535`.
    pub(crate) fn new(max: u16) -> Self {
        let max = if max == 0 { u16::MAX } else { max };
        Self {
            max,
            words: vec![0; usize::from(max) / 64 + 1],
        }
    }

    pub(crate) fn max(&self) -> u16 { self.max }

    fn slot(number: u16) -> (usize, u64) { (usize::from(number) / 64, 1 << (number % 64)) }

    fn in_range(&self, number: u16) -> bool { (1..=self.max).contains(&number) }

    /// Whether `number` is in range and not allocated.
    pub(crate) fn is_free(&self, number: u16) -> bool {
        let (word, bit) = Self::slot(number);
        self.in_range(number) && self.words[word] & bit == 0
    }

    /// Allocate the lowest free number.
    pub(crate) fn allocate(&mut self) -> Option<u16> {
        let number = self
            .words
            .iter()
            .enumerate()
            .find_map(|(index, word)| {
                // Bit 0 of word 0 stands for channel 0, which is never handed out.
                let taken = if index == 0 { word | 1 } else { *word };
                (taken != u64::MAX).then(|| index * 64 + taken.trailing_ones() as usize)
            })
            .and_then(|number| u16::try_from(number).ok())
            .filter(|number| *number <= self.max)?;
        self.reserve(number).then_some(number)
    }

    /// Allocate `number` if it is free; returns whether it was.
    pub(crate) fn reserve(&mut self, number: u16) -> bool {
        if !self.is_free(number) {
            return false;
        }
        let (word, bit) = Self::slot(number);
        self.words[word] |= bit;
        true
    }

    /// Free `number`. Freeing a number twice is harmless.
    pub(crate) fn free(&mut self, number: u16) {
        if self.in_range(number) {
            let (word, bit) = Self::slot(number);
            self.words[word] &= !bit;
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn lowest_free_number_first() {
        let mut allocator = NumberAllocator::new(10);
        assert_eq!(allocator.allocate(), Some(1));
        assert_eq!(allocator.allocate(), Some(2));
        assert_eq!(allocator.allocate(), Some(3));
        allocator.free(2);
        assert_eq!(allocator.allocate(), Some(2));
        assert_eq!(allocator.allocate(), Some(4));
    }

    #[rstest]
    fn exhaustion_returns_none() {
        let mut allocator = NumberAllocator::new(2);
        assert_eq!(allocator.allocate(), Some(1));
        assert_eq!(allocator.allocate(), Some(2));
        assert_eq!(allocator.allocate(), None);
    }

    #[rstest]
    #[case::zero(0, false)]
    #[case::first(1, true)]
    #[case::last(100, true)]
    #[case::beyond(101, false)]
    fn reserve_respects_range(#[case] number: u16, #[case] reserved: bool) {
        let mut allocator = NumberAllocator::new(100);
        assert_eq!(allocator.reserve(number), reserved);
    }

    #[rstest]
    fn reserve_refuses_taken_number() {
        let mut allocator = NumberAllocator::new(5);
        assert!(allocator.reserve(3));
        assert!(!allocator.reserve(3));
        allocator.free(3);
        allocator.free(3);
        assert!(allocator.reserve(3));
    }

    #[rstest]
    fn zero_max_means_full_range() {
        let mut allocator = NumberAllocator::new(0);
        assert_eq!(allocator.max(), u16::MAX);
        assert!(allocator.reserve(u16::MAX));
    }

    proptest! {
        #[test]
        fn never_hands_out_a_taken_number(ops in proptest::collection::vec((any::<bool>(), 1u16..=64), 1..200)) {
            let mut allocator = NumberAllocator::new(64);
            let mut taken = std::collections::BTreeSet::new();
            for (allocate, number) in ops {
                if allocate {
                    let lowest = (1..=64).find(|candidate| !taken.contains(candidate));
                    let allocated = allocator.allocate();
                    prop_assert_eq!(allocated, lowest);
                    if let Some(number) = allocated {
                        taken.insert(number);
                    }
                } else {
                    allocator.free(number);
                    taken.remove(&number);
                }
            }
        }
    }
}
