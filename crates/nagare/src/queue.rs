use std::{
    collections::{HashSet, VecDeque},
    num::NonZeroUsize,
};

use crate::{config::OverflowPolicy, locator::FragmentLocator};

/// Result of pushing a locator into the [FragmentQueue].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The locator was seen before in this session and dedup is enabled.
    Duplicate,
    /// The queue was full and the incoming locator was discarded.
    DroppedNewest,
    /// The queue was full and its head was discarded to make room.
    DroppedOldest(FragmentLocator),
}

/// FIFO of pending fragment locators.
#[derive(Debug)]
pub struct FragmentQueue {
    pending: VecDeque<FragmentLocator>,
    capacity: Option<NonZeroUsize>,
    overflow: OverflowPolicy,
    seen: Option<HashSet<FragmentLocator>>,
}

impl FragmentQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            capacity: None,
            overflow: OverflowPolicy::default(),
            seen: None,
        }
    }

    pub fn with_capacity(mut self, capacity: NonZeroUsize, overflow: OverflowPolicy) -> Self {
        self.capacity = Some(capacity);
        self.overflow = overflow;
        self
    }

    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.seen = dedup.then(HashSet::new);
        self
    }

    pub fn push(&mut self, locator: FragmentLocator) -> PushOutcome {
        if let Some(seen) = &mut self.seen {
            if !seen.insert(locator.clone()) {
                return PushOutcome::Duplicate;
            }
        }

        let full = self
            .capacity
            .is_some_and(|capacity| self.pending.len() >= capacity.get());
        if !full {
            self.pending.push_back(locator);
            return PushOutcome::Queued;
        }

        match self.overflow {
            OverflowPolicy::DropNewest => PushOutcome::DroppedNewest,
            OverflowPolicy::DropOldest => {
                let dropped = self.pending.pop_front();
                self.pending.push_back(locator);
                match dropped {
                    Some(dropped) => PushOutcome::DroppedOldest(dropped),
                    None => PushOutcome::Queued,
                }
            }
        }
    }

    pub fn pop(&mut self) -> Option<FragmentLocator> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FragmentLocator> {
        self.pending.iter()
    }

    /// Empties the queue and forgets every locator seen so far.
    pub fn clear(&mut self) {
        self.pending.clear();
        if let Some(seen) = &mut self.seen {
            seen.clear();
        }
    }
}

impl Default for FragmentQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(name: &str) -> FragmentLocator {
        FragmentLocator::new(url::Url::parse(&format!("http://localhost/{name}")).unwrap())
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = FragmentQueue::new();
        for name in ["seg_0", "seg_1", "seg_2"] {
            assert_eq!(queue.push(locator(name)), PushOutcome::Queued);
        }

        assert_eq!(queue.pop(), Some(locator("seg_0")));
        assert_eq!(queue.pop(), Some(locator("seg_1")));
        assert_eq!(queue.pop(), Some(locator("seg_2")));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_duplicates_kept_without_dedup() {
        let mut queue = FragmentQueue::new();
        queue.push(locator("seg_0"));
        assert_eq!(queue.push(locator("seg_0")), PushOutcome::Queued);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_dedup_remembers_popped_locators() {
        let mut queue = FragmentQueue::new().with_dedup(true);
        queue.push(locator("seg_0"));
        queue.pop();
        assert_eq!(queue.push(locator("seg_0")), PushOutcome::Duplicate);
        assert!(queue.is_empty());

        queue.clear();
        assert_eq!(queue.push(locator("seg_0")), PushOutcome::Queued);
    }

    #[test]
    fn test_overflow_drop_newest() {
        let mut queue = FragmentQueue::new()
            .with_capacity(NonZeroUsize::new(2).unwrap(), OverflowPolicy::DropNewest);
        queue.push(locator("seg_0"));
        queue.push(locator("seg_1"));
        assert_eq!(queue.push(locator("seg_2")), PushOutcome::DroppedNewest);

        let pending: Vec<_> = queue.iter().map(|l| l.file_name().to_string()).collect();
        assert_eq!(pending, vec!["seg_0", "seg_1"]);
    }

    #[test]
    fn test_overflow_drop_oldest() {
        let mut queue = FragmentQueue::new()
            .with_capacity(NonZeroUsize::new(2).unwrap(), OverflowPolicy::DropOldest);
        queue.push(locator("seg_0"));
        queue.push(locator("seg_1"));
        assert_eq!(
            queue.push(locator("seg_2")),
            PushOutcome::DroppedOldest(locator("seg_0"))
        );

        let pending: Vec<_> = queue.iter().map(|l| l.file_name().to_string()).collect();
        assert_eq!(pending, vec!["seg_1", "seg_2"]);
    }
}
