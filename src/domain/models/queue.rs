use std::collections::VecDeque;

use super::ritual::RitualPriority;

/// Two-class ritual queue
///
/// Each priority class is its own FIFO lane. Dequeue drains the high lane
/// before touching the normal one, so a high-priority item lands behind
/// every high item already queued and ahead of every normal one.
///
/// # Examples
///
/// ```
/// use kypria::domain::models::{RitualPriority, RitualQueue};
///
/// let mut queue = RitualQueue::new();
/// queue.enqueue("sync", RitualPriority::Normal);
/// queue.enqueue("converge", RitualPriority::High);
/// queue.enqueue("codex", RitualPriority::Normal);
///
/// assert_eq!(queue.dequeue(), Some("converge"));
/// assert_eq!(queue.dequeue(), Some("sync"));
/// assert_eq!(queue.dequeue(), Some("codex"));
/// ```
#[derive(Debug, Clone)]
pub struct RitualQueue<T> {
    high: VecDeque<T>,
    normal: VecDeque<T>,
}

impl<T> RitualQueue<T> {
    /// Empty queue
    #[allow(clippy::missing_const_for_fn)]
    pub fn new() -> Self {
        Self {
            high: VecDeque::new(),
            normal: VecDeque::new(),
        }
    }

    /// Append to the back of `priority`'s lane
    pub fn enqueue(&mut self, item: T, priority: RitualPriority) {
        self.lane_mut(priority).push_back(item);
    }

    /// Removes and returns the next item in admission order
    pub fn dequeue(&mut self) -> Option<T> {
        self.high.pop_front().or_else(|| self.normal.pop_front())
    }

    /// Next item without removing it
    pub fn peek(&self) -> Option<&T> {
        self.high.front().or_else(|| self.normal.front())
    }

    /// Items across both lanes
    pub fn len(&self) -> usize {
        self.high.len() + self.normal.len()
    }

    /// Whether both lanes are empty
    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty()
    }

    /// Iterates in admission order
    ///
    /// ```
    /// use kypria::domain::models::{RitualPriority, RitualQueue};
    ///
    /// let mut queue = RitualQueue::new();
    /// queue.enqueue(1, RitualPriority::Normal);
    /// queue.enqueue(2, RitualPriority::High);
    ///
    /// let items: Vec<i32> = queue.iter().copied().collect();
    /// assert_eq!(items, vec![2, 1]);
    /// ```
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.high.iter().chain(self.normal.iter())
    }

    /// Number of queued items in one priority class
    pub fn count_priority(&self, priority: RitualPriority) -> usize {
        match priority {
            RitualPriority::High => self.high.len(),
            RitualPriority::Normal => self.normal.len(),
        }
    }

    fn lane_mut(&mut self, priority: RitualPriority) -> &mut VecDeque<T> {
        match priority {
            RitualPriority::High => &mut self.high,
            RitualPriority::Normal => &mut self.normal,
        }
    }
}

impl<T> Default for RitualQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use RitualPriority::{High, Normal};

    #[test]
    fn test_fifo_within_normal() {
        let mut queue = RitualQueue::new();
        queue.enqueue("first", Normal);
        queue.enqueue("second", Normal);
        queue.enqueue("third", Normal);

        assert_eq!(queue.dequeue(), Some("first"));
        assert_eq!(queue.dequeue(), Some("second"));
        assert_eq!(queue.dequeue(), Some("third"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_high_preempts_normal_but_not_earlier_high() {
        let mut queue = RitualQueue::new();
        queue.enqueue("N1", Normal);
        queue.enqueue("H1", High);
        queue.enqueue("N2", Normal);
        queue.enqueue("H2", High);

        assert_eq!(queue.count_priority(High), 2);
        assert_eq!(queue.peek(), Some(&"H1"));
        assert_eq!(queue.dequeue(), Some("H1"));
        assert_eq!(queue.dequeue(), Some("H2"));
        assert_eq!(queue.dequeue(), Some("N1"));
        assert_eq!(queue.dequeue(), Some("N2"));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_len_spans_both_lanes() {
        let mut queue = RitualQueue::default();
        queue.enqueue(1, Normal);
        queue.enqueue(2, High);
        queue.enqueue(3, Normal);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.count_priority(Normal), 2);
    }
}
