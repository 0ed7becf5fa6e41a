// src/attempt/navigator.rs

/// Position within the question list. The index always stays in `[0, count)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigator {
    index: usize,
    count: usize,
}

impl Navigator {
    /// `None` for an empty question list: there is nothing to navigate.
    pub fn new(count: usize) -> Option<Self> {
        (count > 0).then_some(Self { index: 0, count })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.count
    }

    /// No-op at the last question. Returns whether the index moved.
    pub fn next(&mut self) -> bool {
        if self.is_last() {
            return false;
        }
        self.index += 1;
        true
    }

    /// No-op at the first question. Returns whether the index moved.
    pub fn previous(&mut self) -> bool {
        if self.is_first() {
            return false;
        }
        self.index -= 1;
        true
    }

    /// Out-of-range targets are rejected and leave the index unchanged.
    pub fn jump_to(&mut self, index: usize) -> bool {
        if index >= self.count {
            return false;
        }
        self.index = index;
        true
    }
}
