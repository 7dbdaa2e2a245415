use std::collections::VecDeque;

use ordersync_core::FieldValue;

use crate::resolver::RowIdentity;

/// One confirmed field change, enough to put it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    pub target: RowIdentity,
    pub field: String,
    pub previous_value: FieldValue,
    pub new_value: FieldValue,
}

/// Most-recent-last history with a fixed depth. Pushing beyond the depth
/// drops the oldest entry.
pub struct UndoStack {
    entries: VecDeque<UndoEntry>,
    max_depth: usize,
}

impl UndoStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_depth),
            max_depth,
        }
    }

    pub fn push(&mut self, entry: UndoEntry) {
        self.entries.push_back(entry);
        // Oldest falls off once the stack is over capacity.
        if self.entries.len() > self.max_depth {
            self.entries.pop_front();
        }
    }

    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop_back()
    }

    /// Put back an entry whose undo did not go through. It becomes the most
    /// recent entry again.
    pub fn restore(&mut self, entry: UndoEntry) {
        self.push(entry);
    }

    pub fn can_undo(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn peek(&self) -> Option<&UndoEntry> {
        self.entries.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordersync_core::RowId;

    fn entry(n: i64) -> UndoEntry {
        UndoEntry {
            target: RowIdentity {
                id: Some(RowId::new(n)),
                key: None,
            },
            field: "CODIGO".into(),
            previous_value: FieldValue::from(format!("old-{n}")),
            new_value: FieldValue::from(format!("new-{n}")),
        }
    }

    #[test]
    fn pops_most_recent_first() {
        let mut stack = UndoStack::new(5);
        stack.push(entry(1));
        stack.push(entry(2));
        assert_eq!(stack.pop(), Some(entry(2)));
        assert_eq!(stack.pop(), Some(entry(1)));
        assert_eq!(stack.pop(), None);
        assert!(!stack.can_undo());
    }

    #[test]
    fn sixth_push_evicts_oldest() {
        let mut stack = UndoStack::new(5);
        for n in 1..=6 {
            stack.push(entry(n));
        }
        assert_eq!(stack.depth(), 5);
        let mut drained = Vec::new();
        while let Some(e) = stack.pop() {
            drained.push(e.target.id.unwrap().get());
        }
        assert_eq!(drained, vec![6, 5, 4, 3, 2]);
    }

    #[test]
    fn restore_puts_entry_back_on_top() {
        let mut stack = UndoStack::new(5);
        stack.push(entry(1));
        stack.push(entry(2));
        let top = stack.pop().unwrap();
        stack.restore(top.clone());
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.peek(), Some(&top));
    }
}
