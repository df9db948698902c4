use std::collections::VecDeque;

/// Bounded FIFO used for every queue in the fabric.  Callers must check `can_push` before
/// pushing; pushing into a full buffer is a wiring bug and panics.
#[derive(Debug)]
pub struct Buffer<T> {
    name: String,
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> Buffer<T> {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let name = name.into();
        assert!(capacity > 0, "buffer {name} capacity must be > 0");
        Self {
            name,
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn can_push(&self) -> bool {
        self.items.len() < self.capacity
    }

    pub fn push(&mut self, item: T) {
        assert!(self.can_push(), "buffer {} overflow", self.name);
        self.items.push_back(item);
    }

    /// Put an item back at the head, e.g. after a downstream send refused it.
    pub fn push_front(&mut self, item: T) {
        assert!(self.can_push(), "buffer {} overflow", self.name);
        self.items.push_front(item);
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let mut buf = Buffer::new("buf", 3);
        buf.push(1);
        buf.push(2);
        buf.push(3);
        assert!(!buf.can_push());
        assert_eq!(Some(&1), buf.peek());
        assert_eq!(Some(1), buf.pop());
        assert_eq!(Some(2), buf.pop());
        assert_eq!(Some(3), buf.pop());
        assert!(buf.pop().is_none());
    }

    #[test]
    fn push_front_restores_head() {
        let mut buf = Buffer::new("buf", 2);
        buf.push("a");
        buf.push("b");
        let head = buf.pop().unwrap();
        buf.push_front(head);
        assert_eq!(Some(&"a"), buf.peek());
        assert_eq!(2, buf.len());
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn push_on_full_buffer_panics() {
        let mut buf = Buffer::new("full", 1);
        buf.push(0u32);
        buf.push(1u32);
    }
}
