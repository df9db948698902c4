use std::collections::BTreeSet;
use std::mem;

use crate::noc::types::ComponentRef;

/// Wake-up bookkeeping for cooperative ticking.
///
/// Components run in `ComponentRef` order inside a cycle.  A wake-up for a component that has
/// not run yet this cycle is served in the same cycle; anything else waits for the next one.
#[derive(Debug, Default)]
pub struct Scheduler {
    current: BTreeSet<ComponentRef>,
    next: BTreeSet<ComponentRef>,
    cursor: Option<ComponentRef>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake(&mut self, component: ComponentRef) {
        match self.cursor {
            Some(cursor) if component <= cursor => {
                self.next.insert(component);
            }
            _ => {
                self.current.insert(component);
            }
        }
    }

    /// Schedule `component` for the cycle after the one being ticked.
    pub fn wake_later(&mut self, component: ComponentRef) {
        if self.cursor.is_some() {
            self.next.insert(component);
        } else {
            self.current.insert(component);
        }
    }

    pub(crate) fn pop(&mut self) -> Option<ComponentRef> {
        let component = self.current.pop_first()?;
        self.cursor = Some(component);
        Some(component)
    }

    pub(crate) fn begin_cycle(&mut self) {
        self.cursor = None;
    }

    pub(crate) fn end_cycle(&mut self) {
        debug_assert!(self.current.is_empty());
        self.cursor = None;
        self.current = mem::take(&mut self.next);
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_empty() && self.next.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.current.len() + self.next.len()
    }
}
