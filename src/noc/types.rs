use std::fmt;

pub type Cycle = u64;

macro_rules! handle {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

handle!(
    /// Index of a port in the network's port arena.
    PortId
);
handle!(LinkId);
handle!(SwitchId);
handle!(EndPointId);

/// Anything the scheduler can tick.  The variant order is the in-cycle phase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentRef {
    EndPoint(EndPointId),
    Switch(SwitchId),
    Link(LinkId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    QueueFull,
    Busy,
}

/// A refused send.  The payload is handed back so the caller can retry on a later cycle.
#[derive(Debug, Clone)]
pub struct RejectWith<T> {
    pub retry_at: Cycle,
    pub reason: RejectReason,
    pub payload: T,
}

impl<T> RejectWith<T> {
    pub fn new(payload: T, retry_at: Cycle, reason: RejectReason) -> Self {
        Self {
            payload,
            retry_at,
            reason,
        }
    }

    pub fn retry_next(payload: T, now: Cycle, reason: RejectReason) -> Self {
        Self::new(payload, now.saturating_add(1), reason)
    }
}
