use smallvec::SmallVec;

use crate::noc::types::Cycle;

/// Handle of a buffer registered with an arbiter.  Switches use the port complex index.
pub type BufferHandle = usize;

/// Output buffer the head item of an input buffer wants to reach.
pub type OutputHandle = usize;

pub type Grants = SmallVec<[BufferHandle; 8]>;

/// Per-cycle crossbar arbitration policy.
///
/// `arbitrate` must be called exactly once per switch cycle; implementations may keep
/// rotation state that assumes this.
pub trait Arbiter: Send {
    fn add_buffer(&mut self, buf: BufferHandle);

    /// Select the registered buffers allowed to forward this cycle.  `head_output` reports the
    /// target output of a buffer's head item, or `None` when the buffer is empty.  No two
    /// returned buffers target the same output.
    fn arbitrate(
        &mut self,
        now: Cycle,
        head_output: &dyn Fn(BufferHandle) -> Option<OutputHandle>,
    ) -> Grants;
}

/// Round-robin crossbar arbiter.  The starting input rotates by one every call.
#[derive(Debug, Default)]
pub struct XBarArbiter {
    buffers: Vec<BufferHandle>,
    next_port_id: usize,
}

impl XBarArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_port_id(&self) -> usize {
        self.next_port_id
    }
}

impl Arbiter for XBarArbiter {
    fn add_buffer(&mut self, buf: BufferHandle) {
        self.buffers.push(buf);
    }

    fn arbitrate(
        &mut self,
        _now: Cycle,
        head_output: &dyn Fn(BufferHandle) -> Option<OutputHandle>,
    ) -> Grants {
        let mut selected = Grants::new();
        let n = self.buffers.len();
        if n == 0 {
            return selected;
        }

        let mut claimed: SmallVec<[OutputHandle; 8]> = SmallVec::new();
        for i in 0..n {
            let buf = self.buffers[(self.next_port_id + i) % n];
            let Some(output) = head_output(buf) else {
                continue;
            };
            if claimed.contains(&output) {
                continue;
            }
            claimed.push(output);
            selected.push(buf);
        }

        self.next_port_id = (self.next_port_id + 1) % n;
        selected
    }
}
