use crate::base::buffer::Buffer;

#[derive(Debug)]
struct Slot<T> {
    item: T,
    stage: usize,
    cycle_left: usize,
}

/// Fixed-latency pipeline of `num_stage` stages, each holding up to `width` items for
/// `cycle_per_stage` cycles.  Items leaving the last stage land in the post-pipeline buffer,
/// which the owner drains.
#[derive(Debug)]
pub struct Pipeline<T> {
    num_stage: usize,
    cycle_per_stage: usize,
    width: usize,
    // oldest (furthest along) first
    slots: Vec<Slot<T>>,
    post: Buffer<T>,
}

impl<T> Pipeline<T> {
    pub fn new(num_stage: usize, cycle_per_stage: usize, width: usize, post: Buffer<T>) -> Self {
        assert!(width > 0, "pipeline width must be > 0");
        assert!(
            num_stage == 0 || cycle_per_stage > 0,
            "cycle_per_stage must be > 0"
        );
        Self {
            num_stage,
            cycle_per_stage,
            width,
            slots: Vec::new(),
            post,
        }
    }

    pub fn num_stage(&self) -> usize {
        self.num_stage
    }

    pub fn cycle_per_stage(&self) -> usize {
        self.cycle_per_stage
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of items inside the stages, not counting the post buffer.
    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn post(&self) -> &Buffer<T> {
        &self.post
    }

    pub fn post_mut(&mut self) -> &mut Buffer<T> {
        &mut self.post
    }

    fn occupancy(&self, stage: usize) -> usize {
        self.slots.iter().filter(|slot| slot.stage == stage).count()
    }

    pub fn can_accept(&self) -> bool {
        if self.num_stage == 0 {
            return self.post.can_push();
        }
        self.occupancy(0) < self.width
    }

    pub fn accept(&mut self, item: T) {
        if self.num_stage == 0 {
            self.post.push(item);
            return;
        }
        assert!(self.can_accept(), "pipeline first stage is full");
        self.slots.push(Slot {
            item,
            stage: 0,
            cycle_left: self.cycle_per_stage - 1,
        });
    }

    /// Advance every item by one cycle.  Returns whether anything moved.
    pub fn tick(&mut self) -> bool {
        let mut progress = false;
        let mut i = 0;
        while i < self.slots.len() {
            let (stage, cycle_left) = (self.slots[i].stage, self.slots[i].cycle_left);
            if cycle_left > 0 {
                self.slots[i].cycle_left -= 1;
                progress = true;
                i += 1;
                continue;
            }

            if stage + 1 == self.num_stage {
                if self.post.can_push() {
                    let slot = self.slots.remove(i);
                    self.post.push(slot.item);
                    progress = true;
                    continue;
                }
            } else if self.occupancy(stage + 1) < self.width {
                let slot = &mut self.slots[i];
                slot.stage += 1;
                slot.cycle_left = self.cycle_per_stage - 1;
                progress = true;
            }
            i += 1;
        }
        progress
    }
}
