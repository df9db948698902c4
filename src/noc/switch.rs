use std::collections::HashMap;

use log::{debug, trace};

use crate::base::buffer::Buffer;
use crate::base::pipeline::Pipeline;
use crate::noc::arbiter::Arbiter;
use crate::noc::config::SwitchPortConfig;
use crate::noc::msg::{Flit, Msg};
use crate::noc::network::Wiring;
use crate::noc::routing::RoutingTable;
use crate::noc::stats::SwitchStats;
use crate::noc::types::{Cycle, PortId, SwitchId};

/// Per-port state of a switch.  The input pipeline's post buffer is the route buffer.
#[derive(Debug)]
struct PortComplex {
    local: PortId,
    // port at the far end of the link
    remote: PortId,
    pipeline: Pipeline<Flit>,
    forward: Buffer<Flit>,
    send_out: Buffer<Flit>,
    num_input_channel: usize,
    num_output_channel: usize,
}

/// Fabric node.  Each flit goes through receive, pipeline, route, forward and send-out.
pub struct Switch {
    id: SwitchId,
    name: String,
    complexes: Vec<PortComplex>,
    port_to_complex: HashMap<PortId, usize>,
    table: RoutingTable,
    arbiter: Box<dyn Arbiter>,
    stats: SwitchStats,
}

impl Switch {
    pub fn new(
        id: SwitchId,
        name: impl Into<String>,
        table: RoutingTable,
        arbiter: Box<dyn Arbiter>,
    ) -> Self {
        let name = name.into();
        Self {
            id,
            stats: SwitchStats {
                name: name.clone(),
                ..SwitchStats::default()
            },
            name,
            complexes: Vec::new(),
            port_to_complex: HashMap::new(),
            table,
            arbiter,
        }
    }

    pub fn id(&self) -> SwitchId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.complexes.iter().map(|pc| pc.local)
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn set_table(&mut self, table: RoutingTable) {
        self.table = table;
    }

    pub fn stats(&self) -> &SwitchStats {
        &self.stats
    }

    pub fn add_port(&mut self, local: PortId, remote: PortId, config: SwitchPortConfig) {
        if self.port_to_complex.contains_key(&local) {
            panic!("{}: port {} added twice", self.name, local);
        }
        let index = self.complexes.len();
        let SwitchPortConfig {
            latency,
            num_input_channel,
            num_output_channel,
        } = config;
        let prefix = format!("{}.PortComplex{}", self.name, index);
        self.complexes.push(PortComplex {
            local,
            remote,
            pipeline: Pipeline::new(
                latency,
                1,
                num_input_channel,
                Buffer::new(format!("{prefix}.RouteBuf"), num_input_channel),
            ),
            forward: Buffer::new(format!("{prefix}.FwdBuf"), num_input_channel),
            send_out: Buffer::new(format!("{prefix}.SendOutBuf"), num_output_channel),
            num_input_channel,
            num_output_channel,
        });
        self.port_to_complex.insert(local, index);
        self.arbiter.add_buffer(index);
        debug!("{}: port {} faces {}", self.name, local, remote);
    }

    pub fn tick(&mut self, now: Cycle, w: &mut Wiring) -> bool {
        let mut progress = false;
        progress |= self.send_out(now, w);
        progress |= self.forward(now);
        progress |= self.route(w);
        progress |= self.move_pipeline();
        progress |= self.start_processing(w);
        progress
    }

    fn send_out(&mut self, now: Cycle, w: &mut Wiring) -> bool {
        let mut progress = false;
        for pc in &mut self.complexes {
            for _ in 0..pc.num_output_channel {
                let Some(mut flit) = pc.send_out.pop() else {
                    break;
                };
                flit.meta.src = pc.local;
                flit.meta.dst = pc.remote;
                flit.meta.send_time = now;
                flit.output_buf = None;
                let id = flit.meta.id;
                match w.send_flit(flit) {
                    Ok(()) => {
                        trace!("{}_{} end", id, self.name);
                        self.stats.flits_sent += 1;
                        progress = true;
                    }
                    Err(flit) => {
                        pc.send_out.push_front(flit);
                        self.stats.send_stalls += 1;
                        break;
                    }
                }
            }
        }
        progress
    }

    fn forward(&mut self, now: Cycle) -> bool {
        let complexes = &self.complexes;
        let grants = self.arbiter.arbitrate(now, &|buf| {
            complexes[buf].forward.peek().and_then(|flit| flit.output_buf)
        });

        let mut progress = false;
        for input in grants {
            let Some(output) = self.complexes[input].forward.peek().and_then(|f| f.output_buf)
            else {
                continue;
            };
            loop {
                let head = self.complexes[input].forward.peek();
                if head.and_then(|f| f.output_buf) != Some(output)
                    || !self.complexes[output].send_out.can_push()
                {
                    break;
                }
                let Some(flit) = self.complexes[input].forward.pop() else {
                    break;
                };
                self.complexes[output].send_out.push(flit);
                self.stats.flits_forwarded += 1;
                progress = true;
            }
        }
        progress
    }

    fn route(&mut self, w: &Wiring) -> bool {
        let mut progress = false;
        for i in 0..self.complexes.len() {
            for _ in 0..self.complexes[i].num_input_channel {
                let Some(flit) = self.complexes[i].pipeline.post().peek() else {
                    break;
                };
                let dst = flit.msg_dst();
                let out_port = self.table.find_port(dst).unwrap_or_else(|| {
                    panic!("{}: no output port for {}", self.name, w.ports.name(dst))
                });
                let output = *self.port_to_complex.get(&out_port).unwrap_or_else(|| {
                    panic!(
                        "{}: output port {} for {} is not a port of this switch",
                        self.name,
                        w.ports.name(out_port),
                        w.ports.name(dst)
                    )
                });

                let pc = &mut self.complexes[i];
                if !pc.forward.can_push() {
                    break;
                }
                let Some(mut flit) = pc.pipeline.post_mut().pop() else {
                    break;
                };
                flit.output_buf = Some(output);
                pc.forward.push(flit);
                self.stats.flits_routed += 1;
                progress = true;
            }
        }
        progress
    }

    fn move_pipeline(&mut self) -> bool {
        let mut progress = false;
        for pc in &mut self.complexes {
            progress |= pc.pipeline.tick();
        }
        progress
    }

    fn start_processing(&mut self, w: &mut Wiring) -> bool {
        let mut progress = false;
        for pc in &mut self.complexes {
            for _ in 0..pc.num_input_channel {
                let Some(msg) = w.ports.peek(pc.local) else {
                    break;
                };
                if msg.as_flit().is_none() {
                    panic!(
                        "{}: port {} received message {} which is not a flit",
                        self.name,
                        w.ports.name(pc.local),
                        msg.meta().id
                    );
                }
                if !pc.pipeline.can_accept() {
                    break;
                }
                let Some(Msg::Flit(flit)) = w.ports.retrieve(pc.local, w.sched) else {
                    break;
                };
                trace!("{}_{} start", flit.meta.id, self.name);
                pc.pipeline.accept(flit);
                self.stats.flits_received += 1;
                progress = true;
            }
        }
        progress
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::noc::arbiter::XBarArbiter;
    use crate::noc::channel::Link;
    use crate::noc::msg::Message;
    use crate::noc::port::{Owner, Ports};
    use crate::noc::sched::Scheduler;

    fn flit_to(dst: PortId, seq_id: u32) -> Flit {
        let msg = Message::new(PortId(100), dst, 64);
        let mut flit = Flit::fragment(msg, PortId(100), PortId(101), 64, 0.0).remove(0);
        flit.seq_id = seq_id;
        flit
    }

    #[test]
    fn same_output_keeps_fifo_order() {
        let mut ports = Ports::new();
        let mut sched = Scheduler::new();
        let mut links: Vec<Link> = Vec::new();
        let in_port = ports.add("sw.In", 4, Owner::Switch(SwitchId(0)));
        let out_port = ports.add("sw.Out", 4, Owner::Switch(SwitchId(0)));
        let dev = PortId(77);

        let mut table = RoutingTable::new();
        table.define_default_route(out_port);
        let mut sw = Switch::new(SwitchId(0), "sw", table, Box::new(XBarArbiter::new()));
        let wide = SwitchPortConfig {
            latency: 1,
            num_input_channel: 2,
            num_output_channel: 2,
        };
        sw.add_port(in_port, PortId(90), wide);
        sw.add_port(out_port, PortId(91), wide);

        // the route stage sees both flits in the same cycle
        sw.complexes[0].pipeline.post_mut().push(flit_to(dev, 0));
        sw.complexes[0].pipeline.post_mut().push(flit_to(dev, 1));
        let mut w = Wiring {
            ports: &mut ports,
            links: &mut links,
            sched: &mut sched,
        };
        assert!(sw.tick(0, &mut w));
        assert!(sw.tick(1, &mut w));
        let order: Vec<u32> = sw.complexes[1].send_out.iter().map(|f| f.seq_id).collect();
        assert_eq!(vec![0, 1], order);
        assert_eq!(2, sw.stats().flits_forwarded);
    }

    struct CountingArbiter {
        inner: XBarArbiter,
        calls: Arc<AtomicUsize>,
    }

    impl Arbiter for CountingArbiter {
        fn add_buffer(&mut self, buf: usize) {
            self.inner.add_buffer(buf);
        }

        fn arbitrate(
            &mut self,
            now: Cycle,
            head_output: &dyn Fn(usize) -> Option<usize>,
        ) -> crate::noc::arbiter::Grants {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.arbitrate(now, head_output)
        }
    }

    #[test]
    fn arbitrates_once_per_tick() {
        let mut ports = Ports::new();
        let mut sched = Scheduler::new();
        let mut links: Vec<Link> = Vec::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let arbiter = CountingArbiter {
            inner: XBarArbiter::new(),
            calls: Arc::clone(&calls),
        };
        let mut sw = Switch::new(SwitchId(0), "sw", RoutingTable::new(), Box::new(arbiter));
        for i in 0..3 {
            let p = ports.add(format!("sw.Port{i}"), 1, Owner::Switch(SwitchId(0)));
            sw.add_port(p, PortId(90 + i), SwitchPortConfig::default());
        }
        let mut w = Wiring {
            ports: &mut ports,
            links: &mut links,
            sched: &mut sched,
        };
        for now in 0..5 {
            sw.tick(now, &mut w);
        }
        assert_eq!(5, calls.load(Ordering::Relaxed));
    }

    #[test]
    #[should_panic(expected = "no output port")]
    fn routing_miss_is_fatal() {
        let mut ports = Ports::new();
        let mut sched = Scheduler::new();
        let mut links: Vec<Link> = Vec::new();
        let in_port = ports.add("sw.In", 4, Owner::Switch(SwitchId(0)));
        let dev = ports.add("dev", 1, Owner::External);
        let mut sw = Switch::new(
            SwitchId(0),
            "sw",
            RoutingTable::new(),
            Box::new(XBarArbiter::new()),
        );
        sw.add_port(in_port, PortId(90), SwitchPortConfig::default());
        sw.complexes[0].pipeline.post_mut().push(flit_to(dev, 0));
        let mut w = Wiring {
            ports: &mut ports,
            links: &mut links,
            sched: &mut sched,
        };
        sw.tick(0, &mut w);
    }
}
