use log::{debug, trace};

use crate::base::buffer::Buffer;
use crate::base::pipeline::Pipeline;
use crate::noc::config::ChannelConfig;
use crate::noc::msg::Msg;
use crate::noc::port::{Conn, Ports};
use crate::noc::sched::Scheduler;
use crate::noc::stats::LinkStats;
use crate::noc::types::{ComponentRef, Cycle, LinkId, PortId};

/// Check that a message may enter a two-ended link and return the (src, dst) end indices.
fn check_send(link: &str, link_ports: &[PortId], msg: &Msg, ports: &Ports) -> (usize, usize) {
    let meta = msg.meta();
    if meta.src == meta.dst {
        panic!(
            "{link}: message {} is sent from {} to itself",
            meta.id,
            ports.name(meta.src)
        );
    }
    let end_of = |port: PortId| {
        link_ports.iter().position(|p| *p == port).unwrap_or_else(|| {
            panic!(
                "{link}: port {} is not plugged into this link (message {})",
                ports.name(port),
                meta.id
            )
        })
    };
    (end_of(meta.src), end_of(meta.dst))
}

#[derive(Debug)]
struct ChannelEnd {
    port: PortId,
    src_side_buf: Buffer<Msg>,
    // post buffer holds items waiting for the far port
    pipeline: Pipeline<Msg>,
    busy: bool,
}

/// Bidirectional pipelined point-to-point link between two ports.
#[derive(Debug)]
pub struct Channel {
    id: LinkId,
    name: String,
    config: ChannelConfig,
    ends: Vec<ChannelEnd>,
    stats: LinkStats,
}

impl Channel {
    pub fn new(id: LinkId, name: impl Into<String>, config: ChannelConfig) -> Self {
        let name = name.into();
        Self {
            id,
            stats: LinkStats {
                name: name.clone(),
                ..LinkStats::default()
            },
            name,
            config,
            ends: Vec::with_capacity(2),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn plug_in(&mut self, ports: &mut Ports, port: PortId, buf_size: usize) {
        if self.ends.len() >= 2 {
            panic!(
                "{}: one channel can only connect with two ports, cannot plug in {}",
                self.name,
                ports.name(port)
            );
        }
        ports.set_conn(port, Conn::Link(self.id));
        let port_name = ports.name(port);
        let ChannelConfig {
            num_stage,
            cycle_per_stage,
            pipeline_width,
        } = self.config;
        self.ends.push(ChannelEnd {
            port,
            src_side_buf: Buffer::new(format!("{}.{}.SrcBuf", self.name, port_name), buf_size),
            pipeline: Pipeline::new(
                num_stage,
                cycle_per_stage,
                pipeline_width,
                Buffer::new(format!("{}.{}.PostBuf", self.name, port_name), buf_size),
            ),
            busy: false,
        });
        debug!("{}: plugged in {}", self.name, port_name);
    }

    fn end_ports(&self) -> Vec<PortId> {
        self.ends.iter().map(|end| end.port).collect()
    }

    pub fn can_send(&mut self, port: PortId) -> bool {
        let Some(end) = self.ends.iter_mut().find(|end| end.port == port) else {
            return false;
        };
        let ok = end.src_side_buf.can_push();
        if !ok {
            end.busy = true;
        }
        ok
    }

    pub fn send(&mut self, msg: Msg, ports: &Ports, sched: &mut Scheduler) -> Result<(), Msg> {
        let (src, _) = check_send(&self.name, &self.end_ports(), &msg, ports);
        let end = &mut self.ends[src];
        if !end.src_side_buf.can_push() {
            end.busy = true;
            self.stats.rejected += 1;
            return Err(msg);
        }
        trace!("{}: accepted {}", self.name, msg.meta().id);
        end.src_side_buf.push(msg);
        self.stats.accepted += 1;
        sched.wake(ComponentRef::Link(self.id));
        Ok(())
    }

    pub fn tick(&mut self, now: Cycle, ports: &mut Ports, sched: &mut Scheduler) -> bool {
        let mut progress = self.deliver(now, ports, sched);
        for end in &mut self.ends {
            progress |= end.pipeline.tick();
        }
        progress |= self.admit(ports, sched);
        progress
    }

    fn deliver(&mut self, now: Cycle, ports: &mut Ports, sched: &mut Scheduler) -> bool {
        if self.ends.len() < 2 {
            return false;
        }
        let mut progress = false;
        for i in 0..2 {
            let dst = self.ends[1 - i].port;
            let post = self.ends[i].pipeline.post_mut();
            while let Some(mut msg) = post.pop() {
                msg.meta_mut().recv_time = now;
                let id = msg.meta().id;
                match ports.recv(dst, msg, sched) {
                    Ok(()) => {
                        trace!("{}: delivered {} at {}", self.name, id, now);
                        self.stats.delivered += 1;
                        progress = true;
                    }
                    Err(msg) => {
                        post.push_front(msg);
                        self.stats.delivery_stalls += 1;
                        break;
                    }
                }
            }
        }
        progress
    }

    fn admit(&mut self, ports: &mut Ports, sched: &mut Scheduler) -> bool {
        let mut progress = false;
        for end in &mut self.ends {
            while end.pipeline.can_accept() {
                let Some(msg) = end.src_side_buf.pop() else {
                    break;
                };
                end.pipeline.accept(msg);
                progress = true;
            }
            if end.busy && end.src_side_buf.can_push() {
                end.busy = false;
                ports.notify_available(end.port, sched);
            }
        }
        progress
    }
}

#[derive(Debug)]
struct DirectEnd {
    port: PortId,
    buf: Buffer<Msg>,
    busy: bool,
}

/// Ideal link without a pipeline.  Items are handed to the far port on the link's next tick.
#[derive(Debug)]
pub struct DirectConnection {
    id: LinkId,
    name: String,
    ends: Vec<DirectEnd>,
    stats: LinkStats,
}

impl DirectConnection {
    pub fn new(id: LinkId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            stats: LinkStats {
                name: name.clone(),
                ..LinkStats::default()
            },
            name,
            ends: Vec::with_capacity(2),
        }
    }

    pub fn plug_in(&mut self, ports: &mut Ports, port: PortId, buf_size: usize) {
        if self.ends.len() >= 2 {
            panic!(
                "{}: a direct connection only joins two ports, cannot plug in {}",
                self.name,
                ports.name(port)
            );
        }
        ports.set_conn(port, Conn::Link(self.id));
        self.ends.push(DirectEnd {
            port,
            buf: Buffer::new(format!("{}.{}.Buf", self.name, ports.name(port)), buf_size),
            busy: false,
        });
    }

    fn end_ports(&self) -> Vec<PortId> {
        self.ends.iter().map(|end| end.port).collect()
    }

    pub fn can_send(&mut self, port: PortId) -> bool {
        let Some(end) = self.ends.iter_mut().find(|end| end.port == port) else {
            return false;
        };
        let ok = end.buf.can_push();
        if !ok {
            end.busy = true;
        }
        ok
    }

    pub fn send(&mut self, msg: Msg, ports: &Ports, sched: &mut Scheduler) -> Result<(), Msg> {
        let (src, _) = check_send(&self.name, &self.end_ports(), &msg, ports);
        let end = &mut self.ends[src];
        if !end.buf.can_push() {
            end.busy = true;
            self.stats.rejected += 1;
            return Err(msg);
        }
        end.buf.push(msg);
        self.stats.accepted += 1;
        sched.wake(ComponentRef::Link(self.id));
        Ok(())
    }

    pub fn tick(&mut self, now: Cycle, ports: &mut Ports, sched: &mut Scheduler) -> bool {
        if self.ends.len() < 2 {
            return false;
        }
        let mut progress = false;
        for i in 0..2 {
            let dst = self.ends[1 - i].port;
            let end = &mut self.ends[i];
            while let Some(mut msg) = end.buf.pop() {
                msg.meta_mut().recv_time = now;
                match ports.recv(dst, msg, sched) {
                    Ok(()) => {
                        self.stats.delivered += 1;
                        progress = true;
                    }
                    Err(msg) => {
                        end.buf.push_front(msg);
                        self.stats.delivery_stalls += 1;
                        break;
                    }
                }
            }
            if end.busy && end.buf.can_push() {
                end.busy = false;
                ports.notify_available(end.port, sched);
            }
        }
        progress
    }
}

/// Every kind of connection a port can be plugged into.
#[derive(Debug)]
pub enum Link {
    Channel(Channel),
    Direct(DirectConnection),
}

impl Link {
    pub fn name(&self) -> &str {
        match self {
            Link::Channel(ch) => &ch.name,
            Link::Direct(dc) => &dc.name,
        }
    }

    pub fn plug_in(&mut self, ports: &mut Ports, port: PortId, buf_size: usize) {
        match self {
            Link::Channel(ch) => ch.plug_in(ports, port, buf_size),
            Link::Direct(dc) => dc.plug_in(ports, port, buf_size),
        }
    }

    /// Whether `port` may send now.  A `false` answer registers the port for a notification
    /// once the link drains.
    pub fn can_send(&mut self, port: PortId) -> bool {
        match self {
            Link::Channel(ch) => ch.can_send(port),
            Link::Direct(dc) => dc.can_send(port),
        }
    }

    pub fn send(&mut self, msg: Msg, ports: &Ports, sched: &mut Scheduler) -> Result<(), Msg> {
        match self {
            Link::Channel(ch) => ch.send(msg, ports, sched),
            Link::Direct(dc) => dc.send(msg, ports, sched),
        }
    }

    pub fn tick(&mut self, now: Cycle, ports: &mut Ports, sched: &mut Scheduler) -> bool {
        match self {
            Link::Channel(ch) => ch.tick(now, ports, sched),
            Link::Direct(dc) => dc.tick(now, ports, sched),
        }
    }

    pub fn stats(&self) -> &LinkStats {
        match self {
            Link::Channel(ch) => &ch.stats,
            Link::Direct(dc) => &dc.stats,
        }
    }
}
