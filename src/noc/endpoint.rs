use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, trace};

use crate::noc::config::EndPointConfig;
use crate::noc::msg::{Flit, Message, Msg, MsgId};
use crate::noc::network::Wiring;
use crate::noc::sched::Scheduler;
use crate::noc::stats::EndPointStats;
use crate::noc::types::{ComponentRef, Cycle, EndPointId, PortId};

#[derive(Debug)]
struct Assembly {
    msg: Arc<Message>,
    required: u32,
    arrived: u32,
}

/// Adapter between device ports and the network.  Fragments outgoing messages into flits
/// and reassembles incoming flits.
#[derive(Debug)]
pub struct EndPoint {
    id: EndPointId,
    name: String,
    config: EndPointConfig,
    device_ports: Vec<PortId>,
    network_port: PortId,
    // first-hop switch port
    switch_port: PortId,
    msg_out_buf: VecDeque<Message>,
    flits_to_send: VecDeque<Flit>,
    assembling: HashMap<MsgId, Assembly>,
    // completion order
    completed: Vec<MsgId>,
    assembled: VecDeque<Message>,
    notify_devices: bool,
    stats: EndPointStats,
}

impl EndPoint {
    pub fn new(
        id: EndPointId,
        name: impl Into<String>,
        device_ports: Vec<PortId>,
        network_port: PortId,
        switch_port: PortId,
        config: EndPointConfig,
    ) -> Self {
        assert!(config.flit_byte_size > 0, "flit byte size must be > 0");
        assert!(
            config.num_input_channels > 0 && config.num_output_channels > 0,
            "endpoint channel counts must be > 0"
        );
        let name = name.into();
        Self {
            id,
            stats: EndPointStats {
                name: name.clone(),
                ..EndPointStats::default()
            },
            name,
            config,
            device_ports,
            network_port,
            switch_port,
            msg_out_buf: VecDeque::new(),
            flits_to_send: VecDeque::new(),
            assembling: HashMap::new(),
            completed: Vec::new(),
            assembled: VecDeque::new(),
            notify_devices: false,
        }
    }

    pub fn id(&self) -> EndPointId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_ports(&self) -> &[PortId] {
        &self.device_ports
    }

    pub fn network_port(&self) -> PortId {
        self.network_port
    }

    pub fn stats(&self) -> &EndPointStats {
        &self.stats
    }

    fn has_room(&self) -> bool {
        self.msg_out_buf.len() < self.config.msg_out_buf_size
    }

    /// Whether a device may send now.  A `false` answer makes the endpoint notify its device
    /// ports once the outgoing queue drains.
    pub fn can_send(&mut self) -> bool {
        let ok = self.has_room();
        if !ok {
            self.notify_devices = true;
        }
        ok
    }

    /// Accept a message from a device port.  A full outgoing queue hands the message back.
    pub fn send(
        &mut self,
        now: Cycle,
        mut msg: Message,
        sched: &mut Scheduler,
    ) -> Result<(), Message> {
        if msg.meta.src == msg.meta.dst {
            panic!(
                "{}: message {} is sent from {} to itself",
                self.name, msg.meta.id, msg.meta.src
            );
        }
        if !self.can_send() {
            self.stats.msgs_rejected += 1;
            return Err(msg);
        }
        msg.meta.send_time = now;
        match msg.rsp_to {
            Some(req) => trace!("msg_{}_e2e start (rsp to {})", msg.meta.id, req),
            None => trace!("msg_{}_e2e start", msg.meta.id),
        }
        self.msg_out_buf.push_back(msg);
        self.stats.msgs_accepted += 1;
        sched.wake(ComponentRef::EndPoint(self.id));
        Ok(())
    }

    pub fn tick(&mut self, now: Cycle, w: &mut Wiring) -> bool {
        let mut progress = false;
        progress |= self.send_flits(now, w);
        progress |= self.prepare_flits();
        progress |= self.recv_flits(w);
        progress |= self.assemble();
        progress |= self.deliver(now, w);
        progress
    }

    fn send_flits(&mut self, now: Cycle, w: &mut Wiring) -> bool {
        let mut progress = false;
        for _ in 0..self.config.num_output_channels {
            let Some(mut flit) = self.flits_to_send.pop_front() else {
                break;
            };
            flit.meta.send_time = now;
            let id = flit.meta.id;
            match w.send_flit(flit) {
                Ok(()) => {
                    trace!("{}_e2e start", id);
                    self.stats.flits_sent += 1;
                    progress = true;
                }
                Err(flit) => {
                    self.flits_to_send.push_front(flit);
                    break;
                }
            }
        }

        if self.flits_to_send.is_empty() && self.notify_devices && self.has_room() {
            self.notify_devices = false;
            for port in &self.device_ports {
                w.ports.notify_available(*port, w.sched);
            }
        }
        progress
    }

    fn prepare_flits(&mut self) -> bool {
        if self.flits_to_send.len() > self.config.num_output_channels {
            return false;
        }
        let Some(msg) = self.msg_out_buf.pop_front() else {
            return false;
        };
        let flits = Flit::fragment(
            msg,
            self.network_port,
            self.switch_port,
            self.config.flit_byte_size,
            self.config.encoding_overhead,
        );
        debug!(
            "{}: message {} split into {} flits",
            self.name,
            flits[0].msg.id(),
            flits.len()
        );
        self.flits_to_send.extend(flits);
        true
    }

    fn recv_flits(&mut self, w: &mut Wiring) -> bool {
        let mut progress = false;
        for _ in 0..self.config.num_input_channels {
            let Some(msg) = w.ports.retrieve(self.network_port, w.sched) else {
                break;
            };
            let flit = match msg {
                Msg::Flit(flit) => flit,
                Msg::App(msg) => panic!(
                    "{}: network port received message {} which is not a flit",
                    self.name, msg.meta.id
                ),
            };
            trace!("{}_e2e end", flit.meta.id);
            self.stats.flits_received += 1;

            let msg_id = flit.msg.id();
            let record = self.assembling.entry(msg_id).or_insert_with(|| Assembly {
                msg: Arc::clone(&flit.msg),
                required: flit.num_flits_in_msg,
                arrived: 0,
            });
            record.arrived += 1;
            if record.arrived == record.required {
                self.completed.push(msg_id);
            }
            progress = true;
        }
        progress
    }

    fn assemble(&mut self) -> bool {
        if self.completed.is_empty() {
            return false;
        }
        for msg_id in self.completed.drain(..) {
            let Some(record) = self.assembling.remove(&msg_id) else {
                continue;
            };
            let msg = Arc::try_unwrap(record.msg).unwrap_or_else(|shared| (*shared).clone());
            self.assembled.push_back(msg);
        }
        true
    }

    fn deliver(&mut self, now: Cycle, w: &mut Wiring) -> bool {
        let mut progress = false;
        while let Some(mut msg) = self.assembled.pop_front() {
            let dst = msg.meta.dst;
            msg.meta.recv_time = now;
            let (id, bytes, latency) = (
                msg.meta.id,
                msg.meta.traffic_bytes,
                now.saturating_sub(msg.meta.send_time),
            );
            match w.ports.recv(dst, Msg::App(msg), w.sched) {
                Ok(()) => {
                    trace!("msg_{}_e2e end", id);
                    self.stats.msgs_delivered += 1;
                    self.stats.bytes_delivered += bytes as u64;
                    self.stats.total_latency += latency;
                    progress = true;
                }
                Err(msg) => {
                    if let Some(msg) = msg.into_app() {
                        self.assembled.push_front(msg);
                    }
                    break;
                }
            }
        }
        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noc::channel::Link;
    use crate::noc::port::{Conn, Owner, Ports};

    fn endpoint(ports: &mut Ports, config: EndPointConfig) -> (EndPoint, PortId, PortId) {
        let dev = ports.add("dev", 2, Owner::External);
        let net = ports.add("ep.NetworkPort", 8, Owner::EndPoint(EndPointId(0)));
        ports.set_conn(dev, Conn::EndPoint(EndPointId(0)));
        let ep = EndPoint::new(EndPointId(0), "ep", vec![dev], net, PortId(99), config);
        (ep, dev, net)
    }

    #[test]
    fn full_queue_rejects_send() {
        let mut ports = Ports::new();
        let mut sched = Scheduler::new();
        let config = EndPointConfig {
            msg_out_buf_size: 1,
            ..EndPointConfig::default()
        };
        let (mut ep, dev, _) = endpoint(&mut ports, config);
        ep.send(0, Message::new(dev, PortId(50), 8), &mut sched).unwrap();
        let back = ep.send(0, Message::new(dev, PortId(50), 8), &mut sched);
        assert!(back.is_err());
        assert_eq!(1, ep.stats().msgs_rejected);
    }

    #[test]
    fn out_of_order_flits_complete_by_count() {
        let mut ports = Ports::new();
        let mut sched = Scheduler::new();
        let mut links: Vec<Link> = Vec::new();
        let (mut ep, dev, net) = endpoint(&mut ports, EndPointConfig::default());

        let msg = Message::new(PortId(50), dev, 200);
        let id = msg.id();
        let mut flits = Flit::fragment(msg, PortId(98), net, 64, 0.0);
        assert_eq!(4, flits.len());
        flits.reverse();
        for flit in flits {
            ports.recv(net, flit.into(), &mut sched).unwrap();
        }

        let mut w = Wiring {
            ports: &mut ports,
            links: &mut links,
            sched: &mut sched,
        };
        for now in 0..4 {
            ep.tick(now, &mut w);
            if now < 3 {
                assert!(w.ports.peek(dev).is_none());
            }
        }
        let delivered = w.ports.peek(dev).expect("message delivered");
        assert_eq!(id, delivered.meta().id);
        assert_eq!(200, delivered.meta().traffic_bytes);
        assert_eq!(3, delivered.meta().recv_time);
        assert!(ep.assembling.is_empty());
    }

    #[test]
    fn blocked_head_holds_later_messages() {
        let mut ports = Ports::new();
        let mut sched = Scheduler::new();
        let mut links: Vec<Link> = Vec::new();
        let (mut ep, dev, _) = endpoint(&mut ports, EndPointConfig::default());
        let other = ports.add("dev2", 1, Owner::External);

        // dev holds two messages, other is free
        ep.assembled.push_back(Message::new(PortId(50), dev, 1));
        ep.assembled.push_back(Message::new(PortId(50), dev, 1));
        ep.assembled.push_back(Message::new(PortId(50), dev, 1));
        ep.assembled.push_back(Message::new(PortId(50), other, 1));
        let mut w = Wiring {
            ports: &mut ports,
            links: &mut links,
            sched: &mut sched,
        };
        ep.tick(0, &mut w);
        assert_eq!(2, ep.stats().msgs_delivered);
        assert!(w.ports.peek(other).is_none());
        assert_eq!(2, ep.assembled.len());
    }
}
