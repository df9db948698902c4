use log::{debug, warn};

use crate::noc::arbiter::Arbiter;
use crate::noc::channel::{Channel, DirectConnection, Link};
use crate::noc::config::{ChannelConfig, EndPointConfig, SwitchPortConfig};
use crate::noc::endpoint::EndPoint;
use crate::noc::msg::{Flit, Msg};
use crate::noc::port::{Conn, Owner, Ports};
use crate::noc::routing::RoutingTable;
use crate::noc::sched::Scheduler;
use crate::noc::stats::NetworkStats;
use crate::noc::switch::Switch;
use crate::noc::types::{
    ComponentRef, Cycle, EndPointId, LinkId, PortId, RejectReason, RejectWith, SwitchId,
};

/// What a switch or endpoint may touch while it ticks.
pub struct Wiring<'a> {
    pub(crate) ports: &'a mut Ports,
    pub(crate) links: &'a mut [Link],
    pub(crate) sched: &'a mut Scheduler,
}

impl Wiring<'_> {
    /// Send through the link `msg.meta().src` is plugged into.
    pub fn send(&mut self, msg: Msg) -> Result<(), Msg> {
        let src = msg.meta().src;
        match self.ports.conn(src) {
            Some(Conn::Link(link)) => self.links[link.index()].send(msg, self.ports, self.sched),
            other => panic!(
                "port {} is not plugged into a link ({:?})",
                self.ports.name(src),
                other
            ),
        }
    }

    pub fn send_flit(&mut self, flit: Flit) -> Result<(), Flit> {
        self.send(Msg::Flit(flit)).map_err(|msg| match msg {
            Msg::Flit(flit) => flit,
            Msg::App(msg) => panic!("link handed back message {} for a flit", msg.meta.id),
        })
    }
}

/// Owner of every port, link, switch and endpoint, plus the scheduler that ticks them.
pub struct Network {
    ports: Ports,
    links: Vec<Link>,
    switches: Vec<Switch>,
    endpoints: Vec<EndPoint>,
    sched: Scheduler,
    now: Cycle,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self {
            ports: Ports::new(),
            links: Vec::new(),
            switches: Vec::new(),
            endpoints: Vec::new(),
            sched: Scheduler::new(),
            now: 0,
        }
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    pub fn now(&self) -> Cycle {
        self.now
    }

    /// Add a port read by the enclosing simulator.
    pub fn add_port(&mut self, name: impl Into<String>, capacity: usize) -> PortId {
        self.ports.add(name, capacity, Owner::External)
    }

    pub fn add_channel(&mut self, name: impl Into<String>, config: ChannelConfig) -> LinkId {
        let id = LinkId(self.links.len());
        self.links.push(Link::Channel(Channel::new(id, name, config)));
        id
    }

    pub fn add_direct_link(&mut self, name: impl Into<String>) -> LinkId {
        let id = LinkId(self.links.len());
        self.links.push(Link::Direct(DirectConnection::new(id, name)));
        id
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.index()]
    }

    pub fn plug_in(&mut self, link: LinkId, port: PortId, buf_size: usize) {
        self.links[link.index()].plug_in(&mut self.ports, port, buf_size);
    }

    pub fn add_switch(
        &mut self,
        name: impl Into<String>,
        table: RoutingTable,
        arbiter: Box<dyn Arbiter>,
    ) -> SwitchId {
        let id = SwitchId(self.switches.len());
        let switch = Switch::new(id, name, table, arbiter);
        debug!("switch {} created as {}", switch.name(), id);
        self.switches.push(switch);
        id
    }

    pub fn switch(&self, id: SwitchId) -> &Switch {
        &self.switches[id.index()]
    }

    /// Make `local` a port of the switch.  `remote` is the port at the other end of its link.
    pub fn add_switch_port(
        &mut self,
        switch: SwitchId,
        local: PortId,
        remote: PortId,
        config: SwitchPortConfig,
    ) {
        self.ports.set_owner(local, Owner::Switch(switch));
        self.switches[switch.index()].add_port(local, remote, config);
    }

    pub fn set_routing_table(&mut self, switch: SwitchId, table: RoutingTable) {
        self.switches[switch.index()].set_table(table);
    }

    /// Put an endpoint between `device_ports` and `network_port`.  `switch_port` is the port
    /// the network port's link leads to.
    pub fn add_endpoint(
        &mut self,
        name: impl Into<String>,
        device_ports: Vec<PortId>,
        network_port: PortId,
        switch_port: PortId,
        config: EndPointConfig,
    ) -> EndPointId {
        let id = EndPointId(self.endpoints.len());
        for port in &device_ports {
            self.ports.set_conn(*port, Conn::EndPoint(id));
        }
        self.ports.set_owner(network_port, Owner::EndPoint(id));
        let ep = EndPoint::new(id, name, device_ports, network_port, switch_port, config);
        debug!("endpoint {} created as {}", ep.name(), id);
        self.endpoints.push(ep);
        id
    }

    pub fn endpoint(&self, id: EndPointId) -> &EndPoint {
        &self.endpoints[id.index()]
    }

    /// Send from a device port.  A refused message comes back inside the error with the
    /// cycle to retry at.
    pub fn send(&mut self, now: Cycle, msg: impl Into<Msg>) -> Result<(), RejectWith<Msg>> {
        let msg = msg.into();
        let src = msg.meta().src;
        match self.ports.conn(src) {
            Some(Conn::Link(link)) => self.links[link.index()]
                .send(msg, &self.ports, &mut self.sched)
                .map_err(|msg| RejectWith::retry_next(msg, now, RejectReason::Busy)),
            Some(Conn::EndPoint(ep)) => match msg {
                Msg::App(msg) => self.endpoints[ep.index()]
                    .send(now, msg, &mut self.sched)
                    .map_err(|msg| {
                        RejectWith::retry_next(Msg::App(msg), now, RejectReason::QueueFull)
                    }),
                Msg::Flit(flit) => panic!(
                    "port {} sent flit {} to an endpoint",
                    self.ports.name(src),
                    flit.meta.id
                ),
            },
            None => panic!("port {} is not connected", self.ports.name(src)),
        }
    }

    /// Whether `port` may send now.  A `false` answer registers the port for a wake-up.
    pub fn can_send(&mut self, port: PortId) -> bool {
        match self.ports.conn(port) {
            Some(Conn::Link(link)) => self.links[link.index()].can_send(port),
            Some(Conn::EndPoint(ep)) => self.endpoints[ep.index()].can_send(),
            None => false,
        }
    }

    /// Device ports that were refused earlier and may send again, in notification order.
    /// Each notification is returned once.
    pub fn take_available(&mut self) -> Vec<PortId> {
        self.ports.take_available()
    }

    pub fn peek(&self, port: PortId) -> Option<&Msg> {
        self.ports.peek(port)
    }

    pub fn retrieve(&mut self, port: PortId) -> Option<Msg> {
        self.ports.retrieve(port, &mut self.sched)
    }

    /// Run one cycle over the components that have work.  Returns whether any of them made
    /// progress.
    pub fn tick(&mut self, now: Cycle) -> bool {
        self.now = now;
        self.sched.begin_cycle();
        let mut progress = false;
        while let Some(component) = self.sched.pop() {
            let made = match component {
                ComponentRef::EndPoint(id) => {
                    let mut w = Wiring {
                        ports: &mut self.ports,
                        links: &mut self.links,
                        sched: &mut self.sched,
                    };
                    self.endpoints[id.index()].tick(now, &mut w)
                }
                ComponentRef::Switch(id) => {
                    let mut w = Wiring {
                        ports: &mut self.ports,
                        links: &mut self.links,
                        sched: &mut self.sched,
                    };
                    self.switches[id.index()].tick(now, &mut w)
                }
                ComponentRef::Link(id) => {
                    self.links[id.index()].tick(now, &mut self.ports, &mut self.sched)
                }
            };
            if made {
                self.sched.wake_later(component);
                progress = true;
            }
        }
        self.sched.end_cycle();
        progress
    }

    pub fn is_idle(&self) -> bool {
        self.sched.is_idle()
    }

    /// Tick from `start` until nothing is scheduled or `max_cycles` have passed.  Returns the
    /// first cycle that was not ticked.
    pub fn run_until_idle(&mut self, start: Cycle, max_cycles: u64) -> Cycle {
        let mut now = start;
        while !self.sched.is_idle() {
            if now - start >= max_cycles {
                warn!(
                    "network still busy after {} cycles, {} components pending",
                    max_cycles,
                    self.sched.pending()
                );
                break;
            }
            self.tick(now);
            now += 1;
        }
        now
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            now: self.now,
            links: self.links.iter().map(|link| link.stats().clone()).collect(),
            switches: self.switches.iter().map(|sw| sw.stats().clone()).collect(),
            endpoints: self.endpoints.iter().map(|ep| ep.stats().clone()).collect(),
        }
    }
}
