use log::debug;

use crate::base::buffer::Buffer;
use crate::noc::msg::Msg;
use crate::noc::sched::Scheduler;
use crate::noc::types::{ComponentRef, EndPointId, LinkId, PortId, SwitchId};

/// Component that reads from a port.  Device ports belong to the enclosing simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    External,
    Switch(SwitchId),
    EndPoint(EndPointId),
}

impl Owner {
    fn component(self) -> Option<ComponentRef> {
        match self {
            Owner::External => None,
            Owner::Switch(id) => Some(ComponentRef::Switch(id)),
            Owner::EndPoint(id) => Some(ComponentRef::EndPoint(id)),
        }
    }
}

/// What a port is plugged into.  Device ports are plugged into their endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conn {
    Link(LinkId),
    EndPoint(EndPointId),
}

impl Conn {
    fn component(self) -> ComponentRef {
        match self {
            Conn::Link(id) => ComponentRef::Link(id),
            Conn::EndPoint(id) => ComponentRef::EndPoint(id),
        }
    }
}

#[derive(Debug)]
pub struct Port {
    name: String,
    owner: Owner,
    conn: Option<Conn>,
    incoming: Buffer<Msg>,
}

impl Port {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn conn(&self) -> Option<Conn> {
        self.conn
    }

    pub fn incoming(&self) -> &Buffer<Msg> {
        &self.incoming
    }
}

/// Arena of every port in a network.  Ports are referred to by `PortId` only.
#[derive(Debug, Default)]
pub struct Ports {
    ports: Vec<Port>,
    // device ports told they may send again, not yet taken by the caller
    available: Vec<PortId>,
}

impl Ports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn add(&mut self, name: impl Into<String>, capacity: usize, owner: Owner) -> PortId {
        let name = name.into();
        let id = PortId(self.ports.len());
        debug!("port {name} created as {id}");
        self.ports.push(Port {
            incoming: Buffer::new(format!("{name}.Buf"), capacity),
            name,
            owner,
            conn: None,
        });
        id
    }

    pub fn get(&self, id: PortId) -> &Port {
        self.ports
            .get(id.index())
            .unwrap_or_else(|| panic!("unknown port {id}"))
    }

    fn get_mut(&mut self, id: PortId) -> &mut Port {
        self.ports
            .get_mut(id.index())
            .unwrap_or_else(|| panic!("unknown port {id}"))
    }

    pub fn name(&self, id: PortId) -> &str {
        &self.get(id).name
    }

    pub fn find(&self, name: &str) -> Option<PortId> {
        self.ports
            .iter()
            .position(|port| port.name == name)
            .map(PortId)
    }

    pub(crate) fn set_owner(&mut self, id: PortId, owner: Owner) {
        self.get_mut(id).owner = owner;
    }

    /// Attach the port to a connection.  A port lives in exactly one connection.
    pub(crate) fn set_conn(&mut self, id: PortId, conn: Conn) {
        let port = self.get_mut(id);
        if let Some(existing) = port.conn {
            panic!(
                "port {} is already connected to {:?}, cannot plug into {:?}",
                port.name, existing, conn
            );
        }
        port.conn = Some(conn);
    }

    pub fn conn(&self, id: PortId) -> Option<Conn> {
        self.get(id).conn
    }

    /// Called by a connection to hand a message to the port.  Fails when the port buffer is
    /// full; the connection keeps the message and retries after `retrieve` notifies it.
    pub fn recv(&mut self, id: PortId, msg: Msg, sched: &mut Scheduler) -> Result<(), Msg> {
        let port = self.get_mut(id);
        if !port.incoming.can_push() {
            return Err(msg);
        }
        port.incoming.push(msg);
        if let Some(owner) = port.owner.component() {
            sched.wake(owner);
        }
        Ok(())
    }

    pub fn can_recv(&self, id: PortId) -> bool {
        self.get(id).incoming.can_push()
    }

    pub fn peek(&self, id: PortId) -> Option<&Msg> {
        self.get(id).incoming.peek()
    }

    /// Remove the head message and tell the connection there is space again.
    pub fn retrieve(&mut self, id: PortId, sched: &mut Scheduler) -> Option<Msg> {
        let port = self.get_mut(id);
        let msg = port.incoming.pop()?;
        if let Some(conn) = port.conn {
            sched.wake(conn.component());
        }
        Some(msg)
    }

    /// A connection can accept sends from this port again.  External ports are queued for
    /// `take_available`.
    pub(crate) fn notify_available(&mut self, id: PortId, sched: &mut Scheduler) {
        let port = self.get(id);
        match port.owner.component() {
            Some(owner) => sched.wake(owner),
            None => {
                debug!("port {} may send again", port.name);
                if !self.available.contains(&id) {
                    self.available.push(id);
                }
            }
        }
    }

    /// Drain the external ports notified since the last call, in notification order.
    pub fn take_available(&mut self) -> Vec<PortId> {
        std::mem::take(&mut self.available)
    }
}
