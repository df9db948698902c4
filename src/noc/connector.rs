use std::collections::{HashSet, VecDeque};

use anyhow::{bail, Context};
use log::{debug, info};
use serde::Deserialize;

use crate::noc::arbiter::XBarArbiter;
use crate::noc::config::{ChannelConfig, NetworkConfig, SwitchPortConfig};
use crate::noc::network::Network;
use crate::noc::routing::{link_nodes, LinkParameter, Node, NodeKind, RoutingTable};
use crate::noc::types::{EndPointId, LinkId, PortId, SwitchId};

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LinkEndSwitchParameter {
    pub incoming_buf_size: usize,
    pub outgoing_buf_size: usize,
    pub num_input_channel: usize,
    pub num_output_channel: usize,
    pub latency: usize,
    /// Empty means `<switch>.Port<n>`.
    pub port_name: String,
}

impl Default for LinkEndSwitchParameter {
    fn default() -> Self {
        Self {
            incoming_buf_size: 4,
            outgoing_buf_size: 4,
            num_input_channel: 1,
            num_output_channel: 1,
            latency: 1,
            port_name: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct LinkEndDeviceParameter {
    pub incoming_buf_size: usize,
    pub outgoing_buf_size: usize,
    pub num_input_channel: usize,
    pub num_output_channel: usize,
}

impl Default for LinkEndDeviceParameter {
    fn default() -> Self {
        Self {
            incoming_buf_size: 4,
            outgoing_buf_size: 4,
            num_input_channel: 1,
            num_output_channel: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DeviceToSwitchLinkParameter {
    pub device_end: LinkEndDeviceParameter,
    pub switch_end: LinkEndSwitchParameter,
    pub link: LinkParameter,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SwitchToSwitchLinkParameter {
    pub left_end: LinkEndSwitchParameter,
    pub right_end: LinkEndSwitchParameter,
    pub link: LinkParameter,
}

#[derive(Debug)]
struct DeviceDecl {
    name: String,
    port_names: Vec<String>,
    switch: SwitchId,
    param: DeviceToSwitchLinkParameter,
}

#[derive(Debug)]
struct SwitchLinkDecl {
    left: SwitchId,
    right: SwitchId,
    param: SwitchToSwitchLinkParameter,
}

/// Device attached by the connector, with its ports in declaration order.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    pub name: String,
    pub endpoint: EndPointId,
    pub ports: Vec<PortId>,
}

#[derive(Debug, Clone)]
pub struct SwitchHandle {
    pub name: String,
    pub id: SwitchId,
}

/// A constructed network with routing tables installed.
pub struct BuiltNetwork {
    pub network: Network,
    pub devices: Vec<DeviceHandle>,
    pub switches: Vec<SwitchHandle>,
}

impl BuiltNetwork {
    pub fn device(&self, name: &str) -> Option<&DeviceHandle> {
        self.devices.iter().find(|dev| dev.name == name)
    }

    /// First port of the named device.
    pub fn port(&self, device: &str) -> Option<PortId> {
        self.device(device).and_then(|dev| dev.ports.first().copied())
    }
}

/// Declarative topology description.  Nothing is constructed until `build`.
#[derive(Debug)]
pub struct Connector {
    config: NetworkConfig,
    switches: Vec<String>,
    devices: Vec<DeviceDecl>,
    links: Vec<SwitchLinkDecl>,
}

impl Connector {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            switches: Vec::new(),
            devices: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn add_switch(&mut self, name: impl Into<String>) -> SwitchId {
        self.switches.push(name.into());
        SwitchId(self.switches.len() - 1)
    }

    /// Attach a device with the given ports to `switch` through an endpoint.
    pub fn connect_device<S: Into<String>>(
        &mut self,
        name: impl Into<String>,
        port_names: impl IntoIterator<Item = S>,
        switch: SwitchId,
        param: DeviceToSwitchLinkParameter,
    ) {
        self.devices.push(DeviceDecl {
            name: name.into(),
            port_names: port_names.into_iter().map(Into::into).collect(),
            switch,
            param,
        });
    }

    /// Like `connect_device`, with the network's `device_link` parameters.
    pub fn connect_device_default<S: Into<String>>(
        &mut self,
        name: impl Into<String>,
        port_names: impl IntoIterator<Item = S>,
        switch: SwitchId,
    ) {
        let param = self.config.device_link.clone();
        self.connect_device(name, port_names, switch, param);
    }

    pub fn connect_switches(
        &mut self,
        left: SwitchId,
        right: SwitchId,
        param: SwitchToSwitchLinkParameter,
    ) {
        self.links.push(SwitchLinkDecl { left, right, param });
    }

    /// Like `connect_switches`, with the network's `switch_link` parameters.
    pub fn connect_switches_default(&mut self, left: SwitchId, right: SwitchId) {
        let param = self.config.switch_link.clone();
        self.connect_switches(left, right, param);
    }

    fn switch_name(&self, id: SwitchId) -> anyhow::Result<&str> {
        self.switches
            .get(id.index())
            .map(String::as_str)
            .with_context(|| format!("unknown switch {id}"))
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.config.flit_byte_size == 0 {
            bail!("flit_byte_size must be > 0");
        }
        let mut names = HashSet::new();
        for name in &self.switches {
            if !names.insert(name.as_str()) {
                bail!("switch name {name} is used twice");
            }
        }
        for dev in &self.devices {
            if !names.insert(dev.name.as_str()) {
                bail!("device name {} is already taken", dev.name);
            }
            let mut seen = HashSet::new();
            if let Some(dup) = dev.port_names.iter().find(|p| !seen.insert(p.as_str())) {
                bail!("device {} declares port {dup} twice", dev.name);
            }
        }
        for dev in &self.devices {
            let sw = self
                .switch_name(dev.switch)
                .with_context(|| format!("device {} is attached to a missing switch", dev.name))?;
            if dev.port_names.is_empty() {
                bail!("device {} has no ports", dev.name);
            }
            let d = &dev.param.device_end;
            if d.num_input_channel == 0 || d.num_output_channel == 0 {
                bail!("device {} needs at least one input and output channel", dev.name);
            }
            if d.incoming_buf_size == 0 || d.outgoing_buf_size == 0 {
                bail!("device {}: buffers must not be empty", dev.name);
            }
            check_switch_end(sw, &dev.param.switch_end)?;
            check_link(&dev.name, &dev.param.link)?;
        }
        for link in &self.links {
            let left = self.switch_name(link.left)?;
            let right = self.switch_name(link.right)?;
            if link.left == link.right {
                bail!("switch {left} cannot be linked to itself");
            }
            check_switch_end(left, &link.param.left_end)?;
            check_switch_end(right, &link.param.right_end)?;
            check_link(&format!("{left}-{right}"), &link.param.link)?;
        }
        if !self.devices.is_empty() {
            self.check_connected()?;
        }
        Ok(())
    }

    /// Every switch must reach every other one, or some device is unreachable.
    fn check_connected(&self) -> anyhow::Result<()> {
        let n = self.switches.len();
        let mut adjacent = vec![Vec::new(); n];
        for link in &self.links {
            adjacent[link.left.index()].push(link.right.index());
            adjacent[link.right.index()].push(link.left.index());
        }
        let mut seen = vec![false; n];
        let mut queue = VecDeque::from([0]);
        seen[0] = true;
        while let Some(sw) = queue.pop_front() {
            for &next in &adjacent[sw] {
                if !seen[next] {
                    seen[next] = true;
                    queue.push_back(next);
                }
            }
        }
        if let Some(lost) = seen.iter().position(|s| !s) {
            bail!(
                "switch {} is unreachable from switch {}",
                self.switches[lost],
                self.switches[0]
            );
        }
        Ok(())
    }

    /// Validate the declaration, construct every component and install the routing tables.
    pub fn build(self) -> anyhow::Result<BuiltNetwork> {
        self.validate()?;
        let cfg = &self.config;
        let mut net = Network::new();
        let mut nodes = Vec::new();
        let mut switches = Vec::new();
        let mut next_port = vec![0usize; self.switches.len()];

        for name in &self.switches {
            let id = net.add_switch(
                name.as_str(),
                RoutingTable::new(),
                Box::new(XBarArbiter::new()),
            );
            nodes.push(Node::switch(name.as_str(), id));
            switches.push(SwitchHandle {
                name: name.clone(),
                id,
            });
        }

        let mut devices = Vec::new();
        for dev in &self.devices {
            let DeviceToSwitchLinkParameter {
                device_end,
                switch_end,
                link,
            } = &dev.param;
            let ports: Vec<PortId> = dev
                .port_names
                .iter()
                .map(|p| net.add_port(format!("{}.{}", dev.name, p), device_end.incoming_buf_size))
                .collect();
            let network_port = net.add_port(
                format!("{}.NetworkPort", dev.name),
                device_end.incoming_buf_size,
            );
            let sw_port = self.add_switch_side(&mut net, &mut next_port, dev.switch, switch_end);

            let link_name = format!("{}-{}", dev.name, self.switches[dev.switch.index()]);
            let link_id = make_link(&mut net, link_name, link);
            net.plug_in(link_id, network_port, device_end.outgoing_buf_size);
            net.plug_in(link_id, sw_port, switch_end.outgoing_buf_size);
            net.add_switch_port(dev.switch, sw_port, network_port, switch_port_config(switch_end));

            let endpoint = net.add_endpoint(
                format!("{}.EndPoint", dev.name),
                ports.clone(),
                network_port,
                sw_port,
                cfg.endpoint_config(device_end.num_input_channel, device_end.num_output_channel),
            );

            nodes.push(Node::device(dev.name.as_str(), ports.clone()));
            let dev_node = nodes.len() - 1;
            link_nodes(&mut nodes, dev_node, network_port, dev.switch.index(), sw_port, *link);
            devices.push(DeviceHandle {
                name: dev.name.clone(),
                endpoint,
                ports,
            });
        }

        for decl in &self.links {
            let SwitchToSwitchLinkParameter {
                left_end,
                right_end,
                link,
            } = &decl.param;
            let left = self.add_switch_side(&mut net, &mut next_port, decl.left, left_end);
            let right = self.add_switch_side(&mut net, &mut next_port, decl.right, right_end);
            let name = format!(
                "{}-{}",
                self.switches[decl.left.index()],
                self.switches[decl.right.index()]
            );
            let link_id = make_link(&mut net, name, link);
            net.plug_in(link_id, left, left_end.outgoing_buf_size);
            net.plug_in(link_id, right, right_end.outgoing_buf_size);
            net.add_switch_port(decl.left, left, right, switch_port_config(left_end));
            net.add_switch_port(decl.right, right, left, switch_port_config(right_end));
            link_nodes(&mut nodes, decl.left.index(), left, decl.right.index(), right, *link);
        }

        let router = cfg.router.build(cfg.flit_byte_size);
        router.establish_route(&mut nodes);
        for node in &mut nodes {
            if let NodeKind::Switch(id) = node.kind {
                if let Some(table) = node.table.take() {
                    debug!("{}: {} routes installed", node.name, table.len());
                    net.set_routing_table(id, table);
                }
            }
        }

        info!(
            "network built: {} switches, {} devices, {} switch links",
            switches.len(),
            devices.len(),
            self.links.len()
        );
        Ok(BuiltNetwork {
            network: net,
            devices,
            switches,
        })
    }

    fn add_switch_side(
        &self,
        net: &mut Network,
        next_port: &mut [usize],
        switch: SwitchId,
        end: &LinkEndSwitchParameter,
    ) -> PortId {
        let sw_name = &self.switches[switch.index()];
        let index = next_port[switch.index()];
        next_port[switch.index()] += 1;
        let name = if end.port_name.is_empty() {
            format!("{sw_name}.Port{index}")
        } else {
            format!("{sw_name}.{}", end.port_name)
        };
        net.add_port(name, end.incoming_buf_size)
    }
}

fn check_switch_end(switch: &str, end: &LinkEndSwitchParameter) -> anyhow::Result<()> {
    if end.num_input_channel == 0 || end.num_output_channel == 0 {
        bail!("switch {switch}: port needs at least one input and output channel");
    }
    if end.incoming_buf_size == 0 || end.outgoing_buf_size == 0 {
        bail!("switch {switch}: port buffers must not be empty");
    }
    Ok(())
}

fn check_link(name: &str, link: &LinkParameter) -> anyhow::Result<()> {
    if link.is_ideal {
        return Ok(());
    }
    if link.pipeline_width == 0 {
        bail!("link {name}: pipeline_width must be > 0");
    }
    if link.num_stage > 0 && link.cycle_per_stage == 0 {
        bail!("link {name}: cycle_per_stage must be > 0");
    }
    if link.frequency <= 0.0 {
        bail!("link {name}: frequency must be > 0");
    }
    Ok(())
}

fn switch_port_config(end: &LinkEndSwitchParameter) -> SwitchPortConfig {
    SwitchPortConfig {
        latency: end.latency,
        num_input_channel: end.num_input_channel,
        num_output_channel: end.num_output_channel,
    }
}

fn make_link(net: &mut Network, name: String, link: &LinkParameter) -> LinkId {
    if link.is_ideal {
        return net.add_direct_link(name);
    }
    net.add_channel(
        name,
        ChannelConfig {
            num_stage: link.num_stage,
            cycle_per_stage: link.cycle_per_stage,
            pipeline_width: link.pipeline_width,
        },
    )
}
