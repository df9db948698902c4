use std::collections::HashMap;
use std::fmt::Write as _;

use log::debug;
use serde::Deserialize;

use crate::noc::types::{PortId, SwitchId};

/// Per-switch map from final destination port to the local output port.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<PortId, PortId>,
    default_route: Option<PortId>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_route(&mut self, dst: PortId, out: PortId) {
        self.routes.insert(dst, out);
    }

    /// Route used for every destination without an explicit entry.
    pub fn define_default_route(&mut self, out: PortId) {
        self.default_route = Some(out);
    }

    pub fn find_port(&self, dst: PortId) -> Option<PortId> {
        self.routes.get(&dst).copied().or(self.default_route)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.default_route.is_none()
    }
}

/// Physical parameters of a link, used for bandwidth-aware routing.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LinkParameter {
    pub is_ideal: bool,
    /// Cycles per second.
    pub frequency: f64,
    pub num_stage: usize,
    pub cycle_per_stage: usize,
    pub pipeline_width: usize,
}

impl Default for LinkParameter {
    fn default() -> Self {
        Self {
            is_ideal: false,
            frequency: 1e9,
            num_stage: 1,
            cycle_per_stage: 1,
            pipeline_width: 1,
        }
    }
}

impl LinkParameter {
    pub fn ideal() -> Self {
        Self {
            is_ideal: true,
            ..Self::default()
        }
    }

    /// Bytes per second.  Ideal links are unbounded.
    pub fn bandwidth(&self, flit_size: u32) -> f64 {
        if self.is_ideal {
            return f64::INFINITY;
        }
        let cycles = self.cycle_per_stage.max(1) as f64;
        self.frequency * self.pipeline_width as f64 * flit_size as f64 / cycles
    }
}

/// A direct neighbour of a routing node.
#[derive(Debug, Clone)]
pub struct Remote {
    pub local_port: PortId,
    pub remote_node: usize,
    pub remote_port: PortId,
    pub link: LinkParameter,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Switch(SwitchId),
    /// Device behind an endpoint; `ports` are the destinations that route to it.
    Device { ports: Vec<PortId> },
}

/// Static snapshot of one node of the topology graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub remotes: Vec<Remote>,
    /// Table to fill; only switches have one.
    pub table: Option<RoutingTable>,
}

impl Node {
    pub fn switch(name: impl Into<String>, id: SwitchId) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Switch(id),
            remotes: Vec::new(),
            table: Some(RoutingTable::new()),
        }
    }

    pub fn device(name: impl Into<String>, ports: Vec<PortId>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Device { ports },
            remotes: Vec::new(),
            table: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn list_remotes(&self) -> &[Remote] {
        &self.remotes
    }

    pub fn table(&self) -> Option<&RoutingTable> {
        self.table.as_ref()
    }

    pub fn table_mut(&mut self) -> Option<&mut RoutingTable> {
        self.table.as_mut()
    }
}

/// Connect `nodes[a].a_port` and `nodes[b].b_port` in both directions.
pub fn link_nodes(
    nodes: &mut [Node],
    a: usize,
    a_port: PortId,
    b: usize,
    b_port: PortId,
    link: LinkParameter,
) {
    nodes[a].remotes.push(Remote {
        local_port: a_port,
        remote_node: b,
        remote_port: b_port,
        link,
    });
    nodes[b].remotes.push(Remote {
        local_port: b_port,
        remote_node: a,
        remote_port: a_port,
        link,
    });
}

/// Fills the routing tables of every switch node.  Runs once over a static graph; it must be
/// re-run from scratch if the topology changes.
pub trait Router {
    fn establish_route(&self, nodes: &mut [Node]);
}

#[derive(Debug, Clone, Copy)]
struct RouteInfo<W> {
    weight: W,
    next_hop: Option<usize>, // index into the source node's remotes
}

fn find_remote(remotes: &[Remote], dst: usize) -> Option<usize> {
    remotes.iter().position(|r| r.remote_node == dst)
}

/// Write the computed next hops into the switch tables.
fn table_to_route<W: Copy>(table: &[Vec<RouteInfo<W>>], nodes: &mut [Node]) {
    let devices: Vec<(usize, Vec<PortId>)> = nodes
        .iter()
        .enumerate()
        .filter_map(|(j, node)| match &node.kind {
            NodeKind::Device { ports } => Some((j, ports.clone())),
            NodeKind::Switch(_) => None,
        })
        .collect();

    for i in 0..nodes.len() {
        if !matches!(nodes[i].kind, NodeKind::Switch(_)) {
            continue;
        }
        for (j, ports) in &devices {
            let Some(hop) = table[i][*j].next_hop else {
                panic!(
                    "{}: no route to {}, the node is unreachable",
                    nodes[i].name, nodes[*j].name
                );
            };
            let out = nodes[i].remotes[hop].local_port;
            let name = nodes[i].name.clone();
            let routing = nodes[i]
                .table
                .as_mut()
                .unwrap_or_else(|| panic!("switch {name} has no routing table"));
            for port in ports {
                routing.define_route(*port, out);
            }
        }
    }
}

fn dump_table<W: std::fmt::Display>(table: &[Vec<RouteInfo<W>>], nodes: &[Node]) -> String {
    let mut out = String::new();
    for (i, row) in table.iter().enumerate() {
        for (j, cell) in row.iter().enumerate() {
            let via = cell
                .next_hop
                .map(|hop| nodes[nodes[i].remotes[hop].remote_node].name.as_str())
                .unwrap_or("XXX");
            let _ = write!(out, "{} {}->{}->{}\t", cell.weight, nodes[i].name, via, nodes[j].name);
        }
        out.push('\n');
    }
    out
}

/// Establishes the routes with the fewest hops.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloydWarshallRouter;

impl Router for FloydWarshallRouter {
    fn establish_route(&self, nodes: &mut [Node]) {
        let n = nodes.len();
        let unreachable = 2 * n as u32;
        let mut table: Vec<Vec<RouteInfo<u32>>> = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        let remotes = &nodes[i].remotes;
                        if i == j {
                            let next_hop = (!remotes.is_empty()).then_some(0);
                            return RouteInfo { weight: 0, next_hop };
                        }
                        match find_remote(remotes, j) {
                            Some(hop) => RouteInfo {
                                weight: 1,
                                next_hop: Some(hop),
                            },
                            None => RouteInfo {
                                weight: unreachable,
                                next_hop: None,
                            },
                        }
                    })
                    .collect()
            })
            .collect();

        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    let through = table[i][k].weight + table[k][j].weight;
                    if through < table[i][j].weight {
                        table[i][j].weight = through;
                        table[i][j].next_hop = table[i][k].next_hop;
                    }
                }
            }
        }

        debug!("shortest-hop routes:\n{}", dump_table(&table, nodes));
        table_to_route(&table, nodes);
    }
}

/// Establishes the routes whose narrowest link is the widest, so traffic prefers fat links
/// over short paths in heterogeneous fabrics.
#[derive(Debug, Clone, Copy)]
pub struct BandwidthFirstRouter {
    pub flit_size: u32,
}

impl BandwidthFirstRouter {
    pub fn new(flit_size: u32) -> Self {
        Self { flit_size }
    }
}

impl Router for BandwidthFirstRouter {
    fn establish_route(&self, nodes: &mut [Node]) {
        let n = nodes.len();
        let mut table: Vec<Vec<RouteInfo<f64>>> = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        let remotes = &nodes[i].remotes;
                        if i == j {
                            let next_hop = (!remotes.is_empty()).then_some(0);
                            return RouteInfo {
                                weight: f64::INFINITY,
                                next_hop,
                            };
                        }
                        match find_remote(remotes, j) {
                            Some(hop) => RouteInfo {
                                weight: remotes[hop].link.bandwidth(self.flit_size),
                                next_hop: Some(hop),
                            },
                            None => RouteInfo {
                                weight: -1.0,
                                next_hop: None,
                            },
                        }
                    })
                    .collect()
            })
            .collect();

        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    let through = table[i][k].weight.min(table[k][j].weight);
                    if through > table[i][j].weight {
                        table[i][j].weight = through;
                        table[i][j].next_hop = table[i][k].next_hop;
                    }
                }
            }
        }

        debug!("bandwidth-first routes:\n{}", dump_table(&table, nodes));
        table_to_route(&table, nodes);
    }
}

/// Router selection for the topology builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterKind {
    #[default]
    FloydWarshall,
    BandwidthFirst,
}

impl RouterKind {
    pub fn build(self, flit_size: u32) -> Box<dyn Router> {
        match self {
            RouterKind::FloydWarshall => Box::new(FloydWarshallRouter),
            RouterKind::BandwidthFirst => Box::new(BandwidthFirstRouter::new(flit_size)),
        }
    }
}
