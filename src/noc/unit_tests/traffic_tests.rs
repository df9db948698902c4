use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::init_logging;
use crate::noc::arbiter::{Arbiter, XBarArbiter};
use crate::noc::config::NetworkConfig;
use crate::noc::connector::{BuiltNetwork, Connector};
use crate::noc::msg::{Message, MsgId};
use crate::noc::types::{Cycle, PortId};

/// root with two children, each child with two devices, one device on root.
fn tree(config: NetworkConfig) -> BuiltNetwork {
    let mut conn = Connector::new(config.clone());
    let root = conn.add_switch("root");
    let left = conn.add_switch("left");
    let right = conn.add_switch("right");
    conn.connect_switches(root, left, config.switch_link.clone());
    conn.connect_switches(root, right, config.switch_link.clone());
    conn.connect_device("cpu", ["Port"], root, config.device_link.clone());
    for (sw, prefix) in [(left, "l"), (right, "r")] {
        for i in 0..2 {
            conn.connect_device(
                format!("{prefix}gpu{i}"),
                ["Port"],
                sw,
                config.device_link.clone(),
            );
        }
    }
    conn.build().unwrap()
}

struct Expected {
    dst: PortId,
    bytes: u32,
}

/// Push `num_msgs` random messages through the network, retrying refused sends, and check
/// that each one shows up exactly once at its destination with its size intact.
fn random_traffic(mut built: BuiltNetwork, seed: u64, num_msgs: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let ports: Vec<PortId> = built.devices.iter().map(|dev| dev.ports[0]).collect();
    let net = &mut built.network;

    let mut pending: BTreeMap<PortId, VecDeque<Message>> = BTreeMap::new();
    let mut expected: HashMap<MsgId, Expected> = HashMap::new();
    for _ in 0..num_msgs {
        let src = ports[rng.gen_range(0..ports.len())];
        let dst = loop {
            let dst = ports[rng.gen_range(0..ports.len())];
            if dst != src {
                break dst;
            }
        };
        let bytes = rng.gen_range(0..300);
        let msg = Message::new(src, dst, bytes);
        expected.insert(msg.id(), Expected { dst, bytes });
        pending.entry(src).or_default().push_back(msg);
    }

    let mut delivered: HashMap<MsgId, usize> = HashMap::new();
    let mut now: Cycle = 0;
    while delivered.len() < num_msgs {
        assert!(now < 200_000, "traffic did not drain, {} delivered", delivered.len());
        for queue in pending.values_mut() {
            if let Some(msg) = queue.pop_front() {
                if let Err(rejected) = net.send(now, msg) {
                    assert!(rejected.retry_at > now);
                    queue.push_front(rejected.payload.into_app().unwrap());
                }
            }
        }
        net.tick(now);
        for port in &ports {
            while let Some(msg) = net.retrieve(*port) {
                let msg = msg.into_app().expect("devices only see messages");
                let want = &expected[&msg.id()];
                assert_eq!(want.dst, *port);
                assert_eq!(want.bytes, msg.bytes());
                *delivered.entry(msg.id()).or_default() += 1;
            }
        }
        now += 1;
    }

    net.run_until_idle(now, 10_000);
    for port in &ports {
        assert!(net.retrieve(*port).is_none(), "duplicate delivery");
    }
    assert!(delivered.values().all(|count| *count == 1));
    assert_eq!(num_msgs as u64, net.stats().msgs_delivered());
}

#[test]
fn random_traffic_on_a_line() {
    init_logging();
    random_traffic(super::line(NetworkConfig::default(), 4), 7, 300);
}

#[test]
fn random_traffic_on_a_tree() {
    random_traffic(tree(NetworkConfig::default()), 42, 400);
}

#[test]
fn random_traffic_with_tight_buffers() {
    let mut config = NetworkConfig {
        flit_byte_size: 16,
        encoding_overhead: 0.25,
        msg_out_buf_size: 1,
        ..NetworkConfig::default()
    };
    for end in [
        &mut config.switch_link.left_end,
        &mut config.switch_link.right_end,
        &mut config.device_link.switch_end,
    ] {
        end.incoming_buf_size = 1;
        end.outgoing_buf_size = 1;
        end.latency = 2;
    }
    config.device_link.device_end.incoming_buf_size = 1;
    config.device_link.device_end.outgoing_buf_size = 1;
    config.switch_link.link.num_stage = 3;
    random_traffic(tree(config), 1234, 200);
}

#[test]
fn random_traffic_with_wide_ports() {
    let mut config = NetworkConfig::default();
    for end in [
        &mut config.switch_link.left_end,
        &mut config.switch_link.right_end,
        &mut config.device_link.switch_end,
    ] {
        end.num_input_channel = 2;
        end.num_output_channel = 2;
    }
    config.device_link.device_end.num_input_channel = 2;
    config.device_link.device_end.num_output_channel = 2;
    config.switch_link.link.pipeline_width = 2;
    config.device_link.link.pipeline_width = 2;
    random_traffic(super::line(config, 3), 99, 300);
}

#[test]
fn arbiter_never_grants_conflicting_outputs() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut arb = XBarArbiter::new();
    for buf in 0..6 {
        arb.add_buffer(buf);
    }
    for now in 0..500 {
        let heads: Vec<Option<usize>> = (0..6)
            .map(|_| rng.gen_bool(0.7).then(|| rng.gen_range(0..3)))
            .collect();
        let grants = arb.arbitrate(now, &|buf| heads[buf]);
        let mut outputs: Vec<usize> = grants.iter().filter_map(|buf| heads[*buf]).collect();
        let granted = outputs.len();
        assert_eq!(grants.len(), granted);
        outputs.sort_unstable();
        outputs.dedup();
        assert_eq!(granted, outputs.len());
        // every contended output is served
        let wanted: HashSet<usize> = heads.iter().flatten().copied().collect();
        assert_eq!(wanted.len(), granted);
    }
}
