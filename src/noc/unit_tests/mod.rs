#[cfg(test)]
mod channel_tests;
#[cfg(test)]
mod traffic_tests;

use crate::noc::config::NetworkConfig;
use crate::noc::connector::{BuiltNetwork, Connector};
use crate::noc::msg::Msg;
use crate::noc::network::Network;
use crate::noc::types::PortId;

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Switches `sw0 - sw1 - ... ` in a line, with device `dev<i>` hanging off `sw<i>`.
pub(crate) fn line(config: NetworkConfig, num_switches: usize) -> BuiltNetwork {
    let mut conn = Connector::new(config);
    let switches: Vec<_> = (0..num_switches)
        .map(|i| conn.add_switch(format!("sw{i}")))
        .collect();
    for (i, sw) in switches.iter().enumerate() {
        conn.connect_device_default(format!("dev{i}"), ["Port"], *sw);
    }
    for pair in switches.windows(2) {
        conn.connect_switches_default(pair[0], pair[1]);
    }
    conn.build().unwrap()
}

pub(crate) fn drain(net: &mut Network, port: PortId) -> Vec<Msg> {
    let mut out = Vec::new();
    while let Some(msg) = net.retrieve(port) {
        out.push(msg);
    }
    out
}
