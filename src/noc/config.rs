use serde::Deserialize;

use crate::noc::connector::{DeviceToSwitchLinkParameter, SwitchToSwitchLinkParameter};
use crate::noc::routing::RouterKind;
use crate::sim::config::Config;

pub const DEFAULT_FLIT_BYTE_SIZE: u32 = 64;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelConfig {
    pub num_stage: usize,
    pub cycle_per_stage: usize,
    pub pipeline_width: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            num_stage: 1,
            cycle_per_stage: 1,
            pipeline_width: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct SwitchPortConfig {
    /// Stages of the per-port input pipeline, one cycle each.
    pub latency: usize,
    pub num_input_channel: usize,
    pub num_output_channel: usize,
}

impl Default for SwitchPortConfig {
    fn default() -> Self {
        Self {
            latency: 1,
            num_input_channel: 1,
            num_output_channel: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct EndPointConfig {
    pub flit_byte_size: u32,
    pub encoding_overhead: f64,
    pub num_input_channels: usize,
    pub num_output_channels: usize,
    /// Messages accepted from devices but not yet fragmented.
    pub msg_out_buf_size: usize,
}

impl Default for EndPointConfig {
    fn default() -> Self {
        Self {
            flit_byte_size: DEFAULT_FLIT_BYTE_SIZE,
            encoding_overhead: 0.0,
            num_input_channels: 1,
            num_output_channels: 1,
            msg_out_buf_size: 4,
        }
    }
}

/// Network-wide settings.  `device_link` and `switch_link` are used by
/// `Connector::connect_device_default` and `Connector::connect_switches_default`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub flit_byte_size: u32,
    pub encoding_overhead: f64,
    pub router: RouterKind,
    pub msg_out_buf_size: usize,
    pub device_link: DeviceToSwitchLinkParameter,
    pub switch_link: SwitchToSwitchLinkParameter,
}

impl Config for NetworkConfig {
    const SECTION: &'static str = "network";
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            flit_byte_size: DEFAULT_FLIT_BYTE_SIZE,
            encoding_overhead: 0.0,
            router: RouterKind::FloydWarshall,
            msg_out_buf_size: 4,
            device_link: DeviceToSwitchLinkParameter::default(),
            switch_link: SwitchToSwitchLinkParameter::default(),
        }
    }
}

impl NetworkConfig {
    pub fn endpoint_config(
        &self,
        num_input_channels: usize,
        num_output_channels: usize,
    ) -> EndPointConfig {
        EndPointConfig {
            flit_byte_size: self.flit_byte_size,
            encoding_overhead: self.encoding_overhead,
            num_input_channels,
            num_output_channels,
            msg_out_buf_size: self.msg_out_buf_size,
        }
    }
}
