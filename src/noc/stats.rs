use serde::Serialize;

use crate::noc::types::Cycle;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkStats {
    pub name: String,
    /// Items admitted from a sender.
    pub accepted: u64,
    pub delivered: u64,
    /// Sends refused because the admission buffer was full.
    pub rejected: u64,
    /// Deliveries the far port refused; retried next cycle.
    pub delivery_stalls: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SwitchStats {
    pub name: String,
    pub flits_received: u64,
    pub flits_routed: u64,
    pub flits_forwarded: u64,
    pub flits_sent: u64,
    pub send_stalls: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndPointStats {
    pub name: String,
    pub msgs_accepted: u64,
    pub msgs_rejected: u64,
    pub flits_sent: u64,
    pub flits_received: u64,
    pub msgs_delivered: u64,
    pub bytes_delivered: u64,
    /// Sum of `recv_time - send_time` over delivered messages.
    pub total_latency: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkStats {
    pub now: Cycle,
    pub links: Vec<LinkStats>,
    pub switches: Vec<SwitchStats>,
    pub endpoints: Vec<EndPointStats>,
}

impl NetworkStats {
    pub fn msgs_delivered(&self) -> u64 {
        self.endpoints.iter().map(|ep| ep.msgs_delivered).sum()
    }

    pub fn flits_switched(&self) -> u64 {
        self.switches.iter().map(|sw| sw.flits_sent).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
