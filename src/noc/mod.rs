pub mod arbiter;
pub mod channel;
pub mod config;
pub mod connector;
pub mod endpoint;
pub mod msg;
pub mod network;
pub mod port;
pub mod routing;
pub mod sched;
pub mod stats;
pub mod switch;
pub mod types;

#[cfg(test)]
mod unit_tests;
