pub mod base;
pub mod noc;
pub mod sim;
