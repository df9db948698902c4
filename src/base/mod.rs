pub mod buffer;
pub mod pipeline;
