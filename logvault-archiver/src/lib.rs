pub mod pipeline;
pub mod subsystems;
