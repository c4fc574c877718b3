pub mod base;
pub mod exec;
pub mod filesystem;
pub mod memory;
pub mod registry;
pub mod skill;
pub mod web;

pub use base::Tool;
pub use registry::ToolRegistry;
