pub mod events;
pub mod hub;

pub use events::{InboundMessage, OutboundMessage};
pub use hub::Hub;
