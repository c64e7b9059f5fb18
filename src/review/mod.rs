//! Human review — channel registry, coordinator, and WebSocket transport.

pub mod coordinator;
pub mod protocol;
pub mod registry;
pub mod ws;

pub use coordinator::{ReviewCoordinator, ReviewOutcome};
pub use protocol::{ClientMessage, ReviewReply, ServerMessage};
pub use registry::ReviewRegistry;
