//! TCP transport, request codec and notification fan-out
//!
//! Everything in this module is glue around the engine: a line-oriented
//! TCP server speaking one JSON envelope per line, a request handler
//! dispatching the textual commands, and a client registry that pushes
//! server-side notifications to connected clients.

pub mod handler;
pub mod messages;
pub mod notifier;
pub mod server;

// Re-export commonly used types
pub use handler::RequestHandler;
pub use messages::{Request, Response};
pub use notifier::{ClientRegistry, ConnectionId};
pub use server::MatchServer;
