pub mod client;
pub mod events;

pub use client::{RealtimeClient, RealtimeEventHandler, SessionState};
pub use events::{ClientEvent, ServerEvent, SessionConfig};
