//! Realtime presence and event delivery over WebSockets.

pub mod events;
pub mod gateway;
pub mod presence;
pub mod registry;
pub mod router;

pub use events::ServerEvent;
pub use presence::PresenceTracker;
pub use registry::PresenceRegistry;
pub use router::EventRouter;
