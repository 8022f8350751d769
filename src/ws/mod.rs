pub mod broadcast;
pub mod dispatcher;
pub mod handler;
pub mod messages;
pub mod relay;
pub mod session;

pub use broadcast::RoomBroadcaster;
pub use dispatcher::{Effect, EventDispatcher, HandlerError};
pub use handler::ws_routes;
pub use messages::{ClientEvent, DecodeError, Envelope, EventKind};
pub use relay::{DirectedRelay, RelayOutcome};
pub use session::{ConnectionHandle, DeliveryError, Departure, OutboundFrame, SessionRegistry};
