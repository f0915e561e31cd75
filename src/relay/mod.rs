pub mod messages;
pub mod session;

pub use messages::ControlMessage;
pub use session::RelaySession;
