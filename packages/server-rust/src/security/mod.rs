//! Session core: connected-participant tracking and send/subscribe
//! authorization used at protocol gateways.

pub mod pattern;
pub mod session;

pub use pattern::{CriPattern, PatternError};
pub use session::{Session, SessionManager};
