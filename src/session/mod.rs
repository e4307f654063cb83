pub mod state;
pub mod store;

pub use state::{SessionPhase, SessionState};
pub use store::{SessionSnapshot, SessionStore};
