pub mod session;

pub use session::{AuthorizationState, Session};
