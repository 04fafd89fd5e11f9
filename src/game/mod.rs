//! Game simulation modules

pub mod combat;
pub mod engine;
pub mod entity;
pub mod r#match;
pub mod physics;
pub mod session;
pub mod snapshot;
pub mod spatial;

pub use engine::MatchInput;
pub use entity::MoveInput;
pub use r#match::{MatchOutcome, PeerTx};
pub use session::{MatchSession, SessionError, SessionSummary};
