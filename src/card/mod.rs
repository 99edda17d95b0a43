//! Card data model: identifiers, the per-slot state machine and validation outcomes.

mod session;
mod uid;

pub use session::{CardSession, CardState, ValidationOutcome, ValidationResult};
pub use uid::Uid;
