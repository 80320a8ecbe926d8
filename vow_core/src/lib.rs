//! Vow Core
//!
//! Single-assignment deferred settlement primitive. A [`Deferred`]
//! starts pending and settles exactly once to a value or a failure
//! reason; observers registered through `then` are notified and chain
//! into new deferreds. Combinators aggregate (`all`) or select (`race`)
//! across several deferreds, and the scheduled constructors (`resolve`,
//! `reject`) settle on the next round of an injected [`Scheduler`].

pub mod combinators;
pub mod deferred;
pub mod error;
pub mod scheduler;
pub mod types;

pub use deferred::{Deferred, DeferredState, FulfillHandler, RejectHandler, Settle};
pub use error::{Result, VowError};
pub use scheduler::Scheduler;
pub use types::Value;
