/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public taskslot crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod config;
pub mod error;
pub mod holder;
pub mod mapper;
pub mod snapshot;
pub mod state;

// Re-export main types for convenience
pub use config::{HolderConfig, Priority};
pub use error::{HolderError, Result};
pub use holder::{TaskHolder, TaskHolderBuilder};
pub use mapper::{ErrorMapper, map_failure};
pub use snapshot::{Ending, Generation, Outcome, Presentation, TaskSnapshot};
pub use state::{StateError, TaskEvent, TaskState, TaskStateMachine};

// Operations receive this token as their cancellation signal
pub use tokio_util::sync::CancellationToken;
