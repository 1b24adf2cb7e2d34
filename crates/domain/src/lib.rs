pub mod entities;
pub mod events;
pub mod ports;

pub use checker_core::{CheckerError, CheckerResult};
pub use entities::*;
pub use events::*;
pub use ports::*;
