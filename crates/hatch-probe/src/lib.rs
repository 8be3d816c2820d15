pub mod command;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod multiplexer;
pub mod repo;
pub mod sandbox;

pub use command::*;
pub use error::*;
pub use multiplexer::*;
pub use repo::*;
pub use sandbox::*;
