pub mod cleanup;
pub mod config;
pub mod status;
pub mod store;
pub mod types;
pub mod validation;

pub use cleanup::*;
pub use config::*;
pub use status::*;
pub use store::*;
pub use types::*;
pub use validation::*;
