pub mod audit;
pub mod capture;
pub mod error;
pub mod launcher;
pub mod path;
pub mod runner;
pub mod security;

pub use audit::*;
pub use capture::*;
pub use error::*;
pub use launcher::*;
pub use path::*;
pub use runner::*;
pub use security::*;
