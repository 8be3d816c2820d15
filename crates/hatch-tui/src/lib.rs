pub mod action;
pub mod app;
pub mod context;
pub mod error;
pub mod gate;
pub mod message;
pub mod model;
pub mod runner;
pub mod scheduler;
pub mod ui;
pub mod worker;

pub use action::*;
pub use app::*;
pub use context::*;
pub use error::*;
pub use gate::*;
pub use message::*;
pub use model::*;
pub use runner::*;
pub use scheduler::*;
pub use ui::*;
pub use worker::*;
