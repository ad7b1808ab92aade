//! Request handlers.

pub mod health;
pub mod pipeline;
pub mod settings;

pub use health::*;
pub use pipeline::*;
pub use settings::*;
