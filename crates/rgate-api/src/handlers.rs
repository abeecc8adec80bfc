//! Request handlers.

pub mod health;
pub mod jobs;
pub mod render;
pub mod upload;

pub use health::*;
pub use jobs::*;
pub use render::*;
pub use upload::*;
