//! Request handlers.

pub mod exports;
pub mod health;
pub mod jobs;
pub mod shot_cuts;

pub use exports::*;
pub use health::*;
pub use jobs::*;
pub use shot_cuts::*;
