//! Backend abstraction layer
//!
//! Provides the descriptor types and the object-safe trait every graphics API implements.

pub mod recording;
pub mod traits;
pub mod types;

pub use recording::*;
pub use traits::*;
pub use types::*;
