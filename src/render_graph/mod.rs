//! Render Graph System
//!
//! Passes declare the textures they create, import, read and write. Compiling
//! the graph derives the dependency edges from those declarations, orders the
//! passes topologically and allocates every created texture once. Executing
//! the compiled graph runs each pass callback per draw sub-pass, with
//! attachments and declared inputs bound around it.

pub mod error;
pub mod executor;
pub mod graph;
pub mod pass;
pub mod resource;

pub use error::*;
pub use executor::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
