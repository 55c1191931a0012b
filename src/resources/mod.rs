//! Resource management
//!
//! GPU-facing data: constant buffer layouts, per-frame buffers, particle
//! buffers, textures and their background upload path, plus the CPU meshes
//! and materials scenes are built from.

pub mod constants;
mod frame;
mod material;
mod mesh;
mod particles;
mod texture;
mod upload_queue;

pub use constants::*;
pub use frame::*;
pub use material::*;
pub use mesh::*;
pub use particles::*;
pub use texture::*;
pub use upload_queue::*;
