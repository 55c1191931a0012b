//! Framegraph Engine - a render graph scheduler with a BVH path tracer bake
//!
//! Everything renders through an abstract, object-safe [`GraphicsBackend`];
//! the crate ships a [`RecordingBackend`] that records the command stream
//! instead of talking to a device.
//!
//! # Features
//! - Declarative render passes: create, import, read and write named textures
//! - Graph compilation derives pass order from those declarations and
//!   allocates every texture once
//! - Built-in graphs: deferred shading with shadows, IBL and bloom, and a
//!   compute path tracer
//! - SAH binned BVH over triangles and spheres, flattened into GPU layouts
//! - Background image decoding feeding the graph through an upload queue

pub mod backend;
pub mod path_tracer;
pub mod pipeline;
pub mod render_graph;
pub mod renderer;
pub mod resources;
pub mod scene;

pub use backend::{BackendError, BackendResult, BackendType, GraphicsBackend, RecordingBackend};
pub use pipeline::{create_render_graph, RenderGraphBuilderConfig, RenderGraphName};
pub use render_graph::{
    GraphError, GraphResult, PassBuilder, RenderGraph, RenderGraphBuilder, ResourceName,
};
pub use renderer::{Renderer, RendererConfig, RendererError};
