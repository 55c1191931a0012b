//! Core backend abstraction trait
//!
//! The render graph and the path tracer only ever talk to a `dyn GraphicsBackend`.
//! Each graphics API (OpenGL, D3D11, D3D12, Vulkan, Metal) provides one implementation.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create constant buffer: {0}")]
    ConstantBufferCreationFailed(String),
    #[error("Failed to create structured buffer: {0}")]
    StructuredBufferCreationFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

impl TextureHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub(crate) u64);

impl BufferHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Handle to an uploaded mesh (vertex and index buffers), owned by the asset layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

/// Graphics API behind a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Records commands without a device
    #[default]
    Empty,
    OpenGl,
    D3d11,
    D3d12,
    Vulkan,
    Metal,
}

impl BackendType {
    /// Number of frames the CPU may record ahead of the GPU
    pub fn frames_in_flight(&self) -> usize {
        match self {
            BackendType::D3d12 => 2,
            _ => 1,
        }
    }
}

/// Main graphics backend trait
pub trait GraphicsBackend {
    fn backend_type(&self) -> BackendType;

    // Resource creation

    /// Create a texture together with its sampler state
    fn create_texture(
        &mut self,
        desc: &GpuTextureDesc,
        sampler: &SamplerDesc,
    ) -> BackendResult<TextureHandle>;

    /// Create a vertex or index buffer
    fn create_buffer(&mut self, desc: &GpuBufferDesc) -> BackendResult<BufferHandle>;

    /// Create a constant buffer holding `element_count` elements of `element_size` bytes
    fn create_constant_buffer(&mut self, desc: &GpuBufferDesc) -> BackendResult<BufferHandle>;

    /// Create a structured buffer readable from shaders at `desc.slot`
    fn create_structured_buffer(&mut self, desc: &GpuBufferDesc) -> BackendResult<BufferHandle>;

    /// Overwrite the front of a constant buffer
    fn update_constant_buffer(&mut self, buffer: BufferHandle, data: &[u8]);

    /// Overwrite the front of a dynamic buffer
    fn update_buffer(&mut self, buffer: BufferHandle, data: &[u8]);

    /// Generate the mip chain of a texture
    fn generate_mipmap(&mut self, texture: TextureHandle);

    // Binding

    /// Bind `size` bytes starting at `offset` of a constant buffer to `slot`
    fn bind_constant_buffer_range(
        &mut self,
        buffer: BufferHandle,
        slot: u32,
        size: u32,
        offset: u32,
    );

    fn bind_texture(&mut self, dimension: Dimension, texture: TextureHandle, slot: u32);

    fn unbind_texture(&mut self, dimension: Dimension, slot: u32);

    fn bind_unordered_access_view(&mut self, slot: u32, texture: TextureHandle);

    fn unbind_unordered_access_view(&mut self, slot: u32);

    fn bind_structured_buffer(&mut self, slot: u32, buffer: BufferHandle);

    fn unbind_structured_buffer(&mut self, slot: u32);

    fn set_pipeline_state(&mut self, pipeline: PipelineStateName);

    fn set_mesh(&mut self, mesh: MeshHandle);

    // Render targets

    /// Bind color and depth attachments, selecting an array layer and mip level
    fn set_render_target(
        &mut self,
        colors: &[TextureHandle],
        depth: Option<TextureHandle>,
        layer: u32,
        mip: u32,
    );

    fn unset_render_target(&mut self);

    fn clear(
        &mut self,
        colors: &[TextureHandle],
        depth: Option<TextureHandle>,
        flags: ClearFlags,
        clear_color: [f32; 4],
        layer: u32,
    );

    fn set_viewport(&mut self, viewport: Viewport);

    /// Reference value later draws compare and write the stencil against
    fn set_stencil_ref(&mut self, reference: u32);

    // Work submission

    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    fn draw_elements(&mut self, count: u32, offset: u32);

    fn draw_elements_instanced(&mut self, instance_count: u32, count: u32, offset: u32);

    fn draw_arrays(&mut self, count: u32, offset: u32);

    fn draw_arrays_instanced(&mut self, instance_count: u32, count: u32, offset: u32);

    // Resource cleanup

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn destroy_buffer(&mut self, buffer: BufferHandle);
}
