//! Recording backend for testing and headless runs.
//!
//! This backend doesn't talk to a GPU. It hands out sequential handles,
//! keeps the contents of every buffer it was given, and records each call
//! as a [`BackendCommand`] so tests can assert on the exact command stream
//! a render graph produced.

use std::collections::{HashMap, HashSet};

use crate::backend::traits::*;
use crate::backend::types::*;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    CreateTexture { texture: TextureHandle, label: Option<String> },
    CreateBuffer { buffer: BufferHandle, buffer_type: GpuBufferType, label: Option<String> },
    UpdateBuffer { buffer: BufferHandle, size: usize },
    GenerateMipmap(TextureHandle),
    BindConstantBufferRange { buffer: BufferHandle, slot: u32, size: u32, offset: u32 },
    BindTexture { dimension: Dimension, texture: TextureHandle, slot: u32 },
    UnbindTexture { dimension: Dimension, slot: u32 },
    BindUnorderedAccessView { slot: u32, texture: TextureHandle },
    UnbindUnorderedAccessView { slot: u32 },
    BindStructuredBuffer { slot: u32, buffer: BufferHandle },
    UnbindStructuredBuffer { slot: u32 },
    SetPipelineState(PipelineStateName),
    SetMesh(MeshHandle),
    SetRenderTarget {
        colors: Vec<TextureHandle>,
        depth: Option<TextureHandle>,
        layer: u32,
        mip: u32,
    },
    UnsetRenderTarget,
    Clear { flags: ClearFlags, layer: u32 },
    SetViewport(Viewport),
    SetStencilRef(u32),
    Dispatch { x: u32, y: u32, z: u32 },
    DrawElements { count: u32, offset: u32 },
    DrawElementsInstanced { instance_count: u32, count: u32, offset: u32 },
    DrawArrays { count: u32, offset: u32 },
    DrawArraysInstanced { instance_count: u32, count: u32, offset: u32 },
    DestroyTexture(TextureHandle),
    DestroyBuffer(BufferHandle),
}

/// Backend that records commands instead of executing them.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    backend_type: BackendType,
    next_handle: u64,
    commands: Vec<BackendCommand>,
    textures: HashMap<TextureHandle, GpuTextureDesc>,
    buffers: HashMap<BufferHandle, Vec<u8>>,
    failing_labels: HashSet<String>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report itself as another API, which changes the frames-in-flight count
    pub fn with_backend_type(backend_type: BackendType) -> Self {
        Self {
            backend_type,
            ..Default::default()
        }
    }

    /// Make every later creation of a resource labelled `label` fail
    pub fn fail_creation_of(&mut self, label: impl Into<String>) {
        self.failing_labels.insert(label.into());
    }

    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    /// Take the recorded commands, leaving the log empty
    pub fn take_commands(&mut self) -> Vec<BackendCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Descriptor of a live texture
    pub fn texture_desc(&self, texture: TextureHandle) -> Option<&GpuTextureDesc> {
        self.textures.get(&texture)
    }

    /// Current contents of a live buffer
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn record(&mut self, command: BackendCommand) {
        log::trace!("RecordingBackend: {:?}", command);
        self.commands.push(command);
    }

    fn allocate_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn should_fail(&self, label: &Option<String>) -> bool {
        label
            .as_ref()
            .map_or(false, |label| self.failing_labels.contains(label))
    }

    fn create_any_buffer(
        &mut self,
        desc: &GpuBufferDesc,
        on_failure: fn(String) -> BackendError,
    ) -> BackendResult<BufferHandle> {
        if self.should_fail(&desc.label) {
            return Err(on_failure(desc.label.clone().unwrap_or_default()));
        }

        let buffer = BufferHandle(self.allocate_handle());
        let mut contents = vec![0u8; desc.size_in_bytes() as usize];
        if let Some(data) = &desc.initial_data {
            let len = data.len().min(contents.len());
            contents[..len].copy_from_slice(&data[..len]);
        }
        self.buffers.insert(buffer, contents);
        self.record(BackendCommand::CreateBuffer {
            buffer,
            buffer_type: desc.buffer_type,
            label: desc.label.clone(),
        });
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
        match self.buffers.get_mut(&buffer) {
            Some(contents) => {
                let len = data.len().min(contents.len());
                contents[..len].copy_from_slice(&data[..len]);
                self.record(BackendCommand::UpdateBuffer { buffer, size: len });
            }
            None => log::warn!("RecordingBackend: write to unknown buffer {:?}", buffer),
        }
    }
}

impl GraphicsBackend for RecordingBackend {
    fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    fn create_texture(
        &mut self,
        desc: &GpuTextureDesc,
        _sampler: &SamplerDesc,
    ) -> BackendResult<TextureHandle> {
        if self.should_fail(&desc.label) {
            return Err(BackendError::TextureCreationFailed(
                desc.label.clone().unwrap_or_default(),
            ));
        }

        let texture = TextureHandle(self.allocate_handle());
        self.textures.insert(texture, desc.clone());
        self.record(BackendCommand::CreateTexture {
            texture,
            label: desc.label.clone(),
        });
        Ok(texture)
    }

    fn create_buffer(&mut self, desc: &GpuBufferDesc) -> BackendResult<BufferHandle> {
        self.create_any_buffer(desc, BackendError::BufferCreationFailed)
    }

    fn create_constant_buffer(&mut self, desc: &GpuBufferDesc) -> BackendResult<BufferHandle> {
        self.create_any_buffer(desc, BackendError::ConstantBufferCreationFailed)
    }

    fn create_structured_buffer(&mut self, desc: &GpuBufferDesc) -> BackendResult<BufferHandle> {
        self.create_any_buffer(desc, BackendError::StructuredBufferCreationFailed)
    }

    fn update_constant_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
        self.write_buffer(buffer, data);
    }

    fn update_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
        self.write_buffer(buffer, data);
    }

    fn generate_mipmap(&mut self, texture: TextureHandle) {
        self.record(BackendCommand::GenerateMipmap(texture));
    }

    fn bind_constant_buffer_range(
        &mut self,
        buffer: BufferHandle,
        slot: u32,
        size: u32,
        offset: u32,
    ) {
        self.record(BackendCommand::BindConstantBufferRange {
            buffer,
            slot,
            size,
            offset,
        });
    }

    fn bind_texture(&mut self, dimension: Dimension, texture: TextureHandle, slot: u32) {
        self.record(BackendCommand::BindTexture {
            dimension,
            texture,
            slot,
        });
    }

    fn unbind_texture(&mut self, dimension: Dimension, slot: u32) {
        self.record(BackendCommand::UnbindTexture { dimension, slot });
    }

    fn bind_unordered_access_view(&mut self, slot: u32, texture: TextureHandle) {
        self.record(BackendCommand::BindUnorderedAccessView { slot, texture });
    }

    fn unbind_unordered_access_view(&mut self, slot: u32) {
        self.record(BackendCommand::UnbindUnorderedAccessView { slot });
    }

    fn bind_structured_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        self.record(BackendCommand::BindStructuredBuffer { slot, buffer });
    }

    fn unbind_structured_buffer(&mut self, slot: u32) {
        self.record(BackendCommand::UnbindStructuredBuffer { slot });
    }

    fn set_pipeline_state(&mut self, pipeline: PipelineStateName) {
        self.record(BackendCommand::SetPipelineState(pipeline));
    }

    fn set_mesh(&mut self, mesh: MeshHandle) {
        self.record(BackendCommand::SetMesh(mesh));
    }

    fn set_render_target(
        &mut self,
        colors: &[TextureHandle],
        depth: Option<TextureHandle>,
        layer: u32,
        mip: u32,
    ) {
        self.record(BackendCommand::SetRenderTarget {
            colors: colors.to_vec(),
            depth,
            layer,
            mip,
        });
    }

    fn unset_render_target(&mut self) {
        self.record(BackendCommand::UnsetRenderTarget);
    }

    fn clear(
        &mut self,
        _colors: &[TextureHandle],
        _depth: Option<TextureHandle>,
        flags: ClearFlags,
        _clear_color: [f32; 4],
        layer: u32,
    ) {
        self.record(BackendCommand::Clear { flags, layer });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.record(BackendCommand::SetViewport(viewport));
    }

    fn set_stencil_ref(&mut self, reference: u32) {
        self.record(BackendCommand::SetStencilRef(reference));
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.record(BackendCommand::Dispatch { x, y, z });
    }

    fn draw_elements(&mut self, count: u32, offset: u32) {
        self.record(BackendCommand::DrawElements { count, offset });
    }

    fn draw_elements_instanced(&mut self, instance_count: u32, count: u32, offset: u32) {
        self.record(BackendCommand::DrawElementsInstanced {
            instance_count,
            count,
            offset,
        });
    }

    fn draw_arrays(&mut self, count: u32, offset: u32) {
        self.record(BackendCommand::DrawArrays { count, offset });
    }

    fn draw_arrays_instanced(&mut self, instance_count: u32, count: u32, offset: u32) {
        self.record(BackendCommand::DrawArraysInstanced {
            instance_count,
            count,
            offset,
        });
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.record(BackendCommand::DestroyTexture(texture));
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
        self.record(BackendCommand::DestroyBuffer(buffer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique() {
        let mut backend = RecordingBackend::new();
        let a = backend
            .create_texture(&GpuTextureDesc::default(), &SamplerDesc::point_clamp())
            .unwrap();
        let b = backend
            .create_texture(&GpuTextureDesc::default(), &SamplerDesc::point_clamp())
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(backend.live_texture_count(), 2);
    }

    #[test]
    fn test_injected_failure() {
        let mut backend = RecordingBackend::new();
        backend.fail_creation_of("r:lighting");
        let desc = GpuTextureDesc {
            label: Some("r:lighting".to_string()),
            ..Default::default()
        };
        let result = backend.create_texture(&desc, &SamplerDesc::point_clamp());
        assert_eq!(
            result,
            Err(BackendError::TextureCreationFailed("r:lighting".to_string()))
        );
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn test_buffer_contents_track_updates() {
        let mut backend = RecordingBackend::new();
        let buffer = backend
            .create_constant_buffer(&GpuBufferDesc {
                buffer_type: GpuBufferType::Constant,
                element_size: 4,
                element_count: 2,
                ..Default::default()
            })
            .unwrap();
        backend.update_constant_buffer(buffer, &[1, 2, 3, 4]);
        assert_eq!(backend.buffer_contents(buffer), Some(&[1, 2, 3, 4, 0, 0, 0, 0][..]));

        backend.destroy_buffer(buffer);
        assert_eq!(backend.buffer_contents(buffer), None);
    }
}
