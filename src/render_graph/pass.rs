//! Pass declarations and their compiled form

use std::fmt;
use std::sync::Arc;

use crate::backend::*;
use crate::path_tracer::PathTracerBuffers;
use crate::render_graph::resource::*;
use crate::resources::{
    ConstantBuffer, ConstantBufferArray, FrameContext, GpuTexture, ParticleBuffers,
};
use crate::scene::RenderData;

/// Per-frame work of a pass, called once per draw sub-pass
pub type ExecuteFn = Box<dyn Fn(&mut PassContext<'_>) + Send + Sync>;

/// How a pass reads a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadAccess {
    /// Sampled through a shader resource view
    Srv,
    /// Read through an unordered access view
    Uav,
}

/// How a pass writes a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteAccess {
    /// Color attachment
    Rtv,
    /// Depth-stencil attachment
    Dsv,
    /// Unordered access view written from compute
    Uav,
}

/// Texture a pass allocates when the graph compiles
#[derive(Debug, Clone)]
pub struct ResourceCreateInfo {
    pub desc: GpuTextureDesc,
    pub sampler: SamplerDesc,
    /// Not sampled by readers until a pass marks it ready
    pub deferred: bool,
}

/// Explicit framebuffer-level sub-pass
///
/// A pass declaring none gets one sub-pass built from its RTV and DSV writes.
#[derive(Debug, Clone, Default)]
pub struct DrawPassDecl {
    /// Passed through to the callback, e.g. the bloom mip or cube face
    pub id: u32,
    pub colors: Vec<ResourceName>,
    pub depth: Option<ResourceName>,
    /// Bound as UAVs around this sub-pass only
    pub uavs: Vec<ResourceName>,
    pub layer: u32,
    pub mip: u32,
}

impl DrawPassDecl {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn color(mut self, name: ResourceName) -> Self {
        self.colors.push(name);
        self
    }

    pub fn depth(mut self, name: ResourceName) -> Self {
        self.depth = Some(name);
        self
    }

    pub fn uav(mut self, name: ResourceName) -> Self {
        self.uavs.push(name);
        self
    }

    pub fn layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }

    pub fn mip(mut self, mip: u32) -> Self {
        self.mip = mip;
        self
    }
}

/// Declarative builder for a single named pass
pub struct PassBuilder {
    pub(crate) name: String,
    pub(crate) creates: Vec<(ResourceName, ResourceCreateInfo)>,
    pub(crate) imports: Vec<(ResourceName, ImportFn)>,
    pub(crate) reads: Vec<(ReadAccess, ResourceName)>,
    pub(crate) writes: Vec<(WriteAccess, ResourceName)>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) draw_passes: Vec<DrawPassDecl>,
    pub(crate) execute: Option<ExecuteFn>,
}

impl PassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            creates: Vec::new(),
            imports: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
            dependencies: Vec::new(),
            draw_passes: Vec::new(),
            execute: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare this pass as the producer of `name`, sampled with point clamp
    pub fn create(self, name: ResourceName, desc: GpuTextureDesc) -> Self {
        self.create_with_sampler(name, desc, SamplerDesc::point_clamp())
    }

    pub fn create_with_sampler(
        mut self,
        name: ResourceName,
        desc: GpuTextureDesc,
        sampler: SamplerDesc,
    ) -> Self {
        self.creates.push((
            name,
            ResourceCreateInfo {
                desc,
                sampler,
                deferred: false,
            },
        ));
        self
    }

    /// Like [`Self::create_with_sampler`], for a texture whose content is
    /// baked later.
    ///
    /// Readers see the name as missing until the producing callback calls
    /// [`PassContext::mark_ready`].
    pub fn create_baked(
        mut self,
        name: ResourceName,
        desc: GpuTextureDesc,
        sampler: SamplerDesc,
    ) -> Self {
        self.creates.push((
            name,
            ResourceCreateInfo {
                desc,
                sampler,
                deferred: true,
            },
        ));
        self
    }

    /// Declare `name` as supplied from outside the graph
    pub fn import<F>(mut self, name: ResourceName, supplier: F) -> Self
    where
        F: Fn(&ResourceTable) -> Option<Arc<GpuTexture>> + Send + Sync + 'static,
    {
        self.imports.push((name, Box::new(supplier)));
        self
    }

    pub fn read(mut self, access: ReadAccess, name: ResourceName) -> Self {
        self.reads.push((access, name));
        self
    }

    pub fn write(mut self, access: WriteAccess, name: ResourceName) -> Self {
        self.writes.push((access, name));
        self
    }

    /// Run after `pass` even without a data dependency
    pub fn depends_on(mut self, pass: impl Into<String>) -> Self {
        self.dependencies.push(pass.into());
        self
    }

    pub fn draw_pass(mut self, draw_pass: DrawPassDecl) -> Self {
        self.draw_passes.push(draw_pass);
        self
    }

    /// Set the per-frame work function.
    ///
    /// # Panics
    /// Panics if the pass already has one.
    pub fn set_execute_func<F>(mut self, func: F) -> Self
    where
        F: Fn(&mut PassContext<'_>) + Send + Sync + 'static,
    {
        assert!(
            self.execute.is_none(),
            "pass '{}' already has an execute function",
            self.name
        );
        self.execute = Some(Box::new(func));
        self
    }

    pub(crate) fn produced_names(&self) -> impl Iterator<Item = ResourceName> + '_ {
        self.creates
            .iter()
            .map(|(name, _)| *name)
            .chain(self.imports.iter().map(|(name, _)| *name))
    }
}

impl fmt::Debug for PassBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassBuilder")
            .field("name", &self.name)
            .field("creates", &self.creates.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("imports", &self.imports.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// What a transition binds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    ShaderResource,
    UnorderedAccess,
}

/// Binding a declared resource needs around a draw sub-pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTransition {
    pub name: ResourceName,
    pub slot: u32,
    pub kind: TransitionKind,
}

impl ResourceTransition {
    pub fn begin(&self, backend: &mut dyn GraphicsBackend, resources: &ResourceTable) {
        let Some(texture) = self.bound_texture(resources) else {
            log::debug!("'{}' is not available yet, not binding it", self.name);
            return;
        };

        match self.kind {
            TransitionKind::ShaderResource => {
                backend.bind_texture(texture.dimension(), texture.handle, self.slot)
            }
            TransitionKind::UnorderedAccess => {
                backend.bind_unordered_access_view(self.slot, texture.handle)
            }
        }
    }

    pub fn end(&self, backend: &mut dyn GraphicsBackend, resources: &ResourceTable) {
        let Some(texture) = self.bound_texture(resources) else {
            return;
        };

        match self.kind {
            TransitionKind::ShaderResource => {
                backend.unbind_texture(texture.dimension(), self.slot)
            }
            TransitionKind::UnorderedAccess => backend.unbind_unordered_access_view(self.slot),
        }
    }

    // a deferred texture is still written through its UAV, never sampled
    fn bound_texture(&self, resources: &ResourceTable) -> Option<Arc<GpuTexture>> {
        match self.kind {
            TransitionKind::ShaderResource if !resources.is_ready(self.name) => None,
            _ => resources.find_texture(self.name),
        }
    }
}

/// Compiled framebuffer-level sub-pass
#[derive(Debug)]
pub struct DrawPass {
    pub id: u32,
    pub layer: u32,
    pub mip: u32,
    pub color_attachments: Vec<Arc<GpuTexture>>,
    pub depth_attachment: Option<Arc<GpuTexture>>,
    pub transitions: Vec<ResourceTransition>,
    out_srvs: Vec<Arc<GpuTexture>>,
    color_handles: Vec<TextureHandle>,
}

impl DrawPass {
    pub(crate) fn new(
        decl: &DrawPassDecl,
        color_attachments: Vec<Arc<GpuTexture>>,
        depth_attachment: Option<Arc<GpuTexture>>,
        transitions: Vec<ResourceTransition>,
    ) -> Self {
        let out_srvs = color_attachments
            .iter()
            .chain(depth_attachment.iter())
            .cloned()
            .collect();
        let color_handles = color_attachments.iter().map(|texture| texture.handle).collect();

        Self {
            id: decl.id,
            layer: decl.layer,
            mip: decl.mip,
            color_attachments,
            depth_attachment,
            transitions,
            out_srvs,
            color_handles,
        }
    }

    /// Attachments that are readable again once the sub-pass ends
    pub fn out_srvs(&self) -> &[Arc<GpuTexture>] {
        &self.out_srvs
    }

    pub fn color_handles(&self) -> &[TextureHandle] {
        &self.color_handles
    }

    pub fn depth_handle(&self) -> Option<TextureHandle> {
        self.depth_attachment.as_ref().map(|texture| texture.handle)
    }

    pub fn has_attachments(&self) -> bool {
        !self.out_srvs.is_empty()
    }

    /// Size of the framebuffer, taken from the depth attachment first
    pub fn buffer_size(&self) -> (u32, u32) {
        self.depth_attachment
            .as_ref()
            .or_else(|| self.color_attachments.first())
            .map_or((0, 0), |texture| (texture.width(), texture.height()))
    }
}

/// A compiled pass, ready to execute
pub struct RenderPass {
    pub(crate) name: String,
    pub(crate) draw_passes: Vec<DrawPass>,
    pub(crate) execute: Option<ExecuteFn>,
}

impl RenderPass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn draw_passes(&self) -> &[DrawPass] {
        &self.draw_passes
    }

    /// A pass without a callback only groups resources
    pub fn is_placeholder(&self) -> bool {
        self.execute.is_none()
    }
}

impl fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPass")
            .field("name", &self.name)
            .field("draw_passes", &self.draw_passes)
            .field("placeholder", &self.is_placeholder())
            .finish()
    }
}

/// Everything a pass callback may touch while it runs
pub struct PassContext<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub resources: &'a ResourceTable,
    pub frame: &'a FrameContext,
    pub data: &'a RenderData,
    pub path_tracer: Option<&'a PathTracerBuffers>,
    pub particles: &'a [ParticleBuffers],
    pub pass_name: &'a str,
    pub draw_pass: &'a DrawPass,
    /// Deferred textures this callback finished writing
    pub(crate) ready: Vec<ResourceName>,
}

impl<'a> PassContext<'a> {
    /// Bind the sub-pass attachments and cover them with the viewport
    pub fn set_render_target(&mut self) {
        let draw_pass = self.draw_pass;
        self.backend.set_render_target(
            draw_pass.color_handles(),
            draw_pass.depth_handle(),
            draw_pass.layer,
            draw_pass.mip,
        );
        let (width, height) = draw_pass.buffer_size();
        self.backend.set_viewport(Viewport::new(width, height));
    }

    /// Bind the attachments at another array layer and mip, sizing the viewport to that mip
    pub fn set_render_target_at(&mut self, layer: u32, mip: u32) {
        let draw_pass = self.draw_pass;
        self.backend
            .set_render_target(draw_pass.color_handles(), draw_pass.depth_handle(), layer, mip);
        let (width, height) = draw_pass.buffer_size();
        self.backend
            .set_viewport(Viewport::new((width >> mip).max(1), (height >> mip).max(1)));
    }

    pub fn clear(&mut self, flags: ClearFlags, clear_color: [f32; 4]) {
        self.clear_layer(flags, clear_color, self.draw_pass.layer);
    }

    pub fn clear_layer(&mut self, flags: ClearFlags, clear_color: [f32; 4], layer: u32) {
        let draw_pass = self.draw_pass;
        self.backend.clear(
            draw_pass.color_handles(),
            draw_pass.depth_handle(),
            flags,
            clear_color,
            layer,
        );
    }

    /// Bind element `index` of one of the frame's constant buffers
    pub fn bind_slot<T: ConstantBuffer>(&mut self, buffer: &ConstantBufferArray<T>, index: u32) {
        buffer.bind(&mut *self.backend, index);
    }

    /// Fullscreen triangle strip
    pub fn draw_quad(&mut self) {
        self.backend.draw_arrays(4, 0);
    }

    /// Unit cube around the camera
    pub fn draw_skybox(&mut self) {
        self.backend.draw_arrays(36, 0);
    }

    /// Look up a resource the callback needs, logging when it is missing
    pub fn require(&self, name: ResourceName) -> Option<Arc<GpuTexture>> {
        let texture = self.resources.find_texture(name);
        if texture.is_none() {
            log::warn!("{}: '{}' is missing, skipping", self.pass_name, name);
        }
        texture
    }

    /// Deferred textures stay unreadable until the next pass runs
    pub fn is_ready(&self, name: ResourceName) -> bool {
        self.resources.is_ready(name) || self.ready.contains(&name)
    }

    /// Let later passes sample `name`, once the current sub-pass ends
    pub fn mark_ready(&mut self, name: ResourceName) {
        if !self.ready.contains(&name) {
            self.ready.push(name);
        }
    }
}
