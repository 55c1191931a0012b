//! Built-in render graphs
//!
//! Each graph variant is a list of pass builders assembled from a
//! [`RenderGraphBuilderConfig`]:
//! 1. `empty` - clears the output, nothing else
//! 2. `dummy` - the G-buffer pass alone
//! 3. `default` - shadows, G-buffer, optional voxel GI, lighting,
//!    particles, bloom, tone mapping and debug overlays; the editor adds the
//!    selection mask
//! 4. `pathtracer` - compute path tracer and its present pass

pub mod debug_image_pass;
pub mod emitter_pass;
pub mod environment_pass;
pub mod gbuffer_pass;
pub mod highlight_pass;
pub mod lighting_pass;
pub mod path_tracer_pass;
pub mod postprocess;
pub mod shadow_pass;
pub mod voxelization_pass;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::backend::*;
use crate::render_graph::*;

pub const PASS_EMPTY: &str = "p:empty";
pub const PASS_SHADOW: &str = "p:shadow";
pub const PASS_GBUFFER: &str = "p:gbuffer";
pub const PASS_LIGHTING: &str = "p:lighting";
pub const PASS_BLOOM: &str = "p:bloom";
pub const PASS_POST_PROCESS: &str = "p:post_process";
pub const PASS_PATH_TRACER: &str = "p:pathtracer";
pub const PASS_PATH_TRACER_PRESENT: &str = "p:pathtracer_present";
pub const PASS_ENV_SKYBOX: &str = "p:env_skybox";
pub const PASS_DIFFUSE: &str = "p:diffuse";
pub const PASS_PREFILTERED: &str = "p:prefiltered";
pub const PASS_VOXELIZATION: &str = "p:voxelization";
pub const PASS_HIGHLIGHT: &str = "p:highlight";
pub const PASS_EMITTER: &str = "p:emitter";
pub const PASS_DEBUG_IMAGE: &str = "p:debug_image";

/// Compute shaders work on 16x16 tiles
pub const COMPUTE_TILE_SIZE: u32 = 16;

/// Work groups covering a `width` x `height` image
pub fn dispatch_size(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(COMPUTE_TILE_SIZE), height.div_ceil(COMPUTE_TILE_SIZE))
}

/// Feature switches and sizes the graph builders read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderGraphBuilderConfig {
    pub enable_shadow: bool,
    pub enable_point_shadow: bool,
    pub enable_vxgi: bool,
    pub enable_ibl: bool,
    pub enable_bloom: bool,
    /// Outline selected objects; editor only
    pub enable_highlight: bool,
    /// False inside the editor
    pub is_runtime: bool,
    pub frame_width: u32,
    pub frame_height: u32,
    pub shadow_resolution: u32,
    pub point_shadow_resolution: u32,
    /// Edge of the voxel GI volumes
    pub voxel_size: u32,
}

impl Default for RenderGraphBuilderConfig {
    fn default() -> Self {
        Self {
            enable_shadow: true,
            enable_point_shadow: true,
            enable_vxgi: false,
            enable_ibl: true,
            enable_bloom: true,
            enable_highlight: true,
            is_runtime: true,
            frame_width: 1920,
            frame_height: 1080,
            shadow_resolution: 2048,
            point_shadow_resolution: 512,
            voxel_size: 64,
        }
    }
}

impl RenderGraphBuilderConfig {
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_width = width;
        self.frame_height = height;
        self
    }

    pub(crate) fn highlight(&self) -> bool {
        self.enable_highlight && !self.is_runtime
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown render graph '{0}'")]
pub struct UnknownRenderGraph(pub String);

/// Built-in graph variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderGraphName {
    Empty,
    #[default]
    Default,
    Dummy,
    PathTracer,
}

impl RenderGraphName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderGraphName::Empty => "empty",
            RenderGraphName::Default => "default",
            RenderGraphName::Dummy => "dummy",
            RenderGraphName::PathTracer => "pathtracer",
        }
    }

    /// Parse a configured name, falling back to `default` when unknown
    pub fn select(name: &str) -> Self {
        name.parse().unwrap_or_else(|err: UnknownRenderGraph| {
            log::warn!("{}, falling back to 'default'", err);
            RenderGraphName::Default
        })
    }

    pub fn builder(&self, config: &RenderGraphBuilderConfig) -> RenderGraphBuilder {
        match self {
            RenderGraphName::Empty => create_empty(config),
            RenderGraphName::Default => create_default(config),
            RenderGraphName::Dummy => create_dummy(config),
            RenderGraphName::PathTracer => create_path_tracer(config),
        }
    }
}

impl FromStr for RenderGraphName {
    type Err = UnknownRenderGraph;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "empty" => Ok(RenderGraphName::Empty),
            "default" => Ok(RenderGraphName::Default),
            "dummy" => Ok(RenderGraphName::Dummy),
            "pathtracer" => Ok(RenderGraphName::PathTracer),
            _ => Err(UnknownRenderGraph(s.to_string())),
        }
    }
}

impl fmt::Display for RenderGraphName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build and compile one of the built-in graphs
pub fn create_render_graph(
    backend: &mut dyn GraphicsBackend,
    name: RenderGraphName,
    config: &RenderGraphBuilderConfig,
) -> GraphResult<RenderGraph> {
    log::info!(
        "Creating '{}' render graph ({}x{})",
        name,
        config.frame_width,
        config.frame_height
    );
    name.builder(config).compile(backend)
}

pub fn create_empty(config: &RenderGraphBuilderConfig) -> RenderGraphBuilder {
    let target = GpuTextureDesc::attachment(
        AttachmentType::Color2D,
        PixelFormat::R8G8B8A8_UNORM,
        config.frame_width,
        config.frame_height,
        1,
    );

    RenderGraphBuilder::new().with_pass(
        PassBuilder::new(PASS_EMPTY)
            .create(ResourceName::PostProcess, target)
            .write(WriteAccess::Rtv, ResourceName::PostProcess)
            .set_execute_func(|ctx| {
                ctx.set_render_target();
                ctx.clear(ClearFlags::COLOR, [0.0, 0.0, 0.0, 1.0]);
            }),
    )
}

pub fn create_dummy(config: &RenderGraphBuilderConfig) -> RenderGraphBuilder {
    let mut graph = RenderGraphBuilder::new();
    gbuffer_pass::add_gbuffer_pass(&mut graph, config);
    graph
}

pub fn create_default(config: &RenderGraphBuilderConfig) -> RenderGraphBuilder {
    let mut graph = RenderGraphBuilder::new();
    if config.enable_ibl {
        environment_pass::add_environment_passes(&mut graph);
    }
    if config.enable_shadow {
        shadow_pass::add_shadow_pass(&mut graph, config);
    }
    gbuffer_pass::add_gbuffer_pass(&mut graph, config);
    if config.enable_vxgi {
        voxelization_pass::add_voxelization_pass(&mut graph, config);
    }
    if config.highlight() {
        highlight_pass::add_highlight_pass(&mut graph, config);
        // both draw into the scene depth
        graph.add_dependency(PASS_HIGHLIGHT, PASS_LIGHTING);
    }
    lighting_pass::add_lighting_pass(&mut graph, config);
    emitter_pass::add_emitter_pass(&mut graph);
    if config.enable_bloom {
        postprocess::bloom::add_bloom_pass(&mut graph, config);
    }
    postprocess::tonemapping::add_post_process_pass(&mut graph, config);
    debug_image_pass::add_debug_image_pass(&mut graph);
    graph
}

pub fn create_path_tracer(config: &RenderGraphBuilderConfig) -> RenderGraphBuilder {
    let mut graph = RenderGraphBuilder::new();
    path_tracer_pass::add_path_tracer_pass(&mut graph, config);
    path_tracer_pass::add_path_tracer_present_pass(&mut graph, config);
    graph
}
