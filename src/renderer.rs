//! Frame driver tying the backend, the render graph and the path tracer together

use std::sync::Arc;
use std::time::Instant;

use glam::Vec2;
use thiserror::Error;

use crate::backend::*;
use crate::path_tracer::{PathTracer, PathTracerConfig, PathTracerMode, PathTracerScene};
use crate::pipeline::{
    create_render_graph, RenderGraphBuilderConfig, RenderGraphName, PASS_VOXELIZATION,
};
use crate::render_graph::*;
use crate::resources::{FrameContexts, ParticleSystem, UploadQueue};
use crate::scene::{Camera, RenderData, Scene};

#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Configuration for creating a [`Renderer`]
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// API the backend is expected to report
    pub backend: BackendType,
    /// One of the built-in graph names; unknown names fall back to `default`
    pub render_graph: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub graph: RenderGraphBuilderConfig,
    pub path_tracer: PathTracerConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Empty,
            render_graph: RenderGraphName::Default.as_str().to_string(),
            frame_width: 1920,
            frame_height: 1080,
            graph: RenderGraphBuilderConfig::default(),
            path_tracer: PathTracerConfig::default(),
        }
    }
}

impl RendererConfig {
    pub fn frames_in_flight(&self) -> usize {
        self.backend.frames_in_flight()
    }
}

pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    frames: FrameContexts,
    graph: RenderGraph,
    uploads: Arc<UploadQueue>,
    path_tracer: PathTracer,
    particles: ParticleSystem,
    /// Set when the graph voxelizes the scene
    voxel_size: Option<u32>,
    debug_images: Vec<(TextureHandle, Vec2, Vec2)>,
    scene_revision: Option<u64>,
    ibl_pending: bool,
    frame_count: u64,
    last_frame: Option<Instant>,
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(mut backend: B, config: RendererConfig) -> Result<Self, RendererError> {
        if backend.backend_type() != config.backend {
            log::warn!(
                "Configured for {:?} but the backend reports {:?}",
                config.backend,
                backend.backend_type()
            );
        }

        let name = RenderGraphName::select(&config.render_graph);
        let graph_config = config
            .graph
            .clone()
            .with_frame_size(config.frame_width, config.frame_height);
        let frames = FrameContexts::new(&mut backend)?;
        let graph = match create_render_graph(&mut backend, name, &graph_config) {
            Ok(graph) => graph,
            Err(err) => {
                frames.destroy(&mut backend);
                return Err(err.into());
            }
        };

        let voxel_size = graph
            .find_pass(PASS_VOXELIZATION)
            .map(|_| graph_config.voxel_size);

        Ok(Self {
            backend,
            frames,
            graph,
            uploads: Arc::new(UploadQueue::new()),
            path_tracer: PathTracer::new(config.path_tracer),
            particles: ParticleSystem::new(),
            voxel_size,
            debug_images: Vec::new(),
            scene_revision: None,
            ibl_pending: true,
            frame_count: 0,
            last_frame: None,
        })
    }

    /// Queue texture loaders push decoded images into
    pub fn upload_queue(&self) -> &Arc<UploadQueue> {
        &self.uploads
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    pub fn frame_index(&self) -> usize {
        self.frames.current_index()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn set_path_tracer_mode(&mut self, mode: PathTracerMode) {
        self.path_tracer.set_mode(mode);
    }

    /// Bake the environment cubemaps again once the sky image is available
    pub fn request_ibl_bake(&mut self) {
        self.ibl_pending = true;
    }

    /// Overlay `texture` on the final image, `min` and `max` in clip space
    pub fn add_debug_image(&mut self, texture: TextureHandle, min: Vec2, max: Vec2) {
        self.debug_images.push((texture, min, max));
    }

    pub fn clear_debug_images(&mut self) {
        self.debug_images.clear();
    }

    /// Render one frame of `scene`.
    ///
    /// An image that fails to upload does not stop the frame; the error is
    /// returned after the frame has been submitted.
    pub fn render_frame(&mut self, scene: &Scene, camera: &Camera) -> Result<(), RendererError> {
        let uploaded = self.graph.process_uploads(&mut self.backend, &self.uploads);

        if self.scene_revision != Some(scene.revision()) {
            self.scene_revision = Some(scene.revision());
            self.path_tracer.invalidate();
        }
        if self.path_tracer.mode() != PathTracerMode::None && self.path_tracer.is_dirty() {
            self.path_tracer
                .update(&mut self.backend, &PathTracerScene::from_scene(scene))?;
        }

        let mut data = RenderData::extract(scene, camera, self.backend.backend_type());
        data.bake_ibl = self.ibl_pending && self.graph.resources().contains(ResourceName::Ibl);
        if data.bake_ibl {
            log::info!("Baking environment cubemaps");
            self.ibl_pending = false;
        }
        if let Some(voxel_size) = self.voxel_size {
            data.enable_voxel_gi(voxel_size);
        }
        for &(texture, min, max) in &self.debug_images {
            data.add_debug_image(texture, min, max);
        }

        let now = Instant::now();
        let timestep = self
            .last_frame
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last_frame = Some(now);
        data.set_frame_time(self.frame_count, timestep);
        self.particles.update(&mut self.backend, &mut data.emitters)?;

        let frame = self.frames.current();
        frame.update(&mut self.backend, &data);
        frame.bind_per_frame(&mut self.backend);

        let inputs = FrameInputs::new(frame, &data)
            .with_path_tracer(self.path_tracer.buffers())
            .with_particles(self.particles.buffers());
        let executed = self.graph.execute(&mut self.backend, inputs);

        self.frames.advance();
        self.frame_count += 1;
        executed?;
        uploaded?;
        Ok(())
    }

    /// Release every GPU object and hand the backend back
    pub fn destroy(self) -> B {
        let Self {
            mut backend,
            frames,
            graph,
            path_tracer,
            particles,
            ..
        } = self;

        graph.destroy(&mut backend);
        path_tracer.destroy(&mut backend);
        particles.destroy(&mut backend);
        frames.destroy(&mut backend);
        backend
    }
}
