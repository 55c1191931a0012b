//! Render graph executor

use crate::backend::*;
use crate::path_tracer::PathTracerBuffers;
use crate::render_graph::error::*;
use crate::render_graph::graph::RenderGraph;
use crate::render_graph::pass::*;
use crate::resources::{FrameContext, ParticleBuffers, UploadQueue};
use crate::scene::RenderData;

/// Per-frame inputs shared by every pass callback
#[derive(Clone, Copy)]
pub struct FrameInputs<'a> {
    pub frame: &'a FrameContext,
    pub data: &'a RenderData,
    pub path_tracer: Option<&'a PathTracerBuffers>,
    /// GPU state of each emitter, indexed like the frame's emitter buffers
    pub particles: &'a [ParticleBuffers],
    /// Decoded images to install before the first pass runs
    pub uploads: Option<&'a UploadQueue>,
}

impl<'a> FrameInputs<'a> {
    pub fn new(frame: &'a FrameContext, data: &'a RenderData) -> Self {
        Self {
            frame,
            data,
            path_tracer: None,
            particles: &[],
            uploads: None,
        }
    }

    pub fn with_path_tracer(mut self, buffers: Option<&'a PathTracerBuffers>) -> Self {
        self.path_tracer = buffers;
        self
    }

    pub fn with_particles(mut self, particles: &'a [ParticleBuffers]) -> Self {
        self.particles = particles;
        self
    }

    pub fn with_uploads(mut self, queue: &'a UploadQueue) -> Self {
        self.uploads = Some(queue);
        self
    }
}

impl RenderGraph {
    /// Turn every decoded image waiting in `queue` into a texture, then retry
    /// pending imports. Returns the number of textures created.
    ///
    /// Every image is attempted; the first failure is returned after the
    /// rest of the queue has been processed.
    pub fn process_uploads(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        queue: &UploadQueue,
    ) -> GraphResult<usize> {
        let mut created = 0;
        let mut first_error = None;
        for loaded in queue.pop_all() {
            match self.resources.create_asset_texture(backend, &loaded.path, &loaded.image) {
                Ok(_) => {
                    log::debug!("Uploaded '{}'", loaded.path);
                    created += 1;
                }
                Err(source) => {
                    log::error!("Failed to upload '{}': {}", loaded.path, source);
                    first_error.get_or_insert(GraphError::Upload {
                        path: loaded.path,
                        source,
                    });
                }
            }
        }

        self.resources.resolve_imports();
        match first_error {
            Some(err) => Err(err),
            None => Ok(created),
        }
    }

    /// Drain pending uploads, then run every pass in order, once per draw sub-pass.
    ///
    /// A failed upload does not stop the frame; its error is returned once
    /// every pass has run.
    pub fn execute(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        inputs: FrameInputs<'_>,
    ) -> GraphResult<()> {
        let uploaded = match inputs.uploads {
            Some(queue) => self.process_uploads(backend, queue).map(|_| ()),
            None => Ok(()),
        };

        for pass in &self.passes {
            let Some(execute) = &pass.execute else {
                continue;
            };

            for draw_pass in &pass.draw_passes {
                self.begin_draw_pass(backend, draw_pass);

                let mut ctx = PassContext {
                    backend: &mut *backend,
                    resources: &self.resources,
                    frame: inputs.frame,
                    data: inputs.data,
                    path_tracer: inputs.path_tracer,
                    particles: inputs.particles,
                    pass_name: &pass.name,
                    draw_pass,
                    ready: Vec::new(),
                };
                execute(&mut ctx);
                let ready = ctx.ready;

                self.end_draw_pass(backend, draw_pass);
                for name in ready {
                    self.resources.mark_ready(name);
                }
            }
        }

        uploaded
    }

    fn begin_draw_pass(&self, backend: &mut dyn GraphicsBackend, draw_pass: &DrawPass) {
        // an attachment cannot stay bound as a shader input while it is written
        for texture in draw_pass.out_srvs() {
            if let Some(slot) = texture.slot {
                backend.unbind_texture(texture.dimension(), slot);
            }
        }

        for transition in &draw_pass.transitions {
            transition.begin(backend, &self.resources);
        }
    }

    fn end_draw_pass(&self, backend: &mut dyn GraphicsBackend, draw_pass: &DrawPass) {
        for transition in &draw_pass.transitions {
            transition.end(backend, &self.resources);
        }

        if draw_pass.has_attachments() {
            backend.unset_render_target();
        }

        for texture in draw_pass.out_srvs() {
            if let Some(slot) = texture.slot {
                backend.bind_texture(texture.dimension(), texture.handle, slot);
            }
        }
    }
}
