//! GPU particles
//!
//! Simulates every emitter with three compute steps, then draws the live
//! particles as instanced quads over the lit image.

use crate::backend::*;
use crate::pipeline::PASS_EMITTER;
use crate::render_graph::*;
use crate::resources::{ParticleBuffers, PARTICLE_DATA_SLOT};

pub fn add_emitter_pass(graph: &mut RenderGraphBuilder) {
    graph.add_pass(
        PassBuilder::new(PASS_EMITTER)
            .write(WriteAccess::Rtv, ResourceName::Lighting)
            .write(WriteAccess::Dsv, ResourceName::Depth)
            .set_execute_func(|ctx| {
                let data = ctx.data;
                let particles = ctx.particles;
                let emitter_count = data.emitters.len().min(particles.len());
                if emitter_count == 0 {
                    return;
                }

                ctx.set_render_target();
                let frame = ctx.frame;
                ctx.bind_slot(&frame.pass, data.main_pass.pass_index);

                for (index, buffers) in particles.iter().take(emitter_count).enumerate() {
                    ctx.bind_slot(&frame.emitter, index as u32);

                    buffers.bind_simulation(&mut *ctx.backend);
                    ctx.backend.set_pipeline_state(PipelineStateName::ParticleKickoff);
                    ctx.backend.dispatch(1, 1, 1);
                    ctx.backend.set_pipeline_state(PipelineStateName::ParticleEmit);
                    ctx.backend.dispatch(buffers.group_count(), 1, 1);
                    ctx.backend.set_pipeline_state(PipelineStateName::ParticleSim);
                    ctx.backend.dispatch(buffers.group_count(), 1, 1);
                    ParticleBuffers::unbind_simulation(&mut *ctx.backend);

                    ctx.backend.set_pipeline_state(PipelineStateName::ParticleRendering);
                    ctx.backend.bind_structured_buffer(PARTICLE_DATA_SLOT, buffers.particles);
                    ctx.backend.draw_arrays_instanced(buffers.capacity, 4, 0);
                    ctx.backend.unbind_structured_buffer(PARTICLE_DATA_SLOT);
                }
            }),
    );
}
