//! Compute path tracer and the pass presenting its output

use crate::backend::*;
use crate::pipeline::postprocess::tonemapping::post_process_target;
use crate::pipeline::{
    dispatch_size, RenderGraphBuilderConfig, PASS_PATH_TRACER, PASS_PATH_TRACER_PRESENT,
};
use crate::render_graph::*;

pub const PATH_TRACER_FORMAT: PixelFormat = PixelFormat::R32G32B32A32_FLOAT;

pub fn add_path_tracer_pass(graph: &mut RenderGraphBuilder, config: &RenderGraphBuilderConfig) {
    let desc = GpuTextureDesc::attachment(
        AttachmentType::Color2D,
        PATH_TRACER_FORMAT,
        config.frame_width,
        config.frame_height,
        1,
    )
    .with_unordered_access();

    graph.add_pass(
        PassBuilder::new(PASS_PATH_TRACER)
            .create_with_sampler(ResourceName::PathTracer, desc, SamplerDesc::linear_clamp())
            .write(WriteAccess::Uav, ResourceName::PathTracer)
            .set_execute_func(|ctx| {
                let Some(buffers) = ctx.path_tracer else {
                    log::debug!("{}: scene is not baked yet", ctx.pass_name);
                    return;
                };
                let Some(output) = ctx.require(ResourceName::PathTracer) else {
                    return;
                };

                let (x, y) = dispatch_size(output.width(), output.height());
                ctx.backend.set_pipeline_state(PipelineStateName::PathTracer);
                buffers.bind(&mut *ctx.backend);
                ctx.backend.dispatch(x, y, 1);
                buffers.unbind(&mut *ctx.backend);
            }),
    );
}

/// Tone map the accumulated path tracer image into the post-process target
pub fn add_path_tracer_present_pass(
    graph: &mut RenderGraphBuilder,
    config: &RenderGraphBuilderConfig,
) {
    graph.add_pass(
        PassBuilder::new(PASS_PATH_TRACER_PRESENT)
            .read(ReadAccess::Srv, ResourceName::PathTracer)
            .create(ResourceName::PostProcess, post_process_target(config))
            .write(WriteAccess::Rtv, ResourceName::PostProcess)
            .set_execute_func(|ctx| {
                ctx.set_render_target();
                ctx.clear(ClearFlags::COLOR, [0.0, 0.0, 0.0, 1.0]);
                ctx.backend.set_pipeline_state(PipelineStateName::Tone);
                ctx.draw_quad();
            }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_tracer::{
        PathTracerBuffers, BVH_BUFFER_SLOT, GEOMETRY_BUFFER_SLOT, MATERIAL_BUFFER_SLOT,
    };
    use crate::resources::FrameContext;
    use crate::scene::RenderData;

    fn compile(backend: &mut RecordingBackend) -> RenderGraph {
        let config = RenderGraphBuilderConfig::default().with_frame_size(100, 50);
        let mut graph = RenderGraphBuilder::new();
        add_path_tracer_pass(&mut graph, &config);
        add_path_tracer_present_pass(&mut graph, &config);
        graph.compile(backend).unwrap()
    }

    fn dispatches(commands: &[BackendCommand]) -> Vec<(u32, u32, u32)> {
        commands
            .iter()
            .filter_map(|command| match command {
                BackendCommand::Dispatch { x, y, z } => Some((*x, *y, *z)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_skips_until_baked() {
        let mut backend = RecordingBackend::new();
        let mut graph = compile(&mut backend);
        let frame = FrameContext::new(&mut backend).unwrap();
        let data = RenderData::default();

        backend.take_commands();
        graph.execute(&mut backend, FrameInputs::new(&frame, &data)).unwrap();
        let commands = backend.take_commands();
        assert!(dispatches(&commands).is_empty());
        // the present pass still runs
        assert!(commands.contains(&BackendCommand::SetPipelineState(PipelineStateName::Tone)));
    }

    #[test]
    fn test_dispatch_covers_frame() {
        let mut backend = RecordingBackend::new();
        let mut graph = compile(&mut backend);
        let frame = FrameContext::new(&mut backend).unwrap();
        let data = RenderData::default();
        let buffers = PathTracerBuffers {
            geometry: BufferHandle::from_raw(900),
            bvh: BufferHandle::from_raw(901),
            material: BufferHandle::from_raw(902),
            geometry_count: 2,
            node_count: 3,
            material_count: 1,
        };

        backend.take_commands();
        let inputs = FrameInputs::new(&frame, &data).with_path_tracer(Some(&buffers));
        graph.execute(&mut backend, inputs).unwrap();
        let commands = backend.take_commands();
        assert_eq!(dispatches(&commands), vec![(7, 4, 1)]);

        let bound: Vec<u32> = commands
            .iter()
            .filter_map(|command| match command {
                BackendCommand::BindStructuredBuffer { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(bound, vec![GEOMETRY_BUFFER_SLOT, BVH_BUFFER_SLOT, MATERIAL_BUFFER_SLOT]);
        assert!(commands.contains(&BackendCommand::BindUnorderedAccessView {
            slot: ResourceName::PathTracer.slot(),
            texture: graph.resources().find_texture(ResourceName::PathTracer).unwrap().handle,
        }));
    }
}
