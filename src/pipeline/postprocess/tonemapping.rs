//! Tone mapping into the post-process target

use crate::backend::*;
use crate::pipeline::{RenderGraphBuilderConfig, PASS_POST_PROCESS};
use crate::render_graph::*;

/// Format of the final image
pub const POST_PROCESS_FORMAT: PixelFormat = PixelFormat::R8G8B8A8_UNORM;

pub(crate) fn post_process_target(config: &RenderGraphBuilderConfig) -> GpuTextureDesc {
    GpuTextureDesc::attachment(
        AttachmentType::Color2D,
        POST_PROCESS_FORMAT,
        config.frame_width,
        config.frame_height,
        1,
    )
}

/// Tone map the lit image, adding bloom when the graph has it
pub fn add_post_process_pass(graph: &mut RenderGraphBuilder, config: &RenderGraphBuilderConfig) {
    let mut pass = PassBuilder::new(PASS_POST_PROCESS)
        .create(ResourceName::PostProcess, post_process_target(config))
        .write(WriteAccess::Rtv, ResourceName::PostProcess)
        .read(ReadAccess::Srv, ResourceName::Lighting);

    if config.enable_bloom {
        pass = pass.read(ReadAccess::Srv, ResourceName::BloomMip(0));
    }
    // the selection outline is stencil tested against the scene depth
    if config.highlight() {
        pass = pass
            .read(ReadAccess::Srv, ResourceName::HighlightSelect)
            .write(WriteAccess::Dsv, ResourceName::Depth);
    }

    graph.add_pass(pass.set_execute_func(|ctx| {
        ctx.set_render_target();
        ctx.clear(ClearFlags::COLOR, [0.0, 0.0, 0.0, 1.0]);
        ctx.backend.set_pipeline_state(PipelineStateName::Tone);
        ctx.draw_quad();
    }));
}
