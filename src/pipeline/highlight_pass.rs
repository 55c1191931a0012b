//! Editor selection mask
//!
//! Marks the pixels whose stencil carries the selection flag, so tone
//! mapping can outline selected objects.

use crate::backend::*;
use crate::pipeline::gbuffer_pass::STENCIL_FLAG_SELECTED;
use crate::pipeline::{RenderGraphBuilderConfig, PASS_HIGHLIGHT};
use crate::render_graph::*;

pub const HIGHLIGHT_SELECT_FORMAT: PixelFormat = PixelFormat::R8_UINT;

pub fn add_highlight_pass(graph: &mut RenderGraphBuilder, config: &RenderGraphBuilderConfig) {
    let target = GpuTextureDesc::attachment(
        AttachmentType::Color2D,
        HIGHLIGHT_SELECT_FORMAT,
        config.frame_width,
        config.frame_height,
        1,
    );

    graph.add_pass(
        PassBuilder::new(PASS_HIGHLIGHT)
            .create(ResourceName::HighlightSelect, target)
            .write(WriteAccess::Rtv, ResourceName::HighlightSelect)
            .write(WriteAccess::Dsv, ResourceName::Depth)
            .set_execute_func(|ctx| {
                ctx.set_render_target();
                ctx.backend.set_pipeline_state(PipelineStateName::Highlight);
                ctx.backend.set_stencil_ref(STENCIL_FLAG_SELECTED);
                ctx.clear(ClearFlags::COLOR, [0.0, 0.0, 0.0, 0.0]);
                ctx.draw_quad();
                ctx.backend.set_stencil_ref(0);
            }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::gbuffer_pass::add_gbuffer_pass;
    use crate::pipeline::PASS_GBUFFER;
    use crate::resources::FrameContext;
    use crate::scene::RenderData;

    #[test]
    fn test_masks_selection_stencil() {
        let config = RenderGraphBuilderConfig::default().with_frame_size(16, 16);
        let mut graph = RenderGraphBuilder::new();
        add_gbuffer_pass(&mut graph, &config);
        add_highlight_pass(&mut graph, &config);

        let mut backend = RecordingBackend::new();
        let mut graph = graph.compile(&mut backend).unwrap();
        assert_eq!(graph.pass_order(), vec![PASS_GBUFFER, PASS_HIGHLIGHT]);
        let highlight = &graph.find_pass(PASS_HIGHLIGHT).unwrap().draw_passes()[0];
        let gbuffer = &graph.find_pass(PASS_GBUFFER).unwrap().draw_passes()[0];
        assert_eq!(highlight.depth_handle(), gbuffer.depth_handle());

        let frame = FrameContext::new(&mut backend).unwrap();
        backend.take_commands();
        graph.execute(&mut backend, FrameInputs::new(&frame, &RenderData::default())).unwrap();
        let commands = backend.take_commands();

        let position = |wanted: &BackendCommand| {
            commands.iter().position(|command| command == wanted).unwrap()
        };
        let tagged = position(&BackendCommand::SetStencilRef(STENCIL_FLAG_SELECTED));
        let quad = position(&BackendCommand::DrawArrays { count: 4, offset: 0 });
        let reset = position(&BackendCommand::SetStencilRef(0));
        assert!(tagged < quad && quad < reset);
    }
}
