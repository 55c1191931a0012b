//! Textures drawn over the final image for inspection

use crate::backend::*;
use crate::pipeline::PASS_DEBUG_IMAGE;
use crate::render_graph::*;

/// Register the overlaid texture binds to
pub const DEBUG_IMAGE_SLOT: u32 = 18;

pub fn add_debug_image_pass(graph: &mut RenderGraphBuilder) {
    graph.add_pass(
        PassBuilder::new(PASS_DEBUG_IMAGE)
            .write(WriteAccess::Rtv, ResourceName::PostProcess)
            .set_execute_func(|ctx| {
                let data = ctx.data;
                if data.debug_images.is_empty() {
                    return;
                }

                ctx.set_render_target();
                ctx.backend.set_pipeline_state(PipelineStateName::DebugImage);
                let frame = ctx.frame;
                for image in &data.debug_images {
                    ctx.backend
                        .bind_texture(Dimension::Texture2D, image.texture, DEBUG_IMAGE_SLOT);
                    ctx.bind_slot(&frame.batch, image.batch_index);
                    ctx.draw_quad();
                    ctx.backend.unbind_texture(Dimension::Texture2D, DEBUG_IMAGE_SLOT);
                }
            }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::postprocess::tonemapping::add_post_process_pass;
    use crate::pipeline::{RenderGraphBuilderConfig, PASS_POST_PROCESS};
    use crate::resources::FrameContext;
    use crate::scene::RenderData;
    use glam::Vec2;

    fn compile(backend: &mut RecordingBackend) -> RenderGraph {
        let config = RenderGraphBuilderConfig {
            enable_bloom: false,
            ..RenderGraphBuilderConfig::default().with_frame_size(16, 16)
        };
        let lit = GpuTextureDesc::attachment(
            AttachmentType::Color2D,
            PixelFormat::R16G16B16A16_FLOAT,
            16,
            16,
            1,
        );
        let mut graph = RenderGraphBuilder::new()
            .with_pass(PassBuilder::new("p:lighting").create(ResourceName::Lighting, lit));
        add_post_process_pass(&mut graph, &config);
        add_debug_image_pass(&mut graph);
        graph.compile(backend).unwrap()
    }

    #[test]
    fn test_draws_after_tone_mapping() {
        let mut backend = RecordingBackend::new();
        let mut graph = compile(&mut backend);
        assert_eq!(
            graph.pass_order(),
            vec!["p:lighting", PASS_POST_PROCESS, PASS_DEBUG_IMAGE]
        );

        let frame = FrameContext::new(&mut backend).unwrap();
        let mut data = RenderData::default();
        data.add_debug_image(TextureHandle(40), Vec2::ZERO, Vec2::ONE);
        data.add_debug_image(TextureHandle(41), -Vec2::ONE, Vec2::ZERO);

        backend.take_commands();
        graph.execute(&mut backend, FrameInputs::new(&frame, &data)).unwrap();
        let commands = backend.take_commands();

        let state = |name: PipelineStateName| {
            commands
                .iter()
                .position(|command| *command == BackendCommand::SetPipelineState(name))
                .unwrap()
        };
        assert!(state(PipelineStateName::Tone) < state(PipelineStateName::DebugImage));

        let bound: Vec<_> = commands
            .iter()
            .filter_map(|command| match command {
                BackendCommand::BindTexture {
                    texture,
                    slot: DEBUG_IMAGE_SLOT,
                    ..
                } => Some(*texture),
                _ => None,
            })
            .collect();
        assert_eq!(bound, vec![TextureHandle(40), TextureHandle(41)]);
    }

    #[test]
    fn test_idle_without_images() {
        let mut backend = RecordingBackend::new();
        let mut graph = compile(&mut backend);
        let frame = FrameContext::new(&mut backend).unwrap();

        backend.take_commands();
        graph.execute(&mut backend, FrameInputs::new(&frame, &RenderData::default())).unwrap();
        assert!(!backend
            .take_commands()
            .contains(&BackendCommand::SetPipelineState(PipelineStateName::DebugImage)));
    }
}
