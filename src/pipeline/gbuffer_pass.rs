//! G-Buffer generation pass for deferred rendering
//!
//! Renders geometry to multiple render targets (MRT):
//! - Base color
//! - World-space position
//! - Normal and material properties
//! - Depth-stencil buffer

use crate::backend::*;
use crate::pipeline::{RenderGraphBuilderConfig, PASS_GBUFFER};
use crate::render_graph::*;
use crate::scene::DrawBatch;

pub const GBUFFER_FORMAT: PixelFormat = PixelFormat::R16G16B16A16_FLOAT;
pub const DEPTH_FORMAT: PixelFormat = PixelFormat::R32G8X24_TYPELESS;

pub const GBUFFER_TARGETS: [ResourceName; 3] =
    [ResourceName::Gbuffer0, ResourceName::Gbuffer1, ResourceName::Gbuffer2];

/// Stencil value written under selected objects
pub const STENCIL_FLAG_SELECTED: u32 = 2;

/// Issue the draws of `batches`, binding their constant buffer elements first.
///
/// With materials bound, selected batches also write [`STENCIL_FLAG_SELECTED`].
pub(crate) fn draw_batches(ctx: &mut PassContext<'_>, batches: &[DrawBatch], with_material: bool) {
    let frame = ctx.frame;
    for batch in batches {
        if let Some(bone) = batch.bone_index {
            ctx.bind_slot(&frame.bone, bone);
        }
        ctx.bind_slot(&frame.batch, batch.batch_index);
        ctx.backend.set_mesh(batch.mesh);
        if with_material {
            ctx.bind_slot(&frame.material, batch.material_index);
        }

        let tag = with_material && batch.selected;
        if tag {
            ctx.backend.set_stencil_ref(STENCIL_FLAG_SELECTED);
        }
        if batch.instance_count > 1 {
            ctx.backend.draw_elements_instanced(
                batch.instance_count,
                batch.index_count,
                batch.index_offset,
            );
        } else {
            ctx.backend.draw_elements(batch.index_count, batch.index_offset);
        }
        if tag {
            ctx.backend.set_stencil_ref(0);
        }
    }
}

pub fn add_gbuffer_pass(graph: &mut RenderGraphBuilder, config: &RenderGraphBuilderConfig) {
    let (width, height) = (config.frame_width, config.frame_height);

    let mut pass = PassBuilder::new(PASS_GBUFFER).create(
        ResourceName::Depth,
        GpuTextureDesc::attachment(AttachmentType::DepthStencil2D, DEPTH_FORMAT, width, height, 1),
    );
    for name in GBUFFER_TARGETS {
        pass = pass
            .create(
                name,
                GpuTextureDesc::attachment(
                    AttachmentType::Color2D,
                    GBUFFER_FORMAT,
                    width,
                    height,
                    1,
                ),
            )
            .write(WriteAccess::Rtv, name);
    }
    pass = pass.write(WriteAccess::Dsv, ResourceName::Depth);

    graph.add_pass(pass.set_execute_func(|ctx| {
        ctx.set_render_target();
        ctx.clear(ClearFlags::ALL, [0.0, 0.0, 0.0, 1.0]);

        let data = ctx.data;
        let frame = ctx.frame;
        ctx.bind_slot(&frame.pass, data.main_pass.pass_index);

        ctx.backend.set_pipeline_state(PipelineStateName::Gbuffer);
        draw_batches(ctx, &data.main_pass.opaque, true);
        ctx.backend.set_pipeline_state(PipelineStateName::GbufferDoubleSided);
        draw_batches(ctx, &data.main_pass.double_sided, true);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::FrameContext;
    use crate::scene::{PassDrawList, RenderData};

    fn batch(batch_index: u32, instance_count: u32) -> DrawBatch {
        DrawBatch {
            mesh: MeshHandle(7),
            index_count: 36,
            index_offset: 0,
            batch_index,
            material_index: 2,
            bone_index: None,
            instance_count,
            selected: false,
        }
    }

    #[test]
    fn test_gbuffer_attachments() {
        let mut graph = RenderGraphBuilder::new();
        add_gbuffer_pass(&mut graph, &RenderGraphBuilderConfig::default().with_frame_size(64, 32));

        let mut backend = RecordingBackend::new();
        let graph = graph.compile(&mut backend).unwrap();
        let draw_pass = &graph.find_pass(PASS_GBUFFER).unwrap().draw_passes()[0];
        assert_eq!(draw_pass.color_attachments.len(), 3);
        assert_eq!(draw_pass.buffer_size(), (64, 32));
        assert_eq!(draw_pass.depth_attachment.as_ref().unwrap().desc.format, DEPTH_FORMAT);
    }

    #[test]
    fn test_draws_opaque_then_double_sided() {
        let mut graph = RenderGraphBuilder::new();
        add_gbuffer_pass(&mut graph, &RenderGraphBuilderConfig::default().with_frame_size(64, 32));

        let mut backend = RecordingBackend::new();
        let mut graph = graph.compile(&mut backend).unwrap();
        let frame = FrameContext::new(&mut backend).unwrap();
        let data = RenderData {
            main_pass: PassDrawList {
                opaque: vec![batch(0, 1)],
                double_sided: vec![batch(1, 4)],
                ..Default::default()
            },
            ..Default::default()
        };

        backend.take_commands();
        graph.execute(&mut backend, FrameInputs::new(&frame, &data)).unwrap();
        let commands = backend.take_commands();

        let pipelines: Vec<_> = commands
            .iter()
            .filter_map(|command| match command {
                BackendCommand::SetPipelineState(pipeline) => Some(*pipeline),
                _ => None,
            })
            .collect();
        assert_eq!(
            pipelines,
            vec![PipelineStateName::Gbuffer, PipelineStateName::GbufferDoubleSided]
        );
        assert!(commands.contains(&BackendCommand::DrawElements { count: 36, offset: 0 }));
        assert!(commands.contains(&BackendCommand::DrawElementsInstanced {
            instance_count: 4,
            count: 36,
            offset: 0
        }));
    }

    #[test]
    fn test_selected_batch_writes_stencil_and_binds_bones() {
        let mut graph = RenderGraphBuilder::new();
        add_gbuffer_pass(&mut graph, &RenderGraphBuilderConfig::default().with_frame_size(64, 32));

        let mut backend = RecordingBackend::new();
        let mut graph = graph.compile(&mut backend).unwrap();
        let frame = FrameContext::new(&mut backend).unwrap();
        let selected = DrawBatch {
            selected: true,
            bone_index: Some(1),
            ..batch(0, 1)
        };
        let data = RenderData {
            main_pass: PassDrawList {
                opaque: vec![selected, batch(1, 1)],
                ..Default::default()
            },
            ..Default::default()
        };

        backend.take_commands();
        graph.execute(&mut backend, FrameInputs::new(&frame, &data)).unwrap();
        let commands = backend.take_commands();

        let stencil: Vec<_> = commands
            .iter()
            .filter_map(|command| match command {
                BackendCommand::SetStencilRef(reference) => Some(*reference),
                _ => None,
            })
            .collect();
        assert_eq!(stencil, vec![STENCIL_FLAG_SELECTED, 0]);

        let bone_binds = commands
            .iter()
            .filter(|command| {
                matches!(
                    command,
                    BackendCommand::BindConstantBufferRange { buffer, .. }
                        if *buffer == frame.bone.buffer()
                )
            })
            .count();
        assert_eq!(bone_binds, 1);
    }
}
