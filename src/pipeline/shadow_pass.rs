//! Shadow map generation
//!
//! Sub-pass 0 renders the main infinite light into a 2D shadow map. When
//! point shadows are enabled, sub-pass 1 renders every shadow-casting point
//! light into six layers of a cube map array.

use crate::backend::*;
use crate::pipeline::gbuffer_pass::draw_batches;
use crate::pipeline::{RenderGraphBuilderConfig, PASS_SHADOW};
use crate::render_graph::*;
use crate::resources::MAX_POINT_LIGHT_SHADOW_COUNT;

pub const SHADOW_FORMAT: PixelFormat = PixelFormat::D32_FLOAT;

const DIRECTIONAL: u32 = 0;
const POINT: u32 = 1;

pub fn add_shadow_pass(graph: &mut RenderGraphBuilder, config: &RenderGraphBuilderConfig) {
    if !config.shadow_resolution.is_power_of_two() {
        log::warn!("Shadow resolution {} is not a power of two", config.shadow_resolution);
    }

    let resolution = config.shadow_resolution;
    let mut pass = PassBuilder::new(PASS_SHADOW)
        .create_with_sampler(
            ResourceName::ShadowMap,
            GpuTextureDesc::attachment(
                AttachmentType::Shadow2D,
                SHADOW_FORMAT,
                resolution,
                resolution,
                1,
            ),
            SamplerDesc::shadow_map(),
        )
        .write(WriteAccess::Dsv, ResourceName::ShadowMap)
        .draw_pass(DrawPassDecl::new(DIRECTIONAL).depth(ResourceName::ShadowMap));

    if config.enable_point_shadow {
        let resolution = config.point_shadow_resolution;
        pass = pass
            .create_with_sampler(
                ResourceName::PointShadow,
                GpuTextureDesc::attachment(
                    AttachmentType::ShadowCubeArray,
                    SHADOW_FORMAT,
                    resolution,
                    resolution,
                    6 * MAX_POINT_LIGHT_SHADOW_COUNT as u32,
                ),
                SamplerDesc::shadow_map(),
            )
            .write(WriteAccess::Dsv, ResourceName::PointShadow)
            .draw_pass(DrawPassDecl::new(POINT).depth(ResourceName::PointShadow));
    }

    graph.add_pass(pass.set_execute_func(|ctx| match ctx.draw_pass.id {
        DIRECTIONAL => draw_directional(ctx),
        _ => draw_point(ctx),
    }));
}

fn draw_directional(ctx: &mut PassContext<'_>) {
    ctx.set_render_target();
    ctx.clear(ClearFlags::DEPTH, [0.0; 4]);

    let data = ctx.data;
    let Some(pass) = &data.shadow_pass else {
        return;
    };
    let frame = ctx.frame;
    ctx.bind_slot(&frame.pass, pass.pass_index);

    ctx.backend.set_pipeline_state(PipelineStateName::DepthOnly);
    draw_batches(ctx, &pass.opaque, false);
    draw_batches(ctx, &pass.transparent, false);
    draw_batches(ctx, &pass.double_sided, false);
}

fn draw_point(ctx: &mut PassContext<'_>) {
    let data = ctx.data;
    let Some(pass) = &data.point_shadow_pass else {
        return;
    };

    let frame = ctx.frame;
    for layer in data.point_shadow_layers() {
        ctx.bind_slot(&frame.point_shadow, layer);
        ctx.set_render_target_at(layer, 0);
        ctx.clear_layer(ClearFlags::DEPTH, [0.0; 4], layer);

        ctx.backend.set_pipeline_state(PipelineStateName::PointShadow);
        draw_batches(ctx, &pass.opaque, false);
        draw_batches(ctx, &pass.transparent, false);
        draw_batches(ctx, &pass.double_sided, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{FrameContext, PointShadowConstantBuffer};
    use crate::scene::{DrawBatch, PassDrawList, RenderData};

    fn compile(config: &RenderGraphBuilderConfig, backend: &mut RecordingBackend) -> RenderGraph {
        let mut graph = RenderGraphBuilder::new();
        add_shadow_pass(&mut graph, config);
        graph.compile(backend).unwrap()
    }

    #[test]
    fn test_point_shadow_array_layers() {
        let mut backend = RecordingBackend::new();
        let graph = compile(&RenderGraphBuilderConfig::default(), &mut backend);

        let cube = graph.resources().find_texture(ResourceName::PointShadow).unwrap();
        assert_eq!(cube.desc.array_size, 48);
        assert_eq!(cube.dimension(), Dimension::TextureCubeArray);
        assert_eq!(graph.find_pass(PASS_SHADOW).unwrap().draw_passes().len(), 2);
    }

    #[test]
    fn test_point_shadow_disabled() {
        let config = RenderGraphBuilderConfig {
            enable_point_shadow: false,
            ..Default::default()
        };
        let mut backend = RecordingBackend::new();
        let graph = compile(&config, &mut backend);
        assert!(graph.resources().find_texture(ResourceName::PointShadow).is_none());
        assert_eq!(graph.find_pass(PASS_SHADOW).unwrap().draw_passes().len(), 1);
    }

    #[test]
    fn test_point_light_renders_six_layers() {
        let config = RenderGraphBuilderConfig {
            shadow_resolution: 64,
            point_shadow_resolution: 16,
            ..Default::default()
        };
        let mut backend = RecordingBackend::new();
        let mut graph = compile(&config, &mut backend);
        let frame = FrameContext::new(&mut backend).unwrap();

        let mut data = RenderData {
            point_shadow_pass: Some(PassDrawList {
                opaque: vec![DrawBatch {
                    mesh: MeshHandle(3),
                    index_count: 6,
                    index_offset: 0,
                    batch_index: 0,
                    material_index: 0,
                    bone_index: None,
                    instance_count: 1,
                    selected: false,
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        data.point_shadows = vec![PointShadowConstantBuffer::default(); 12];
        for face in &mut data.point_shadows[6..] {
            face.point_light_far = 10.0;
        }

        backend.take_commands();
        graph.execute(&mut backend, FrameInputs::new(&frame, &data)).unwrap();
        let layers: Vec<u32> = backend
            .take_commands()
            .iter()
            .filter_map(|command| match command {
                BackendCommand::SetRenderTarget { layer, .. } => Some(*layer),
                _ => None,
            })
            .collect();
        // directional sub-pass first, then one target per cube face
        assert_eq!(layers, vec![0, 6, 7, 8, 9, 10, 11]);
    }
}
