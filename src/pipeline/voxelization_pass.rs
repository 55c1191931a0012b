//! Voxel cone tracing input
//!
//! Rasterizes the scene into two 3D volumes, lit albedo and normals, which
//! the lighting pass then cone traces for indirect light.

use crate::backend::*;
use crate::pipeline::gbuffer_pass::draw_batches;
use crate::pipeline::{RenderGraphBuilderConfig, PASS_VOXELIZATION};
use crate::render_graph::*;

pub const VOXEL_FORMAT: PixelFormat = PixelFormat::R16G16B16A16_FLOAT;

/// Work group edge of the clear and post-process compute shaders
pub const COMPUTE_LOCAL_SIZE_VOXEL: u32 = 4;

pub const VOXEL_TEXTURES: [ResourceName; 2] =
    [ResourceName::VoxelLighting, ResourceName::VoxelNormal];

pub fn add_voxelization_pass(graph: &mut RenderGraphBuilder, config: &RenderGraphBuilderConfig) {
    let size = config.voxel_size;
    let mut pass = PassBuilder::new(PASS_VOXELIZATION);
    for name in VOXEL_TEXTURES {
        pass = pass
            .create_with_sampler(
                name,
                GpuTextureDesc::volume(VOXEL_FORMAT, size),
                SamplerDesc::volume(),
            )
            .write(WriteAccess::Uav, name);
    }
    if config.enable_shadow {
        pass = pass.read(ReadAccess::Srv, ResourceName::ShadowMap);
        if config.enable_point_shadow {
            pass = pass.read(ReadAccess::Srv, ResourceName::PointShadow);
        }
    }

    graph.add_pass(pass.set_execute_func(move |ctx| {
        let data = ctx.data;
        let Some(voxel_pass) = &data.voxel_pass else {
            return;
        };

        let groups = (size / COMPUTE_LOCAL_SIZE_VOXEL).max(1);
        ctx.backend.set_pipeline_state(PipelineStateName::VoxelizationPre);
        ctx.backend.dispatch(groups, groups, groups);

        let frame = ctx.frame;
        ctx.bind_slot(&frame.pass, voxel_pass.pass_index);
        ctx.backend.set_viewport(Viewport::new(size, size));
        ctx.backend.set_pipeline_state(PipelineStateName::Voxelization);
        draw_batches(ctx, &voxel_pass.opaque, true);
        draw_batches(ctx, &voxel_pass.transparent, true);
        draw_batches(ctx, &voxel_pass.double_sided, true);

        ctx.backend.set_pipeline_state(PipelineStateName::VoxelizationPost);
        ctx.backend.dispatch(groups, groups, groups);

        for name in VOXEL_TEXTURES {
            if let Some(volume) = ctx.require(name) {
                ctx.backend.generate_mipmap(volume.handle);
            }
        }
    }));
}
