//! Deferred lighting
//!
//! Shades the G-buffer with a fullscreen quad, then draws the sky and the
//! transparent batches forward into the same target, depth tested against the
//! G-buffer depth.

use crate::backend::*;
use crate::pipeline::gbuffer_pass::{draw_batches, GBUFFER_TARGETS};
use crate::pipeline::{RenderGraphBuilderConfig, PASS_LIGHTING};
use crate::render_graph::*;

pub const LIGHTING_FORMAT: PixelFormat = PixelFormat::R16G16B16A16_FLOAT;

pub fn add_lighting_pass(graph: &mut RenderGraphBuilder, config: &RenderGraphBuilderConfig) {
    let mut pass = PassBuilder::new(PASS_LIGHTING)
        .create(
            ResourceName::Lighting,
            GpuTextureDesc::attachment(
                AttachmentType::Color2D,
                LIGHTING_FORMAT,
                config.frame_width,
                config.frame_height,
                1,
            ),
        )
        .write(WriteAccess::Rtv, ResourceName::Lighting)
        .write(WriteAccess::Dsv, ResourceName::Depth)
        .import(ResourceName::BrdfLut, |table| table.find_asset(BRDF_LUT_PATH))
        .read(ReadAccess::Srv, ResourceName::BrdfLut);

    for name in GBUFFER_TARGETS {
        pass = pass.read(ReadAccess::Srv, name);
    }
    if config.enable_shadow {
        pass = pass.read(ReadAccess::Srv, ResourceName::ShadowMap);
        if config.enable_point_shadow {
            pass = pass.read(ReadAccess::Srv, ResourceName::PointShadow);
        }
    }
    if config.enable_ibl {
        pass = pass
            .read(ReadAccess::Srv, ResourceName::EnvCube)
            .read(ReadAccess::Srv, ResourceName::DiffuseCube)
            .read(ReadAccess::Srv, ResourceName::PrefilteredCube);
    }
    if config.enable_vxgi {
        pass = pass
            .read(ReadAccess::Srv, ResourceName::VoxelLighting)
            .read(ReadAccess::Srv, ResourceName::VoxelNormal);
    }

    graph.add_pass(pass.set_execute_func(|ctx| {
        ctx.set_render_target();
        ctx.clear(ClearFlags::COLOR, [0.0, 0.0, 0.0, 1.0]);

        if !ctx.resources.contains(ResourceName::BrdfLut) {
            log::debug!("{}: BRDF lookup table is not uploaded yet", ctx.pass_name);
            return;
        }

        ctx.backend.set_pipeline_state(PipelineStateName::Lighting);
        ctx.draw_quad();

        let data = ctx.data;
        let frame = ctx.frame;
        ctx.bind_slot(&frame.pass, data.main_pass.pass_index);

        if ctx.is_ready(ResourceName::EnvCube) {
            ctx.backend.set_pipeline_state(PipelineStateName::EnvSkybox);
            ctx.draw_skybox();
        }

        ctx.backend.set_pipeline_state(PipelineStateName::ForwardTransparent);
        draw_batches(ctx, &data.main_pass.transparent, true);
    }));
}
