//! Image based lighting bake
//!
//! Three passes turn the sky image into the cubemaps the lighting pass
//! samples: the environment cube itself, its diffuse irradiance, and the
//! specular prefiltered mip chain. They only do work on frames that ask for a
//! bake through `RenderData::bake_ibl`, and every cube stays unreadable to
//! other passes until its first bake has written it.

use crate::backend::*;
use crate::pipeline::{PASS_DIFFUSE, PASS_ENV_SKYBOX, PASS_PREFILTERED};
use crate::render_graph::*;

pub const ENV_CUBE_SIZE: u32 = 512;
pub const DIFFUSE_CUBE_SIZE: u32 = 32;
pub const PREFILTERED_CUBE_SIZE: u32 = 512;

const CUBE_FORMAT: PixelFormat = PixelFormat::R16G16B16A16_FLOAT;
const CUBE_FACES: u32 = 6;

fn cube_desc(size: u32) -> GpuTextureDesc {
    GpuTextureDesc::attachment(AttachmentType::ColorCube, CUBE_FORMAT, size, size, CUBE_FACES)
}

pub fn add_environment_passes(graph: &mut RenderGraphBuilder) {
    let mut env_desc = cube_desc(ENV_CUBE_SIZE).with_mip_levels(IBL_MIP_CHAIN_MAX);
    env_desc.misc_flags |= ResourceMiscFlags::GENERATE_MIPS;

    graph.add_pass(
        PassBuilder::new(PASS_ENV_SKYBOX)
            .import(ResourceName::Ibl, |table| table.find_asset(IBL_IMAGE_PATH))
            .read(ReadAccess::Srv, ResourceName::Ibl)
            .create_baked(ResourceName::EnvCube, env_desc, SamplerDesc::linear_clamp())
            .write(WriteAccess::Rtv, ResourceName::EnvCube)
            .set_execute_func(|ctx| {
                if !ctx.data.bake_ibl {
                    return;
                }
                if !ctx.resources.contains(ResourceName::Ibl) {
                    log::debug!("{}: sky image is not uploaded yet", ctx.pass_name);
                    return;
                }

                ctx.backend.set_pipeline_state(PipelineStateName::EnvSkyboxToCubeMap);
                let frame = ctx.frame;
                for face in 0..CUBE_FACES {
                    ctx.set_render_target_at(face, 0);
                    ctx.bind_slot(&frame.batch, face);
                    ctx.draw_skybox();
                }

                if let Some(cube) = ctx.draw_pass.color_attachments.first() {
                    ctx.backend.generate_mipmap(cube.handle);
                }
                ctx.mark_ready(ResourceName::EnvCube);
            }),
    );

    graph.add_pass(
        PassBuilder::new(PASS_DIFFUSE)
            .read(ReadAccess::Srv, ResourceName::EnvCube)
            .create_baked(
                ResourceName::DiffuseCube,
                cube_desc(DIFFUSE_CUBE_SIZE),
                SamplerDesc::linear_clamp(),
            )
            .write(WriteAccess::Rtv, ResourceName::DiffuseCube)
            .set_execute_func(|ctx| {
                if !ctx.data.bake_ibl || !ctx.is_ready(ResourceName::EnvCube) {
                    return;
                }

                ctx.backend.set_pipeline_state(PipelineStateName::DiffuseIrradiance);
                let frame = ctx.frame;
                for face in 0..CUBE_FACES {
                    ctx.set_render_target_at(face, 0);
                    ctx.bind_slot(&frame.batch, face);
                    ctx.draw_skybox();
                }
                ctx.mark_ready(ResourceName::DiffuseCube);
            }),
    );

    graph.add_pass(
        PassBuilder::new(PASS_PREFILTERED)
            .read(ReadAccess::Srv, ResourceName::EnvCube)
            .create_baked(
                ResourceName::PrefilteredCube,
                cube_desc(PREFILTERED_CUBE_SIZE).with_mip_levels(IBL_MIP_CHAIN_MAX),
                SamplerDesc::linear_mipmap(),
            )
            .write(WriteAccess::Rtv, ResourceName::PrefilteredCube)
            .set_execute_func(|ctx| {
                if !ctx.data.bake_ibl || !ctx.is_ready(ResourceName::EnvCube) {
                    return;
                }

                ctx.backend.set_pipeline_state(PipelineStateName::Prefilter);
                let frame = ctx.frame;
                for mip in 0..IBL_MIP_CHAIN_MAX {
                    for face in 0..CUBE_FACES {
                        ctx.bind_slot(&frame.batch, mip * CUBE_FACES + face);
                        ctx.set_render_target_at(face, mip);
                        ctx.draw_skybox();
                    }
                }
                ctx.mark_ready(ResourceName::PrefilteredCube);
            }),
    );
}
