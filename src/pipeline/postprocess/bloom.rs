//! Bloom mip chain
//!
//! One compute pass with thirteen sub-passes: a setup step that extracts the
//! bright parts of the lit image into mip 0, six downsample steps and six
//! upsample steps back up the chain.

use crate::backend::*;
use crate::pipeline::{dispatch_size, RenderGraphBuilderConfig, PASS_BLOOM};
use crate::render_graph::*;

const MIP_COUNT: u32 = BLOOM_MIP_CHAIN_MAX as u32;

/// Sub-passes in the bloom pass
pub const BLOOM_STEP_COUNT: u32 = 2 * (MIP_COUNT - 1) + 1;

/// What one bloom sub-pass reads, writes and binds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomStep {
    pub pipeline: PipelineStateName,
    /// Mip sampled by the step; `None` samples the lit image
    pub input: Option<u8>,
    /// Mip written through the UAV
    pub output: u8,
    /// Element of the per-batch constant buffer holding the mip indices
    pub batch_slot: u32,
}

/// Decode a bloom sub-pass id
///
/// # Panics
/// Panics if `id` is not below [`BLOOM_STEP_COUNT`].
pub fn bloom_step(id: u32) -> BloomStep {
    assert!(id < BLOOM_STEP_COUNT, "bloom step {} out of range", id);

    if id == 0 {
        BloomStep {
            pipeline: PipelineStateName::BloomSetup,
            input: None,
            output: 0,
            batch_slot: 0,
        }
    } else if id < MIP_COUNT {
        BloomStep {
            pipeline: PipelineStateName::BloomDownsample,
            input: Some(id as u8 - 1),
            output: id as u8,
            batch_slot: id,
        }
    } else {
        let mip = BLOOM_STEP_COUNT - id;
        BloomStep {
            pipeline: PipelineStateName::BloomUpsample,
            input: Some(mip as u8),
            output: mip as u8 - 1,
            batch_slot: mip + MIP_COUNT,
        }
    }
}

pub fn add_bloom_pass(graph: &mut RenderGraphBuilder, config: &RenderGraphBuilderConfig) {
    let mut pass = PassBuilder::new(PASS_BLOOM).read(ReadAccess::Srv, ResourceName::Lighting);

    let (mut width, mut height) = (config.frame_width, config.frame_height);
    for mip in 0..BLOOM_MIP_CHAIN_MAX {
        if width <= 1 || height <= 1 {
            log::warn!("Bloom mip {} collapses to {}x{}", mip, width.max(1), height.max(1));
        }
        let desc = GpuTextureDesc::attachment(
            AttachmentType::Color2D,
            PixelFormat::R16G16B16A16_FLOAT,
            width.max(1),
            height.max(1),
            1,
        )
        .with_unordered_access();
        pass = pass.create_with_sampler(
            ResourceName::BloomMip(mip),
            desc,
            SamplerDesc::linear_clamp(),
        );
        width /= 2;
        height /= 2;
    }

    for id in 0..BLOOM_STEP_COUNT {
        let step = bloom_step(id);
        pass = pass.draw_pass(DrawPassDecl::new(id).uav(ResourceName::BloomMip(step.output)));
    }

    graph.add_pass(pass.set_execute_func(|ctx| {
        let step = bloom_step(ctx.draw_pass.id);
        let input_name = step.input.map_or(ResourceName::Lighting, ResourceName::BloomMip);
        let Some(input) = ctx.require(input_name) else {
            return;
        };
        let Some(output) = ctx.require(ResourceName::BloomMip(step.output)) else {
            return;
        };

        // upsampling covers the larger output, the other steps their input
        let (width, height) = match step.pipeline {
            PipelineStateName::BloomUpsample => (output.width(), output.height()),
            _ => (input.width(), input.height()),
        };
        let (x, y) = dispatch_size(width, height);

        ctx.backend.set_pipeline_state(step.pipeline);
        let frame = ctx.frame;
        ctx.bind_slot(&frame.batch, step.batch_slot);

        let slot = ResourceName::BloomMip(0).slot();
        ctx.backend.bind_texture(Dimension::Texture2D, input.handle, slot);
        ctx.backend.dispatch(x, y, 1);
        ctx.backend.unbind_texture(Dimension::Texture2D, slot);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_decoding() {
        assert_eq!(bloom_step(0).input, None);
        assert_eq!(bloom_step(0).output, 0);

        let down = bloom_step(6);
        assert_eq!(down.pipeline, PipelineStateName::BloomDownsample);
        assert_eq!((down.input, down.output, down.batch_slot), (Some(5), 6, 6));

        let first_up = bloom_step(7);
        assert_eq!(first_up.pipeline, PipelineStateName::BloomUpsample);
        assert_eq!((first_up.input, first_up.output, first_up.batch_slot), (Some(6), 5, 13));

        let last_up = bloom_step(12);
        assert_eq!((last_up.input, last_up.output, last_up.batch_slot), (Some(1), 0, 8));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_step_out_of_range() {
        bloom_step(BLOOM_STEP_COUNT);
    }

    #[test]
    fn test_mip_chain_halves() {
        let mut graph = RenderGraphBuilder::new();
        graph.add_pass(
            PassBuilder::new("p:lighting")
                .create(
                    ResourceName::Lighting,
                    GpuTextureDesc::attachment(
                        AttachmentType::Color2D,
                        PixelFormat::R16G16B16A16_FLOAT,
                        640,
                        360,
                        1,
                    ),
                )
                .write(WriteAccess::Rtv, ResourceName::Lighting),
        );
        let config = RenderGraphBuilderConfig::default().with_frame_size(640, 360);
        add_bloom_pass(&mut graph, &config);

        let mut backend = RecordingBackend::new();
        let graph = graph.compile(&mut backend).unwrap();
        let mip = |n: u8| graph.resources().find_texture(ResourceName::BloomMip(n)).unwrap();
        assert_eq!((mip(0).width(), mip(0).height()), (640, 360));
        assert_eq!((mip(3).width(), mip(3).height()), (80, 45));
        assert_eq!((mip(6).width(), mip(6).height()), (10, 5));

        let bloom = graph.find_pass(PASS_BLOOM).unwrap();
        assert_eq!(bloom.draw_passes().len(), BLOOM_STEP_COUNT as usize);
        assert!(bloom.draw_passes().iter().all(|draw_pass| !draw_pass.has_attachments()));
    }
}
