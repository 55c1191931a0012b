//! Post-processing effects

pub mod bloom;
pub mod tonemapping;

pub use bloom::{add_bloom_pass, bloom_step, BloomStep, BLOOM_STEP_COUNT};
pub use tonemapping::{add_post_process_pass, POST_PROCESS_FORMAT};
