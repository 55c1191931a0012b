//! Shared helpers for the integration tests.

use framegraph_engine::backend::*;
use framegraph_engine::render_graph::*;

/// Install a test logger once per binary
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Small color target, so graphs compile quickly
#[allow(dead_code)]
pub fn color_target() -> GpuTextureDesc {
    GpuTextureDesc::attachment(AttachmentType::Color2D, PixelFormat::R16G16B16A16_FLOAT, 32, 32, 1)
}

/// Position of `pass` in the compiled order
#[allow(dead_code)]
pub fn position(graph: &RenderGraph, pass: &str) -> usize {
    graph
        .pass_order()
        .iter()
        .position(|name| *name == pass)
        .unwrap_or_else(|| panic!("pass '{}' is not in the graph", pass))
}

/// Every edge in the compiled graph goes forward in pass order
#[allow(dead_code)]
pub fn assert_edges_respect_order(graph: &RenderGraph) {
    for (from, to) in graph.dependencies() {
        assert!(
            position(graph, from) < position(graph, to),
            "edge {} -> {} runs backwards",
            from,
            to
        );
    }
}
