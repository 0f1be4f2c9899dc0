//! Per-solid working memory: the node arena plus clip-vertex and flag scratch.

use crate::bsp::node::NodePool;
use crate::clip::VertexPool;
use tracing::{debug, warn};

/// Memory owned by one solid. Builds reuse the scratch between calls;
/// [`MemCache::clear_temp`] recycles it and [`MemCache::clear_all`] recycles
/// everything, reporting any accounting mismatch.
#[derive(Debug, Clone, Default)]
pub struct MemCache {
    pub nodes: NodePool,
    pub vertices: VertexPool,
    /// Per-surface classification flags of the current split.
    pub surface_flags: Vec<u8>,
    /// Flags of the candidate surface being scored.
    pub surface_test_flags: Vec<u8>,
}

impl MemCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recycle transient scratch. Nodes are kept.
    pub fn clear_temp(&mut self) {
        let leaked = self.vertices.clear();
        if leaked != 0 {
            warn!(leaked, "clip vertices still borrowed when scratch was cleared");
        }
        self.surface_flags.clear();
        self.surface_test_flags.clear();
    }

    /// Recycle everything, nodes included. Any node still borrowed or released
    /// twice is reported.
    pub fn clear_all(&mut self) {
        self.clear_temp();
        let (outstanding, double_frees) = self.nodes.clear();
        if outstanding != 0 {
            warn!(outstanding, "tree nodes not released before the arena was cleared");
        }
        if double_frees != 0 {
            warn!(double_frees, "tree nodes released more than once");
        }
        debug!("arena cleared");
    }
}
