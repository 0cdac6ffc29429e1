//! API shared state

use crate::merge::MergeEngine;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Single entry point for reading and writing metric state
    pub engine: MergeEngine,
}

impl ApiState {
    pub fn new(engine: MergeEngine) -> Self {
        Self { engine }
    }
}
