//! Shared application state
//!
//! Every handler receives one cloneable handle bundle. The wiring module
//! (binary main, or a test harness) constructs each dependency exactly once
//! and injects it here; there are no process-wide singletons.

use crate::blast::BlastRadiusAnalyzer;
use crate::config::EngineConfig;
use crate::events::EventBus;
use crate::lineage::LineageStore;
use crate::pipeline::IntegrityPipeline;
use crate::retrieval::RetrievalAdapter;
use crate::vault::QuarantineVault;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EngineConfig>,
    pub pipeline: Arc<IntegrityPipeline>,
    pub vault: Arc<QuarantineVault>,
    pub blast: Arc<BlastRadiusAnalyzer>,
    pub adapter: Arc<RetrievalAdapter>,
    pub lineage: Arc<LineageStore>,
    pub bus: EventBus,
    pub started_at: Instant,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<EngineConfig>,
        pipeline: Arc<IntegrityPipeline>,
        vault: Arc<QuarantineVault>,
        blast: Arc<BlastRadiusAnalyzer>,
        adapter: Arc<RetrievalAdapter>,
        lineage: Arc<LineageStore>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            pipeline,
            vault,
            blast,
            adapter,
            lineage,
            bus,
            started_at: Instant::now(),
        }
    }
}
