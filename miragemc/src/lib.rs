//! Engine facade: wires the codec, context manager, rewrite pipeline and
//! region store together once, at startup, and threads them everywhere
//! explicitly. No process-wide singletons.

use std::sync::Arc;

use anyhow::Result;

pub use miragemc_codec as codec;
pub use miragemc_context as context;
pub use miragemc_pipeline as pipeline;
pub use miragemc_storage as storage;

use miragemc_codec::{ChunkCodec, LegacyCodec};
use miragemc_context::{Context, ContextManager, ViewRefresher, ViewerPolicy, WorldId};
use miragemc_pipeline::{PacketRewriter, PacketSink, TickScheduler};
use miragemc_storage::{RegionStore, WorldSampler, restore_region, snapshot_footprint};

pub struct Engine {
    codec: Arc<dyn ChunkCodec>,
    contexts: Arc<ContextManager>,
    rewriter: Arc<PacketRewriter>,
    store: Arc<dyn RegionStore>,
}

impl Engine {
    /// Build the engine against the host's capabilities. The codec is fixed
    /// here, once, for the protocol revision the host speaks.
    pub fn new(
        refresher: Arc<dyn ViewRefresher>,
        scheduler: Arc<dyn TickScheduler>,
        sink: Arc<dyn PacketSink>,
        store: Arc<dyn RegionStore>,
    ) -> Self {
        let codec: Arc<dyn ChunkCodec> = Arc::new(LegacyCodec);
        let contexts = Arc::new(ContextManager::new(refresher));
        let rewriter = Arc::new(PacketRewriter::new(
            contexts.clone(),
            codec.clone(),
            scheduler,
            sink,
        ));
        Self { codec, contexts, rewriter, store }
    }

    pub fn codec(&self) -> &Arc<dyn ChunkCodec> {
        &self.codec
    }

    pub fn contexts(&self) -> &Arc<ContextManager> {
        &self.contexts
    }

    pub fn rewriter(&self) -> &Arc<PacketRewriter> {
        &self.rewriter
    }

    pub fn store(&self) -> &Arc<dyn RegionStore> {
        &self.store
    }

    /// Persist the real-world blocks currently under a context's footprint,
    /// so the region can be restored after the overrides are gone.
    pub async fn save_region(&self, name: &str, sampler: &dyn WorldSampler) -> Result<usize> {
        let ctx = self
            .contexts
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no such context '{name}'"))?;
        let region = snapshot_footprint(sampler, &ctx);
        let count = region.blocks.len();
        self.store.save_region(&region).await?;
        Ok(count)
    }

    /// Create a context and stream a saved region into it. A load failure is
    /// reported once, with its reason, and leaves the context registered but
    /// empty rather than half-initialized.
    pub async fn restore_region(
        &self,
        name: &str,
        world: WorldId,
        policy: ViewerPolicy,
    ) -> Result<Arc<Context>> {
        let ctx = self.contexts.create_context(name, world, policy)?;
        match restore_region(self.store.as_ref(), name, &ctx).await {
            Ok(count) => log::info!("region '{name}' restored with {count} blocks"),
            Err(err) => {
                log::warn!("region '{name}' failed to load, context starts empty: {err:#}");
            }
        }
        Ok(ctx)
    }
}
