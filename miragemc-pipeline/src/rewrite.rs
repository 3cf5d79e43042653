//! The network-facing rewrite stage.
//!
//! Every method here runs on whatever thread the host's network layer uses
//! for the recipient. The pipeline is strictly read-only against contexts:
//! it takes read locks, never mutates shared packet objects, and hands back
//! an owned clone when (and only when) something actually changed.

use std::sync::{Arc, Once};

use miragemc_codec::{BlockId, BlockPos, ChunkCodec};
use miragemc_context::{Context, ContextManager, ViewerId, WorldId};

use crate::metrics::RewriteMetrics;
use crate::packet::{
    BlockChangePacket, BlockDigPacket, BlockPlacePacket, ChunkBulkPacket, ChunkDataPacket,
    MultiBlockChangePacket,
};
use crate::schedule::{PacketSink, TickScheduler};

static OVERSIZE_WARNED: Once = Once::new();

pub struct PacketRewriter {
    contexts: Arc<ContextManager>,
    codec: Arc<dyn ChunkCodec>,
    scheduler: Arc<dyn TickScheduler>,
    sink: Arc<dyn PacketSink>,
    metrics: Arc<RewriteMetrics>,
}

impl PacketRewriter {
    pub fn new(
        contexts: Arc<ContextManager>,
        codec: Arc<dyn ChunkCodec>,
        scheduler: Arc<dyn TickScheduler>,
        sink: Arc<dyn PacketSink>,
    ) -> Self {
        Self {
            contexts,
            codec,
            scheduler,
            sink,
            metrics: Arc::new(RewriteMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<RewriteMetrics> {
        self.metrics.clone()
    }

    /// Contexts whose overrides touch the packet's column and whose policy
    /// shows them to this recipient, in registration order.
    fn applicable(
        &self,
        world: WorldId,
        column: miragemc_codec::ColumnPos,
        viewer: ViewerId,
    ) -> Vec<Arc<Context>> {
        self.contexts
            .contexts_touching_chunk(world, column)
            .into_iter()
            .filter(|ctx| ctx.is_visible_to(viewer))
            .collect()
    }

    /// The override this viewer should see at one coordinate. With several
    /// applicable contexts the last-registered one wins, matching the
    /// multi-block composition order.
    fn override_for(&self, world: WorldId, pos: BlockPos, viewer: ViewerId) -> Option<BlockId> {
        if !self.contexts.has_contexts_in_world(world) {
            return None;
        }
        self.applicable(world, pos.column(), viewer)
            .iter()
            .filter_map(|ctx| ctx.visible_block(pos))
            .last()
    }

    /// Single block change: pass through untouched unless an override is
    /// visible to this recipient, in which case a clone with the substituted
    /// id is returned for sending instead.
    pub fn rewrite_block_change(
        &self,
        viewer: ViewerId,
        packet: &BlockChangePacket,
    ) -> Option<BlockChangePacket> {
        self.metrics.record_inspected();
        let id = self.override_for(packet.world, packet.pos, viewer)?;
        if id == packet.id {
            return None;
        }
        self.metrics.record_rewritten();
        let mut clone = packet.clone();
        clone.id = id;
        Some(clone)
    }

    /// Multi block change: every applicable context composes on one clone,
    /// in registration order; the last write per coordinate wins.
    pub fn rewrite_multi_block_change(
        &self,
        viewer: ViewerId,
        packet: &MultiBlockChangePacket,
    ) -> Option<MultiBlockChangePacket> {
        self.metrics.record_inspected();
        if !self.contexts.has_contexts_in_world(packet.world) {
            return None;
        }
        let applicable = self.applicable(packet.world, packet.column, viewer);
        if applicable.is_empty() {
            return None;
        }

        let mut clone = packet.clone();
        for ctx in &applicable {
            ctx.translate_records(packet.column, &mut clone.records);
        }
        if clone.records == packet.records {
            return None;
        }
        self.metrics.record_rewritten();
        Some(clone)
    }

    /// Full column snapshot: applies every visible override straight into a
    /// cloned payload. A payload shorter than the layout the header claims
    /// is skipped rather than translated.
    pub fn rewrite_chunk_data(
        &self,
        viewer: ViewerId,
        packet: &ChunkDataPacket,
    ) -> Option<ChunkDataPacket> {
        self.metrics.record_inspected();
        if !self.contexts.has_contexts_in_world(packet.world) {
            return None;
        }
        let applicable = self.applicable(packet.world, packet.desc.column(), viewer);
        if applicable.is_empty() {
            return None;
        }
        if !self.check_payload(&packet.desc, packet.payload.len()) {
            return None;
        }

        let mut clone = packet.clone();
        for ctx in &applicable {
            ctx.translate_chunk(self.codec.as_ref(), &clone.desc, &mut clone.payload);
        }
        if clone.payload == packet.payload {
            // Every touching override was filtered out (air-only context).
            return None;
        }
        self.metrics.record_rewritten();
        Some(clone)
    }

    /// Bulk snapshot: each contained column is handled like a chunk-data
    /// packet; the envelope is cloned once if any column needs rewriting.
    pub fn rewrite_chunk_bulk(
        &self,
        viewer: ViewerId,
        packet: &ChunkBulkPacket,
    ) -> Option<ChunkBulkPacket> {
        self.metrics.record_inspected();
        if !self.contexts.has_contexts_in_world(packet.world) {
            return None;
        }

        let mut clone: Option<ChunkBulkPacket> = None;
        for (i, column) in packet.columns.iter().enumerate() {
            let desc = column.desc(packet.has_sky_light);
            let applicable = self.applicable(packet.world, desc.column(), viewer);
            if applicable.is_empty() {
                continue;
            }
            if !self.check_payload(&desc, column.payload.len()) {
                continue;
            }
            let target = clone.get_or_insert_with(|| packet.clone());
            for ctx in &applicable {
                ctx.translate_chunk(self.codec.as_ref(), &desc, &mut target.columns[i].payload);
            }
        }
        let clone = clone.filter(|rewritten| rewritten != packet);
        if clone.is_some() {
            self.metrics.record_rewritten();
        }
        clone
    }

    /// Inbound dig: the client predicts the real block locally, so if the
    /// coordinate carries a visible override for the digger, re-assert it on
    /// the next tick.
    pub fn handle_block_dig(&self, viewer: ViewerId, packet: &BlockDigPacket) {
        self.schedule_repair(viewer, packet.world, packet.pos);
    }

    /// Inbound place: client prediction puts the placed block in the cell
    /// adjacent to the clicked face.
    pub fn handle_block_place(&self, viewer: ViewerId, packet: &BlockPlacePacket) {
        self.schedule_repair(viewer, packet.world, packet.face.offset(packet.pos));
        self.schedule_repair(viewer, packet.world, packet.pos);
    }

    fn schedule_repair(&self, viewer: ViewerId, world: WorldId, pos: BlockPos) {
        if self.override_for(world, pos, viewer).is_none() {
            return;
        }
        self.metrics.record_repair();

        let contexts = self.contexts.clone();
        let sink = self.sink.clone();
        // The override is looked up again when the tick fires: a context
        // disposed in the meantime makes this a no-op.
        self.scheduler.schedule_next_tick(Box::new(move || {
            let applicable: Vec<_> = contexts
                .contexts_touching_chunk(world, pos.column())
                .into_iter()
                .filter(|ctx| ctx.is_visible_to(viewer))
                .collect();
            let Some(id) = applicable.iter().filter_map(|ctx| ctx.visible_block(pos)).last()
            else {
                return;
            };
            sink.send_block_change(viewer, BlockChangePacket { world, pos, id });
        }));
    }

    /// Defensive layout check before touching payload bytes. Never throws
    /// into the network pipeline; warns once, then stays quiet.
    fn check_payload(&self, desc: &miragemc_codec::ChunkDesc, payload_len: usize) -> bool {
        match self.codec.validate(desc, payload_len) {
            Ok(_) => true,
            Err(err) => {
                self.metrics.record_oversized();
                OVERSIZE_WARNED.call_once(|| {
                    log::warn!("skipping chunk translation, payload/layout mismatch: {err}");
                });
                log::debug!("payload/layout mismatch: {err}");
                false
            }
        }
    }
}
