//! End-to-end pipeline behaviour: one manager, one codec, fake host
//! capabilities, real packets.

use std::sync::{Arc, Mutex};

use miragemc_codec::{BlockId, BlockPos, ChunkCodec, ChunkDesc, ColumnPos, LegacyCodec};
use miragemc_context::{
    BlockRecord, ContextManager, ViewRefresher, ViewerId, ViewerPolicy, WorldId,
};
use miragemc_pipeline::{
    BlockChangePacket, BlockDigPacket, BlockFace, BlockPlacePacket, BulkColumn, ChunkBulkPacket,
    ChunkDataPacket, DigStatus, ManualTicker, MultiBlockChangePacket, PacketRewriter, PacketSink,
};

const STONE: BlockId = BlockId { material: 1, variant: 0 };
const DIRT: BlockId = BlockId { material: 3, variant: 0 };
const WOOL_LIME: BlockId = BlockId { material: 35, variant: 5 };

struct NoopRefresher;

impl ViewRefresher for NoopRefresher {
    fn refresh_for_viewer(&self, _: ViewerId, _: WorldId, _: &[ColumnPos]) {}
    fn refresh_for_all(&self, _: WorldId, _: &[ColumnPos]) {}
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(ViewerId, BlockChangePacket)>>,
}

impl PacketSink for RecordingSink {
    fn send_block_change(&self, viewer: ViewerId, packet: BlockChangePacket) {
        self.sent.lock().unwrap().push((viewer, packet));
    }
}

struct Harness {
    manager: Arc<ContextManager>,
    rewriter: PacketRewriter,
    ticker: Arc<ManualTicker>,
    sink: Arc<RecordingSink>,
    codec: LegacyCodec,
}

fn harness() -> Harness {
    let manager = Arc::new(ContextManager::new(Arc::new(NoopRefresher)));
    let ticker = Arc::new(ManualTicker::new());
    let sink = Arc::new(RecordingSink::default());
    let rewriter = PacketRewriter::new(
        manager.clone(),
        Arc::new(LegacyCodec),
        ticker.clone(),
        sink.clone(),
    );
    Harness { manager, rewriter, ticker, sink, codec: LegacyCodec }
}

/// A whole-column snapshot with every section present, filled with dirt.
fn dirt_chunk(world: WorldId, chunk_x: i32, chunk_z: i32) -> ChunkDataPacket {
    let codec = LegacyCodec;
    let desc = ChunkDesc {
        chunk_x,
        chunk_z,
        section_bitmask: 0xFFFF,
        continuous: true,
        has_sky_light: true,
    };
    let layout = codec.layout(&desc);
    let mut payload = vec![0u8; layout.total_len];
    for section in 0..16 {
        for y in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    codec.set_block(&desc, &mut payload, section, x, y, z, DIRT);
                }
            }
        }
    }
    ChunkDataPacket { world, desc, payload }
}

#[test]
fn scenario_a_non_viewer_sees_the_real_world() {
    let h = harness();
    let ctx = h
        .manager
        .create_context("disguise", WorldId(0), ViewerPolicy::Whitelist)
        .unwrap();
    ctx.set_block(BlockPos::new(10, 64, 10), STONE);

    let packet = dirt_chunk(WorldId(0), 0, 0);
    let p = ViewerId(1);

    // Empty whitelist: the override is visible to nobody.
    assert!(h.rewriter.rewrite_chunk_data(p, &packet).is_none());
    assert_eq!(
        h.codec.get_block(&packet.desc, &packet.payload, 4, 10, 0, 10),
        Some(DIRT)
    );
}

#[test]
fn scenario_b_listed_viewer_sees_the_override() {
    let h = harness();
    let ctx = h
        .manager
        .create_context("disguise", WorldId(0), ViewerPolicy::Whitelist)
        .unwrap();
    ctx.set_block(BlockPos::new(10, 64, 10), STONE);

    let p = ViewerId(1);
    assert!(h.manager.add_viewer("disguise", p).unwrap());

    let packet = dirt_chunk(WorldId(0), 0, 0);
    let rewritten = h.rewriter.rewrite_chunk_data(p, &packet).unwrap();
    // (10, 64, 10) lives in section 4 at rel y 0.
    assert_eq!(
        h.codec
            .get_block(&rewritten.desc, &rewritten.payload, 4, 10, 0, 10),
        Some(STONE)
    );
    // The shared original stays untouched for other recipients.
    assert_eq!(
        h.codec.get_block(&packet.desc, &packet.payload, 4, 10, 0, 10),
        Some(DIRT)
    );

    // The consolidated multi-block path agrees.
    let multi = MultiBlockChangePacket {
        world: WorldId(0),
        column: ColumnPos::new(0, 0),
        records: vec![BlockRecord { rel_x: 10, y: 64, rel_z: 10, id: DIRT }],
    };
    let rewritten = h.rewriter.rewrite_multi_block_change(p, &multi).unwrap();
    assert_eq!(rewritten.records[0].id, STONE);
    assert_eq!(multi.records[0].id, DIRT);
}

#[test]
fn scenario_c_air_override_with_ignores_air() {
    let h = harness();
    let ctx = h
        .manager
        .create_context("holes", WorldId(0), ViewerPolicy::Blacklist)
        .unwrap();
    h.manager.set_ignores_air("holes", true).unwrap();
    let pos = BlockPos::new(5, 70, 5);
    ctx.set_block(pos, BlockId::AIR);

    let p = ViewerId(1);
    assert!(ctx.is_visible_to(p));

    // The hidden air entry never reaches a packet.
    let change = BlockChangePacket { world: WorldId(0), pos, id: DIRT };
    assert!(h.rewriter.rewrite_block_change(p, &change).is_none());
    assert!(h.rewriter.rewrite_chunk_data(p, &dirt_chunk(WorldId(0), 0, 0)).is_none());

    // A later non-air set takes over the same entry.
    assert!(!ctx.set_block(pos, WOOL_LIME));
    let rewritten = h.rewriter.rewrite_block_change(p, &change).unwrap();
    assert_eq!(rewritten.id, WOOL_LIME);
}

#[test]
fn scenario_d_two_contexts_compose_on_one_clone() {
    let h = harness();
    let first = h
        .manager
        .create_context("first", WorldId(0), ViewerPolicy::Blacklist)
        .unwrap();
    let second = h
        .manager
        .create_context("second", WorldId(0), ViewerPolicy::Blacklist)
        .unwrap();
    first.set_block(BlockPos::new(1, 64, 1), STONE);
    second.set_block(BlockPos::new(2, 64, 2), WOOL_LIME);

    let p = ViewerId(1);
    let multi = MultiBlockChangePacket {
        world: WorldId(0),
        column: ColumnPos::new(0, 0),
        records: vec![
            BlockRecord { rel_x: 1, y: 64, rel_z: 1, id: DIRT },
            BlockRecord { rel_x: 2, y: 64, rel_z: 2, id: DIRT },
        ],
    };
    let rewritten = h.rewriter.rewrite_multi_block_change(p, &multi).unwrap();
    assert_eq!(rewritten.records[0].id, STONE);
    assert_eq!(rewritten.records[1].id, WOOL_LIME);
}

#[test]
fn later_registered_context_wins_shared_coordinates() {
    let h = harness();
    let first = h
        .manager
        .create_context("first", WorldId(0), ViewerPolicy::Blacklist)
        .unwrap();
    let second = h
        .manager
        .create_context("second", WorldId(0), ViewerPolicy::Blacklist)
        .unwrap();
    let pos = BlockPos::new(3, 40, 3);
    first.set_block(pos, STONE);
    second.set_block(pos, WOOL_LIME);

    let p = ViewerId(1);
    let change = BlockChangePacket { world: WorldId(0), pos, id: DIRT };
    assert_eq!(h.rewriter.rewrite_block_change(p, &change).unwrap().id, WOOL_LIME);
}

#[test]
fn bulk_rewrites_only_touched_columns() {
    let h = harness();
    let ctx = h
        .manager
        .create_context("a", WorldId(0), ViewerPolicy::Blacklist)
        .unwrap();
    ctx.set_block(BlockPos::new(10, 64, 10), STONE);

    let col0 = dirt_chunk(WorldId(0), 0, 0);
    let col1 = dirt_chunk(WorldId(0), 1, 0);
    let bulk = ChunkBulkPacket {
        world: WorldId(0),
        has_sky_light: true,
        columns: vec![
            BulkColumn {
                chunk_x: 0,
                chunk_z: 0,
                section_bitmask: col0.desc.section_bitmask,
                payload: col0.payload.clone(),
            },
            BulkColumn {
                chunk_x: 1,
                chunk_z: 0,
                section_bitmask: col1.desc.section_bitmask,
                payload: col1.payload.clone(),
            },
        ],
    };

    let rewritten = h.rewriter.rewrite_chunk_bulk(ViewerId(1), &bulk).unwrap();
    let desc0 = rewritten.columns[0].desc(true);
    assert_eq!(
        h.codec
            .get_block(&desc0, &rewritten.columns[0].payload, 4, 10, 0, 10),
        Some(STONE)
    );
    // The untouched neighbour column is byte-identical.
    assert_eq!(rewritten.columns[1].payload, bulk.columns[1].payload);
}

#[test]
fn oversized_payload_is_skipped_not_translated() {
    let h = harness();
    let ctx = h
        .manager
        .create_context("a", WorldId(0), ViewerPolicy::Blacklist)
        .unwrap();
    ctx.set_block(BlockPos::new(10, 64, 10), STONE);

    let mut packet = dirt_chunk(WorldId(0), 0, 0);
    packet.payload.truncate(100);
    assert!(h.rewriter.rewrite_chunk_data(ViewerId(1), &packet).is_none());
    assert_eq!(
        h.rewriter
            .metrics()
            .oversized_skipped
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

#[test]
fn dig_schedules_a_repair_packet_next_tick() {
    let h = harness();
    let ctx = h
        .manager
        .create_context("a", WorldId(0), ViewerPolicy::Blacklist)
        .unwrap();
    let pos = BlockPos::new(10, 64, 10);
    ctx.set_block(pos, STONE);

    let p = ViewerId(1);
    h.rewriter.handle_block_dig(
        p,
        &BlockDigPacket { world: WorldId(0), pos, status: DigStatus::Started },
    );

    // Nothing inline; the repair goes out on the next tick, to the digger
    // only.
    assert!(h.sink.sent.lock().unwrap().is_empty());
    assert_eq!(h.ticker.pending(), 1);
    h.ticker.run_pending();

    let sent = h.sink.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, p);
    assert_eq!(sent[0].1, BlockChangePacket { world: WorldId(0), pos, id: STONE });
}

#[test]
fn repair_is_a_noop_if_the_context_was_disposed() {
    let h = harness();
    let ctx = h
        .manager
        .create_context("a", WorldId(0), ViewerPolicy::Blacklist)
        .unwrap();
    let pos = BlockPos::new(10, 64, 10);
    ctx.set_block(pos, STONE);

    h.rewriter.handle_block_dig(
        ViewerId(1),
        &BlockDigPacket { world: WorldId(0), pos, status: DigStatus::Finished },
    );
    h.manager.dispose("a").unwrap();
    h.ticker.run_pending();
    assert!(h.sink.sent.lock().unwrap().is_empty());
}

#[test]
fn place_repairs_the_predicted_cell() {
    let h = harness();
    let ctx = h
        .manager
        .create_context("a", WorldId(0), ViewerPolicy::Blacklist)
        .unwrap();
    // Override sits above the clicked block, where the placed block lands.
    let clicked = BlockPos::new(10, 63, 10);
    let above = BlockPos::new(10, 64, 10);
    ctx.set_block(above, STONE);

    let p = ViewerId(1);
    h.rewriter.handle_block_place(
        p,
        &BlockPlacePacket { world: WorldId(0), pos: clicked, face: BlockFace::Up },
    );
    h.ticker.run_pending();

    let sent = h.sink.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.pos, above);
    assert_eq!(sent[0].1.id, STONE);
}

#[test]
fn broadcast_original_survives_per_recipient_rewrites() {
    let h = harness();
    let ctx = h
        .manager
        .create_context("a", WorldId(0), ViewerPolicy::Whitelist)
        .unwrap();
    let pos = BlockPos::new(7, 80, 7);
    ctx.set_block(pos, STONE);
    ctx.add_viewer(ViewerId(1));

    let packet = BlockChangePacket { world: WorldId(0), pos, id: DIRT };
    // Viewer 1 gets a clone, viewer 2 the original; the original is still
    // DIRT after both decisions.
    assert_eq!(h.rewriter.rewrite_block_change(ViewerId(1), &packet).unwrap().id, STONE);
    assert!(h.rewriter.rewrite_block_change(ViewerId(2), &packet).is_none());
    assert_eq!(packet.id, DIRT);
}
