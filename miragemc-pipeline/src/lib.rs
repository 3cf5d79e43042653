//! Packet rewrite pipeline.
//!
//! Sits between the server's outgoing packet stream and the network layer:
//! for each recipient it decides whether any context override applies to a
//! chunk snapshot, bulk snapshot, single or multi block change, and if so
//! substitutes a rewritten clone. Inbound dig/place packets are watched so a
//! repair packet can undo client-side prediction one tick later.

mod metrics;
mod packet;
mod rewrite;
mod schedule;

pub use metrics::RewriteMetrics;
pub use packet::{
    BlockChangePacket, BlockDigPacket, BlockFace, BlockPlacePacket, BulkColumn, ChunkBulkPacket,
    ChunkDataPacket, DigStatus, MultiBlockChangePacket,
};
pub use rewrite::PacketRewriter;
pub use schedule::{ManualTicker, PacketSink, Task, TickScheduler, TokioTicker};
