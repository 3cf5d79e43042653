//! The four outgoing packet shapes the pipeline rewrites, plus the two
//! inbound interaction packets it watches.
//!
//! Clone depth is the copy-on-write contract: `clone()` on any of these
//! deep-copies the payload bytes and record vectors, so a rewritten clone
//! never aliases the shared original that other recipients receive.

use miragemc_codec::{BlockId, BlockPos, ChunkDesc, ColumnPos};
use miragemc_context::{BlockRecord, WorldId};

/// A single block update for one coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockChangePacket {
    pub world: WorldId,
    pub pos: BlockPos,
    pub id: BlockId,
}

/// One consolidated message of block updates within a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiBlockChangePacket {
    pub world: WorldId,
    pub column: ColumnPos,
    pub records: Vec<BlockRecord>,
}

/// A full or partial column snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDataPacket {
    pub world: WorldId,
    pub desc: ChunkDesc,
    pub payload: Vec<u8>,
}

/// One column inside a bulk message. Bulk columns are always whole-column
/// sends, so their descriptors are continuous; the sky-light flag is carried
/// once on the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkColumn {
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub section_bitmask: u16,
    pub payload: Vec<u8>,
}

impl BulkColumn {
    pub fn desc(&self, has_sky_light: bool) -> ChunkDesc {
        ChunkDesc {
            chunk_x: self.chunk_x,
            chunk_z: self.chunk_z,
            section_bitmask: self.section_bitmask,
            continuous: true,
            has_sky_light,
        }
    }
}

/// Several column snapshots batched into one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkBulkPacket {
    pub world: WorldId,
    pub has_sky_light: bool,
    pub columns: Vec<BulkColumn>,
}

/// Which face of a block an interaction targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFace {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

impl BlockFace {
    /// The neighbouring coordinate on this face.
    pub fn offset(&self, pos: BlockPos) -> BlockPos {
        let (dx, dy, dz) = match self {
            BlockFace::Down => (0, -1, 0),
            BlockFace::Up => (0, 1, 0),
            BlockFace::North => (0, 0, -1),
            BlockFace::South => (0, 0, 1),
            BlockFace::West => (-1, 0, 0),
            BlockFace::East => (1, 0, 0),
        };
        BlockPos::new(pos.x + dx, pos.y + dy, pos.z + dz)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigStatus {
    Started,
    Cancelled,
    Finished,
}

/// Inbound: a player is digging a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDigPacket {
    pub world: WorldId,
    pub pos: BlockPos,
    pub status: DigStatus,
}

/// Inbound: a player placed a block against a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPlacePacket {
    pub world: WorldId,
    pub pos: BlockPos,
    pub face: BlockFace,
}
