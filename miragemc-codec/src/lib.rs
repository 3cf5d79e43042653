//! Wire-format codec for legacy chunk column snapshots.
//!
//! This crate is pure byte math: it knows how a chunk column payload is laid
//! out (block cells, packed light nibbles, optional sky light, trailing
//! biomes) and how to read/write a single block inside it. It knows nothing
//! about contexts, viewers or networking.

mod cursor;
mod layout;

pub use cursor::{BlockCursor, CursorPos};
pub use layout::{ChunkCodec, ChunkLayout, LegacyCodec};

/// Blocks per 16x16x16 section.
pub const SECTION_CELLS: usize = 4096;
/// Bytes of block data per section (2 bytes per cell).
pub const SECTION_BLOCK_BYTES: usize = SECTION_CELLS * 2;
/// Bytes of light data per section (4 bits per cell, two cells per byte).
pub const SECTION_LIGHT_BYTES: usize = SECTION_CELLS / 2;
/// Trailing biome table for a continuous column (one byte per x/z cell).
pub const BIOME_BYTES: usize = 256;
/// Sections per column.
pub const SECTIONS_PER_COLUMN: usize = 16;

/// A block's material plus its 4-bit variant value.
///
/// On the wire the pair is a single little-endian u16: low 12 bits material,
/// high 4 bits variant (the legacy combined-id encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId {
    pub material: u16,
    pub variant: u8,
}

impl BlockId {
    pub const AIR: BlockId = BlockId { material: 0, variant: 0 };

    pub fn new(material: u16, variant: u8) -> Self {
        Self { material: material & 0xFFF, variant: variant & 0xF }
    }

    pub fn is_air(&self) -> bool {
        self.material == 0
    }

    /// Pack into the combined id: low 12 bits material, high 4 bits variant.
    pub fn combined(&self) -> u16 {
        (self.material & 0xFFF) | ((self.variant as u16 & 0xF) << 12)
    }

    pub fn from_combined(combined: u16) -> Self {
        Self {
            material: combined & 0xFFF,
            variant: (combined >> 12) as u8,
        }
    }
}

/// Chunk column coordinates (world block coords divided by 16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnPos {
    pub x: i32,
    pub z: i32,
}

impl ColumnPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Column containing an absolute block coordinate.
    pub fn containing(block_x: i32, block_z: i32) -> Self {
        // Arithmetic shift keeps negative coordinates correct.
        Self { x: block_x >> 4, z: block_z >> 4 }
    }
}

/// An absolute block position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn column(&self) -> ColumnPos {
        ColumnPos::containing(self.x, self.z)
    }

    /// Vertical section index (0..16) for a legacy-height world.
    pub fn section_index(&self) -> u8 {
        ((self.y >> 4) & 0xF) as u8
    }

    pub fn rel_x(&self) -> u8 {
        (self.x & 0xF) as u8
    }

    pub fn rel_y(&self) -> u8 {
        (self.y & 0xF) as u8
    }

    pub fn rel_z(&self) -> u8 {
        (self.z & 0xF) as u8
    }
}

/// Header of a chunk column snapshot as it appears on the wire.
///
/// Bit i of `section_bitmask` set means vertical section i is present in the
/// payload. `continuous` means the payload describes the whole column and
/// carries the trailing biome table. `has_sky_light` is an environment
/// property (dimensions without a sky omit the sky-light region entirely).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDesc {
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub section_bitmask: u16,
    pub continuous: bool,
    pub has_sky_light: bool,
}

impl ChunkDesc {
    pub fn column(&self) -> ColumnPos {
        ColumnPos::new(self.chunk_x, self.chunk_z)
    }

    pub fn section_count(&self) -> usize {
        self.section_bitmask.count_ones() as usize
    }

    pub fn has_section(&self, section: u8) -> bool {
        section < 16 && self.section_bitmask & (1 << section) != 0
    }

    /// Position of a present section within each packed data region:
    /// the number of present sections below it.
    pub fn section_ordinal(&self, section: u8) -> usize {
        let below = self.section_bitmask & ((1u32 << section) as u16).wrapping_sub(1);
        below.count_ones() as usize
    }
}
