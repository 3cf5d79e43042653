//! Forward-only walk over every block of a column snapshot.

use crate::{ChunkDesc, SECTION_CELLS};

/// One cursor step: section-relative and absolute coordinates of the block
/// the cursor currently points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPos {
    pub section: u8,
    pub rel_x: u8,
    pub rel_y: u8,
    pub rel_z: u8,
    pub world_x: i32,
    pub world_y: i32,
    pub world_z: i32,
}

/// Iterates the blocks of every present section in (section, y, z, x) order.
///
/// Visits exactly `section_count() * 4096` positions; an empty bitmask yields
/// nothing.
pub struct BlockCursor {
    base_x: i32,
    base_z: i32,
    sections: Vec<u8>,
    step: usize,
}

impl BlockCursor {
    pub fn new(desc: &ChunkDesc) -> Self {
        let sections = (0..16u8).filter(|&s| desc.has_section(s)).collect();
        Self {
            base_x: desc.chunk_x * 16,
            base_z: desc.chunk_z * 16,
            sections,
            step: 0,
        }
    }
}

impl Iterator for BlockCursor {
    type Item = CursorPos;

    fn next(&mut self) -> Option<CursorPos> {
        let section = *self.sections.get(self.step / SECTION_CELLS)?;
        let cell = self.step % SECTION_CELLS;
        self.step += 1;

        let rel_y = (cell >> 8) as u8;
        let rel_z = ((cell >> 4) & 0xF) as u8;
        let rel_x = (cell & 0xF) as u8;
        Some(CursorPos {
            section,
            rel_x,
            rel_y,
            rel_z,
            world_x: self.base_x + rel_x as i32,
            world_y: section as i32 * 16 + rel_y as i32,
            world_z: self.base_z + rel_z as i32,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.sections.len() * SECTION_CELLS - self.step;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BlockCursor {}
