//! Sparse override storage, partitioned by column and 16x16x16 section.

use std::collections::HashMap;
use std::sync::Arc;

use miragemc_codec::{BlockId, BlockPos, ChunkCodec, ChunkDesc, ColumnPos};

/// One entry of a multi-block-change payload: column-relative x/z, absolute
/// y, and the block to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    pub rel_x: u8,
    pub y: u8,
    pub rel_z: u8,
    pub id: BlockId,
}

/// Packed in-section key: y in the high bits, then z, then x. Matches the
/// codec's cell order so batches come out in wire order.
#[inline]
fn section_key(rel_x: u8, rel_y: u8, rel_z: u8) -> u16 {
    ((rel_y as u16) << 8) | ((rel_z as u16) << 4) | rel_x as u16
}

#[derive(Debug, Default)]
struct ColumnOverrides {
    sections: HashMap<u8, HashMap<u16, BlockId>>,
    /// Memoized multi-block-change payload for this column. Cleared on any
    /// block change, rebuilt on demand.
    batch: Option<Arc<Vec<BlockRecord>>>,
}

impl ColumnOverrides {
    fn set(&mut self, section: u8, key: u16, id: BlockId) -> SetOutcome {
        let cells = self.sections.entry(section).or_default();
        match cells.insert(key, id) {
            None => SetOutcome { created: true, changed: true },
            Some(old) => SetOutcome { created: false, changed: old != id },
        }
    }

    fn get(&self, section: u8, key: u16) -> Option<BlockId> {
        self.sections.get(&section)?.get(&key).copied()
    }

    fn build_batch(&self, skip_air: bool) -> Vec<BlockRecord> {
        let mut records = Vec::new();
        let mut sections: Vec<_> = self.sections.iter().collect();
        sections.sort_by_key(|(section, _)| **section);
        for (section, cells) in sections {
            let mut keys: Vec<_> = cells.keys().copied().collect();
            keys.sort_unstable();
            for key in keys {
                let id = cells[&key];
                if skip_air && id.is_air() {
                    continue;
                }
                records.push(BlockRecord {
                    rel_x: (key & 0xF) as u8,
                    y: (*section as u16 * 16 + (key >> 8)) as u8,
                    rel_z: ((key >> 4) & 0xF) as u8,
                    id,
                });
            }
        }
        records
    }
}

#[derive(Debug, Clone, Copy)]
struct SetOutcome {
    created: bool,
    changed: bool,
}

/// Coordinate -> substituted block, for one context.
///
/// Lookups outside any tracked column resolve through the column map in
/// O(1). Counts with and without air entries are kept incrementally.
#[derive(Debug, Default)]
pub struct OverrideTable {
    columns: HashMap<ColumnPos, ColumnOverrides>,
    total: usize,
    non_air: usize,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert. Returns true iff the entry was newly created.
    /// Writing the same value an entry already holds leaves the column's
    /// cached batch intact.
    pub fn set(&mut self, pos: BlockPos, id: BlockId) -> bool {
        if !(0..256).contains(&pos.y) {
            debug_assert!(false, "override y {} out of column range", pos.y);
            return false;
        }
        let column = self.columns.entry(pos.column()).or_default();
        let key = section_key(pos.rel_x(), pos.rel_y(), pos.rel_z());
        let old_id = column.get(pos.section_index(), key);
        let outcome = column.set(pos.section_index(), key, id);
        if outcome.changed {
            column.batch = None;
            if outcome.created {
                self.total += 1;
                if !id.is_air() {
                    self.non_air += 1;
                }
            } else {
                // Overwrite: adjust the non-air count if airness flipped.
                let was_air = old_id.is_some_and(|o| o.is_air());
                match (was_air, id.is_air()) {
                    (true, false) => self.non_air += 1,
                    (false, true) => self.non_air -= 1,
                    _ => {}
                }
            }
        }
        outcome.created
    }

    /// Raw point lookup at an absolute coordinate. Air entries are returned
    /// as stored; the ignores-air filter is the context's concern.
    pub fn get(&self, pos: BlockPos) -> Option<BlockId> {
        let column = self.columns.get(&pos.column())?;
        column.get(
            pos.section_index(),
            section_key(pos.rel_x(), pos.rel_y(), pos.rel_z()),
        )
    }

    /// Chunk-relative lookup within a known column.
    pub fn get_relative(&self, column: ColumnPos, rel_x: u8, y: u8, rel_z: u8) -> Option<BlockId> {
        self.columns
            .get(&column)?
            .get(y >> 4, section_key(rel_x, y & 0xF, rel_z))
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn non_air_len(&self) -> usize {
        self.non_air
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn has_column(&self, column: ColumnPos) -> bool {
        self.columns.contains_key(&column)
    }

    pub fn columns(&self) -> impl Iterator<Item = ColumnPos> + '_ {
        self.columns.keys().copied()
    }

    /// Walk every entry, optionally skipping air overrides.
    pub fn iter(&self, skip_air: bool) -> impl Iterator<Item = (BlockPos, BlockId)> + '_ {
        self.columns.iter().flat_map(move |(column, overrides)| {
            overrides.sections.iter().flat_map(move |(section, cells)| {
                cells
                    .iter()
                    .filter(move |(_, id)| !(skip_air && id.is_air()))
                    .map(move |(key, id)| {
                        let pos = BlockPos::new(
                            column.x * 16 + (key & 0xF) as i32,
                            *section as i32 * 16 + (key >> 8) as i32,
                            column.z * 16 + ((key >> 4) & 0xF) as i32,
                        );
                        (pos, *id)
                    })
            })
        })
    }

    /// Memoized multi-block-change payload for one column, in wire order.
    /// Returns None for an untracked column or when the filter leaves no
    /// records.
    pub fn batch(&mut self, column: ColumnPos, skip_air: bool) -> Option<Arc<Vec<BlockRecord>>> {
        let overrides = self.columns.get_mut(&column)?;
        if overrides.batch.is_none() {
            overrides.batch = Some(Arc::new(overrides.build_batch(skip_air)));
        }
        let batch = overrides.batch.as_ref()?.clone();
        if batch.is_empty() { None } else { Some(batch) }
    }

    /// Drop every memoized batch. Needed when the ignores-air filter flips,
    /// since cached batches were built under the old filter.
    pub fn invalidate_batches(&mut self) {
        for column in self.columns.values_mut() {
            column.batch = None;
        }
    }

    /// Rewrite an outgoing multi-block-change payload in place: records that
    /// carry an override get its material/variant. The caller passes its own
    /// clone, never the shared original.
    pub fn translate_records(&self, column: ColumnPos, records: &mut [BlockRecord], skip_air: bool) {
        let Some(overrides) = self.columns.get(&column) else {
            return;
        };
        for record in records {
            let key = section_key(record.rel_x, record.y & 0xF, record.rel_z);
            if let Some(id) = overrides.get(record.y >> 4, key) {
                if skip_air && id.is_air() {
                    continue;
                }
                record.id = id;
            }
        }
    }

    /// Write every override of the snapshot's column into its payload via
    /// the codec. Sections absent from the snapshot are left alone.
    pub fn translate_chunk(
        &self,
        codec: &dyn ChunkCodec,
        desc: &ChunkDesc,
        payload: &mut [u8],
        skip_air: bool,
    ) {
        let Some(overrides) = self.columns.get(&desc.column()) else {
            return;
        };
        for (section, cells) in &overrides.sections {
            if !desc.has_section(*section) {
                continue;
            }
            for (key, id) in cells {
                if skip_air && id.is_air() {
                    continue;
                }
                codec.set_block(
                    desc,
                    payload,
                    *section,
                    (key & 0xF) as u8,
                    (key >> 8) as u8,
                    ((key >> 4) & 0xF) as u8,
                    *id,
                );
            }
        }
    }
}
