//! A named override set with its own viewers and policy.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use miragemc_codec::{BlockId, BlockPos, ChunkCodec, ChunkDesc, ColumnPos};

use crate::table::{BlockRecord, OverrideTable};
use crate::{ViewerId, ViewerPolicy, WorldId, is_visible};

struct ContextState {
    overrides: OverrideTable,
    viewers: HashSet<ViewerId>,
    policy: ViewerPolicy,
    ignores_air: bool,
}

/// A context owns its override entries and viewer set outright; the manager
/// only indexes it. Packet-time reads take the read lock, every mutation the
/// write lock. Disposal flips `disposed` under the write lock so a racing
/// packet rewrite that checks the flag first can never observe a half-torn-
/// down context.
pub struct Context {
    name: String,
    world: WorldId,
    disposed: AtomicBool,
    state: RwLock<ContextState>,
}

impl Context {
    pub fn new(name: impl Into<String>, world: WorldId, policy: ViewerPolicy) -> Self {
        Self {
            name: name.into(),
            world,
            disposed: AtomicBool::new(false),
            state: RwLock::new(ContextState {
                overrides: OverrideTable::new(),
                viewers: HashSet::new(),
                policy,
                ignores_air: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Flip the disposed flag under the write lock. Manager-only; callers
    /// racing against this see either a live context or an absent one.
    pub(crate) fn mark_disposed(&self) {
        let _guard = self.state.write().unwrap();
        self.disposed.store(true, Ordering::Release);
    }

    /// Record an override. Returns true iff the coordinate was not yet
    /// overridden in this context. No-op on a disposed context.
    pub fn set_block(&self, pos: BlockPos, id: BlockId) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.state.write().unwrap().overrides.set(pos, id)
    }

    /// Bulk insert, used by the persistence bridge. One lock acquisition for
    /// the whole stream.
    pub fn set_blocks(&self, blocks: impl IntoIterator<Item = (BlockPos, BlockId)>) -> usize {
        if self.is_disposed() {
            return 0;
        }
        let mut state = self.state.write().unwrap();
        blocks
            .into_iter()
            .filter(|(pos, id)| state.overrides.set(*pos, *id))
            .count()
    }

    /// Raw lookup: returns the stored entry even when it is air.
    pub fn raw_block(&self, pos: BlockPos) -> Option<BlockId> {
        if self.is_disposed() {
            return None;
        }
        self.state.read().unwrap().overrides.get(pos)
    }

    /// Rendering lookup: an air entry reads as absent when the context
    /// ignores air. The entry itself stays, so a later non-air set on the
    /// same coordinate is an ordinary overwrite.
    pub fn visible_block(&self, pos: BlockPos) -> Option<BlockId> {
        if self.is_disposed() {
            return None;
        }
        let state = self.state.read().unwrap();
        let id = state.overrides.get(pos)?;
        if state.ignores_air && id.is_air() {
            return None;
        }
        Some(id)
    }

    pub fn is_visible_to(&self, viewer: ViewerId) -> bool {
        if self.is_disposed() {
            return false;
        }
        let state = self.state.read().unwrap();
        is_visible(state.policy, state.viewers.contains(&viewer))
    }

    /// Returns true iff the set changed.
    pub fn add_viewer(&self, viewer: ViewerId) -> bool {
        !self.is_disposed() && self.state.write().unwrap().viewers.insert(viewer)
    }

    /// Returns true iff the set changed.
    pub fn remove_viewer(&self, viewer: ViewerId) -> bool {
        !self.is_disposed() && self.state.write().unwrap().viewers.remove(&viewer)
    }

    /// Empties the viewer set, returning the old members.
    pub fn clear_viewers(&self) -> Vec<ViewerId> {
        if self.is_disposed() {
            return Vec::new();
        }
        self.state.write().unwrap().viewers.drain().collect()
    }

    pub fn viewers(&self) -> Vec<ViewerId> {
        self.state.read().unwrap().viewers.iter().copied().collect()
    }

    pub fn policy(&self) -> ViewerPolicy {
        self.state.read().unwrap().policy
    }

    /// Returns the previous policy.
    pub fn set_policy(&self, policy: ViewerPolicy) -> ViewerPolicy {
        let mut state = self.state.write().unwrap();
        std::mem::replace(&mut state.policy, policy)
    }

    pub fn ignores_air(&self) -> bool {
        self.state.read().unwrap().ignores_air
    }

    pub fn set_ignores_air(&self, ignores_air: bool) -> bool {
        let mut state = self.state.write().unwrap();
        let changed = state.ignores_air != ignores_air;
        if changed {
            state.ignores_air = ignores_air;
            // Cached batches were built under the old filter.
            state.overrides.invalidate_batches();
        }
        changed
    }

    pub fn block_count(&self) -> usize {
        self.state.read().unwrap().overrides.len()
    }

    pub fn non_air_count(&self) -> usize {
        self.state.read().unwrap().overrides.non_air_len()
    }

    pub fn has_column(&self, column: ColumnPos) -> bool {
        !self.is_disposed() && self.state.read().unwrap().overrides.has_column(column)
    }

    pub fn columns(&self) -> Vec<ColumnPos> {
        self.state.read().unwrap().overrides.columns().collect()
    }

    /// Snapshot of every override, with air entries filtered the way this
    /// context renders.
    pub fn visible_overrides(&self) -> Vec<(BlockPos, BlockId)> {
        let state = self.state.read().unwrap();
        state.overrides.iter(state.ignores_air).collect()
    }

    /// Snapshot of every override, air entries included. The persistence
    /// bridge saves the full footprint, not the rendered view.
    pub fn all_overrides(&self) -> Vec<(BlockPos, BlockId)> {
        self.state.read().unwrap().overrides.iter(false).collect()
    }

    /// The memoized multi-block-change payload for one column.
    pub fn block_change_batch(&self, column: ColumnPos) -> Option<Arc<Vec<BlockRecord>>> {
        if self.is_disposed() {
            return None;
        }
        let mut state = self.state.write().unwrap();
        let skip_air = state.ignores_air;
        state.overrides.batch(column, skip_air)
    }

    /// Eagerly build a column's batch; the persistence bridge calls this at
    /// commit time so the first viewer refresh does not pay for it.
    pub fn prime_batch(&self, column: ColumnPos) {
        let _ = self.block_change_batch(column);
    }

    /// Apply this context's overrides to a multi-block-change clone.
    pub fn translate_records(&self, column: ColumnPos, records: &mut [BlockRecord]) {
        if self.is_disposed() {
            return;
        }
        let state = self.state.read().unwrap();
        state
            .overrides
            .translate_records(column, records, state.ignores_air);
    }

    /// Apply this context's overrides to a chunk snapshot clone.
    pub fn translate_chunk(&self, codec: &dyn ChunkCodec, desc: &ChunkDesc, payload: &mut [u8]) {
        if self.is_disposed() {
            return;
        }
        let state = self.state.read().unwrap();
        state
            .overrides
            .translate_chunk(codec, desc, payload, state.ignores_air);
    }
}
