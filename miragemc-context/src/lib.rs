//! Per-viewer block override contexts.
//!
//! A context is a named, independently disposable set of block overrides
//! with its own viewer policy. The override table underneath it is a sparse
//! column/section-partitioned map from absolute coordinates to substituted
//! block ids. Nothing here touches the authoritative world state.

mod context;
mod manager;
mod table;

pub use context::Context;
pub use manager::ContextManager;
pub use table::{BlockRecord, OverrideTable};

use miragemc_codec::ColumnPos;

/// A connected player, as the host network layer identifies one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewerId(pub u64);

/// Handle for a loaded world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldId(pub u32);

/// Whether a context's overrides are shown to listed viewers only, or to
/// everyone except the listed viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerPolicy {
    Whitelist,
    Blacklist,
}

/// The visibility rule. Pure: policy plus set membership, nothing else.
pub fn is_visible(policy: ViewerPolicy, in_set: bool) -> bool {
    match policy {
        ViewerPolicy::Whitelist => in_set,
        ViewerPolicy::Blacklist => !in_set,
    }
}

/// Host capability for pushing fresh column data to clients after a
/// visibility change. The manager calls this; the host decides how a chunk
/// actually gets resent.
pub trait ViewRefresher: Send + Sync {
    /// Resend columns to one specific viewer.
    fn refresh_for_viewer(&self, viewer: ViewerId, world: WorldId, columns: &[ColumnPos]);

    /// Resend columns to every player currently tracking them. Used when a
    /// change (policy flip, disposal, clear) can affect viewers outside the
    /// context's own set.
    fn refresh_for_all(&self, world: WorldId, columns: &[ColumnPos]);
}
