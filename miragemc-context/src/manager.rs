//! Registry of contexts plus the viewer-policy operations that trigger
//! client refreshes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Result, bail};
use miragemc_codec::ColumnPos;

use crate::{Context, ViewRefresher, ViewerId, ViewerPolicy, WorldId};

#[derive(Default)]
struct ManagerState {
    /// Keyed by lowercased name; names are case-insensitively unique.
    by_name: HashMap<String, Arc<Context>>,
    /// Registration-ordered per world. Multi-context packet composition
    /// follows this order, so it must stay deterministic.
    by_world: HashMap<WorldId, Vec<Arc<Context>>>,
}

/// Non-owning index over contexts: by name and by world. Kept consistent
/// with context lifecycle (insert on create, remove on dispose); never the
/// source of truth for a context's contents.
pub struct ContextManager {
    state: RwLock<ManagerState>,
    refresher: Arc<dyn ViewRefresher>,
}

impl ContextManager {
    pub fn new(refresher: Arc<dyn ViewRefresher>) -> Self {
        Self {
            state: RwLock::new(ManagerState::default()),
            refresher,
        }
    }

    pub fn create_context(
        &self,
        name: &str,
        world: WorldId,
        policy: ViewerPolicy,
    ) -> Result<Arc<Context>> {
        let key = name.to_lowercase();
        let mut state = self.state.write().unwrap();
        if state.by_name.contains_key(&key) {
            bail!("context '{name}' already exists");
        }
        let ctx = Arc::new(Context::new(name, world, policy));
        state.by_name.insert(key, ctx.clone());
        state.by_world.entry(world).or_default().push(ctx.clone());
        log::info!("created context '{name}' in world {:?}", world);
        Ok(ctx)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Context>> {
        self.state
            .read()
            .unwrap()
            .by_name
            .get(&name.to_lowercase())
            .cloned()
    }

    pub fn context_names(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .by_name
            .values()
            .map(|ctx| ctx.name().to_string())
            .collect()
    }

    /// Tear a context down: stop it applying, revert every current viewer to
    /// the real world, then drop it from the indexes.
    pub fn dispose(&self, name: &str) -> Result<()> {
        let Some(ctx) = self.get(name) else {
            bail!("no such context '{name}'");
        };
        let columns = ctx.columns();
        ctx.mark_disposed();
        if !columns.is_empty() {
            self.refresher.refresh_for_all(ctx.world(), &columns);
        }

        let mut state = self.state.write().unwrap();
        state.by_name.remove(&name.to_lowercase());
        if let Some(contexts) = state.by_world.get_mut(&ctx.world()) {
            contexts.retain(|c| !Arc::ptr_eq(c, &ctx));
            if contexts.is_empty() {
                state.by_world.remove(&ctx.world());
            }
        }
        log::info!("disposed context '{name}'");
        Ok(())
    }

    /// Live contexts whose overrides touch a column, in registration order.
    /// O(contexts in that world).
    pub fn contexts_touching_chunk(&self, world: WorldId, column: ColumnPos) -> Vec<Arc<Context>> {
        let state = self.state.read().unwrap();
        state
            .by_world
            .get(&world)
            .map(|contexts| {
                contexts
                    .iter()
                    .filter(|ctx| ctx.has_column(column))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_contexts_in_world(&self, world: WorldId) -> bool {
        self.state
            .read()
            .unwrap()
            .by_world
            .get(&world)
            .is_some_and(|contexts| !contexts.is_empty())
    }

    /// Add a viewer; their view of the context's columns is resent so the
    /// change shows up without waiting for the next natural chunk send.
    pub fn add_viewer(&self, name: &str, viewer: ViewerId) -> Result<bool> {
        let Some(ctx) = self.get(name) else {
            bail!("no such context '{name}'");
        };
        let changed = ctx.add_viewer(viewer);
        if changed {
            self.refresher
                .refresh_for_viewer(viewer, ctx.world(), &ctx.columns());
        }
        Ok(changed)
    }

    pub fn remove_viewer(&self, name: &str, viewer: ViewerId) -> Result<bool> {
        let Some(ctx) = self.get(name) else {
            bail!("no such context '{name}'");
        };
        let changed = ctx.remove_viewer(viewer);
        if changed {
            self.refresher
                .refresh_for_viewer(viewer, ctx.world(), &ctx.columns());
        }
        Ok(changed)
    }

    /// Flipping the policy inverts the outcome for every viewer at once, so
    /// the refresh is a broadcast, not a per-member resend.
    pub fn set_policy(&self, name: &str, policy: ViewerPolicy) -> Result<()> {
        let Some(ctx) = self.get(name) else {
            bail!("no such context '{name}'");
        };
        if ctx.set_policy(policy) != policy {
            self.refresher.refresh_for_all(ctx.world(), &ctx.columns());
        }
        Ok(())
    }

    pub fn clear_viewers(&self, name: &str) -> Result<()> {
        let Some(ctx) = self.get(name) else {
            bail!("no such context '{name}'");
        };
        if !ctx.clear_viewers().is_empty() {
            self.refresher.refresh_for_all(ctx.world(), &ctx.columns());
        }
        Ok(())
    }

    pub fn set_ignores_air(&self, name: &str, ignores_air: bool) -> Result<()> {
        let Some(ctx) = self.get(name) else {
            bail!("no such context '{name}'");
        };
        if ctx.set_ignores_air(ignores_air) {
            self.refresher.refresh_for_all(ctx.world(), &ctx.columns());
        }
        Ok(())
    }

    /// Force a full view refresh of a context's footprint.
    pub fn refresh_view(&self, name: &str) -> Result<()> {
        let Some(ctx) = self.get(name) else {
            bail!("no such context '{name}'");
        };
        self.refresher.refresh_for_all(ctx.world(), &ctx.columns());
        Ok(())
    }

    /// Eager cleanup on disconnect: the viewer is dropped from every
    /// context's set so later visibility checks never resolve against a
    /// stale entry. No resends; the player is gone.
    pub fn handle_disconnect(&self, viewer: ViewerId) {
        let contexts: Vec<Arc<Context>> = self
            .state
            .read()
            .unwrap()
            .by_name
            .values()
            .cloned()
            .collect();
        for ctx in contexts {
            ctx.remove_viewer(viewer);
        }
    }
}
