//! Glue between a block record stream and a context's override table.

use std::collections::HashSet;

use anyhow::{Context as _, Result};
use miragemc_codec::{BlockId, BlockPos, ColumnPos};
use miragemc_context::{Context, WorldId};

use crate::{RegionStore, SavedBlock, SavedRegion};

/// Streaming load contract: a loader calls `add_block` once per record, then
/// `commit` once per chunk column (or once at the end of the stream).
pub trait BlockSink {
    #[allow(clippy::too_many_arguments)]
    fn add_block(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        material: u16,
        variant: u8,
        block_light: u8,
        sky_light: u8,
    );

    fn commit(&mut self) -> Result<()>;
}

/// Buffers streamed records and lands them in the target context in one lock
/// acquisition at `commit`, then primes each touched column's multi-block
/// batch so the first viewer refresh finds it ready.
pub struct ColumnLoader<'a> {
    context: &'a Context,
    pending: Vec<(BlockPos, BlockId)>,
    touched: HashSet<ColumnPos>,
    loaded: usize,
}

impl<'a> ColumnLoader<'a> {
    pub fn new(context: &'a Context) -> Self {
        Self {
            context,
            pending: Vec::new(),
            touched: HashSet::new(),
            loaded: 0,
        }
    }

    /// Records landed in the context so far.
    pub fn loaded(&self) -> usize {
        self.loaded
    }
}

impl BlockSink for ColumnLoader<'_> {
    fn add_block(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        material: u16,
        variant: u8,
        _block_light: u8,
        _sky_light: u8,
    ) {
        // Light levels ride along in the saved records but the override
        // table substitutes block ids only; lighting stays the host's.
        let pos = BlockPos::new(x, y, z);
        self.touched.insert(pos.column());
        self.pending.push((pos, BlockId::new(material, variant)));
    }

    fn commit(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.loaded += self.context.set_blocks(self.pending.drain(..));
        for column in self.touched.drain() {
            self.context.prime_batch(column);
        }
        Ok(())
    }
}

/// Host accessor for the authoritative world: what is really at a
/// coordinate right now.
pub trait WorldSampler: Send + Sync {
    fn block_at(&self, world: WorldId, pos: BlockPos) -> BlockId;
    fn block_light_at(&self, world: WorldId, pos: BlockPos) -> u8;
    fn sky_light_at(&self, world: WorldId, pos: BlockPos) -> u8;
}

/// Capture the real-world blocks under every coordinate a context
/// overrides. Air entries are included; a restore must be able to recreate
/// the exact footprint.
pub fn snapshot_footprint(sampler: &dyn WorldSampler, ctx: &Context) -> SavedRegion {
    let world = ctx.world();
    let mut blocks = Vec::with_capacity(ctx.block_count());
    for (pos, _) in ctx.all_overrides() {
        let real = sampler.block_at(world, pos);
        blocks.push(SavedBlock {
            x: pos.x,
            y: pos.y,
            z: pos.z,
            material: real.material as i32,
            variant: real.variant as i8,
            block_light: sampler.block_light_at(world, pos) as i8,
            sky_light: sampler.sky_light_at(world, pos) as i8,
        });
    }
    SavedRegion { name: ctx.name().to_string(), world: world.0, blocks }
}

/// Load a saved region into a context. On any failure the error carries a
/// readable reason and the context is left usable, just empty: nothing is
/// inserted until the whole snapshot has decoded.
pub async fn restore_region(
    store: &dyn RegionStore,
    name: &str,
    ctx: &Context,
) -> Result<usize> {
    let region = store
        .load_region(name)
        .await
        .with_context(|| format!("loading saved region '{name}'"))?
        .with_context(|| format!("no saved region named '{name}'"))?;

    let mut loader = ColumnLoader::new(ctx);
    for block in &region.blocks {
        // Saved files only ever hold 12-bit materials and 4-bit variants;
        // anything else is a corrupt region and the load must say so
        // instead of masking the value into a garbage id.
        let material = u16::try_from(block.material)
            .ok()
            .filter(|m| *m <= 0xFFF)
            .with_context(|| {
                format!(
                    "region '{name}': material {} out of range at ({}, {}, {})",
                    block.material, block.x, block.y, block.z
                )
            })?;
        let variant = u8::try_from(block.variant)
            .ok()
            .filter(|v| *v <= 0xF)
            .with_context(|| {
                format!(
                    "region '{name}': variant {} out of range at ({}, {}, {})",
                    block.variant, block.x, block.y, block.z
                )
            })?;
        loader.add_block(
            block.x,
            block.y,
            block.z,
            material,
            variant,
            block.block_light as u8,
            block.sky_light as u8,
        );
    }
    loader.commit()?;
    log::info!(
        "restored {} blocks into context '{}' from region '{name}'",
        loader.loaded(),
        ctx.name()
    );
    Ok(loader.loaded())
}
