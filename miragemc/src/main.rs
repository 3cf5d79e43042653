use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};

use miragemc::Engine;
use miragemc::codec::{BlockCursor, ChunkDesc, ColumnPos};
use miragemc::context::{ViewRefresher, ViewerId, ViewerPolicy, WorldId};
use miragemc::pipeline::{BlockChangePacket, ChunkDataPacket, ManualTicker, PacketSink};
use miragemc::storage::FileRegionStore;

#[derive(Parser)]
#[command(name = "miragemc", about = "Inspect saved mirage regions and dry-run chunk rewrites")]
pub struct Args {
    /// Directory holding .mrg region files
    #[arg(short, long, default_value = "./regions")]
    pub regions: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List saved regions
    List,
    /// Print a region's block footprint
    Inspect { name: String },
    /// Apply a region's blocks to a raw chunk payload file and write the
    /// rewritten payload next to it
    Apply {
        name: String,
        payload: PathBuf,
        #[arg(long, default_value = "0")]
        chunk_x: i32,
        #[arg(long, default_value = "0")]
        chunk_z: i32,
        /// Section bitmask of the payload, e.g. 0xFFFF for a full column
        #[arg(long, default_value = "65535")]
        bitmask: u16,
        #[arg(long)]
        no_sky: bool,
    },
}

struct NoopRefresher;

impl ViewRefresher for NoopRefresher {
    fn refresh_for_viewer(&self, _: ViewerId, _: WorldId, _: &[ColumnPos]) {}
    fn refresh_for_all(&self, _: WorldId, _: &[ColumnPos]) {}
}

struct LogSink;

impl PacketSink for LogSink {
    fn send_block_change(&self, viewer: ViewerId, packet: BlockChangePacket) {
        log::info!("repair packet for {:?}: {:?}", viewer, packet);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let store = Arc::new(FileRegionStore::new(&args.regions));
    let engine = Engine::new(
        Arc::new(NoopRefresher),
        Arc::new(ManualTicker::new()),
        Arc::new(LogSink),
        store.clone(),
    );

    match args.command {
        Command::List => {
            use miragemc::storage::RegionStore;
            for name in store.list_regions().await? {
                println!("{name}");
            }
        }
        Command::Inspect { name } => {
            use miragemc::storage::RegionStore;
            let Some(region) = store.load_region(&name).await? else {
                bail!("no saved region named '{name}'");
            };
            let columns: std::collections::HashSet<ColumnPos> = region
                .blocks
                .iter()
                .map(|b| ColumnPos::containing(b.x, b.z))
                .collect();
            println!("region:  {}", region.name);
            println!("world:   {}", region.world);
            println!("blocks:  {}", region.blocks.len());
            println!("columns: {}", columns.len());
            if let (Some(min_y), Some(max_y)) = (
                region.blocks.iter().map(|b| b.y).min(),
                region.blocks.iter().map(|b| b.y).max(),
            ) {
                println!("y range: {min_y}..={max_y}");
            }
        }
        Command::Apply { name, payload, chunk_x, chunk_z, bitmask, no_sky } => {
            let bytes = std::fs::read(&payload)
                .with_context(|| format!("reading payload {payload:?}"))?;
            let desc = ChunkDesc {
                chunk_x,
                chunk_z,
                section_bitmask: bitmask,
                continuous: true,
                has_sky_light: !no_sky,
            };
            engine.codec().validate(&desc, bytes.len())?;
            let solid = BlockCursor::new(&desc)
                .filter(|c| {
                    engine
                        .codec()
                        .get_block(&desc, &bytes, c.section, c.rel_x, c.rel_y, c.rel_z)
                        .is_some_and(|id| !id.is_air())
                })
                .count();
            println!("payload: {} bytes, {} non-air blocks", bytes.len(), solid);

            let world = WorldId(0);
            engine
                .restore_region(&name, world, ViewerPolicy::Whitelist)
                .await?;
            let me = ViewerId(0);
            engine.contexts().add_viewer(&name, me)?;

            let packet = ChunkDataPacket { world, desc, payload: bytes };
            match engine.rewriter().rewrite_chunk_data(me, &packet) {
                Some(rewritten) => {
                    let out = payload.with_extension("rewritten");
                    std::fs::write(&out, &rewritten.payload)
                        .with_context(|| format!("writing {out:?}"))?;
                    println!("rewrote {} bytes -> {:?}", rewritten.payload.len(), out);
                }
                None => println!("region does not touch this chunk; payload unchanged"),
            }
        }
    }
    Ok(())
}
