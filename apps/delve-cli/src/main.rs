use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use delve_common::{EditKind, PeerId, TileCoord};
use delve_kernel::{Overlay, Terrain, TileState};
use delve_net::LoopbackHub;
use delve_persist::{FileStore, MemoryStore, MutationLedger, MutationStore};
use delve_session::{EngineConfig, EngineEvent, WorldEngine};
use delve_stream::{ChunkStore, Slot};
use glam::Vec2;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "delve-cli", about = "CLI tool for delve worlds")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Engine configuration file (.yaml, .yml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and world parameters
    Info,
    /// Render an ASCII preview of the terrain around a tile
    Map {
        /// Tile column of the preview centre (defaults to the world centre)
        #[arg(long)]
        gx: Option<i32>,
        /// Tile row of the preview centre (defaults to the world centre)
        #[arg(long)]
        gz: Option<i32>,
        /// Chebyshev radius in tiles
        #[arg(short, long, default_value = "16")]
        radius: i32,
        /// Overlay the edits saved in this store directory
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Run several peers over an in-process transport and check they agree
    Simulate {
        /// Number of frames to run
        #[arg(short, long, default_value = "400")]
        ticks: u32,
        /// Number of peers (at most the member cap)
        #[arg(short, long, default_value = "2")]
        peers: usize,
        /// Frame length in seconds
        #[arg(long, default_value = "0.05")]
        dt: f32,
    },
    /// Inspect an edit store
    Ledger {
        /// Store directory
        store: PathBuf,
        /// Merge all segments into one after verifying
        #[arg(long)]
        compact: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Info => info(&config),
        Commands::Map {
            gx,
            gz,
            radius,
            store,
        } => map(&config, gx, gz, radius, store.as_deref())?,
        Commands::Simulate { ticks, peers, dt } => simulate(config, ticks, peers, dt)?,
        Commands::Ledger { store, compact } => ledger(&config, &store, compact)?,
    }

    Ok(())
}

fn info(config: &EngineConfig) {
    let terrain = Terrain::new(config.terrain.clone());
    let t = &config.terrain;
    println!("delve-cli v{}", env!("CARGO_PKG_VERSION"));
    println!("seed: {}", t.seed);
    println!("tile size: {}", t.tile_size);
    println!("world: {0}x{0} tiles, centre {1}", t.world_size, terrain.center());
    println!(
        "biomes: stone < {}, grass < {}, sand beyond",
        t.stone_radius, t.grass_radius
    );
    println!(
        "stream: load {} / evict {} / rescan every {} tiles",
        config.stream.load_radius, config.stream.evict_radius, config.stream.rescan_delta
    );
    println!(
        "net: cap {} members, position every {}ms",
        config.net.member_cap, config.net.position_interval_ms
    );
}

fn glyph(slot: Slot) -> char {
    let state = match slot {
        Slot::Unloaded => return '?',
        Slot::Hole => return ' ',
        Slot::Tile(state) => state,
    };
    match (state.overlay(), state) {
        (Overlay::Built, _) => 'B',
        (Overlay::Torch, _) => '*',
        (Overlay::DamagedFloor { .. }, _) => ',',
        (Overlay::None, TileState::Obstacle) => '#',
        (Overlay::None, TileState::Liquid) => '~',
        (Overlay::None, _) => '.',
    }
}

fn map(
    config: &EngineConfig,
    gx: Option<i32>,
    gz: Option<i32>,
    radius: i32,
    store: Option<&Path>,
) -> anyhow::Result<()> {
    let terrain = Terrain::new(config.terrain.clone());
    let center = TileCoord::new(
        gx.unwrap_or(terrain.center().gx),
        gz.unwrap_or(terrain.center().gz),
    );

    let mut ledger = MutationLedger::new();
    if let Some(dir) = store {
        let store = FileStore::open(dir, terrain.seed())
            .with_context(|| format!("opening store {}", dir.display()))?;
        ledger.seed(store.load_mutations()?);
    }
    let mut chunks = ChunkStore::new(terrain.tile_size());
    chunks.load_around(center, radius, &terrain, &mut ledger);

    println!("{:?} around {center} (r={radius})", terrain.biome(center));
    for dz in -radius..=radius {
        let row: String = (-radius..=radius)
            .map(|dx| {
                let coord = center.offset(dx, dz);
                if coord == center {
                    '@'
                } else {
                    glyph(chunks.slot(coord))
                }
            })
            .collect();
        println!("{row}");
    }
    Ok(())
}

fn simulate(config: EngineConfig, ticks: u32, peers: usize, dt: f32) -> anyhow::Result<()> {
    anyhow::ensure!(peers >= 1, "need at least one peer");
    let hub = LoopbackHub::new();
    let mut engines = Vec::with_capacity(peers);
    for i in 0..peers {
        let (link, inbox) = hub.join(PeerId::new(format!("sim_{i:02}")), config.net.inbox_capacity);
        let engine = WorldEngine::new(
            config.clone(),
            Box::new(MemoryStore::new()),
            Box::new(link),
            inbox,
        )?;
        engines.push(engine);
    }

    let legs = [Vec2::X, Vec2::Y, Vec2::NEG_X, Vec2::NEG_Y];
    let kinds = [EditKind::Destroy, EditKind::Build, EditKind::Torch];
    let mut accepted = 0usize;
    let mut refused = 0usize;
    for frame in 0..ticks {
        for (i, engine) in engines.iter_mut().enumerate() {
            let leg = legs[((frame / 20) as usize + i) % legs.len()];
            engine.tick(dt, leg);
            if frame % 15 == (i as u32 * 7) % 15 {
                let kind = kinds[(frame / 15) as usize % kinds.len()];
                match engine.edit(kind) {
                    Ok(_) => accepted += 1,
                    Err(err) => {
                        tracing::debug!(
                            peer = %engine.local_id(),
                            %kind,
                            error = %err,
                            "edit declined"
                        );
                        refused += 1;
                    }
                }
            }
        }
    }
    // Let the last broadcasts land.
    for engine in engines.iter_mut() {
        engine.tick(dt, Vec2::ZERO);
    }

    println!(
        "simulated {ticks} frames, {peers} peers: {accepted} edits accepted, {refused} declined"
    );
    let mut reference: Option<Vec<Slot>> = None;
    let mut agree = true;
    let spawn = engines
        .first()
        .map(|e| e.terrain().center())
        .unwrap_or_default();
    let radius = config.terrain.spawn_radius;
    for engine in engines.iter_mut() {
        let halted = engine.is_halted();
        let events = engine.drain_events();
        let drops = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::DropCollected { .. }))
            .count();
        let region: Vec<Slot> = spawn.square(radius).map(|c| engine.chunks().slot(c)).collect();
        println!(
            "  {} #{}: ledger {} entries, {} drops collected this batch, hash {:#018x}{}",
            engine.local_id(),
            engine.local_number().map_or("-".to_string(), |n| n.to_string()),
            engine.ledger().len(),
            drops,
            engine.chunks().state_hash(),
            if halted { " (halted)" } else { "" }
        );
        if halted {
            continue;
        }
        match &reference {
            None => reference = Some(region),
            Some(r) => agree &= *r == region,
        }
    }
    println!(
        "spawn region (r={radius}): {}",
        if agree { "OK" } else { "MISMATCH" }
    );
    Ok(())
}

fn ledger(config: &EngineConfig, dir: &Path, compact: bool) -> anyhow::Result<()> {
    let mut store = FileStore::open(dir, config.terrain.seed)
        .with_context(|| format!("opening store {}", dir.display()))?;
    store.verify_integrity()?;
    let records = store.load_mutations()?;
    println!(
        "store {}: seed {}, {} segments, {} records",
        store.root().display(),
        store.meta().seed,
        store.meta().segment_count,
        records.len()
    );

    let mut ledger = MutationLedger::new();
    ledger.seed(records.iter().copied());
    for entry in ledger.entries() {
        let history: Vec<String> = entry.history.iter().map(|k| k.to_string()).collect();
        match entry.pending {
            Some(kind) => println!("  {} [{}] then {kind}", entry.coord, history.join(", ")),
            None => println!("  {} [{}]", entry.coord, history.join(", ")),
        }
    }
    println!(
        "{} coordinates, {} with a deferred edit",
        ledger.len(),
        ledger.pending_count()
    );

    if compact {
        let merged = store.compact()?;
        println!(
            "compacted into {} segment(s) ({merged} records)",
            store.meta().segment_count
        );
    }
    Ok(())
}
