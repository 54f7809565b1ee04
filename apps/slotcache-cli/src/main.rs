use std::convert::Infallible;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use slotcache_assets::{
    FsFetcher, PrefabCache, PrefabCacheConfig, TextureCacheConfig, TextureId, TextureUnitCache,
};
use slotcache_core::{CacheConfig, EvictionPolicy, FnProvider, SlotCache, SlotIndex};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "slotcache-cli", about = "CLI tool for slot cache operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions
    Info,
    /// Drive a string-keyed cache through an access sequence
    Simulate {
        /// Maximum number of resident keys (overrides the config file)
        #[arg(short, long)]
        capacity: Option<usize>,
        /// Eviction policy: release, silent or strict (overrides the config file)
        #[arg(short, long)]
        policy: Option<EvictionPolicy>,
        /// JSON cache configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Keys to look up, in order
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Bind texture ids to texture units
    Textures {
        /// Number of texture units
        #[arg(short, long, default_value = "16")]
        units: usize,
        /// Texture ids to bind, in order
        #[arg(required = true)]
        ids: Vec<u64>,
    },
    /// Load glTF prefabs from a directory
    Prefabs {
        /// Directory prefab URLs are resolved against
        #[arg(short, long)]
        root: PathBuf,
        /// Maximum number of distinct prefabs
        #[arg(short, long)]
        capacity: Option<usize>,
        /// Prefab URLs to load, in order
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("slotcache-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("core: {}", slotcache_core::crate_info());
            println!("assets: {}", slotcache_assets::crate_info());
        }
        Commands::Simulate {
            capacity,
            policy,
            config,
            keys,
        } => {
            let mut cfg = match config {
                Some(path) => CacheConfig::load(path)?,
                None => CacheConfig::default(),
            };
            if let Some(capacity) = capacity {
                cfg.capacity = capacity;
            }
            if let Some(policy) = policy {
                cfg.policy = policy;
            }
            simulate(cfg, &keys)?;
        }
        Commands::Textures { units, ids } => {
            let mut cache = TextureUnitCache::new(TextureCacheConfig { units })?;
            println!("Binding {} textures to {} units", ids.len(), cache.units());
            for id in ids {
                let binding = cache.bind_now(TextureId(id))?;
                println!(
                    "  {} -> unit {} ({:#06x})",
                    binding.texture,
                    binding.unit.index(),
                    binding.unit.gl_enum()
                );
            }
            print!("{}", cache.dump());
        }
        Commands::Prefabs {
            root,
            capacity,
            urls,
        } => {
            let mut config = PrefabCacheConfig::default();
            if let Some(capacity) = capacity {
                config.capacity = capacity;
            }
            let mut cache = PrefabCache::new(FsFetcher::new(&root), config)?;
            println!("Loading {} prefabs from {}", urls.len(), root.display());
            for url in &urls {
                match pollster::block_on(cache.load(url)) {
                    Ok(prefab) => println!(
                        "  {url}: slot={} id={:#018x} meshes={} primitives={} materials={}",
                        prefab.slot,
                        prefab.id.0,
                        prefab.meshes.len(),
                        prefab.primitive_count(),
                        prefab.materials.len()
                    ),
                    Err(e) => println!("  {url}: error: {e}"),
                }
            }
            print!("{}", cache.dump());
        }
    }

    Ok(())
}

fn simulate(config: CacheConfig, keys: &[String]) -> anyhow::Result<()> {
    let provider = FnProvider::new(
        |key: &str| key.to_owned(),
        |key: &str, slot: SlotIndex| Ok::<_, Infallible>(format!("{key}@{slot}")),
    )
    .with_release(|key: &str, value: String| {
        println!("    release {key} ({value})");
        Ok(())
    });
    let mut cache: SlotCache<str, _> = SlotCache::new(provider, config)?;

    println!(
        "Simulating {} lookups: capacity={}, policy={}",
        keys.len(),
        cache.capacity(),
        cache.policy()
    );
    for key in keys {
        let resident = cache.contains(key);
        let victim = if !resident && cache.is_full() {
            cache.lru_key().map(str::to_owned)
        } else {
            None
        };
        match pollster::block_on(cache.get(key)) {
            Ok(value) if resident => println!("  get {key}: hit  -> {value}"),
            Ok(value) => match victim {
                Some(victim) => println!("  get {key}: miss -> {value} (evicted {victim})"),
                None => println!("  get {key}: miss -> {value}"),
            },
            Err(e) => println!("  get {key}: error: {e}"),
        }
    }

    cache.print();
    print!("{}", cache.dump());
    println!("Stats: {}", cache.stats());
    Ok(())
}
