use std::path::PathBuf;
use std::thread;

use anyhow::Context;
use clap::{Parser, Subcommand};
use scenecull_render::{FrontendConfig, Renderer, frame_exchange};
use scenecull_scene::SceneManager;
use scenecull_tools::{DemoSceneParams, Inspector, animate, generate, stats_line};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scenecull-cli", about = "Visibility and scene indexing core driver")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions and the default frontend configuration
    Info,
    /// Generate a scene and prepare draw lists for it
    Frame {
        /// Number of frames to prepare
        #[arg(short, long, default_value = "10")]
        frames: u32,
        /// Seed of the generated scene
        #[arg(short, long, default_value = "42")]
        seed: u64,
        /// Props per side of the scene grid
        #[arg(short, long, default_value = "24")]
        grid: u32,
        /// Frontend configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Hand lists to a backend thread through the frame exchange
        #[arg(short, long)]
        threaded: bool,
    },
    /// Build the spatial index for a generated scene, churn it and validate it
    Bvh {
        /// Props per side of the scene grid
        #[arg(short, long, default_value = "64")]
        grid: u32,
        /// Update steps to run
        #[arg(short, long, default_value = "100")]
        steps: u32,
        /// Seed of the generated scene
        #[arg(long, default_value = "7")]
        seed: u64,
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
            println!("scenecull-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", scenecull_common::crate_info());
            println!("bvh: {}", scenecull_bvh::crate_info());
            println!("scene: {}", scenecull_scene::crate_info());
            println!("render: {}", scenecull_render::crate_info());
            println!("tools: {}", scenecull_tools::crate_info());
            println!("default config:\n{}", FrontendConfig::default().to_json_pretty()?);
        }
        Commands::Frame {
            frames,
            seed,
            grid,
            config,
            threaded,
        } => {
            let config = match config {
                Some(path) => FrontendConfig::load(&path)
                    .with_context(|| format!("loading frontend config {}", path.display()))?,
                None => FrontendConfig::default(),
            };
            let demo = generate(&DemoSceneParams {
                seed,
                grid,
                ..Default::default()
            })?;
            println!("{}", Inspector::scene(&demo.scene));

            let camera = demo.camera;
            let movers = demo.movers;
            let mut manager = SceneManager::new(demo.scene);
            let mut renderer = Renderer::new(config)?;

            if threaded {
                let (front, back) = frame_exchange(renderer.new_draw_list(), renderer.new_draw_list());
                let backend = thread::Builder::new()
                    .name("scenecull-backend".into())
                    .spawn(move || back.drain(|list| println!("{}", Inspector::frame(list))))?;

                for frame in 0..frames {
                    animate(&mut manager, &movers, frame as f32 * 0.05)?;
                    let mut list = front.acquire()?;
                    renderer.prepare_draw_list(manager.scene(), &camera, &mut list);
                    front.submit(list)?;
                    tracing::debug!("{}", stats_line(renderer.last_stats()));
                }
                drop(front);
                let drawn = backend
                    .join()
                    .map_err(|_| anyhow::anyhow!("backend thread panicked"))?;
                println!("backend drew {drawn} frames");
            } else {
                let mut list = renderer.new_draw_list();
                for frame in 0..frames {
                    animate(&mut manager, &movers, frame as f32 * 0.05)?;
                    renderer.prepare_draw_list(manager.scene(), &camera, &mut list);
                    println!("{}", Inspector::frame(&list));
                    println!("  {}", stats_line(renderer.last_stats()));
                }
            }

            for (light, size, pos) in Inspector::shadow_regions(renderer.shadow_atlas()) {
                println!("shadow region: light={light} size={size} pos={pos:?}");
            }
        }
        Commands::Bvh { grid, steps, seed } => {
            let demo = generate(&DemoSceneParams {
                seed,
                grid,
                moving_fraction: 0.2,
                ..Default::default()
            })?;
            println!("{}", demo.scene.bvh.stats());

            let mut manager = SceneManager::new(demo.scene);
            let (mut skipped, mut reinserted) = (0, 0);
            for step in 0..steps {
                let stats = animate(&mut manager, &demo.movers, step as f32 * 0.1)?;
                skipped += stats.refit_skipped;
                reinserted += stats.reinserted;
            }
            let bvh = &manager.scene().bvh;
            bvh.validate().context("tree invariants broken after churn")?;
            println!("after {steps} steps with {} movers: refit skipped={skipped} reinserted={reinserted}", demo.movers.len());
            println!("{}", bvh.stats());
        }
    }

    Ok(())
}
