use clap::{Parser, Subcommand};
use pcb_common::db::board::Board;
use pcb_common::db::request::RouteResult;
use pcb_common::util::config::Config;
use pcb_common::util::generator::{self, BoardSpec};
use pcb_common::util::{logger, visualization};
use pcb_router::grid::RoutingGrid;
use pcb_router::utils::check;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Route every net of the configured board.
    Route {
        /// Overrides `input.board_file`.
        #[arg(long)]
        board: Option<PathBuf>,
        /// Route in one exclusive pass instead of negotiating.
        #[arg(long)]
        single_pass: bool,
    },
    /// Write a random benchmark board.
    Generate {
        #[arg(long, default_value_t = 50.0)]
        width: f64,
        #[arg(long, default_value_t = 50.0)]
        height: f64,
        #[arg(long, default_value_t = 2)]
        layers: u8,
        #[arg(long, default_value_t = 40)]
        nets: usize,
        #[arg(long, default_value_t = 10)]
        obstacles: usize,
        #[arg(long, default_value_t = 1.0)]
        pitch: f64,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value = "inputs/board.toml")]
        output: String,
    },
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    let mut config = if args.config.exists() {
        log::info!("Loading configuration from {:?}", args.config);
        let config_str = std::fs::read_to_string(&args.config)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;
        toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config TOML: {}", e))?
    } else {
        log::warn!(
            "Configuration file {:?} not found. Using internal defaults.",
            args.config
        );
        Config::default()
    };

    let command = args.command.unwrap_or(Commands::Route {
        board: None,
        single_pass: false,
    });

    match command {
        Commands::Generate {
            width,
            height,
            layers,
            nets,
            obstacles,
            pitch,
            seed,
            output,
        } => {
            prepare_output_dir(&output)?;
            log::info!(
                "Generating random board ({}x{}, Layers: {}, Nets: {}, Obstacles: {})...",
                width,
                height,
                layers,
                nets,
                obstacles
            );
            let spec = BoardSpec {
                width,
                height,
                layers,
                nets,
                obstacles,
                pitch,
                seed,
            };
            let board = generator::generate_random_board(&spec)?;
            board.save(Path::new(&output))?;
            log::info!("Generated: {}", output);
        }
        Commands::Route { board, single_pass } => {
            if let Some(board) = board {
                config.input.board_file = board.to_string_lossy().into_owned();
            }
            if single_pass {
                config.input.negotiated = false;
            }
            if !Path::new(&config.input.board_file).exists() {
                return Err(anyhow::anyhow!(
                    "Board file missing: '{}'. Did you run 'generate'?",
                    config.input.board_file
                ));
            }

            if run_routing(&config).is_err() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn prepare_output_dir(path_str: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path_str).parent() {
        if !parent.exists() && !parent.as_os_str().is_empty() {
            log::info!("Creating output directory: {:?}", parent);
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn run_routing(config: &Config) -> anyhow::Result<()> {
    log::info!("Parsing Board: {}", config.input.board_file);
    let board = Board::load(Path::new(&config.input.board_file))?;
    log::info!(
        "Board: {}x{}, {} layers, {} obstacles, {} nets",
        board.outline.width,
        board.outline.height,
        board.outline.layers,
        board.obstacles.len(),
        board.nets.len()
    );

    let (router, report) = pcb_router::route(&board, config).map_err(|e| {
        log::error!("Routing aborted: {}", e);
        anyhow::anyhow!(e)
    })?;

    let stats = router.get_statistics();
    log::info!(
        "Routed {}/{} nets. Searches: {}, Nodes explored: {} (avg {:.1})",
        report.routed_count(),
        report.results.len(),
        stats.searches,
        stats.total_nodes_explored,
        stats.avg_nodes_per_route
    );
    for result in report.results.values().filter(|r| !r.success) {
        log::warn!("Net {} unrouted: {:?}", result.net_id, result.failure);
    }
    for conflict in &report.conflicts {
        log::warn!("Shared cell {} between nets {:?}", conflict.coord, conflict.nets);
    }

    let results: Vec<RouteResult> = report.results.values().cloned().collect();
    if let Err(e) = check::run_route_check(
        router.grid(),
        &results,
        router.routing_config().allow_diagonal,
    ) {
        log::error!("{}", e);
        return Err(anyhow::anyhow!(e));
    }

    if let Some(image) = &config.input.output_image {
        prepare_output_dir(image)?;
        log::info!("Generating routing visualization...");
        let grid = router.grid();
        visualization::draw_routed_board(
            grid.cols(),
            grid.rows(),
            &grid.obstacles(),
            &results,
            Path::new(image),
            4,
        )?;
    }

    Ok(())
}
