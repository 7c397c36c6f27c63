use clap::Parser;
use std::io;

use timetree::api::{run_server, ApiState};
use timetree::config::GameConfig;
use timetree::game::{GardenState, Game};
use timetree::{console, persistence};

#[derive(Parser, Debug)]
#[command(author, version, about = "Time Travel Tree", long_about = None)]
struct Args {
    /// Run in headless mode (HTTP API server)
    #[arg(long)]
    headless: bool,

    /// Port for headless API server
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Configuration file path (YAML or JSON). If not specified, searches for
    /// timetree.yaml, timetree.yml, or timetree.json in current directory.
    #[arg(short, long)]
    config: Option<String>,

    /// Resume from a save file
    #[arg(long)]
    load: Option<String>,

    /// Write the game to this file on exit
    #[arg(long)]
    save: Option<String>,

    /// Seed for reproducible growth; overrides the config file
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so console output stays readable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();

    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let game = match args.load.as_deref() {
        Some(path) => resume(path, config),
        None => Game::new(config),
    };

    if args.headless {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(headless_main(args.port, game, args.save.as_deref()))
    } else {
        console_main(game, args.save.as_deref())
    }
}

/// Load configuration from file or use default
fn load_config(config_path: Option<&str>) -> Result<GameConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        // User specified a config file
        GameConfig::from_file(path)
            .map_err(|e| format!("Failed to load config from {}: {}", path, e).into())
    } else {
        // Try default paths
        Ok(GameConfig::from_default_paths())
    }
}

fn resume(path: &str, config: GameConfig) -> Game {
    match persistence::load_game(path, &config) {
        Ok(state) => Game::with_state(config, state),
        Err(e) => {
            tracing::warn!(path, error = %e, "could not load save, starting a new game");
            let state = GardenState::new(&config);
            Game::with_state(config, state)
        }
    }
}

fn save_on_exit(game: &Game, path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = path {
        persistence::save_game(&game.state, path)?;
        println!("Game saved to {}", path);
    }
    Ok(())
}

fn console_main(mut game: Game, save: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    console::run(&mut game, stdin.lock(), &mut stdout)?;
    save_on_exit(&game, save)
}

/// Headless mode - runs HTTP API server
async fn headless_main(
    port: u16,
    game: Game,
    save: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let api_state = ApiState::new(game);
    run_server(api_state.clone(), port).await?;

    let game = api_state
        .game
        .lock()
        .map_err(|_| "game lock poisoned during shutdown")?;
    save_on_exit(&game, save)
}
