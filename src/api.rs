// API module for headless mode - HTTP endpoints to play the game

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use crate::config::GameConfig;
use crate::error::GardenError;
use crate::game::{Game, InputEvent, Mode, Outcome};
use crate::tree::TreeStats;
use crate::types::{BranchId, Fruit, Point};

// Serializable views of game data for API responses
#[derive(Serialize, Clone)]
pub struct BranchData {
    pub id: BranchId,
    pub parent: Option<BranchId>,
    pub children: Vec<BranchId>,
    pub center: Point,
    pub width: f32,
    pub length: f32,
    pub angle: f32,
    pub age: u32,
    pub alive: bool,
    pub turns_without_water: u32,
    pub turns_without_nutrients: u32,
    pub corners: [Point; 4],
    pub leaves: Vec<Point>,
}

#[derive(Serialize, Clone)]
pub struct PlayerData {
    pub water_supply: f32,
    pub fertiliser_supply: f32,
}

#[derive(Serialize, Clone)]
pub struct StatsData {
    #[serde(flatten)]
    pub tree: TreeStats,
    pub water_supply: f32,
    pub fertiliser_supply: f32,
    pub undo_depth: usize,
    pub mode: Mode,
}

#[derive(Serialize, Clone)]
pub struct GameStateResponse {
    pub branches: Vec<BranchData>,
    pub fruits: Vec<Fruit>,
    pub player: PlayerData,
    pub history: Vec<String>,
    pub stats: StatsData,
}

#[derive(Serialize)]
pub struct ActionResponse {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub state: GameStateResponse,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
pub struct AmountQuery {
    pub amount: f32,
}

#[derive(Deserialize)]
pub struct PruneQuery {
    pub id: BranchId,
}

#[derive(Deserialize)]
pub struct PointQuery {
    pub x: f32,
    pub y: f32,
}

impl From<PointQuery> for Point {
    fn from(q: PointQuery) -> Self {
        Point::new(q.x, q.y)
    }
}

/// Game errors become a status code plus a JSON message.
pub struct ApiError(StatusCode, String);

impl From<GardenError> for ApiError {
    fn from(e: GardenError) -> Self {
        let status = match e {
            GardenError::UnknownBranch(_) | GardenError::NoFruitAtPoint { .. } => {
                StatusCode::NOT_FOUND
            }
            GardenError::InsufficientWater { .. }
            | GardenError::InsufficientFertiliser { .. }
            | GardenError::NothingToUndo => StatusCode::CONFLICT,
            GardenError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

fn poisoned() -> ApiError {
    ApiError(StatusCode::INTERNAL_SERVER_ERROR, "game lock poisoned".into())
}

// Shared state for the API server
#[derive(Clone)]
pub struct ApiState {
    pub game: Arc<Mutex<Game>>,
}

impl ApiState {
    pub fn new(game: Game) -> Self {
        Self {
            game: Arc::new(Mutex::new(game)),
        }
    }
}

fn stats_of(game: &Game) -> StatsData {
    StatsData {
        tree: game.tree.stats(),
        water_supply: game.player.water_supply(),
        fertiliser_supply: game.player.fertiliser_supply(),
        undo_depth: game.timeline.len(),
        mode: game.mode,
    }
}

// Helper function to convert game state to API response
fn game_to_response(game: &Game) -> GameStateResponse {
    GameStateResponse {
        branches: game
            .tree
            .branches()
            .iter()
            .map(|b| BranchData {
                id: b.id(),
                parent: b.parent(),
                children: b.children().to_vec(),
                center: b.center(),
                width: b.width(),
                length: b.length(),
                angle: b.angle(),
                age: b.age(),
                alive: b.is_alive(),
                turns_without_water: b.turns_without_water(),
                turns_without_nutrients: b.turns_without_nutrients(),
                corners: b.corners(),
                leaves: b.leaves().to_vec(),
            })
            .collect(),
        fruits: game.tree.fruits().to_vec(),
        player: PlayerData {
            water_supply: game.player.water_supply(),
            fertiliser_supply: game.player.fertiliser_supply(),
        },
        history: game.timeline.iter().map(ToString::to_string).collect(),
        stats: stats_of(game),
    }
}

fn apply(api_state: &ApiState, event: InputEvent) -> Result<Json<ActionResponse>, ApiError> {
    let mut game = api_state.game.lock().map_err(|_| poisoned())?;
    let outcome = game.handle_input(event)?;
    Ok(Json(ActionResponse {
        outcome,
        state: game_to_response(&game),
    }))
}

// GET /state - Get the whole garden
async fn get_state(
    State(api_state): State<ApiState>,
) -> Result<Json<GameStateResponse>, ApiError> {
    let game = api_state.game.lock().map_err(|_| poisoned())?;
    Ok(Json(game_to_response(&game)))
}

// GET /stats - Get summary numbers
async fn get_stats(State(api_state): State<ApiState>) -> Result<Json<StatsData>, ApiError> {
    let game = api_state.game.lock().map_err(|_| poisoned())?;
    Ok(Json(stats_of(&game)))
}

// GET /config - Get game configuration
async fn get_config(State(api_state): State<ApiState>) -> Result<Json<GameConfig>, ApiError> {
    let game = api_state.game.lock().map_err(|_| poisoned())?;
    Ok(Json(game.config.clone()))
}

// POST /water?amount=N
async fn water(
    Query(q): Query<AmountQuery>,
    State(api_state): State<ApiState>,
) -> Result<Json<ActionResponse>, ApiError> {
    apply(&api_state, InputEvent::Water(q.amount))
}

// POST /fertilise?amount=N
async fn fertilise(
    Query(q): Query<AmountQuery>,
    State(api_state): State<ApiState>,
) -> Result<Json<ActionResponse>, ApiError> {
    apply(&api_state, InputEvent::Fertilise(q.amount))
}

// POST /grow - Advance one turn
async fn grow(State(api_state): State<ApiState>) -> Result<Json<ActionResponse>, ApiError> {
    apply(&api_state, InputEvent::Grow)
}

// POST /prune?id=N - Cut a branch by id
async fn prune(
    Query(q): Query<PruneQuery>,
    State(api_state): State<ApiState>,
) -> Result<Json<ActionResponse>, ApiError> {
    let mut game = api_state.game.lock().map_err(|_| poisoned())?;
    let action = game.prune(q.id)?;
    Ok(Json(ActionResponse {
        outcome: Outcome::Performed { action },
        state: game_to_response(&game),
    }))
}

// POST /click?x=&y= - Cut whatever branch is under the point
async fn click(
    Query(q): Query<PointQuery>,
    State(api_state): State<ApiState>,
) -> Result<Json<ActionResponse>, ApiError> {
    let mut game = api_state.game.lock().map_err(|_| poisoned())?;
    let outcome = game.click_once(q.into())?;
    Ok(Json(ActionResponse {
        outcome,
        state: game_to_response(&game),
    }))
}

// POST /harvest?x=&y= - Pick the fruit under the point
async fn harvest(
    Query(q): Query<PointQuery>,
    State(api_state): State<ApiState>,
) -> Result<Json<ActionResponse>, ApiError> {
    apply(&api_state, InputEvent::Harvest(q.into()))
}

// POST /undo - Reverse the last action
async fn undo(State(api_state): State<ApiState>) -> Result<Json<ActionResponse>, ApiError> {
    apply(&api_state, InputEvent::Undo)
}

// Create the API router
pub fn create_router(api_state: ApiState) -> Router {
    Router::new()
        .route("/state", get(get_state))
        .route("/stats", get(get_stats))
        .route("/config", get(get_config))
        .route("/water", post(water))
        .route("/fertilise", post(fertilise))
        .route("/grow", post(grow))
        .route("/prune", post(prune))
        .route("/click", post(click))
        .route("/harvest", post(harvest))
        .route("/undo", post(undo))
        .layer(CorsLayer::permissive())
        .with_state(api_state)
}

// Run the API server until Ctrl-C
pub async fn run_server(api_state: ApiState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(api_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tracing::info!(port, "headless API server listening");
    println!("Time Travel Tree headless API server running on http://localhost:{}", port);
    println!("Endpoints:");
    println!("  GET  /state  - Get branches, fruit, player and history");
    println!("  GET  /stats  - Get summary numbers");
    println!("  GET  /config - Get game configuration");
    println!("  POST /water?amount=N     - Pour water from the player's supply");
    println!("  POST /fertilise?amount=N - Spread fertiliser from the player's supply");
    println!("  POST /grow               - Advance one turn");
    println!("  POST /prune?id=N         - Cut branch N and its subtree");
    println!("  POST /click?x=X&y=Y      - Cut the branch under a point");
    println!("  POST /harvest?x=X&y=Y    - Pick the fruit under a point");
    println!("  POST /undo               - Reverse the last action");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
