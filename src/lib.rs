//! Time Travel Tree: grow a tree one turn at a time, tend it with water and
//! fertiliser, prune it, pick its fruit, and undo any of it.

pub mod action;
pub mod api;
pub mod branch;
pub mod config;
pub mod console;
pub mod error;
pub mod game;
pub mod persistence;
pub mod player;
pub mod timeline;
pub mod tree;
pub mod types;

pub use action::Action;
pub use branch::Branch;
pub use config::GameConfig;
pub use error::{GardenError, Result};
pub use game::{Game, GardenState, InputEvent, Mode, Outcome};
pub use player::Player;
pub use timeline::Timeline;
pub use tree::{GrowthReport, Tree};
pub use types::{BranchId, Fruit, FruitId, FruitType, Point};
