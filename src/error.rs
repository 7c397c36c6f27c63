use thiserror::Error;

use crate::types::BranchId;

#[derive(Debug, Error)]
pub enum GardenError {
    #[error("not enough water: requested {requested}, have {available}")]
    InsufficientWater { requested: f32, available: f32 },

    #[error("not enough fertiliser: requested {requested}, have {available}")]
    InsufficientFertiliser { requested: f32, available: f32 },

    #[error("amount must be a non-negative number, got {0}")]
    InvalidAmount(f32),

    #[error("resizing branch {id} would leave it {width} wide and {length} long")]
    InvalidResize {
        id: BranchId,
        width: f32,
        length: f32,
    },

    #[error("expected {expected} deltas per dimension, got {width} widths and {length} lengths")]
    DeltaLengthMismatch {
        expected: usize,
        width: usize,
        length: usize,
    },

    #[error("no branch with id {0}")]
    UnknownBranch(BranchId),

    #[error("no fruit at ({x}, {y})")]
    NoFruitAtPoint { x: f32, y: f32 },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("corrupt save data: {0}")]
    CorruptSave(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, GardenError>;
