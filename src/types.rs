use ::rand as external_rand;
use external_rand::distributions::{Distribution, WeightedIndex};
use external_rand::Rng;
use serde::{Deserialize, Serialize};

pub type BranchId = u32;
pub type FruitId = u32;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_sq(&self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FruitType {
    Red,
    Blue,
    /// Rare
    Gold,
}

impl FruitType {
    pub const ALL: [FruitType; 3] = [FruitType::Red, FruitType::Blue, FruitType::Gold];

    /// Draw a fruit type using relative `[red, blue, gold]` weights.
    pub fn pick<R: Rng + ?Sized>(weights: &[u32; 3], rng: &mut R) -> FruitType {
        match WeightedIndex::new(weights) {
            Ok(dist) => Self::ALL[dist.sample(rng)],
            Err(_) => FruitType::Red,
        }
    }

    pub fn color(&self) -> [u8; 3] {
        match self {
            FruitType::Red => [220, 30, 30],
            FruitType::Blue => [40, 80, 230],
            FruitType::Gold => [255, 200, 0],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fruit {
    pub id: FruitId,
    pub source_branch: BranchId,
    pub kind: FruitType,
    pub position: Point,
    pub radius: f32,
    pub color: [u8; 3],
    #[serde(default)]
    pub collected: bool,
}

impl Fruit {
    pub fn new(
        id: FruitId,
        source_branch: BranchId,
        kind: FruitType,
        position: Point,
        radius: f32,
    ) -> Self {
        Self {
            id,
            source_branch,
            kind,
            position,
            radius,
            color: kind.color(),
            collected: false,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        self.position.distance_sq(point) <= self.radius * self.radius
    }
}
