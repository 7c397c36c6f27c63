// Save files - JSON documents holding the player and the tree side by side

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::branch::Branch;
use crate::config::GameConfig;
use crate::error::{GardenError, Result};
use crate::game::GardenState;
use crate::player::Player;
use crate::tree::Tree;
use crate::types::{BranchId, Fruit, Point};

fn default_alive() -> bool {
    true
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BranchRecord {
    pub id: BranchId,
    /// `null` or `-1` for the root
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub age: u32,
    pub center: Point,
    pub width: f32,
    pub length: f32,
    pub angle: f32,
    #[serde(default)]
    pub children: Vec<BranchId>,
    #[serde(default)]
    pub has_leaves: bool,
    #[serde(default)]
    pub leaves: Vec<Point>,
    #[serde(default)]
    pub turns_without_water: u32,
    #[serde(default)]
    pub turns_without_nutrients: u32,
    #[serde(default = "default_alive")]
    pub is_alive: bool,
}

impl From<&Branch> for BranchRecord {
    fn from(b: &Branch) -> Self {
        Self {
            id: b.id(),
            parent_id: b.parent().map(i64::from),
            age: b.age(),
            center: b.center(),
            width: b.width(),
            length: b.length(),
            angle: b.angle(),
            children: b.children().to_vec(),
            has_leaves: b.has_leaves(),
            leaves: b.leaves().to_vec(),
            turns_without_water: b.turns_without_water(),
            turns_without_nutrients: b.turns_without_nutrients(),
            is_alive: b.is_alive(),
        }
    }
}

impl TryFrom<BranchRecord> for Branch {
    type Error = GardenError;

    fn try_from(r: BranchRecord) -> Result<Self> {
        let parent = match r.parent_id {
            None | Some(-1) => None,
            Some(p) => Some(BranchId::try_from(p).map_err(|_| {
                GardenError::CorruptSave(format!("branch {} has invalid parent id {p}", r.id))
            })?),
        };
        let mut children = r.children;
        children.sort_unstable();
        children.dedup();
        // Dead wood carries no leaves whatever the file says
        let leaves = if r.is_alive { r.leaves } else { Vec::new() };

        Ok(Branch {
            id: r.id,
            parent,
            children,
            center: r.center,
            width: r.width,
            length: r.length,
            angle: r.angle,
            age: r.age,
            leaves,
            turns_without_water: r.turns_without_water,
            turns_without_nutrients: r.turns_without_nutrients,
            alive: r.is_alive,
        })
    }
}

/// Saved tree. Capacities are left out and recomputed from branch areas.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TreeRecord {
    #[serde(default)]
    pub next_id: BranchId,
    pub water_level: f32,
    pub nutrient_level: f32,
    pub branches: Vec<BranchRecord>,
    #[serde(default)]
    pub fruits: Vec<Fruit>,
}

impl From<&Tree> for TreeRecord {
    fn from(tree: &Tree) -> Self {
        Self {
            next_id: tree.next_id(),
            water_level: tree.water_level(),
            nutrient_level: tree.nutrient_level(),
            branches: tree.branches().iter().map(BranchRecord::from).collect(),
            fruits: tree.fruits().to_vec(),
        }
    }
}

impl TreeRecord {
    pub fn into_tree(self, config: GameConfig) -> Result<Tree> {
        let cap = config.max_leaves_per_branch;
        let branches = self
            .branches
            .into_iter()
            .map(|record| {
                let mut branch = Branch::try_from(record)?;
                branch.leaves.truncate(cap);
                Ok(branch)
            })
            .collect::<Result<Vec<_>>>()?;
        Tree::from_parts(
            config,
            self.next_id,
            self.water_level,
            self.nutrient_level,
            branches,
            self.fruits,
        )
    }
}

#[derive(Serialize, Debug)]
struct SaveFile<'a> {
    player: &'a Player,
    tree: TreeRecord,
}

// Each half is kept as raw JSON so one bad entity does not sink the other
#[derive(Deserialize, Debug)]
struct RawSaveFile {
    #[serde(default)]
    player: Option<Value>,
    #[serde(default)]
    tree: Option<Value>,
}

pub fn save_game(state: &GardenState, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = SaveFile {
        player: &state.player,
        tree: TreeRecord::from(&state.tree),
    };
    fs::write(path, serde_json::to_string_pretty(&file)?)?;
    tracing::info!(path = %path.display(), branches = state.tree.len(), "game saved");
    Ok(())
}

pub fn player_from_value(value: Option<Value>) -> Result<Player> {
    let value = value.ok_or_else(|| GardenError::CorruptSave("missing player".into()))?;
    Ok(serde_json::from_value(value)?)
}

pub fn tree_from_value(value: Option<Value>, config: GameConfig) -> Result<Tree> {
    let value = value.ok_or_else(|| GardenError::CorruptSave("missing tree".into()))?;
    let record: TreeRecord = serde_json::from_value(value)?;
    record.into_tree(config)
}

/// Read a save file. An unreadable file is an error; a damaged player or tree
/// is replaced by a fresh one from `config` and the other half is kept.
pub fn load_game(path: impl AsRef<Path>, config: &GameConfig) -> Result<GardenState> {
    let path = path.as_ref();
    let raw: RawSaveFile = serde_json::from_str(&fs::read_to_string(path)?)?;

    let player = player_from_value(raw.player).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "player data unusable, starting fresh");
        Player::new(config.initial_water_supply, config.initial_fertiliser_supply)
    });
    let tree = tree_from_value(raw.tree, config.clone()).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "tree data unusable, starting fresh");
        Tree::with_config(config.clone())
    });

    tracing::info!(path = %path.display(), branches = tree.len(), "game loaded");
    Ok(GardenState { tree, player })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Game;
    use tempfile::TempDir;

    fn seeded() -> GameConfig {
        GameConfig {
            seed: Some(42),
            sprout_probability: 1.0,
            fruit_probability: 1.0,
            ..GameConfig::default()
        }
    }

    #[test]
    fn saved_games_load_back_identically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");
        let mut game = Game::new(seeded());
        game.grow().unwrap();
        game.water(2.0).unwrap();

        save_game(&game.state, &path).unwrap();
        let loaded = load_game(&path, &game.config).unwrap();

        assert_eq!(loaded.player, game.player);
        assert_eq!(loaded.tree.branches(), game.tree.branches());
        assert_eq!(loaded.tree.fruits(), game.tree.fruits());
        assert_eq!(loaded.tree.next_id(), game.tree.next_id());
        assert_eq!(loaded.tree.max_water(), game.tree.max_water());
    }

    #[test]
    fn old_saves_without_optional_fields_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.json");
        let json = r#"{
            "player": { "water_supply": 7.0, "fertiliser_supply": 2.0 },
            "tree": {
                "next_id": 2,
                "water_level": 4.0,
                "nutrient_level": 3.0,
                "branches": [
                    { "id": 0, "parent_id": -1, "age": 3, "center": { "x": 400.0, "y": 475.0 },
                      "width": 10.0, "length": 50.0, "angle": 0.0, "children": [1] },
                    { "id": 1, "parent_id": 0, "age": 1, "center": { "x": 400.0, "y": 425.0 },
                      "width": 5.0, "length": 50.0, "angle": 0.0, "children": [] }
                ]
            }
        }"#;
        fs::write(&path, json).unwrap();

        let state = load_game(&path, &GameConfig::default()).unwrap();
        assert_eq!(state.player, Player::new(7.0, 2.0));
        let tree = &state.tree;
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.branch(0).unwrap().parent(), None);
        assert!(tree.branches().iter().all(|b| b.is_alive() && !b.has_leaves()));
        assert_eq!(tree.branch(1).unwrap().turns_without_water(), 0);
        assert!(tree.fruits().is_empty());
        assert_eq!(tree.max_water(), 750.0 / 50.0);
    }

    #[test]
    fn damaged_tree_falls_back_without_losing_player() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("damaged.json");
        let json = r#"{
            "player": { "water_supply": 1.5, "fertiliser_supply": 0.5 },
            "tree": {
                "water_level": 4.0,
                "nutrient_level": 3.0,
                "branches": [
                    { "id": 0, "center": { "x": 0.0, "y": 0.0 },
                      "width": 10.0, "length": 50.0, "angle": 0.0 },
                    { "id": 1, "parent_id": 7, "center": { "x": 0.0, "y": 0.0 },
                      "width": 10.0, "length": 50.0, "angle": 0.0 }
                ]
            }
        }"#;
        fs::write(&path, json).unwrap();

        let config = GameConfig::default();
        let state = load_game(&path, &config).unwrap();
        assert_eq!(state.player, Player::new(1.5, 0.5));
        assert_eq!(state.tree.len(), 1);
        assert_eq!(state.tree.water_level(), config.initial_water_level);
    }

    #[test]
    fn damaged_player_falls_back_without_losing_tree() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("player.json");
        let mut game = Game::new(seeded());
        game.grow().unwrap();
        let mut doc = serde_json::to_value(SaveFile {
            player: &game.player,
            tree: TreeRecord::from(&game.tree),
        })
        .unwrap();
        doc["player"] = serde_json::json!({ "water_supply": "lots" });
        fs::write(&path, doc.to_string()).unwrap();

        let state = load_game(&path, &game.config).unwrap();
        assert_eq!(state.player, Player::new(10.0, 5.0));
        assert_eq!(state.tree.len(), game.tree.len());
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            load_game(&missing, &GameConfig::default()),
            Err(GardenError::Io(_))
        ));

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "not json").unwrap();
        assert!(matches!(
            load_game(&garbage, &GameConfig::default()),
            Err(GardenError::Json(_))
        ));
    }

    #[test]
    fn negative_parent_other_than_root_marker_is_rejected() {
        let record = BranchRecord {
            id: 3,
            parent_id: Some(-4),
            age: 0,
            center: Point::default(),
            width: 1.0,
            length: 1.0,
            angle: 0.0,
            children: Vec::new(),
            has_leaves: false,
            leaves: Vec::new(),
            turns_without_water: 0,
            turns_without_nutrients: 0,
            is_alive: true,
        };
        assert!(matches!(
            Branch::try_from(record),
            Err(GardenError::CorruptSave(_))
        ));
    }

    fn single_branch_tree(id: u64) -> Value {
        serde_json::json!({
            "water_level": 4.0,
            "nutrient_level": 3.0,
            "branches": [
                { "id": id, "center": { "x": 0.0, "y": 0.0 },
                  "width": 10.0, "length": 50.0, "angle": 0.0 }
            ]
        })
    }

    #[test]
    fn branch_id_at_the_top_of_the_range_falls_back() {
        let config = GameConfig::default();
        assert!(matches!(
            tree_from_value(Some(single_branch_tree(u64::from(u32::MAX))), config.clone()),
            Err(GardenError::CorruptSave(_))
        ));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("overflow.json");
        let doc = serde_json::json!({
            "player": { "water_supply": 2.0, "fertiliser_supply": 1.0 },
            "tree": single_branch_tree(u64::from(u32::MAX)),
        });
        fs::write(&path, doc.to_string()).unwrap();

        let state = load_game(&path, &config).unwrap();
        assert_eq!(state.player, Player::new(2.0, 1.0));
        assert_eq!(state.tree.len(), 1);
        assert!(state.tree.branch(0).is_some());
    }

    #[test]
    fn cyclic_save_is_rejected() {
        let json = serde_json::json!({
            "water_level": 4.0,
            "nutrient_level": 3.0,
            "branches": [
                { "id": 0, "parent_id": 1, "center": { "x": 0.0, "y": 0.0 },
                  "width": 10.0, "length": 50.0, "angle": 0.0, "children": [1] },
                { "id": 1, "parent_id": 0, "center": { "x": 0.0, "y": 0.0 },
                  "width": 10.0, "length": 50.0, "angle": 0.0, "children": [0] }
            ]
        });
        assert!(matches!(
            tree_from_value(Some(json.clone()), GameConfig::default()),
            Err(GardenError::CorruptSave(_))
        ));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cycle.json");
        let doc = serde_json::json!({
            "player": { "water_supply": 2.0, "fertiliser_supply": 1.0 },
            "tree": json,
        });
        fs::write(&path, doc.to_string()).unwrap();
        let state = load_game(&path, &GameConfig::default()).unwrap();
        assert_eq!(state.tree.len(), 1);
        assert_eq!(state.tree.branch(0).unwrap().parent(), None);
    }

    #[test]
    fn saved_leaves_are_capped_on_load() {
        let config = GameConfig {
            max_leaves_per_branch: 2,
            ..GameConfig::default()
        };
        let leaves: Vec<Value> = (0..6)
            .map(|i| serde_json::json!({ "x": i as f32, "y": 0.0 }))
            .collect();
        let json = serde_json::json!({
            "water_level": 4.0,
            "nutrient_level": 3.0,
            "branches": [
                { "id": 0, "center": { "x": 0.0, "y": 0.0 }, "width": 10.0,
                  "length": 50.0, "angle": 0.0, "has_leaves": true, "leaves": leaves }
            ]
        });

        let tree = tree_from_value(Some(json), config).unwrap();
        let trunk = tree.branch(0).unwrap();
        assert_eq!(trunk.leaves().len(), 2);
        assert_eq!(trunk.leaves()[1], Point::new(1.0, 0.0));
    }
}
