use ::rand as external_rand;
use external_rand::rngs::StdRng;
use external_rand::SeedableRng;
use serde::Serialize;

use crate::action::Action;
use crate::config::GameConfig;
use crate::error::Result;
use crate::player::Player;
use crate::timeline::Timeline;
use crate::tree::Tree;
use crate::types::{BranchId, Point};

// Game state - everything an action can touch
#[derive(Clone, Debug)]
pub struct GardenState {
    pub tree: Tree,
    pub player: Player,
}

impl GardenState {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            tree: Tree::with_config(config.clone()),
            player: Player::new(config.initial_water_supply, config.initial_fertiliser_supply),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Tending,
    /// The next click picks a branch to cut
    Pruning,
}

/// One player input, already decoded from whatever front end produced it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    Water(f32),
    Fertilise(f32),
    Grow,
    BeginPrune,
    CancelPrune,
    Click(Point),
    Harvest(Point),
    Undo,
}

/// What handling an input did.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Performed { action: String },
    Undone { action: String },
    ModeChanged { mode: Mode },
    /// Input had no effect, e.g. a click on empty space
    Ignored,
}

// Game - a garden plus its history and input mode
pub struct Game {
    pub state: GardenState,
    pub timeline: Timeline,
    pub config: GameConfig,
    pub mode: Mode,
    rng: StdRng,
}

// Deref so callers can write game.tree instead of game.state.tree
impl std::ops::Deref for Game {
    type Target = GardenState;
    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl std::ops::DerefMut for Game {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state
    }
}

impl Game {
    pub fn new(config: GameConfig) -> Self {
        let state = GardenState::new(&config);
        Self::with_state(config, state)
    }

    /// Resume from an existing garden, e.g. one read from a save file.
    /// History does not survive a save, so the timeline starts empty.
    pub fn with_state(config: GameConfig, state: GardenState) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        tracing::info!(
            branches = state.tree.len(),
            water_supply = state.player.water_supply(),
            fertiliser_supply = state.player.fertiliser_supply(),
            seeded = config.seed.is_some(),
            "game ready"
        );
        Self {
            state,
            timeline: Timeline::new(),
            config,
            mode: Mode::Tending,
            rng,
        }
    }

    pub fn perform(&mut self, action: Action) -> Result<String> {
        self.timeline
            .perform_action(action, &mut self.state, &mut self.rng)?;
        Ok(self
            .timeline
            .iter()
            .last()
            .map(ToString::to_string)
            .unwrap_or_default())
    }

    pub fn undo(&mut self) -> Result<String> {
        let action = self.timeline.reverse_action(&mut self.state)?;
        Ok(action.to_string())
    }

    pub fn water(&mut self, amount: f32) -> Result<String> {
        self.perform(Action::water(amount))
    }

    pub fn fertilise(&mut self, amount: f32) -> Result<String> {
        self.perform(Action::fertilise(amount))
    }

    pub fn grow(&mut self) -> Result<String> {
        self.perform(Action::grow())
    }

    pub fn prune(&mut self, id: BranchId) -> Result<String> {
        self.perform(Action::prune(id))
    }

    /// Prune whatever branch is under `point`. `None` when nothing was hit.
    pub fn prune_at(&mut self, point: Point) -> Result<Option<String>> {
        match self.state.tree.branch_at(point) {
            Some(id) => self.prune(id).map(Some),
            None => Ok(None),
        }
    }

    /// A single-shot pruning click for front ends without a persistent mode.
    /// The game is back in tending mode afterwards, whether the click hit,
    /// missed or failed.
    pub fn click_once(&mut self, point: Point) -> Result<Outcome> {
        self.set_mode(Mode::Pruning);
        let outcome = self.handle_input(InputEvent::Click(point));
        self.set_mode(Mode::Tending);
        outcome
    }

    pub fn harvest(&mut self, point: Point) -> Result<String> {
        self.perform(Action::harvest(point))
    }

    pub fn handle_input(&mut self, event: InputEvent) -> Result<Outcome> {
        let performed = |action| Outcome::Performed { action };
        match (self.mode, event) {
            (_, InputEvent::Water(amount)) => self.water(amount).map(performed),
            (_, InputEvent::Fertilise(amount)) => self.fertilise(amount).map(performed),
            (_, InputEvent::Grow) => self.grow().map(performed),
            (_, InputEvent::Harvest(point)) => self.harvest(point).map(performed),
            (_, InputEvent::Undo) => self.undo().map(|action| Outcome::Undone { action }),
            (_, InputEvent::BeginPrune) => Ok(self.set_mode(Mode::Pruning)),
            (_, InputEvent::CancelPrune) => Ok(self.set_mode(Mode::Tending)),
            (Mode::Pruning, InputEvent::Click(point)) => match self.prune_at(point)? {
                Some(action) => {
                    self.mode = Mode::Tending;
                    Ok(performed(action))
                }
                None => Ok(Outcome::Ignored),
            },
            (Mode::Tending, InputEvent::Click(_)) => Ok(Outcome::Ignored),
        }
    }

    fn set_mode(&mut self, mode: Mode) -> Outcome {
        if self.mode != mode {
            tracing::debug!(?mode, "mode changed");
        }
        self.mode = mode;
        Outcome::ModeChanged { mode }
    }

    /// Start over with a fresh garden and an empty history.
    pub fn reset(&mut self) {
        self.state = GardenState::new(&self.config);
        self.timeline.clear();
        self.mode = Mode::Tending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GardenError;

    fn seeded() -> GameConfig {
        GameConfig {
            seed: Some(7),
            ..GameConfig::default()
        }
    }

    #[test]
    fn new_game_uses_configured_supplies() {
        let game = Game::new(seeded());
        assert_eq!(game.player.water_supply(), 10.0);
        assert_eq!(game.player.fertiliser_supply(), 5.0);
        assert_eq!(game.tree.len(), 1);
        assert_eq!(game.mode, Mode::Tending);
    }

    #[test]
    fn click_prunes_only_in_pruning_mode() {
        let mut game = Game::new(seeded());
        let on_trunk = game.tree.branch(0).unwrap().center();

        assert_eq!(
            game.handle_input(InputEvent::Click(on_trunk)).unwrap(),
            Outcome::Ignored
        );
        assert_eq!(game.tree.len(), 1);

        game.handle_input(InputEvent::BeginPrune).unwrap();
        // A miss keeps the player in pruning mode
        assert_eq!(
            game.handle_input(InputEvent::Click(Point::new(-500.0, -500.0)))
                .unwrap(),
            Outcome::Ignored
        );
        assert_eq!(game.mode, Mode::Pruning);

        let outcome = game.handle_input(InputEvent::Click(on_trunk)).unwrap();
        assert!(matches!(outcome, Outcome::Performed { .. }));
        assert!(game.tree.is_empty());
        assert_eq!(game.mode, Mode::Tending);

        game.handle_input(InputEvent::Undo).unwrap();
        assert_eq!(game.tree.len(), 1);
    }

    #[test]
    fn cancel_prune_returns_to_tending() {
        let mut game = Game::new(seeded());
        game.handle_input(InputEvent::BeginPrune).unwrap();
        assert_eq!(
            game.handle_input(InputEvent::CancelPrune).unwrap(),
            Outcome::ModeChanged {
                mode: Mode::Tending
            }
        );
    }

    #[test]
    fn errors_surface_through_handle_input() {
        let mut game = Game::new(seeded());
        assert!(matches!(
            game.handle_input(InputEvent::Undo),
            Err(GardenError::NothingToUndo)
        ));
        assert!(matches!(
            game.handle_input(InputEvent::Water(100.0)),
            Err(GardenError::InsufficientWater { .. })
        ));
        assert!(game.timeline.is_empty());
    }

    #[test]
    fn click_once_always_ends_in_tending_mode() {
        let mut game = Game::new(seeded());
        let on_trunk = game.tree.branch(0).unwrap().center();

        let missed = game.click_once(Point::new(-500.0, -500.0)).unwrap();
        assert_eq!(missed, Outcome::Ignored);
        assert_eq!(game.mode, Mode::Tending);

        // Already pruning beforehand makes no difference
        game.handle_input(InputEvent::BeginPrune).unwrap();
        let hit = game.click_once(on_trunk).unwrap();
        assert!(matches!(hit, Outcome::Performed { .. }));
        assert_eq!(game.mode, Mode::Tending);
        assert!(game.tree.is_empty());
        assert_eq!(game.timeline.len(), 1);
    }

    #[test]
    fn reset_clears_history() {
        let mut game = Game::new(seeded());
        game.grow().unwrap();
        game.reset();
        assert!(game.timeline.is_empty());
        assert_eq!(game.tree.branch(0).unwrap().age(), 0);
    }
}
