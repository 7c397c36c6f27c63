use ::rand as external_rand;
use external_rand::Rng;

use crate::action::Action;
use crate::error::{GardenError, Result};
use crate::game::GardenState;

/// History of successfully performed actions, newest last.
#[derive(Debug, Default)]
pub struct Timeline {
    actions: Vec<Action>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Perform `action` and keep it for undo. Failed actions are not kept.
    pub fn perform_action<R: Rng + ?Sized>(
        &mut self,
        mut action: Action,
        garden: &mut GardenState,
        rng: &mut R,
    ) -> Result<()> {
        if let Err(e) = action.perform(garden, rng) {
            tracing::debug!(action = action.label(), error = %e, "action failed");
            return Err(e);
        }
        tracing::debug!(action = %action, depth = self.actions.len() + 1, "action performed");
        self.actions.push(action);
        Ok(())
    }

    /// Reverse the newest action and hand it back.
    pub fn reverse_action(&mut self, garden: &mut GardenState) -> Result<Action> {
        let Some(mut action) = self.actions.pop() else {
            tracing::warn!("undo requested with an empty timeline");
            return Err(GardenError::NothingToUndo);
        };
        action.reverse(garden);
        tracing::debug!(action = action.label(), depth = self.actions.len(), "action reversed");
        Ok(action)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::player::Player;
    use crate::tree::Tree;
    use ::rand::rngs::StdRng;
    use ::rand::SeedableRng;

    fn garden() -> GardenState {
        GardenState {
            tree: Tree::with_config(GameConfig::default()),
            player: Player::new(5.0, 5.0),
        }
    }

    #[test]
    fn failed_actions_are_not_recorded() {
        let mut garden = garden();
        let mut rng = StdRng::seed_from_u64(1);
        let mut timeline = Timeline::new();

        assert!(timeline
            .perform_action(Action::water(50.0), &mut garden, &mut rng)
            .is_err());
        assert!(timeline.is_empty());

        timeline
            .perform_action(Action::water(1.0), &mut garden, &mut rng)
            .unwrap();
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn undo_on_empty_history_reports_nothing_to_undo() {
        let mut garden = garden();
        let mut timeline = Timeline::new();
        assert!(matches!(
            timeline.reverse_action(&mut garden),
            Err(GardenError::NothingToUndo)
        ));
    }

    #[test]
    fn undo_pops_newest_first() {
        let mut garden = garden();
        let mut rng = StdRng::seed_from_u64(1);
        let mut timeline = Timeline::new();
        timeline
            .perform_action(Action::water(1.0), &mut garden, &mut rng)
            .unwrap();
        timeline
            .perform_action(Action::fertilise(2.0), &mut garden, &mut rng)
            .unwrap();

        let labels: Vec<_> = timeline.iter().map(Action::label).collect();
        assert_eq!(labels, vec!["water", "fertilise"]);

        let undone = timeline.reverse_action(&mut garden).unwrap();
        assert_eq!(undone.label(), "fertilise");
        assert_eq!(garden.player.fertiliser_supply(), 5.0);
        assert_eq!(garden.player.water_supply(), 4.0);

        timeline.reverse_action(&mut garden).unwrap();
        assert_eq!(garden.player, Player::new(5.0, 5.0));
        assert!(timeline.is_empty());
    }
}
