use ::rand as external_rand;
use external_rand::Rng;
use std::fmt;

use crate::branch::Branch;
use crate::error::{GardenError, Result};
use crate::game::GardenState;
use crate::tree::{GrowthReport, Sustenance};
use crate::types::{BranchId, FruitId, FruitType, Point};

/// A reversible change to the garden.
///
/// `perform` records whatever it needs so that `reverse`, called right after
/// with no other change in between, puts the tree and player back exactly as
/// they were. A failed `perform` leaves everything untouched.
#[derive(Debug)]
pub enum Action {
    Water(WateringAction),
    Fertilise(FertilisingAction),
    Grow(GrowingAction),
    Prune(PruningAction),
    Harvest(HarvestingAction),
}

impl Action {
    pub fn water(amount: f32) -> Self {
        Action::Water(WateringAction::new(amount))
    }

    pub fn fertilise(amount: f32) -> Self {
        Action::Fertilise(FertilisingAction::new(amount))
    }

    pub fn grow() -> Self {
        Action::Grow(GrowingAction::default())
    }

    pub fn prune(id: BranchId) -> Self {
        Action::Prune(PruningAction::new(id))
    }

    pub fn harvest(at: Point) -> Self {
        Action::Harvest(HarvestingAction::new(at))
    }

    pub fn perform<R: Rng + ?Sized>(
        &mut self,
        garden: &mut GardenState,
        rng: &mut R,
    ) -> Result<()> {
        match self {
            Action::Water(a) => a.perform(garden),
            Action::Fertilise(a) => a.perform(garden),
            Action::Grow(a) => a.perform(garden, rng),
            Action::Prune(a) => a.perform(garden),
            Action::Harvest(a) => a.perform(garden),
        }
    }

    pub fn reverse(&mut self, garden: &mut GardenState) {
        match self {
            Action::Water(a) => a.reverse(garden),
            Action::Fertilise(a) => a.reverse(garden),
            Action::Grow(a) => a.reverse(garden),
            Action::Prune(a) => a.reverse(garden),
            Action::Harvest(a) => a.reverse(garden),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::Water(_) => "water",
            Action::Fertilise(_) => "fertilise",
            Action::Grow(_) => "grow",
            Action::Prune(_) => "prune",
            Action::Harvest(_) => "harvest",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Water(a) => write!(f, "water {} (absorbed {})", a.requested, a.absorbed),
            Action::Fertilise(a) => {
                write!(f, "fertilise {} (absorbed {})", a.requested, a.absorbed)
            }
            Action::Grow(a) => match &a.report {
                Some(r) => write!(
                    f,
                    "grow ({} sprouted, {} fruit)",
                    r.new_branch_ids.len(),
                    r.new_fruit_ids.len()
                ),
                None => write!(f, "grow"),
            },
            Action::Prune(a) => write!(f, "prune {} ({} removed)", a.id, a.removed.len()),
            Action::Harvest(a) => match a.collected {
                Some((kind, id)) => write!(f, "harvest {kind:?} fruit {id}"),
                None => write!(f, "harvest at ({}, {})", a.at.x, a.at.y),
            },
        }
    }
}

fn check_amount(amount: f32) -> Result<()> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(GardenError::InvalidAmount(amount))
    }
}

#[derive(Debug)]
pub struct WateringAction {
    requested: f32,
    absorbed: f32,
    level_before: f32,
    supply_before: f32,
    previous_neglect: Vec<(BranchId, u32)>,
}

impl WateringAction {
    pub fn new(amount: f32) -> Self {
        Self {
            requested: amount,
            absorbed: 0.0,
            level_before: 0.0,
            supply_before: 0.0,
            previous_neglect: Vec::new(),
        }
    }

    pub fn absorbed(&self) -> f32 {
        self.absorbed
    }

    fn perform(&mut self, garden: &mut GardenState) -> Result<()> {
        check_amount(self.requested)?;
        self.supply_before = garden.player.water_supply();
        garden.player.use_water(self.requested)?;
        self.level_before = garden.tree.water_level();
        self.absorbed = garden.tree.add_water(self.requested);
        self.previous_neglect = garden.tree.reset_neglect(Sustenance::Water);
        tracing::debug!(requested = self.requested, absorbed = self.absorbed, "watered tree");
        Ok(())
    }

    // The player gets back everything they poured, even what the tree could not hold.
    fn reverse(&mut self, garden: &mut GardenState) {
        garden.tree.remove_water(self.absorbed);
        // Subtracting can be off by a rounding step; the recorded level is exact
        let nutrients = garden.tree.nutrient_level();
        garden.tree.restore_levels(self.level_before, nutrients);
        // Refund the full request by returning to the recorded supply
        let fertiliser = garden.player.fertiliser_supply();
        garden.player.restore_supplies(self.supply_before, fertiliser);
        garden
            .tree
            .restore_neglect(Sustenance::Water, &std::mem::take(&mut self.previous_neglect));
    }
}

#[derive(Debug)]
pub struct FertilisingAction {
    requested: f32,
    absorbed: f32,
    level_before: f32,
    supply_before: f32,
    previous_neglect: Vec<(BranchId, u32)>,
}

impl FertilisingAction {
    pub fn new(amount: f32) -> Self {
        Self {
            requested: amount,
            absorbed: 0.0,
            level_before: 0.0,
            supply_before: 0.0,
            previous_neglect: Vec::new(),
        }
    }

    pub fn absorbed(&self) -> f32 {
        self.absorbed
    }

    fn perform(&mut self, garden: &mut GardenState) -> Result<()> {
        check_amount(self.requested)?;
        self.supply_before = garden.player.fertiliser_supply();
        garden.player.use_fertiliser(self.requested)?;
        self.level_before = garden.tree.nutrient_level();
        self.absorbed = garden.tree.add_nutrients(self.requested);
        self.previous_neglect = garden.tree.reset_neglect(Sustenance::Nutrients);
        tracing::debug!(requested = self.requested, absorbed = self.absorbed, "fertilised tree");
        Ok(())
    }

    fn reverse(&mut self, garden: &mut GardenState) {
        garden.tree.remove_nutrients(self.absorbed);
        let water = garden.tree.water_level();
        garden.tree.restore_levels(water, self.level_before);
        let water = garden.player.water_supply();
        garden.player.restore_supplies(water, self.supply_before);
        garden.tree.restore_neglect(
            Sustenance::Nutrients,
            &std::mem::take(&mut self.previous_neglect),
        );
    }
}

#[derive(Debug, Default)]
pub struct GrowingAction {
    report: Option<GrowthReport>,
    supplies_before: (f32, f32),
}

impl GrowingAction {
    pub fn report(&self) -> Option<&GrowthReport> {
        self.report.as_ref()
    }

    fn perform<R: Rng + ?Sized>(&mut self, garden: &mut GardenState, rng: &mut R) -> Result<()> {
        let report = garden.tree.grow(rng);
        self.supplies_before = (
            garden.player.water_supply(),
            garden.player.fertiliser_supply(),
        );
        garden.player.add_water(garden.tree.config().turn_reward_water);
        garden.player.add_fertiliser(garden.tree.config().turn_reward_fertiliser);
        self.report = Some(report);
        Ok(())
    }

    fn reverse(&mut self, garden: &mut GardenState) {
        let Some(report) = self.report.take() else {
            return;
        };
        let tree = &mut garden.tree;
        tree.remove_branches(&report.new_branch_ids);
        if let Err(e) = tree.modify_branches(&report.width_deltas, &report.length_deltas) {
            tracing::warn!(
                error = %e,
                "growth deltas did not apply cleanly, restoring snapshot only"
            );
        }
        // Snap back to the recorded state so float rounding cannot drift
        tree.restore_vitals(&report.vitals_before);
        tree.truncate_fruits(report.fruit_count_before);
        tree.restore_levels(report.water_level_before, report.nutrient_level_before);

        let (water, fertiliser) = self.supplies_before;
        garden.player.restore_supplies(water, fertiliser);
    }
}

#[derive(Debug)]
pub struct PruningAction {
    id: BranchId,
    removed: Vec<Branch>,
}

impl PruningAction {
    pub fn new(id: BranchId) -> Self {
        Self {
            id,
            removed: Vec::new(),
        }
    }

    pub fn removed(&self) -> &[Branch] {
        &self.removed
    }

    fn perform(&mut self, garden: &mut GardenState) -> Result<()> {
        if garden.tree.find_branch(self.id).is_none() {
            return Err(GardenError::UnknownBranch(self.id));
        }
        self.removed = garden.tree.prune_branch(self.id);
        Ok(())
    }

    fn reverse(&mut self, garden: &mut GardenState) {
        garden.tree.add_branches(std::mem::take(&mut self.removed));
    }
}

#[derive(Debug)]
pub struct HarvestingAction {
    at: Point,
    collected: Option<(FruitType, FruitId)>,
}

impl HarvestingAction {
    pub fn new(at: Point) -> Self {
        Self { at, collected: None }
    }

    pub fn collected(&self) -> Option<(FruitType, FruitId)> {
        self.collected
    }

    fn perform(&mut self, garden: &mut GardenState) -> Result<()> {
        let collected = garden.tree.collect_fruit_at(self.at).ok_or(GardenError::NoFruitAtPoint {
            x: self.at.x,
            y: self.at.y,
        })?;
        self.collected = Some(collected);
        Ok(())
    }

    fn reverse(&mut self, garden: &mut GardenState) {
        if let Some((_, id)) = self.collected.take() {
            garden.tree.uncollect_fruit(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::player::Player;
    use crate::tree::Tree;
    use crate::types::Fruit;
    use ::rand::rngs::StdRng;
    use ::rand::SeedableRng;

    fn garden(water: f32, fertiliser: f32) -> GardenState {
        GardenState {
            tree: Tree::with_config(GameConfig::default()),
            player: Player::new(water, fertiliser),
        }
    }

    #[test]
    fn watering_refunds_requested_amount_on_reverse() {
        let mut garden = garden(5.0, 0.0);
        garden.tree.remove_water(6.0);
        let level = garden.tree.water_level();
        let mut rng = StdRng::seed_from_u64(0);

        let mut action = Action::water(5.0);
        action.perform(&mut garden, &mut rng).unwrap();
        assert_eq!(garden.player.water_supply(), 0.0);
        assert_eq!(garden.tree.water_level(), 9.0);

        action.reverse(&mut garden);
        assert_eq!(garden.player.water_supply(), 5.0);
        assert_eq!(garden.tree.water_level(), level);
    }

    #[test]
    fn fertilising_without_supply_fails_cleanly() {
        let mut garden = garden(0.0, 1.0);
        let mut rng = StdRng::seed_from_u64(0);
        let mut action = Action::fertilise(2.0);
        assert!(matches!(
            action.perform(&mut garden, &mut rng),
            Err(GardenError::InsufficientFertiliser { .. })
        ));
        assert_eq!(garden.player.fertiliser_supply(), 1.0);
        assert_eq!(garden.tree.nutrient_level(), 10.0);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let mut garden = garden(5.0, 5.0);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            Action::water(-1.0).perform(&mut garden, &mut rng),
            Err(GardenError::InvalidAmount(_))
        ));
        assert!(Action::fertilise(f32::NAN).perform(&mut garden, &mut rng).is_err());
        assert_eq!(garden.player.water_supply(), 5.0);
    }

    #[test]
    fn pruning_unknown_branch_is_an_error() {
        let mut garden = garden(0.0, 0.0);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            Action::prune(9).perform(&mut garden, &mut rng),
            Err(GardenError::UnknownBranch(9))
        ));
    }

    #[test]
    fn harvest_and_undo() {
        let mut garden = garden(0.0, 0.0);
        garden.tree.fruits_mut().push(Fruit::new(
            4,
            0,
            FruitType::Gold,
            Point::new(1.0, 1.0),
            3.0,
        ));
        let mut rng = StdRng::seed_from_u64(0);

        assert!(Action::harvest(Point::new(50.0, 50.0))
            .perform(&mut garden, &mut rng)
            .is_err());

        let mut action = Action::harvest(Point::new(2.0, 2.0));
        action.perform(&mut garden, &mut rng).unwrap();
        assert!(garden.tree.fruits()[0].collected);
        assert_eq!(action.to_string(), "harvest Gold fruit 4");

        action.reverse(&mut garden);
        assert!(!garden.tree.fruits()[0].collected);
    }

    #[test]
    fn growing_grants_turn_reward() {
        let mut garden = garden(0.0, 0.0);
        let mut rng = StdRng::seed_from_u64(0);
        let mut action = Action::grow();
        action.perform(&mut garden, &mut rng).unwrap();
        assert_eq!(garden.player.water_supply(), 3.0);
        assert_eq!(garden.player.fertiliser_supply(), 3.0);

        action.reverse(&mut garden);
        assert_eq!(garden.player, Player::new(0.0, 0.0));
    }

    #[test]
    fn undoing_a_turn_restores_fractional_supplies_exactly() {
        let mut garden = garden(0.1, 0.1);
        let mut rng = StdRng::seed_from_u64(0);
        let mut timeline = crate::timeline::Timeline::default();
        timeline
            .perform_action(Action::grow(), &mut garden, &mut rng)
            .unwrap();
        assert_ne!(garden.player, Player::new(0.1, 0.1));

        timeline.reverse_action(&mut garden).unwrap();
        assert_eq!(garden.player, Player::new(0.1, 0.1));
    }

    #[test]
    fn fractional_watering_and_fertilising_undo_exactly() {
        let mut garden = garden(0.7, 1.3);
        let mut rng = StdRng::seed_from_u64(0);
        garden.tree.remove_water(5.0);
        garden.tree.remove_nutrients(5.0);

        let mut water = Action::water(0.3);
        water.perform(&mut garden, &mut rng).unwrap();
        let mut fertilise = Action::fertilise(0.9);
        fertilise.perform(&mut garden, &mut rng).unwrap();

        fertilise.reverse(&mut garden);
        water.reverse(&mut garden);
        assert_eq!(garden.player, Player::new(0.7, 1.3));
    }
}
