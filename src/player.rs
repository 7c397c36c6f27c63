use serde::{Deserialize, Serialize};

use crate::error::{GardenError, Result};

/// Supplies the player can spend on the tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    water_supply: f32,
    fertiliser_supply: f32,
}

impl Player {
    pub fn new(water_supply: f32, fertiliser_supply: f32) -> Self {
        Self {
            water_supply,
            fertiliser_supply,
        }
    }

    pub fn water_supply(&self) -> f32 {
        self.water_supply
    }

    pub fn fertiliser_supply(&self) -> f32 {
        self.fertiliser_supply
    }

    /// Spend water, or fail without touching the supply.
    pub fn use_water(&mut self, amount: f32) -> Result<()> {
        if self.water_supply < amount {
            return Err(GardenError::InsufficientWater {
                requested: amount,
                available: self.water_supply,
            });
        }
        self.water_supply -= amount;
        tracing::debug!(amount, remaining = self.water_supply, "player used water");
        Ok(())
    }

    pub fn use_fertiliser(&mut self, amount: f32) -> Result<()> {
        if self.fertiliser_supply < amount {
            return Err(GardenError::InsufficientFertiliser {
                requested: amount,
                available: self.fertiliser_supply,
            });
        }
        self.fertiliser_supply -= amount;
        tracing::debug!(amount, remaining = self.fertiliser_supply, "player used fertiliser");
        Ok(())
    }

    pub fn add_water(&mut self, amount: f32) {
        self.water_supply += amount;
    }

    pub fn add_fertiliser(&mut self, amount: f32) {
        self.fertiliser_supply += amount;
    }

    /// Set both supplies to values recorded earlier, used when an action is undone.
    pub(crate) fn restore_supplies(&mut self, water: f32, fertiliser: f32) {
        self.water_supply = water;
        self.fertiliser_supply = fertiliser;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spending_and_refilling() {
        let mut player = Player::new(50.0, 30.0);
        player.use_water(20.0).unwrap();
        player.add_water(30.0);
        assert_eq!(player.water_supply(), 60.0);

        player.use_fertiliser(10.0).unwrap();
        player.add_fertiliser(15.0);
        assert_eq!(player.fertiliser_supply(), 35.0);
    }

    #[test]
    fn overspending_leaves_supply_untouched() {
        let mut player = Player::new(5.0, 0.0);
        assert!(matches!(
            player.use_water(6.0),
            Err(GardenError::InsufficientWater { requested, available })
                if requested == 6.0 && available == 5.0
        ));
        assert!(player.use_fertiliser(0.5).is_err());
        assert_eq!(player, Player::new(5.0, 0.0));
        assert!(player.use_water(5.0).is_ok());
        assert_eq!(player.water_supply(), 0.0);
    }

    #[test]
    fn restoring_supplies_is_exact() {
        let mut player = Player::new(0.1, 0.7);
        player.add_water(3.0);
        player.use_fertiliser(0.3).unwrap();
        player.restore_supplies(0.1, 0.7);
        assert_eq!(player, Player::new(0.1, 0.7));
    }
}
