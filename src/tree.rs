use ::rand as external_rand;
use external_rand::Rng;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use crate::branch::{Branch, BranchVitals};
use crate::config::GameConfig;
use crate::error::{GardenError, Result};
use crate::types::{BranchId, Fruit, FruitId, FruitType, Point};

/// Which neglect counter an operation is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sustenance {
    Water,
    Nutrients,
}

/// Everything a growing turn changed, in the shape needed to rewind it.
///
/// `width_deltas` and `length_deltas` are parallel to the branch order at the
/// start of the turn; `vitals_before` is in that same order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GrowthReport {
    pub water_consumed: f32,
    pub nutrients_consumed: f32,
    pub width_deltas: Vec<f32>,
    pub length_deltas: Vec<f32>,
    pub new_branch_ids: Vec<BranchId>,
    pub new_fruit_ids: Vec<FruitId>,
    pub died: Vec<BranchId>,
    pub vitals_before: Vec<BranchVitals>,
    pub fruit_count_before: usize,
    pub water_level_before: f32,
    pub nutrient_level_before: f32,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TreeStats {
    pub branch_count: usize,
    pub living_count: usize,
    pub total_area: f32,
    pub water_level: f32,
    pub max_water: f32,
    pub nutrient_level: f32,
    pub max_nutrients: f32,
    pub fruit_count: usize,
    pub fruit_collected: usize,
}

/// The organism: an arena of branches keyed by id plus its resource pool.
///
/// Branches live in a dense vector sorted by id. Ids are issued in increasing
/// order, so sprouting appends and undoing a prune slots branches back exactly
/// where they were.
#[derive(Clone, Debug)]
pub struct Tree {
    branches: Vec<Branch>,
    index: HashMap<BranchId, usize>,
    fruits: Vec<Fruit>,
    water_level: f32,
    nutrient_level: f32,
    max_water: f32,
    max_nutrients: f32,
    next_id: BranchId,
    next_fruit_id: FruitId,
    config: GameConfig,
}

impl Tree {
    pub fn new(
        config: GameConfig,
        initial_water: f32,
        initial_nutrients: f32,
        trunk: Branch,
    ) -> Self {
        // A trunk at the top of the id range leaves no ids for sprouts
        let next_id = trunk.id().saturating_add(1);
        let mut tree = Self {
            branches: vec![trunk],
            index: HashMap::new(),
            fruits: Vec::new(),
            water_level: initial_water,
            nutrient_level: initial_nutrients,
            max_water: 0.0,
            max_nutrients: 0.0,
            next_id,
            next_fruit_id: 0,
            config,
        };
        tree.rebuild_index();
        tree.update_capacity();
        tree
    }

    /// A single-trunk tree laid out from the config.
    pub fn with_config(config: GameConfig) -> Self {
        let (bx, by) = config.trunk_base;
        let trunk = Branch::new(
            0,
            None,
            config.trunk_angle,
            config.trunk_length,
            config.trunk_width,
            Point::new(bx, by),
        );
        let water = config.initial_water_level;
        let nutrients = config.initial_nutrient_level;
        Self::new(config, water, nutrients, trunk)
    }

    /// Rebuild a tree from saved parts, rejecting anything that breaks the
    /// parent/child invariants.
    pub(crate) fn from_parts(
        config: GameConfig,
        next_id: BranchId,
        water_level: f32,
        nutrient_level: f32,
        mut branches: Vec<Branch>,
        fruits: Vec<Fruit>,
    ) -> Result<Self> {
        branches.sort_by_key(Branch::id);
        let next_id = match branches.last().map(Branch::id) {
            Some(max) => max
                .checked_add(1)
                .map(|after| next_id.max(after))
                .ok_or_else(|| {
                    GardenError::CorruptSave(format!("branch id {max} leaves no room"))
                })?,
            None => next_id,
        };
        let next_fruit_id = match fruits.iter().map(|f| f.id).max() {
            Some(max) => max.checked_add(1).ok_or_else(|| {
                GardenError::CorruptSave(format!("fruit id {max} leaves no room"))
            })?,
            None => 0,
        };
        let mut tree = Self {
            branches,
            index: HashMap::new(),
            fruits,
            water_level,
            nutrient_level,
            max_water: 0.0,
            max_nutrients: 0.0,
            next_id,
            next_fruit_id,
            config,
        };
        tree.rebuild_index();
        tree.validate()?;
        tree.update_capacity();
        Ok(tree)
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn branch(&self, id: BranchId) -> Option<&Branch> {
        self.find_branch(id).map(|slot| &self.branches[slot])
    }

    pub fn root(&self) -> Option<&Branch> {
        self.branches.iter().find(|b| b.parent().is_none())
    }

    pub fn fruits(&self) -> &[Fruit] {
        &self.fruits
    }

    #[cfg(test)]
    pub(crate) fn fruits_mut(&mut self) -> &mut Vec<Fruit> {
        &mut self.fruits
    }

    pub fn water_level(&self) -> f32 {
        self.water_level
    }

    pub fn nutrient_level(&self) -> f32 {
        self.nutrient_level
    }

    pub fn max_water(&self) -> f32 {
        self.max_water
    }

    pub fn max_nutrients(&self) -> f32 {
        self.max_nutrients
    }

    pub fn next_id(&self) -> BranchId {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Slot of the branch with `id` in `branches()`.
    pub fn find_branch(&self, id: BranchId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn total_area(&self) -> f32 {
        self.branches.iter().map(Branch::area).sum()
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            branch_count: self.branches.len(),
            living_count: self.branches.iter().filter(|b| b.is_alive()).count(),
            total_area: self.total_area(),
            water_level: self.water_level,
            max_water: self.max_water,
            nutrient_level: self.nutrient_level,
            max_nutrients: self.max_nutrients,
            fruit_count: self.fruits.len(),
            fruit_collected: self.fruits.iter().filter(|f| f.collected).count(),
        }
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        self.index
            .extend(self.branches.iter().enumerate().map(|(slot, b)| (b.id(), slot)));
    }

    fn update_capacity(&mut self) {
        let capacity = self.total_area() / self.config.capacity_divisor;
        self.max_water = capacity;
        self.max_nutrients = capacity;
    }

    /// Absorb as much of `amount` as capacity allows and return what was taken.
    pub fn add_water(&mut self, amount: f32) -> f32 {
        let absorbed = amount.min(self.max_water - self.water_level).max(0.0);
        self.water_level += absorbed;
        absorbed
    }

    pub fn add_nutrients(&mut self, amount: f32) -> f32 {
        let absorbed = amount.min(self.max_nutrients - self.nutrient_level).max(0.0);
        self.nutrient_level += absorbed;
        absorbed
    }

    pub fn remove_water(&mut self, amount: f32) {
        self.water_level -= amount;
    }

    pub fn remove_nutrients(&mut self, amount: f32) {
        self.nutrient_level -= amount;
    }

    /// Put both pools back to recorded levels, ignoring capacity.
    pub(crate) fn restore_levels(&mut self, water: f32, nutrients: f32) {
        self.water_level = water;
        self.nutrient_level = nutrients;
    }

    /// Zero the given neglect counter on every living branch and return the
    /// previous values so the reset can be undone.
    pub fn reset_neglect(&mut self, kind: Sustenance) -> Vec<(BranchId, u32)> {
        let mut previous = Vec::new();
        for branch in self.branches.iter_mut().filter(|b| b.is_alive()) {
            match kind {
                Sustenance::Water => {
                    previous.push((branch.id(), branch.turns_without_water()));
                    branch.reset_turns_without_water();
                }
                Sustenance::Nutrients => {
                    previous.push((branch.id(), branch.turns_without_nutrients()));
                    branch.reset_turns_without_nutrients();
                }
            }
        }
        previous
    }

    pub fn restore_neglect(&mut self, kind: Sustenance, previous: &[(BranchId, u32)]) {
        for &(id, turns) in previous {
            let Some(slot) = self.find_branch(id) else {
                continue;
            };
            let branch = &mut self.branches[slot];
            match kind {
                Sustenance::Water => branch.turns_without_water = turns,
                Sustenance::Nutrients => branch.turns_without_nutrients = turns,
            }
        }
    }

    /// Run one turn of growth over the branches present when the call starts.
    pub fn grow<R: Rng + ?Sized>(&mut self, rng: &mut R) -> GrowthReport {
        let vitals_before: Vec<BranchVitals> = self.branches.iter().map(Branch::vitals).collect();
        let fruit_count_before = self.fruits.len();
        let (water_level_before, nutrient_level_before) = (self.water_level, self.nutrient_level);
        let threshold = self.config.max_turns_without_sustenance;

        // Neglect
        let mut died = Vec::new();
        for branch in self.branches.iter_mut().filter(|b| b.is_alive()) {
            branch.increment_turns_without_water();
            branch.increment_turns_without_nutrients();
            if branch.turns_without_water() > threshold
                || branch.turns_without_nutrients() > threshold
            {
                branch.kill();
                died.push(branch.id());
            }
        }

        // Food share
        let branch_count = self.branches.len();
        let shared = self.water_level.min(self.nutrient_level).max(0.0);
        let per_branch_food = if branch_count == 0 {
            0.0
        } else {
            self.config.growth_scale * shared / branch_count as f32
        };

        // Upkeep
        let living = self.branches.iter().filter(|b| b.is_alive()).count() as f32;
        let water_consumed = (living * self.config.water_cost_per_branch)
            .min(self.water_level)
            .max(0.0);
        let nutrients_consumed = (living * self.config.nutrient_cost_per_branch)
            .min(self.nutrient_level)
            .max(0.0);
        self.water_level -= water_consumed;
        self.nutrient_level -= nutrients_consumed;

        let mut width_deltas = Vec::with_capacity(branch_count);
        let mut length_deltas = Vec::with_capacity(branch_count);
        let mut new_branch_ids = Vec::new();
        let mut new_fruit_ids = Vec::new();

        for slot in 0..branch_count {
            let (dw, dl) = self.branches[slot].grow(
                per_branch_food,
                self.config.growth_ratio,
                self.config.max_leaves_per_branch,
                rng,
            );
            width_deltas.push(dw);
            length_deltas.push(dl);

            let branch = &self.branches[slot];
            if !branch.is_alive() {
                continue;
            }
            let tip = branch.tip_position();
            let parent_id = branch.id();
            let area = branch.area();

            if rng.gen::<f32>() < self.config.fruit_probability {
                let kind = FruitType::pick(&self.config.fruit_weights, rng);
                match self.next_fruit_id.checked_add(1) {
                    Some(next) => {
                        let id = std::mem::replace(&mut self.next_fruit_id, next);
                        self.fruits
                            .push(Fruit::new(id, parent_id, kind, tip, self.config.fruit_radius));
                        new_fruit_ids.push(id);
                    }
                    None => tracing::warn!(branch = parent_id, "fruit ids exhausted, no fruit set"),
                }
            }

            if self.water_level.min(self.nutrient_level) > self.config.sprout_requirement
                && area < self.config.sprout_area_limit
                && rng.gen::<f32>() < self.config.sprout_probability
            {
                let range = self.config.sprout_angle_range;
                let angle = if range > 0.0 {
                    rng.gen_range(-range..=range)
                } else {
                    0.0
                };
                let Some(next) = self.next_id.checked_add(1) else {
                    tracing::warn!(branch = parent_id, "branch ids exhausted, no sprout");
                    continue;
                };
                let id = std::mem::replace(&mut self.next_id, next);
                let sprout = Branch::new(
                    id,
                    Some(parent_id),
                    angle,
                    self.config.sprout_length,
                    self.config.sprout_width,
                    tip,
                );
                self.branches[slot].add_child(id);
                // Fresh ids are the largest so far, so pushing keeps the order
                self.index.insert(id, self.branches.len());
                self.branches.push(sprout);
                new_branch_ids.push(id);
            }
        }

        self.update_branch_positions();
        self.update_capacity();

        tracing::info!(
            branches = self.branches.len(),
            sprouted = new_branch_ids.len(),
            fruit = new_fruit_ids.len(),
            died = died.len(),
            water_consumed,
            nutrients_consumed,
            "tree grew"
        );

        GrowthReport {
            water_consumed,
            nutrients_consumed,
            width_deltas,
            length_deltas,
            new_branch_ids,
            new_fruit_ids,
            died,
            vitals_before,
            fruit_count_before,
            water_level_before,
            nutrient_level_before,
        }
    }

    /// Walk down from the roots, sitting every branch's base on its parent's tip.
    fn update_branch_positions(&mut self) {
        let mut queue: VecDeque<usize> = self
            .branches
            .iter()
            .enumerate()
            .filter(|(_, b)| b.parent().is_none())
            .map(|(slot, _)| slot)
            .collect();

        while let Some(slot) = queue.pop_front() {
            let tip = self.branches[slot].tip_position();
            for i in 0..self.branches[slot].children.len() {
                let child = self.branches[slot].children[i];
                if let Some(child_slot) = self.find_branch(child) {
                    self.branches[child_slot].set_base_position(tip.x, tip.y);
                    queue.push_back(child_slot);
                }
            }
        }
    }

    /// Remove a branch and everything growing from it. The removed branches
    /// are handed to the caller, parent first, so they can be put back later.
    pub fn prune_branch(&mut self, id: BranchId) -> Vec<Branch> {
        let Some(slot) = self.find_branch(id) else {
            tracing::warn!(id, "prune requested for unknown branch");
            return Vec::new();
        };
        let parent_slot = self.branches[slot].parent().and_then(|p| self.find_branch(p));
        if let Some(parent_slot) = parent_slot {
            self.branches[parent_slot].remove_child(id);
        }

        let removed = self.take_subtree(id);
        self.rebuild_index();
        self.update_capacity();
        tracing::debug!(id, removed = removed.len(), "pruned branch");
        removed
    }

    // The index is stale while this runs, so slots are found by binary search.
    fn take_subtree(&mut self, id: BranchId) -> Vec<Branch> {
        let Ok(slot) = self.branches.binary_search_by_key(&id, Branch::id) else {
            return Vec::new();
        };
        let branch = self.branches.remove(slot);
        let children = branch.children().to_vec();
        let mut removed = vec![branch];
        for child in children {
            removed.extend(self.take_subtree(child));
        }
        removed
    }

    /// Delete branches by id, unlinking each from its parent first.
    /// Unknown ids are skipped.
    pub fn remove_branches(&mut self, ids: &[BranchId]) {
        for &id in ids {
            let Ok(slot) = self.branches.binary_search_by_key(&id, Branch::id) else {
                tracing::debug!(id, "skipping removal of unknown branch");
                continue;
            };
            if let Some(parent) = self.branches[slot].parent() {
                if let Ok(parent_slot) = self.branches.binary_search_by_key(&parent, Branch::id) {
                    self.branches[parent_slot].remove_child(id);
                }
            }
            self.branches.remove(slot);
        }
        self.rebuild_index();
        self.update_capacity();
    }

    /// Put previously removed branches back, keeping their ids and geometry,
    /// and relink each to its parent when that parent is present.
    pub fn add_branches(&mut self, branches: Vec<Branch>) {
        let mut inserted = Vec::with_capacity(branches.len());
        for branch in branches {
            let id = branch.id();
            let slot = self.branches.partition_point(|b| b.id() < id);
            if self.branches.get(slot).is_some_and(|b| b.id() == id) {
                tracing::warn!(id, "refusing to add a branch whose id is already in use");
                continue;
            }
            self.next_id = self.next_id.max(id.saturating_add(1));
            inserted.push((id, branch.parent()));
            self.branches.insert(slot, branch);
        }
        self.rebuild_index();

        for (id, parent) in inserted {
            if let Some(parent_slot) = parent.and_then(|p| self.find_branch(p)) {
                self.branches[parent_slot].add_child(id);
            }
        }
        self.update_capacity();
    }

    /// Undo a growing turn's size changes: subtract the deltas from every
    /// branch, wind ages back one turn and re-seat the hierarchy.
    pub fn modify_branches(&mut self, width_deltas: &[f32], length_deltas: &[f32]) -> Result<()> {
        let expected = self.branches.len();
        if width_deltas.len() != expected || length_deltas.len() != expected {
            let err = GardenError::DeltaLengthMismatch {
                expected,
                width: width_deltas.len(),
                length: length_deltas.len(),
            };
            tracing::warn!(error = %err, "rejected branch modification");
            return Err(err);
        }

        // Check everything first so a bad delta leaves the tree untouched
        for (branch, (dw, dl)) in self
            .branches
            .iter()
            .zip(width_deltas.iter().zip(length_deltas))
        {
            let width = branch.width() - dw;
            let length = branch.length() - dl;
            if !(width > 0.0 && length > 0.0) {
                let err = GardenError::InvalidResize {
                    id: branch.id(),
                    width,
                    length,
                };
                tracing::warn!(error = %err, "rejected branch modification");
                return Err(err);
            }
        }

        for (branch, (dw, dl)) in self
            .branches
            .iter_mut()
            .zip(width_deltas.iter().zip(length_deltas))
        {
            branch.modify_size(-dw, -dl)?;
            branch.decrement_age();
        }

        self.update_branch_positions();
        self.update_capacity();
        Ok(())
    }

    /// Reinstate snapshots taken by `grow`. Branches that no longer exist are
    /// ignored.
    pub fn restore_vitals(&mut self, vitals: &[BranchVitals]) {
        for v in vitals {
            if let Some(slot) = self.find_branch(v.id) {
                self.branches[slot].restore_vitals(v);
            }
        }
        self.update_capacity();
    }

    /// Drop every fruit after the first `len`.
    pub fn truncate_fruits(&mut self, len: usize) {
        self.fruits.truncate(len);
    }

    /// Topmost branch under `point`. Later branches draw over earlier ones.
    pub fn branch_at(&self, point: Point) -> Option<BranchId> {
        self.branches
            .iter()
            .rev()
            .find(|b| b.contains_point(point))
            .map(Branch::id)
    }

    /// Collect the nearest uncollected fruit whose radius covers `point`.
    pub fn collect_fruit_at(&mut self, point: Point) -> Option<(FruitType, FruitId)> {
        let fruit = self
            .fruits
            .iter_mut()
            .filter(|f| !f.collected && f.contains(point))
            .min_by(|a, b| {
                a.position
                    .distance_sq(point)
                    .total_cmp(&b.position.distance_sq(point))
            })?;
        fruit.collected = true;
        Some((fruit.kind, fruit.id))
    }

    pub fn uncollect_fruit(&mut self, id: FruitId) -> bool {
        match self.fruits.iter_mut().find(|f| f.id == id && f.collected) {
            Some(fruit) => {
                fruit.collected = false;
                true
            }
            None => false,
        }
    }

    /// Check the arena and the parent/child links in both directions.
    pub fn validate(&self) -> Result<()> {
        let corrupt = |msg: String| Err(GardenError::CorruptSave(msg));

        if self.branches.windows(2).any(|w| w[0].id() >= w[1].id()) {
            return corrupt("branch ids are not unique".into());
        }
        if self.index.len() != self.branches.len() {
            return corrupt("branch index out of sync".into());
        }
        let roots = self.branches.iter().filter(|b| b.parent().is_none()).count();
        if roots > 1 {
            return corrupt(format!("{roots} root branches"));
        }
        if roots == 0 && !self.branches.is_empty() {
            return corrupt("no root branch".into());
        }

        for branch in &self.branches {
            let id = branch.id();
            if id >= self.next_id {
                return corrupt(format!("branch {id} not below next id {}", self.next_id));
            }
            if !(branch.width() > 0.0 && branch.length() > 0.0) {
                return corrupt(format!("branch {id} has a non-positive dimension"));
            }
            if let Some(parent) = branch.parent() {
                match self.branch(parent) {
                    Some(p) if p.children().contains(&id) => {}
                    Some(_) => return corrupt(format!("parent {parent} does not list {id}")),
                    None => return corrupt(format!("branch {id} has missing parent {parent}")),
                }
            }
            for &child in branch.children() {
                match self.branch(child) {
                    Some(c) if c.parent() == Some(id) => {}
                    _ => return corrupt(format!("branch {id} lists stray child {child}")),
                }
            }
            if !branch.is_alive() && branch.has_leaves() {
                return corrupt(format!("dead branch {id} still has leaves"));
            }
        }

        // Links agree both ways, so a walk from the root sees each branch once
        // unless some of them form a cycle of their own.
        let mut reached = 0;
        let mut queue: VecDeque<BranchId> = self
            .branches
            .iter()
            .filter(|b| b.parent().is_none())
            .map(Branch::id)
            .collect();
        while let Some(id) = queue.pop_front() {
            reached += 1;
            if reached > self.branches.len() {
                break;
            }
            if let Some(branch) = self.branch(id) {
                queue.extend(branch.children());
            }
        }
        if reached != self.branches.len() {
            let stray = self.branches.len().saturating_sub(reached);
            return corrupt(format!("{stray} branches not reachable from the root"));
        }
        Ok(())
    }
}
