use ::rand as external_rand;
use external_rand::Rng;

use crate::error::{GardenError, Result};
use crate::types::{BranchId, Point};

/// A single rigid segment of the tree: a rectangle rotated about its center.
///
/// `angle` is in degrees from vertical. Screen coordinates grow downwards, so
/// an upright branch has its tip above (smaller `y` than) its base.
#[derive(Clone, Debug, PartialEq)]
pub struct Branch {
    pub(crate) id: BranchId,
    pub(crate) parent: Option<BranchId>,
    // Kept sorted; ids are issued in increasing order so this is also sprout order
    pub(crate) children: Vec<BranchId>,
    pub(crate) center: Point,
    pub(crate) width: f32,
    pub(crate) length: f32,
    pub(crate) angle: f32,
    pub(crate) age: u32,
    pub(crate) leaves: Vec<Point>,
    pub(crate) turns_without_water: u32,
    pub(crate) turns_without_nutrients: u32,
    pub(crate) alive: bool,
}

/// Everything the growth pass may change on a branch, captured so a growing
/// turn can be rewound without float drift.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchVitals {
    pub id: BranchId,
    pub center: Point,
    pub width: f32,
    pub length: f32,
    pub age: u32,
    pub leaves: Vec<Point>,
    pub turns_without_water: u32,
    pub turns_without_nutrients: u32,
    pub alive: bool,
}

impl Branch {
    /// Create a branch whose base sits at `base`.
    pub fn new(
        id: BranchId,
        parent: Option<BranchId>,
        angle: f32,
        length: f32,
        width: f32,
        base: Point,
    ) -> Self {
        let mut branch = Self {
            id,
            parent,
            children: Vec::new(),
            center: base,
            width,
            length,
            angle,
            age: 0,
            leaves: Vec::new(),
            turns_without_water: 0,
            turns_without_nutrients: 0,
            alive: true,
        };
        branch.set_base_position(base.x, base.y);
        branch
    }

    pub fn id(&self) -> BranchId {
        self.id
    }

    pub fn parent(&self) -> Option<BranchId> {
        self.parent
    }

    pub fn children(&self) -> &[BranchId] {
        &self.children
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn leaves(&self) -> &[Point] {
        &self.leaves
    }

    pub fn has_leaves(&self) -> bool {
        !self.leaves.is_empty()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn turns_without_water(&self) -> u32 {
        self.turns_without_water
    }

    pub fn turns_without_nutrients(&self) -> u32 {
        self.turns_without_nutrients
    }

    pub fn area(&self) -> f32 {
        self.width * self.length
    }

    /// Offset from the center to the tip, half a length along the branch axis.
    fn half_axis(&self) -> (f32, f32) {
        let theta = self.angle.to_radians();
        (
            0.5 * self.length * theta.sin(),
            -0.5 * self.length * theta.cos(),
        )
    }

    pub fn tip_position(&self) -> Point {
        let (hx, hy) = self.half_axis();
        Point::new(self.center.x + hx, self.center.y + hy)
    }

    pub fn base_position(&self) -> Point {
        let (hx, hy) = self.half_axis();
        Point::new(self.center.x - hx, self.center.y - hy)
    }

    /// Move the branch so its base (not its center) sits at `(x, y)`.
    pub fn set_base_position(&mut self, x: f32, y: f32) {
        let (hx, hy) = self.half_axis();
        self.center = Point::new(x + hx, y + hy);
    }

    /// Corners of the branch rectangle, in order around the outline.
    pub fn corners(&self) -> [Point; 4] {
        let theta = self.angle.to_radians();
        let (sin, cos) = theta.sin_cos();
        let hw = self.width / 2.0;
        let hl = self.length / 2.0;
        [(-hw, hl), (-hw, -hl), (hw, -hl), (hw, hl)].map(|(lx, ly)| {
            Point::new(
                self.center.x + lx * cos - ly * sin,
                self.center.y + lx * sin + ly * cos,
            )
        })
    }

    /// Grow by `food` units of area. Returns `(width_increase, length_increase)`.
    ///
    /// Length grows `ratio / age` times faster than width, so young branches
    /// stretch out before they thicken. The width increase is the positive
    /// root of `(ratio/age)·dw² + (length + (ratio/age)·width)·dw − food = 0`.
    /// A request with no real root produces no growth.
    pub fn grow<R: Rng + ?Sized>(
        &mut self,
        food: f32,
        ratio: f32,
        max_leaves: usize,
        rng: &mut R,
    ) -> (f32, f32) {
        if !self.alive {
            return (0.0, 0.0);
        }
        self.age += 1;

        let k = ratio / self.age as f32;
        let b = self.length + k * self.width;
        let discriminant = b * b + 4.0 * k * food;
        let (width_increase, length_increase) = if discriminant < 0.0 {
            (0.0, 0.0)
        } else {
            let dw = (-b + discriminant.sqrt()) / (2.0 * k);
            if dw.is_finite() && dw > 0.0 {
                (dw, k * dw)
            } else {
                (0.0, 0.0)
            }
        };

        self.width += width_increase;
        self.length += length_increase;
        self.generate_leaves(max_leaves, rng);

        (width_increase, length_increase)
    }

    fn generate_leaves<R: Rng + ?Sized>(&mut self, max_leaves: usize, rng: &mut R) {
        self.leaves.clear();
        if !self.alive {
            return;
        }
        let count = (self.age as usize).min(max_leaves);
        let base = self.base_position();
        let tip = self.tip_position();
        let theta = self.angle.to_radians();
        // Unit vector across the branch
        let (px, py) = (theta.cos(), theta.sin());
        for _ in 0..count {
            let t: f32 = rng.gen_range(0.0..=1.0);
            let jitter = rng.gen_range(-1.0f32..=1.0) * self.width;
            self.leaves.push(Point::new(
                base.x + (tip.x - base.x) * t + px * jitter,
                base.y + (tip.y - base.y) * t + py * jitter,
            ));
        }
    }

    pub fn modify_size(&mut self, width_change: f32, length_change: f32) -> Result<()> {
        let width = self.width + width_change;
        let length = self.length + length_change;
        if !(width > 0.0 && length > 0.0) {
            return Err(GardenError::InvalidResize {
                id: self.id,
                width,
                length,
            });
        }
        self.width = width;
        self.length = length;
        Ok(())
    }

    pub fn decrement_age(&mut self) {
        self.age = self.age.saturating_sub(1);
    }

    pub fn increment_turns_without_water(&mut self) {
        if self.alive {
            self.turns_without_water += 1;
        }
    }

    pub fn increment_turns_without_nutrients(&mut self) {
        if self.alive {
            self.turns_without_nutrients += 1;
        }
    }

    pub fn reset_turns_without_water(&mut self) {
        self.turns_without_water = 0;
    }

    pub fn reset_turns_without_nutrients(&mut self) {
        self.turns_without_nutrients = 0;
    }

    /// Death is terminal: there is no way back to alive.
    pub fn kill(&mut self) {
        self.alive = false;
        self.leaves.clear();
    }

    /// Hit test in the branch's own unrotated frame.
    pub fn contains_point(&self, point: Point) -> bool {
        let (sin, cos) = self.angle.to_radians().sin_cos();
        let dx = point.x - self.center.x;
        let dy = point.y - self.center.y;
        let local_x = dx * cos + dy * sin;
        let local_y = -dx * sin + dy * cos;
        local_x.abs() <= self.width / 2.0 && local_y.abs() <= self.length / 2.0
    }

    pub fn add_child(&mut self, id: BranchId) {
        if let Err(pos) = self.children.binary_search(&id) {
            self.children.insert(pos, id);
        }
    }

    pub fn remove_child(&mut self, id: BranchId) -> bool {
        match self.children.iter().position(|c| *c == id) {
            Some(pos) => {
                self.children.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn vitals(&self) -> BranchVitals {
        BranchVitals {
            id: self.id,
            center: self.center,
            width: self.width,
            length: self.length,
            age: self.age,
            leaves: self.leaves.clone(),
            turns_without_water: self.turns_without_water,
            turns_without_nutrients: self.turns_without_nutrients,
            alive: self.alive,
        }
    }

    pub(crate) fn restore_vitals(&mut self, vitals: &BranchVitals) {
        self.center = vitals.center;
        self.width = vitals.width;
        self.length = vitals.length;
        self.age = vitals.age;
        self.leaves = vitals.leaves.clone();
        self.turns_without_water = vitals.turns_without_water;
        self.turns_without_nutrients = vitals.turns_without_nutrients;
        self.alive = vitals.alive;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::rand::rngs::StdRng;
    use ::rand::SeedableRng;

    const EPS: f32 = 1e-3;

    fn upright() -> Branch {
        Branch::new(0, None, 0.0, 100.0, 20.0, Point::new(50.0, 200.0))
    }

    #[test]
    fn constructor_places_base_at_given_point() {
        let branch = Branch::new(1, Some(0), 45.0, 100.0, 20.0, Point::new(50.0, 50.0));
        let base = branch.base_position();
        assert!((base.x - 50.0).abs() < EPS);
        assert!((base.y - 50.0).abs() < EPS);
        assert_eq!(branch.area(), 2000.0);
        assert_eq!(branch.parent(), Some(0));
    }

    #[test]
    fn tip_is_half_a_length_above_center_when_upright() {
        let branch = upright();
        let tip = branch.tip_position();
        assert!((tip.x - 50.0).abs() < EPS);
        assert!((tip.y - 100.0).abs() < EPS);
        assert!((branch.center().y - 150.0).abs() < EPS);
    }

    #[test]
    fn growth_preserves_ratio_and_area_increase() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut branch = upright();
        let area_before = branch.area();
        let (dw, dl) = branch.grow(500.0, 20.0, 10, &mut rng);

        assert_eq!(branch.age(), 1);
        assert!(dw > 0.0);
        assert!((dl - 20.0 * dw).abs() < EPS);
        assert!((branch.area() - area_before - 500.0).abs() < 0.5);
    }

    #[test]
    fn older_branches_thicken_more_than_they_lengthen() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut branch = upright();
        for _ in 0..39 {
            branch.grow(0.0, 20.0, 10, &mut rng);
        }
        let (dw, dl) = branch.grow(500.0, 20.0, 10, &mut rng);
        assert_eq!(branch.age(), 40);
        assert!(dw > dl);
    }

    #[test]
    fn zero_food_means_zero_growth() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut branch = upright();
        assert_eq!(branch.grow(0.0, 20.0, 10, &mut rng), (0.0, 0.0));
        assert_eq!(branch.width(), 20.0);
    }

    #[test]
    fn impossible_request_clamps_to_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut branch = upright();
        assert_eq!(branch.grow(-1.0e9, 20.0, 10, &mut rng), (0.0, 0.0));
        assert_eq!(branch.length(), 100.0);
    }

    #[test]
    fn dead_branch_does_not_grow() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut branch = upright();
        branch.grow(100.0, 20.0, 10, &mut rng);
        assert!(branch.has_leaves());

        branch.kill();
        assert!(!branch.has_leaves());
        assert_eq!(branch.grow(100.0, 20.0, 10, &mut rng), (0.0, 0.0));
        assert_eq!(branch.age(), 1);
        assert!(branch.leaves().is_empty());
    }

    #[test]
    fn leaf_count_follows_age_up_to_cap() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut branch = upright();
        for expected in 1..=4 {
            branch.grow(10.0, 20.0, 3, &mut rng);
            assert_eq!(branch.leaves().len(), expected.min(3));
        }
    }

    #[test]
    fn modify_size_rejects_non_positive_dimensions() {
        let mut branch = upright();
        assert!(matches!(
            branch.modify_size(-20.0, 0.0),
            Err(GardenError::InvalidResize { id: 0, .. })
        ));
        assert_eq!(branch.width(), 20.0);
        assert!(branch.modify_size(-5.0, 10.0).is_ok());
        assert_eq!((branch.width(), branch.length()), (15.0, 110.0));
    }

    #[test]
    fn counters_freeze_once_dead() {
        let mut branch = upright();
        branch.increment_turns_without_water();
        branch.increment_turns_without_nutrients();
        branch.kill();
        branch.increment_turns_without_water();
        assert_eq!(branch.turns_without_water(), 1);
        assert_eq!(branch.turns_without_nutrients(), 1);
        branch.reset_turns_without_water();
        assert_eq!(branch.turns_without_water(), 0);
    }

    #[test]
    fn contains_point_respects_rotation() {
        let branch = Branch::new(0, None, 90.0, 100.0, 10.0, Point::new(0.0, 0.0));
        // Lying along +x from the origin
        assert!(branch.contains_point(Point::new(90.0, 2.0)));
        assert!(!branch.contains_point(Point::new(0.0, -50.0)));
        assert!(!branch.contains_point(Point::new(50.0, 8.0)));
    }

    #[test]
    fn corners_span_the_rectangle() {
        let branch = upright();
        let corners = branch.corners();
        let min_x = corners.iter().map(|p| p.x).fold(f32::MAX, f32::min);
        let max_y = corners.iter().map(|p| p.y).fold(f32::MIN, f32::max);
        assert!((min_x - 40.0).abs() < EPS);
        assert!((max_y - 200.0).abs() < EPS);
    }

    #[test]
    fn children_stay_sorted_and_unique() {
        let mut branch = upright();
        branch.add_child(5);
        branch.add_child(2);
        branch.add_child(5);
        assert_eq!(branch.children(), &[2, 5]);
        assert!(branch.remove_child(2));
        assert!(!branch.remove_child(2));
        assert_eq!(branch.children(), &[5]);
    }
}
