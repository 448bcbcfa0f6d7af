// This file is part of Terravis.
//
// Terravis is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Terravis is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Terravis.  If not, see <http://www.gnu.org/licenses/>.
use crate::{
    height_field::HeightFeeder,
    shape::{Edge, Neighbour, TriIndex, TriShape},
    stats::MeshStats,
};
use bitflags::bitflags;
use geometry::{Aabb, Frustum};
use nalgebra::Point3;

pub type TileIndex = u32;

/// A triangle of a particular tile.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TriRef {
    pub tile: TileIndex,
    pub tri: TriIndex,
}

impl TriRef {
    pub fn new(tile: TileIndex, tri: TriIndex) -> Self {
        Self { tile, tri }
    }
}

bitflags! {
    pub struct TriState: u8 {
        const SPLIT = 0b0000_0001;
        const IN_SQ = 0b0000_0010;
        const IN_MQ = 0b0000_0100;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Visibility {
    Out,
    Partial,
    In,
}

#[derive(Copy, Clone, Debug)]
pub struct BinTriNode {
    pub(crate) state: TriState,
    pub(crate) priority: f32,
    pub(crate) visibility: Visibility,
}

impl Default for BinTriNode {
    fn default() -> Self {
        Self {
            state: TriState::empty(),
            priority: 0f32,
            visibility: Visibility::Partial,
        }
    }
}

/// The tiles sharing this tile's three boundary edges.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TileLinks {
    pub diagonal: Option<TileIndex>,
    pub left: Option<TileIndex>,
    pub top: Option<TileIndex>,
}

/// One right-triangular terrain tile. Mirrored tiles count their local rows
/// and columns back from their origin so that two tiles fill a grid cell.
#[derive(Debug)]
pub struct BinTriTree {
    index: TileIndex,
    origin: (u32, u32),
    mirrored: bool,
    links: TileLinks,
    nodes: Vec<BinTriNode>,
    height_bounds: Vec<(f32, f32)>,
}

impl BinTriTree {
    pub fn new<H: HeightFeeder>(
        index: TileIndex,
        origin: (u32, u32),
        mirrored: bool,
        shape: &TriShape,
        heights: &H,
    ) -> Self {
        let slots = shape.tri_no() as usize + 2;
        let mut tree = Self {
            index,
            origin,
            mirrored,
            links: TileLinks::default(),
            nodes: vec![BinTriNode::default(); slots],
            height_bounds: vec![(0f32, 0f32); slots],
        };

        let point_height = |tree: &Self, i: TriIndex| {
            let (r, c) = tree.global(shape.row_col(i));
            heights.height(r, c)
        };
        for i in [0, shape.tri_no(), shape.tri_no() + 1] {
            let h = point_height(&tree, i);
            tree.height_bounds[i as usize] = (h, h);
        }
        for i in (1..shape.tri_no()).rev() {
            let bounds = if shape.can_split(i) {
                let (l0, l1) = tree.height_bounds[TriShape::left(i) as usize];
                let (r0, r1) = tree.height_bounds[TriShape::right(i) as usize];
                (l0.min(r0), l1.max(r1))
            } else {
                // Leaves cover the three corners plus the hypotenuse midpoint.
                let mut lo = point_height(&tree, i);
                let mut hi = lo;
                for corner in shape.corners(i) {
                    let h = point_height(&tree, corner);
                    lo = lo.min(h);
                    hi = hi.max(h);
                }
                (lo, hi)
            };
            tree.height_bounds[i as usize] = bounds;
        }
        tree
    }

    pub fn index(&self) -> TileIndex {
        self.index
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    pub fn links(&self) -> &TileLinks {
        &self.links
    }

    pub(crate) fn set_links(&mut self, links: TileLinks) {
        self.links = links;
    }

    /// Height field position of a tile-local (row, col).
    pub fn global(&self, (row, col): (u32, u32)) -> (u32, u32) {
        if self.mirrored {
            (self.origin.0 - row, self.origin.1 - col)
        } else {
            (self.origin.0 + row, self.origin.1 + col)
        }
    }

    /// The triangle sharing the hypotenuse of `i`, if any.
    pub fn neighbour(&self, shape: &TriShape, i: TriIndex) -> Option<TriRef> {
        match shape.tri(i).neighbour() {
            Neighbour::None => None,
            Neighbour::Interior(n) => Some(TriRef::new(self.index, n)),
            Neighbour::Edge { edge, partner } => {
                let tile = match edge {
                    Edge::Diagonal => self.links.diagonal,
                    Edge::Left => self.links.left,
                    Edge::Top => self.links.top,
                };
                tile.map(|t| TriRef::new(t, partner))
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        for node in self.nodes.iter_mut() {
            *node = BinTriNode::default();
        }
    }

    pub fn node(&self, i: TriIndex) -> &BinTriNode {
        &self.nodes[i as usize]
    }

    pub(crate) fn node_mut(&mut self, i: TriIndex) -> &mut BinTriNode {
        &mut self.nodes[i as usize]
    }

    pub fn state(&self, i: TriIndex) -> TriState {
        self.nodes[i as usize].state
    }

    pub fn is_split(&self, i: TriIndex) -> bool {
        self.nodes[i as usize].state.contains(TriState::SPLIT)
    }

    /// Whether `i` is part of the current triangulation, either as a leaf
    /// or as a split interior node.
    pub fn is_active(&self, i: TriIndex) -> bool {
        i == 1 || (i > 1 && self.is_split(TriShape::parent(i)))
    }

    pub fn is_leaf(&self, i: TriIndex) -> bool {
        self.is_active(i) && !self.is_split(i)
    }

    pub fn priority(&self, i: TriIndex) -> f32 {
        self.nodes[i as usize].priority
    }

    pub fn visibility(&self, i: TriIndex) -> Visibility {
        self.nodes[i as usize].visibility
    }

    pub fn visible(&self, i: TriIndex) -> bool {
        self.nodes[i as usize].visibility != Visibility::Out
    }

    pub fn height_bounds(&self, i: TriIndex) -> (f32, f32) {
        self.height_bounds[i as usize]
    }

    pub fn world_position(&self, shape: &TriShape, i: TriIndex, y: f32) -> Point3<f32> {
        let (r, c) = self.global(shape.row_col(i));
        Point3::new(r as f32, y, c as f32)
    }

    /// Box around triangle `i` spanning its height range.
    pub fn aabb(&self, shape: &TriShape, i: TriIndex) -> Aabb {
        let (lo, hi) = self.height_bounds[i as usize];
        let mut aabb = Aabb::empty();
        for corner in shape.corners(i) {
            aabb.expand_point(&self.world_position(shape, corner, lo));
            aabb.expand_point(&self.world_position(shape, corner, hi));
        }
        aabb
    }

    /// Classify every active triangle against `frustum`. Children of fully
    /// inside or fully outside triangles inherit without a test.
    pub(crate) fn update_visibility(
        &mut self,
        shape: &TriShape,
        frustum: &Frustum,
        stats: &mut MeshStats,
    ) {
        self.visibility_at(shape, frustum, 1, Visibility::Partial, frustum.all_mask(), stats);
    }

    fn visibility_at(
        &mut self,
        shape: &TriShape,
        frustum: &Frustum,
        i: TriIndex,
        parent: Visibility,
        mask: u32,
        stats: &mut MeshStats,
    ) {
        let (visibility, mask) = self.classify(shape, frustum, i, parent, mask, stats);
        self.nodes[i as usize].visibility = visibility;
        if self.is_split(i) {
            self.visibility_at(shape, frustum, TriShape::left(i), visibility, mask, stats);
            self.visibility_at(shape, frustum, TriShape::right(i), visibility, mask, stats);
        }
    }

    fn classify(
        &self,
        shape: &TriShape,
        frustum: &Frustum,
        i: TriIndex,
        parent: Visibility,
        mask: u32,
        stats: &mut MeshStats,
    ) -> (Visibility, u32) {
        match parent {
            Visibility::In | Visibility::Out => (parent, mask),
            Visibility::Partial => {
                stats.visibility_tests += 1;
                match frustum.test_aabb(&self.aabb(shape, i), mask) {
                    None => (Visibility::Out, mask),
                    Some(0) => (Visibility::In, 0),
                    Some(narrowed) => (Visibility::Partial, narrowed),
                }
            }
        }
    }

    /// Visibility and priority for a triangle that just became active, from
    /// its parent's visibility.
    pub(crate) fn refresh_node(
        &mut self,
        shape: &TriShape,
        frustum: &Frustum,
        eye: &Point3<f32>,
        i: TriIndex,
        stats: &mut MeshStats,
    ) {
        let parent = if i > 1 {
            self.visibility(TriShape::parent(i))
        } else {
            Visibility::Partial
        };
        let (visibility, _) = self.classify(shape, frustum, i, parent, frustum.all_mask(), stats);
        self.nodes[i as usize].visibility = visibility;
        self.nodes[i as usize].priority = self.compute_priority(shape, eye, i);
        stats.priorities += 1;
    }

    /// Recompute the priority of every active triangle: the angular size of
    /// its bounding radius as seen from `eye`, or zero when out of view.
    pub(crate) fn update_priorities(
        &mut self,
        shape: &TriShape,
        eye: &Point3<f32>,
        stats: &mut MeshStats,
    ) {
        let mut stack = vec![1];
        while let Some(i) = stack.pop() {
            let priority = self.compute_priority(shape, eye, i);
            stats.priorities += 1;
            self.nodes[i as usize].priority = priority;
            if self.is_split(i) {
                stack.push(TriShape::left(i));
                stack.push(TriShape::right(i));
            }
        }
    }

    fn compute_priority(&self, shape: &TriShape, eye: &Point3<f32>, i: TriIndex) -> f32 {
        if !self.visible(i) {
            return 0f32;
        }
        let (lo, hi) = self.height_bounds[i as usize];
        let radius = ((hi - lo) / 2f32).max(shape.hypotenuse_length(i) / 2f32);
        let mid = (lo + hi) / 2f32;
        let [a, b, c] = shape.corners(i);
        let centre = (self.world_position(shape, a, mid).coords
            + self.world_position(shape, b, mid).coords
            + self.world_position(shape, c, mid).coords)
            / 3f32;
        let d2 = (centre - eye.coords).magnitude_squared().max(1f32);
        1000f32 * radius / d2.sqrt()
    }

    /// Bilinear height at local (row, col) plus a fraction of a cell.
    pub fn tree_height<H: HeightFeeder>(
        &self,
        heights: &H,
        row: u32,
        col: u32,
        dr: f32,
        dc: f32,
    ) -> f32 {
        let h = |r: u32, c: u32| {
            let (gr, gc) = self.global((r, c));
            heights.height(gr, gc)
        };
        let h00 = h(row, col);
        let h10 = h(row + 1, col);
        let h01 = h(row, col + 1);
        let h11 = h(row + 1, col + 1);
        h00 * (1f32 - dr) * (1f32 - dc)
            + h10 * dr * (1f32 - dc)
            + h01 * (1f32 - dr) * dc
            + h11 * dr * dc
    }
}
