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
use geometry::Aabb;
use smallvec::SmallVec;
use std::fmt;

/// Index of a node in the tree's arena. Indices of collapsed nodes are
/// recycled, so do not hold one across a mutation of the tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeIndex(pub(crate) u32);

impl NodeIndex {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Stable reference to an object stored in the tree. Valid until the object
/// is removed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ObjectHandle(pub(crate) u32);

impl ObjectHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which side(s) of a split plane a box occupies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Side {
    Left,
    Right,
    Both,
}

impl Side {
    pub(crate) fn classify(bbox: &Aabb, axis: usize, location: f32) -> Self {
        if bbox.max()[axis] <= location {
            Side::Left
        } else if bbox.min()[axis] >= location {
            Side::Right
        } else {
            Side::Both
        }
    }

    pub(crate) fn left(self) -> bool {
        self != Side::Right
    }

    pub(crate) fn right(self) -> bool {
        self != Side::Left
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Split {
    pub(crate) axis: usize,
    pub(crate) location: f32,
    pub(crate) children: [NodeIndex; 2],
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) bbox: Aabb,
    pub(crate) parent: Option<NodeIndex>,
    pub(crate) split: Option<Split>,
    // Only leaves hold objects.
    pub(crate) objects: SmallVec<[ObjectHandle; 8]>,
    // Distinct objects anywhere below this node.
    pub(crate) count: usize,
    // Object count at the last distribute that found no usable split.
    pub(crate) unsplittable_at: Option<usize>,
}

impl Node {
    pub(crate) fn leaf(parent: Option<NodeIndex>) -> Self {
        Self {
            bbox: Aabb::empty(),
            parent,
            split: None,
            objects: SmallVec::new(),
            count: 0,
            unsplittable_at: None,
        }
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.split.is_none()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Object<T> {
    pub(crate) payload: T,
    pub(crate) bbox: Aabb,
    pub(crate) timestamp: u32,
    pub(crate) leaves: SmallVec<[NodeIndex; 2]>,
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_classify_against_split() {
        let bbox = Aabb::new(Point3::new(1f32, 0f32, 0f32), Point3::new(3f32, 1f32, 1f32));
        assert_eq!(Side::classify(&bbox, 0, 3f32), Side::Left);
        assert_eq!(Side::classify(&bbox, 0, 1f32), Side::Right);
        assert_eq!(Side::classify(&bbox, 0, 2f32), Side::Both);
        assert!(Side::Both.left() && Side::Both.right());
        assert!(!Side::Left.right());
    }
}
