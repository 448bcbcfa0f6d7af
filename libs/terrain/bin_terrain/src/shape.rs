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
use crate::error::TerrainError;
use anyhow::Result;
use fxhash::FxHashMap;
use smallvec::SmallVec;

/// Index of a triangle within a tile's bintree. The root triangle is 1,
/// the children of `i` are `2i` and `2i + 1`, and index 0 is the corner
/// opposite the root's hypotenuse.
pub type TriIndex = u32;

/// The tile boundary that an edge triangle's hypotenuse lies on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Edge {
    /// row == 0
    Top,
    /// col == 0
    Left,
    /// row + col == tile size
    Diagonal,
}

/// The triangle sharing a triangle's hypotenuse.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Neighbour {
    /// Corners and anything not yet linked.
    None,
    /// Another triangle of the same tile.
    Interior(TriIndex),
    /// The triangle `partner` in the tile across `edge`.
    Edge { edge: Edge, partner: TriIndex },
}

#[derive(Copy, Clone, Debug)]
pub struct ShapeTri {
    row: u32,
    col: u32,
    v0: TriIndex,
    v1: TriIndex,
    neighbour: Neighbour,
}

impl Default for ShapeTri {
    fn default() -> Self {
        Self {
            row: 0,
            col: 0,
            v0: 0,
            v1: 0,
            neighbour: Neighbour::None,
        }
    }
}

impl ShapeTri {
    /// Tile local position of the midpoint of this triangle's hypotenuse.
    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn col(&self) -> u32 {
        self.col
    }

    pub fn v0(&self) -> TriIndex {
        self.v0
    }

    pub fn v1(&self) -> TriIndex {
        self.v1
    }

    pub fn neighbour(&self) -> Neighbour {
        self.neighbour
    }
}

/// Geometry shared by every tile of a mesh: the tile-local grid position of
/// each bintree triangle and the fixed neighbour table.
#[derive(Debug)]
pub struct TriShape {
    size: u32,
    max_level: u32,
    tri_no: u32,
    leaf_tri_no: u32,
    tris: Vec<ShapeTri>,
}

impl TriShape {
    pub fn new(size: u32) -> Result<Self> {
        if size < 2 || !size.is_power_of_two() || size > 1 << 15 {
            return Err(TerrainError::BadTileSize(size).into());
        }
        let max_level = 2 * size.trailing_zeros();
        let tri_no = 1u32 << max_level;
        let mut shape = Self {
            size,
            max_level,
            tri_no,
            leaf_tri_no: tri_no / 2,
            tris: vec![ShapeTri::default(); tri_no as usize + 2],
        };

        // The corners: 0 is the apex of the root, the two sentinels are the
        // ends of its hypotenuse.
        shape.tris[tri_no as usize].row = size;
        shape.tris[tri_no as usize].col = 0;
        shape.tris[tri_no as usize + 1].row = 0;
        shape.tris[tri_no as usize + 1].col = size;
        shape.init_vertex(1, 0, tri_no, tri_no + 1, 1);
        shape.init_neighbours();
        Ok(shape)
    }

    // va is the apex (the parent), v0 and v1 end the hypotenuse of vc.
    fn init_vertex(&mut self, level: u32, va: TriIndex, v0: TriIndex, v1: TriIndex, vc: TriIndex) {
        let (r0, c0) = self.row_col(v0);
        let (r1, c1) = self.row_col(v1);
        let tri = &mut self.tris[vc as usize];
        tri.row = (r0 + r1) / 2;
        tri.col = (c0 + c1) / 2;
        tri.v0 = v0;
        tri.v1 = v1;
        if level < self.max_level {
            self.init_vertex(level + 1, vc, va, v0, Self::left(vc));
            self.init_vertex(level + 1, vc, v1, va, Self::right(vc));
        }
    }

    // Triangles on the same level that share a hypotenuse midpoint share the
    // hypotenuse. Lone triangles lie on a tile boundary and pair with the
    // same-level triangle at the mirrored position in the adjacent tile.
    fn init_neighbours(&mut self) {
        for level in 1..=self.max_level {
            let first = 1u32 << (level - 1);
            let last = 1u32 << level;
            let mut by_position: FxHashMap<(u32, u32), SmallVec<[TriIndex; 2]>> =
                FxHashMap::default();
            for i in first..last {
                by_position.entry(self.row_col(i)).or_default().push(i);
            }
            for i in first..last {
                let (row, col) = self.row_col(i);
                let found = &by_position[&(row, col)];
                let neighbour = if found.len() == 2 {
                    Neighbour::Interior(if found[0] == i { found[1] } else { found[0] })
                } else if let Some(edge) = self.edge_at(row, col) {
                    let across = self.across(edge, row, col);
                    match by_position.get(&across) {
                        Some(partner) => Neighbour::Edge {
                            edge,
                            partner: partner[0],
                        },
                        None => Neighbour::None,
                    }
                } else {
                    Neighbour::None
                };
                debug_assert!(neighbour != Neighbour::None, "unlinked triangle {i}");
                self.tris[i as usize].neighbour = neighbour;
            }
        }
    }

    fn edge_at(&self, row: u32, col: u32) -> Option<Edge> {
        if row + col == self.size {
            Some(Edge::Diagonal)
        } else if row == 0 {
            Some(Edge::Top)
        } else if col == 0 {
            Some(Edge::Left)
        } else {
            None
        }
    }

    // The tile-local position, in the tile across `edge`, of the point at
    // (row, col) on that edge. Tiles alternate mirroring, so the top edge
    // of one tile is the top edge of its neighbour, reflected.
    fn across(&self, edge: Edge, row: u32, col: u32) -> (u32, u32) {
        match edge {
            Edge::Top => (0, self.size - col),
            Edge::Left => (self.size - row, 0),
            Edge::Diagonal => (col, row),
        }
    }

    pub fn left(i: TriIndex) -> TriIndex {
        2 * i
    }

    pub fn right(i: TriIndex) -> TriIndex {
        2 * i + 1
    }

    pub fn parent(i: TriIndex) -> TriIndex {
        i / 2
    }

    /// Depth of `i` in the tree; the root is level 1.
    pub fn level(i: TriIndex) -> u32 {
        32 - i.leading_zeros()
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Number of triangle slots; the two corner sentinels live at `tri_no`
    /// and `tri_no + 1`.
    pub fn tri_no(&self) -> u32 {
        self.tri_no
    }

    /// Triangles below this index have children.
    pub fn leaf_tri_no(&self) -> u32 {
        self.leaf_tri_no
    }

    pub fn can_split(&self, i: TriIndex) -> bool {
        i > 0 && i < self.leaf_tri_no
    }

    pub fn tri(&self, i: TriIndex) -> &ShapeTri {
        &self.tris[i as usize]
    }

    pub fn row_col(&self, i: TriIndex) -> (u32, u32) {
        let tri = &self.tris[i as usize];
        (tri.row, tri.col)
    }

    /// Shape indices of the three corners of triangle `i`: both ends of the
    /// hypotenuse then the right angle.
    pub fn corners(&self, i: TriIndex) -> [TriIndex; 3] {
        let tri = &self.tris[i as usize];
        [tri.v0, tri.v1, Self::parent(i)]
    }

    pub fn hypotenuse_length(&self, i: TriIndex) -> f32 {
        let (r0, c0) = self.row_col(self.tris[i as usize].v0);
        let (r1, c1) = self.row_col(self.tris[i as usize].v1);
        let dr = r0 as f32 - r1 as f32;
        let dc = c0 as f32 - c1 as f32;
        (dr * dr + dc * dc).sqrt()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(TriShape::new(0).is_err());
        assert!(TriShape::new(1).is_err());
        assert!(TriShape::new(12).is_err());
        assert!(TriShape::new(8).is_ok());
    }

    #[test]
    fn test_top_levels() -> Result<()> {
        let shape = TriShape::new(8)?;
        assert_eq!(shape.max_level(), 6);
        assert_eq!(shape.tri_no(), 64);
        assert_eq!(shape.leaf_tri_no(), 32);
        assert_eq!(shape.row_col(1), (4, 4));
        assert_eq!(shape.row_col(2), (4, 0));
        assert_eq!(shape.row_col(3), (0, 4));
        assert_eq!(shape.corners(1), [64, 65, 0]);
        assert_eq!(
            shape.tri(1).neighbour(),
            Neighbour::Edge {
                edge: Edge::Diagonal,
                partner: 1
            }
        );
        assert_eq!(
            shape.tri(2).neighbour(),
            Neighbour::Edge {
                edge: Edge::Left,
                partner: 2
            }
        );
        assert_eq!(
            shape.tri(3).neighbour(),
            Neighbour::Edge {
                edge: Edge::Top,
                partner: 3
            }
        );
        // 4 and 7 share the line from the corner to the centre.
        assert_eq!(shape.row_col(4), (2, 2));
        assert_eq!(shape.row_col(7), (2, 2));
        assert_eq!(shape.tri(4).neighbour(), Neighbour::Interior(7));
        Ok(())
    }

    #[test]
    fn test_neighbours_are_symmetric() -> Result<()> {
        for size in [2, 4, 8, 16] {
            let shape = TriShape::new(size)?;
            for i in 1..shape.tri_no() {
                match shape.tri(i).neighbour() {
                    Neighbour::Interior(n) => {
                        assert_eq!(shape.tri(n).neighbour(), Neighbour::Interior(i));
                        assert_eq!(shape.row_col(n), shape.row_col(i));
                        assert_eq!(TriShape::level(n), TriShape::level(i));
                    }
                    Neighbour::Edge { edge, partner } => match shape.tri(partner).neighbour() {
                        Neighbour::Edge {
                            edge: other,
                            partner: back,
                        } => {
                            assert_eq!(edge, other);
                            assert_eq!(back, i);
                        }
                        _ => panic!("edge partner of {i} is not an edge"),
                    },
                    Neighbour::None => panic!("no neighbour for {i}"),
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_leaves_sit_on_the_grid() -> Result<()> {
        let shape = TriShape::new(16)?;
        for i in shape.leaf_tri_no()..shape.tri_no() {
            assert!((shape.hypotenuse_length(i) - 2f32).abs() < 1e-6);
            for corner in shape.corners(i) {
                let (r, c) = shape.row_col(corner);
                assert!(r + c <= 16);
            }
        }
        Ok(())
    }
}
