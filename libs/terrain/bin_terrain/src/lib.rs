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
//! Continuous level of detail terrain built from binary triangle trees.
//!
//! The height field is cut into square cells of `tile_size` samples, each
//! holding two right-triangular tiles. Every tile is a complete bintree of
//! triangles; the mesh activates some subset of each tree and keeps the
//! subset crack free by always splitting and merging in diamonds, pairs of
//! triangles that share a hypotenuse, possibly across a tile boundary.
mod error;
mod height_field;
mod mesh;
mod opts;
mod queue;
mod shape;
mod stats;
mod tree;
mod vertex_cache;

pub use crate::{
    error::TerrainError,
    height_field::{HeightFeeder, HeightField},
    mesh::{TerrainMesh, TerrainPos},
    opts::TerrainOpts,
    shape::{Edge, Neighbour, ShapeTri, TriIndex, TriShape},
    stats::MeshStats,
    tree::{BinTriNode, BinTriTree, TileIndex, TileLinks, TriRef, TriState, Visibility},
    vertex_cache::{TerrainVertex, TriangleCache, VertexCache},
};
