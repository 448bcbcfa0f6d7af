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
use nalgebra::{Point3, Vector3};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TerrainVertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
}

/// Fixed capacity scratch buffer of this frame's vertices, shared between
/// triangles by height field position.
#[derive(Debug)]
pub struct VertexCache {
    vertices: Vec<TerrainVertex>,
    lookup: FxHashMap<(u32, u32), u32>,
    capacity: usize,
}

impl VertexCache {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let failed = || TerrainError::CacheAllocation {
            what: "vertex",
            count: capacity,
        };
        let mut vertices = Vec::new();
        vertices.try_reserve_exact(capacity).map_err(|_| failed())?;
        let mut lookup = FxHashMap::default();
        lookup.try_reserve(capacity).map_err(|_| failed())?;
        Ok(Self {
            vertices,
            lookup,
            capacity,
        })
    }

    pub fn reset(&mut self) {
        self.vertices.clear();
        self.lookup.clear();
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.vertices.len() >= self.capacity
    }

    /// The index of the vertex at `key`, creating it with `make` if this is
    /// its first use this frame. `None` once the cache is full.
    pub fn index_of<F: FnOnce() -> TerrainVertex>(&mut self, key: (u32, u32), make: F) -> Option<u32> {
        if let Some(&index) = self.lookup.get(&key) {
            return Some(index);
        }
        if self.is_full() {
            return None;
        }
        let index = self.vertices.len() as u32;
        self.vertices.push(make());
        self.lookup.insert(key, index);
        Some(index)
    }

    pub fn vertices(&self) -> &[TerrainVertex] {
        &self.vertices
    }
}

/// Fixed capacity list of this frame's triangles as vertex cache indices.
#[derive(Debug)]
pub struct TriangleCache {
    triangles: Vec<[u32; 3]>,
    capacity: usize,
}

impl TriangleCache {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut triangles = Vec::new();
        triangles
            .try_reserve_exact(capacity)
            .map_err(|_| TerrainError::CacheAllocation {
                what: "triangle",
                count: capacity,
            })?;
        Ok(Self {
            triangles,
            capacity,
        })
    }

    pub fn reset(&mut self) {
        self.triangles.clear();
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.triangles.len() >= self.capacity
    }

    pub fn push(&mut self, triangle: [u32; 3]) -> bool {
        if self.is_full() {
            return false;
        }
        self.triangles.push(triangle);
        true
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }
}
