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
    error::TerrainError,
    height_field::HeightFeeder,
    opts::TerrainOpts,
    queue::{MaxHeap, MinHeap, Queue},
    shape::{TriIndex, TriShape},
    stats::MeshStats,
    tree::{BinTriTree, TileIndex, TileLinks, TriRef, TriState},
    vertex_cache::{TerrainVertex, TriangleCache, VertexCache},
};
use anyhow::{ensure, Result};
use camera::Camera;
use geometry::{
    algorithm::{compute_normal, height_field_normal},
    Frustum,
};
use log::{debug, trace, warn};
use nalgebra::{Point3, Vector3};

/// Where a world (x, z) falls on the mesh: the owning tile, the tile-local
/// cell and the offset within that cell.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TerrainPos {
    pub tile: TileIndex,
    pub row: u32,
    pub col: u32,
    pub dr: f32,
    pub dc: f32,
}

/// A continuous level of detail terrain: a grid of bintree tiles over one
/// height field, re-balanced every frame between a split queue of leaf
/// triangles and a merge queue of diamonds.
///
/// World x runs along height field rows, world z along columns and world y
/// is the sampled height.
pub struct TerrainMesh<H: HeightFeeder> {
    heights: H,
    opts: TerrainOpts,
    shape: TriShape,
    tile_rows: u32,
    tile_cols: u32,
    tiles: Vec<BinTriTree>,

    split_queue: Queue<MaxHeap>,
    merge_queue: Queue<MinHeap>,
    vcache: VertexCache,
    tcache: TriangleCache,
    stats: MeshStats,

    // Leaf triangles currently in the mesh, visible or not.
    tri_count: usize,
    dirty: bool,
    balance_count: usize,
    last_merge: bool,
    last_view: Option<(Point3<f32>, Vector3<f32>)>,
    frustum: Frustum,
    eye: Point3<f32>,
}

impl<H: HeightFeeder> TerrainMesh<H> {
    pub fn new(heights: H, opts: TerrainOpts) -> Result<Self> {
        if opts.min_detail > opts.max_detail || opts.max_detail > opts.abs_max_detail {
            return Err(TerrainError::BadDetail {
                min: opts.min_detail,
                max: opts.max_detail,
                abs_max: opts.abs_max_detail,
            }
            .into());
        }
        let shape = TriShape::new(opts.tile_size)?;
        let size = shape.size();
        let (rows, cols) = (heights.rows(), heights.cols());
        if rows < size + 1 || cols < size + 1 || (rows - 1) % size != 0 || (cols - 1) % size != 0
        {
            return Err(TerrainError::BadHeightField {
                rows,
                cols,
                tile_size: size,
            }
            .into());
        }
        let tile_rows = (rows - 1) / size;
        let tile_cols = (cols - 1) / size;
        debug!("creating {} x {} terrain tiles", tile_rows, tile_cols);

        let mut tiles = Vec::with_capacity((2 * tile_rows * tile_cols) as usize);
        for i in 0..tile_rows {
            for j in 0..tile_cols {
                let index = 2 * (i * tile_cols + j);
                tiles.push(BinTriTree::new(
                    index,
                    (i * size, j * size),
                    false,
                    &shape,
                    &heights,
                ));
                tiles.push(BinTriTree::new(
                    index + 1,
                    ((i + 1) * size, (j + 1) * size),
                    true,
                    &shape,
                    &heights,
                ));
            }
        }
        let at = |i: u32, j: u32| 2 * (i * tile_cols + j);
        for i in 0..tile_rows {
            for j in 0..tile_cols {
                tiles[at(i, j) as usize].set_links(TileLinks {
                    diagonal: Some(at(i, j) + 1),
                    left: (j > 0).then(|| at(i, j - 1) + 1),
                    top: (i > 0).then(|| at(i - 1, j) + 1),
                });
                tiles[at(i, j) as usize + 1].set_links(TileLinks {
                    diagonal: Some(at(i, j)),
                    left: (j + 1 < tile_cols).then(|| at(i, j + 1)),
                    top: (i + 1 < tile_rows).then(|| at(i + 1, j)),
                });
            }
        }

        // Every tile plus a frame's worth of triangles, with 10% to spare.
        let bintree_max = tiles.len();
        let budget = bintree_max + opts.abs_max_detail as usize;
        let vcache = VertexCache::with_capacity((budget * 3 * 11) / 10)?;
        let tcache = TriangleCache::with_capacity((budget * 11) / 10)?;

        let mut mesh = Self {
            heights,
            opts,
            shape,
            tile_rows,
            tile_cols,
            tiles,
            split_queue: Queue::new(),
            merge_queue: Queue::new(),
            vcache,
            tcache,
            stats: MeshStats::default(),
            tri_count: bintree_max,
            dirty: true,
            balance_count: 0,
            last_merge: false,
            last_view: None,
            frustum: Frustum::default(),
            eye: Point3::origin(),
        };
        mesh.reset_queues();
        Ok(mesh)
    }

    pub fn opts(&self) -> &TerrainOpts {
        &self.opts
    }

    pub fn shape(&self) -> &TriShape {
        &self.shape
    }

    pub fn heights(&self) -> &H {
        &self.heights
    }

    pub fn tiles(&self) -> &[BinTriTree] {
        &self.tiles
    }

    /// Rows and columns of grid cells; each cell holds two tiles.
    pub fn tile_grid(&self) -> (u32, u32) {
        (self.tile_rows, self.tile_cols)
    }

    pub fn stats(&self) -> &MeshStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.clear();
    }

    /// Number of leaf triangles in the current triangulation.
    pub fn triangle_count(&self) -> usize {
        self.tri_count
    }

    /// Force the next `calculate` to run even if the camera has not moved.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// This frame's vertices, shared between `triangles`.
    pub fn vertices(&self) -> &[TerrainVertex] {
        self.vcache.vertices()
    }

    /// This frame's visible triangles, counter-clockwise seen from above.
    pub fn triangles(&self) -> &[[u32; 3]] {
        self.tcache.triangles()
    }

    /// Re-balance the mesh for `camera` and rebuild the visible vertex and
    /// triangle buffers. Returns true if balancing work remains for
    /// subsequent frames.
    pub fn calculate(&mut self, camera: &Camera) -> bool {
        let view = (*camera.position(), *camera.forward());
        if self.last_view != Some(view) {
            self.dirty = true;
            self.last_view = Some(view);
        }
        // Dont do anything if we didnt move and the current frame is done.
        if !self.dirty && self.balance_count == 0 {
            return false;
        }

        self.frustum = camera.world_space_frustum();
        self.eye = *camera.position();
        if !(self.last_merge && self.opts.merge) {
            self.reset_queues();
        }

        for tile in self.tiles.iter_mut() {
            tile.update_visibility(&self.shape, &self.frustum, &mut self.stats);
        }
        for tile in self.tiles.iter_mut() {
            tile.update_priorities(&self.shape, &self.eye, &mut self.stats);
        }
        let tiles = &self.tiles;
        let shape = &self.shape;
        self.split_queue
            .update_cache(|t| tiles[t.tile as usize].priority(t.tri), &mut self.stats);
        self.merge_queue
            .update_cache(|t| merge_priority(tiles, shape, t), &mut self.stats);

        self.balance_count = self.balance_queue();
        self.last_merge = self.opts.merge;

        self.emit_triangles();
        self.stats.triangles += self.tcache.len() as u64;
        self.dirty = false;
        debug!(
            "terrain: {} leaves, {} visible, {} balance ops, sq: {}, mq: {}",
            self.tri_count,
            self.tcache.len(),
            self.balance_count,
            self.split_queue.len(),
            self.merge_queue.len()
        );
        self.balance_count > 0
    }

    fn reset_queues(&mut self) {
        self.split_queue.clear();
        self.merge_queue.clear();
        for tile in self.tiles.iter_mut() {
            tile.reset();
        }
        self.tri_count = self.tiles.len();
        for tile in 0..self.tiles.len() as TileIndex {
            self.insert_sq(TriRef::new(tile, 1));
        }
        self.stats.resets += 1;
    }

    /// Split and merge until the triangle count is within the detail limits
    /// and the queues agree, or the loop budget runs out. Returns the number
    /// of operations performed.
    pub fn balance_queue(&mut self) -> usize {
        let min_detail = self.opts.min_detail as usize;
        let max_detail = self.opts.max_detail as usize;
        let max_loop = if self.opts.merge {
            min_detail / 4
        } else {
            0xFFFF
        };
        let pri_diff = self.opts.priority_tolerance() as f32;
        let min_diff = min_detail - min_detail / 100;

        let mut count = 0;
        loop {
            let mut merged = false;
            let mut split = false;
            if self.opts.merge && !self.merge_queue.is_empty() {
                if self.tri_count > max_detail {
                    merged = self.merge_lowest();
                } else {
                    let pm = self.merge_queue.peek().map(|(_, p)| p).unwrap_or(0f32);
                    let ps = self.split_queue.peek().map(|(_, p)| p).unwrap_or(0f32);
                    // Useless (out of view) diamonds go first, then any
                    // diamond that is clearly worth less than the best split.
                    if pm == 0f32 || (self.tri_count > min_diff && ps > pm + pri_diff) {
                        merged = self.merge_lowest();
                    }
                }
            }
            if !merged && self.tri_count < min_detail {
                split = self.split_highest();
            }
            if !merged && !split {
                break;
            }
            count += 1;
            if count > max_loop {
                debug!("terrain balance stopped after {} operations", count);
                break;
            }
        }
        count
    }

    fn split_highest(&mut self) -> bool {
        match self.split_queue.peek() {
            Some((t, _)) if self.tiles[t.tile as usize].visible(t.tri) => self.force_split_ref(t),
            _ => false,
        }
    }

    fn merge_lowest(&mut self) -> bool {
        match self.merge_queue.peek() {
            Some((t, _)) => {
                let merged = self.force_merge_ref(t);
                if !merged {
                    warn!("dropping unmergeable diamond {:?} from the merge queue", t);
                    self.remove_mq(t);
                }
                merged
            }
            None => false,
        }
    }

    /// Split triangle `tri` of `tile`, first splitting whatever coarser
    /// triangles are needed to keep the mesh crack free. Fails only for
    /// triangles at the finest level.
    pub fn force_split(&mut self, tile: TileIndex, tri: TriIndex) -> bool {
        if tile as usize >= self.tiles.len() || tri as usize >= self.shape.tri_no() as usize {
            return false;
        }
        self.force_split_ref(TriRef::new(tile, tri))
    }

    fn force_split_ref(&mut self, t: TriRef) -> bool {
        if self.is_split(t) {
            return true;
        }
        if !self.shape.can_split(t.tri) {
            return false;
        }
        if t.tri > 1 {
            let parent = TriRef::new(t.tile, TriShape::parent(t.tri));
            if !self.is_split(parent) && !self.force_split_ref(parent) {
                return false;
            }
        }
        let neighbour = self.neighbour(t);
        if let Some(n) = neighbour {
            if !self.is_split(n) {
                if n.tri > 1 {
                    let parent = TriRef::new(n.tile, TriShape::parent(n.tri));
                    if !self.is_split(parent) && !self.force_split_ref(parent) {
                        return false;
                    }
                }
                self.split_one(n);
            }
        }
        self.split_one(t);
        trace!("split {:?} with {:?}", t, neighbour);

        self.touch_merge(t);
        if let Some(n) = neighbour {
            self.touch_merge(n);
        }
        true
    }

    /// Merge the diamond of triangle `tri` of `tile` and its neighbour back
    /// into their two parents. Fails unless both halves are split into
    /// leaves.
    pub fn force_merge(&mut self, tile: TileIndex, tri: TriIndex) -> bool {
        if tile as usize >= self.tiles.len() || tri as usize >= self.shape.tri_no() as usize {
            return false;
        }
        self.force_merge_ref(TriRef::new(tile, tri))
    }

    fn force_merge_ref(&mut self, t: TriRef) -> bool {
        if t.tri == 0 || !self.mergeable(t) {
            return false;
        }
        let neighbour = self.neighbour(t);
        self.merge_one(t);
        if let Some(n) = neighbour {
            self.merge_one(n);
        }
        trace!("merge {:?} with {:?}", t, neighbour);

        self.touch_merge(t);
        if let Some(n) = neighbour {
            self.touch_merge(n);
        }
        true
    }

    fn split_one(&mut self, t: TriRef) {
        debug_assert!(self.shape.can_split(t.tri) && !self.is_split(t));
        self.tiles[t.tile as usize]
            .node_mut(t.tri)
            .state
            .insert(TriState::SPLIT);
        self.remove_sq(t);
        for child in [TriShape::left(t.tri), TriShape::right(t.tri)] {
            self.tiles[t.tile as usize].refresh_node(
                &self.shape,
                &self.frustum,
                &self.eye,
                child,
                &mut self.stats,
            );
            self.insert_sq(TriRef::new(t.tile, child));
        }
        self.tri_count += 1;
        self.stats.splits += 1;
    }

    fn merge_one(&mut self, t: TriRef) {
        debug_assert!(self.is_split(t));
        for child in [TriShape::left(t.tri), TriShape::right(t.tri)] {
            self.remove_sq(TriRef::new(t.tile, child));
        }
        self.tiles[t.tile as usize]
            .node_mut(t.tri)
            .state
            .remove(TriState::SPLIT);
        self.remove_mq(t);
        self.insert_sq(t);
        self.tri_count -= 1;
        self.stats.merges += 1;
    }

    // Splitting or merging `t` changes whether t, its parent, its neighbour
    // and its parent's neighbour are mergeable diamonds.
    fn touch_merge(&mut self, t: TriRef) {
        self.update_mq(t);
        if let Some(n) = self.neighbour(t) {
            self.update_mq(n);
        }
        if t.tri > 1 {
            let parent = TriRef::new(t.tile, TriShape::parent(t.tri));
            self.update_mq(parent);
            if let Some(n) = self.neighbour(parent) {
                self.update_mq(n);
            }
        }
    }

    fn update_mq(&mut self, t: TriRef) {
        if t.tri == 0 {
            return;
        }
        if self.mergeable(t) {
            if !self.merge_queue.contains(t) {
                let priority = merge_priority(&self.tiles, &self.shape, t);
                self.merge_queue.insert(t, priority, &mut self.stats);
                self.state_mut(t).insert(TriState::IN_MQ);
            }
        } else {
            self.remove_mq(t);
        }
    }

    fn remove_mq(&mut self, t: TriRef) {
        self.merge_queue.remove(t, &mut self.stats);
        self.state_mut(t).remove(TriState::IN_MQ);
    }

    fn insert_sq(&mut self, t: TriRef) {
        if !self.shape.can_split(t.tri) {
            return;
        }
        let priority = self.tiles[t.tile as usize].priority(t.tri);
        self.split_queue.insert(t, priority, &mut self.stats);
        self.state_mut(t).insert(TriState::IN_SQ);
    }

    fn remove_sq(&mut self, t: TriRef) {
        self.split_queue.remove(t, &mut self.stats);
        self.state_mut(t).remove(TriState::IN_SQ);
    }

    fn state_mut(&mut self, t: TriRef) -> &mut TriState {
        &mut self.tiles[t.tile as usize].node_mut(t.tri).state
    }

    fn is_split(&self, t: TriRef) -> bool {
        self.tiles[t.tile as usize].is_split(t.tri)
    }

    fn neighbour(&self, t: TriRef) -> Option<TriRef> {
        self.tiles[t.tile as usize].neighbour(&self.shape, t.tri)
    }

    fn has_leaf_children(&self, t: TriRef) -> bool {
        let tree = &self.tiles[t.tile as usize];
        tree.is_split(t.tri)
            && !tree.is_split(TriShape::left(t.tri))
            && !tree.is_split(TriShape::right(t.tri))
    }

    /// Whether `t` and its neighbour are both split into leaves, so that the
    /// diamond they form can be merged.
    pub fn mergeable(&self, t: TriRef) -> bool {
        if t.tri == 0 || !self.tiles[t.tile as usize].is_active(t.tri) || !self.has_leaf_children(t)
        {
            return false;
        }
        match self.neighbour(t) {
            Some(n) => self.has_leaf_children(n),
            None => true,
        }
    }

    /// Locate world (x, z) on the mesh, clamped onto the terrain.
    pub fn pos(&self, x: f32, z: f32) -> TerrainPos {
        let size = self.shape.size() as f32;
        let x = x.clamp(0f32, (self.tile_rows * self.shape.size()) as f32 - 1f32);
        let z = z.clamp(0f32, (self.tile_cols * self.shape.size()) as f32 - 1f32);
        let gr = ((x / size) as u32).min(self.tile_rows - 1);
        let gc = ((z / size) as u32).min(self.tile_cols - 1);
        let mut lx = x - gr as f32 * size;
        let mut lz = z - gc as f32 * size;
        // The far half of each cell belongs to the mirrored tile.
        let mirror = lx + lz >= size;
        if mirror {
            lx = size - lx;
            lz = size - lz;
        }
        let row = (lx as u32).min(self.shape.size() - 1);
        let col = (lz as u32).min(self.shape.size() - 1);
        TerrainPos {
            tile: 2 * (gr * self.tile_cols + gc) + u32::from(mirror),
            row,
            col,
            dr: lx - row as f32,
            dc: lz - col as f32,
        }
    }

    /// Terrain height at world (x, z), bilinearly interpolated.
    pub fn height(&self, x: f32, z: f32) -> f32 {
        let p = self.pos(x, z);
        self.tiles[p.tile as usize].tree_height(&self.heights, p.row, p.col, p.dr, p.dc)
    }

    /// Surface normal at world (x, z).
    pub fn normal(&self, x: f32, z: f32) -> Vector3<f32> {
        let dx = self.height(x + 0.5, z) - self.height(x - 0.5, z);
        let dz = self.height(x, z + 0.5) - self.height(x, z - 0.5);
        height_field_normal(dx, dz)
    }

    /// All leaf triangles of the current triangulation, visible or not, as
    /// height field (row, col) corners.
    pub fn active_triangles(&self) -> Vec<[(u32, u32); 3]> {
        let mut out = Vec::with_capacity(self.tri_count);
        for tile in &self.tiles {
            let mut stack = vec![1];
            while let Some(i) = stack.pop() {
                if tile.is_split(i) {
                    stack.push(TriShape::left(i));
                    stack.push(TriShape::right(i));
                } else {
                    out.push(self.shape.corners(i).map(|v| tile.global(self.shape.row_col(v))));
                }
            }
        }
        out
    }

    fn emit_triangles(&mut self) {
        self.vcache.reset();
        self.tcache.reset();
        let heights = &self.heights;
        let shape = &self.shape;
        let vcache = &mut self.vcache;
        let tcache = &mut self.tcache;
        for tile in &self.tiles {
            let mut stack = vec![1];
            while let Some(i) = stack.pop() {
                if tile.is_split(i) {
                    stack.push(TriShape::left(i));
                    stack.push(TriShape::right(i));
                    continue;
                }
                if !tile.visible(i) {
                    continue;
                }
                let corners = counter_clockwise(
                    shape
                        .corners(i)
                        .map(|v| tile.global(shape.row_col(v))),
                );
                let mut indices = [0u32; 3];
                for (slot, key) in indices.iter_mut().zip(corners) {
                    match vcache.index_of(key, || grid_vertex(heights, key)) {
                        Some(index) => *slot = index,
                        None => {
                            warn!("terrain vertex cache full at {} vertices", vcache.len());
                            return;
                        }
                    }
                }
                if !tcache.push(indices) {
                    warn!("terrain triangle cache full at {} triangles", tcache.len());
                    return;
                }
            }
        }
    }

    /// Check the queue bookkeeping against the triangulation.
    pub fn verify(&self) -> Result<()> {
        let mut leaves = 0;
        for (t, tile) in self.tiles.iter().enumerate() {
            let t = t as TileIndex;
            for i in 1..self.shape.tri_no() {
                let tr = TriRef::new(t, i);
                let state = tile.state(i);
                ensure!(
                    state.contains(TriState::IN_SQ) == self.split_queue.contains(tr),
                    "split queue flag mismatch at {:?}",
                    tr
                );
                ensure!(
                    state.contains(TriState::IN_MQ) == self.merge_queue.contains(tr),
                    "merge queue flag mismatch at {:?}",
                    tr
                );
                ensure!(
                    !tile.is_split(i) || tile.is_active(i),
                    "split triangle {:?} below an unsplit parent",
                    tr
                );
                if tile.is_leaf(i) {
                    leaves += 1;
                    ensure!(
                        !self.shape.can_split(i) || self.split_queue.contains(tr),
                        "leaf {:?} missing from the split queue",
                        tr
                    );
                } else {
                    ensure!(!self.split_queue.contains(tr), "{:?} is not a leaf", tr);
                }
                if tile.is_split(i) {
                    if let Some(n) = self.neighbour(tr) {
                        ensure!(self.is_split(n), "half split diamond at {:?}", tr);
                    }
                }
                ensure!(
                    self.mergeable(tr) == self.merge_queue.contains(tr),
                    "merge queue out of date at {:?}",
                    tr
                );
            }
        }
        ensure!(
            leaves == self.tri_count,
            "counted {} leaves, expected {}",
            leaves,
            self.tri_count
        );
        ensure!(
            self.split_queue.entries().count() == self.split_queue.len(),
            "split queue heap and contents disagree"
        );
        for (tr, priority) in self.split_queue.entries() {
            let live = self.tiles[tr.tile as usize].priority(tr.tri);
            ensure!(
                priority == live,
                "{:?} queued for split at {}, live priority {}",
                tr,
                priority,
                live
            );
        }
        ensure!(
            self.merge_queue.entries().count() == self.merge_queue.len(),
            "merge queue heap and contents disagree"
        );
        for (tr, priority) in self.merge_queue.entries() {
            let live = merge_priority(&self.tiles, &self.shape, tr);
            ensure!(
                priority == live,
                "{:?} queued for merge at {}, live priority {}",
                tr,
                priority,
                live
            );
        }
        Ok(())
    }
}

fn merge_priority(tiles: &[BinTriTree], shape: &TriShape, t: TriRef) -> f32 {
    let tree = &tiles[t.tile as usize];
    let own = tree.priority(t.tri);
    match tree.neighbour(shape, t.tri) {
        Some(n) => own.max(tiles[n.tile as usize].priority(n.tri)),
        None => own,
    }
}

// Order grid corners so the triangle faces +y.
fn counter_clockwise(mut corners: [(u32, u32); 3]) -> [(u32, u32); 3] {
    let [a, b, c] = corners.map(|(row, col)| Point3::new(row as f32, 0f32, col as f32));
    if compute_normal(&a, &b, &c).y < 0f32 {
        corners.swap(1, 2);
    }
    corners
}

fn grid_vertex<H: HeightFeeder>(heights: &H, (row, col): (u32, u32)) -> TerrainVertex {
    let h = |r: u32, c: u32| heights.height(r, c);
    let r0 = row.saturating_sub(1);
    let r1 = (row + 1).min(heights.rows() - 1);
    let c0 = col.saturating_sub(1);
    let c1 = (col + 1).min(heights.cols() - 1);
    let dx = (h(r1, col) - h(r0, col)) / (r1 - r0).max(1) as f32;
    let dz = (h(row, c1) - h(row, c0)) / (c1 - c0).max(1) as f32;
    TerrainVertex {
        position: Point3::new(row as f32, h(row, col), col as f32),
        normal: height_field_normal(dx, dz),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::height_field::HeightField;
    use std::{collections::HashSet, f32::consts::FRAC_PI_2};

    fn rolling(rows: u32, cols: u32) -> HeightField {
        HeightField::from_fn(rows, cols, |r, c| {
            ((r as f32 * 0.3).sin() + (c as f32 * 0.2).cos()) * 4f32
        })
    }

    fn overhead_camera(x: f32, y: f32, z: f32) -> Camera {
        let mut camera = Camera::from_parameters(FRAC_PI_2, 1f32, 1f32, 1000f32);
        camera.set_position(Point3::new(x, y, z));
        camera.set_orientation(&-Vector3::y(), &Vector3::x());
        camera
    }

    // Any corner lying strictly inside another triangle's edge is a
    // T-junction.
    fn find_crack(tris: &[[(u32, u32); 3]]) -> Option<(u32, u32)> {
        let corners: HashSet<(u32, u32)> = tris.iter().flatten().copied().collect();
        for tri in tris {
            for k in 0..3 {
                let a = tri[k];
                let b = tri[(k + 1) % 3];
                let dr = b.0 as i64 - a.0 as i64;
                let dc = b.1 as i64 - a.1 as i64;
                let steps = dr.abs().max(dc.abs());
                for s in 1..steps {
                    let p = (
                        (a.0 as i64 + dr / steps * s) as u32,
                        (a.1 as i64 + dc / steps * s) as u32,
                    );
                    if corners.contains(&p) {
                        return Some(p);
                    }
                }
            }
        }
        None
    }

    #[test]
    fn test_rejects_bad_height_field() {
        let opts = TerrainOpts::default().with_tile_size(8);
        assert!(TerrainMesh::new(HeightField::flat(10, 10, 0f32), opts.clone()).is_err());
        assert!(TerrainMesh::new(HeightField::flat(5, 5, 0f32), opts.clone()).is_err());
        assert!(TerrainMesh::new(HeightField::flat(17, 9, 0f32), opts.clone()).is_ok());
        let backwards = opts.with_detail(300, 200, 400);
        assert!(TerrainMesh::new(HeightField::flat(9, 9, 0f32), backwards).is_err());
    }

    #[test]
    fn test_tile_links() -> Result<()> {
        let opts = TerrainOpts::default().with_tile_size(8);
        let mesh = TerrainMesh::new(HeightField::flat(17, 17, 0f32), opts)?;
        assert_eq!(mesh.tiles().len(), 8);
        assert_eq!(
            *mesh.tiles()[0].links(),
            TileLinks {
                diagonal: Some(1),
                left: None,
                top: None
            }
        );
        assert_eq!(
            *mesh.tiles()[1].links(),
            TileLinks {
                diagonal: Some(0),
                left: Some(2),
                top: Some(4)
            }
        );
        assert_eq!(
            *mesh.tiles()[6].links(),
            TileLinks {
                diagonal: Some(7),
                left: Some(5),
                top: Some(3)
            }
        );
        Ok(())
    }

    #[test]
    fn test_fresh_mesh_is_one_leaf_per_tile() -> Result<()> {
        let opts = TerrainOpts::default().with_tile_size(8);
        let mesh = TerrainMesh::new(rolling(17, 17), opts)?;
        assert_eq!(mesh.triangle_count(), 8);
        assert_eq!(mesh.active_triangles().len(), 8);
        assert_eq!(find_crack(&mesh.active_triangles()), None);
        mesh.verify()
    }

    #[test]
    fn test_force_split_cascades_across_tiles() -> Result<()> {
        let opts = TerrainOpts::default().with_tile_size(8);
        let mut mesh = TerrainMesh::new(rolling(17, 17), opts)?;
        let deepest = mesh.shape().leaf_tri_no() - 1;
        assert!(mesh.force_split(0, deepest));
        assert!(mesh.triangle_count() > 8 + mesh.shape().max_level() as usize);
        assert_eq!(mesh.triangle_count(), mesh.active_triangles().len());
        assert_eq!(find_crack(&mesh.active_triangles()), None);
        mesh.verify()?;

        // Leaves cannot be split.
        assert!(!mesh.force_split(0, mesh.shape().leaf_tri_no()));
        Ok(())
    }

    #[test]
    fn test_merge_undoes_split() -> Result<()> {
        let opts = TerrainOpts::default().with_tile_size(8);
        let mut mesh = TerrainMesh::new(rolling(17, 17), opts)?;
        assert!(mesh.force_split(0, 1));
        assert_eq!(mesh.triangle_count(), 10);
        assert!(mesh.mergeable(TriRef::new(0, 1)));
        assert!(mesh.mergeable(TriRef::new(1, 1)));
        assert!(!mesh.force_merge(0, 2));
        assert!(mesh.force_merge(1, 1));
        assert_eq!(mesh.triangle_count(), 8);
        assert!(!mesh.force_merge(0, 1));
        mesh.verify()
    }

    #[test]
    fn test_random_split_merge_never_cracks() -> Result<()> {
        let opts = TerrainOpts::default().with_tile_size(8);
        let mut mesh = TerrainMesh::new(rolling(17, 17), opts)?;
        let rng = fastrand::Rng::with_seed(0x5eed);
        let tile_count = mesh.tiles().len() as u32;
        let leaf = mesh.shape().leaf_tri_no();
        for _ in 0..400 {
            let tile = rng.u32(0..tile_count);
            if rng.u8(0..3) > 0 {
                mesh.force_split(tile, rng.u32(1..leaf));
            } else {
                let candidates = (1..leaf)
                    .filter(|&i| mesh.mergeable(TriRef::new(tile, i)))
                    .collect::<Vec<_>>();
                if !candidates.is_empty() {
                    let tri = candidates[rng.usize(0..candidates.len())];
                    assert!(mesh.force_merge(tile, tri));
                }
            }
            let tris = mesh.active_triangles();
            assert_eq!(find_crack(&tris), None);
            assert_eq!(tris.len(), mesh.triangle_count());
            mesh.verify()?;
        }
        Ok(())
    }

    #[test]
    fn test_calculate_respects_detail_limits() -> Result<()> {
        let mut opts = TerrainOpts::default()
            .with_tile_size(16)
            .with_detail(200, 260, 400);
        opts.priority_tolerance = Some(1_000_000);
        let mut mesh = TerrainMesh::new(rolling(33, 33), opts)?;
        let camera = overhead_camera(16f32, 60f32, 16f32);

        let mut converged = false;
        for _ in 0..200 {
            if !mesh.calculate(&camera) {
                converged = true;
                break;
            }
        }
        assert!(converged);
        assert!(mesh.triangle_count() >= 200);
        assert!(mesh.triangle_count() <= 260);
        assert_eq!(find_crack(&mesh.active_triangles()), None);
        mesh.verify()?;

        // Everything is in view.
        assert_eq!(mesh.triangles().len(), mesh.triangle_count());
        for tri in mesh.triangles() {
            assert!(tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2]);
            let [a, b, c] = tri.map(|i| mesh.vertices()[i as usize].position);
            assert!((b - a).cross(&(c - a)).y > 0f32);
        }
        assert!(mesh.vertices().len() < 3 * mesh.triangles().len());

        // Nothing moved, nothing to do.
        let before = *mesh.stats();
        assert!(!mesh.calculate(&camera));
        assert_eq!(before, *mesh.stats());
        Ok(())
    }

    #[test]
    fn test_calculate_converges_with_default_tolerance() -> Result<()> {
        let opts = TerrainOpts::default()
            .with_tile_size(16)
            .with_detail(200, 260, 400);
        let mut mesh = TerrainMesh::new(rolling(33, 33), opts)?;
        let camera = overhead_camera(16f32, 60f32, 16f32);
        let mut frames = 0;
        while mesh.calculate(&camera) {
            mesh.verify()?;
            frames += 1;
            assert!(frames < 200, "balancing never settled");
        }
        assert!(mesh.triangle_count() >= 200);
        assert!(mesh.triangle_count() <= 260);
        assert_eq!(find_crack(&mesh.active_triangles()), None);
        mesh.verify()?;

        // Moving the camera rebalances against the new priorities.
        let camera = overhead_camera(2f32, 30f32, 2f32);
        mesh.calculate(&camera);
        mesh.verify()?;
        assert!(mesh.triangle_count() <= 260);
        Ok(())
    }

    #[test]
    fn test_counter_clockwise_faces_up() {
        let up = [(0u32, 0u32), (0, 4), (4, 0)];
        let down = [(0u32, 0u32), (4, 0), (0, 4)];
        assert_eq!(counter_clockwise(up), up);
        for tri in [up, down] {
            let [a, b, c] = counter_clockwise(tri)
                .map(|(row, col)| Point3::new(row as f32, 0f32, col as f32));
            assert!((b - a).cross(&(c - a)).y > 0f32);
        }
    }

    #[test]
    fn test_detail_follows_the_camera() -> Result<()> {
        let opts = TerrainOpts::default()
            .with_tile_size(16)
            .with_detail(150, 200, 400)
            .with_merge(false);
        let mut mesh = TerrainMesh::new(rolling(33, 33), opts)?;
        let camera = overhead_camera(4f32, 20f32, 4f32);
        mesh.calculate(&camera);
        assert!(mesh.triangle_count() >= 150);
        mesh.verify()?;

        // Triangles under the camera are finer than the coarsest ones.
        let area = |t: &[(u32, u32); 3]| {
            let (a, b, c) = (t[0], t[1], t[2]);
            let cross = (b.0 as i64 - a.0 as i64) * (c.1 as i64 - a.1 as i64)
                - (b.1 as i64 - a.1 as i64) * (c.0 as i64 - a.0 as i64);
            cross.abs()
        };
        let tris = mesh.active_triangles();
        let near = tris
            .iter()
            .filter(|t| t.iter().all(|&(r, c)| r <= 8 && c <= 8))
            .map(area)
            .min()
            .unwrap_or(i64::MAX);
        let coarsest = tris.iter().map(area).max().unwrap_or(0);
        assert!(near < coarsest);

        // Without merging, each frame starts over from the root triangles.
        let resets = mesh.stats().resets;
        mesh.calculate(&overhead_camera(28f32, 20f32, 28f32));
        assert_eq!(mesh.stats().resets, resets + 1);
        mesh.verify()
    }

    #[test]
    fn test_height_queries_clamp() -> Result<()> {
        let field = HeightField::from_fn(17, 17, |r, c| (r + 2 * c) as f32);
        let opts = TerrainOpts::default().with_tile_size(8);
        let mesh = TerrainMesh::new(field, opts)?;
        assert_eq!(mesh.pos(1f32, 1f32).tile, 0);
        assert_eq!(mesh.pos(7f32, 7f32).tile, 1);
        assert_eq!(mesh.pos(9f32, 1f32).tile, 4);

        assert!((mesh.height(2.5, 1f32) - 4.5).abs() < 1e-5);
        assert!((mesh.height(7f32, 7f32) - 21f32).abs() < 1e-5);
        assert!((mesh.height(10.25, 12.5) - 35.25).abs() < 1e-4);
        assert_eq!(mesh.height(-5f32, -5f32), 0f32);
        // Clamped to the last whole cell.
        assert!((mesh.height(100f32, 100f32) - 45f32).abs() < 1e-5);

        let n = mesh.normal(3f32, 2f32);
        let expect = Vector3::new(-1f32, 1f32, -2f32).normalize();
        assert!((n - expect).magnitude() < 1e-4);
        Ok(())
    }
}
