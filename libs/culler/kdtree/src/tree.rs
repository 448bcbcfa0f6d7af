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
use crate::node::{Node, NodeIndex, Object, ObjectHandle, Side, Split};
use anyhow::{ensure, Result};
use geometry::Aabb;
use log::trace;
use nalgebra::Point3;
use smallvec::{smallvec, SmallVec};
use std::mem;

/// Candidate split locations tried per axis when distributing a leaf.
const MAX_SPLIT_CANDIDATES: usize = 32;

pub const ROOT: NodeIndex = NodeIndex(0);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KdTreeStats {
    pub adds: usize,
    pub removes: usize,
    pub moves: usize,
    pub local_moves: usize,
    pub splits: usize,
    pub collapses: usize,
}

/// A kd-tree over axis aligned boxes.
///
/// Objects are inserted at the leaves their box overlaps; an object that
/// straddles a split plane is referenced from every leaf it touches. Leaves
/// are only split when a traversal asks for it with [`KdTree::distribute`],
/// so a burst of insertions does not pay for rebalancing until some query
/// actually needs the children.
///
/// Node boxes are kept exact: a leaf's box is the union of its objects'
/// boxes and an internal node's box is the union of its children's.
#[derive(Clone, Debug)]
pub struct KdTree<T> {
    nodes: Vec<Node>,
    free_nodes: Vec<NodeIndex>,
    objects: Vec<Option<Object<T>>>,
    free_objects: Vec<ObjectHandle>,
    object_count: usize,
    timestamp: u32,
    min_split_objects: usize,
    stats: KdTreeStats,
}

impl<T: Copy + Eq> Default for KdTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Eq> KdTree<T> {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::leaf(None)],
            free_nodes: Vec::new(),
            objects: Vec::new(),
            free_objects: Vec::new(),
            object_count: 0,
            timestamp: 0,
            min_split_objects: 2,
            stats: KdTreeStats::default(),
        }
    }

    /// Leaves holding this many objects or fewer are never split.
    pub fn with_min_split_objects(mut self, min_split_objects: usize) -> Self {
        self.min_split_objects = min_split_objects.max(1);
        self
    }

    pub fn min_split_objects(&self) -> usize {
        self.min_split_objects
    }

    pub fn root(&self) -> NodeIndex {
        ROOT
    }

    pub fn root_bbox(&self) -> &Aabb {
        &self.nodes[ROOT.index()].bbox
    }

    pub fn object_count(&self) -> usize {
        self.object_count
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_nodes.len()
    }

    pub fn stats(&self) -> &KdTreeStats {
        &self.stats
    }

    pub fn node_bbox(&self, node: NodeIndex) -> &Aabb {
        &self.nodes[node.index()].bbox
    }

    pub fn is_leaf(&self, node: NodeIndex) -> bool {
        self.nodes[node.index()].is_leaf()
    }

    pub fn parent(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.nodes[node.index()].parent
    }

    pub fn children(&self, node: NodeIndex) -> Option<[NodeIndex; 2]> {
        self.nodes[node.index()].split.map(|split| split.children)
    }

    /// The split axis and location of an internal node.
    pub fn split_plane(&self, node: NodeIndex) -> Option<(usize, f32)> {
        self.nodes[node.index()]
            .split
            .map(|split| (split.axis, split.location))
    }

    /// Children ordered nearest to `origin` first.
    pub fn children_front_to_back(
        &self,
        node: NodeIndex,
        origin: &Point3<f32>,
    ) -> Option<[NodeIndex; 2]> {
        self.nodes[node.index()].split.map(|split| {
            let [left, right] = split.children;
            if origin[split.axis] <= split.location {
                [left, right]
            } else {
                [right, left]
            }
        })
    }

    pub fn node_objects(&self, node: NodeIndex) -> &[ObjectHandle] {
        &self.nodes[node.index()].objects
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&T> {
        self.slot(handle).map(|object| &object.payload)
    }

    pub fn object_bbox(&self, handle: ObjectHandle) -> Option<&Aabb> {
        self.slot(handle).map(|object| &object.bbox)
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectHandle, &T, &Aabb)> + '_ {
        self.objects.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref()
                .map(|object| (ObjectHandle(i as u32), &object.payload, &object.bbox))
        })
    }

    fn slot(&self, handle: ObjectHandle) -> Option<&Object<T>> {
        self.objects.get(handle.index()).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, handle: ObjectHandle) -> Option<&mut Object<T>> {
        self.objects.get_mut(handle.index()).and_then(Option::as_mut)
    }

    pub fn add_object(&mut self, bbox: Aabb, payload: T) -> ObjectHandle {
        debug_assert!(
            !self.objects.iter().flatten().any(|o| o.payload == payload),
            "payload inserted into the kd-tree twice"
        );
        let object = Object {
            payload,
            bbox,
            timestamp: 0,
            leaves: SmallVec::new(),
        };
        let handle = if let Some(handle) = self.free_objects.pop() {
            self.objects[handle.index()] = Some(object);
            handle
        } else {
            self.objects.push(Some(object));
            ObjectHandle(self.objects.len() as u32 - 1)
        };
        self.object_count += 1;
        self.stats.adds += 1;
        self.insert(handle, &bbox);
        handle
    }

    /// Give an object a new box. Returns false if the box is unchanged, in
    /// which case nothing is touched.
    pub fn move_object(&mut self, handle: ObjectHandle, bbox: Aabb) -> bool {
        let (old, leaves) = match self.slot(handle) {
            Some(object) if object.bbox != bbox => (object.bbox, object.leaves.clone()),
            _ => return false,
        };
        self.stats.moves += 1;
        if self.reaches_same_leaves(&leaves, &old, &bbox) {
            self.stats.local_moves += 1;
            if let Some(object) = self.slot_mut(handle) {
                object.bbox = bbox;
            }
            for leaf in leaves {
                self.refit(leaf);
            }
        } else {
            self.detach(handle, &leaves);
            if let Some(object) = self.slot_mut(handle) {
                object.bbox = bbox;
                object.leaves.clear();
            }
            self.insert(handle, &bbox);
        }
        true
    }

    /// Remove an object, returning its payload. The handle is dead after
    /// this call and may be handed out again by a later insertion.
    pub fn remove_object(&mut self, handle: ObjectHandle) -> Option<T> {
        let object = self.objects.get_mut(handle.index())?.take()?;
        self.free_objects.push(handle);
        self.object_count -= 1;
        self.stats.removes += 1;
        self.detach(handle, &object.leaves);
        Some(object.payload)
    }

    // Push `handle` down from the root into every leaf its box touches.
    fn insert(&mut self, handle: ObjectHandle, bbox: &Aabb) {
        let mut leaves: SmallVec<[NodeIndex; 2]> = SmallVec::new();
        let mut stack: SmallVec<[NodeIndex; 16]> = smallvec![ROOT];
        while let Some(n) = stack.pop() {
            let node = &mut self.nodes[n.index()];
            node.count += 1;
            match node.split {
                Some(split) => {
                    let side = Side::classify(bbox, split.axis, split.location);
                    if side.left() {
                        stack.push(split.children[0]);
                    }
                    if side.right() {
                        stack.push(split.children[1]);
                    }
                }
                None => {
                    node.objects.push(handle);
                    node.bbox.expand_aabb(bbox);
                    leaves.push(n);
                }
            }
        }
        for &leaf in &leaves {
            self.grow_ancestors(leaf, bbox);
        }
        if let Some(object) = self.slot_mut(handle) {
            object.leaves = leaves;
        }
    }

    fn detach(&mut self, handle: ObjectHandle, leaves: &[NodeIndex]) {
        let mut touched: SmallVec<[NodeIndex; 16]> = SmallVec::new();
        for &leaf in leaves {
            self.nodes[leaf.index()].objects.retain(|h| *h != handle);
            let mut cursor = Some(leaf);
            while let Some(n) = cursor {
                if touched.contains(&n) {
                    break;
                }
                touched.push(n);
                let node = &mut self.nodes[n.index()];
                node.count -= 1;
                cursor = node.parent;
            }
        }
        for &leaf in leaves {
            self.refit(leaf);
        }
        for n in touched {
            self.prune(n);
        }
    }
    fn grow_ancestors(&mut self, node: NodeIndex, bbox: &Aabb) {
        let mut cursor = self.nodes[node.index()].parent;
        while let Some(n) = cursor {
            let node = &mut self.nodes[n.index()];
            if node.bbox.contains_aabb(bbox) {
                break;
            }
            node.bbox.expand_aabb(bbox);
            cursor = node.parent;
        }
    }

    // Recompute the box of `node` from its contents and carry the change
    // upwards until an ancestor's box is unaffected.
    fn refit(&mut self, node: NodeIndex) {
        let mut cursor = Some(node);
        while let Some(n) = cursor {
            let bbox = match self.nodes[n.index()].split {
                Some(split) => self.nodes[split.children[0].index()]
                    .bbox
                    .union(&self.nodes[split.children[1].index()].bbox),
                None => {
                    let mut bbox = Aabb::empty();
                    for &h in &self.nodes[n.index()].objects {
                        if let Some(object) = self.slot(h) {
                            bbox.expand_aabb(&object.bbox);
                        }
                    }
                    bbox
                }
            };
            let node = &mut self.nodes[n.index()];
            if node.bbox == bbox {
                break;
            }
            node.bbox = bbox;
            cursor = node.parent;
        }
    }

    // Insertion never invalidates a split, but removal can: a subtree that
    // shrinks to `min_split_objects` is folded into a single leaf, and a split
    // with one child holding every object is replaced by that child.
    fn prune(&mut self, n: NodeIndex) {
        while self.is_attached(n) {
            let Some(split) = self.nodes[n.index()].split else {
                return;
            };
            let count = self.nodes[n.index()].count;
            let [left, right] = split.children;
            if count <= self.min_split_objects {
                self.flatten(n, split);
                return;
            } else if self.nodes[left.index()].count >= count {
                self.hoist(n, left, right);
            } else if self.nodes[right.index()].count >= count {
                self.hoist(n, right, left);
            } else {
                return;
            }
        }
    }

    fn is_attached(&self, n: NodeIndex) -> bool {
        match self.nodes[n.index()].parent {
            Some(parent) => self.nodes[parent.index()]
                .split
                .map_or(false, |split| split.children.contains(&n)),
            None => n == ROOT,
        }
    }

    fn flatten(&mut self, n: NodeIndex, split: Split) {
        let mut handles = self.release(split.children[0]);
        for h in self.release(split.children[1]) {
            if !handles.contains(&h) {
                handles.push(h);
            }
        }
        for &h in &handles {
            if let Some(object) = self.slot_mut(h) {
                object.leaves.push(n);
            }
        }
        let count = handles.len();
        let node = &mut self.nodes[n.index()];
        debug_assert_eq!(node.count, count);
        node.split = None;
        node.objects = handles;
        node.unsplittable_at = None;
        self.stats.collapses += 1;
        trace!("flattened {} into a leaf of {} objects", n, count);
    }

    // `keep` holds every object under `n`, so `drop` is redundant.
    fn hoist(&mut self, n: NodeIndex, keep: NodeIndex, drop: NodeIndex) {
        self.release(drop);
        let kept = mem::replace(&mut self.nodes[keep.index()], Node::leaf(None));
        self.free_nodes.push(keep);
        match kept.split {
            Some(split) => {
                for child in split.children {
                    self.nodes[child.index()].parent = Some(n);
                }
            }
            None => {
                for &h in &kept.objects {
                    if let Some(object) = self.slot_mut(h) {
                        for l in object.leaves.iter_mut() {
                            if *l == keep {
                                *l = n;
                            }
                        }
                    }
                }
            }
        }
        let node = &mut self.nodes[n.index()];
        node.split = kept.split;
        node.objects = kept.objects;
        node.bbox = kept.bbox;
        node.count = kept.count;
        node.unsplittable_at = kept.unsplittable_at;
        self.stats.collapses += 1;
        trace!("replaced {} with {}, dropping {}", n, keep, drop);
    }

    // Free the subtree under `n`, unlinking its leaves from their objects.
    // Returns the distinct objects it held.
    fn release(&mut self, n: NodeIndex) -> SmallVec<[ObjectHandle; 8]> {
        let mut handles: SmallVec<[ObjectHandle; 8]> = SmallVec::new();
        let mut stack: SmallVec<[NodeIndex; 16]> = smallvec![n];
        while let Some(n) = stack.pop() {
            let node = mem::replace(&mut self.nodes[n.index()], Node::leaf(None));
            self.free_nodes.push(n);
            if let Some(split) = node.split {
                stack.extend(split.children);
                continue;
            }
            for h in node.objects {
                if let Some(object) = self.slot_mut(h) {
                    object.leaves.retain(|l| *l != n);
                }
                if !handles.contains(&h) {
                    handles.push(h);
                }
            }
        }
        handles
    }

    fn alloc_node(&mut self, parent: NodeIndex) -> NodeIndex {
        if let Some(n) = self.free_nodes.pop() {
            self.nodes[n.index()] = Node::leaf(Some(parent));
            n
        } else {
            self.nodes.push(Node::leaf(Some(parent)));
            NodeIndex(self.nodes.len() as u32 - 1)
        }
    }

    // True if `new` lands on the same side of every split above `leaves`
    // as `old` did, which means insertion would reach exactly those leaves.
    fn reaches_same_leaves(&self, leaves: &[NodeIndex], old: &Aabb, new: &Aabb) -> bool {
        for &leaf in leaves {
            let mut cursor = self.nodes[leaf.index()].parent;
            while let Some(n) = cursor {
                let node = &self.nodes[n.index()];
                if let Some(split) = node.split {
                    if Side::classify(old, split.axis, split.location)
                        != Side::classify(new, split.axis, split.location)
                    {
                        return false;
                    }
                }
                cursor = node.parent;
            }
        }
        true
    }

    /// Split a crowded leaf in two. Internal nodes and small leaves are left
    /// alone, as is a leaf whose last attempt found no useful split and whose
    /// object count has not changed since. Returns true if a split happened.
    pub fn distribute(&mut self, n: NodeIndex) -> bool {
        let node = &self.nodes[n.index()];
        let count = node.objects.len();
        if !node.is_leaf()
            || count <= self.min_split_objects
            || node.unsplittable_at == Some(count)
        {
            return false;
        }
        let (axis, location) = match self.find_split(&node.objects) {
            Some(split) => split,
            None => {
                self.nodes[n.index()].unsplittable_at = Some(count);
                trace!("no split for {} with {} objects", n, count);
                return false;
            }
        };

        let left = self.alloc_node(n);
        let right = self.alloc_node(n);
        let handles = mem::take(&mut self.nodes[n.index()].objects);
        let mut left_objects = SmallVec::new();
        let mut right_objects = SmallVec::new();
        let mut left_bbox = Aabb::empty();
        let mut right_bbox = Aabb::empty();
        for h in handles {
            let object = match self.objects.get_mut(h.index()).and_then(Option::as_mut) {
                Some(object) => object,
                None => continue,
            };
            let side = Side::classify(&object.bbox, axis, location);
            object.leaves.retain(|l| *l != n);
            if side.left() {
                object.leaves.push(left);
                left_objects.push(h);
                left_bbox.expand_aabb(&object.bbox);
            }
            if side.right() {
                object.leaves.push(right);
                right_objects.push(h);
                right_bbox.expand_aabb(&object.bbox);
            }
        }
        self.nodes[left.index()].count = left_objects.len();
        self.nodes[left.index()].objects = left_objects;
        self.nodes[left.index()].bbox = left_bbox;
        self.nodes[right.index()].count = right_objects.len();
        self.nodes[right.index()].objects = right_objects;
        self.nodes[right.index()].bbox = right_bbox;
        let node = &mut self.nodes[n.index()];
        node.split = Some(Split {
            axis,
            location,
            children: [left, right],
        });
        node.unsplittable_at = None;
        self.stats.splits += 1;
        trace!("split {} on axis {} at {}", n, axis, location);
        true
    }

    // Candidate planes sit on object box faces. A plane is usable only if
    // both sides end up with fewer objects than the leaf; among usable
    // planes prefer few straddlers and then an even balance.
    fn find_split(&self, handles: &[ObjectHandle]) -> Option<(usize, f32)> {
        let boxes = handles
            .iter()
            .filter_map(|h| self.slot(*h).map(|object| object.bbox))
            .collect::<SmallVec<[Aabb; 16]>>();
        let count = boxes.len();
        let mut best: Option<(usize, usize, f32)> = None;
        for axis in 0..3 {
            let mut candidates = boxes
                .iter()
                .flat_map(|b| [b.min()[axis], b.max()[axis]])
                .filter(|v| v.is_finite())
                .collect::<Vec<f32>>();
            candidates.sort_by(|a, b| a.total_cmp(b));
            candidates.dedup();
            let stride = ((candidates.len() + MAX_SPLIT_CANDIDATES - 1) / MAX_SPLIT_CANDIDATES).max(1);
            for &location in candidates.iter().step_by(stride) {
                let (mut left, mut right, mut straddle) = (0, 0, 0);
                for b in &boxes {
                    match Side::classify(b, axis, location) {
                        Side::Left => left += 1,
                        Side::Right => right += 1,
                        Side::Both => straddle += 1,
                    }
                }
                if left + straddle >= count || right + straddle >= count {
                    continue;
                }
                let cost = straddle * 2 + left.abs_diff(right);
                if best.map_or(true, |(best_cost, _, _)| cost < best_cost) {
                    best = Some((cost, axis, location));
                }
            }
        }
        best.map(|(_, axis, location)| (axis, location))
    }

    /// Start a new traversal. Every object's timestamp is reset when the
    /// counter wraps, so a stale stamp can never match the fresh one.
    pub fn new_traversal(&mut self) -> u32 {
        self.timestamp = self.timestamp.wrapping_add(1);
        if self.timestamp == 0 {
            for object in self.objects.iter_mut().flatten() {
                object.timestamp = 0;
            }
            self.timestamp = 1;
        }
        self.timestamp
    }

    /// Stamp `handle` for traversal `timestamp`. Returns true on the first
    /// visit only.
    pub fn mark_visited(&mut self, handle: ObjectHandle, timestamp: u32) -> bool {
        match self.slot_mut(handle) {
            Some(object) if object.timestamp != timestamp => {
                object.timestamp = timestamp;
                true
            }
            _ => false,
        }
    }

    /// The objects of `node` not yet seen during traversal `timestamp`,
    /// stamping them as seen.
    pub fn take_unvisited(
        &mut self,
        node: NodeIndex,
        timestamp: u32,
    ) -> SmallVec<[ObjectHandle; 8]> {
        let Self { nodes, objects, .. } = self;
        let mut out = SmallVec::new();
        for &h in &nodes[node.index()].objects {
            if let Some(object) = objects.get_mut(h.index()).and_then(Option::as_mut) {
                if object.timestamp != timestamp {
                    object.timestamp = timestamp;
                    out.push(h);
                }
            }
        }
        out
    }

    /// Depth first walk visiting the child nearer to `origin` first.
    ///
    /// `visit` gets the tree, the node, a fresh traversal timestamp and the
    /// frustum mask for the node, which it may narrow for the node's
    /// subtree. Returning false prunes the subtree. The visitor may
    /// [`distribute`](Self::distribute) the node it is handed, but must not
    /// add, move or remove objects.
    pub fn front_to_back<F>(&mut self, origin: &Point3<f32>, mask: u32, visit: F)
    where
        F: FnMut(&mut Self, NodeIndex, u32, &mut u32) -> bool,
    {
        let origin = *origin;
        self.walk(mask, visit, |tree, n| tree.children_front_to_back(n, &origin));
    }

    /// As [`front_to_back`](Self::front_to_back), in no particular order.
    pub fn traverse_random<F>(&mut self, mask: u32, visit: F)
    where
        F: FnMut(&mut Self, NodeIndex, u32, &mut u32) -> bool,
    {
        self.walk(mask, visit, |tree, n| tree.children(n));
    }

    fn walk<F, C>(&mut self, mask: u32, mut visit: F, order: C)
    where
        F: FnMut(&mut Self, NodeIndex, u32, &mut u32) -> bool,
        C: Fn(&Self, NodeIndex) -> Option<[NodeIndex; 2]>,
    {
        let timestamp = self.new_traversal();
        let mut stack: SmallVec<[(NodeIndex, u32); 32]> = smallvec![(ROOT, mask)];
        while let Some((n, mut mask)) = stack.pop() {
            if self.nodes[n.index()].bbox.is_empty() {
                continue;
            }
            if !visit(self, n, timestamp, &mut mask) {
                continue;
            }
            if let Some([near, far]) = order(self, n) {
                stack.push((far, mask));
                stack.push((near, mask));
            }
        }
    }

    /// Check every structural invariant of the tree.
    pub fn verify(&self) -> Result<()> {
        let mut free = vec![false; self.nodes.len()];
        for n in &self.free_nodes {
            free[n.index()] = true;
        }
        ensure!(!free[ROOT.index()], "root is on the free list");
        for (i, node) in self.nodes.iter().enumerate() {
            if free[i] {
                continue;
            }
            let n = NodeIndex(i as u32);
            match node.split {
                Some(split) => {
                    ensure!(node.objects.is_empty(), "internal node {} holds objects", n);
                    for child in split.children {
                        ensure!(!free[child.index()], "{} has freed child {}", n, child);
                        let child_node = &self.nodes[child.index()];
                        ensure!(
                            child_node.parent == Some(n),
                            "{} does not point back at parent {}",
                            child,
                            n
                        );
                        ensure!(
                            node.bbox.contains_aabb(&child_node.bbox),
                            "{} does not contain child {}",
                            n,
                            child
                        );
                    }
                }
                None => {
                    let mut union = Aabb::empty();
                    for &h in &node.objects {
                        let object = self.slot(h);
                        ensure!(object.is_some(), "{} holds dead object {:?}", n, h);
                        if let Some(object) = object {
                            ensure!(
                                object.leaves.contains(&n),
                                "{:?} does not list leaf {}",
                                h,
                                n
                            );
                            union.expand_aabb(&object.bbox);
                        }
                    }
                    ensure!(node.bbox == union, "{} box is not the union of its objects", n);
                }
            }
        }
        let mut expected = vec![0usize; self.nodes.len()];
        let mut seen: Vec<NodeIndex> = Vec::new();
        for object in self.objects.iter().flatten() {
            seen.clear();
            for &leaf in &object.leaves {
                let mut cursor = Some(leaf);
                while let Some(n) = cursor {
                    if seen.contains(&n) {
                        break;
                    }
                    seen.push(n);
                    expected[n.index()] += 1;
                    cursor = self.nodes[n.index()].parent;
                }
            }
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if free[i] {
                continue;
            }
            let n = NodeIndex(i as u32);
            ensure!(
                node.count == expected[i],
                "{} counts {} objects, found {}",
                n,
                node.count,
                expected[i]
            );
            if let Some(split) = node.split {
                ensure!(
                    node.count > self.min_split_objects,
                    "{} is split with only {} objects",
                    n,
                    node.count
                );
                for child in split.children {
                    ensure!(
                        self.nodes[child.index()].count < node.count,
                        "{} does not separate its objects",
                        n
                    );
                }
            }
        }
        let root = self.root_bbox();
        let mut live = 0;
        for (i, slot) in self.objects.iter().enumerate() {
            let object = match slot {
                Some(object) => object,
                None => continue,
            };
            live += 1;
            let h = ObjectHandle(i as u32);
            ensure!(!object.leaves.is_empty(), "{:?} is in no leaf", h);
            for leaf in &object.leaves {
                ensure!(!free[leaf.index()], "{:?} lists freed node {}", h, leaf);
                ensure!(
                    self.nodes[leaf.index()].objects.contains(&h),
                    "{} does not hold {:?}",
                    leaf,
                    h
                );
            }
            ensure!(root.contains_aabb(&object.bbox), "root does not contain {:?}", h);
        }
        ensure!(live == self.object_count, "object count mismatch");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn cube(x: f32, y: f32, z: f32, size: f32) -> Aabb {
        Aabb::new(Point3::new(x, y, z), Point3::new(x + size, y + size, z + size))
    }

    fn random_box(rng: &fastrand::Rng) -> Aabb {
        let size = if rng.u32(0..10) == 0 { 200f32 } else { 10f32 };
        cube(
            rng.f32() * 1000f32,
            rng.f32() * 1000f32,
            rng.f32() * 1000f32,
            rng.f32() * size + 0.5,
        )
    }

    fn distribute_all(tree: &mut KdTree<u32>) {
        tree.front_to_back(&Point3::origin(), 0, |tree, n, _, _| {
            tree.distribute(n);
            true
        });
    }

    // Four unit cubes in a row along x.
    fn row() -> (KdTree<u32>, Vec<ObjectHandle>) {
        let mut tree = KdTree::new();
        let handles = (0..4)
            .map(|i| tree.add_object(cube(i as f32 * 10f32, 0f32, 0f32, 1f32), i))
            .collect();
        (tree, handles)
    }

    #[test]
    fn test_containment_after_add_and_move() -> Result<()> {
        let rng = fastrand::Rng::with_seed(0xdeadbeef);
        let mut tree = KdTree::new();
        let mut handles = Vec::new();
        for i in 0..200 {
            let bbox = random_box(&rng);
            handles.push((tree.add_object(bbox, i), bbox));
            if i % 20 == 0 {
                distribute_all(&mut tree);
            }
        }
        distribute_all(&mut tree);
        tree.verify()?;
        for (h, bbox) in handles.iter_mut() {
            *bbox = if rng.bool() {
                random_box(&rng)
            } else {
                bbox.transformed(&nalgebra::Isometry3::translation(1f32, 0f32, 0f32))
            };
            assert!(tree.move_object(*h, *bbox));
        }
        tree.verify()?;
        for (h, bbox) in &handles {
            assert!(tree.root_bbox().contains_aabb(bbox));
            assert_eq!(tree.object_bbox(*h), Some(bbox));
        }
        Ok(())
    }

    #[test]
    fn test_traversal_visits_each_object_once() -> Result<()> {
        let rng = fastrand::Rng::with_seed(42);
        let mut tree = KdTree::new();
        for i in 0..300 {
            tree.add_object(random_box(&rng), i);
        }
        for _ in 0..3 {
            let mut seen = HashMap::new();
            tree.front_to_back(&Point3::new(500f32, 500f32, 500f32), 0, |tree, n, ts, _| {
                tree.distribute(n);
                for h in tree.take_unvisited(n, ts) {
                    if let Some(payload) = tree.object(h) {
                        *seen.entry(*payload).or_insert(0) += 1;
                    }
                }
                true
            });
            assert_eq!(seen.len(), 300);
            assert!(seen.values().all(|&v| v == 1));
        }
        assert!(tree.node_count() > 1);
        tree.verify()
    }

    #[test]
    fn test_distribute_splits_between_objects() -> Result<()> {
        let (mut tree, _) = row();
        assert!(tree.distribute(ROOT));
        assert_eq!(tree.split_plane(ROOT), Some((0, 11f32)));
        let [left, right] = tree.children(ROOT).unwrap();
        assert_eq!(tree.node_objects(left).len(), 2);
        assert_eq!(tree.node_objects(right).len(), 2);
        assert_eq!(tree.node_bbox(left).max().x, 11f32);
        assert!(!tree.distribute(left));
        tree.verify()
    }

    #[test]
    fn test_front_to_back_order() {
        let (mut tree, _) = row();
        distribute_all(&mut tree);
        for (origin, expect) in [(-100f32, [0u32, 1]), (100f32, [2, 3])] {
            let mut first = Vec::new();
            tree.front_to_back(&Point3::new(origin, 0f32, 0f32), 0, |tree, n, ts, _| {
                if tree.is_leaf(n) && first.is_empty() {
                    first = tree
                        .take_unvisited(n, ts)
                        .iter()
                        .filter_map(|h| tree.object(*h).copied())
                        .collect();
                }
                true
            });
            first.sort_unstable();
            assert_eq!(first, expect);
        }
    }

    #[test]
    fn test_visitor_prunes_and_narrows_mask() {
        let (mut tree, _) = row();
        distribute_all(&mut tree);
        let mut masks = Vec::new();
        tree.front_to_back(&Point3::origin(), 0b111, |tree, n, _, mask| {
            masks.push((n, *mask));
            if n == tree.root() {
                *mask = 0b1;
                return true;
            }
            false
        });
        assert_eq!(masks.len(), 3);
        assert_eq!(masks[0], (ROOT, 0b111));
        assert!(masks[1..].iter().all(|(_, m)| *m == 0b1));
    }

    #[test]
    fn test_move_fast_paths() -> Result<()> {
        let (mut tree, handles) = row();
        tree.distribute(ROOT);
        let before = *tree.stats();

        assert!(!tree.move_object(handles[0], cube(0f32, 0f32, 0f32, 1f32)));
        assert_eq!(*tree.stats(), before);

        assert!(tree.move_object(handles[0], cube(0.5, 0f32, 0f32, 1f32)));
        assert_eq!(tree.stats().moves, before.moves + 1);
        assert_eq!(tree.stats().local_moves, before.local_moves + 1);
        let [left, right] = tree.children(ROOT).unwrap();
        assert_eq!(tree.node_bbox(left).min().x, 0.5);
        tree.verify()?;

        assert!(tree.move_object(handles[0], cube(40f32, 0f32, 0f32, 1f32)));
        assert_eq!(tree.stats().local_moves, before.local_moves + 1);
        assert!(tree.node_objects(right).contains(&handles[0]));
        assert!(!tree.node_objects(left).contains(&handles[0]));
        assert_eq!(tree.root_bbox().max().x, 41f32);
        tree.verify()
    }

    #[test]
    fn test_straddling_object_shrinks_to_one_side() -> Result<()> {
        let (mut tree, handles) = row();
        tree.distribute(ROOT);
        let wide = tree.add_object(cube(5f32, 0f32, 0f32, 10f32), 10);
        let [left, right] = tree.children(ROOT).unwrap();
        assert!(tree.node_objects(left).contains(&wide));
        assert!(tree.node_objects(right).contains(&wide));
        tree.move_object(wide, cube(5f32, 0f32, 0f32, 1f32));
        assert!(!tree.node_objects(right).contains(&wide));
        assert_eq!(tree.node_bbox(right).min().x, 20f32);
        assert!(tree.object(handles[3]).is_some());
        tree.verify()
    }

    #[test]
    fn test_remove_collapses_empty_leaves() -> Result<()> {
        let (mut tree, handles) = row();
        tree.distribute(ROOT);
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.remove_object(handles[0]), Some(0));
        assert_eq!(tree.remove_object(handles[0]), None);
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.node_bbox(tree.root()).min().x, 10f32);
        assert_eq!(tree.remove_object(handles[1]), Some(1));
        assert_eq!(tree.node_count(), 1);
        assert!(tree.is_leaf(ROOT));
        assert_eq!(tree.node_objects(ROOT).len(), 2);
        assert_eq!(tree.root_bbox().min().x, 20f32);
        assert_eq!(tree.stats().collapses, 1);
        tree.verify()?;

        tree.remove_object(handles[2]);
        tree.remove_object(handles[3]);
        assert!(tree.root_bbox().is_empty());
        assert_eq!(tree.object_count(), 0);
        let reused = tree.add_object(cube(1f32, 1f32, 1f32, 1f32), 7);
        assert_eq!(tree.object(reused), Some(&7));
        tree.verify()
    }

    #[test]
    fn test_split_covered_by_one_child_is_replaced() -> Result<()> {
        let (mut tree, handles) = row();
        tree.distribute(ROOT);
        let wide = tree.add_object(cube(0f32, 0f32, 0f32, 31f32), 10);
        assert_eq!(tree.node_count(), 3);
        tree.remove_object(handles[2]);
        assert_eq!(tree.node_count(), 3);
        tree.verify()?;

        // The left child now holds everything the root does.
        tree.remove_object(handles[3]);
        assert_eq!(tree.node_count(), 1);
        assert!(tree.is_leaf(ROOT));
        let mut held = tree.node_objects(ROOT).to_vec();
        held.sort_unstable();
        assert_eq!(held, vec![handles[0], handles[1], wide]);
        assert_eq!(tree.root_bbox().max().x, 31f32);
        tree.verify()
    }

    fn fresh_node_count(boxes: &[Aabb]) -> usize {
        let mut tree = KdTree::new();
        for (i, bbox) in boxes.iter().enumerate() {
            tree.add_object(*bbox, i as u32);
        }
        distribute_all(&mut tree);
        tree.node_count()
    }

    #[test]
    fn test_moves_do_not_grow_the_tree() -> Result<()> {
        let rng = fastrand::Rng::with_seed(0x5eed);
        let mut tree = KdTree::new();
        let mut objects = (0..300)
            .map(|i| {
                let bbox = random_box(&rng);
                (tree.add_object(bbox, i), bbox)
            })
            .collect::<Vec<_>>();
        distribute_all(&mut tree);
        for _ in 0..40 {
            for (h, bbox) in objects.iter_mut() {
                *bbox = random_box(&rng);
                tree.move_object(*h, *bbox);
            }
            distribute_all(&mut tree);
        }
        tree.verify()?;
        let boxes = objects.iter().map(|(_, bbox)| *bbox).collect::<Vec<_>>();
        let fresh = fresh_node_count(&boxes);
        assert!(
            tree.node_count() <= 4 * fresh,
            "{} nodes after moves, {} when built fresh",
            tree.node_count(),
            fresh
        );
        Ok(())
    }

    #[test]
    fn test_mixed_updates_keep_the_tree_compact() -> Result<()> {
        let rng = fastrand::Rng::with_seed(7);
        let mut tree = KdTree::new();
        let mut live: Vec<(ObjectHandle, Aabb)> = Vec::new();
        for step in 0..3000u32 {
            match rng.u8(0..3) {
                0 if !live.is_empty() => {
                    let (h, _) = live.swap_remove(rng.usize(0..live.len()));
                    assert!(tree.remove_object(h).is_some());
                }
                1 if !live.is_empty() => {
                    let i = rng.usize(0..live.len());
                    live[i].1 = random_box(&rng);
                    tree.move_object(live[i].0, live[i].1);
                }
                _ => {
                    let bbox = random_box(&rng);
                    live.push((tree.add_object(bbox, step), bbox));
                }
            }
            if step % 50 == 0 {
                distribute_all(&mut tree);
            }
        }
        distribute_all(&mut tree);
        tree.verify()?;
        assert_eq!(tree.object_count(), live.len());
        let boxes = live.iter().map(|(_, bbox)| *bbox).collect::<Vec<_>>();
        let fresh = fresh_node_count(&boxes);
        assert!(
            tree.node_count() <= 4 * fresh,
            "{} nodes after updates, {} when built fresh",
            tree.node_count(),
            fresh
        );
        Ok(())
    }

    #[test]
    fn test_failed_split_waits_for_new_objects() {
        let mut tree = KdTree::new();
        for i in 0..3 {
            tree.add_object(cube(0f32, 0f32, 0f32, 1f32), i);
        }
        assert!(!tree.distribute(ROOT));
        assert_eq!(tree.nodes[ROOT.index()].unsplittable_at, Some(3));
        assert!(!tree.distribute(ROOT));
        tree.add_object(cube(5f32, 0f32, 0f32, 1f32), 3);
        tree.add_object(cube(6f32, 0f32, 0f32, 1f32), 4);
        assert!(tree.distribute(ROOT));
    }

    #[test]
    fn test_min_split_objects() {
        let (tree, _) = row();
        let mut tree = KdTree { min_split_objects: 4, ..tree };
        assert!(!tree.distribute(ROOT));
        let tree = KdTree::<u32>::new().with_min_split_objects(0);
        assert_eq!(tree.min_split_objects(), 1);
    }

    #[test]
    fn test_timestamp_wrap_resets_objects() {
        let (mut tree, handles) = row();
        tree.timestamp = u32::MAX - 1;
        let ts = tree.new_traversal();
        assert_eq!(ts, u32::MAX);
        assert!(tree.mark_visited(handles[0], ts));
        assert!(!tree.mark_visited(handles[0], ts));
        let ts = tree.new_traversal();
        assert_eq!(ts, 1);
        assert!(tree.objects().all(|(h, _, _)| tree.slot(h).unwrap().timestamp == 0));
        assert!(tree.mark_visited(handles[0], ts));
    }

    #[test]
    fn test_empty_tree_traversal() {
        let mut tree = KdTree::<u32>::new();
        let mut visited = 0;
        tree.traverse_random(u32::MAX, |_, _, _, _| {
            visited += 1;
            true
        });
        assert_eq!(visited, 0);
        assert!(tree.root_bbox().is_empty());
    }
}
