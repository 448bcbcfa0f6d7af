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
    object::{world_bbox, BeamHit, MeshHandle, VisFlags, VisibilityCullerListener, VisibilityObject},
    occlusion::{OcclusionHistory, OcclusionPass, OcclusionQueries},
    stats::CullerStats,
    view::{NodeTest, RenderView},
    wrapper::{ObjectWrapper, VisObjectId, Wrappers},
};
use fxhash::FxHashSet;
use geometry::{
    intersect::{box_segment, box_sphere},
    Aabb, Frustum, Plane, Segment, Sphere,
};
use kdtree::{KdTree, NodeIndex};
use log::{debug, trace, warn};
use nalgebra::Point3;
use std::{fmt, mem, rc::Rc};

/// The nearest object along a segment.
#[derive(Clone)]
pub struct SegmentHit {
    pub object: Rc<dyn VisibilityObject>,
    pub mesh: Option<MeshHandle>,
    /// Where the segment meets the object, in world space.
    pub point: Point3<f32>,
    /// Fraction of the way along the segment.
    pub distance: f32,
    pub polygon: Option<usize>,
}

impl fmt::Debug for SegmentHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentHit")
            .field("mesh", &self.mesh)
            .field("point", &self.point)
            .field("distance", &self.distance)
            .field("polygon", &self.polygon)
            .finish()
    }
}

/// Frustum and occlusion culling of scene objects over a kd-tree.
///
/// Objects register once and are then tracked by [`VisObjectId`]. Moving an
/// object does not touch the tree: the owner queues the object with
/// [`add_object_to_update_queue`](Self::add_object_to_update_queue) (or lets
/// [`refresh_stale_objects`](Self::refresh_stale_objects) find it) and every
/// query starts by re-placing the queued objects.
pub struct VisibilityCuller {
    tree: KdTree<VisObjectId>,
    wrappers: Wrappers,
    update_queue: FxHashSet<VisObjectId>,
    history: OcclusionHistory,
    stats: CullerStats,
}

impl Default for VisibilityCuller {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityCuller {
    pub fn new() -> Self {
        Self {
            tree: KdTree::new(),
            wrappers: Wrappers::default(),
            update_queue: FxHashSet::default(),
            history: OcclusionHistory::default(),
            stats: CullerStats::default(),
        }
    }

    pub fn with_min_split_objects(mut self, min_split_objects: usize) -> Self {
        self.tree = mem::take(&mut self.tree).with_min_split_objects(min_split_objects);
        self
    }

    pub fn kdtree(&self) -> &KdTree<VisObjectId> {
        &self.tree
    }

    pub fn stats(&self) -> &CullerStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.clear();
    }

    pub fn object_count(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_registered(&self, id: VisObjectId) -> bool {
        self.wrappers.get(id).is_some()
    }

    /// The world box the object was last placed with.
    pub fn world_bbox(&self, id: VisObjectId) -> Option<&Aabb> {
        self.wrappers.get(id).map(|wrapper| &wrapper.bbox)
    }

    pub fn register(&mut self, object: &Rc<dyn VisibilityObject>) -> VisObjectId {
        let weak = Rc::downgrade(object);
        debug_assert!(
            !self.wrappers.iter().any(|w| w.object.ptr_eq(&weak)),
            "object registered with the culler twice"
        );
        let id = self.wrappers.next_id();
        let bbox = world_bbox(object.as_ref());
        if bbox.is_nan() {
            warn!("the bounding box of {} is invalid", id);
        }
        let handle = self.tree.add_object(bbox, id);
        self.wrappers.insert(ObjectWrapper {
            id,
            object: weak,
            mesh: object.mesh(),
            bbox,
            update_number: object.movable().update_number,
            shape_number: object.shape_number(),
            handle,
        });
        trace!("registered {} at {:?}", id, bbox);
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unregister(&mut self, id: VisObjectId) -> bool {
        match self.wrappers.remove(id) {
            Some(wrapper) => {
                self.update_queue.remove(&id);
                self.tree.remove_object(wrapper.handle);
                trace!("unregistered {}", id);
                true
            }
            None => false,
        }
    }

    pub fn add_object_to_update_queue(&mut self, id: VisObjectId) {
        if self.is_registered(id) {
            self.update_queue.insert(id);
        }
    }

    /// Queue every object whose transform or shape changed since it was
    /// last placed. Returns how many were found.
    pub fn refresh_stale_objects(&mut self) -> usize {
        let stale = self
            .wrappers
            .iter()
            .filter(|wrapper| {
                wrapper
                    .upgrade()
                    .map_or(false, |object| wrapper.is_stale(object.as_ref()))
            })
            .map(|wrapper| wrapper.id)
            .collect::<Vec<_>>();
        self.update_queue.extend(stale.iter().copied());
        stale.len()
    }

    /// Re-place every queued object in the tree. Objects queued while this
    /// runs wait for the next call. Returns the number of objects whose box
    /// actually changed.
    pub fn update_objects(&mut self) -> usize {
        if self.update_queue.is_empty() {
            return 0;
        }
        let queue = mem::take(&mut self.update_queue);
        let mut moved = 0;
        for id in queue {
            if self.update_object(id) {
                moved += 1;
            }
        }
        debug!("moved {} objects", moved);
        moved
    }

    fn update_object(&mut self, id: VisObjectId) -> bool {
        let wrapper = match self.wrappers.get_mut(id) {
            Some(wrapper) => wrapper,
            None => return false,
        };
        let object = match wrapper.upgrade() {
            Some(object) => object,
            None => return false,
        };
        let bbox = world_bbox(object.as_ref());
        wrapper.bbox = bbox;
        wrapper.mesh = object.mesh();
        wrapper.update_number = object.movable().update_number;
        wrapper.shape_number = object.shape_number();
        self.stats.updates += 1;
        let moved = self.tree.move_object(wrapper.handle, bbox);
        if moved {
            self.stats.moves += 1;
        }
        moved
    }

    pub fn test_node_visibility(&self, node: NodeIndex, view: &RenderView, mask: u32) -> NodeTest {
        view.test_node(self.tree.node_bbox(node), mask)
    }

    /// Walk the tree front to back from the view's origin and report every
    /// object whose box is in the view frustum. Returns false, after
    /// updating queued objects, if there is no listener.
    pub fn vis_test(
        &mut self,
        view: &RenderView,
        listener: Option<&mut dyn VisibilityCullerListener>,
    ) -> bool {
        self.update_objects();
        self.stats.vis_tests += 1;
        let listener = match listener {
            Some(listener) => listener,
            None => return false,
        };

        let Self {
            tree,
            wrappers,
            stats,
            ..
        } = self;
        tree.front_to_back(view.origin(), view.mask(), |tree, node, timestamp, mask| {
            stats.nodes_tested += 1;
            match view.test_node(tree.node_bbox(node), *mask) {
                NodeTest::Invisible => return false,
                NodeTest::Visible(narrowed) => *mask = narrowed,
                NodeTest::Inside => {}
            }
            tree.distribute(node);
            for handle in tree.take_unvisited(node, timestamp) {
                if let Some(wrapper) = tree.object(handle).and_then(|id| wrappers.get(*id)) {
                    wrapper.report_if_visible(view, *mask, &mut *listener, &mut *stats);
                }
            }
            true
        });
        true
    }

    /// As [`vis_test`](Self::vis_test), additionally culling against
    /// occlusion query results from `queries`. Nodes that were visible in
    /// the previous call are walked without waiting for their queries.
    pub fn vis_test_occlusion(
        &mut self,
        view: &RenderView,
        listener: Option<&mut dyn VisibilityCullerListener>,
        queries: &mut dyn OcclusionQueries,
    ) -> bool {
        self.update_objects();
        self.stats.vis_tests += 1;
        let listener = match listener {
            Some(listener) => listener,
            None => return false,
        };
        OcclusionPass {
            tree: &mut self.tree,
            wrappers: &self.wrappers,
            history: &mut self.history,
            stats: &mut self.stats,
            view,
            listener,
            queries,
        }
        .run();
        true
    }

    /// Objects whose boxes are inside the convex volume bounded by the
    /// inward facing `planes`. At most 32 planes are used.
    pub fn vis_test_planes(&mut self, planes: &[Plane]) -> Vec<Rc<dyn VisibilityObject>> {
        let mut found = Vec::new();
        self.planes_query(planes, |object, _, _| found.push(object.clone()));
        found
    }

    pub fn vis_test_planes_with(
        &mut self,
        planes: &[Plane],
        listener: &mut dyn VisibilityCullerListener,
    ) {
        self.planes_query(planes, |object, mesh, mask| {
            listener.object_visible(object, mesh, mask)
        });
    }

    fn planes_query<S>(&mut self, planes: &[Plane], sink: S)
    where
        S: FnMut(&Rc<dyn VisibilityObject>, Option<MeshHandle>, u32),
    {
        let frustum = Frustum::from_planes(planes.iter().copied());
        self.query(None, frustum.all_mask(), |bbox, mask| frustum.test_aabb(bbox, mask), sink);
    }

    /// Objects whose boxes overlap `bbox`.
    pub fn vis_test_box(&mut self, bbox: &Aabb) -> Vec<Rc<dyn VisibilityObject>> {
        let mut found = Vec::new();
        self.query(
            Some(&bbox.center()),
            0,
            |node, _| node.intersects(bbox).then_some(0),
            |object, _, _| found.push(object.clone()),
        );
        found
    }

    /// Objects whose boxes touch `sphere`.
    pub fn vis_test_sphere(&mut self, sphere: &Sphere) -> Vec<Rc<dyn VisibilityObject>> {
        let mut found = Vec::new();
        self.query(
            Some(sphere.center()),
            0,
            |node, _| box_sphere(node, sphere).then_some(0),
            |object, _, _| found.push(object.clone()),
        );
        found
    }

    /// Sphere queries have no planes; objects are reported with every mask
    /// bit set.
    pub fn vis_test_sphere_with(
        &mut self,
        sphere: &Sphere,
        listener: &mut dyn VisibilityCullerListener,
    ) {
        self.query(
            Some(sphere.center()),
            0,
            |node, _| box_sphere(node, sphere).then_some(0),
            |object, mesh, _| listener.object_visible(object, mesh, u32::MAX),
        );
    }

    // Shared walk for the collecting queries. `test` classifies both node
    // and object boxes, returning the narrowed mask or None to reject.
    fn query<T, S>(&mut self, origin: Option<&Point3<f32>>, mask: u32, test: T, mut sink: S)
    where
        T: Fn(&Aabb, u32) -> Option<u32>,
        S: FnMut(&Rc<dyn VisibilityObject>, Option<MeshHandle>, u32),
    {
        self.update_objects();
        self.stats.vis_tests += 1;
        let Self {
            tree,
            wrappers,
            stats,
            ..
        } = self;
        let visit = |tree: &mut KdTree<VisObjectId>,
                     node: NodeIndex,
                     timestamp: u32,
                     mask: &mut u32| {
            stats.nodes_tested += 1;
            match test(tree.node_bbox(node), *mask) {
                Some(narrowed) => *mask = narrowed,
                None => return false,
            }
            tree.distribute(node);
            for handle in tree.take_unvisited(node, timestamp) {
                let wrapper = match tree.object(handle).and_then(|id| wrappers.get(*id)) {
                    Some(wrapper) if !wrapper.bbox.is_empty() => wrapper,
                    _ => continue,
                };
                stats.objects_tested += 1;
                if let Some(found) = test(&wrapper.bbox, *mask) {
                    if let Some(object) = wrapper.upgrade() {
                        stats.objects_visible += 1;
                        sink(&object, wrapper.mesh, found);
                    }
                }
            }
            true
        };
        match origin {
            Some(origin) => tree.front_to_back(origin, mask, visit),
            None => tree.traverse_random(mask, visit),
        }
    }

    /// The nearest object with a mesh whose geometry the segment `start` to
    /// `end` hits. `accurate` selects the exact mesh test over the outline
    /// test. Among equally near hits the first one found wins.
    pub fn intersect_segment(
        &mut self,
        start: &Point3<f32>,
        end: &Point3<f32>,
        accurate: bool,
    ) -> Option<SegmentHit> {
        self.update_objects();
        self.stats.vis_tests += 1;
        let segment = Segment::new(*start, *end);
        let mut best: Option<SegmentHit> = None;
        let mut best_distance_squared = f32::MAX;

        let Self {
            tree,
            wrappers,
            stats,
            ..
        } = self;
        tree.front_to_back(start, 0, |tree, node, timestamp, _| {
            stats.nodes_tested += 1;
            let bbox = tree.node_bbox(node);
            if best.is_some()
                && bbox.squared_distance_to_point(segment.start()) > best_distance_squared
            {
                return false;
            }
            if box_segment(bbox, &segment).is_none() {
                return false;
            }
            tree.distribute(node);
            for handle in tree.take_unvisited(node, timestamp) {
                let wrapper = match tree.object(handle).and_then(|id| wrappers.get(*id)) {
                    Some(wrapper) => wrapper,
                    None => continue,
                };
                stats.objects_tested += 1;
                let (object, hit) = match hit_beam(wrapper, &segment, accurate) {
                    Some(found) => found,
                    None => continue,
                };
                if best.as_ref().map_or(true, |b| hit.distance < b.distance) {
                    best_distance_squared = (hit.point - segment.start()).norm_squared();
                    best = Some(SegmentHit {
                        object,
                        mesh: wrapper.mesh,
                        point: hit.point,
                        distance: hit.distance,
                        polygon: hit.polygon,
                    });
                }
            }
            true
        });
        best
    }

    /// Every object with a mesh whose geometry the segment hits, in no
    /// particular order.
    pub fn intersect_segment_all(
        &mut self,
        start: &Point3<f32>,
        end: &Point3<f32>,
        accurate: bool,
    ) -> Vec<Rc<dyn VisibilityObject>> {
        let segment = Segment::new(*start, *end);
        let mut found = Vec::new();
        self.segment_query(&segment, |wrapper, object| {
            if hit_beam(wrapper, &segment, accurate).is_some() {
                found.push(object.clone());
            }
        });
        found
    }

    /// Every object with a mesh whose box the segment crosses, without
    /// asking the objects for an exact hit.
    pub fn intersect_segment_sloppy(
        &mut self,
        start: &Point3<f32>,
        end: &Point3<f32>,
    ) -> Vec<Rc<dyn VisibilityObject>> {
        let segment = Segment::new(*start, *end);
        let mut found = Vec::new();
        self.segment_query(&segment, |_, object| found.push(object.clone()));
        found
    }

    // Visit the beam candidates along `segment`: objects with a mesh, not
    // flagged NO_HIT_BEAM, whose boxes the segment crosses.
    fn segment_query<S>(&mut self, segment: &Segment, mut sink: S)
    where
        S: FnMut(&ObjectWrapper, &Rc<dyn VisibilityObject>),
    {
        self.update_objects();
        self.stats.vis_tests += 1;
        let Self {
            tree,
            wrappers,
            stats,
            ..
        } = self;
        tree.front_to_back(segment.start(), 0, |tree, node, timestamp, _| {
            stats.nodes_tested += 1;
            if box_segment(tree.node_bbox(node), segment).is_none() {
                return false;
            }
            tree.distribute(node);
            for handle in tree.take_unvisited(node, timestamp) {
                let wrapper = match tree.object(handle).and_then(|id| wrappers.get(*id)) {
                    Some(wrapper) => wrapper,
                    None => continue,
                };
                stats.objects_tested += 1;
                if let Some(object) = beam_candidate(wrapper, segment) {
                    stats.objects_visible += 1;
                    sink(wrapper, &object);
                }
            }
            true
        });
    }
}

fn beam_candidate(wrapper: &ObjectWrapper, segment: &Segment) -> Option<Rc<dyn VisibilityObject>> {
    box_segment(&wrapper.bbox, segment)?;
    wrapper.mesh?;
    let object = wrapper.upgrade()?;
    if object.flags().contains(VisFlags::NO_HIT_BEAM) {
        return None;
    }
    Some(object)
}

// Ask the object for a hit in its own space and bring the hit point back
// into world space.
fn hit_beam(
    wrapper: &ObjectWrapper,
    segment: &Segment,
    accurate: bool,
) -> Option<(Rc<dyn VisibilityObject>, BeamHit)> {
    let object = beam_candidate(wrapper, segment)?;
    let movable = object.movable();
    let identity = movable.is_identity();
    let (start, end) = if identity {
        (*segment.start(), *segment.end())
    } else {
        (
            movable.transform.inverse_transform_point(segment.start()),
            movable.transform.inverse_transform_point(segment.end()),
        )
    };
    let mut hit = if accurate {
        object.hit_beam_object(&start, &end)
    } else {
        object.hit_beam_outline(&start, &end)
    }?;
    if !identity {
        hit.point = movable.transform * hit.point;
    }
    Some((object, hit))
}
