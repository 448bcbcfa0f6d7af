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
    object::VisibilityCullerListener,
    stats::CullerStats,
    view::{NodeTest, RenderView},
    wrapper::{VisObjectId, Wrappers},
};
use fxhash::FxHashMap;
use geometry::Aabb;
use kdtree::{KdTree, NodeIndex};
use log::trace;
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct QueryId(pub u32);

/// Asynchronous occlusion queries, usually backed by the GPU.
pub trait OcclusionQueries {
    /// Start asking whether any part of `bbox` survives the depth test.
    fn issue(&mut self, bbox: &Aabb) -> QueryId;

    /// The answer to `query` if it is ready. With `wait` set the culler has
    /// nothing else to do, so the implementation may block; an answer that
    /// is still missing then counts as visible.
    fn poll(&mut self, query: QueryId, wait: bool) -> Option<bool>;

    /// Called exactly once for every issued query, after its last poll.
    fn release(&mut self, query: QueryId);
}

#[derive(Clone, Copy, Debug)]
struct TraversalEntry {
    node: NodeIndex,
    mask: u32,
    completely_visible: bool,
}

#[derive(Debug)]
struct PendingQuery {
    entry: TraversalEntry,
    query: QueryId,
    // The node's subtree was already walked when the query was issued.
    traversed: bool,
}

/// Frame numbers at which kd-tree nodes were last seen visible.
#[derive(Debug, Default)]
pub(crate) struct OcclusionHistory {
    visible_at: FxHashMap<NodeIndex, u32>,
    frame: u32,
}

impl OcclusionHistory {
    fn begin_frame(&mut self) -> u32 {
        self.frame = self.frame.wrapping_add(1);
        let frame = self.frame;
        self.visible_at
            .retain(|_, seen| seen.wrapping_add(1) == frame);
        frame
    }

    fn was_visible(&self, node: NodeIndex) -> bool {
        match self.visible_at.get(&node) {
            Some(&seen) => seen == self.frame || seen.wrapping_add(1) == self.frame,
            None => false,
        }
    }

    // Mark `node` and all of its ancestors visible this frame.
    fn pull_up(&mut self, tree: &KdTree<VisObjectId>, node: NodeIndex) {
        let mut cursor = Some(node);
        while let Some(n) = cursor {
            if self.visible_at.insert(n, self.frame) == Some(self.frame) {
                break;
            }
            cursor = tree.parent(n);
        }
    }
}

/// One front to back occlusion culled walk of the kd-tree.
///
/// Nodes come off a breadth first traversal queue. A node that was visible
/// last frame has its children walked straight away; a node that was not,
/// or any leaf, gets an occlusion query. Unvisited nodes wait for their
/// query before being walked. Finished queries are drained before each
/// node is taken, so results feed back into the walk as early as possible.
pub(crate) struct OcclusionPass<'a> {
    pub(crate) tree: &'a mut KdTree<VisObjectId>,
    pub(crate) wrappers: &'a Wrappers,
    pub(crate) history: &'a mut OcclusionHistory,
    pub(crate) stats: &'a mut CullerStats,
    pub(crate) view: &'a RenderView,
    pub(crate) listener: &'a mut dyn VisibilityCullerListener,
    pub(crate) queries: &'a mut dyn OcclusionQueries,
}

struct PassState {
    timestamp: u32,
    traversal: VecDeque<TraversalEntry>,
    pending: VecDeque<PendingQuery>,
}

impl<'a> OcclusionPass<'a> {
    pub(crate) fn run(mut self) {
        let frame = self.history.begin_frame();
        let mut state = PassState {
            timestamp: self.tree.new_traversal(),
            traversal: VecDeque::new(),
            pending: VecDeque::new(),
        };
        state.traversal.push_back(TraversalEntry {
            node: self.tree.root(),
            mask: self.view.mask(),
            completely_visible: false,
        });
        trace!("occlusion pass for frame {}", frame);

        while !state.traversal.is_empty() || !state.pending.is_empty() {
            self.resolve_finished(&mut state);
            if let Some(entry) = state.traversal.pop_front() {
                self.visit(entry, &mut state);
            }
        }
    }

    fn resolve_finished(&mut self, state: &mut PassState) {
        while let Some(front) = state.pending.front() {
            let wait = state.traversal.is_empty();
            let visible = match self.queries.poll(front.query, wait) {
                Some(visible) => visible,
                None if wait => true,
                None => break,
            };
            let pending = match state.pending.pop_front() {
                Some(pending) => pending,
                None => break,
            };
            self.queries.release(pending.query);
            self.stats.queries_resolved += 1;
            if visible {
                self.history.pull_up(self.tree, pending.entry.node);
                if !pending.traversed {
                    self.traverse(pending.entry, state);
                }
            }
        }
    }

    fn visit(&mut self, mut entry: TraversalEntry, state: &mut PassState) {
        if !entry.completely_visible {
            self.stats.nodes_tested += 1;
            match self.view.test_node(self.tree.node_bbox(entry.node), entry.mask) {
                NodeTest::Invisible => return,
                NodeTest::Visible(mask) => {
                    entry.mask = mask;
                    entry.completely_visible = mask == 0;
                }
                NodeTest::Inside => {}
            }
        }

        self.tree.distribute(entry.node);
        let was_visible = self.history.was_visible(entry.node);
        if !was_visible || self.tree.is_leaf(entry.node) {
            let query = self.queries.issue(self.tree.node_bbox(entry.node));
            self.stats.queries_issued += 1;
            state.pending.push_back(PendingQuery {
                entry,
                query,
                traversed: was_visible,
            });
        }
        if was_visible {
            self.traverse(entry, state);
        }
    }

    // Report a leaf's objects, or queue an internal node's children.
    fn traverse(&mut self, entry: TraversalEntry, state: &mut PassState) {
        match self.tree.children_front_to_back(entry.node, self.view.origin()) {
            Some(children) => {
                for node in children {
                    state.traversal.push_back(TraversalEntry { node, ..entry });
                }
            }
            None => {
                for handle in self.tree.take_unvisited(entry.node, state.timestamp) {
                    let wrapper = self
                        .tree
                        .object(handle)
                        .and_then(|id| self.wrappers.get(*id));
                    if let Some(wrapper) = wrapper {
                        wrapper.report_if_visible(
                            self.view,
                            entry.mask,
                            self.listener,
                            self.stats,
                        );
                    }
                }
            }
        }
    }
}
