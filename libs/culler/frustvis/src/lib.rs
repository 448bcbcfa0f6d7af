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
//! Frustum and occlusion culling of scene objects.
//!
//! [`VisibilityCuller`] keeps the world boxes of registered
//! [`VisibilityObject`]s in a kd-tree and answers visibility questions
//! against it: what is in a view frustum, optionally pruned by occlusion
//! queries, and what lies in a box, a sphere, a plane bounded volume or
//! along a segment.
mod culler;
mod object;
mod occlusion;
mod stats;
mod view;
mod wrapper;

#[cfg(test)]
pub(crate) mod test_util;

pub use crate::{
    culler::{SegmentHit, VisibilityCuller},
    object::{BeamHit, MeshHandle, Movable, VisFlags, VisibilityCullerListener, VisibilityObject},
    occlusion::{OcclusionQueries, QueryId},
    stats::CullerStats,
    view::{NodeTest, RenderView},
    wrapper::VisObjectId,
};
