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
    object::{VisFlags, VisibilityCullerListener, VisibilityObject},
    stats::CullerStats,
    view::RenderView,
    MeshHandle,
};
use geometry::Aabb;
use kdtree::ObjectHandle;
use log::warn;
use std::{
    fmt,
    rc::{Rc, Weak},
};

/// Names an object registered with a [`crate::VisibilityCuller`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct VisObjectId(u32);

impl VisObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(test)]
pub(crate) fn test_id(index: u32) -> VisObjectId {
    VisObjectId(index)
}

impl fmt::Display for VisObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vis#{}", self.0)
    }
}

/// The culler's record of a registered object: what it looked like the last
/// time it was placed in the kd-tree.
pub(crate) struct ObjectWrapper {
    pub(crate) id: VisObjectId,
    pub(crate) object: Weak<dyn VisibilityObject>,
    pub(crate) mesh: Option<MeshHandle>,
    pub(crate) bbox: Aabb,
    pub(crate) update_number: u32,
    pub(crate) shape_number: u32,
    pub(crate) handle: ObjectHandle,
}

impl ObjectWrapper {
    pub(crate) fn upgrade(&self) -> Option<Rc<dyn VisibilityObject>> {
        let object = self.object.upgrade();
        if object.is_none() {
            warn!("{} was dropped without being unregistered", self.id);
        }
        object
    }

    // True if the object has moved or changed shape since it was placed.
    pub(crate) fn is_stale(&self, object: &dyn VisibilityObject) -> bool {
        object.movable().update_number != self.update_number
            || object.shape_number() != self.shape_number
    }

    /// Test against the view and tell the listener if visible.
    pub(crate) fn report_if_visible(
        &self,
        view: &RenderView,
        mask: u32,
        listener: &mut dyn VisibilityCullerListener,
        stats: &mut CullerStats,
    ) -> bool {
        stats.objects_tested += 1;
        let object = match self.upgrade() {
            Some(object) => object,
            None => return false,
        };
        if object.flags().contains(VisFlags::INVISIBLE) {
            return false;
        }
        match view.test_object(&self.bbox, mask) {
            Some(mask) => {
                stats.objects_visible += 1;
                listener.object_visible(&object, self.mesh, mask);
                true
            }
            None => false,
        }
    }
}

/// Slot table of wrappers; ids of removed objects are reused.
#[derive(Default)]
pub(crate) struct Wrappers {
    slots: Vec<Option<ObjectWrapper>>,
    free: Vec<VisObjectId>,
}

impl Wrappers {
    pub(crate) fn next_id(&self) -> VisObjectId {
        self.free
            .last()
            .copied()
            .unwrap_or(VisObjectId(self.slots.len() as u32))
    }

    /// Store `wrapper` under its id, which must come from `next_id`.
    pub(crate) fn insert(&mut self, wrapper: ObjectWrapper) {
        let id = wrapper.id;
        if self.free.last() == Some(&id) {
            self.free.pop();
            self.slots[id.index()] = Some(wrapper);
        } else {
            debug_assert_eq!(id.index(), self.slots.len());
            self.slots.push(Some(wrapper));
        }
    }

    pub(crate) fn remove(&mut self, id: VisObjectId) -> Option<ObjectWrapper> {
        let wrapper = self.slots.get_mut(id.index())?.take()?;
        self.free.push(id);
        Some(wrapper)
    }

    pub(crate) fn get(&self, id: VisObjectId) -> Option<&ObjectWrapper> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: VisObjectId) -> Option<&mut ObjectWrapper> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ObjectWrapper> + '_ {
        self.slots.iter().flatten()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use kdtree::KdTree;

    fn wrapper(id: VisObjectId, handle: ObjectHandle) -> ObjectWrapper {
        let dangling: Weak<dyn VisibilityObject> = Weak::<crate::test_util::Block>::new();
        ObjectWrapper {
            id,
            object: dangling,
            mesh: None,
            bbox: Aabb::empty(),
            update_number: 0,
            shape_number: 0,
            handle,
        }
    }

    #[test]
    fn test_ids_are_reused() {
        let mut tree = KdTree::new();
        let mut wrappers = Wrappers::default();
        let a = wrappers.next_id();
        let handle = tree.add_object(Aabb::empty(), a);
        wrappers.insert(wrapper(a, handle));
        let b = wrappers.next_id();
        wrappers.insert(wrapper(b, handle));
        assert_ne!(a, b);
        assert_eq!(wrappers.len(), 2);
        assert!(wrappers.remove(a).is_some());
        assert!(wrappers.remove(a).is_none());
        assert_eq!(wrappers.next_id(), a);
        wrappers.insert(wrapper(a, handle));
        assert_eq!(wrappers.len(), 2);
        assert_eq!(wrappers.iter().count(), 2);
        assert!(wrappers.get(a).unwrap().upgrade().is_none());
    }
}
