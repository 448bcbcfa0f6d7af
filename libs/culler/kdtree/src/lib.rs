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
//! A kd-tree of axis aligned boxes for visibility culling.
//!
//! Payloads are small `Copy` keys, typically an index into some table owned
//! by the caller. The tree hands out an [`ObjectHandle`] for each insertion
//! that is used to move or remove the object later. Traversals stamp each
//! object they report with the traversal's timestamp so that an object
//! referenced from several leaves is only reported once.
mod node;
mod tree;

pub use crate::{
    node::{NodeIndex, ObjectHandle},
    tree::{KdTree, KdTreeStats, ROOT},
};
