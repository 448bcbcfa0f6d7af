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
use std::fmt;

/// Running counters for one terrain mesh, accumulated across frames.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MeshStats {
    /// Triangles emitted into the triangle cache.
    pub triangles: u64,
    /// Priorities computed.
    pub priorities: u64,
    /// Queue insertions.
    pub insertions: u64,
    /// Queue removals.
    pub removals: u64,
    /// Queue re-prioritisations.
    pub moves: u64,
    /// Triangle boxes tested against the view frustum.
    pub visibility_tests: u64,
    /// Frames on which the queues were rebuilt from the root triangles.
    pub resets: u64,
    pub splits: u64,
    pub merges: u64,
}

impl MeshStats {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for MeshStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tris: {}, pri: {}, ins: {}, rem: {}, mov: {}, vis: {}, reset: {}, split: {}, merge: {}",
            self.triangles,
            self.priorities,
            self.insertions,
            self.removals,
            self.moves,
            self.visibility_tests,
            self.resets,
            self.splits,
            self.merges
        )
    }
}
