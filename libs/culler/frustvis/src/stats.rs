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

/// Work counters for the culler, cleared by the caller.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CullerStats {
    pub vis_tests: usize,
    pub nodes_tested: usize,
    pub objects_tested: usize,
    pub objects_visible: usize,
    pub queries_issued: usize,
    pub queries_resolved: usize,
    pub updates: usize,
    pub moves: usize,
}

impl CullerStats {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for CullerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tests:{} nodes:{} objects:{}/{} queries:{}/{} updates:{} moves:{}",
            self.vis_tests,
            self.nodes_tested,
            self.objects_visible,
            self.objects_tested,
            self.queries_resolved,
            self.queries_issued,
            self.updates,
            self.moves
        )
    }
}
