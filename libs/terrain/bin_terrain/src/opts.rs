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
use structopt::StructOpt;

#[derive(Clone, Debug, StructOpt)]
pub struct TerrainOpts {
    /// Samples along one side of a terrain tile; must be a power of two.
    #[structopt(long, default_value = "64")]
    pub tile_size: u32,

    /// Triangle count below which the mesh keeps splitting.
    #[structopt(long, default_value = "3000")]
    pub min_detail: u32,

    /// Triangle count above which the mesh merges unconditionally.
    #[structopt(long, default_value = "3200")]
    pub max_detail: u32,

    /// Hard per-frame triangle limit; sizes the output caches.
    #[structopt(long, default_value = "5000")]
    pub abs_max_detail: u32,

    /// Rebuild the mesh from the root triangles every frame instead of
    /// incrementally merging and splitting.
    #[structopt(long = "no-merge", parse(from_flag = std::ops::Not::not))]
    pub merge: bool,

    /// Largest allowed gap between the split and merge queue priorities
    /// (default: min-detail / 30).
    #[structopt(long)]
    pub priority_tolerance: Option<u32>,
}

impl Default for TerrainOpts {
    fn default() -> Self {
        Self {
            tile_size: 64,
            min_detail: 3000,
            max_detail: 3200,
            abs_max_detail: 5000,
            merge: true,
            priority_tolerance: None,
        }
    }
}

impl TerrainOpts {
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_detail(mut self, min_detail: u32, max_detail: u32, abs_max_detail: u32) -> Self {
        self.min_detail = min_detail;
        self.max_detail = max_detail;
        self.abs_max_detail = abs_max_detail;
        self
    }

    pub fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }

    pub fn priority_tolerance(&self) -> u32 {
        self.priority_tolerance.unwrap_or(self.min_detail / 30)
    }
}
