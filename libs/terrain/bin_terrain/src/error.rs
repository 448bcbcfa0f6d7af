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
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("tile size {0} must be a power of two no smaller than 2")]
    BadTileSize(u32),

    #[error("height field of {rows}x{cols} samples is not a whole number of {tile_size} sample tiles plus one")]
    BadHeightField { rows: u32, cols: u32, tile_size: u32 },

    #[error("height field has {found} samples, expected {expected}")]
    SampleCount { found: usize, expected: usize },

    #[error("detail limits out of order: min {min}, max {max}, absolute max {abs_max}")]
    BadDetail { min: u32, max: u32, abs_max: u32 },

    #[error("failed to allocate the {what} cache for {count} entries")]
    CacheAllocation { what: &'static str, count: usize },
}
