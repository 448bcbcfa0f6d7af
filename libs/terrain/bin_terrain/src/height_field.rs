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
use crate::error::TerrainError;
use anyhow::Result;
use std::rc::Rc;

/// Read-only source of elevation samples on a regular grid.
pub trait HeightFeeder {
    fn rows(&self) -> u32;
    fn cols(&self) -> u32;

    /// The sample at (row, col); both are within `rows()` x `cols()`.
    fn height(&self, row: u32, col: u32) -> f32;
}

impl<T: HeightFeeder + ?Sized> HeightFeeder for Rc<T> {
    fn rows(&self) -> u32 {
        (**self).rows()
    }

    fn cols(&self) -> u32 {
        (**self).cols()
    }

    fn height(&self, row: u32, col: u32) -> f32 {
        (**self).height(row, col)
    }
}

impl<T: HeightFeeder + ?Sized> HeightFeeder for &T {
    fn rows(&self) -> u32 {
        (**self).rows()
    }

    fn cols(&self) -> u32 {
        (**self).cols()
    }

    fn height(&self, row: u32, col: u32) -> f32 {
        (**self).height(row, col)
    }
}

/// A row-major grid of height samples.
#[derive(Clone, Debug)]
pub struct HeightField {
    rows: u32,
    cols: u32,
    samples: Vec<f32>,
}

impl HeightField {
    pub fn new(rows: u32, cols: u32, samples: Vec<f32>) -> Result<Self> {
        let expected = rows as usize * cols as usize;
        if samples.len() != expected {
            return Err(TerrainError::SampleCount {
                found: samples.len(),
                expected,
            }
            .into());
        }
        Ok(Self {
            rows,
            cols,
            samples,
        })
    }

    pub fn from_fn<F: FnMut(u32, u32) -> f32>(rows: u32, cols: u32, mut f: F) -> Self {
        let mut samples = Vec::with_capacity(rows as usize * cols as usize);
        for r in 0..rows {
            for c in 0..cols {
                samples.push(f(r, c));
            }
        }
        Self {
            rows,
            cols,
            samples,
        }
    }

    pub fn flat(rows: u32, cols: u32, height: f32) -> Self {
        Self::from_fn(rows, cols, |_, _| height)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| {
                (lo.min(h), hi.max(h))
            })
    }
}

impl HeightFeeder for HeightField {
    fn rows(&self) -> u32 {
        self.rows
    }

    fn cols(&self) -> u32 {
        self.cols
    }

    fn height(&self, row: u32, col: u32) -> f32 {
        debug_assert!(row < self.rows && col < self.cols);
        self.samples[row as usize * self.cols as usize + col as usize]
    }
}
