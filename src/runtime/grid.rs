//! Launch geometry: three-dimensional extents for grids and blocks

use crate::{launch_error, Result};

/// Three-dimensional extent or index (CUDA `dim3`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    /// Build a `Dim3` from its components
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Total number of elements covered by this extent
    pub fn size(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl Default for Dim3 {
    fn default() -> Self {
        Self { x: 1, y: 1, z: 1 }
    }
}

impl From<u32> for Dim3 {
    fn from(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }
}

impl From<(u32, u32)> for Dim3 {
    fn from((x, y): (u32, u32)) -> Self {
        Self { x, y, z: 1 }
    }
}

impl From<(u32, u32, u32)> for Dim3 {
    fn from((x, y, z): (u32, u32, u32)) -> Self {
        Self { x, y, z }
    }
}

/// Grid of blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub dim: Dim3,
}

impl Grid {
    pub fn new(dim: impl Into<Dim3>) -> Self {
        Self { dim: dim.into() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dim.size() == 0 {
            return Err(launch_error!(
                "Grid dimensions ({}, {}, {}) must all be non-zero",
                self.dim.x,
                self.dim.y,
                self.dim.z
            ));
        }
        Ok(())
    }
}

/// Block of threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub dim: Dim3,
}

impl Block {
    /// Default per-block thread limit, matching current hardware
    pub const MAX_THREADS: u32 = 1024;

    pub fn new(dim: impl Into<Dim3>) -> Self {
        Self { dim: dim.into() }
    }

    /// Number of threads in the block
    pub fn num_threads(&self) -> u64 {
        self.dim.size()
    }

    /// Validate against the default thread limit
    pub fn validate(&self) -> Result<()> {
        self.validate_against(Self::MAX_THREADS)
    }

    /// Validate against a device-specific thread limit
    pub fn validate_against(&self, max_threads: u32) -> Result<()> {
        let threads = self.num_threads();
        if threads == 0 {
            return Err(launch_error!(
                "Block dimensions ({}, {}, {}) must all be non-zero",
                self.dim.x,
                self.dim.y,
                self.dim.z
            ));
        }
        if threads > max_threads as u64 {
            return Err(launch_error!(
                "Block of {} threads exceeds maximum of {} threads per block",
                threads,
                max_threads
            ));
        }
        Ok(())
    }
}
