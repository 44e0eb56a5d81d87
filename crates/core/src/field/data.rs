//! Host-side field data
//!
//! [`FieldData`] is the CPU representation of a field: four channels per texel,
//! stored as `[f32; 4]` in row-major order with layers stacked after each other.
//! It is the storage of the CPU backend and the staging format for uploads and
//! readbacks on the GPU backend.

use crate::error::{CelerisError, CelerisResult};

/// One cell, four channels
pub type Texel = [f32; 4];

/// Bytes in one RGBA32F texel
pub const BYTES_PER_TEXEL: u32 = 16;

/// Row pitch alignment required for buffer/texture copies
pub const ROW_ALIGNMENT: u32 = 256;

/// Row pitch of a `width`-texel row, padded to [`ROW_ALIGNMENT`]
#[must_use]
pub fn padded_bytes_per_row(width: u32) -> u32 {
    (width * BYTES_PER_TEXEL).div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT
}

/// Field data container for the CPU backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldData {
    /// Texels in row-major order (`(z * height + y) * width + x`)
    pub data: Vec<Texel>,
    /// Grid width in cells
    pub width: usize,
    /// Grid height in cells
    pub height: usize,
    /// Number of stacked layers
    pub depth: usize,
}

impl FieldData {
    /// Create a new 2D field with given dimensions, initialized to zero
    ///
    /// # Arguments
    ///
    /// * `width` - Grid width in cells
    /// * `height` - Grid height in cells
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_value(width, height, [0.0; 4])
    }

    /// Create a new layered field initialized to zero
    #[must_use]
    pub fn new_3d(width: usize, height: usize, depth: usize) -> Self {
        Self {
            data: vec![[0.0; 4]; width * height * depth],
            width,
            height,
            depth,
        }
    }

    /// Create a new 2D field with every texel set to `value`
    ///
    /// # Arguments
    ///
    /// * `width` - Grid width in cells
    /// * `height` - Grid height in cells
    /// * `value` - Initial value for all cells
    #[must_use]
    pub fn with_value(width: usize, height: usize, value: Texel) -> Self {
        Self {
            data: vec![value; width * height],
            width,
            height,
            depth: 1,
        }
    }

    /// Build a 2D field from one value per cell placed in `channel`
    ///
    /// # Panics
    ///
    /// Panics if `values.len() != width * height` or `channel > 3`
    #[must_use]
    pub fn from_channel(width: usize, height: usize, channel: usize, values: &[f32]) -> Self {
        let mut field = Self::new(width, height);
        field.set_channel(channel, values);
        field
    }

    /// (width, height, depth) as `u32`
    #[must_use]
    pub fn dims(&self) -> (u32, u32, u32) {
        (self.width as u32, self.height as u32, self.depth as u32)
    }

    /// Linear index of a texel
    #[inline]
    #[must_use]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Get texel at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Texel {
        assert!(
            x < self.width && y < self.height,
            "Coordinates out of bounds"
        );
        self.data[self.index(x, y)]
    }

    /// Set texel at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    pub fn set(&mut self, x: usize, y: usize, value: Texel) {
        assert!(
            x < self.width && y < self.height,
            "Coordinates out of bounds"
        );
        let index = self.index(x, y);
        self.data[index] = value;
    }

    /// Get texel in layer `z`
    #[must_use]
    pub fn get_3d(&self, x: usize, y: usize, z: usize) -> Texel {
        assert!(
            x < self.width && y < self.height && z < self.depth,
            "Coordinates out of bounds"
        );
        self.data[(z * self.height + y) * self.width + x]
    }

    /// Set texel in layer `z`
    pub fn set_3d(&mut self, x: usize, y: usize, z: usize, value: Texel) {
        assert!(
            x < self.width && y < self.height && z < self.depth,
            "Coordinates out of bounds"
        );
        let index = (z * self.height + y) * self.width + x;
        self.data[index] = value;
    }

    /// Texel at signed coordinates clamped into the grid (layer 0)
    #[inline]
    #[must_use]
    pub fn at(&self, x: isize, y: isize) -> Texel {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.width + cx]
    }

    /// Fill entire field with a value
    pub fn fill(&mut self, value: Texel) {
        self.data.fill(value);
    }

    /// Copy one channel out as a flat row-major array
    #[must_use]
    pub fn channel(&self, channel: usize) -> Vec<f32> {
        self.data.iter().map(|t| t[channel]).collect()
    }

    /// Overwrite one channel from a flat row-major array
    ///
    /// # Panics
    ///
    /// Panics if `values` does not have one entry per texel
    pub fn set_channel(&mut self, channel: usize, values: &[f32]) {
        assert_eq!(values.len(), self.data.len(), "Channel length mismatch");
        for (texel, &v) in self.data.iter_mut().zip(values) {
            texel[channel] = v;
        }
    }

    /// Serialize with each row padded to [`ROW_ALIGNMENT`] bytes
    #[must_use]
    pub fn to_padded_bytes(&self) -> Vec<u8> {
        let row_bytes = self.width * BYTES_PER_TEXEL as usize;
        let pitch = padded_bytes_per_row(self.width as u32) as usize;
        let rows = self.height * self.depth;
        let mut bytes = vec![0_u8; pitch * rows];
        for (row, chunk) in self.data.chunks_exact(self.width).enumerate() {
            bytes[row * pitch..row * pitch + row_bytes]
                .copy_from_slice(bytemuck::cast_slice(chunk));
        }
        bytes
    }

    /// Rebuild a field from padded rows as produced by a texture-to-buffer copy
    ///
    /// # Errors
    ///
    /// Returns [`CelerisError::Readback`] if `bytes` is shorter than the padded layout
    pub fn from_padded_bytes(
        width: usize,
        height: usize,
        depth: usize,
        bytes: &[u8],
    ) -> CelerisResult<Self> {
        let row_bytes = width * BYTES_PER_TEXEL as usize;
        let pitch = padded_bytes_per_row(width as u32) as usize;
        let rows = height * depth;
        if bytes.len() < pitch * rows {
            return Err(CelerisError::Readback {
                field: format!("{width}x{height}x{depth}"),
                reason: format!("expected {} bytes, got {}", pitch * rows, bytes.len()),
            });
        }
        let mut data = Vec::with_capacity(width * rows);
        for row in 0..rows {
            let start = row * pitch;
            data.extend(
                bytes[start..start + row_bytes]
                    .chunks_exact(BYTES_PER_TEXEL as usize)
                    .map(bytemuck::pod_read_unaligned::<Texel>),
            );
        }
        Ok(Self {
            data,
            width,
            height,
            depth,
        })
    }
}
