//! Field store
//!
//! A field is a W×H(×D) grid of four `f32` channels living on the compute backend.
//! Fields are addressed through generation-tagged [`FieldHandle`]s issued by a
//! [`FieldRegistry`]; tearing the registry down invalidates every handle at once.
//!
//! Fields never double-buffer themselves. A pass that has to update a field it also
//! reads writes a scratch field instead, and the owner copies scratch back with
//! [`DoubleBuffered::rotate`].

mod data;
mod double_buffer;
mod registry;

pub use data::{padded_bytes_per_row, FieldData, Texel, BYTES_PER_TEXEL, ROW_ALIGNMENT};
pub use double_buffer::{DoubleBuffered, GradientHistory};
pub use registry::FieldRegistry;

use std::fmt;

/// Storage shape of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// W×H grid
    Grid,
    /// W×H×D stack of grids
    Volume,
    /// N×1 row of samples
    Line,
}

/// Allocation request for a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDesc {
    /// Debug label
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub kind: FieldKind,
}

impl FieldDesc {
    /// A W×H grid field
    pub fn grid(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            depth: 1,
            kind: FieldKind::Grid,
        }
    }

    /// A W×H×D volume field
    pub fn volume(name: impl Into<String>, width: u32, height: u32, depth: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            depth,
            kind: FieldKind::Volume,
        }
    }

    /// An N×1 line field (waves, gauges)
    pub fn line(name: impl Into<String>, len: u32) -> Self {
        Self {
            name: name.into(),
            width: len.max(1),
            height: 1,
            depth: 1,
            kind: FieldKind::Line,
        }
    }

    /// A 1×1(×1) stand-in for a field whose physics is disabled
    pub fn placeholder(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            width: 1,
            height: 1,
            depth: 1,
            kind,
        }
    }

    /// Same shape under a different name
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// (width, height, depth)
    #[must_use]
    pub fn dims(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.depth)
    }

    /// Whether this is a 1×1×1 placeholder
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.dims() == (1, 1, 1) && self.kind != FieldKind::Line
    }

    /// Total texel count
    #[must_use]
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize
    }
}

/// Opaque reference to a field owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for FieldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field#{}@{}", self.index, self.generation)
    }
}
