use super::{FieldDesc, FieldHandle};
use crate::backend::ComputeBackend;
use crate::error::CelerisResult;

/// A canonical field paired with the scratch field passes write into
///
/// A pass that updates a field it also reads binds `current()` for reading and
/// `scratch()` for writing; `rotate` then copies the result back so every other
/// pass keeps referring to the same canonical handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoubleBuffered {
    current: FieldHandle,
    scratch: FieldHandle,
}

impl DoubleBuffered {
    /// Pair two existing fields of identical shape
    #[must_use]
    pub fn new(current: FieldHandle, scratch: FieldHandle) -> Self {
        Self { current, scratch }
    }

    /// Allocate a canonical field and its scratch twin
    ///
    /// # Errors
    /// Propagates allocation failures from the backend
    pub fn allocate(backend: &mut dyn ComputeBackend, desc: &FieldDesc) -> CelerisResult<Self> {
        let current = backend.create_field(desc.clone())?;
        let scratch = backend.create_field(desc.renamed(format!("{}_scratch", desc.name)))?;
        Ok(Self { current, scratch })
    }

    #[must_use]
    pub fn current(&self) -> FieldHandle {
        self.current
    }

    #[must_use]
    pub fn scratch(&self) -> FieldHandle {
        self.scratch
    }

    /// Copy scratch into current
    ///
    /// # Errors
    /// Propagates copy failures from the backend
    pub fn rotate(&self, backend: &mut dyn ComputeBackend) -> CelerisResult<()> {
        backend.copy_field(self.scratch, self.current)
    }
}

/// Multistep derivative history of one evolving quantity
///
/// The update pass writes the fresh derivative into `predicted.scratch()`; the
/// predictor rotates it into `predicted.current()`. At the end of a full step the
/// history moves back one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradientHistory {
    pub predicted: DoubleBuffered,
    pub old: FieldHandle,
    pub old_old: FieldHandle,
}

impl GradientHistory {
    /// Allocate the four fields of a history named `name`
    ///
    /// # Errors
    /// Propagates allocation failures from the backend
    pub fn allocate(backend: &mut dyn ComputeBackend, desc: &FieldDesc) -> CelerisResult<Self> {
        let predicted = DoubleBuffered::new(
            backend.create_field(desc.renamed(format!("{}_predicted", desc.name)))?,
            backend.create_field(desc.renamed(format!("{}_dudt", desc.name)))?,
        );
        let old = backend.create_field(desc.renamed(format!("{}_old", desc.name)))?;
        let old_old = backend.create_field(desc.renamed(format!("{}_old_old", desc.name)))?;
        Ok(Self {
            predicted,
            old,
            old_old,
        })
    }

    /// old-old ← old, then old ← predicted
    ///
    /// # Errors
    /// Propagates copy failures from the backend
    pub fn shift(&self, backend: &mut dyn ComputeBackend) -> CelerisResult<()> {
        backend.copy_field(self.old, self.old_old)?;
        backend.copy_field(self.predicted.current(), self.old)
    }
}
