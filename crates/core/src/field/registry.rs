use super::{FieldDesc, FieldHandle};
use crate::error::{CelerisError, CelerisResult};

struct Slot<R> {
    desc: FieldDesc,
    resource: R,
}

/// Owner of every field of one backend
///
/// Fields are only ever released together through [`FieldRegistry::clear`], which
/// also bumps the generation so handles from the previous configuration are
/// rejected instead of aliasing new fields.
pub struct FieldRegistry<R> {
    slots: Vec<Slot<R>>,
    generation: u32,
}

impl<R> Default for FieldRegistry<R> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            generation: 0,
        }
    }
}

impl<R> FieldRegistry<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly allocated resource
    pub fn insert(&mut self, desc: FieldDesc, resource: R) -> FieldHandle {
        let index = self.slots.len() as u32;
        self.slots.push(Slot { desc, resource });
        FieldHandle {
            index,
            generation: self.generation,
        }
    }

    fn slot_index(&self, handle: FieldHandle) -> CelerisResult<usize> {
        let index = handle.index as usize;
        if handle.generation != self.generation || index >= self.slots.len() {
            return Err(CelerisError::StaleHandle {
                index: handle.index,
                generation: handle.generation,
            });
        }
        Ok(index)
    }

    /// Descriptor of a live field
    ///
    /// # Errors
    /// Returns [`CelerisError::StaleHandle`] for handles of a torn-down registry
    pub fn desc(&self, handle: FieldHandle) -> CelerisResult<&FieldDesc> {
        let index = self.slot_index(handle)?;
        Ok(&self.slots[index].desc)
    }

    /// Backend resource of a live field
    ///
    /// # Errors
    /// Returns [`CelerisError::StaleHandle`] for handles of a torn-down registry
    pub fn get(&self, handle: FieldHandle) -> CelerisResult<&R> {
        let index = self.slot_index(handle)?;
        Ok(&self.slots[index].resource)
    }

    /// Mutable backend resource of a live field
    ///
    /// # Errors
    /// Returns [`CelerisError::StaleHandle`] for handles of a torn-down registry
    pub fn get_mut(&mut self, handle: FieldHandle) -> CelerisResult<&mut R> {
        let index = self.slot_index(handle)?;
        Ok(&mut self.slots[index].resource)
    }

    /// Number of live fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Release every field and invalidate all outstanding handles
    ///
    /// Returns the resources so backends can free them explicitly.
    pub fn clear(&mut self) -> Vec<R> {
        self.generation = self.generation.wrapping_add(1);
        self.slots.drain(..).map(|slot| slot.resource).collect()
    }
}
