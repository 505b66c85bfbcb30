use crate::error::ErrorKind;
use crate::type_set::TypeSet;
use std::rc::Rc;
use t1_frontend::types::TypeTable;

/// Types of the local variables of one function invocation, by coalesced slot.
#[derive(Clone, Debug)]
pub struct LocalState(Rc<Vec<TypeSet>>);

impl PartialEq for LocalState {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0 == other.0
    }
}

impl Eq for LocalState {}

impl LocalState {
    /// The state on function entry: every slot uninitialized.
    pub fn new(num_slots: usize) -> Self {
        let uninit = TypeSet::uninit();
        LocalState(Rc::new(vec![uninit; num_slots]))
    }

    pub fn ptr_eq(&self, other: &LocalState) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn slots(&self) -> &[TypeSet] {
        &self.0
    }

    /// Reads a slot, which must be initialized on every path.
    pub fn get(&self, slot: usize) -> Result<&TypeSet, ErrorKind> {
        let set = &self.0[slot];
        if set.may_be_uninit() {
            return Err(ErrorKind::UninitializedLocal);
        }
        Ok(set)
    }

    pub fn set(&self, slot: usize, value: &TypeSet) -> LocalState {
        if value.is_subset_of(&self.0[slot]) {
            return self.clone();
        }
        let mut slots = (*self.0).clone();
        slots[slot] = value.clone();
        LocalState(Rc::new(slots))
    }

    /// Slot-wise union. Returns one of the inputs unchanged when it already holds the other.
    pub fn merge(&self, types: &TypeTable, other: &LocalState) -> Result<LocalState, ErrorKind> {
        if self.ptr_eq(other) {
            return Ok(self.clone());
        }
        if self.len() != other.len() {
            return Err(ErrorKind::LocalsMismatch(self.len(), other.len()));
        }

        let mut self_ok = true;
        let mut other_ok = true;
        let mut merged: Vec<TypeSet> = Vec::with_capacity(self.len());
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            let slot = if b.is_subset_of(a) {
                other_ok &= a.is_subset_of(b);
                a.clone()
            } else if a.is_subset_of(b) {
                self_ok = false;
                b.clone()
            } else {
                self_ok = false;
                other_ok = false;
                a.merge(types, b)?
            };
            merged.push(slot);
        }

        if self_ok {
            Ok(self.clone())
        } else if other_ok {
            Ok(other.clone())
        } else {
            Ok(LocalState(Rc::new(merged)))
        }
    }
}
