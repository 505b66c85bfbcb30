use crate::atype::AType;
use crate::error::ErrorKind;
use crate::graph::{InstanceId, NodeId};
use crate::type_set::TypeSet;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use t1_frontend::types::TypeTable;

#[derive(Clone, Debug)]
struct StructRecord {
    /// Types stored so far, per field-store slot. Restricted fields start at their own type.
    fields: Vec<Option<TypeSet>>,
    /// Nodes reading each slot.
    observers: Vec<BTreeSet<NodeId>>,
}

/// Field types of every structure (and array of references) instance seen by the analysis,
/// keyed by the annotated type of the instance. Records only grow.
#[derive(Clone, Debug, Default)]
pub struct StructStore {
    records: FxHashMap<AType, StructRecord>,
}

impl StructStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    fn record(&mut self, types: &TypeTable, key: AType) -> &mut StructRecord {
        self.records.entry(key).or_insert_with(|| {
            let init = match key.ty {
                Some(ty) => types.field_init_types(ty),
                None => Vec::new(),
            };
            StructRecord {
                observers: vec![BTreeSet::new(); init.len()],
                fields: init
                    .into_iter()
                    .map(|ty| ty.map(TypeSet::plain))
                    .collect(),
            }
        })
    }

    /// The types stored in a slot, or `None` if nothing was ever stored there.
    pub fn get(&mut self, types: &TypeTable, key: AType, slot: usize) -> Option<TypeSet> {
        self.record(types, key).fields.get(slot).cloned().flatten()
    }

    pub fn register(&mut self, types: &TypeTable, key: AType, slot: usize, node: NodeId) {
        if let Some(observers) = self.record(types, key).observers.get_mut(slot) {
            observers.insert(node);
        }
    }

    /// Adds `value` to a slot and returns the observers to wake when the slot changed.
    /// `descends(instance, ancestor)` tells whether a function invocation happens within another.
    pub fn merge(
        &mut self,
        types: &TypeTable,
        key: AType,
        slot: usize,
        value: &TypeSet,
        descends: impl Fn(InstanceId, InstanceId) -> bool,
    ) -> Result<Vec<NodeId>, ErrorKind> {
        for atype in value.iter() {
            let escapes = match (atype.alloc, key.alloc) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(value_alloc), Some(owner_alloc)) => !descends(owner_alloc, value_alloc),
            };
            if escapes {
                return Err(ErrorKind::EscapeThroughField {
                    value: atype.display(types),
                    owner: key.display(types),
                });
            }
        }

        let record = self.record(types, key);
        let field = match record.fields.get_mut(slot) {
            Some(field) => field,
            None => return Ok(Vec::new()),
        };
        let merged = match field {
            None => value.clone(),
            Some(old) => {
                let merged = old.merge(types, value)?;
                if merged.ptr_eq(old) {
                    return Ok(Vec::new());
                }
                merged
            }
        };
        *field = Some(merged);
        Ok(record.observers[slot].iter().copied().collect())
    }
}
