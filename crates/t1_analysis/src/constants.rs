use std::collections::{BTreeMap, BTreeSet};
use t1_frontend::function::FunctionId;
use t1_frontend::opcode::Constant;
use t1_frontend::types::TypeId;

/// A `std::new` call: the calling function and the address of its call opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AllocationSite {
    pub function: FunctionId,
    pub addr: usize,
}

/// Everything a backend must lay out statically: literal values, the types allocated at each
/// `new` site, and the types of local instances.
#[derive(Clone, Debug, Default)]
pub struct ConstantRegistry {
    values: BTreeSet<Constant>,
    allocations: BTreeMap<AllocationSite, BTreeSet<TypeId>>,
    layouts: BTreeSet<TypeId>,
}

impl ConstantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_value(&mut self, value: &Constant) {
        if !self.values.contains(value) {
            self.values.insert(value.clone());
        }
    }

    pub fn add_allocation(&mut self, site: AllocationSite, ty: TypeId) {
        self.allocations.entry(site).or_default().insert(ty);
        self.layouts.insert(ty);
    }

    pub fn add_layout(&mut self, ty: TypeId) {
        self.layouts.insert(ty);
    }

    pub fn values(&self) -> impl Iterator<Item = &Constant> {
        self.values.iter()
    }

    pub fn allocations(&self) -> impl Iterator<Item = (&AllocationSite, &BTreeSet<TypeId>)> {
        self.allocations.iter()
    }

    pub fn layouts(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.layouts.iter().copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registry_deduplicates() {
        let mut registry = ConstantRegistry::new();
        registry.add_value(&Constant::Str("hi".to_owned()));
        registry.add_value(&Constant::Str("hi".to_owned()));
        registry.add_value(&Constant::Int(3));
        assert_eq!(registry.values().count(), 2);

        let site = AllocationSite {
            function: FunctionId(4),
            addr: 2,
        };
        registry.add_allocation(site, TypeId::ARRAY_OBJECT);
        registry.add_allocation(site, TypeId::ARRAY_OBJECT);
        registry.add_layout(TypeId::STRING);
        assert_eq!(registry.allocations().count(), 1);
        assert_eq!(
            registry.layouts().collect::<Vec<_>>(),
            vec![TypeId::ARRAY_OBJECT, TypeId::STRING]
        );
    }
}
