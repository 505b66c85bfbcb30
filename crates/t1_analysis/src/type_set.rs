use crate::atype::AType;
use crate::error::ErrorKind;
use im_rc::OrdSet;
use std::rc::Rc;
use t1_frontend::types::{TypeId, TypeTable};

#[derive(Debug, PartialEq, Eq)]
struct TypeSetData {
    atypes: OrdSet<AType>,
    /// Plain types of the initialized members.
    plain: OrdSet<TypeId>,
}

/// An immutable, never empty set of annotated types. Clones share their contents, so identity is
/// cheap to test with [`TypeSet::ptr_eq`].
#[derive(Clone, Debug)]
pub struct TypeSet(Rc<TypeSetData>);

impl PartialEq for TypeSet {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0.atypes == other.0.atypes
    }
}

impl Eq for TypeSet {}

/// Two members that cannot share a set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Conflict(pub AType, pub AType);

impl Conflict {
    pub fn into_error(self, types: &TypeTable) -> ErrorKind {
        ErrorKind::ForbiddenMerge(self.0.display(types), self.1.display(types))
    }
}

impl TypeSet {
    pub fn singleton(atype: AType) -> Self {
        TypeSet(Rc::new(TypeSetData {
            atypes: OrdSet::unit(atype),
            plain: atype.ty.into_iter().collect(),
        }))
    }

    pub fn uninit() -> Self {
        TypeSet::singleton(AType::UNINIT)
    }

    pub fn plain(ty: TypeId) -> Self {
        TypeSet::singleton(AType::plain(ty))
    }

    fn from_atypes(atypes: OrdSet<AType>) -> Self {
        let plain = atypes.iter().filter_map(|atype| atype.ty).collect();
        TypeSet(Rc::new(TypeSetData { atypes, plain }))
    }

    pub fn ptr_eq(&self, other: &TypeSet) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn len(&self) -> usize {
        self.0.atypes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AType> {
        self.0.atypes.iter()
    }

    pub fn plain_types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.0.plain.iter().copied()
    }

    pub fn may_be_uninit(&self) -> bool {
        self.0
            .atypes
            .get_min()
            .map_or(false, |atype| atype.is_uninit())
    }

    /// The restricted type of a set holding exactly one restricted type.
    pub fn restricted_type(&self) -> Option<TypeId> {
        if self.0.plain.len() != 1 {
            return None;
        }
        self.0.plain.get_min().copied().filter(|ty| ty.is_restricted())
    }

    pub fn is_subset_of(&self, other: &TypeSet) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.len() <= other.len() && self.0.atypes.is_subset(&other.0.atypes)
    }

    /// Union of two sets. Returns one of the inputs unchanged (`self` when they are equal) when
    /// it already contains the other.
    pub fn try_merge(&self, other: &TypeSet) -> Result<TypeSet, Conflict> {
        if other.is_subset_of(self) {
            return Ok(self.clone());
        }
        if self.is_subset_of(other) {
            return Ok(other.clone());
        }

        // A restricted member is alone in its set, and identical restricted singletons were
        // handled above.
        if let (Some(&a), Some(&b)) = (self.iter().next(), other.iter().next()) {
            if a.restricted().is_some() || b.restricted().is_some() {
                return Err(Conflict(a, b));
            }
        }

        Ok(TypeSet::from_atypes(
            self.0.atypes.clone().union(other.0.atypes.clone()),
        ))
    }

    pub fn merge(&self, types: &TypeTable, other: &TypeSet) -> Result<TypeSet, ErrorKind> {
        self.try_merge(other)
            .map_err(|conflict| conflict.into_error(types))
    }

    /// Merges every set of a non-empty list.
    pub fn merge_all<'a>(
        types: &TypeTable,
        sets: impl IntoIterator<Item = &'a TypeSet>,
    ) -> Result<Option<TypeSet>, ErrorKind> {
        let mut merged: Option<TypeSet> = None;
        for set in sets {
            merged = Some(match merged {
                None => set.clone(),
                Some(acc) => acc.merge(types, set)?,
            });
        }
        Ok(merged)
    }

    pub fn contains_sub_type_of(&self, types: &TypeTable, ty: TypeId) -> bool {
        self.plain_types()
            .any(|member| types.is_sub_type_of(member, ty))
    }

    fn check(
        &self,
        types: &TypeTable,
        expected: TypeId,
        accept: impl Fn(TypeId) -> bool,
    ) -> Result<(), ErrorKind> {
        let found: Vec<String> = self
            .iter()
            .filter(|atype| !atype.ty.map_or(false, &accept))
            .map(|atype| atype.display(types))
            .collect();
        if found.is_empty() {
            Ok(())
        } else {
            Err(ErrorKind::UnexpectedType {
                expected: types.name(expected).to_owned(),
                found,
            })
        }
    }

    /// Every member must have exactly the given type.
    pub fn check_exact(&self, types: &TypeTable, expected: TypeId) -> Result<(), ErrorKind> {
        self.check(types, expected, |ty| ty == expected)
    }

    pub fn check_sub_type_of(&self, types: &TypeTable, expected: TypeId) -> Result<(), ErrorKind> {
        self.check(types, expected, |ty| types.is_sub_type_of(ty, expected))
    }

    pub fn display(&self, types: &TypeTable) -> String {
        let members: Vec<String> = self.iter().map(|atype| atype.display(types)).collect();
        format!("<{}>", members.join(","))
    }
}

/// Enumerates the cartesian product of a list of sets in odometer order, the first set varying
/// fastest.
pub struct ComboEnumerator {
    members: Vec<Vec<AType>>,
    indices: Vec<usize>,
    done: bool,
}

impl ComboEnumerator {
    pub fn new(sets: &[TypeSet]) -> Self {
        let members: Vec<Vec<AType>> = sets
            .iter()
            .map(|set| set.iter().copied().collect())
            .collect();
        let done = members.iter().any(|m| m.is_empty());
        ComboEnumerator {
            indices: vec![0; members.len()],
            members,
            done,
        }
    }
}

impl Iterator for ComboEnumerator {
    type Item = Vec<AType>;

    fn next(&mut self) -> Option<Vec<AType>> {
        if self.done {
            return None;
        }
        let combo = self
            .indices
            .iter()
            .zip(&self.members)
            .map(|(&i, members)| members[i])
            .collect();

        self.done = true;
        for (index, members) in self.indices.iter_mut().zip(&self.members) {
            *index += 1;
            if *index < members.len() {
                self.done = false;
                break;
            }
            *index = 0;
        }
        Some(combo)
    }
}
