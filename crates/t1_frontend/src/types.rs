use crate::error::ErrorKind;
use id_collections::{id_type, IdVec};
use std::collections::{BTreeMap, BTreeSet};

#[id_type]
pub struct TypeId(pub usize);

impl TypeId {
    pub const OBJECT: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const INT: TypeId = TypeId(2);
    pub const U8: TypeId = TypeId(3);
    pub const U16: TypeId = TypeId(4);
    pub const U32: TypeId = TypeId(5);
    pub const U64: TypeId = TypeId(6);
    pub const I8: TypeId = TypeId(7);
    pub const I16: TypeId = TypeId(8);
    pub const I32: TypeId = TypeId(9);
    pub const I64: TypeId = TypeId(10);
    pub const TYPE: TypeId = TypeId(11);

    pub const ARRAY_OBJECT: TypeId = TypeId(12);
    pub const ARRAY_BOOL: TypeId = TypeId(13);
    pub const ARRAY_U8: TypeId = TypeId(14);
    pub const ARRAY_U16: TypeId = TypeId(15);
    pub const ARRAY_U32: TypeId = TypeId(16);
    pub const ARRAY_U64: TypeId = TypeId(17);
    pub const ARRAY_I8: TypeId = TypeId(18);
    pub const ARRAY_I16: TypeId = TypeId(19);
    pub const ARRAY_I32: TypeId = TypeId(20);
    pub const ARRAY_I64: TypeId = TypeId(21);

    pub const STRING: TypeId = TypeId::ARRAY_U8;

    /// Booleans and the fixed-width integers. These have a dedicated unboxed representation with
    /// no "uninitialized" state, and accept no sub-types.
    pub fn is_restricted(self) -> bool {
        self == TypeId::BOOL || (TypeId::U8.0..=TypeId::I64.0).contains(&self.0)
    }

    /// Storage width in bits of a restricted type.
    pub fn bit_size(self) -> Option<u32> {
        match self {
            TypeId::BOOL | TypeId::U8 | TypeId::I8 => Some(8),
            TypeId::U16 | TypeId::I16 => Some(16),
            TypeId::U32 | TypeId::I32 => Some(32),
            TypeId::U64 | TypeId::I64 => Some(64),
            _ => None,
        }
    }
}

pub const INTEGER_TYPES: &[TypeId] = &[
    TypeId::INT,
    TypeId::U8,
    TypeId::U16,
    TypeId::U32,
    TypeId::U64,
    TypeId::I8,
    TypeId::I16,
    TypeId::I32,
    TypeId::I64,
];

const BASIC_TYPE_NAMES: &[(TypeId, &str)] = &[
    (TypeId::OBJECT, "std::object"),
    (TypeId::BOOL, "std::bool"),
    (TypeId::INT, "std::int"),
    (TypeId::U8, "std::u8"),
    (TypeId::U16, "std::u16"),
    (TypeId::U32, "std::u32"),
    (TypeId::U64, "std::u64"),
    (TypeId::I8, "std::i8"),
    (TypeId::I16, "std::i16"),
    (TypeId::I32, "std::i32"),
    (TypeId::I64, "std::i64"),
    (TypeId::TYPE, "std::type"),
];

const BASIC_ARRAY_ELEMENTS: &[(TypeId, TypeId)] = &[
    (TypeId::ARRAY_OBJECT, TypeId::OBJECT),
    (TypeId::ARRAY_BOOL, TypeId::BOOL),
    (TypeId::ARRAY_U8, TypeId::U8),
    (TypeId::ARRAY_U16, TypeId::U16),
    (TypeId::ARRAY_U32, TypeId::U32),
    (TypeId::ARRAY_U64, TypeId::U64),
    (TypeId::ARRAY_I8, TypeId::I8),
    (TypeId::ARRAY_I16, TypeId::I16),
    (TypeId::ARRAY_I32, TypeId::I32),
    (TypeId::ARRAY_I64, TypeId::I64),
];

pub const STRING_ALIAS: &str = "std::string";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeState {
    /// Referenced by name but never defined.
    Named,
    Open,
    /// No further elements may be added, but the type is not closed yet.
    Full,
    Closing,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    Field { ty: TypeId, slot: usize },
    FieldArray { ty: TypeId, size: usize, slot: usize },
    Embed { ty: TypeId, extension: bool },
    EmbedArray { ty: TypeId, size: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub kind: ElementKind,
    /// Position in the field area (fields) or the embed area (embeds). Assigned when the owner is
    /// closed; arrays occupy `size` consecutive positions.
    pub offset: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArrayInfo {
    pub element: TypeId,
    pub embedded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extension {
    /// Element indices of the extension embeds leading to the extended type.
    Path(Vec<usize>),
    Ambiguous,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extends {
    Itself,
    Through(Vec<usize>),
    Ambiguous,
    No,
}

#[derive(Clone, Debug)]
pub struct TypeDef {
    pub name: String,
    pub state: TypeState,
    pub is_basic: bool,
    pub allows_sub_types: bool,
    /// Locked-down types are closed from the start and refuse generic instances.
    pub locked: bool,
    pub super_types: BTreeSet<TypeId>,
    pub elements: Vec<Element>,
    pub num_fields: usize,
    pub num_embeds: usize,
    /// Number of field-store slots: one per field, one per field array.
    pub num_slots: usize,
    pub array: Option<ArrayInfo>,
    pub extensions: BTreeMap<TypeId, Extension>,
}

impl TypeDef {
    fn new(name: String) -> Self {
        TypeDef {
            name,
            state: TypeState::Named,
            is_basic: false,
            allows_sub_types: true,
            locked: false,
            super_types: BTreeSet::new(),
            elements: Vec::new(),
            num_fields: 0,
            num_embeds: 0,
            num_slots: 0,
            array: None,
            extensions: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TypeTable {
    types: IdVec<TypeId, TypeDef>,
    by_name: BTreeMap<String, TypeId>,
}

pub fn array_type_name(element: &str, embedded: bool) -> String {
    format!(
        "({} {})",
        element,
        if embedded { "std::array&" } else { "std::array" }
    )
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = TypeTable {
            types: IdVec::new(),
            by_name: BTreeMap::new(),
        };

        for &(expected, name) in BASIC_TYPE_NAMES {
            let id = table.push(TypeDef::new(name.to_owned()));
            debug_assert_eq!(id, expected);
            let def = &mut table.types[id];
            def.state = TypeState::Closed;
            def.locked = true;
            def.is_basic = id != TypeId::OBJECT && id != TypeId::TYPE;
            def.allows_sub_types = !id.is_restricted();
        }

        for &(expected, element) in BASIC_ARRAY_ELEMENTS {
            let (id, _) = table.array(element, false);
            debug_assert_eq!(id, expected);
        }

        table
    }

    fn push(&mut self, def: TypeDef) -> TypeId {
        let name = def.name.clone();
        let id = self.types.push(def);
        self.by_name.insert(name, id);
        id
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.types.iter().map(|(id, _)| id)
    }

    pub fn get(&self, id: TypeId) -> &TypeDef {
        &self.types[id]
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.types[id].name
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        if name == STRING_ALIAS {
            return Some(TypeId::STRING);
        }
        self.by_name.get(name).copied()
    }

    /// Finds a type by name, creating it in the NAMED state if it does not exist yet. The flag
    /// reports whether the type was created.
    pub fn declare(&mut self, name: &str) -> (TypeId, bool) {
        match self.lookup(name) {
            Some(id) => (id, false),
            None => (self.push(TypeDef::new(name.to_owned())), true),
        }
    }

    pub fn is_sub_type_of(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup || sup == TypeId::OBJECT {
            return true;
        }
        let mut pending = vec![sub];
        let mut seen = BTreeSet::new();
        while let Some(ty) = pending.pop() {
            for &direct in &self.types[ty].super_types {
                if direct == sup {
                    return true;
                }
                if seen.insert(direct) {
                    pending.push(direct);
                }
            }
        }
        false
    }

    pub fn is_embeddable(&self, id: TypeId) -> bool {
        !self.types[id].is_basic && id != TypeId::OBJECT && id != TypeId::TYPE
    }

    pub fn open(&mut self, id: TypeId) -> Result<(), ErrorKind> {
        let def = &mut self.types[id];
        if def.state != TypeState::Named {
            return Err(ErrorKind::Reopen(def.name.clone()));
        }
        def.state = TypeState::Open;
        Ok(())
    }

    pub fn mark_full(&mut self, id: TypeId) -> Result<(), ErrorKind> {
        let def = &mut self.types[id];
        if def.state != TypeState::Open {
            return Err(ErrorKind::MarkFullNotOpen(def.name.clone()));
        }
        def.state = TypeState::Full;
        Ok(())
    }

    pub fn add_super_type(&mut self, sub: TypeId, sup: TypeId) -> Result<(), ErrorKind> {
        if self.is_sub_type_of(sub, sup) {
            return Ok(());
        }
        if !self.types[sup].allows_sub_types {
            return Err(ErrorKind::SubTypeRefused {
                sup: self.name(sup).to_owned(),
                sub: self.name(sub).to_owned(),
            });
        }
        if self.is_sub_type_of(sup, sub) {
            return Err(ErrorKind::SubTypingCycle {
                sup: self.name(sup).to_owned(),
                sub: self.name(sub).to_owned(),
            });
        }
        self.types[sub].super_types.insert(sup);
        Ok(())
    }

    fn add_element(
        &mut self,
        owner: TypeId,
        name: &str,
        kind: ElementKind,
    ) -> Result<(), ErrorKind> {
        let def = &mut self.types[owner];
        let describe = |def: &TypeDef| (name.to_owned(), def.name.clone());
        match def.state {
            TypeState::Open => {}
            TypeState::Named => {
                let (element, ty) = describe(def);
                return Err(ErrorKind::TypeNotOpen { element, ty });
            }
            TypeState::Full => {
                let (element, ty) = describe(def);
                return Err(ErrorKind::TypeFull { element, ty });
            }
            TypeState::Closing | TypeState::Closed => {
                let (element, ty) = describe(def);
                return Err(ErrorKind::TypeClosed { element, ty });
            }
        }
        if def.elements.iter().any(|elt| elt.name == name) {
            let (element, ty) = describe(def);
            return Err(ErrorKind::DuplicateElement { element, ty });
        }
        def.elements.push(Element {
            name: name.to_owned(),
            kind,
            offset: 0,
        });
        Ok(())
    }

    fn check_size(size: i64) -> Result<usize, ErrorKind> {
        if size <= 0 {
            return Err(ErrorKind::NonPositiveArraySize(size));
        }
        Ok(size as usize)
    }

    fn check_embeddable(&self, ty: TypeId) -> Result<(), ErrorKind> {
        if !self.is_embeddable(ty) {
            return Err(ErrorKind::NotEmbeddable(self.name(ty).to_owned()));
        }
        Ok(())
    }

    pub fn add_field(&mut self, owner: TypeId, name: &str, ty: TypeId) -> Result<(), ErrorKind> {
        let slot = self.types[owner].num_slots;
        self.add_element(owner, name, ElementKind::Field { ty, slot })?;
        self.types[owner].num_slots += 1;
        Ok(())
    }

    pub fn add_field_array(
        &mut self,
        owner: TypeId,
        name: &str,
        size: i64,
        ty: TypeId,
    ) -> Result<(), ErrorKind> {
        let size = Self::check_size(size)?;
        let slot = self.types[owner].num_slots;
        self.add_element(owner, name, ElementKind::FieldArray { ty, size, slot })?;
        self.types[owner].num_slots += 1;
        Ok(())
    }

    pub fn add_embed(&mut self, owner: TypeId, name: &str, ty: TypeId) -> Result<(), ErrorKind> {
        self.check_embeddable(ty)?;
        self.add_element(
            owner,
            name,
            ElementKind::Embed {
                ty,
                extension: false,
            },
        )
    }

    pub fn add_embed_array(
        &mut self,
        owner: TypeId,
        name: &str,
        size: i64,
        ty: TypeId,
    ) -> Result<(), ErrorKind> {
        let size = Self::check_size(size)?;
        self.check_embeddable(ty)?;
        self.add_element(owner, name, ElementKind::EmbedArray { ty, size })
    }

    /// Embeds the super type under its own name and records the sub-typing relation, so that the
    /// super type's accessors apply to instances of `owner`.
    pub fn add_extension(&mut self, owner: TypeId, sup: TypeId) -> Result<(), ErrorKind> {
        self.check_embeddable(sup)?;
        let name = self.name(sup).to_owned();
        self.add_element(
            owner,
            &name,
            ElementKind::Embed {
                ty: sup,
                extension: true,
            },
        )?;
        self.add_super_type(owner, sup)
    }

    /// Closes a type and every type it embeds. Returns the types that became closed by this call,
    /// in the order they were closed.
    pub fn close(&mut self, id: TypeId) -> Result<Vec<TypeId>, ErrorKind> {
        let mut closed = Vec::new();
        self.close_rec(id, &mut closed)?;
        Ok(closed)
    }

    fn close_rec(&mut self, id: TypeId, closed: &mut Vec<TypeId>) -> Result<(), ErrorKind> {
        match self.types[id].state {
            TypeState::Closed => return Ok(()),
            TypeState::Closing => return Err(ErrorKind::EmbeddingCycle(self.name(id).to_owned())),
            TypeState::Named => return Err(ErrorKind::CloseUndefined(self.name(id).to_owned())),
            TypeState::Open | TypeState::Full => {}
        }
        self.types[id].state = TypeState::Closing;

        let mut num_fields = 0;
        let mut num_embeds = 0;
        for index in 0..self.types[id].elements.len() {
            let offset = match self.types[id].elements[index].kind {
                ElementKind::Field { .. } => {
                    num_fields += 1;
                    num_fields - 1
                }
                ElementKind::FieldArray { size, .. } => {
                    num_fields += size;
                    num_fields - size
                }
                ElementKind::Embed { ty, .. } => {
                    self.close_rec(ty, closed)?;
                    num_embeds += 1;
                    num_embeds - 1
                }
                ElementKind::EmbedArray { ty, size } => {
                    self.close_rec(ty, closed)?;
                    num_embeds += size;
                    num_embeds - size
                }
            };
            self.types[id].elements[index].offset = offset;
        }

        let extensions = self.compute_extensions(id);
        let def = &mut self.types[id];
        def.num_fields = num_fields;
        def.num_embeds = num_embeds;
        def.extensions = extensions;
        def.state = TypeState::Closed;
        closed.push(id);
        Ok(())
    }

    fn compute_extensions(&self, id: TypeId) -> BTreeMap<TypeId, Extension> {
        let mut extensions = BTreeMap::new();
        let mut record = |target: TypeId, ext: Extension| {
            extensions
                .entry(target)
                .and_modify(|existing| *existing = Extension::Ambiguous)
                .or_insert(ext);
        };
        for (index, elt) in self.types[id].elements.iter().enumerate() {
            let ty = match elt.kind {
                ElementKind::Embed {
                    ty,
                    extension: true,
                } => ty,
                _ => continue,
            };
            record(ty, Extension::Path(vec![index]));
            for (&target, inner) in &self.types[ty].extensions {
                let ext = match inner {
                    Extension::Path(path) => {
                        let mut full = Vec::with_capacity(path.len() + 1);
                        full.push(index);
                        full.extend_from_slice(path);
                        Extension::Path(full)
                    }
                    Extension::Ambiguous => Extension::Ambiguous,
                };
                record(target, ext);
            }
        }
        extensions
    }

    /// How values of type `ty` reach the layout of `owner`, if at all.
    pub fn extends(&self, ty: TypeId, owner: TypeId) -> Extends {
        if ty == owner {
            return Extends::Itself;
        }
        match self.types[ty].extensions.get(&owner) {
            Some(Extension::Path(path)) => Extends::Through(path.clone()),
            Some(Extension::Ambiguous) => Extends::Ambiguous,
            None => Extends::No,
        }
    }

    /// Finds or creates the array type for the given element type. The flag reports whether the
    /// type was created, in which case its accessors still need to be registered.
    pub fn array(&mut self, element: TypeId, embedded: bool) -> (TypeId, bool) {
        let name = array_type_name(self.name(element), embedded);
        if let Some(&id) = self.by_name.get(&name) {
            return (id, false);
        }
        let mut def = TypeDef::new(name);
        def.state = TypeState::Closed;
        def.array = Some(ArrayInfo { element, embedded });
        def.num_slots = if embedded { 0 } else { 1 };
        (self.push(def), true)
    }

    pub fn checked_array(
        &mut self,
        element: TypeId,
        embedded: bool,
    ) -> Result<(TypeId, bool), ErrorKind> {
        if embedded {
            self.check_embeddable(element)?;
        }
        let name = array_type_name(self.name(element), embedded);
        if let Some(&id) = self.by_name.get(&name) {
            if self.types[id].array
                != Some(ArrayInfo {
                    element,
                    embedded,
                })
            {
                return Err(ErrorKind::ArrayNameClash {
                    name,
                    element: self.name(element).to_owned(),
                });
            }
        }
        Ok(self.array(element, embedded))
    }

    /// Per field-store slot, the statically known initial type: set for restricted fields (which
    /// are never uninitialized), absent otherwise.
    pub fn field_init_types(&self, id: TypeId) -> Vec<Option<TypeId>> {
        let def = &self.types[id];
        if let Some(array) = def.array {
            if array.embedded {
                return Vec::new();
            }
            return vec![Some(array.element).filter(|elt| elt.is_restricted())];
        }
        def.elements
            .iter()
            .filter_map(|elt| match elt.kind {
                ElementKind::Field { ty, .. } | ElementKind::FieldArray { ty, .. } => {
                    Some(Some(ty).filter(|ty| ty.is_restricted()))
                }
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn open_type(table: &mut TypeTable, name: &str) -> TypeId {
        let (id, created) = table.declare(name);
        assert!(created);
        table.open(id).unwrap();
        id
    }

    #[test]
    fn basic_types_are_fixed() {
        let table = TypeTable::new();
        assert_eq!(table.lookup("std::i32"), Some(TypeId::I32));
        assert_eq!(table.lookup("std::string"), Some(TypeId::STRING));
        assert_eq!(table.name(TypeId::ARRAY_U8), "(std::u8 std::array)");
        assert!(TypeId::U8.is_restricted());
        assert!(TypeId::BOOL.is_restricted());
        assert!(!TypeId::INT.is_restricted());
        assert!(!TypeId::OBJECT.is_restricted());
        assert!(table.get(TypeId::INT).is_basic);
        assert!(!table.get(TypeId::OBJECT).is_basic);
        assert_eq!(TypeId::I16.bit_size(), Some(16));
        assert_eq!(TypeId::INT.bit_size(), None);
    }

    #[test]
    fn sub_typing() {
        let mut table = TypeTable::new();
        let a = open_type(&mut table, "def::a");
        let b = open_type(&mut table, "def::b");
        let c = open_type(&mut table, "def::c");
        table.add_super_type(b, a).unwrap();
        table.add_super_type(c, b).unwrap();

        assert!(table.is_sub_type_of(c, a));
        assert!(table.is_sub_type_of(c, c));
        assert!(table.is_sub_type_of(c, TypeId::OBJECT));
        assert!(!table.is_sub_type_of(a, c));

        // Already implied: no-op.
        table.add_super_type(c, a).unwrap();
        assert!(!table.get(c).super_types.contains(&a));

        assert!(matches!(
            table.add_super_type(a, c),
            Err(ErrorKind::SubTypingCycle { .. })
        ));
        assert!(matches!(
            table.add_super_type(a, TypeId::U8),
            Err(ErrorKind::SubTypeRefused { .. })
        ));
    }

    #[test]
    fn element_state_checks() {
        let mut table = TypeTable::new();
        let (named, _) = table.declare("def::named");
        assert!(matches!(
            table.add_field(named, "def::x", TypeId::INT),
            Err(ErrorKind::TypeNotOpen { .. })
        ));

        let t = open_type(&mut table, "def::t");
        table.add_field(t, "def::x", TypeId::INT).unwrap();
        assert!(matches!(
            table.add_field(t, "def::x", TypeId::INT),
            Err(ErrorKind::DuplicateElement { .. })
        ));
        assert!(matches!(
            table.add_embed(t, "def::e", TypeId::INT),
            Err(ErrorKind::NotEmbeddable(_))
        ));
        assert!(matches!(
            table.add_field_array(t, "def::arr", 0, TypeId::INT),
            Err(ErrorKind::NonPositiveArraySize(0))
        ));

        table.mark_full(t).unwrap();
        assert!(matches!(
            table.add_field(t, "def::y", TypeId::INT),
            Err(ErrorKind::TypeFull { .. })
        ));

        table.close(t).unwrap();
        assert!(matches!(
            table.add_field(t, "def::z", TypeId::INT),
            Err(ErrorKind::TypeClosed { .. })
        ));
        assert!(matches!(table.open(t), Err(ErrorKind::Reopen(_))));
        assert!(matches!(
            table.close(named),
            Err(ErrorKind::CloseUndefined(_))
        ));
    }

    #[test]
    fn close_assigns_offsets_and_slots() {
        let mut table = TypeTable::new();
        let inner = open_type(&mut table, "def::inner");
        table.add_field(inner, "def::v", TypeId::U8).unwrap();

        let outer = open_type(&mut table, "def::outer");
        table.add_field(outer, "def::a", TypeId::INT).unwrap();
        table.add_field_array(outer, "def::arr", 4, TypeId::I32).unwrap();
        table.add_embed(outer, "def::in", inner).unwrap();
        table.add_field(outer, "def::b", TypeId::BOOL).unwrap();
        table.add_embed_array(outer, "def::ins", 3, inner).unwrap();

        let closed = table.close(outer).unwrap();
        assert_eq!(closed, vec![inner, outer]);
        assert_eq!(table.close(outer).unwrap(), Vec::<TypeId>::new());

        let def = table.get(outer);
        let offsets: Vec<usize> = def.elements.iter().map(|elt| elt.offset).collect();
        assert_eq!(offsets, vec![0, 1, 0, 5, 1]);
        assert_eq!(def.num_fields, 6);
        assert_eq!(def.num_embeds, 4);
        assert_eq!(
            table.field_init_types(outer),
            vec![None, Some(TypeId::I32), Some(TypeId::BOOL)]
        );
    }

    #[test]
    fn embedding_cycle_is_detected() {
        let mut table = TypeTable::new();
        let a = open_type(&mut table, "def::a");
        let b = open_type(&mut table, "def::b");
        table.add_embed(a, "def::b", b).unwrap();
        table.add_embed(b, "def::a", a).unwrap();
        assert!(matches!(
            table.close(a),
            Err(ErrorKind::EmbeddingCycle(_))
        ));
    }

    #[test]
    fn extension_paths() {
        let mut table = TypeTable::new();
        let base = open_type(&mut table, "def::base");
        let left = open_type(&mut table, "def::left");
        let right = open_type(&mut table, "def::right");
        let diamond = open_type(&mut table, "def::diamond");

        table.add_extension(left, base).unwrap();
        table.add_field(right, "def::r", TypeId::INT).unwrap();
        table.add_extension(right, base).unwrap();
        table.add_extension(diamond, left).unwrap();
        table.add_extension(diamond, right).unwrap();
        table.close(diamond).unwrap();

        assert_eq!(table.extends(left, left), Extends::Itself);
        assert_eq!(table.extends(left, base), Extends::Through(vec![0]));
        assert_eq!(table.extends(right, base), Extends::Through(vec![1]));
        assert_eq!(table.extends(diamond, right), Extends::Through(vec![1]));
        assert_eq!(table.extends(diamond, base), Extends::Ambiguous);
        assert_eq!(table.extends(base, left), Extends::No);
        assert!(table.is_sub_type_of(diamond, base));
    }

    #[test]
    fn arrays_are_created_once() {
        let mut table = TypeTable::new();
        let t = open_type(&mut table, "def::t");
        table.close(t).unwrap();

        let (refs, created) = table.checked_array(t, false).unwrap();
        assert!(created);
        let (again, created_again) = table.checked_array(t, false).unwrap();
        assert_eq!(refs, again);
        assert!(!created_again);

        let (embedded, _) = table.checked_array(t, true).unwrap();
        assert_ne!(refs, embedded);
        assert_eq!(table.name(embedded), "(def::t std::array&)");
        assert_eq!(table.field_init_types(embedded), Vec::new());
        assert_eq!(
            table.field_init_types(TypeId::ARRAY_I16),
            vec![Some(TypeId::I16)]
        );
        assert!(matches!(
            table.checked_array(TypeId::INT, true),
            Err(ErrorKind::NotEmbeddable(_))
        ));
    }
}
