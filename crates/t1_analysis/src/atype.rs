use crate::error::ErrorKind;
use crate::graph::InstanceId;
use std::cmp::Ordering;
use t1_frontend::types::{TypeId, TypeTable};

/// Distinguishes simultaneous local allocations made by one function invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Variant {
    None,
    /// A local instance, by embed offset (base offset for arrays of instances).
    Local(usize),
    /// A `std::new` call, by address of the calling opcode.
    Site(usize),
}

/// An annotated type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AType {
    /// `None` for the uninitialized state of a local or field.
    pub ty: Option<TypeId>,
    /// The function invocation that allocated the instance on its frame.
    pub alloc: Option<InstanceId>,
    pub variant: Variant,
    /// Statically allocated instances.
    pub constant: bool,
    /// For `std::type` values, the type they reflect.
    pub of_type: Option<TypeId>,
}

impl AType {
    pub const UNINIT: AType = AType {
        ty: None,
        alloc: None,
        variant: Variant::None,
        constant: false,
        of_type: None,
    };

    pub const BOOL: AType = AType::plain(TypeId::BOOL);
    pub const INT: AType = AType::plain(TypeId::INT);

    pub const fn plain(ty: TypeId) -> Self {
        AType {
            ty: Some(ty),
            alloc: None,
            variant: Variant::None,
            constant: false,
            of_type: None,
        }
    }

    pub fn constant(ty: TypeId) -> Self {
        AType {
            constant: true,
            ..AType::plain(ty)
        }
    }

    pub fn local(ty: TypeId, alloc: InstanceId, variant: Variant) -> Self {
        AType {
            alloc: Some(alloc),
            variant,
            ..AType::plain(ty)
        }
    }

    pub fn type_of_type(of_type: TypeId) -> Self {
        AType {
            of_type: Some(of_type),
            constant: true,
            ..AType::plain(TypeId::TYPE)
        }
    }

    pub fn is_uninit(&self) -> bool {
        self.ty.is_none()
    }

    pub fn restricted(&self) -> Option<TypeId> {
        self.ty.filter(|ty| ty.is_restricted())
    }

    /// The same instance seen as one of the types it embeds (or extends).
    pub fn embedded(&self, ty: TypeId) -> Result<AType, ErrorKind> {
        if self.ty == Some(ty) {
            return Ok(*self);
        }
        if self.of_type.is_some() {
            return Err(ErrorKind::TypeNotEmbedding);
        }
        Ok(AType {
            ty: Some(ty),
            ..*self
        })
    }

    pub fn display(&self, types: &TypeTable) -> String {
        let ty = match self.ty {
            Some(ty) => ty,
            None => return "NONE".to_owned(),
        };
        let mut text = types.name(ty).to_owned();
        if let Some(alloc) = self.alloc {
            text.push_str(&format!("(alloc={})", alloc.0));
        }
        match self.variant {
            Variant::None => {}
            Variant::Local(offset) => text.push_str(&format!("(variant={})", offset)),
            Variant::Site(addr) => text.push_str(&format!("(variant=@{})", addr)),
        }
        if self.constant {
            text.push_str("(const)");
        }
        if let Some(of_type) = self.of_type {
            text.push_str(&format!("(type={})", types.name(of_type)));
        }
        text
    }
}

// Uninitialized sorts first, then type, allocation site, variant, constant (constant first) and
// reflected type.
impl Ord for AType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ty
            .cmp(&other.ty)
            .then(self.alloc.cmp(&other.alloc))
            .then(self.variant.cmp(&other.variant))
            .then(other.constant.cmp(&self.constant))
            .then(self.of_type.cmp(&other.of_type))
    }
}

impl PartialOrd for AType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order() {
        let instance = InstanceId(3);
        let mut sorted = vec![
            AType::plain(TypeId::I32),
            AType::local(TypeId::I32, instance, Variant::Local(0)),
            AType::constant(TypeId::STRING),
            AType::plain(TypeId::STRING),
            AType::UNINIT,
        ];
        sorted.sort();
        assert_eq!(sorted[0], AType::UNINIT);
        assert_eq!(sorted[1], AType::plain(TypeId::I32));
        assert_eq!(sorted[2].alloc, Some(instance));
        assert_eq!(sorted[3], AType::constant(TypeId::STRING));
        assert_eq!(sorted[4], AType::plain(TypeId::STRING));
    }

    #[test]
    fn embedded_keeps_provenance() {
        let outer = AType::local(TypeId::OBJECT, InstanceId(1), Variant::Local(2));
        let inner = outer.embedded(TypeId::STRING).unwrap();
        assert_eq!(inner.ty, Some(TypeId::STRING));
        assert_eq!(inner.alloc, Some(InstanceId(1)));
        assert_eq!(inner.variant, Variant::Local(2));

        let reflected = AType::type_of_type(TypeId::I32);
        assert_eq!(reflected.embedded(TypeId::TYPE).unwrap(), reflected);
        assert_eq!(
            reflected.embedded(TypeId::OBJECT),
            Err(ErrorKind::TypeNotEmbedding)
        );
    }

    #[test]
    fn display() {
        let types = TypeTable::new();
        assert_eq!(AType::UNINIT.display(&types), "NONE");
        assert_eq!(
            AType::local(TypeId::STRING, InstanceId(4), Variant::Local(1)).display(&types),
            "(std::u8 std::array)(alloc=4)(variant=1)"
        );
        assert_eq!(
            AType::type_of_type(TypeId::BOOL).display(&types),
            "std::type(const)(type=std::bool)"
        );
    }
}
