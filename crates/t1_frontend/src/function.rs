use crate::error::ErrorKind;
use crate::opcode::InterpretedFunction;
use crate::types::{TypeId, TypeTable};
use id_collections::{id_type, IdVec};
use std::collections::BTreeMap;

#[id_type]
pub struct FunctionId(pub usize);

/// Native accessors generated for type elements and array types. Field slots index the owner's
/// field store; embed accessors carry the embedded element type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessorKind {
    FieldGet { slot: usize },
    FieldPut { slot: usize },
    FieldClear,
    FieldTest,
    EmbedRef { ty: TypeId },
    FieldArrayGet { slot: usize },
    FieldArrayPut { slot: usize },
    FieldArrayClear,
    FieldArrayTest,
    EmbedArrayRef { ty: TypeId },
    ArrayMake,
    ArraySub,
    ArraySubSelf,
    ArrayIsInit,
    ArrayLength,
    ArrayGet,
    ArrayPut,
    ArrayClear,
    ArrayIsEltInit,
    ArrayRef,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeOp {
    /// Pops values of the parameter types and pushes values of the result types.
    Typed {
        params: Vec<TypeId>,
        results: Vec<TypeId>,
    },
    Dup,
    Swap,
    Over,
    Rot,
    NRot,
    /// Pushes the reflected value of a type.
    TypeOf(TypeId),
    New,
    Accessor {
        owner: TypeId,
        kind: AccessorKind,
    },
    /// Only meaningful to an interpreter; refuses compilation.
    InterpreterOnly,
}

#[derive(Clone, Debug)]
pub enum FunctionKind {
    Interpreted(InterpretedFunction),
    Native(NativeOp),
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub params: Vec<TypeId>,
    pub function: FunctionId,
    pub immediate: bool,
}

impl Registration {
    /// True if the topmost `params.len()` types (the last one being the top of stack) are
    /// sub-types of the parameters.
    pub fn matches(&self, types: &TypeTable, args: &[TypeId]) -> bool {
        if self.params.len() > args.len() {
            return false;
        }
        self.params
            .iter()
            .rev()
            .zip(args.iter().rev())
            .all(|(&param, &arg)| types.is_sub_type_of(arg, param))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    Same,
    MorePrecise,
    LessPrecise,
    Incomparable,
}

/// Compares two parameter lists pairwise from the end. When the common part does not decide
/// otherwise, the shorter list is the more precise one.
pub fn compare(types: &TypeTable, a: &[TypeId], b: &[TypeId]) -> Precision {
    fn combine(result: &mut Precision, dir: Precision) -> bool {
        if *result == Precision::Same {
            *result = dir;
            true
        } else {
            *result == dir
        }
    }

    let mut result = Precision::Same;
    for (&ta, &tb) in a.iter().rev().zip(b.iter().rev()) {
        let dir = match (types.is_sub_type_of(ta, tb), types.is_sub_type_of(tb, ta)) {
            (true, true) => continue,
            (true, false) => Precision::MorePrecise,
            (false, true) => Precision::LessPrecise,
            (false, false) => return Precision::Incomparable,
        };
        if !combine(&mut result, dir) {
            return Precision::Incomparable;
        }
    }

    let by_length = match a.len().cmp(&b.len()) {
        std::cmp::Ordering::Less => Precision::MorePrecise,
        std::cmp::Ordering::Greater => Precision::LessPrecise,
        std::cmp::Ordering::Equal => return result,
    };
    if combine(&mut result, by_length) {
        result
    } else {
        Precision::Incomparable
    }
}

pub fn display_types(types: &TypeTable, list: &[TypeId]) -> String {
    if list.is_empty() {
        return "<>".to_owned();
    }
    list.iter()
        .map(|&ty| types.name(ty))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Clone, Debug)]
pub struct FunctionTable {
    functions: IdVec<FunctionId, Function>,
    by_name: BTreeMap<String, Vec<Registration>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        FunctionTable {
            functions: IdVec::new(),
            by_name: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, function: Function) -> FunctionId {
        self.functions.push(function)
    }

    pub fn get(&self, id: FunctionId) -> &Function {
        &self.functions[id]
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.functions.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(|name| name.as_str())
    }

    pub fn register(
        &mut self,
        types: &TypeTable,
        name: &str,
        params: Vec<TypeId>,
        function: FunctionId,
    ) -> Result<(), ErrorKind> {
        let registrations = self.by_name.entry(name.to_owned()).or_default();
        if registrations
            .iter()
            .any(|reg| compare(types, &reg.params, &params) == Precision::Same)
        {
            return Err(ErrorKind::DuplicateRegistration {
                name: name.to_owned(),
                types: display_types(types, &params),
            });
        }
        registrations.push(Registration {
            params,
            function,
            immediate: false,
        });
        Ok(())
    }

    pub fn register_immediate(
        &mut self,
        name: &str,
        function: FunctionId,
    ) -> Result<(), ErrorKind> {
        let registrations = self.by_name.entry(name.to_owned()).or_default();
        if registrations.iter().any(|reg| reg.params.is_empty()) {
            return Err(ErrorKind::DuplicateImmediate(name.to_owned()));
        }
        registrations.push(Registration {
            params: Vec::new(),
            function,
            immediate: true,
        });
        Ok(())
    }

    pub fn lookup_all(&self, name: &str) -> &[Registration] {
        self.by_name
            .get(name)
            .map(|regs| regs.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn lookup_no_args(&self, name: &str) -> Option<FunctionId> {
        self.lookup_all(name)
            .iter()
            .find(|reg| reg.params.is_empty())
            .map(|reg| reg.function)
    }

    pub fn lookup_immediate(&self, name: &str) -> Option<FunctionId> {
        self.lookup_all(name)
            .iter()
            .find(|reg| reg.immediate)
            .map(|reg| reg.function)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn native(table: &mut FunctionTable, name: &str) -> FunctionId {
        table.add(Function {
            name: name.to_owned(),
            kind: FunctionKind::Native(NativeOp::InterpreterOnly),
        })
    }

    #[test]
    fn precision_order() {
        let types = TypeTable::new();
        let i32_ = TypeId::I32;
        let obj = TypeId::OBJECT;

        assert_eq!(compare(&types, &[i32_], &[obj]), Precision::MorePrecise);
        assert_eq!(compare(&types, &[obj], &[i32_]), Precision::LessPrecise);
        assert_eq!(compare(&types, &[i32_, obj], &[i32_, obj]), Precision::Same);
        assert_eq!(
            compare(&types, &[i32_, obj], &[obj, i32_]),
            Precision::Incomparable
        );
        assert_eq!(
            compare(&types, &[TypeId::U8], &[TypeId::I8]),
            Precision::Incomparable
        );

        // The shorter list wins when the common suffix agrees.
        assert_eq!(compare(&types, &[obj], &[obj, obj]), Precision::MorePrecise);
        assert_eq!(compare(&types, &[obj, i32_], &[i32_]), Precision::LessPrecise);
        // ... but not against a contrary decision.
        assert_eq!(compare(&types, &[obj], &[obj, i32_]), Precision::Incomparable);
        assert_eq!(compare(&types, &[i32_], &[obj, obj]), Precision::MorePrecise);
    }

    #[test]
    fn duplicate_registrations_are_rejected() {
        let types = TypeTable::new();
        let mut table = FunctionTable::new();
        let f = native(&mut table, "def::foo");
        let g = native(&mut table, "def::foo");

        table
            .register(&types, "def::foo", vec![TypeId::I32], f)
            .unwrap();
        table
            .register(&types, "def::foo", vec![TypeId::OBJECT], g)
            .unwrap();
        let err = table
            .register(&types, "def::foo", vec![TypeId::I32], g)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "duplicate registration for function def::foo with types: std::i32"
        );
        assert_eq!(table.lookup_all("def::foo").len(), 2);
        assert_eq!(table.lookup_no_args("def::foo"), None);
        assert!(table.lookup_all("def::bar").is_empty());
    }

    #[test]
    fn immediates() {
        let types = TypeTable::new();
        let mut table = FunctionTable::new();
        let f = native(&mut table, "def::m");
        table.register_immediate("def::m", f).unwrap();
        assert_eq!(table.lookup_immediate("def::m"), Some(f));
        assert_eq!(table.lookup_no_args("def::m"), Some(f));
        assert!(matches!(
            table.register_immediate("def::m", f),
            Err(ErrorKind::DuplicateImmediate(_))
        ));
        assert!(table.register(&types, "def::m", vec![], f).is_err());
    }

    #[test]
    fn registration_matching_uses_top_of_stack() {
        let types = TypeTable::new();
        let reg = Registration {
            params: vec![TypeId::INT, TypeId::OBJECT],
            function: FunctionId(0),
            immediate: false,
        };
        assert!(reg.matches(&types, &[TypeId::BOOL, TypeId::INT, TypeId::STRING]));
        assert!(!reg.matches(&types, &[TypeId::STRING, TypeId::INT]));
        assert!(!reg.matches(&types, &[TypeId::INT]));
    }
}
