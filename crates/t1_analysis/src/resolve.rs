use crate::error::ErrorKind;
use std::collections::BTreeSet;
use std::rc::Rc;
use t1_frontend::function::{compare, display_types, FunctionId, Precision, Registration};
use t1_frontend::types::{TypeId, TypeTable};

/// One way a call site may go: the plain types of the stack on entry and the function the call
/// resolves to for them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DCall {
    /// The argument types, top of stack first.
    args: Vec<TypeId>,
    /// Plain types of the elements below the arguments, from the top. Shared by every call made
    /// from the same stack.
    tail: Rc<Vec<BTreeSet<TypeId>>>,
    pub function: FunctionId,
}

impl DCall {
    /// `args` lists the argument types in stack order, the last one being the top of stack.
    pub fn new(args: &[TypeId], tail: Rc<Vec<BTreeSet<TypeId>>>, function: FunctionId) -> Self {
        DCall {
            args: args.iter().rev().copied().collect(),
            tail,
            function,
        }
    }

    pub fn depth(&self) -> usize {
        self.args.len() + self.tail.len()
    }

    /// The plain types the stack element `depth` positions below the top may have.
    pub fn level(&self, depth: usize) -> Option<BTreeSet<TypeId>> {
        if let Some(&ty) = self.args.get(depth) {
            return Some(BTreeSet::from([ty]));
        }
        self.tail.get(depth - self.args.len()).cloned()
    }
}

/// Picks the single most precise registration accepting `args` (the last one being the top of
/// stack).
pub fn resolve(
    types: &TypeTable,
    name: &str,
    registrations: &[&Registration],
    args: &[TypeId],
) -> Result<FunctionId, ErrorKind> {
    let mut best: Vec<&Registration> = Vec::new();
    for &reg in registrations {
        if !reg.matches(types, args) {
            continue;
        }

        let mut dominated = false;
        best.retain(
            |&other| match compare(types, &reg.params, &other.params) {
                Precision::MorePrecise => false,
                Precision::LessPrecise => {
                    dominated = true;
                    true
                }
                Precision::Same | Precision::Incomparable => true,
            },
        );
        if !dominated && best.iter().all(|other| other.function != reg.function) {
            best.push(reg);
        }
    }

    match best.as_slice() {
        [reg] => Ok(reg.function),
        [] => Err(ErrorKind::NoMatchingFunction {
            name: name.to_owned(),
            types: display_types(types, args),
        }),
        candidates => Err(ErrorKind::AmbiguousCall {
            name: name.to_owned(),
            types: display_types(types, args),
            candidates: candidates
                .iter()
                .map(|reg| display_types(types, &reg.params))
                .collect(),
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn reg(params: &[TypeId], function: usize) -> Registration {
        Registration {
            params: params.to_vec(),
            function: FunctionId(function),
            immediate: false,
        }
    }

    #[test]
    fn most_precise_registration_wins() {
        let types = TypeTable::new();
        let regs = [reg(&[TypeId::I32], 0), reg(&[TypeId::OBJECT], 1)];
        let regs: Vec<&Registration> = regs.iter().collect();

        assert_eq!(
            resolve(&types, "def::foo", &regs, &[TypeId::I32]),
            Ok(FunctionId(0))
        );
        assert_eq!(
            resolve(&types, "def::foo", &regs, &[TypeId::STRING]),
            Ok(FunctionId(1))
        );

        // Registration order does not matter.
        let reversed: Vec<&Registration> = regs.iter().rev().copied().collect();
        assert_eq!(
            resolve(&types, "def::foo", &reversed, &[TypeId::I32]),
            Ok(FunctionId(0))
        );
    }

    #[test]
    fn crossed_signatures_are_ambiguous() {
        let types = TypeTable::new();
        let regs = [
            reg(&[TypeId::I32, TypeId::OBJECT], 0),
            reg(&[TypeId::OBJECT, TypeId::I32], 1),
        ];
        let regs: Vec<&Registration> = regs.iter().collect();

        let err = resolve(&types, "def::foo", &regs, &[TypeId::I32, TypeId::I32]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "multiple matching function for call def::foo on: std::i32 std::i32\
             \n   std::i32 std::object\n   std::object std::i32"
        );
        assert_eq!(
            resolve(&types, "def::foo", &regs, &[TypeId::I32, TypeId::BOOL]),
            Ok(FunctionId(0))
        );
        assert!(matches!(
            resolve(&types, "def::foo", &regs, &[TypeId::BOOL, TypeId::BOOL]),
            Err(ErrorKind::NoMatchingFunction { .. })
        ));
    }

    #[test]
    fn call_levels() {
        let tail = Rc::new(vec![BTreeSet::from([TypeId::INT, TypeId::STRING])]);
        let call = DCall::new(&[TypeId::BOOL, TypeId::I32], tail, FunctionId(3));
        assert_eq!(call.depth(), 3);
        assert_eq!(call.level(0), Some(BTreeSet::from([TypeId::I32])));
        assert_eq!(call.level(1), Some(BTreeSet::from([TypeId::BOOL])));
        assert_eq!(call.level(2).map(|level| level.len()), Some(2));
        assert_eq!(call.level(3), None);
    }
}
