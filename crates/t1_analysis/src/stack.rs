use crate::error::ErrorKind;
use crate::type_set::TypeSet;
use id_collections::{id_type, IdVec};
use t1_frontend::types::{TypeId, TypeTable};

#[id_type]
pub struct StackEltId(pub usize);

#[derive(Clone, Debug)]
struct StackElt {
    set: TypeSet,
    below: Option<StackEltId>,
    /// Depth from the bottom of the stack.
    rank: usize,
}

/// Handle to an immutable abstract operand stack. Stacks live in a [`StackArena`] and share their
/// lower elements, so equal handles always denote equal stacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Stack {
    tos: Option<StackEltId>,
}

impl Stack {
    pub const EMPTY: Stack = Stack { tos: None };

    pub fn is_empty(self) -> bool {
        self.tos.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct StackArena {
    elts: IdVec<StackEltId, StackElt>,
}

impl StackArena {
    pub fn new() -> Self {
        StackArena { elts: IdVec::new() }
    }

    /// Number of elements ever allocated.
    pub fn len(&self) -> usize {
        self.elts.len()
    }

    pub fn depth(&self, stack: Stack) -> usize {
        stack.tos.map_or(0, |tos| self.elts[tos].rank + 1)
    }

    fn elt(&self, stack: Stack, depth: usize) -> Result<&StackElt, ErrorKind> {
        let mut cur = stack.tos;
        for _ in 0..depth {
            cur = cur.and_then(|id| self.elts[id].below);
        }
        cur.map(|id| &self.elts[id])
            .ok_or(ErrorKind::StackUnderflow)
    }

    /// The element `depth` positions below the top.
    pub fn peek(&self, stack: Stack, depth: usize) -> Result<&TypeSet, ErrorKind> {
        self.elt(stack, depth).map(|elt| &elt.set)
    }

    pub fn push(&mut self, stack: Stack, set: TypeSet) -> Stack {
        let rank = self.depth(stack);
        let id = self.elts.push(StackElt {
            set,
            below: stack.tos,
            rank,
        });
        Stack { tos: Some(id) }
    }

    /// Pushes every set in order, the last one ending on top.
    pub fn push_all(&mut self, stack: Stack, sets: impl IntoIterator<Item = TypeSet>) -> Stack {
        sets.into_iter()
            .fold(stack, |stack, set| self.push(stack, set))
    }

    pub fn pop(&self, stack: Stack) -> Result<Stack, ErrorKind> {
        self.pop_n(stack, 1)
    }

    pub fn pop_n(&self, stack: Stack, num: usize) -> Result<Stack, ErrorKind> {
        if num == 0 {
            return Ok(stack);
        }
        let elt = self.elt(stack, num - 1)?;
        Ok(Stack { tos: elt.below })
    }

    pub fn iter_from_top(&self, stack: Stack) -> impl Iterator<Item = &TypeSet> + '_ {
        let mut cur = stack.tos;
        std::iter::from_fn(move || {
            let elt = &self.elts[cur?];
            cur = elt.below;
            Some(&elt.set)
        })
    }

    /// The topmost `num` elements; the last one is the top of the stack.
    pub fn top_elements(&self, stack: Stack, num: usize) -> Result<Vec<TypeSet>, ErrorKind> {
        if num > self.depth(stack) {
            return Err(ErrorKind::StackUnderflow);
        }
        let mut sets: Vec<TypeSet> = self.iter_from_top(stack).take(num).cloned().collect();
        sets.reverse();
        Ok(sets)
    }

    /// True if some combination of the topmost elements is made of sub-types of `params`, the
    /// last parameter matching the top of the stack.
    pub fn may_match(&self, types: &TypeTable, stack: Stack, params: &[TypeId]) -> bool {
        if params.len() > self.depth(stack) {
            return false;
        }
        params
            .iter()
            .rev()
            .zip(self.iter_from_top(stack))
            .all(|(&param, set)| set.contains_sub_type_of(types, param))
    }

    /// Requires every value of the topmost elements to be a sub-type of the matching parameter.
    pub fn check_multiple_sub_type_of(
        &self,
        types: &TypeTable,
        stack: Stack,
        params: &[TypeId],
    ) -> Result<(), ErrorKind> {
        if params.len() > self.depth(stack) {
            return Err(ErrorKind::StackUnderflow);
        }
        for (&param, set) in params.iter().rev().zip(self.iter_from_top(stack)) {
            set.check_sub_type_of(types, param)?;
        }
        Ok(())
    }

    /// Element-wise union of two stacks of the same depth. Elements below the deepest point where
    /// both stacks agree are shared with `a`. Returns `a` itself when it already contains `b`, and
    /// `b` when `b` contains `a`.
    pub fn merge(&mut self, types: &TypeTable, a: Stack, b: Stack) -> Result<Stack, ErrorKind> {
        if a == b {
            return Ok(a);
        }
        let (depth_a, depth_b) = (self.depth(a), self.depth(b));
        if depth_a != depth_b {
            return Err(ErrorKind::StackDepthMismatch(depth_a, depth_b));
        }

        // Pairs of elements above the shared part, from the top.
        let mut divergent: Vec<(StackEltId, StackEltId)> = Vec::new();
        let (mut cur_a, mut cur_b) = (a.tos, b.tos);
        while let (Some(ea), Some(eb)) = (cur_a, cur_b) {
            if ea == eb {
                break;
            }
            divergent.push((ea, eb));
            cur_a = self.elts[ea].below;
            cur_b = self.elts[eb].below;
        }

        // Extend the shared part with equal elements, keeping those of `a`.
        let mut root = cur_a;
        while let Some(&(ea, eb)) = divergent.last() {
            if self.elts[ea].set != self.elts[eb].set {
                break;
            }
            root = Some(ea);
            divergent.pop();
        }

        let mut a_holds_b = true;
        let mut b_holds_a = true;
        for &(ea, eb) in &divergent {
            let (sa, sb) = (&self.elts[ea].set, &self.elts[eb].set);
            a_holds_b &= sb.is_subset_of(sa);
            b_holds_a &= sa.is_subset_of(sb);
        }
        if a_holds_b {
            return Ok(a);
        }
        if b_holds_a {
            return Ok(b);
        }

        let mut merged = Stack { tos: root };
        for &(ea, eb) in divergent.iter().rev() {
            let set = self.elts[ea].set.merge(types, &self.elts[eb].set)?;
            merged = self.push(merged, set);
        }
        Ok(merged)
    }

    pub fn display(&self, types: &TypeTable, stack: Stack) -> String {
        let mut sets: Vec<String> = self
            .iter_from_top(stack)
            .map(|set| set.display(types))
            .collect();
        sets.reverse();
        sets.join(" ")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn plain(ty: TypeId) -> TypeSet {
        TypeSet::plain(ty)
    }

    #[test]
    fn push_pop_peek() {
        let mut arena = StackArena::new();
        let s = arena.push_all(Stack::EMPTY, [plain(TypeId::INT), plain(TypeId::BOOL)]);
        assert_eq!(arena.depth(s), 2);
        assert_eq!(arena.peek(s, 0).unwrap(), &plain(TypeId::BOOL));
        assert_eq!(arena.peek(s, 1).unwrap(), &plain(TypeId::INT));
        assert_eq!(arena.peek(s, 2), Err(ErrorKind::StackUnderflow));
        assert_eq!(arena.pop_n(s, 2).unwrap(), Stack::EMPTY);
        assert_eq!(arena.pop_n(s, 3), Err(ErrorKind::StackUnderflow));

        let top = arena.top_elements(s, 2).unwrap();
        assert_eq!(top, vec![plain(TypeId::INT), plain(TypeId::BOOL)]);
        assert_eq!(arena.display(&TypeTable::new(), s), "<std::int> <std::bool>");
    }

    #[test]
    fn matching_uses_top_of_stack() {
        let types = TypeTable::new();
        let mut arena = StackArena::new();
        let either = plain(TypeId::INT)
            .merge(&types, &plain(TypeId::STRING))
            .unwrap();
        let s = arena.push_all(Stack::EMPTY, [plain(TypeId::I32), either]);

        assert!(arena.may_match(&types, s, &[TypeId::I32, TypeId::INT]));
        assert!(arena.may_match(&types, s, &[TypeId::STRING]));
        assert!(!arena.may_match(&types, s, &[TypeId::BOOL]));
        assert!(!arena.may_match(&types, s, &[TypeId::OBJECT; 3]));

        assert!(arena
            .check_multiple_sub_type_of(&types, s, &[TypeId::I32, TypeId::OBJECT])
            .is_ok());
        assert!(matches!(
            arena.check_multiple_sub_type_of(&types, s, &[TypeId::INT]),
            Err(ErrorKind::UnexpectedType { .. })
        ));
    }

    #[test]
    fn merge_shares_common_suffix() {
        let types = TypeTable::new();
        let mut arena = StackArena::new();
        let base = arena.push_all(Stack::EMPTY, [plain(TypeId::OBJECT), plain(TypeId::I32)]);
        let a = arena.push_all(base, [plain(TypeId::BOOL), plain(TypeId::INT)]);
        let b = arena.push_all(base, [plain(TypeId::BOOL), plain(TypeId::STRING)]);

        let merged = arena.merge(&types, a, b).unwrap();
        assert_eq!(arena.depth(merged), 4);
        // The equal element right above the shared base is taken from `a`.
        assert_eq!(arena.pop(merged).unwrap(), arena.pop(a).unwrap());
        assert_eq!(arena.pop_n(merged, 2).unwrap(), base);
        assert_eq!(arena.peek(merged, 0).unwrap().len(), 2);

        assert_eq!(arena.merge(&types, merged, a).unwrap(), merged);
        assert_eq!(arena.merge(&types, b, merged).unwrap(), merged);
        assert_eq!(arena.merge(&types, a, a).unwrap(), a);

        let copy = arena.push_all(base, [plain(TypeId::BOOL), plain(TypeId::INT)]);
        assert_eq!(arena.merge(&types, a, copy).unwrap(), a);
    }

    #[test]
    fn merge_failures() {
        let types = TypeTable::new();
        let mut arena = StackArena::new();
        let short = arena.push(Stack::EMPTY, plain(TypeId::INT));
        let long = arena.push(short, plain(TypeId::INT));
        assert_eq!(
            arena.merge(&types, short, long),
            Err(ErrorKind::StackDepthMismatch(1, 2))
        );

        let u8_ = arena.push(short, plain(TypeId::U8));
        assert!(matches!(
            arena.merge(&types, u8_, long),
            Err(ErrorKind::ForbiddenMerge(..))
        ));
    }
}
