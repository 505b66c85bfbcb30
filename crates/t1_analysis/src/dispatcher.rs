use crate::resolve::DCall;
use std::collections::{BTreeMap, BTreeSet};
use t1_frontend::function::FunctionId;
use t1_frontend::types::TypeId;

const STACK_RED_ZONE_BYTES: usize = 256 * 1024;
const STACK_GROW_BYTES: usize = 1024 * 1024;

/// A decision tree selecting the callee of a call site from the dynamic types on the stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DNode {
    Leaf(FunctionId),
    /// Branches on the type of the stack element `depth` positions below the top.
    Branch {
        depth: usize,
        children: BTreeMap<TypeId, DNode>,
    },
}

impl DNode {
    pub fn targets(&self, dest: &mut BTreeSet<FunctionId>) {
        match self {
            DNode::Leaf(function) => {
                dest.insert(*function);
            }
            DNode::Branch { children, .. } => {
                for child in children.values() {
                    child.targets(dest);
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Dispatcher {
    calls: Vec<DCall>,
    root: DNode,
}

fn is_restricted_level(level: &BTreeSet<TypeId>) -> bool {
    level.len() == 1 && level.iter().all(|ty| ty.is_restricted())
}

fn make_node(calls: &[&DCall], depth: usize) -> Option<DNode> {
    stacker::maybe_grow(STACK_RED_ZONE_BYTES, STACK_GROW_BYTES, || {
        let first = calls.first()?.function;
        if calls.iter().all(|call| call.function == first) {
            return Some(DNode::Leaf(first));
        }

        // Restricted values carry no runtime type, so every call must agree on them.
        let mut all: Option<(BTreeSet<TypeId>, bool)> = None;
        let mut levels = Vec::with_capacity(calls.len());
        for call in calls {
            let level = call.level(depth)?;
            let restricted = is_restricted_level(&level);
            match &mut all {
                None => all = Some((level.clone(), restricted)),
                Some((acc, acc_restricted)) => {
                    if restricted || *acc_restricted {
                        if *acc != level {
                            return None;
                        }
                    } else {
                        acc.extend(level.iter().copied());
                    }
                }
            }
            levels.push(level);
        }
        let (all, _) = all?;

        let mut children = BTreeMap::new();
        for ty in all {
            let matching: Vec<&DCall> = calls
                .iter()
                .zip(&levels)
                .filter(|(_, level)| level.contains(&ty))
                .map(|(&call, _)| call)
                .collect();
            children.insert(ty, make_node(&matching, depth + 1)?);
        }
        Some(DNode::Branch { depth, children })
    })
}

impl Dispatcher {
    /// Builds the decision tree for a call site, if the calls can be told apart at run time.
    pub fn make(calls: Vec<DCall>) -> Option<Dispatcher> {
        let refs: Vec<&DCall> = calls.iter().collect();
        let root = make_node(&refs, 0)?;
        Some(Dispatcher { calls, root })
    }

    pub fn merge(&self, other: &Dispatcher) -> Option<Dispatcher> {
        let mut calls = self.calls.clone();
        calls.extend(other.calls.iter().cloned());
        Dispatcher::make(calls)
    }

    pub fn root(&self) -> &DNode {
        &self.root
    }

    pub fn calls(&self) -> &[DCall] {
        &self.calls
    }

    pub fn targets(&self) -> BTreeSet<FunctionId> {
        let mut targets = BTreeSet::new();
        self.root.targets(&mut targets);
        targets
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::rc::Rc;

    fn call(args: &[TypeId], tail: &[&[TypeId]], function: usize) -> DCall {
        let tail = tail
            .iter()
            .map(|level| level.iter().copied().collect())
            .collect();
        DCall::new(args, Rc::new(tail), FunctionId(function))
    }

    #[test]
    fn agreeing_calls_make_a_leaf() {
        let calls = vec![
            call(&[TypeId::INT], &[], 2),
            call(&[TypeId::STRING], &[], 2),
        ];
        let dispatcher = Dispatcher::make(calls).unwrap();
        assert_eq!(dispatcher.root(), &DNode::Leaf(FunctionId(2)));
    }

    #[test]
    fn branches_on_the_first_differing_element() {
        let calls = vec![
            call(&[TypeId::I32, TypeId::INT], &[&[TypeId::BOOL]], 0),
            call(&[TypeId::I32, TypeId::STRING], &[&[TypeId::BOOL]], 1),
        ];
        let dispatcher = Dispatcher::make(calls).unwrap();
        let expected = DNode::Branch {
            depth: 0,
            children: BTreeMap::from([
                (TypeId::INT, DNode::Leaf(FunctionId(0))),
                (TypeId::STRING, DNode::Leaf(FunctionId(1))),
            ]),
        };
        assert_eq!(dispatcher.root(), &expected);
        assert_eq!(
            dispatcher.targets(),
            BTreeSet::from([FunctionId(0), FunctionId(1)])
        );

        // Identical restricted elements are looked through.
        let calls = vec![
            call(&[TypeId::INT, TypeId::I32], &[], 0),
            call(&[TypeId::STRING, TypeId::I32], &[], 1),
        ];
        match Dispatcher::make(calls).unwrap().root() {
            DNode::Branch { depth: 0, children } => {
                assert!(matches!(
                    children.get(&TypeId::I32),
                    Some(DNode::Branch { depth: 1, .. })
                ));
            }
            other => panic!("unexpected dispatcher {:?}", other),
        }
    }

    #[test]
    fn unsolvable_dispatchers() {
        // Restricted values cannot be told apart at run time.
        let calls = vec![call(&[TypeId::I32], &[], 0), call(&[TypeId::U8], &[], 1)];
        assert!(Dispatcher::make(calls).is_none());

        let calls = vec![call(&[TypeId::INT], &[], 0), call(&[TypeId::U8], &[], 1)];
        assert!(Dispatcher::make(calls).is_none());

        // Same shape, different targets: the stack runs out first.
        let calls = vec![call(&[TypeId::INT], &[], 0), call(&[TypeId::INT], &[], 1)];
        assert!(Dispatcher::make(calls).is_none());
    }

    #[test]
    fn merging_rebuilds_from_both_call_lists() {
        let a = Dispatcher::make(vec![call(&[TypeId::INT], &[], 0)]).unwrap();
        let b = Dispatcher::make(vec![call(&[TypeId::STRING], &[], 1)]).unwrap();
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.calls().len(), 2);
        assert_eq!(merged.targets().len(), 2);

        let c = Dispatcher::make(vec![call(&[TypeId::INT], &[], 1)]).unwrap();
        assert!(a.merge(&c).is_none());
    }
}
