use super::{descends, Graph, NativeNode, NodeId};
use crate::atype::{AType, Variant};
use crate::constants::AllocationSite;
use crate::error::ErrorKind;
use crate::stack::Stack;
use crate::type_set::TypeSet;
use t1_frontend::function::{AccessorKind, FunctionKind, NativeOp};
use t1_frontend::types::{Extends, TypeId, TypeTable};

/// Requires every value of a set to reach the layout of `owner`.
fn check_extends(types: &TypeTable, set: &TypeSet, owner: TypeId) -> Result<(), ErrorKind> {
    for atype in set.iter() {
        let failure = match atype.ty.map(|ty| types.extends(ty, owner)) {
            Some(Extends::Itself) | Some(Extends::Through(_)) => continue,
            Some(Extends::Ambiguous) => ErrorKind::AmbiguousExtension {
                owner: types.name(owner).to_owned(),
                ty: atype.display(types),
            },
            Some(Extends::No) | None => ErrorKind::NotExtended {
                owner: types.name(owner).to_owned(),
                ty: atype.display(types),
            },
        };
        return Err(failure);
    }
    Ok(())
}

/// The union of `f` applied to every value of a set, or `None` when `f` never yields.
fn merge_over(
    types: &TypeTable,
    set: &TypeSet,
    mut f: impl FnMut(&AType) -> Result<Option<TypeSet>, ErrorKind>,
) -> Result<Option<TypeSet>, ErrorKind> {
    let mut acc: Option<TypeSet> = None;
    for atype in set.iter() {
        if let Some(value) = f(atype)? {
            acc = Some(match acc {
                None => value,
                Some(acc) => acc.merge(types, &value)?,
            });
        }
    }
    Ok(acc)
}

impl<'a> Graph<'a> {
    pub(super) fn evaluate_native(
        &mut self,
        id: NodeId,
        native: &NativeNode,
        stack: Stack,
    ) -> Result<(), ErrorKind> {
        let program = self.program;
        let types = &program.types;
        let op = match &program.functions.get(native.function).kind {
            FunctionKind::Native(op) => op,
            FunctionKind::Interpreted(_) => return Ok(()),
        };

        let result = match op {
            NativeOp::Typed { params, results } => {
                self.stacks
                    .check_multiple_sub_type_of(types, stack, params)?;
                let popped = self.stacks.pop_n(stack, params.len())?;
                self.stacks
                    .push_all(popped, results.iter().map(|&ty| TypeSet::plain(ty)))
            }
            NativeOp::Dup => {
                let top = self.stacks.peek(stack, 0)?.clone();
                self.stacks.push(stack, top)
            }
            NativeOp::Over => {
                let second = self.stacks.peek(stack, 1)?.clone();
                self.stacks.push(stack, second)
            }
            NativeOp::Swap => {
                let sets = self.stacks.top_elements(stack, 2)?;
                let root = self.stacks.pop_n(stack, 2)?;
                self.stacks
                    .push_all(root, [sets[1].clone(), sets[0].clone()])
            }
            NativeOp::Rot => {
                let sets = self.stacks.top_elements(stack, 3)?;
                let root = self.stacks.pop_n(stack, 3)?;
                self.stacks.push_all(
                    root,
                    [sets[1].clone(), sets[2].clone(), sets[0].clone()],
                )
            }
            NativeOp::NRot => {
                let sets = self.stacks.top_elements(stack, 3)?;
                let root = self.stacks.pop_n(stack, 3)?;
                self.stacks.push_all(
                    root,
                    [sets[2].clone(), sets[0].clone(), sets[1].clone()],
                )
            }
            NativeOp::TypeOf(ty) => self
                .stacks
                .push(stack, TypeSet::singleton(AType::type_of_type(*ty))),
            NativeOp::New => {
                let instance = self.new_instance(native, stack)?;
                let popped = self.stacks.pop(stack)?;
                self.stacks.push(popped, instance)
            }
            NativeOp::Accessor { owner, kind } => {
                match self.evaluate_accessor(id, *owner, *kind, stack)? {
                    Some(result) => result,
                    None => return Ok(()),
                }
            }
            NativeOp::InterpreterOnly => {
                return Err(ErrorKind::NotCompilable(
                    program.functions.get(native.function).name.clone(),
                ))
            }
        };
        self.merge_stack(native.next, result)
    }

    fn new_instance(&mut self, native: &NativeNode, stack: Stack) -> Result<TypeSet, ErrorKind> {
        let program = self.program;
        let types = &program.types;
        let reflected = self.stacks.peek(stack, 0)?.clone();

        let mut result: Option<TypeSet> = None;
        for atype in reflected.iter() {
            if atype.ty != Some(TypeId::TYPE) {
                return Err(ErrorKind::NewNotType(atype.display(types)));
            }
            let ty = atype.of_type.ok_or(ErrorKind::NewGenericType)?;
            if ty == TypeId::TYPE {
                return Err(ErrorKind::NewTypeInstance);
            }
            if types.get(ty).locked {
                return Err(ErrorKind::NewLockedType(types.name(ty).to_owned()));
            }

            let atype = match native.caller {
                Some((instance, addr)) => {
                    self.constants.add_allocation(
                        AllocationSite {
                            function: self.instances[instance].function,
                            addr,
                        },
                        ty,
                    );
                    AType::local(ty, instance, Variant::Site(addr))
                }
                None => AType::plain(ty),
            };
            let value = TypeSet::singleton(atype);
            result = Some(match result {
                None => value,
                Some(acc) => acc.merge(types, &value)?,
            });
        }
        // Sets are never empty.
        result.ok_or(ErrorKind::StackUnderflow)
    }

    /// Reads a field-store slot for every receiver, registering the node as an observer.
    fn read_slot(
        &mut self,
        id: NodeId,
        owner: TypeId,
        slot: usize,
        receivers: &TypeSet,
    ) -> Result<Option<TypeSet>, ErrorKind> {
        let program = self.program;
        let types = &program.types;
        let store = &mut self.store;
        merge_over(types, receivers, |atype| {
            let key = atype.embedded(owner)?;
            store.register(types, key, slot, id);
            Ok(store.get(types, key, slot))
        })
    }

    fn write_slot(
        &mut self,
        owner: TypeId,
        slot: usize,
        receivers: &TypeSet,
        value: &TypeSet,
    ) -> Result<(), ErrorKind> {
        let program = self.program;
        let types = &program.types;
        let mut woken = Vec::new();
        for atype in receivers.iter() {
            let key = atype.embedded(owner)?;
            let instances = &self.instances;
            woken.extend(self.store.merge(types, key, slot, value, |instance, ancestor| {
                descends(instances, instance, ancestor)
            })?);
        }
        for node in woken {
            self.mark_dirty(node);
        }
        Ok(())
    }

    /// Transfer function of the accessors; `None` when nothing flows to the successor yet.
    fn evaluate_accessor(
        &mut self,
        id: NodeId,
        owner: TypeId,
        kind: AccessorKind,
        stack: Stack,
    ) -> Result<Option<Stack>, ErrorKind> {
        use AccessorKind::*;

        let program = self.program;
        let types = &program.types;
        let receivers = self.stacks.peek(stack, 0)?.clone();
        check_extends(types, &receivers, owner)?;

        let indexed = matches!(
            kind,
            FieldArrayGet { .. }
                | FieldArrayPut { .. }
                | FieldArrayClear
                | FieldArrayTest
                | EmbedArrayRef { .. }
                | ArrayMake
                | ArraySub
                | ArraySubSelf
                | ArrayGet
                | ArrayPut
                | ArrayClear
                | ArrayIsEltInit
                | ArrayRef
        );
        if indexed {
            self.stacks
                .peek(stack, 1)?
                .check_exact(types, TypeId::INT)?;
        }

        let (num_args, pushed) = match kind {
            FieldGet { slot } => (1, self.read_slot(id, owner, slot, &receivers)?),
            FieldArrayGet { slot } => (2, self.read_slot(id, owner, slot, &receivers)?),
            ArrayGet => (2, self.read_slot(id, owner, 0, &receivers)?),

            FieldPut { slot } => {
                let value = self.stacks.peek(stack, 1)?.clone();
                self.write_slot(owner, slot, &receivers, &value)?;
                return self.stacks.pop_n(stack, 2).map(Some);
            }
            FieldArrayPut { slot } => {
                let value = self.stacks.peek(stack, 2)?.clone();
                self.write_slot(owner, slot, &receivers, &value)?;
                return self.stacks.pop_n(stack, 3).map(Some);
            }
            ArrayPut => {
                let value = self.stacks.peek(stack, 2)?.clone();
                self.write_slot(owner, 0, &receivers, &value)?;
                return self.stacks.pop_n(stack, 3).map(Some);
            }

            EmbedRef { ty } | EmbedArrayRef { ty } => {
                let num_args = if indexed { 2 } else { 1 };
                let value = merge_over(types, &receivers, |atype| {
                    Ok(Some(TypeSet::singleton(atype.embedded(ty)?)))
                })?;
                (num_args, value)
            }
            ArrayRef => {
                let element = match types.get(owner).array {
                    Some(info) => info.element,
                    None => owner,
                };
                let value = merge_over(types, &receivers, |atype| {
                    Ok(Some(TypeSet::singleton(atype.embedded(element)?)))
                })?;
                (2, value)
            }

            FieldClear => return self.stacks.pop(stack).map(Some),
            FieldArrayClear | ArrayMake | ArrayClear => {
                return self.stacks.pop_n(stack, 2).map(Some)
            }
            FieldTest | ArrayIsInit => (1, Some(TypeSet::plain(TypeId::BOOL))),
            FieldArrayTest | ArrayIsEltInit => (2, Some(TypeSet::plain(TypeId::BOOL))),
            ArrayLength => (1, Some(TypeSet::plain(TypeId::INT))),

            ArraySubSelf => {
                self.stacks
                    .peek(stack, 2)?
                    .check_exact(types, TypeId::INT)?;
                return self.stacks.pop_n(stack, 3).map(Some);
            }
            ArraySub => {
                // Source array below the destination, then the two bounds.
                let source = self.stacks.peek(stack, 1)?;
                check_extends(types, source, owner)?;
                for depth in [2, 3] {
                    self.stacks
                        .peek(stack, depth)?
                        .check_exact(types, TypeId::INT)?;
                }
                return self.stacks.pop_n(stack, 4).map(Some);
            }
        };

        match pushed {
            Some(value) => {
                let popped = self.stacks.pop_n(stack, num_args)?;
                Ok(Some(self.stacks.push(popped, value)))
            }
            None => Ok(None),
        }
    }
}
