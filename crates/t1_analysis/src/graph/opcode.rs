use super::{descends, Graph, InstanceId, NodeId, NodeKind, OpcodeNode};
use crate::atype::{AType, Variant};
use crate::error::ErrorKind;
use crate::locals::LocalState;
use crate::resolve::{resolve, DCall};
use crate::stack::Stack;
use crate::type_set::{ComboEnumerator, TypeSet};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use t1_frontend::function::{display_types, FunctionId, Registration};
use t1_frontend::opcode::Opcode;
use t1_frontend::types::TypeId;

impl<'a> Graph<'a> {
    fn opcode_node(&mut self, id: NodeId) -> Option<&mut OpcodeNode> {
        match &mut self.nodes[id].kind {
            NodeKind::Opcode(op) => Some(op),
            _ => None,
        }
    }

    fn propagate(
        &mut self,
        instance: InstanceId,
        addr: usize,
        stack: Stack,
        locals: &LocalState,
    ) -> Result<NodeId, ErrorKind> {
        let target = self.node_at(instance, addr);
        self.merge_stack(target, stack)?;
        self.merge_locals(target, locals)?;
        Ok(target)
    }

    fn propagate_next(
        &mut self,
        id: NodeId,
        stack: Stack,
        locals: &LocalState,
    ) -> Result<(), ErrorKind> {
        let (instance, addr) = self.position(id);
        let next = self.propagate(instance, addr + 1, stack, locals)?;
        if let Some(op) = self.opcode_node(id) {
            op.next = Some(next);
        }
        Ok(())
    }

    fn propagate_branch(
        &mut self,
        id: NodeId,
        target: usize,
        stack: Stack,
        locals: &LocalState,
    ) -> Result<(), ErrorKind> {
        let (instance, _) = self.position(id);
        let branch = self.propagate(instance, target, stack, locals)?;
        if let Some(op) = self.opcode_node(id) {
            op.branch = Some(branch);
        }
        Ok(())
    }

    fn position(&self, id: NodeId) -> (InstanceId, usize) {
        match &self.nodes[id].kind {
            NodeKind::Opcode(op) => (op.instance, op.addr),
            _ => unreachable!("node {} is not an opcode node", id.0),
        }
    }

    fn check_int(&self, stack: Stack, depth: usize) -> Result<(), ErrorKind> {
        self.stacks
            .peek(stack, depth)?
            .check_exact(&self.program.types, TypeId::INT)
    }

    pub(super) fn evaluate_opcode(&mut self, id: NodeId, stack: Stack) -> Result<(), ErrorKind> {
        let (instance, addr) = self.position(id);
        let locals = match self.nodes[id].opcode().and_then(|op| op.locals.clone()) {
            Some(locals) => locals,
            None => return Ok(()),
        };
        let function = match self.interpreted(instance) {
            Some(function) => function,
            None => return Ok(()),
        };
        let program = self.program;
        let types = &program.types;

        let op = &function.code[addr];
        match op {
            Opcode::Const(value) => {
                let ty = value.type_id();
                let atype = if value.is_basic() {
                    AType::plain(ty)
                } else {
                    AType::constant(ty)
                };
                self.constants.add_value(value);
                let next = self.stacks.push(stack, TypeSet::singleton(atype));
                self.propagate_next(id, next, &locals)
            }

            Opcode::GetLocal { offset } => {
                let value = locals.get(function.slot(*offset))?.clone();
                let next = self.stacks.push(stack, value);
                self.propagate_next(id, next, &locals)
            }

            Opcode::GetLocalIndexed { offset, .. } => {
                self.check_int(stack, 0)?;
                let value = locals.get(function.slot(*offset))?.clone();
                let popped = self.stacks.pop(stack)?;
                let next = self.stacks.push(popped, value);
                self.propagate_next(id, next, &locals)
            }

            Opcode::PutLocal { offset, ty } => {
                let value = self.stacks.peek(stack, 0)?.clone();
                if let Some(ty) = ty {
                    value.check_sub_type_of(types, *ty)?;
                }
                let new_locals = locals.set(function.slot(*offset), &value);
                let next = self.stacks.pop(stack)?;
                self.propagate_next(id, next, &new_locals)
            }

            Opcode::PutLocalIndexed { offset, ty, .. } => {
                self.check_int(stack, 0)?;
                let value = self.stacks.peek(stack, 1)?.clone();
                if let Some(ty) = ty {
                    value.check_sub_type_of(types, *ty)?;
                }
                let new_locals = locals.set(function.slot(*offset), &value);
                let next = self.stacks.pop_n(stack, 2)?;
                self.propagate_next(id, next, &new_locals)
            }

            Opcode::RefLocal { offset } => {
                let ty = function.embed_types[*offset];
                let atype = AType::local(ty, instance, Variant::Local(*offset));
                let next = self.stacks.push(stack, TypeSet::singleton(atype));
                self.propagate_next(id, next, &locals)
            }

            Opcode::RefLocalIndexed { offset, .. } => {
                self.check_int(stack, 0)?;
                let ty = function.embed_types[*offset];
                let atype = AType::local(ty, instance, Variant::Local(*offset));
                let popped = self.stacks.pop(stack)?;
                let next = self.stacks.push(popped, TypeSet::singleton(atype));
                self.propagate_next(id, next, &locals)
            }

            Opcode::Call(name) => self.do_call(id, name, stack, &locals),

            Opcode::JumpIf(_) | Opcode::JumpIfNot(_) => {
                self.stacks
                    .peek(stack, 0)?
                    .check_exact(types, TypeId::BOOL)?;
                let next = self.stacks.pop(stack)?;
                self.propagate_next(id, next, &locals)?;
                match op.jump_target(addr) {
                    Some(target) => self.propagate_branch(id, target, next, &locals),
                    None => Ok(()),
                }
            }

            Opcode::Jump(_) => match op.jump_target(addr) {
                Some(target) => self.propagate_branch(id, target, stack, &locals),
                None => Ok(()),
            },

            Opcode::Ret => {
                for set in self.stacks.iter_from_top(stack) {
                    for atype in set.iter() {
                        if let Some(alloc) = atype.alloc {
                            if descends(&self.instances, alloc, instance) {
                                return Err(ErrorKind::EscapeThroughReturn {
                                    value: atype.display(types),
                                    function: function.name.clone(),
                                });
                            }
                        }
                    }
                }
                let continuation = self.instances[instance].continuation;
                self.merge_stack(continuation, stack)
            }
        }
    }

    fn do_call(
        &mut self,
        id: NodeId,
        name: &str,
        stack: Stack,
        locals: &LocalState,
    ) -> Result<(), ErrorKind> {
        let program = self.program;
        let types = &program.types;
        let (instance, addr) = self.position(id);

        // The callee cannot change our locals; the stack arrives when (if) it returns.
        let next = self.node_at(instance, addr + 1);
        self.merge_locals(next, locals)?;
        if let Some(op) = self.opcode_node(id) {
            op.next = Some(next);
        }

        let registrations = program.functions.lookup_all(name);
        if registrations.is_empty() {
            return Err(ErrorKind::NoSuchFunction(name.to_owned()));
        }
        let candidates: Vec<&Registration> = registrations
            .iter()
            .filter(|reg| self.stacks.may_match(types, stack, &reg.params))
            .collect();
        if candidates.is_empty() {
            let arity = registrations
                .iter()
                .map(|reg| reg.params.len())
                .max()
                .unwrap_or(0)
                .min(self.stacks.depth(stack));
            let mut sets: Vec<String> = self
                .stacks
                .iter_from_top(stack)
                .take(arity)
                .map(|set| set.display(types))
                .collect();
            sets.reverse();
            return Err(ErrorKind::NoMatchingFunction {
                name: name.to_owned(),
                types: sets.join(" "),
            });
        }
        let max_num = candidates
            .iter()
            .map(|reg| reg.params.len())
            .max()
            .unwrap_or(0);

        let top = self.stacks.top_elements(stack, max_num)?;
        let root = self.stacks.pop_n(stack, max_num)?;
        let tail: Rc<Vec<BTreeSet<TypeId>>> = Rc::new(
            self.stacks
                .iter_from_top(root)
                .map(|set| set.plain_types().collect())
                .collect(),
        );

        let mut targets: BTreeMap<FunctionId, Stack> = BTreeMap::new();
        let mut calls = Vec::new();
        for combo in ComboEnumerator::new(&top) {
            let args: Vec<TypeId> = combo
                .iter()
                .map(|atype| atype.ty.unwrap_or(TypeId::OBJECT))
                .collect();
            let function = resolve(types, name, &candidates, &args).map_err(|err| match err {
                ErrorKind::NoMatchingFunction { name, .. } => ErrorKind::NoMatchingFunction {
                    name,
                    types: display_types(types, &args),
                },
                other => other,
            })?;
            let entry_stack = self
                .stacks
                .push_all(root, combo.iter().map(|&atype| TypeSet::singleton(atype)));
            let merged = match targets.get(&function) {
                Some(&old) => self.stacks.merge(types, old, entry_stack)?,
                None => entry_stack,
            };
            targets.insert(function, merged);
            calls.push(DCall::new(&args, tail.clone(), function));
        }

        let known = match self.opcode_node(id) {
            Some(op) => {
                op.calls = calls;
                op.dispatch.clone()
            }
            None => BTreeMap::new(),
        };
        for (function, entry_stack) in targets {
            match known.get(&function) {
                Some(&callee) => self.merge_stack(callee, entry_stack)?,
                None => {
                    let callee = self.enter(
                        function,
                        entry_stack,
                        Some(instance),
                        next,
                        Some((instance, addr)),
                    )?;
                    if let Some(op) = self.opcode_node(id) {
                        op.dispatch.insert(function, callee);
                    }
                }
            }
        }
        Ok(())
    }
}
