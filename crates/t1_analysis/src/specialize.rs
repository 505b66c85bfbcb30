//! Turns the analyzed call tree into specialized functions. Every invocation of an interpreted
//! function yields a candidate body with monomorphic local storage; candidates of the same
//! function are merged whenever their frames and call sites agree.

use crate::dispatcher::Dispatcher;
use crate::error::{Error, ErrorKind};
use crate::graph::{Graph, InstanceId, NodeId, NodeKind, Root};
use id_collections::{id_type, IdVec};
use std::collections::BTreeMap;
use t1_frontend::function::{FunctionId, FunctionKind, NativeOp};
use t1_frontend::opcode::{Constant, Opcode};
use t1_frontend::types::{TypeId, TypeTable};

const STACK_RED_ZONE_BYTES: usize = 256 * 1024;
const STACK_GROW_BYTES: usize = 1024 * 1024;

#[id_type]
pub struct VariantId(pub usize);

/// How a native moves the values it handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Storage {
    Ref,
    /// An unboxed restricted value of the given width.
    Bits(u32),
}

#[derive(Clone, Debug)]
pub enum GOp {
    Const(Constant),
    /// `ty` is the storage type: the restricted type of the slot, or `std::object`.
    GetLocal {
        offset: usize,
        ty: TypeId,
    },
    GetLocalIndexed {
        offset: usize,
        len: usize,
        ty: TypeId,
    },
    PutLocal {
        offset: usize,
        ty: TypeId,
    },
    PutLocalIndexed {
        offset: usize,
        len: usize,
        ty: TypeId,
    },
    RefLocal {
        offset: usize,
        ty: TypeId,
    },
    RefLocalIndexed {
        offset: usize,
        len: usize,
        ty: TypeId,
    },
    Call {
        name: String,
        dispatcher: Dispatcher,
        callees: BTreeMap<FunctionId, VariantId>,
    },
    /// Jumps carry absolute targets.
    JumpIf(usize),
    JumpIfNot(usize),
    Jump(usize),
    Ret,
    Unreachable,
}

/// A local variable or instance of a frame; `len` is set for arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalSlot {
    pub len: Option<usize>,
    pub ty: TypeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Restricted(u32),
    Pointer,
    Instance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutEntry {
    pub kind: SlotKind,
    pub offset: usize,
    pub slot: LocalSlot,
}

/// Local storage of a specialized function, keyed by local offset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub variables: BTreeMap<usize, LocalSlot>,
    pub instances: BTreeMap<usize, LocalSlot>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(
        &mut self,
        types: &TypeTable,
        offset: usize,
        len: Option<usize>,
        ty: TypeId,
    ) -> Result<(), ErrorKind> {
        let old = match self.variables.get(&offset) {
            Some(old) => *old,
            None => {
                self.variables.insert(offset, LocalSlot { len, ty });
                return Ok(());
            }
        };
        if old.len != len {
            return Err(ErrorKind::LocalArrayLengthMismatch);
        }
        let names = || (types.name(ty).to_owned(), types.name(old.ty).to_owned());
        match (ty.is_restricted(), old.ty.is_restricted()) {
            (true, true) if ty != old.ty => {
                let (new, old) = names();
                Err(ErrorKind::LocalStorageSizeMismatch(new, old))
            }
            (true, false) | (false, true) => {
                let (new, old) = names();
                Err(ErrorKind::LocalStorageTypeMismatch(new, old))
            }
            _ => Ok(()),
        }
    }

    pub fn add_instance(
        &mut self,
        offset: usize,
        len: Option<usize>,
        ty: TypeId,
    ) -> Result<(), ErrorKind> {
        match self.instances.get(&offset) {
            Some(old) if old.len != len => Err(ErrorKind::LocalInstanceLengthMismatch),
            Some(_) => Ok(()),
            None => {
                self.instances.insert(offset, LocalSlot { len, ty });
                Ok(())
            }
        }
    }

    pub fn can_merge(&self, other: &Frame) -> bool {
        let variables_agree = other.variables.iter().all(|(offset, b)| {
            match self.variables.get(offset) {
                None => true,
                Some(a) => {
                    let restricted = a.ty.is_restricted() || b.ty.is_restricted();
                    (!restricted || a.ty == b.ty) && a.len == b.len
                }
            }
        });
        let instances_agree = other
            .instances
            .iter()
            .all(|(offset, b)| self.instances.get(offset).map_or(true, |a| a.ty == b.ty));
        variables_agree && instances_agree
    }

    pub fn merge(&mut self, other: &Frame) {
        for (&offset, &slot) in &other.variables {
            self.variables.entry(offset).or_insert(slot);
        }
        for (&offset, &slot) in &other.instances {
            self.instances.entry(offset).or_insert(slot);
        }
    }

    /// Restricted variables by decreasing width, then pointers, then local instances.
    pub fn layout(&self) -> Vec<LayoutEntry> {
        let mut entries = Vec::new();
        for bits in [64, 32, 16, 8] {
            for (&offset, &slot) in &self.variables {
                if slot.ty.bit_size() == Some(bits) {
                    entries.push(LayoutEntry {
                        kind: SlotKind::Restricted(bits),
                        offset,
                        slot,
                    });
                }
            }
        }
        for (&offset, &slot) in &self.variables {
            if !slot.ty.is_restricted() {
                entries.push(LayoutEntry {
                    kind: SlotKind::Pointer,
                    offset,
                    slot,
                });
            }
        }
        for (&offset, &slot) in &self.instances {
            entries.push(LayoutEntry {
                kind: SlotKind::Instance,
                offset,
                slot,
            });
        }
        entries
    }
}

#[derive(Clone, Debug)]
pub enum Body {
    Interpreted { ops: Vec<GOp>, frame: Frame },
    Native(Storage),
}

#[derive(Clone, Debug)]
pub struct SpecializedFunction {
    pub function: FunctionId,
    pub body: Body,
}

/// Merges two call opcodes of the same site, if they can share one body.
fn merge_calls(a: &GOp, b: &GOp) -> Option<GOp> {
    match (a, b) {
        (
            GOp::Call {
                name,
                dispatcher: dispatcher_a,
                callees: callees_a,
            },
            GOp::Call {
                dispatcher: dispatcher_b,
                callees: callees_b,
                ..
            },
        ) => {
            let agree = callees_b
                .iter()
                .all(|(function, b)| callees_a.get(function).map_or(true, |a| a == b));
            if !agree {
                return None;
            }
            let dispatcher = dispatcher_a.merge(dispatcher_b)?;
            let mut callees = callees_a.clone();
            callees.extend(callees_b.iter().map(|(&f, &v)| (f, v)));
            Some(GOp::Call {
                name: name.clone(),
                dispatcher,
                callees,
            })
        }
        _ => None,
    }
}

fn try_merge(ops_a: &[GOp], frame_a: &Frame, ops_b: &[GOp], frame_b: &Frame) -> Option<Body> {
    if ops_a.len() != ops_b.len() || !frame_a.can_merge(frame_b) {
        return None;
    }
    let mut ops = Vec::with_capacity(ops_a.len());
    for (a, b) in ops_a.iter().zip(ops_b) {
        let op = match (a, b) {
            (GOp::Call { .. }, GOp::Call { .. }) => merge_calls(a, b)?,
            (GOp::Unreachable, _) => b.clone(),
            _ => a.clone(),
        };
        ops.push(op);
    }
    let mut frame = frame_a.clone();
    frame.merge(frame_b);
    Some(Body::Interpreted { ops, frame })
}

#[derive(Clone, Debug, Default)]
pub struct SpecializedTable {
    pub functions: IdVec<VariantId, SpecializedFunction>,
    by_function: BTreeMap<FunctionId, Vec<VariantId>>,
    natives: BTreeMap<(FunctionId, Storage), VariantId>,
    /// Entry point names and their variants.
    pub roots: Vec<(String, VariantId)>,
}

impl SpecializedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Every variant of a function, in registration order.
    pub fn variants_of(&self, function: FunctionId) -> &[VariantId] {
        self.by_function
            .get(&function)
            .map(|variants| variants.as_slice())
            .unwrap_or(&[])
    }

    pub fn add_root(&mut self, graph: &Graph, root: &Root) -> Result<VariantId, Error> {
        let variant = self.add_node(graph, root.entry)?;
        self.roots.push((root.name.clone(), variant));
        Ok(variant)
    }

    /// Specializes the function a node enters, along with everything it calls.
    fn add_node(&mut self, graph: &Graph, node: NodeId) -> Result<VariantId, Error> {
        stacker::maybe_grow(STACK_RED_ZONE_BYTES, STACK_GROW_BYTES, || {
            match &graph.nodes[node].kind {
                NodeKind::Opcode(op) => self.add_instance(graph, op.instance),
                NodeKind::Native(native) => {
                    Ok(self.add_native(graph, native.function, graph.nodes[node].stack))
                }
                NodeKind::Exit => unreachable!("the exit node is never called"),
            }
        })
    }

    fn add_native(
        &mut self,
        graph: &Graph,
        function: FunctionId,
        stack: Option<crate::stack::Stack>,
    ) -> VariantId {
        let depth = match &graph.program.functions.get(function).kind {
            FunctionKind::Native(NativeOp::Dup) => Some(0),
            FunctionKind::Native(NativeOp::Over) => Some(1),
            _ => None,
        };
        let storage = depth
            .zip(stack)
            .and_then(|(depth, stack)| graph.stacks.peek(stack, depth).ok())
            .and_then(|set| set.restricted_type())
            .and_then(|ty| ty.bit_size())
            .map_or(Storage::Ref, Storage::Bits);

        if let Some(&variant) = self.natives.get(&(function, storage)) {
            return variant;
        }
        let variant = self.functions.push(SpecializedFunction {
            function,
            body: Body::Native(storage),
        });
        self.natives.insert((function, storage), variant);
        self.by_function.entry(function).or_default().push(variant);
        variant
    }

    fn add_instance(&mut self, graph: &Graph, instance: InstanceId) -> Result<VariantId, Error> {
        let function = graph.instances[instance].function;
        let (ops, frame) = self.specialize_instance(graph, instance)?;

        let variants = self.by_function.entry(function).or_default().clone();
        for variant in variants {
            let merged = match &self.functions[variant].body {
                Body::Interpreted {
                    ops: old_ops,
                    frame: old_frame,
                } => try_merge(old_ops, old_frame, &ops, &frame),
                Body::Native(_) => None,
            };
            if let Some(body) = merged {
                self.functions[variant].body = body;
                return Ok(variant);
            }
        }

        let variant = self.functions.push(SpecializedFunction {
            function,
            body: Body::Interpreted { ops, frame },
        });
        self.by_function.entry(function).or_default().push(variant);
        Ok(variant)
    }

    fn specialize_instance(
        &mut self,
        graph: &Graph,
        instance: InstanceId,
    ) -> Result<(Vec<GOp>, Frame), Error> {
        let program = graph.program;
        let types = &program.types;
        let function = match &program.functions.get(graph.instances[instance].function).kind {
            FunctionKind::Interpreted(function) => function,
            FunctionKind::Native(_) => return Ok((Vec::new(), Frame::new())),
        };

        let mut ops = Vec::with_capacity(function.code.len());
        let mut frame = Frame::new();
        for (addr, op) in function.code.iter().enumerate() {
            let node = match graph.instances[instance].nodes[addr] {
                Some(node) if graph.is_reached(node) => node,
                _ => {
                    ops.push(GOp::Unreachable);
                    continue;
                }
            };
            let at = |kind: ErrorKind| Error::from(kind).at(|| graph.site(node));
            let opcode = match graph.nodes[node].opcode() {
                Some(opcode) => opcode,
                None => {
                    ops.push(GOp::Unreachable);
                    continue;
                }
            };
            let restricted_at = |depth: usize| {
                graph.nodes[node]
                    .stack
                    .and_then(|stack| graph.stacks.peek(stack, depth).ok())
                    .and_then(|set| set.restricted_type())
            };
            let local_type = |offset: usize| {
                opcode
                    .locals
                    .as_ref()
                    .and_then(|locals| locals.get(function.slot(offset)).ok())
                    .and_then(|set| set.restricted_type())
                    .unwrap_or(TypeId::OBJECT)
            };

            let gop = match op {
                Opcode::Const(value) => GOp::Const(value.clone()),
                &Opcode::GetLocal { offset } => GOp::GetLocal {
                    offset,
                    ty: local_type(offset),
                },
                &Opcode::GetLocalIndexed { offset, len } => GOp::GetLocalIndexed {
                    offset,
                    len,
                    ty: local_type(offset),
                },
                &Opcode::PutLocal { offset, ty } => {
                    let ty = restricted_at(0).or(ty).unwrap_or(TypeId::OBJECT);
                    frame
                        .add_variable(types, offset, None, ty)
                        .map_err(at)?;
                    GOp::PutLocal { offset, ty }
                }
                &Opcode::PutLocalIndexed { offset, len, ty } => {
                    let ty = restricted_at(1).or(ty).unwrap_or(TypeId::OBJECT);
                    frame
                        .add_variable(types, offset, Some(len), ty)
                        .map_err(at)?;
                    GOp::PutLocalIndexed { offset, len, ty }
                }
                &Opcode::RefLocal { offset } => {
                    let ty = function.embed_types[offset];
                    frame.add_instance(offset, None, ty).map_err(at)?;
                    GOp::RefLocal { offset, ty }
                }
                &Opcode::RefLocalIndexed { offset, len } => {
                    let ty = function.embed_types[offset];
                    frame.add_instance(offset, Some(len), ty).map_err(at)?;
                    GOp::RefLocalIndexed { offset, len, ty }
                }
                Opcode::Call(name) => {
                    let mut callees = BTreeMap::new();
                    for (&callee, &entry) in &opcode.dispatch {
                        callees.insert(callee, self.add_node(graph, entry)?);
                    }
                    let dispatcher = Dispatcher::make(opcode.calls.clone()).ok_or_else(|| {
                        at(ErrorKind::NoDispatcher {
                            callee: name.clone(),
                            caller: function.name.clone(),
                        })
                    })?;
                    GOp::Call {
                        name: name.clone(),
                        dispatcher,
                        callees,
                    }
                }
                Opcode::JumpIf(_) => GOp::JumpIf(op.jump_target(addr).unwrap_or(addr + 1)),
                Opcode::JumpIfNot(_) => GOp::JumpIfNot(op.jump_target(addr).unwrap_or(addr + 1)),
                Opcode::Jump(_) => GOp::Jump(op.jump_target(addr).unwrap_or(addr + 1)),
                Opcode::Ret => GOp::Ret,
            };
            ops.push(gop);
        }
        Ok((ops, frame))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use t1_common::config::DEFAULT_RECURSION_LIMIT;
    use t1_common::util::progress_logger::Hidden;
    use t1_frontend::{parse_program, Program};

    fn specialize(program: &Program) -> SpecializedTable {
        let mut graph = Graph::new(program, DEFAULT_RECURSION_LIMIT);
        graph.add_root("def::main").unwrap();
        graph.run(Hidden).unwrap();
        let mut table = SpecializedTable::new();
        let roots = graph.roots.clone();
        for root in &roots {
            table.add_root(&graph, root).unwrap();
        }
        table
    }

    fn function(program: &Program, name: &str) -> FunctionId {
        program.functions.lookup_all(name)[0].function
    }

    #[test]
    fn frame_storage_must_agree() {
        let types = TypeTable::new();
        let mut frame = Frame::new();
        frame.add_variable(&types, 0, None, TypeId::I32).unwrap();
        frame.add_variable(&types, 0, None, TypeId::I32).unwrap();
        assert_eq!(
            frame.add_variable(&types, 0, None, TypeId::U8),
            Err(ErrorKind::LocalStorageSizeMismatch(
                "std::u8".to_owned(),
                "std::i32".to_owned()
            ))
        );
        assert!(matches!(
            frame.add_variable(&types, 0, None, TypeId::OBJECT),
            Err(ErrorKind::LocalStorageTypeMismatch(..))
        ));
        assert_eq!(
            frame.add_variable(&types, 0, Some(2), TypeId::I32),
            Err(ErrorKind::LocalArrayLengthMismatch)
        );

        frame.add_variable(&types, 1, None, TypeId::OBJECT).unwrap();
        frame.add_variable(&types, 1, None, TypeId::STRING).unwrap();
        frame.add_instance(0, Some(3), TypeId::STRING).unwrap();
        assert_eq!(
            frame.add_instance(0, None, TypeId::STRING),
            Err(ErrorKind::LocalInstanceLengthMismatch)
        );
    }

    #[test]
    fn frames_merge_when_shared_slots_agree() {
        let types = TypeTable::new();
        let mut a = Frame::new();
        a.add_variable(&types, 0, None, TypeId::I32).unwrap();
        a.add_variable(&types, 1, None, TypeId::OBJECT).unwrap();

        let mut b = Frame::new();
        b.add_variable(&types, 1, None, TypeId::STRING).unwrap();
        b.add_variable(&types, 2, None, TypeId::U8).unwrap();
        assert!(a.can_merge(&b));
        a.merge(&b);
        assert_eq!(a.variables.len(), 3);
        assert_eq!(a.variables[&1].ty, TypeId::OBJECT);

        let mut c = Frame::new();
        c.add_variable(&types, 0, None, TypeId::OBJECT).unwrap();
        assert!(!a.can_merge(&c));

        let mut d = Frame::new();
        d.add_instance(0, None, TypeId::STRING).unwrap();
        let mut e = Frame::new();
        e.add_instance(0, None, TypeId::ARRAY_OBJECT).unwrap();
        assert!(!d.can_merge(&e));
    }

    #[test]
    fn layout_packs_restricted_slots_by_width() {
        let types = TypeTable::new();
        let mut frame = Frame::new();
        frame.add_variable(&types, 0, None, TypeId::I32).unwrap();
        frame.add_variable(&types, 1, None, TypeId::U8).unwrap();
        frame.add_variable(&types, 2, None, TypeId::OBJECT).unwrap();
        frame.add_variable(&types, 3, Some(2), TypeId::I64).unwrap();
        frame.add_instance(0, None, TypeId::STRING).unwrap();

        let layout: Vec<(SlotKind, usize)> = frame
            .layout()
            .iter()
            .map(|entry| (entry.kind, entry.offset))
            .collect();
        assert_eq!(
            layout,
            vec![
                (SlotKind::Restricted(64), 3),
                (SlotKind::Restricted(32), 0),
                (SlotKind::Restricted(8), 1),
                (SlotKind::Pointer, 2),
                (SlotKind::Instance, 0),
            ]
        );
    }

    #[test]
    fn invocations_share_a_body_when_storage_agrees() {
        let program = parse_program(
            r#"{"functions": [
                {"name": "def::main", "code": ["1i32", "show", "\"s\"", "show"]},
                {"name": "def::show", "params": ["std::object"], "code": ["drop"]}
            ]}"#,
        )
        .unwrap();
        let table = specialize(&program);
        let show = function(&program, "def::show");
        assert_eq!(table.variants_of(show).len(), 1);
        assert_eq!(table.len(), 3);

        match &table.functions[table.variants_of(show)[0]].body {
            Body::Interpreted { ops, .. } => match &ops[0] {
                GOp::Call { dispatcher, .. } => assert_eq!(dispatcher.calls().len(), 2),
                other => panic!("unexpected op {:?}", other),
            },
            Body::Native(_) => panic!("def::show is interpreted"),
        }
    }

    #[test]
    fn restricted_locals_split_variants() {
        let program = parse_program(
            r#"{"functions": [
                {"name": "def::main", "code": ["1i32", "keep", "\"s\"", "keep"]},
                {"name": "def::keep", "params": ["std::object"], "locals": [{"name": "x"}],
                 "code": ["->x"]}
            ]}"#,
        )
        .unwrap();
        let table = specialize(&program);
        let keep = function(&program, "def::keep");
        let variants = table.variants_of(keep);
        assert_eq!(variants.len(), 2);

        let stored: Vec<TypeId> = variants
            .iter()
            .map(|&variant| match &table.functions[variant].body {
                Body::Interpreted { frame, .. } => frame.variables[&0].ty,
                Body::Native(_) => panic!("def::keep is interpreted"),
            })
            .collect();
        assert_eq!(stored, vec![TypeId::I32, TypeId::OBJECT]);

        let (name, main) = &table.roots[0];
        assert_eq!(name, "def::main");
        match &table.functions[*main].body {
            Body::Interpreted { ops, .. } => {
                assert!(matches!(ops[1], GOp::Call { ref callees, .. } if callees[&keep] == variants[0]));
                assert!(matches!(ops[3], GOp::Call { ref callees, .. } if callees[&keep] == variants[1]));
                assert!(matches!(ops[4], GOp::Ret));
            }
            Body::Native(_) => panic!("def::main is interpreted"),
        }
    }

    #[test]
    fn native_variants_follow_storage_width() {
        let program = parse_program(
            r#"{"functions": [{"name": "def::main", "code": [
                "1i32", "dup", "drop", "drop", "\"s\"", "dup", "drop", "drop", "true", "dup",
                "drop", "drop"
            ]}]}"#,
        )
        .unwrap();
        let table = specialize(&program);
        let dup = function(&program, "std::dup");
        let drop = function(&program, "std::drop");

        let storages: Vec<Storage> = table
            .variants_of(dup)
            .iter()
            .map(|&variant| match table.functions[variant].body {
                Body::Native(storage) => storage,
                Body::Interpreted { .. } => panic!("std::dup is native"),
            })
            .collect();
        assert_eq!(storages, vec![Storage::Bits(32), Storage::Ref, Storage::Bits(8)]);
        assert_eq!(table.variants_of(drop).len(), 1);
    }

    #[test]
    fn unreached_code_is_marked() {
        let program = parse_program(
            r#"{"functions": [{"name": "def::main", "code": ["ret", "1", "drop"]}]}"#,
        )
        .unwrap();
        let table = specialize(&program);
        let (_, main) = &table.roots[0];
        match &table.functions[*main].body {
            Body::Interpreted { ops, .. } => {
                assert!(matches!(ops[0], GOp::Ret));
                assert!(matches!(ops[1], GOp::Unreachable));
                assert!(matches!(ops[2], GOp::Unreachable));
            }
            Body::Native(_) => panic!("def::main is interpreted"),
        }
    }
}
