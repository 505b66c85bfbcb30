//! The execution graph: one node per program point reached by the analysis, widened to a fixed
//! point by re-evaluating dirty nodes.

mod native;
mod opcode;

use crate::constants::ConstantRegistry;
use crate::error::{Error, ErrorKind};
use crate::locals::LocalState;
use crate::resolve::DCall;
use crate::stack::{Stack, StackArena};
use crate::struct_store::StructStore;
use id_collections::{id_type, IdVec};
use std::collections::BTreeMap;
use t1_common::util::progress_logger::{ProgressLogger, ProgressSession};
use t1_frontend::function::{FunctionId, FunctionKind, NativeOp};
use t1_frontend::opcode::InterpretedFunction;
use t1_frontend::Program;

#[id_type]
pub struct NodeId(pub usize);

/// One invocation of an interpreted function in the call tree.
#[id_type]
pub struct InstanceId(pub usize);

#[derive(Clone, Debug)]
pub struct OpcodeNode {
    pub instance: InstanceId,
    pub addr: usize,
    pub locals: Option<LocalState>,
    pub next: Option<NodeId>,
    pub branch: Option<NodeId>,
    /// Entry node of every function a call opcode may reach.
    pub dispatch: BTreeMap<FunctionId, NodeId>,
    pub calls: Vec<DCall>,
}

#[derive(Clone, Debug)]
pub struct NativeNode {
    pub function: FunctionId,
    pub next: NodeId,
    /// The invocation and address of the call opcode, if the native was not entered directly.
    pub caller: Option<(InstanceId, usize)>,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Program termination.
    Exit,
    Opcode(OpcodeNode),
    Native(NativeNode),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    /// `None` until some predecessor reaches the node.
    pub stack: Option<Stack>,
    dirty: bool,
    pub evaluations: usize,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            stack: None,
            dirty: false,
            evaluations: 0,
        }
    }

    pub fn opcode(&self) -> Option<&OpcodeNode> {
        match &self.kind {
            NodeKind::Opcode(op) => Some(op),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Instance {
    pub function: FunctionId,
    /// Opcode nodes by address, created when first reached. The node at address 0 is the entry.
    pub nodes: Vec<Option<NodeId>>,
    /// Where execution resumes when the function returns.
    pub continuation: NodeId,
    pub parent: Option<InstanceId>,
}

#[derive(Clone, Debug)]
pub struct Root {
    pub name: String,
    pub entry: NodeId,
    pub exit: NodeId,
}

pub(crate) fn descends(
    instances: &IdVec<InstanceId, Instance>,
    instance: InstanceId,
    ancestor: InstanceId,
) -> bool {
    let mut cur = Some(instance);
    while let Some(id) = cur {
        if id == ancestor {
            return true;
        }
        cur = instances[id].parent;
    }
    false
}

#[derive(Clone, Debug)]
pub struct Graph<'a> {
    pub program: &'a Program,
    recursion_limit: usize,
    pub nodes: IdVec<NodeId, Node>,
    pub instances: IdVec<InstanceId, Instance>,
    pub stacks: StackArena,
    pub store: StructStore,
    pub constants: ConstantRegistry,
    pub roots: Vec<Root>,
    worklist: Vec<NodeId>,
}

impl<'a> Graph<'a> {
    pub fn new(program: &'a Program, recursion_limit: usize) -> Self {
        Graph {
            program,
            recursion_limit,
            nodes: IdVec::new(),
            instances: IdVec::new(),
            stacks: StackArena::new(),
            store: StructStore::new(),
            constants: ConstantRegistry::new(),
            roots: Vec::new(),
            worklist: Vec::new(),
        }
    }

    pub fn function_name(&self, function: FunctionId) -> &'a str {
        &self.program.functions.get(function).name
    }

    fn interpreted(&self, instance: InstanceId) -> Option<&'a InterpretedFunction> {
        let program = self.program;
        match &program.functions.get(self.instances[instance].function).kind {
            FunctionKind::Interpreted(function) => Some(function),
            FunctionKind::Native(_) => None,
        }
    }

    pub fn entry(&self, instance: InstanceId) -> Option<NodeId> {
        self.instances[instance].nodes.first().copied().flatten()
    }

    /// The invocation an opcode node belongs to.
    pub fn instance_of(&self, node: NodeId) -> Option<InstanceId> {
        self.nodes[node].opcode().map(|op| op.instance)
    }

    /// Describes where a node sits in the program, for diagnostics.
    pub fn site(&self, node: NodeId) -> String {
        match &self.nodes[node].kind {
            NodeKind::Exit => "program exit".to_owned(),
            NodeKind::Opcode(op) => {
                let function = self.instances[op.instance].function;
                format!("{} @ {}", self.function_name(function), op.addr)
            }
            NodeKind::Native(native) => match native.caller {
                Some((instance, addr)) => format!(
                    "{} @ {}",
                    self.function_name(self.instances[instance].function),
                    addr
                ),
                None => self.function_name(native.function).to_owned(),
            },
        }
    }

    fn mark_dirty(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        if !node.dirty && node.stack.is_some() {
            node.dirty = true;
            self.worklist.push(id);
        }
    }

    /// Widens the entry stack of a node, queueing it if anything changed.
    fn merge_stack(&mut self, id: NodeId, stack: Stack) -> Result<(), ErrorKind> {
        let program = self.program;
        let merged = match self.nodes[id].stack {
            None => stack,
            Some(old) => self.stacks.merge(&program.types, old, stack)?,
        };
        if self.nodes[id].stack != Some(merged) {
            self.nodes[id].stack = Some(merged);
            self.mark_dirty(id);
        }
        Ok(())
    }

    fn merge_locals(&mut self, id: NodeId, locals: &LocalState) -> Result<(), ErrorKind> {
        let program = self.program;
        let op = match &mut self.nodes[id].kind {
            NodeKind::Opcode(op) => op,
            _ => return Ok(()),
        };
        let merged = match &op.locals {
            None => locals.clone(),
            Some(old) => old.merge(&program.types, locals)?,
        };
        if op.locals.as_ref().map_or(true, |old| !old.ptr_eq(&merged)) {
            op.locals = Some(merged);
            self.mark_dirty(id);
        }
        Ok(())
    }

    /// The node for an address of an invocation, created on first use.
    fn node_at(&mut self, instance: InstanceId, addr: usize) -> NodeId {
        if let Some(id) = self.instances[instance].nodes[addr] {
            return id;
        }
        let id = self.nodes.push(Node::new(NodeKind::Opcode(OpcodeNode {
            instance,
            addr,
            locals: None,
            next: None,
            branch: None,
            dispatch: BTreeMap::new(),
            calls: Vec::new(),
        })));
        self.instances[instance].nodes[addr] = Some(id);
        id
    }

    /// Creates the node a call to `function` starts at, with the given entry stack.
    fn enter(
        &mut self,
        function: FunctionId,
        stack: Stack,
        parent: Option<InstanceId>,
        continuation: NodeId,
        caller: Option<(InstanceId, usize)>,
    ) -> Result<NodeId, ErrorKind> {
        let program = self.program;
        let name = &program.functions.get(function).name;
        match &program.functions.get(function).kind {
            FunctionKind::Interpreted(interpreted) => {
                let mut count = 0;
                let mut cur = parent;
                while let Some(ancestor) = cur {
                    if self.instances[ancestor].function == function {
                        count += 1;
                        if count >= self.recursion_limit {
                            return Err(ErrorKind::InfiniteRecursion(name.clone()));
                        }
                    }
                    cur = self.instances[ancestor].parent;
                }

                for &ty in &interpreted.embed_types {
                    self.constants.add_layout(ty);
                }
                let instance = self.instances.push(Instance {
                    function,
                    nodes: vec![None; interpreted.code.len()],
                    continuation,
                    parent,
                });
                let entry = self.node_at(instance, 0);
                self.merge_stack(entry, stack)?;
                self.merge_locals(entry, &LocalState::new(interpreted.num_slots))?;
                Ok(entry)
            }
            FunctionKind::Native(NativeOp::InterpreterOnly) => {
                Err(ErrorKind::NotCompilable(name.clone()))
            }
            FunctionKind::Native(_) => {
                let id = self.nodes.push(Node::new(NodeKind::Native(NativeNode {
                    function,
                    next: continuation,
                    caller,
                })));
                self.merge_stack(id, stack)?;
                Ok(id)
            }
        }
    }

    /// Seeds the graph with a zero-argument entry point.
    pub fn add_root(&mut self, name: &str) -> Result<NodeId, Error> {
        let function = self
            .program
            .functions
            .lookup_no_args(name)
            .ok_or_else(|| ErrorKind::NoEntryPoint(name.to_owned()))?;
        let exit = self.nodes.push(Node::new(NodeKind::Exit));
        let entry = self
            .enter(function, Stack::EMPTY, None, exit, None)
            .map_err(|kind| Error::from(kind).at(|| name.to_owned()))?;
        self.roots.push(Root {
            name: name.to_owned(),
            entry,
            exit,
        });
        Ok(entry)
    }

    fn evaluate(&mut self, id: NodeId) -> Result<(), ErrorKind> {
        let node = &mut self.nodes[id];
        node.dirty = false;
        node.evaluations += 1;
        let stack = match node.stack {
            Some(stack) => stack,
            None => return Ok(()),
        };
        match &node.kind {
            NodeKind::Exit => {
                let depth = self.stacks.depth(stack);
                if depth != 0 {
                    return Err(ErrorKind::NonEmptyExit(depth));
                }
                Ok(())
            }
            NodeKind::Opcode(_) => self.evaluate_opcode(id, stack),
            NodeKind::Native(native) => {
                let native = native.clone();
                self.evaluate_native(id, &native, stack)
            }
        }
    }

    /// Re-evaluates dirty nodes until none is left.
    pub fn run(&mut self, progress: impl ProgressLogger) -> Result<(), Error> {
        let mut session = progress.start_session(None);
        while let Some(id) = self.worklist.pop() {
            self.evaluate(id)
                .map_err(|kind| Error::from(kind).at(|| self.site(id)))?;
            session.update(1);
        }
        session.finish();
        Ok(())
    }

    pub fn is_reached(&self, id: NodeId) -> bool {
        self.nodes[id].stack.is_some()
    }
}
