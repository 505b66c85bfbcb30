use crate::dispatcher::DNode;
use crate::graph::{Graph, InstanceId, NodeId, NodeKind};
use crate::specialize::{Body, GOp, SlotKind, SpecializedTable, Storage};
use std::io::{self, Write};
use t1_frontend::function::FunctionKind;
use t1_frontend::types::TypeTable;
use t1_frontend::Program;

const TAB_SIZE: usize = 2;

const STACK_RED_ZONE_BYTES: usize = 256 * 1024;
const STACK_GROW_BYTES: usize = 1024 * 1024;

struct Context<'a, 'b> {
    writer: &'b mut dyn Write,
    indentation: usize,
    program: &'a Program,
}

impl<'a, 'b> Context<'a, 'b> {
    fn types(&self) -> &'a TypeTable {
        &self.program.types
    }

    fn add_indent(&mut self) {
        self.indentation += TAB_SIZE;
    }

    fn remove_indent(&mut self) {
        self.indentation -= TAB_SIZE;
    }

    fn line(&mut self, text: impl std::fmt::Display) -> io::Result<()> {
        writeln!(self.writer, "{}{}", " ".repeat(self.indentation), text)
    }

    fn write_node(&mut self, graph: &Graph, node: NodeId) -> io::Result<()> {
        stacker::maybe_grow(STACK_RED_ZONE_BYTES, STACK_GROW_BYTES, || {
            match &graph.nodes[node].kind {
                NodeKind::Exit => self.line("exit"),
                NodeKind::Opcode(op) => self.write_instance(graph, op.instance),
                NodeKind::Native(native) => {
                    let stack = match graph.nodes[node].stack {
                        Some(stack) => graph.stacks.display(self.types(), stack),
                        None => "unreached".to_owned(),
                    };
                    self.line(format_args!(
                        "native {} [{}]",
                        graph.function_name(native.function),
                        stack
                    ))
                }
            }
        })
    }

    fn write_instance(&mut self, graph: &Graph, instance: InstanceId) -> io::Result<()> {
        let function = graph.instances[instance].function;
        self.line(format_args!(
            "{} #{}",
            graph.function_name(function),
            instance.0
        ))?;
        let code = match &self.program.functions.get(function).kind {
            FunctionKind::Interpreted(interpreted) => &interpreted.code,
            FunctionKind::Native(_) => return Ok(()),
        };

        self.add_indent();
        for (addr, op) in code.iter().enumerate() {
            let node = match graph.instances[instance].nodes[addr] {
                Some(node) if graph.is_reached(node) => node,
                _ => {
                    self.line(format_args!("{}: {} (unreached)", addr, op.display(addr)))?;
                    continue;
                }
            };
            let stack = graph.nodes[node]
                .stack
                .map(|stack| graph.stacks.display(self.types(), stack))
                .unwrap_or_default();
            let locals = match graph.nodes[node].opcode().and_then(|op| op.locals.as_ref()) {
                Some(locals) => locals
                    .slots()
                    .iter()
                    .map(|set| set.display(self.types()))
                    .collect::<Vec<_>>()
                    .join(" | "),
                None => String::new(),
            };
            self.line(format_args!(
                "{}: {}  [{}]  {{{}}}",
                addr,
                op.display(addr),
                stack,
                locals
            ))?;

            if let Some(op) = graph.nodes[node].opcode() {
                self.add_indent();
                for &callee in op.dispatch.values() {
                    self.write_node(graph, callee)?;
                }
                self.remove_indent();
            }
        }
        self.remove_indent();
        Ok(())
    }

    fn write_dnode(&mut self, node: &DNode) -> io::Result<()> {
        match node {
            DNode::Leaf(function) => {
                let name = &self.program.functions.get(*function).name;
                self.line(format_args!("-> {}", name))
            }
            DNode::Branch { depth, children } => {
                self.line(format_args!("switch {}", depth))?;
                self.add_indent();
                for (ty, child) in children {
                    self.line(format_args!("case {}:", self.types().name(*ty)))?;
                    self.add_indent();
                    self.write_dnode(child)?;
                    self.remove_indent();
                }
                self.remove_indent();
                Ok(())
            }
        }
    }

    fn write_gop(&mut self, addr: usize, op: &GOp) -> io::Result<()> {
        let types = self.types();
        match op {
            GOp::Const(value) => self.line(format_args!("{}: const {}", addr, value)),
            GOp::GetLocal { offset, ty } => self.line(format_args!(
                "{}: getlocal {} : {}",
                addr,
                offset,
                types.name(*ty)
            )),
            GOp::GetLocalIndexed { offset, len, ty } => self.line(format_args!(
                "{}: getlocalindexed {} {} : {}",
                addr,
                offset,
                len,
                types.name(*ty)
            )),
            GOp::PutLocal { offset, ty } => self.line(format_args!(
                "{}: putlocal {} : {}",
                addr,
                offset,
                types.name(*ty)
            )),
            GOp::PutLocalIndexed { offset, len, ty } => self.line(format_args!(
                "{}: putlocalindexed {} {} : {}",
                addr,
                offset,
                len,
                types.name(*ty)
            )),
            GOp::RefLocal { offset, ty } => self.line(format_args!(
                "{}: reflocal {} : {}",
                addr,
                offset,
                types.name(*ty)
            )),
            GOp::RefLocalIndexed { offset, len, ty } => self.line(format_args!(
                "{}: reflocalindexed {} {} : {}",
                addr,
                offset,
                len,
                types.name(*ty)
            )),
            GOp::Call {
                name,
                dispatcher,
                callees,
            } => {
                let targets: Vec<String> = callees
                    .iter()
                    .map(|(&function, variant)| {
                        format!(
                            "{}=v{}",
                            self.program.functions.get(function).name,
                            variant.0
                        )
                    })
                    .collect();
                self.line(format_args!("{}: call {} ({})", addr, name, targets.join(", ")))?;
                self.add_indent();
                self.write_dnode(dispatcher.root())?;
                self.remove_indent();
                Ok(())
            }
            GOp::JumpIf(target) => self.line(format_args!("{}: jumpif {}", addr, target)),
            GOp::JumpIfNot(target) => self.line(format_args!("{}: jumpifnot {}", addr, target)),
            GOp::Jump(target) => self.line(format_args!("{}: jump {}", addr, target)),
            GOp::Ret => self.line(format_args!("{}: ret", addr)),
            GOp::Unreachable => self.line(format_args!("{}: unreachable", addr)),
        }
    }

    fn write_table(&mut self, table: &SpecializedTable) -> io::Result<()> {
        for (name, variant) in &table.roots {
            self.line(format_args!("root {} = v{}", name, variant.0))?;
        }
        for (id, function) in &table.functions {
            let name = &self.program.functions.get(function.function).name;
            match &function.body {
                Body::Native(Storage::Ref) => {
                    self.line(format_args!("v{}: {} native", id.0, name))?;
                }
                Body::Native(Storage::Bits(bits)) => {
                    self.line(format_args!("v{}: {} native bits{}", id.0, name, bits))?;
                }
                Body::Interpreted { ops, frame } => {
                    self.line(format_args!("v{}: {}", id.0, name))?;
                    self.add_indent();
                    for entry in frame.layout() {
                        let kind = match entry.kind {
                            SlotKind::Restricted(bits) => format!("bits{}", bits),
                            SlotKind::Pointer => "ptr".to_owned(),
                            SlotKind::Instance => "inst".to_owned(),
                        };
                        let len = entry
                            .slot
                            .len
                            .map(|len| format!("[{}]", len))
                            .unwrap_or_default();
                        self.line(format_args!(
                            "{} {}{} : {}",
                            kind,
                            entry.offset,
                            len,
                            self.types().name(entry.slot.ty)
                        ))?;
                    }
                    for (addr, op) in ops.iter().enumerate() {
                        self.write_gop(addr, op)?;
                    }
                    self.remove_indent();
                }
            }
        }
        Ok(())
    }
}

/// Prints the analyzed call tree of every entry point.
pub fn write_tree(w: &mut dyn Write, graph: &Graph) -> io::Result<()> {
    let mut context = Context {
        writer: w,
        indentation: 0,
        program: graph.program,
    };
    for root in &graph.roots {
        context.line(format_args!("entry {}", root.name))?;
        context.add_indent();
        context.write_node(graph, root.entry)?;
        context.remove_indent();
    }
    Ok(())
}

/// Prints every specialized function with its frame layout.
pub fn write_table(w: &mut dyn Write, program: &Program, table: &SpecializedTable) -> io::Result<()> {
    let mut context = Context {
        writer: w,
        indentation: 0,
        program,
    };
    context.write_table(table)
}
