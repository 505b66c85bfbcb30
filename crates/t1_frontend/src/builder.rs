use crate::error::ErrorKind;
use crate::opcode::{Constant, InterpretedFunction, Opcode};
use crate::types::TypeId;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ControlFlow {
    /// Address of a forward jump waiting for its target.
    Origin(usize),
    /// Address that a later backward jump will target.
    Destination(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LocalWord {
    Get { offset: usize },
    Put { offset: usize, ty: Option<TypeId> },
    GetIndexed { offset: usize, len: usize },
    PutIndexed { offset: usize, len: usize, ty: Option<TypeId> },
    Ref { offset: usize },
    RefIndexed { offset: usize, len: usize },
}

impl LocalWord {
    fn opcode(self) -> Opcode {
        match self {
            LocalWord::Get { offset } => Opcode::GetLocal { offset },
            LocalWord::Put { offset, ty } => Opcode::PutLocal { offset, ty },
            LocalWord::GetIndexed { offset, len } => Opcode::GetLocalIndexed { offset, len },
            LocalWord::PutIndexed { offset, len, ty } => {
                Opcode::PutLocalIndexed { offset, len, ty }
            }
            LocalWord::Ref { offset } => Opcode::RefLocal { offset },
            LocalWord::RefIndexed { offset, len } => Opcode::RefLocalIndexed { offset, len },
        }
    }
}

/// Accumulates the code of one interpreted function. Jumps are resolved through a control-flow
/// stack of pending origins and destinations.
#[derive(Clone, Debug)]
pub struct FunctionBuilder {
    name: String,
    cf_stack: Vec<ControlFlow>,
    code: Vec<Opcode>,
    num_fields: usize,
    /// Coalesced slot to field offset.
    field_mapping: Vec<usize>,
    embed_types: Vec<TypeId>,
    locals: BTreeMap<String, LocalWord>,
    /// Set when some jump targets the end of the code, or when the code is empty.
    jump_to_last: bool,
}

impl FunctionBuilder {
    pub fn new(name: &str) -> Self {
        FunctionBuilder {
            name: name.to_owned(),
            cf_stack: Vec::new(),
            code: Vec::new(),
            num_fields: 0,
            field_mapping: Vec::new(),
            embed_types: Vec::new(),
            locals: BTreeMap::new(),
            jump_to_last: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    fn add_local(&mut self, name: String, word: LocalWord) -> Result<(), ErrorKind> {
        if self.locals.contains_key(&name) {
            return Err(ErrorKind::LocalCollision(name));
        }
        self.locals.insert(name, word);
        Ok(())
    }

    fn check_len(len: i64) -> Result<usize, ErrorKind> {
        if len <= 0 {
            return Err(ErrorKind::InvalidLocalArrayLength(len));
        }
        Ok(len as usize)
    }

    /// Defines `name` and `->name`. An absent type accepts any value.
    pub fn def_local_field(&mut self, name: &str, ty: Option<TypeId>) -> Result<(), ErrorKind> {
        let offset = self.num_fields;
        self.add_local(name.to_owned(), LocalWord::Get { offset })?;
        self.add_local(format!("->{}", name), LocalWord::Put { offset, ty })?;
        self.num_fields += 1;
        self.field_mapping.push(offset);
        Ok(())
    }

    /// Defines `name@` and `->name@`; the array takes `len` offsets but a single slot.
    pub fn def_local_field_array(
        &mut self,
        name: &str,
        len: i64,
        ty: Option<TypeId>,
    ) -> Result<(), ErrorKind> {
        let len = Self::check_len(len)?;
        let offset = self.num_fields;
        self.add_local(format!("{}@", name), LocalWord::GetIndexed { offset, len })?;
        self.add_local(
            format!("->{}@", name),
            LocalWord::PutIndexed { offset, len, ty },
        )?;
        self.num_fields += len;
        self.field_mapping.push(offset);
        Ok(())
    }

    /// Defines `name&`, pushing a reference to a local instance.
    pub fn def_local_embed(&mut self, name: &str, ty: TypeId) -> Result<(), ErrorKind> {
        let offset = self.embed_types.len();
        self.add_local(format!("{}&", name), LocalWord::Ref { offset })?;
        self.embed_types.push(ty);
        Ok(())
    }

    pub fn def_local_embed_array(
        &mut self,
        name: &str,
        len: i64,
        ty: TypeId,
    ) -> Result<(), ErrorKind> {
        let len = Self::check_len(len)?;
        let offset = self.embed_types.len();
        self.add_local(format!("{}@&", name), LocalWord::RefIndexed { offset, len })?;
        self.embed_types.extend(std::iter::repeat(ty).take(len));
        Ok(())
    }

    pub fn add(&mut self, op: Opcode) {
        self.code.push(op);
        self.jump_to_last = false;
    }

    pub fn literal(&mut self, value: Constant) {
        self.add(Opcode::Const(value));
    }

    pub fn call(&mut self, name: &str) {
        self.add(Opcode::Call(name.to_owned()));
    }

    /// Emits the access opcode if `word` names a local accessor.
    pub fn do_local(&mut self, word: &str) -> bool {
        match self.locals.get(word) {
            Some(&local) => {
                self.add(local.opcode());
                true
            }
            None => false,
        }
    }

    pub fn ret(&mut self) {
        self.add(Opcode::Ret);
    }

    fn cs_pop(&mut self) -> Result<ControlFlow, ErrorKind> {
        self.cf_stack.pop().ok_or(ErrorKind::ControlFlowUnderflow)
    }

    fn cs_pop_origin(&mut self) -> Result<usize, ErrorKind> {
        match self.cs_pop()? {
            ControlFlow::Origin(addr) => Ok(addr),
            ControlFlow::Destination(_) => Err(ErrorKind::NotAnOrigin),
        }
    }

    fn cs_pop_destination(&mut self) -> Result<usize, ErrorKind> {
        match self.cs_pop()? {
            ControlFlow::Destination(addr) => Ok(addr),
            ControlFlow::Origin(_) => Err(ErrorKind::NotADestination),
        }
    }

    /// Rotates the top `depth + 1` entries, bringing the entry at `depth` to the top.
    pub fn cs_roll(&mut self, depth: usize) -> Result<(), ErrorKind> {
        let len = self.cf_stack.len();
        if depth >= len {
            return Err(ErrorKind::ControlFlowUnderflow);
        }
        let entry = self.cf_stack.remove(len - 1 - depth);
        self.cf_stack.push(entry);
        Ok(())
    }

    /// Pushes a copy of the entry at `depth` (0 is the top).
    pub fn cs_pick(&mut self, depth: usize) -> Result<(), ErrorKind> {
        let len = self.cf_stack.len();
        if depth >= len {
            return Err(ErrorKind::ControlFlowUnderflow);
        }
        let entry = self.cf_stack[len - 1 - depth];
        self.cf_stack.push(entry);
        Ok(())
    }

    fn ahead_with(&mut self, op: Opcode) {
        self.cf_stack.push(ControlFlow::Origin(self.code.len()));
        self.add(op);
    }

    pub fn ahead(&mut self) {
        self.ahead_with(Opcode::Jump(0));
    }

    /// Forward jump taken when the top of stack is true.
    pub fn ahead_if(&mut self) {
        self.ahead_with(Opcode::JumpIf(0));
    }

    pub fn ahead_if_not(&mut self) {
        self.ahead_with(Opcode::JumpIfNot(0));
    }

    /// Resolves the pending origin to the current address.
    pub fn then(&mut self) -> Result<(), ErrorKind> {
        let origin = self.cs_pop_origin()?;
        let disp = self.code.len() as isize - origin as isize - 1;
        if !self.code[origin].resolve_jump(disp) {
            return Err(ErrorKind::NotAnOrigin);
        }
        self.jump_to_last = true;
        Ok(())
    }

    pub fn begin(&mut self) {
        self.cf_stack.push(ControlFlow::Destination(self.code.len()));
    }

    fn again_with(&mut self, make: fn(isize) -> Opcode) -> Result<(), ErrorKind> {
        let dest = self.cs_pop_destination()?;
        let disp = dest as isize - self.code.len() as isize - 1;
        self.add(make(disp));
        Ok(())
    }

    pub fn again(&mut self) -> Result<(), ErrorKind> {
        self.again_with(Opcode::Jump)
    }

    pub fn again_if(&mut self) -> Result<(), ErrorKind> {
        self.again_with(Opcode::JumpIf)
    }

    pub fn again_if_not(&mut self) -> Result<(), ErrorKind> {
        self.again_with(Opcode::JumpIfNot)
    }

    pub fn if_(&mut self) {
        self.ahead_if_not();
    }

    pub fn if_not(&mut self) {
        self.ahead_if();
    }

    pub fn else_(&mut self) -> Result<(), ErrorKind> {
        self.ahead();
        self.cs_roll(1)?;
        self.then()
    }

    pub fn while_(&mut self) -> Result<(), ErrorKind> {
        self.ahead_if_not();
        self.cs_roll(1)
    }

    pub fn repeat(&mut self) -> Result<(), ErrorKind> {
        self.again()?;
        self.then()
    }

    pub fn build(mut self) -> Result<InterpretedFunction, ErrorKind> {
        if !self.cf_stack.is_empty() {
            return Err(ErrorKind::ControlFlowNotEmpty(self.name));
        }
        let falls_off = match self.code.last() {
            Some(op) => op.may_fall_through(),
            None => true,
        };
        if self.jump_to_last || falls_off {
            self.ret();
        }

        let mut field_slots = vec![0; self.num_fields];
        for (slot, &offset) in self.field_mapping.iter().enumerate() {
            field_slots[offset] = slot;
        }

        Ok(InterpretedFunction {
            name: self.name,
            code: self.code,
            num_fields: self.num_fields,
            field_slots,
            num_slots: self.field_mapping.len(),
            embed_types: self.embed_types,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_function_returns() {
        let f = FunctionBuilder::new("def::main").build().unwrap();
        assert_eq!(f.code, vec![Opcode::Ret]);
    }

    #[test]
    fn no_duplicate_ret() {
        let mut b = FunctionBuilder::new("def::main");
        b.literal(Constant::Bool(true));
        b.call("std::drop");
        b.ret();
        let f = b.build().unwrap();
        assert_eq!(f.code.len(), 3);
    }

    #[test]
    fn if_else_then() {
        let mut b = FunctionBuilder::new("def::f");
        b.literal(Constant::Bool(true));
        b.if_();
        b.literal(Constant::Int(1));
        b.else_().unwrap();
        b.literal(Constant::Int(2));
        b.then().unwrap();
        b.ret();
        let f = b.build().unwrap();
        assert_eq!(
            f.code,
            vec![
                Opcode::Const(Constant::Bool(true)),
                Opcode::JumpIfNot(2),
                Opcode::Const(Constant::Int(1)),
                Opcode::Jump(1),
                Opcode::Const(Constant::Int(2)),
                Opcode::Ret,
            ]
        );
        assert_eq!(f.code[1].jump_target(1), Some(4));
        assert_eq!(f.code[3].jump_target(3), Some(5));
    }

    #[test]
    fn begin_while_repeat() {
        let mut b = FunctionBuilder::new("def::loop");
        b.begin();
        b.literal(Constant::Bool(false));
        b.while_().unwrap();
        b.literal(Constant::Int(0));
        b.call("std::drop");
        b.repeat().unwrap();
        let f = b.build().unwrap();
        // The loop exit targets the end of the code, so a ret is appended.
        assert_eq!(
            f.code,
            vec![
                Opcode::Const(Constant::Bool(false)),
                Opcode::JumpIfNot(3),
                Opcode::Const(Constant::Int(0)),
                Opcode::Call("std::drop".to_owned()),
                Opcode::Jump(-5),
                Opcode::Ret,
            ]
        );
        assert_eq!(f.code[4].jump_target(4), Some(0));
    }

    #[test]
    fn conditional_back_jump() {
        let mut b = FunctionBuilder::new("def::until");
        b.begin();
        b.literal(Constant::Bool(true));
        b.again_if_not().unwrap();
        b.begin();
        b.literal(Constant::Bool(false));
        b.again_if().unwrap();
        let f = b.build().unwrap();
        assert_eq!(
            f.code,
            vec![
                Opcode::Const(Constant::Bool(true)),
                Opcode::JumpIfNot(-2),
                Opcode::Const(Constant::Bool(false)),
                Opcode::JumpIf(-2),
                Opcode::Ret,
            ]
        );
        assert_eq!(f.code[3].jump_target(3), Some(2));
    }

    #[test]
    fn control_flow_errors() {
        let mut b = FunctionBuilder::new("def::bad");
        assert!(matches!(b.then(), Err(ErrorKind::ControlFlowUnderflow)));
        b.begin();
        assert!(matches!(b.then(), Err(ErrorKind::NotAnOrigin)));
        b.ahead();
        assert!(matches!(b.again(), Err(ErrorKind::NotADestination)));
        assert!(matches!(b.cs_roll(1), Err(ErrorKind::ControlFlowUnderflow)));

        let mut b = FunctionBuilder::new("def::open");
        b.ahead_if();
        assert_eq!(
            b.build().unwrap_err().to_string(),
            "cannot build def::open: control-flow stack is not empty"
        );
    }

    #[test]
    fn locals_are_coalesced() {
        let mut b = FunctionBuilder::new("def::f");
        b.def_local_field("x", None).unwrap();
        b.def_local_field_array("arr", 3, Some(TypeId::I32)).unwrap();
        b.def_local_field("y", Some(TypeId::BOOL)).unwrap();
        b.def_local_embed_array("objs", 2, TypeId::ARRAY_U8).unwrap();
        b.def_local_embed("one", TypeId::ARRAY_I32).unwrap();

        assert!(matches!(
            b.def_local_field("x", None),
            Err(ErrorKind::LocalCollision(_))
        ));
        assert!(matches!(
            b.def_local_field_array("z", 0, None),
            Err(ErrorKind::InvalidLocalArrayLength(0))
        ));

        assert!(b.do_local("->y"));
        assert!(b.do_local("arr@"));
        assert!(b.do_local("one&"));
        assert!(!b.do_local("arr"));

        let f = b.build().unwrap();
        assert_eq!(f.num_fields, 5);
        assert_eq!(f.num_slots, 3);
        assert_eq!(f.slot(0), 0);
        assert_eq!(f.slot(1), 1);
        assert_eq!(f.slot(4), 2);
        assert_eq!(
            f.embed_types,
            vec![TypeId::ARRAY_U8, TypeId::ARRAY_U8, TypeId::ARRAY_I32]
        );
        assert_eq!(
            &f.code[..3],
            &[
                Opcode::PutLocal {
                    offset: 4,
                    ty: Some(TypeId::BOOL)
                },
                Opcode::GetLocalIndexed { offset: 1, len: 3 },
                Opcode::RefLocal { offset: 2 },
            ]
        );
    }
}
