use crate::types::TypeId;
use std::fmt;

/// A literal value pushed by a `const` opcode.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Constant {
    Bool(bool),
    /// A value of the boxed, unrestricted `std::int` type.
    Int(i64),
    /// A value of one of the fixed-width integer types.
    Fixed { ty: TypeId, value: i128 },
    Str(String),
}

impl Constant {
    pub fn type_id(&self) -> TypeId {
        match self {
            Constant::Bool(_) => TypeId::BOOL,
            Constant::Int(_) => TypeId::INT,
            Constant::Fixed { ty, .. } => *ty,
            Constant::Str(_) => TypeId::STRING,
        }
    }

    pub fn is_basic(&self) -> bool {
        !matches!(self, Constant::Str(_))
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Fixed { ty, value } => {
                let suffix = match *ty {
                    TypeId::U8 => "u8",
                    TypeId::U16 => "u16",
                    TypeId::U32 => "u32",
                    TypeId::U64 => "u64",
                    TypeId::I8 => "i8",
                    TypeId::I16 => "i16",
                    TypeId::I32 => "i32",
                    TypeId::I64 => "i64",
                    _ => "?",
                };
                write!(f, "{}{}", value, suffix)
            }
            Constant::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Local field opcodes address the field area by offset; arrays use their base offset plus a
/// dynamic index taken from the stack. Embed opcodes address the local instance area the same way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    Const(Constant),
    GetLocal {
        offset: usize,
    },
    GetLocalIndexed {
        offset: usize,
        len: usize,
    },
    PutLocal {
        offset: usize,
        ty: Option<TypeId>,
    },
    PutLocalIndexed {
        offset: usize,
        len: usize,
        ty: Option<TypeId>,
    },
    RefLocal {
        offset: usize,
    },
    RefLocalIndexed {
        offset: usize,
        len: usize,
    },
    Call(String),
    /// Displacements are counted in opcodes from the address following the jump.
    JumpIf(isize),
    JumpIfNot(isize),
    Jump(isize),
    Ret,
}

impl Opcode {
    pub fn may_fall_through(&self) -> bool {
        !matches!(self, Opcode::Jump(_) | Opcode::Ret)
    }

    pub fn jump_target(&self, addr: usize) -> Option<usize> {
        match self {
            Opcode::JumpIf(disp) | Opcode::JumpIfNot(disp) | Opcode::Jump(disp) => {
                Some((addr as isize + 1 + disp) as usize)
            }
            _ => None,
        }
    }

    pub(crate) fn resolve_jump(&mut self, new_disp: isize) -> bool {
        match self {
            Opcode::JumpIf(disp) | Opcode::JumpIfNot(disp) | Opcode::Jump(disp) => {
                *disp = new_disp;
                true
            }
            _ => false,
        }
    }

    pub fn display(&self, addr: usize) -> String {
        match self {
            Opcode::Const(c) => format!("const {}", c),
            Opcode::GetLocal { offset } => format!("getlocal {}", offset),
            Opcode::GetLocalIndexed { offset, len } => {
                format!("getlocalindexed {} {}", offset, len)
            }
            Opcode::PutLocal { offset, .. } => format!("putlocal {}", offset),
            Opcode::PutLocalIndexed { offset, len, .. } => {
                format!("putlocalindexed {} {}", offset, len)
            }
            Opcode::RefLocal { offset } => format!("reflocal {}", offset),
            Opcode::RefLocalIndexed { offset, len } => {
                format!("reflocalindexed {} {}", offset, len)
            }
            Opcode::Call(name) => format!("call {}", name),
            Opcode::JumpIf(_) | Opcode::JumpIfNot(_) | Opcode::Jump(_) => {
                let mnemonic = match self {
                    Opcode::JumpIf(_) => "jumpif",
                    Opcode::JumpIfNot(_) => "jumpifnot",
                    _ => "jump",
                };
                match self.jump_target(addr) {
                    Some(target) => format!("{} {}", mnemonic, target),
                    None => mnemonic.to_owned(),
                }
            }
            Opcode::Ret => "ret".to_owned(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct InterpretedFunction {
    pub name: String,
    pub code: Vec<Opcode>,
    pub num_fields: usize,
    /// Maps a local field offset to its coalesced slot. Only single fields and array base
    /// offsets are meaningful.
    pub field_slots: Vec<usize>,
    pub num_slots: usize,
    /// Type of each local instance, by embed offset.
    pub embed_types: Vec<TypeId>,
}

impl InterpretedFunction {
    pub fn slot(&self, offset: usize) -> usize {
        self.field_slots[offset]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn jump_targets_are_relative_to_next_opcode() {
        assert_eq!(Opcode::Jump(2).jump_target(3), Some(6));
        assert_eq!(Opcode::JumpIf(-4).jump_target(3), Some(0));
        assert_eq!(Opcode::Ret.jump_target(3), None);
        assert_eq!(Opcode::JumpIfNot(0).display(5), "jumpifnot 6");
        assert!(!Opcode::Jump(0).may_fall_through());
        assert!(Opcode::JumpIf(0).may_fall_through());
    }

    #[test]
    fn constants_know_their_type() {
        assert_eq!(Constant::Int(3).type_id(), TypeId::INT);
        assert_eq!(
            Constant::Fixed {
                ty: TypeId::I32,
                value: -3
            }
            .to_string(),
            "-3i32"
        );
        assert_eq!(Constant::Str("a".to_owned()).type_id(), TypeId::STRING);
        assert!(!Constant::Str("a".to_owned()).is_basic());
    }
}
