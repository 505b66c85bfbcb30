use crate::builder::FunctionBuilder;
use crate::error::ErrorKind;
use crate::function::{AccessorKind, FunctionKind, NativeOp};
use crate::names;
use crate::opcode::Constant;
use crate::program::Program;
use crate::types::{ElementKind, TypeId, INTEGER_TYPES};

const INT_BINARY: &[&str] = &["+", "-", "*", "/", "%", "and", "or", "xor", "eqv"];
const INT_UNARY: &[&str] = &["neg", "++", "--", "not"];
const INT_COMPARE: &[&str] = &["<", "<=", ">", ">="];
const BOOL_BINARY: &[&str] = &["and", "or", "xor", "eqv"];

const CONVERSIONS: &[(&str, TypeId)] = &[
    ("^u8", TypeId::U8),
    ("^u16", TypeId::U16),
    ("^u32", TypeId::U32),
    ("^u64", TypeId::U64),
    ("^i8", TypeId::I8),
    ("^i16", TypeId::I16),
    ("^i32", TypeId::I32),
    ("^i64", TypeId::I64),
    ("^int", TypeId::INT),
];

fn std_name(raw: &str) -> String {
    names::make(names::STD, raw)
}

fn typed(
    program: &mut Program,
    raw: &str,
    params: &[TypeId],
    results: &[TypeId],
) -> Result<(), ErrorKind> {
    program.add_native(
        &std_name(raw),
        params.to_vec(),
        NativeOp::Typed {
            params: params.to_vec(),
            results: results.to_vec(),
        },
    )
}

/// Registers the primitive natives that do not depend on user types.
pub fn register_core(program: &mut Program) -> Result<(), ErrorKind> {
    let obj = TypeId::OBJECT;
    let bool_ = TypeId::BOOL;

    typed(program, "=", &[obj, obj], &[bool_])?;
    typed(program, "<>", &[obj, obj], &[bool_])?;
    typed(program, "drop", &[obj], &[])?;

    let shuffles: &[(&str, usize, NativeOp)] = &[
        ("dup", 1, NativeOp::Dup),
        ("swap", 2, NativeOp::Swap),
        ("over", 2, NativeOp::Over),
        ("rot", 3, NativeOp::Rot),
        ("-rot", 3, NativeOp::NRot),
    ];
    for (raw, arity, op) in shuffles {
        program.add_native(&std_name(raw), vec![obj; *arity], op.clone())?;
    }

    for raw in BOOL_BINARY {
        typed(program, raw, &[bool_, bool_], &[bool_])?;
    }
    typed(program, "not", &[bool_], &[bool_])?;

    for &ty in INTEGER_TYPES {
        for raw in INT_BINARY {
            typed(program, raw, &[ty, ty], &[ty])?;
        }
        typed(program, "/%", &[ty, ty], &[ty, ty])?;
        for raw in INT_UNARY {
            typed(program, raw, &[ty], &[ty])?;
        }
        for raw in INT_COMPARE {
            typed(program, raw, &[ty, ty], &[bool_])?;
        }
        for &(raw, target) in CONVERSIONS {
            typed(program, raw, &[ty], &[target])?;
        }
    }

    typed(
        program,
        "+",
        &[TypeId::STRING, TypeId::STRING],
        &[TypeId::STRING],
    )?;
    program.add_native(&std_name("new"), vec![TypeId::TYPE], NativeOp::New)?;

    let interpreter_only: &[(&str, TypeId)] = &[
        ("std::fail", TypeId::STRING),
        ("std::name", TypeId::TYPE),
        ("std.io::print", obj),
        ("std.io::println", obj),
    ];
    for &(name, param) in interpreter_only {
        program.add_native(name, vec![param], NativeOp::InterpreterOnly)?;
    }
    Ok(())
}

/// Registers the zero-argument function named after a type, which pushes the type itself.
pub fn register_type_function(program: &mut Program, ty: TypeId) -> Result<(), ErrorKind> {
    let name = program.types.name(ty).to_owned();
    program.add_native(&name, Vec::new(), NativeOp::TypeOf(ty))
}

fn accessor(
    program: &mut Program,
    name: &str,
    params: Vec<TypeId>,
    owner: TypeId,
    kind: AccessorKind,
) -> Result<(), ErrorKind> {
    program.add_native(name, params, NativeOp::Accessor { owner, kind })
}

/// Registers the accessors of every element of a freshly closed structure type.
pub fn register_element_accessors(program: &mut Program, owner: TypeId) -> Result<(), ErrorKind> {
    let elements = program.types.get(owner).elements.clone();
    let int = TypeId::INT;
    for elt in &elements {
        let name = elt.name.as_str();
        match elt.kind {
            ElementKind::Field { ty, slot } => {
                accessor(program, name, vec![owner], owner, AccessorKind::FieldGet { slot })?;
                accessor(
                    program,
                    &names::decorate("->", name, ""),
                    vec![ty, owner],
                    owner,
                    AccessorKind::FieldPut { slot },
                )?;
                accessor(
                    program,
                    &names::decorate("Z->", name, ""),
                    vec![owner],
                    owner,
                    AccessorKind::FieldClear,
                )?;
                accessor(
                    program,
                    &names::decorate("", name, "?"),
                    vec![owner],
                    owner,
                    AccessorKind::FieldTest,
                )?;
            }
            ElementKind::FieldArray { ty, slot, .. } => {
                accessor(
                    program,
                    &names::decorate("", name, "@"),
                    vec![int, owner],
                    owner,
                    AccessorKind::FieldArrayGet { slot },
                )?;
                accessor(
                    program,
                    &names::decorate("->", name, "@"),
                    vec![ty, int, owner],
                    owner,
                    AccessorKind::FieldArrayPut { slot },
                )?;
                accessor(
                    program,
                    &names::decorate("Z->", name, "@"),
                    vec![int, owner],
                    owner,
                    AccessorKind::FieldArrayClear,
                )?;
                accessor(
                    program,
                    &names::decorate("", name, "@?"),
                    vec![int, owner],
                    owner,
                    AccessorKind::FieldArrayTest,
                )?;
            }
            ElementKind::Embed { ty, .. } => {
                accessor(
                    program,
                    &names::decorate("", name, "&"),
                    vec![owner],
                    owner,
                    AccessorKind::EmbedRef { ty },
                )?;
            }
            ElementKind::EmbedArray { ty, .. } => {
                accessor(
                    program,
                    &names::decorate("", name, "@&"),
                    vec![int, owner],
                    owner,
                    AccessorKind::EmbedArrayRef { ty },
                )?;
            }
        }
    }
    Ok(())
}

/// Registers the `std::` accessors of a freshly created array type.
pub fn register_array_accessors(program: &mut Program, array: TypeId) -> Result<(), ErrorKind> {
    let info = match program.types.get(array).array {
        Some(info) => info,
        None => return Ok(()),
    };
    let int = TypeId::INT;
    let a = array;

    let mut entries = vec![
        ("sub", vec![int, int, a, a], AccessorKind::ArraySub),
        ("subself", vec![int, int, a], AccessorKind::ArraySubSelf),
        ("init?", vec![a], AccessorKind::ArrayIsInit),
        ("length", vec![a], AccessorKind::ArrayLength),
        ("make", vec![int, a], AccessorKind::ArrayMake),
    ];
    if info.embedded {
        entries.push(("@&", vec![int, a], AccessorKind::ArrayRef));
    } else {
        entries.push(("@", vec![int, a], AccessorKind::ArrayGet));
        entries.push(("->@", vec![info.element, int, a], AccessorKind::ArrayPut));
        entries.push(("Z->@", vec![int, a], AccessorKind::ArrayClear));
        entries.push(("@?", vec![int, a], AccessorKind::ArrayIsEltInit));
    }
    for (raw, params, kind) in entries {
        accessor(program, &std_name(raw), params, a, kind)?;
    }

    if !info.embedded {
        register_array_equality(program, a)?;
    }
    Ok(())
}

/// Element-wise equality over arrays of references, as interpreted code so that element
/// comparisons may themselves resolve to interpreted functions.
fn register_array_equality(program: &mut Program, array: TypeId) -> Result<(), ErrorKind> {
    let eq = std_name("=");
    let mut fb = FunctionBuilder::new(&eq);
    for local in ["a1", "a2", "len", "i"] {
        fb.def_local_field(local, None)?;
    }
    fn local(fb: &mut FunctionBuilder, word: &str) {
        let found = fb.do_local(word);
        debug_assert!(found, "undefined local {}", word);
    }

    local(&mut fb, "->a2");
    local(&mut fb, "->a1");
    local(&mut fb, "a1");
    fb.call("std::length");
    local(&mut fb, "->len");

    local(&mut fb, "len");
    local(&mut fb, "a2");
    fb.call("std::length");
    fb.call("std::=");
    fb.ahead_if();
    fb.literal(Constant::Bool(false));
    fb.ret();
    fb.then()?;

    fb.literal(Constant::Int(0));
    local(&mut fb, "->i");

    fb.begin();
    local(&mut fb, "i");
    local(&mut fb, "len");
    fb.call("std::<");
    fb.while_()?;

    local(&mut fb, "i");
    local(&mut fb, "a1");
    fb.call("std::@");
    local(&mut fb, "i");
    local(&mut fb, "a2");
    fb.call("std::@");
    fb.call("std::=");
    fb.ahead_if();
    fb.literal(Constant::Bool(false));
    fb.ret();
    fb.then()?;

    local(&mut fb, "i");
    fb.call("std::++");
    local(&mut fb, "->i");
    fb.repeat()?;

    fb.literal(Constant::Bool(true));
    fb.ret();

    let equal = fb.build()?;
    program.add_function(&eq, vec![array, array], FunctionKind::Interpreted(equal))?;

    let ne = std_name("<>");
    let mut fb = FunctionBuilder::new(&ne);
    fb.call("std::=");
    fb.call("std::not");
    fb.ret();
    let not_equal = fb.build()?;
    program.add_function(&ne, vec![array, array], FunctionKind::Interpreted(not_equal))?;
    Ok(())
}
