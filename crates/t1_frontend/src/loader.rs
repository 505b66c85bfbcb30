use crate::builder::FunctionBuilder;
use crate::error::{Error, ErrorKind};
use crate::function::{Function, FunctionKind};
use crate::names;
use crate::opcode::Constant;
use crate::program::Program;
use crate::types::{TypeId, TypeState};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramDesc {
    #[serde(default)]
    pub types: Vec<TypeDesc>,
    #[serde(default)]
    pub functions: Vec<FunctionDesc>,
    #[serde(default)]
    pub entry_points: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDesc {
    pub name: String,
    #[serde(default)]
    pub elements: Vec<ElementDesc>,
    #[serde(default)]
    pub supertypes: Vec<String>,
    #[serde(default)]
    pub full: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ElementDesc {
    Field {
        name: String,
        #[serde(rename = "type")]
        ty: String,
        #[serde(default)]
        size: Option<i64>,
    },
    Embed {
        name: String,
        #[serde(rename = "type")]
        ty: String,
        #[serde(default)]
        size: Option<i64>,
    },
    Extension {
        #[serde(rename = "type")]
        ty: String,
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionDesc {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub immediate: bool,
    #[serde(default)]
    pub locals: Vec<LocalDesc>,
    pub code: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalDesc {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub embed: bool,
}

fn within(name: &str) -> impl FnOnce(ErrorKind) -> Error + '_ {
    move |kind| Error::from(kind).in_definition(name)
}

pub fn load_program(path: &Path) -> Result<Program, Error> {
    let text = fs::read_to_string(path)
        .map_err(|err| Error::from(ErrorKind::ReadFailed(path.to_owned(), err)).in_file(path))?;
    parse_program(&text).map_err(|err| err.in_file(path))
}

pub fn parse_program(text: &str) -> Result<Program, Error> {
    let desc: ProgramDesc = serde_json::from_str(text).map_err(ErrorKind::ParseFailed)?;
    build_program(&desc)
}

pub fn build_program(desc: &ProgramDesc) -> Result<Program, Error> {
    let mut program = Program::new()?;

    let mut defined = Vec::with_capacity(desc.types.len());
    for td in &desc.types {
        let id = program.declare_type(&td.name).map_err(within(&td.name))?;
        program.types.open(id).map_err(within(&td.name))?;
        defined.push(id);
    }

    for (td, &id) in desc.types.iter().zip(&defined) {
        define_type(&mut program, td, id).map_err(within(&td.name))?;
    }

    for (td, &id) in desc.types.iter().zip(&defined) {
        program.close_type(id).map_err(within(&td.name))?;
    }

    let known: BTreeSet<&str> = desc.functions.iter().map(|fd| fd.name.as_str()).collect();
    for fd in &desc.functions {
        define_function(&mut program, fd, &known).map_err(within(&fd.name))?;
    }

    let undefined: Vec<TypeId> = program
        .types
        .ids()
        .filter(|&id| program.types.get(id).state == TypeState::Named)
        .collect();
    if let Some(&id) = undefined.first() {
        return Err(ErrorKind::CloseUndefined(program.types.name(id).to_owned()).into());
    }

    program.entry_points = desc.entry_points.clone();
    Ok(program)
}

fn define_type(program: &mut Program, td: &TypeDesc, id: TypeId) -> Result<(), ErrorKind> {
    for elt in &td.elements {
        match elt {
            ElementDesc::Field { name, ty, size } => {
                let ty = program.declare_type(ty)?;
                match size {
                    Some(size) => program.types.add_field_array(id, name, *size, ty)?,
                    None => program.types.add_field(id, name, ty)?,
                }
            }
            ElementDesc::Embed { name, ty, size } => {
                let ty = program.declare_type(ty)?;
                match size {
                    Some(size) => program.types.add_embed_array(id, name, *size, ty)?,
                    None => program.types.add_embed(id, name, ty)?,
                }
            }
            ElementDesc::Extension { ty } => {
                let ty = program.declare_type(ty)?;
                program.types.add_extension(id, ty)?;
            }
        }
    }
    for sup in &td.supertypes {
        let sup = program.declare_type(sup)?;
        program.types.add_super_type(id, sup)?;
    }
    if td.full {
        program.types.mark_full(id)?;
    }
    Ok(())
}

fn define_function(
    program: &mut Program,
    fd: &FunctionDesc,
    known: &BTreeSet<&str>,
) -> Result<(), ErrorKind> {
    let mut fb = FunctionBuilder::new(&fd.name);
    for local in &fd.locals {
        let ty = match &local.ty {
            Some(name) => Some(program.declare_type(name)?),
            None => None,
        };
        match (local.embed, local.size) {
            (false, None) => fb.def_local_field(&local.name, ty)?,
            (false, Some(len)) => fb.def_local_field_array(&local.name, len, ty)?,
            (true, size) => {
                let ty = ty.unwrap_or(TypeId::OBJECT);
                if !program.types.is_embeddable(ty) {
                    return Err(ErrorKind::NotEmbeddable(program.types.name(ty).to_owned()));
                }
                match size {
                    Some(len) => fb.def_local_embed_array(&local.name, len, ty)?,
                    None => fb.def_local_embed(&local.name, ty)?,
                }
            }
        }
    }

    let ns = names::namespace(&fd.name);
    for token in &fd.code {
        emit_token(program, &mut fb, token, ns, known)?;
    }
    let function = fb.build()?;

    if fd.immediate {
        let id = program.functions.add(Function {
            name: fd.name.clone(),
            kind: FunctionKind::Interpreted(function),
        });
        program.functions.register_immediate(&fd.name, id)?;
    } else {
        let params = fd
            .params
            .iter()
            .map(|name| program.declare_type(name))
            .collect::<Result<Vec<_>, _>>()?;
        program.add_function(&fd.name, params, FunctionKind::Interpreted(function))?;
    }
    Ok(())
}

fn emit_token(
    program: &mut Program,
    fb: &mut FunctionBuilder,
    token: &str,
    ns: Option<&str>,
    known: &BTreeSet<&str>,
) -> Result<(), ErrorKind> {
    match token {
        "ret" => fb.ret(),
        "if" => fb.if_(),
        "ifnot" => fb.if_not(),
        "else" => fb.else_()?,
        "then" => fb.then()?,
        "ahead" => fb.ahead(),
        "begin" => fb.begin(),
        "again" => fb.again()?,
        "until" => fb.again_if_not()?,
        "while" => fb.while_()?,
        "repeat" => fb.repeat()?,
        _ => {
            if let Some(value) = parse_literal(token)? {
                fb.literal(value);
            } else if !fb.do_local(token) {
                if token.starts_with('(') {
                    program.declare_type(token)?;
                }
                fb.call(&complete_name(program, token, ns, known));
            }
        }
    }
    Ok(())
}

/// Qualifies a call name against the caller's namespace, then `std`. Names that resolve nowhere
/// keep their first candidate so that the analysis reports them.
fn complete_name(
    program: &Program,
    token: &str,
    ns: Option<&str>,
    known: &BTreeSet<&str>,
) -> String {
    let candidates = names::candidates(token, ns);
    candidates
        .iter()
        .find(|name| program.functions.contains(name) || known.contains(name.as_str()))
        .or_else(|| candidates.first())
        .cloned()
        .unwrap_or_else(|| token.to_owned())
}

const FIXED_SUFFIXES: &[(&str, TypeId, i128, i128)] = &[
    ("u16", TypeId::U16, 0, u16::MAX as i128),
    ("u32", TypeId::U32, 0, u32::MAX as i128),
    ("u64", TypeId::U64, 0, u64::MAX as i128),
    ("i16", TypeId::I16, i16::MIN as i128, i16::MAX as i128),
    ("i32", TypeId::I32, i32::MIN as i128, i32::MAX as i128),
    ("i64", TypeId::I64, i64::MIN as i128, i64::MAX as i128),
    ("u8", TypeId::U8, 0, u8::MAX as i128),
    ("i8", TypeId::I8, i8::MIN as i128, i8::MAX as i128),
];

pub fn parse_literal(token: &str) -> Result<Option<Constant>, ErrorKind> {
    match token {
        "true" => return Ok(Some(Constant::Bool(true))),
        "false" => return Ok(Some(Constant::Bool(false))),
        _ => {}
    }
    let invalid = || ErrorKind::InvalidLiteral(token.to_owned());

    if token.starts_with('"') {
        let value: String = serde_json::from_str(token).map_err(|_| invalid())?;
        return Ok(Some(Constant::Str(value)));
    }

    let digits = token.strip_prefix('-').unwrap_or(token);
    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(None);
    }

    for &(suffix, ty, min, max) in FIXED_SUFFIXES {
        if let Some(number) = token.strip_suffix(suffix) {
            let value: i128 = number.parse().map_err(|_| invalid())?;
            if value < min || value > max {
                return Err(invalid());
            }
            return Ok(Some(Constant::Fixed { ty, value }));
        }
    }
    let value: i64 = token.parse().map_err(|_| invalid())?;
    Ok(Some(Constant::Int(value)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::function::{Function, FunctionKind};
    use crate::opcode::Opcode;

    #[test]
    fn literals() {
        assert_eq!(parse_literal("true").unwrap(), Some(Constant::Bool(true)));
        assert_eq!(parse_literal("42").unwrap(), Some(Constant::Int(42)));
        assert_eq!(
            parse_literal("-3i32").unwrap(),
            Some(Constant::Fixed {
                ty: TypeId::I32,
                value: -3
            })
        );
        assert_eq!(
            parse_literal("255u8").unwrap(),
            Some(Constant::Fixed {
                ty: TypeId::U8,
                value: 255
            })
        );
        assert_eq!(
            parse_literal("\"a\\nb\"").unwrap(),
            Some(Constant::Str("a\nb".to_owned()))
        );
        assert_eq!(parse_literal("dup").unwrap(), None);
        assert_eq!(parse_literal("-rot").unwrap(), None);
        assert!(matches!(
            parse_literal("256u8"),
            Err(ErrorKind::InvalidLiteral(_))
        ));
        assert!(matches!(
            parse_literal("12abc"),
            Err(ErrorKind::InvalidLiteral(_))
        ));
    }

    #[test]
    fn loads_types_and_functions() {
        let program = parse_program(
            r#"{
                "types": [
                    {"name": "def::base", "elements": [
                        {"kind": "field", "name": "def::v", "type": "std::i32"}
                    ]},
                    {"name": "def::derived", "elements": [
                        {"kind": "extension", "type": "def::base"},
                        {"kind": "field", "name": "def::tags", "type": "std::string", "size": 2}
                    ]}
                ],
                "functions": [
                    {"name": "def::main", "locals": [{"name": "x"}],
                     "code": ["1", "->x", "x", "helper", "dup", "drop", "drop"]},
                    {"name": "def::helper", "params": ["std::int"], "code": []}
                ],
                "entry_points": ["def::main"]
            }"#,
        )
        .unwrap();

        let derived = program.types.lookup("def::derived").unwrap();
        let base = program.types.lookup("def::base").unwrap();
        assert!(program.types.is_sub_type_of(derived, base));
        assert_eq!(program.types.get(derived).state, TypeState::Closed);
        assert!(program.functions.contains("def::->tags@"));
        assert!(program.functions.contains("def::base&"));

        let main = program.functions.lookup_no_args("def::main").unwrap();
        let code = match &program.functions.get(main).kind {
            FunctionKind::Interpreted(f) => f.code.clone(),
            FunctionKind::Native(_) => panic!("expected interpreted code"),
        };
        assert_eq!(
            code,
            vec![
                Opcode::Const(Constant::Int(1)),
                Opcode::PutLocal {
                    offset: 0,
                    ty: None
                },
                Opcode::GetLocal { offset: 0 },
                Opcode::Call("def::helper".to_owned()),
                Opcode::Call("std::dup".to_owned()),
                Opcode::Call("std::drop".to_owned()),
                Opcode::Call("std::drop".to_owned()),
                Opcode::Ret,
            ]
        );
        assert_eq!(program.entry_points, vec!["def::main".to_owned()]);
    }

    #[test]
    fn undefined_types_are_rejected() {
        let err = parse_program(
            r#"{"functions": [{"name": "def::f", "params": ["def::nope"], "code": []}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::CloseUndefined(_)));
    }

    #[test]
    fn errors_name_their_definition() {
        let err = parse_program(
            r#"{"functions": [{"name": "def::f", "code": ["if"]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ControlFlowNotEmpty(_)));

        let err = parse_program(r#"{"types": [{"name": "std::i32"}]}"#).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Reopen(_)));
    }
}
