use crate::error::ErrorKind;
use crate::function::{Function, FunctionId, FunctionKind, FunctionTable, NativeOp};
use crate::kernel;
use crate::types::{TypeId, TypeTable};

/// The closed world handed to the analysis: every type and every registered function.
#[derive(Clone, Debug)]
pub struct Program {
    pub types: TypeTable,
    pub functions: FunctionTable,
    /// Entry points declared by the program description, if any.
    pub entry_points: Vec<String>,
}

fn parse_array_name(name: &str) -> Option<(&str, bool)> {
    let inner = name.strip_prefix('(')?.strip_suffix(')')?;
    if let Some(element) = inner.strip_suffix(" std::array&") {
        Some((element.trim(), true))
    } else {
        inner
            .strip_suffix(" std::array")
            .map(|element| (element.trim(), false))
    }
}

impl Program {
    pub fn new() -> Result<Self, ErrorKind> {
        let mut program = Program {
            types: TypeTable::new(),
            functions: FunctionTable::new(),
            entry_points: Vec::new(),
        };
        kernel::register_core(&mut program)?;
        let builtin: Vec<TypeId> = program.types.ids().collect();
        for ty in builtin {
            kernel::register_type_function(&mut program, ty)?;
            kernel::register_array_accessors(&mut program, ty)?;
        }
        Ok(program)
    }

    /// Finds a type by name, creating it (NAMED, or as an array type for `(E std::array)` and
    /// `(E std::array&)`) on first reference.
    pub fn declare_type(&mut self, name: &str) -> Result<TypeId, ErrorKind> {
        if let Some((element, embedded)) = parse_array_name(name) {
            let element = self.declare_type(element)?;
            return self.array_type(element, embedded);
        }
        let (id, created) = self.types.declare(name);
        if created {
            kernel::register_type_function(self, id)?;
        }
        Ok(id)
    }

    pub fn array_type(&mut self, element: TypeId, embedded: bool) -> Result<TypeId, ErrorKind> {
        let (id, created) = self.types.checked_array(element, embedded)?;
        if created {
            kernel::register_type_function(self, id)?;
            kernel::register_array_accessors(self, id)?;
        }
        Ok(id)
    }

    pub fn close_type(&mut self, id: TypeId) -> Result<(), ErrorKind> {
        for closed in self.types.close(id)? {
            kernel::register_element_accessors(self, closed)?;
        }
        Ok(())
    }

    pub fn add_function(
        &mut self,
        name: &str,
        params: Vec<TypeId>,
        kind: FunctionKind,
    ) -> Result<FunctionId, ErrorKind> {
        let id = self.functions.add(Function {
            name: name.to_owned(),
            kind,
        });
        self.functions.register(&self.types, name, params, id)?;
        Ok(id)
    }

    pub fn add_native(
        &mut self,
        name: &str,
        params: Vec<TypeId>,
        op: NativeOp,
    ) -> Result<(), ErrorKind> {
        self.add_function(name, params, FunctionKind::Native(op))
            .map(|_| ())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn array_names_create_array_types() {
        let mut program = Program::new().unwrap();
        assert_eq!(
            program.declare_type("(std::u8 std::array)").unwrap(),
            TypeId::STRING
        );

        let t = program.declare_type("def::t").unwrap();
        program.types.open(t).unwrap();
        program.close_type(t).unwrap();

        let arr = program.declare_type("(def::t std::array&)").unwrap();
        let info = program.types.get(arr).array.unwrap();
        assert_eq!(info.element, t);
        assert!(info.embedded);
        assert!(program.functions.lookup_no_args("(def::t std::array&)").is_some());
        assert!(program.functions.contains("std::@&"));

        let nested = program
            .declare_type("((def::t std::array) std::array)")
            .unwrap();
        let inner = program.types.get(nested).array.unwrap().element;
        assert_eq!(program.types.name(inner), "(def::t std::array)");
    }

    #[test]
    fn type_function_conflicts_with_user_function() {
        let mut program = Program::new().unwrap();
        program
            .add_native("def::t", Vec::new(), NativeOp::InterpreterOnly)
            .unwrap();
        assert!(matches!(
            program.declare_type("def::t"),
            Err(ErrorKind::DuplicateRegistration { .. })
        ));
    }
}
