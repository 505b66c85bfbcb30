//! Qualified names have the form `ns::raw`, where the namespace may itself contain dots
//! (`std.io::print`). Unqualified names are completed during loading.

const SEPARATOR: &str = "::";

pub const STD: &str = "std";

pub fn namespace(name: &str) -> Option<&str> {
    name.find(SEPARATOR).map(|j| &name[..j])
}

pub fn raw(name: &str) -> &str {
    match name.find(SEPARATOR) {
        Some(j) => &name[j + SEPARATOR.len()..],
        None => name,
    }
}

pub fn has_namespace(name: &str) -> bool {
    name.contains(SEPARATOR)
}

pub fn make(ns: &str, raw: &str) -> String {
    format!("{}{}{}", ns, SEPARATOR, raw)
}

/// Applies a prefix and a suffix to the raw part of a name, keeping its namespace.
pub fn decorate(prefix: &str, name: &str, suffix: &str) -> String {
    match namespace(name) {
        Some(ns) => format!("{}{}{}{}{}", ns, SEPARATOR, prefix, raw(name), suffix),
        None => format!("{}{}{}", prefix, name, suffix),
    }
}

/// Candidate qualified names for a name appearing in code of namespace `ns`, in lookup order.
pub fn candidates(name: &str, ns: Option<&str>) -> Vec<String> {
    if has_namespace(name) {
        return vec![name.to_owned()];
    }
    let mut result = Vec::with_capacity(2);
    if let Some(ns) = ns {
        result.push(make(ns, name));
    }
    if ns != Some(STD) {
        result.push(make(STD, name));
    }
    result
}
