use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::frontend::ast::Block;
use crate::mount::registry::MergedUnit;

/// Runtime value of the unit language.
#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Arc<Vec<Value>>),
    Func(Arc<FuncValue>),
    Unit(Arc<MergedUnit>),
}

impl Value {
    pub fn list(values: Vec<Value>) -> Self {
        Value::List(Arc::new(values))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Func(_) => "function",
            Value::Unit(_) => "unit",
        }
    }

    /// Human-readable rendering used by `str` and `emit`.
    pub fn render(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(render_quoted).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Func(f) => format!("fn {}", f.name),
            Value::Unit(u) => format!("unit {}", u.name()),
        }
    }
}

fn render_quoted(v: &Value) -> String {
    match v {
        Value::Str(s) => format!("{:?}", s),
        other => other.render(),
    }
}

/// Structural equality for data; identity for functions and units.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.as_ref() == b.as_ref(),
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(a, b),
            (Value::Unit(a), Value::Unit(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A function value closes over the namespace of the unit that defined it.
/// Free names in its body are resolved against that namespace at call time,
/// which is what makes later rebindings visible to earlier definitions.
pub struct FuncValue {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub globals: Arc<Namespace>,
    pub unit: String,
}

impl fmt::Debug for FuncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncValue")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("unit", &self.unit)
            .finish_non_exhaustive()
    }
}

/// Shared, late-bound symbol table. One instance backs each merged unit;
/// base and override items are executed into the same instance so that the
/// last binding for a name wins at lookup time.
pub struct Namespace {
    map: RwLock<HashMap<String, Value>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.map.read().expect("namespace lock poisoned").get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.map
            .write()
            .expect("namespace lock poisoned")
            .insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.read().expect("namespace lock poisoned").contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .map
            .read()
            .expect("namespace lock poisoned")
            .keys()
            .cloned()
            .collect();
        out.sort();
        out
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace").field("names", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_equality_is_structural() {
        assert_eq!(Value::Int(2), Value::Int(2));
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_eq!(
            Value::list(vec![Value::Str("a".to_string())]),
            Value::list(vec![Value::Str("a".to_string())])
        );
        assert_ne!(Value::Int(2), Value::Str("2".to_string()));
    }

    #[test]
    fn namespace_last_binding_wins() {
        let ns = Namespace::new();
        ns.set("x", Value::Int(1));
        ns.set("x", Value::Int(2));
        assert_eq!(ns.get("x"), Some(Value::Int(2)));
        assert_eq!(ns.names(), vec!["x".to_string()]);
    }

    #[test]
    fn render_forms() {
        assert_eq!(Value::Nil.render(), "nil");
        assert_eq!(
            Value::list(vec![Value::Int(1), Value::Str("a".to_string())]).render(),
            "[1, \"a\"]"
        );
    }
}
