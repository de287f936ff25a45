//! Function table available to header templates

use gtmpl_value::{Func, FuncError, Value};
use std::collections::HashMap;
use std::fmt;

/// A template function: receives evaluated arguments, piped value last
pub type TemplateFn = Func;

/// Immutable set of functions a template may call
///
/// Built once before compiling a header row and passed to the compiler;
/// there is no process-wide registry.
#[derive(Clone)]
pub struct FunctionTable {
    functions: HashMap<String, TemplateFn>,
}

impl FunctionTable {
    /// An empty table
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// The built-in library: `fen2yuan`
    pub fn builtin() -> Self {
        Self::empty().with("fen2yuan", fen2yuan)
    }

    /// Add (or replace) a function
    pub fn with(mut self, name: impl Into<String>, func: TemplateFn) -> Self {
        self.functions.insert(name.into(), func);
        self
    }

    pub fn get(&self, name: &str) -> Option<TemplateFn> {
        self.functions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TemplateFn)> {
        self.functions.iter().map(|(name, func)| (name.as_str(), *func))
    }

    /// Function names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTable")
            .field("functions", &self.names())
            .finish()
    }
}

/// Convert an amount in minor units (fen, cents) to major units with two decimals
///
/// Accepts an integer or a string holding an integer. Anything else is
/// returned unchanged.
pub fn fen2yuan(args: &[Value]) -> Result<Value, FuncError> {
    let [fen] = args else {
        return Err(FuncError::ExactlyXArgs("fen2yuan".to_string(), 1));
    };

    let minor = match fen {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    };

    Ok(match minor {
        Some(minor) => Value::String(format_minor_units(minor)),
        None => fen.clone(),
    })
}

/// 12345 → "123.45", -5 → "-0.05"
fn format_minor_units(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
