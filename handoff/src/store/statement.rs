use crate::errors::{ErrorKind, HandoffError, HandoffResult};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

/// Whether `name` can be used as a table name: an ASCII letter or `_`, then letters,
/// digits or `_`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// A parameterized insert into one table.
///
/// ```rust,ignore
/// let statement = WriteStatement::insert("HANDOFF_TEST").bind("@1", "2024-01-01T00:00:00Z");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WriteStatement {
    table: String,
    parameters: Vec<(String, Value)>,
}

impl WriteStatement {
    pub fn insert(table: &str) -> Self {
        WriteStatement {
            table: table.to_string(),
            parameters: Vec::new(),
        }
    }

    /// Binds `value` to the parameter `name`.
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.push((name.to_string(), value.into()));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn parameters(&self) -> &[(String, Value)] {
        &self.parameters
    }

    /// Checks the statement can be executed.
    ///
    /// # Errors
    /// `ResourceOperationError` for a table name that is not an identifier, no parameter,
    /// or a parameter name that is not `@`-prefixed or is bound twice.
    pub fn validate(&self) -> HandoffResult<()> {
        if !is_identifier(&self.table) {
            return Err(invalid(&format!("Invalid table name '{}'", self.table)));
        }
        if self.parameters.is_empty() {
            return Err(invalid(&format!(
                "Insert into {} binds no parameter",
                self.table
            )));
        }

        let mut seen = HashSet::new();
        for (name, _) in &self.parameters {
            let valid = name
                .strip_prefix('@')
                .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
            if !valid {
                return Err(invalid(&format!("Invalid parameter name '{}'", name)));
            }
            if !seen.insert(name.as_str()) {
                return Err(invalid(&format!("Parameter '{}' is bound twice", name)));
            }
        }
        Ok(())
    }
}

impl Display for WriteStatement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.parameters.iter().map(|(n, _)| n.as_str()).collect();
        write!(f, "INSERT INTO {} VALUES ({})", self.table, names.join(", "))
    }
}

fn invalid(message: &str) -> HandoffError {
    HandoffError::new(message, ErrorKind::ResourceOperationError)
}
