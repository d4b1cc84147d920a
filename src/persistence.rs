//! Stored-procedure execution boundary.
//!
//! The relational layer is an external collaborator: the framework only
//! speaks named procedures with named in/out parameters. Every call carries
//! the [`Activity`](crate::activity::Activity) that scopes the target
//! database. Calls are synchronous and block for their duration; implementers
//! that need timeouts add them behind this trait.

use std::collections::HashMap;

use crate::activity::Activity;
use crate::error::{FrameworkError, Result};

/// Scalar value crossing the procedure boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Str(String),
    Null,
}

impl Value {
    /// Interpret the value as an integer, accepting numeric strings. A
    /// present-but-unparseable value is an error rather than a silent zero.
    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Str(s) => s.trim().parse().map_err(|_| {
                FrameworkError::Validation(format!("cannot convert value '{s}' to an integer"))
            }),
            Value::Null => Err(FrameworkError::Validation(
                "cannot convert NULL to an integer".to_string(),
            )),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::Null => String::new(),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Named procedure parameter. Output parameters are filled in by the
/// executor and read back by the caller after the call returns.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    pub direction: Direction,
}

impl Parameter {
    pub fn input(name: &str, value: impl Into<Value>) -> Self {
        Parameter {
            name: name.to_string(),
            value: value.into(),
            direction: Direction::Input,
        }
    }

    pub fn output(name: &str) -> Self {
        Parameter {
            name: name.to_string(),
            value: Value::Null,
            direction: Direction::Output,
        }
    }
}

/// One result row, keyed by column name.
#[derive(Debug, Clone, Default)]
pub struct Row(HashMap<String, Value>);

impl Row {
    pub fn new(columns: impl IntoIterator<Item = (String, Value)>) -> Self {
        Row(columns.into_iter().collect())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Column value, failing with the column name when absent.
    pub fn require(&self, column: &str) -> Result<&Value> {
        self.0.get(column).ok_or_else(|| {
            FrameworkError::Validation(format!("column '{column}' missing from result row"))
        })
    }
}

/// Generic SQL-execution collaborator.
pub trait ProcedureExecutor: Send + Sync {
    /// Execute a procedure for its side effects. Output parameters in
    /// `params` are populated before returning.
    fn execute_non_query(
        &self,
        scope: &Activity,
        procedure: &str,
        params: &mut [Parameter],
    ) -> Result<()>;

    /// Execute a procedure returning a single scalar (or nothing).
    fn execute_scalar(
        &self,
        scope: &Activity,
        procedure: &str,
        params: &mut [Parameter],
    ) -> Result<Option<Value>>;

    /// Execute a procedure returning a rowset.
    fn execute_rows(
        &self,
        scope: &Activity,
        procedure: &str,
        params: &mut [Parameter],
    ) -> Result<Vec<Row>>;

    /// Execute a raw statement returning a single scalar. Only used for
    /// session probes such as the impersonation principal check.
    fn execute_statement_scalar(&self, scope: &Activity, statement: &str) -> Result<Option<Value>>;
}

/// Read back a named output parameter after a call.
pub fn output_value<'a>(params: &'a [Parameter], name: &str) -> Result<&'a Value> {
    params
        .iter()
        .find(|p| p.direction == Direction::Output && p.name == name)
        .map(|p| &p.value)
        .ok_or_else(|| {
            FrameworkError::Validation(format!("output parameter '{name}' was not returned"))
        })
}
