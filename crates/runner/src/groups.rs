//! Variant groups: expressions sharing a name with the input they came from.

use fpbench_core::Expr;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupError {
    #[error("expression has no name: {text}")]
    MissingName { text: String },
}

/// Requires a grouping name on `expr`.
pub fn require_name(expr: &Expr) -> Result<&str, GroupError> {
    expr.name().ok_or_else(|| GroupError::MissingName {
        text: expr.text.clone(),
    })
}

/// Indices into one immutable expression list, grouped by name in list order.
#[derive(Debug, Clone, Default)]
pub struct VariantGroups {
    by_name: HashMap<String, Vec<usize>>,
}

impl VariantGroups {
    /// Fails on the first unnamed expression rather than dropping it.
    pub fn build(exprs: &[Expr]) -> Result<Self, GroupError> {
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, expr) in exprs.iter().enumerate() {
            let name = require_name(expr)?;
            by_name.entry(name.to_string()).or_default().push(index);
        }
        Ok(Self { by_name })
    }

    /// Members of the group called `name`; empty when there are none.
    pub fn members(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
