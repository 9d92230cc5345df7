//! The expression entity carried through every pipeline stage.

use crate::key::ExprKey;

/// One candidate floating-point expression ("core") plus the metrics that
/// later stages accumulate on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub key: ExprKey,
    /// Shared by an input expression and all of its derived variants.
    pub name: Option<String>,
    pub argc: usize,
    /// Canonical FPCore text exchanged with the engine.
    pub text: String,
    pub compiled: Option<String>,
    pub cost: Option<f64>,
    /// Bits of error, 0 meaning exact.
    pub err: Option<f64>,
    pub descr: Option<String>,
    /// The engine's sampler is unreliable on this expression's domain.
    pub local_sampling: bool,
}

impl Expr {
    pub fn new(key: ExprKey, name: Option<String>, argc: usize, text: impl Into<String>) -> Self {
        Self {
            key,
            name,
            argc,
            text: text.into(),
            compiled: None,
            cost: None,
            err: None,
            descr: None,
            local_sampling: false,
        }
    }

    pub fn with_descr(mut self, descr: Option<String>) -> Self {
        self.descr = descr;
        self
    }

    pub fn with_local_sampling(mut self, local_sampling: bool) -> Self {
        self.local_sampling = local_sampling;
        self
    }

    /// The grouping name, treating an empty string as absent.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    pub fn display_name(&self) -> &str {
        self.name().unwrap_or("<unnamed>")
    }
}
