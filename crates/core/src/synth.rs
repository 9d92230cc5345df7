//! Synthesis of single-operator expressions.

use crate::expr::Expr;
use crate::key::{ExprKey, KeySpace};

/// Operators whose domain the engine's sampler handles poorly.
pub const LOCAL_SAMPLING_OPS: &[&str] = &["lgamma", "tgamma"];

/// Zero-arity identity expression used as the timing reference point.
pub fn baseline() -> Expr {
    Expr::new(
        ExprKey::new(KeySpace::Synthesized, "baseline"),
        Some("baseline".to_string()),
        0,
        "(FPCore () :name \"baseline\" 0)",
    )
}

/// Applies `op` to `argc` fresh variables `x0..x{argc-1}`.
pub fn synthesize(op: &str, argc: usize) -> Expr {
    let symbol = if op == "neg" { "-" } else { op };
    let vars: Vec<String> = (0..argc).map(|i| format!("x{i}")).collect();
    let app = std::iter::once(symbol.to_string())
        .chain(vars.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");
    let text = format!("(FPCore ({}) :name \"{op}\" ({app}))", vars.join(" "));

    Expr::new(
        ExprKey::new(KeySpace::Synthesized, op),
        Some(op.to_string()),
        argc,
        text,
    )
    .with_local_sampling(LOCAL_SAMPLING_OPS.contains(&op))
}

pub fn synthesize_unary(op: &str) -> Expr {
    synthesize(op, 1)
}

pub fn synthesize_binary(op: &str) -> Expr {
    synthesize(op, 2)
}

pub fn synthesize_ternary(op: &str) -> Expr {
    synthesize(op, 3)
}

pub fn synthesize_nary(op: &str, argc: usize) -> Expr {
    synthesize(op, argc)
}
