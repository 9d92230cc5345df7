//! Request framing: one S-expression command per line.

use fpbench_core::format_numeral;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone)]
pub enum Request<'a> {
    Sample { count: usize, expr: &'a str },
    Read { path: &'a Path },
    Compile { lang: &'a str, expr: &'a str },
    Cost { expr: &'a str },
    Desugar { expr: &'a str },
    Error { input: &'a str, variants: &'a [&'a str] },
    Improve { exprs: &'a [&'a str], threads: usize },
    Pareto { frontiers: &'a [Vec<(f64, f64)>] },
    Exit,
}

impl Request<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Sample { .. } => "sample",
            Request::Read { .. } => "read",
            Request::Compile { .. } => "compile",
            Request::Cost { .. } => "cost",
            Request::Desugar { .. } => "desugar",
            Request::Error { .. } => "error",
            Request::Improve { .. } => "improve",
            Request::Pareto { .. } => "pareto",
            Request::Exit => "exit",
        }
    }
}

/// Flattens line breaks so that a command always occupies a single line.
fn inline(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

impl fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Sample { count, expr } => write!(f, "(sample {count} {})", inline(expr)),
            Request::Read { path } => {
                write!(f, "(read {})", inline(&quote(&path.to_string_lossy())))
            }
            Request::Compile { lang, expr } => write!(f, "(compile {lang} {})", inline(expr)),
            Request::Cost { expr } => write!(f, "(cost {})", inline(expr)),
            Request::Desugar { expr } => write!(f, "(desugar {})", inline(expr)),
            Request::Error { input, variants } => {
                write!(f, "(error {}", inline(input))?;
                for variant in variants.iter() {
                    write!(f, " {}", inline(variant))?;
                }
                write!(f, ")")
            }
            Request::Improve { exprs, threads } => {
                let joined = exprs.iter().map(|e| inline(e)).collect::<Vec<_>>().join(" ");
                write!(f, "(improve ({joined}) {threads})")
            }
            Request::Pareto { frontiers } => {
                write!(f, "(pareto")?;
                for frontier in frontiers.iter() {
                    let points = frontier
                        .iter()
                        .map(|(cost, err)| {
                            format!("({} {})", format_numeral(*cost), format_numeral(*err))
                        })
                        .collect::<Vec<_>>()
                        .join(" ");
                    write!(f, " ({points})")?;
                }
                write!(f, ")")
            }
            Request::Exit => write!(f, "(exit)"),
        }
    }
}
