//! Sampled inputs and ground truth for one expression.

use crate::fpcore::ParseError;
use serde::{Deserialize, Serialize};

/// Per-variable input sequences plus the matching ground-truth outputs.
///
/// `points[v][i]` is the value of variable `v` at point `i`. Ground truth is
/// empty when the sample was drawn locally rather than by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(with = "numerals::nested")]
    pub points: Vec<Vec<f64>>,
    #[serde(with = "numerals::flat", default)]
    pub ground_truth: Vec<f64>,
}

impl Sample {
    pub fn new(points: Vec<Vec<f64>>, ground_truth: Vec<f64>) -> Self {
        Self {
            points,
            ground_truth,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of sampled points.
    pub fn len(&self) -> usize {
        self.points
            .first()
            .map(Vec::len)
            .unwrap_or(self.ground_truth.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn arity(&self) -> usize {
        self.points.len()
    }

    /// Whether this sample can serve a request for `n` points of an
    /// expression with `argc` variables.
    pub fn fits(&self, argc: usize, n: usize) -> bool {
        self.points.len() == argc
            && self.points.iter().all(|seq| seq.len() == n)
            && (self.ground_truth.is_empty() || self.ground_truth.len() == n)
            && (argc > 0 || self.ground_truth.len() == n)
    }

    /// Bit-level equality, so NaN payloads compare equal to themselves.
    pub fn same_bits(&self, other: &Sample) -> bool {
        fn eq(a: &[f64], b: &[f64]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
        }
        self.points.len() == other.points.len()
            && self.points.iter().zip(&other.points).all(|(a, b)| eq(a, b))
            && eq(&self.ground_truth, &other.ground_truth)
    }
}

/// Parses a numeral as printed by the engine, including the special
/// tokens `+inf.0`, `-inf.0` and `+nan.0`.
pub fn parse_numeral(token: &str) -> Result<f64, ParseError> {
    let token = token.trim();
    match token {
        "+inf.0" => Ok(f64::INFINITY),
        "-inf.0" => Ok(f64::NEG_INFINITY),
        "+nan.0" | "-nan.0" => Ok(f64::NAN),
        _ => token
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidNumeral(token.to_string())),
    }
}

/// Inverse of [`parse_numeral`] for the special values.
pub fn format_numeral(value: f64) -> String {
    if value.is_nan() {
        "+nan.0".to_string()
    } else if value == f64::INFINITY {
        "+inf.0".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf.0".to_string()
    } else {
        format!("{value:?}")
    }
}

/// Serde adapters keeping non-finite values intact in JSON, which would
/// otherwise turn them into `null`.
mod numerals {
    use super::{format_numeral, parse_numeral};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Finite(f64),
        Token(String),
    }

    impl Repr {
        fn from_value(value: f64) -> Self {
            if value.is_finite() {
                Repr::Finite(value)
            } else {
                Repr::Token(format_numeral(value))
            }
        }

        fn into_value<E: serde::de::Error>(self) -> Result<f64, E> {
            match self {
                Repr::Finite(value) => Ok(value),
                Repr::Token(token) => parse_numeral(&token).map_err(E::custom),
            }
        }
    }

    pub mod flat {
        use super::*;

        #[allow(clippy::ptr_arg)]
        pub fn serialize<S: Serializer>(values: &Vec<f64>, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(values.iter().map(|v| Repr::from_value(*v)))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
            Vec::<Repr>::deserialize(deserializer)?
                .into_iter()
                .map(Repr::into_value)
                .collect()
        }
    }

    pub mod nested {
        use super::*;

        #[allow(clippy::ptr_arg)]
        pub fn serialize<S: Serializer>(
            values: &Vec<Vec<f64>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(
                values
                    .iter()
                    .map(|seq| seq.iter().map(|v| Repr::from_value(*v)).collect::<Vec<_>>()),
            )
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Vec<f64>>, D::Error> {
            Vec::<Vec<Repr>>::deserialize(deserializer)?
                .into_iter()
                .map(|seq| {
                    seq.into_iter()
                        .map(Repr::into_value)
                        .collect::<Result<Vec<f64>, D::Error>>()
                })
                .collect()
        }
    }
}
