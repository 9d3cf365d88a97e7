//! Ordered weighted averaging (OWA) guided by fuzzy linguistic quantifiers.
//!
//! A linguistic quantifier `Q(r)` with parameters `(a, b)` is the piecewise
//! linear membership function
//!
//! ```text
//! Q(r) = 0               if r < a
//!        (r - a)/(b - a) if a <= r <= b
//!        1               if r > b
//! ```
//!
//! and the OWA weight vector of length `m` is `w_k = Q(k/m) - Q((k-1)/m)`.
//! The OWA reduction sorts its inputs in descending order before applying
//! the weights, so the weight at position `k` always lands on the `k`-th
//! largest value.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::CrpError;

/// Decimal places kept on each OWA weight.
pub const WEIGHT_DECIMALS: u32 = 2;

/// Fuzzy linguistic quantifier `(a, b)`; serialized as the pair `[a, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LinguisticQuantifier {
    pub a: f64,
    pub b: f64,
}

impl LinguisticQuantifier {
    pub const fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    /// "Most": `(0.3, 0.8)`.
    pub const fn most() -> Self {
        Self::new(0.3, 0.8)
    }

    /// "At least half": `(0.0, 0.5)`.
    pub const fn at_least_half() -> Self {
        Self::new(0.0, 0.5)
    }

    /// "As many as possible": `(0.5, 1.0)`.
    pub const fn as_many_as_possible() -> Self {
        Self::new(0.5, 1.0)
    }

    pub fn validate(&self) -> Result<(), CrpError> {
        if !self.a.is_finite() || !self.b.is_finite() || self.a >= self.b {
            return Err(CrpError::DegenerateQuantifier {
                a: self.a,
                b: self.b,
            });
        }
        Ok(())
    }

    /// Evaluate `Q(r)` for this quantifier.
    pub fn eval(&self, r: f64) -> f64 {
        quantifier(r, self.a, self.b)
    }
}

impl From<[f64; 2]> for LinguisticQuantifier {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

impl From<LinguisticQuantifier> for [f64; 2] {
    fn from(q: LinguisticQuantifier) -> Self {
        [q.a, q.b]
    }
}

/// `Q(r, a, b)`. Undefined for `a == b`; callers validate the pair first.
pub fn quantifier(r: f64, a: f64, b: f64) -> f64 {
    if r < a {
        0.0
    } else if r > b {
        1.0
    } else {
        (r - a) / (b - a)
    }
}

/// Round at `decimals` places from the exact decimal expansion of `x`.
///
/// Exact ties go to the even digit (`0.125 -> 0.12`). Values stored just
/// above or below a tie round by their true value: `0.025` is slightly above
/// `0.025` in binary and becomes `0.03`.
pub fn round_to(x: f64, decimals: u32) -> f64 {
    if !x.is_finite() {
        return x;
    }
    format!("{:.*}", decimals as usize, x).parse().unwrap_or(x)
}

/// OWA weight vector of length `m` for the quantifier `lq`.
///
/// Each weight is rounded to [`WEIGHT_DECIMALS`] places, so the sum may
/// drift from 1.0 by up to `m * 0.005`.
pub fn owa_weights(m: usize, lq: LinguisticQuantifier) -> Result<Vec<f64>, CrpError> {
    if m == 0 {
        return Err(CrpError::EmptyWeightVector);
    }
    lq.validate()?;

    let mf = m as f64;
    let mut weights = Vec::with_capacity(m);
    // Q((k-1)/m) is Q(k/m) of the previous step.
    let mut q_prev = lq.eval(0.0);
    for k in 1..=m {
        let q_curr = lq.eval(k as f64 / mf);
        weights.push(round_to(q_curr - q_prev, WEIGHT_DECIMALS));
        q_prev = q_curr;
    }

    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() > 0.005 * mf + 1e-9 {
        tracing::warn!(m, a = lq.a, b = lq.b, total, "OWA weights drift past rounding tolerance");
    }
    Ok(weights)
}

/// Apply the OWA operator: sort `values` descending, then weight-sum.
///
/// Extra values or weights beyond the shorter of the two are ignored.
pub fn owa(values: &[f64], weights: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sort_descending(&mut sorted);
    sorted
        .iter()
        .zip(weights)
        .fold(0.0, |acc, (v, w)| acc + v * w)
}

pub(crate) fn sort_descending(values: &mut [f64]) {
    values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantifier_is_piecewise_linear() {
        assert_eq!(quantifier(0.1, 0.3, 0.8), 0.0);
        assert_eq!(quantifier(0.9, 0.3, 0.8), 1.0);
        assert!((quantifier(0.55, 0.3, 0.8) - 0.5).abs() < 1e-12);
        assert_eq!(quantifier(0.3, 0.3, 0.8), 0.0);
        assert_eq!(quantifier(0.8, 0.3, 0.8), 1.0);
    }

    #[test]
    fn identity_quantifier_yields_uniform_weights() {
        let w = owa_weights(4, LinguisticQuantifier::new(0.0, 1.0)).unwrap();
        assert_eq!(w, vec![0.25, 0.25, 0.25, 0.25]);
    }

    #[test]
    fn most_quantifier_weights_match_reference_values() {
        let w = owa_weights(3, LinguisticQuantifier::most()).unwrap();
        assert_eq!(w, vec![0.07, 0.67, 0.27]);

        let w = owa_weights(4, LinguisticQuantifier::most()).unwrap();
        assert_eq!(w, vec![0.0, 0.4, 0.5, 0.1]);
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.375, 2), 0.38);
        assert_eq!(round_to(0.5, 0), 0.0);
        let w_tie = owa_weights(8, LinguisticQuantifier::new(0.0, 1.0)).unwrap();
        assert!(w_tie.iter().all(|&x| x == 0.12));
    }

    #[test]
    fn rounding_uses_the_stored_decimal_value() {
        // 0.025 is stored above the tie, 0.015 below it.
        assert_eq!(round_to(0.025, 2), 0.03);
        assert_eq!(round_to(0.015, 2), 0.01);
        assert_eq!(round_to(2.675, 2), 2.67);
        assert_eq!(round_to(-0.125, 2), -0.12);
        assert!(round_to(f64::NAN, 2).is_nan());

        let w = owa_weights(40, LinguisticQuantifier::new(0.0, 1.0)).unwrap();
        assert_eq!(w[0], 0.03);
    }

    #[test]
    fn owa_weights_reject_bad_input() {
        assert_eq!(
            owa_weights(0, LinguisticQuantifier::most()),
            Err(CrpError::EmptyWeightVector)
        );
        assert_eq!(
            owa_weights(3, LinguisticQuantifier::new(0.5, 0.5)),
            Err(CrpError::DegenerateQuantifier { a: 0.5, b: 0.5 })
        );
    }

    #[test]
    fn owa_sorts_before_weighting() {
        let v = owa(&[0.1, 0.9, 0.5], &[1.0, 0.0, 0.0]);
        assert_eq!(v, 0.9);
        let v = owa(&[0.1, 0.9, 0.5], &[0.0, 0.0, 1.0]);
        assert_eq!(v, 0.1);
    }

    #[test]
    fn quantifier_serializes_as_pair() {
        let q: LinguisticQuantifier = serde_json::from_str("[0.3, 0.8]").unwrap();
        assert_eq!(q, LinguisticQuantifier::most());
        assert_eq!(serde_json::to_string(&q).unwrap(), "[0.3,0.8]");
    }
}
