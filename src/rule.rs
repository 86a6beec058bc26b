use std::fmt;

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::token::Element;

/// The weight of a rule with no explicit `^weight`
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// A weighted production: the elements to evaluate, in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub elements: Vec<Element>,
    pub weight: f64,
}

impl Rule {
    /// A rule with an explicit weight
    pub fn new(elements: Vec<Element>, weight: f64) -> Self {
        Rule { elements, weight }
    }

    /// A rule with the default weight
    pub fn from_elements(elements: Vec<Element>) -> Self {
        Rule::new(elements, DEFAULT_WEIGHT)
    }

    /// A rule producing exactly `text`
    pub fn text(text: &str) -> Self {
        Rule::from_elements(vec![Element::from(text)])
    }

    /// A rule producing the empty string
    pub fn empty() -> Self {
        Rule::from_elements(Vec::new())
    }

    /// Whether the rule has no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl Default for Rule {
    fn default() -> Self {
        Rule::empty()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.elements {
            write!(f, "{element}")?;
        }
        if self.weight != DEFAULT_WEIGHT {
            write!(f, "^{}", self.weight)?;
        }
        Ok(())
    }
}

/// Pick the index of one rule, with probability proportional to its weight.
///
/// Returns `None` only for an empty slice. When every weight is zero, or the
/// weights cannot be compared, the draw is uniform.
pub fn choose_index<R: Rng + ?Sized>(rules: &[Rule], rng: &mut R) -> Option<usize> {
    if rules.is_empty() {
        return None;
    }
    let mut weights: Vec<f64> = rules.iter().map(|rule| rule.weight).collect();
    if !weights.iter().sum::<f64>().is_finite() {
        // Scale down so the total no longer overflows
        let max = weights.iter().copied().fold(0.0, f64::max);
        weights.iter_mut().for_each(|weight| *weight /= max);
    }
    match WeightedIndex::new(&weights) {
        Ok(distribution) => Some(distribution.sample(rng)),
        Err(err) => {
            debug!(%err, candidates = rules.len(), "falling back to a uniform draw");
            Some(rng.gen_range(0..rules.len()))
        }
    }
}

/// Pick one rule, with probability proportional to its weight
pub fn choose_rule<'a, R: Rng + ?Sized>(rules: &'a [Rule], rng: &mut R) -> Option<&'a Rule> {
    choose_index(rules, rng).map(|index| &rules[index])
}
