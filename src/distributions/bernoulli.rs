use std::{fmt::Display, iter};

use crate::error::{EpError, Result};

use super::distribution_trait::Distribution;

// A belief about a Boolean variable, stored as the probability that the variable is true
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bernoulli {
    prob_true: f64, // always in [0, 1]
}

impl Bernoulli {
    // Creates a Bernoulli distribution, checking that the probability lies in [0, 1]
    pub fn new(prob_true: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&prob_true) {
            return Err(EpError::InvalidProbability(prob_true));
        }
        Ok(Bernoulli { prob_true })
    }

    // Creates a distribution that is certain about the value of the variable
    pub fn point_mass(value: bool) -> Self {
        Bernoulli {
            prob_true: if value { 1.0 } else { 0.0 },
        }
    }

    pub fn prob_true(&self) -> f64 {
        self.prob_true
    }

    pub fn prob_false(&self) -> f64 {
        1.0 - self.prob_true
    }

    // Returns log(p / (1 - p)), infinite for point masses
    pub fn log_odds(&self) -> f64 {
        (self.prob_true / self.prob_false()).ln()
    }

    pub fn is_point_mass(&self) -> bool {
        self.prob_true == 0.0 || self.prob_true == 1.0
    }

    // Normalizes the unnormalized log masses of both outcomes, shifting by the larger one to avoid underflow.
    // A point mass contributes -inf to the outcome it excludes.
    fn from_log_masses(log_mass_true: f64, log_mass_false: f64) -> Result<Self> {
        let log_max = log_mass_true.max(log_mass_false);
        if log_max == f64::NEG_INFINITY || log_max.is_nan() {
            return Err(EpError::InconsistentEvidence);
        }
        let mass_true = (log_mass_true - log_max).exp();
        let mass_false = (log_mass_false - log_max).exp();
        Ok(Bernoulli {
            prob_true: (mass_true / (mass_true + mass_false)).clamp(0.0, 1.0),
        })
    }
}

impl Distribution for Bernoulli {
    fn uniform() -> Self {
        Bernoulli { prob_true: 0.5 }
    }

    fn is_uniform(&self) -> bool {
        self.prob_true == 0.5
    }

    fn product(&self, rhs: &Self) -> Result<Self> {
        Bernoulli::from_log_masses(
            self.prob_true.ln() + rhs.prob_true.ln(),
            self.prob_false().ln() + rhs.prob_false().ln(),
        )
    }

    fn max_diff(&self, rhs: &Self) -> f64 {
        (self.prob_true - rhs.prob_true).abs()
    }

    fn product_all<'a, I>(distributions: I) -> Result<Self>
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>,
    {
        let mut informative = distributions
            .into_iter()
            .filter(|distribution| !distribution.is_uniform())
            .peekable();
        let Some(first) = informative.next() else {
            return Ok(Bernoulli::uniform());
        };
        if informative.peek().is_none() {
            return Ok(*first);
        }

        let (log_mass_true, log_mass_false) = iter::once(first).chain(informative).fold(
            (0.0, 0.0),
            |(log_mass_true, log_mass_false), distribution| {
                (
                    log_mass_true + distribution.prob_true.ln(),
                    log_mass_false + distribution.prob_false().ln(),
                )
            },
        );
        Bernoulli::from_log_masses(log_mass_true, log_mass_false)
    }
}

impl Default for Bernoulli {
    fn default() -> Self {
        Bernoulli::uniform()
    }
}

impl TryFrom<f64> for Bernoulli {
    type Error = EpError;

    fn try_from(value: f64) -> Result<Bernoulli> {
        Bernoulli::new(value)
    }
}

impl From<Bernoulli> for f64 {
    fn from(value: Bernoulli) -> f64 {
        value.prob_true
    }
}

impl Display for Bernoulli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bernoulli({})", self.prob_true)
    }
}
