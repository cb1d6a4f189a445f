use std::fmt::{Debug, Display};

use crate::error::Result;

// Interface for the distributions used as messages
// Note: values are never mutated in place, every operation returns a new distribution
pub trait Distribution: Clone + PartialEq + Debug + Display {
    // Returns the maximally uninformative distribution (the neutral element of `product`)
    fn uniform() -> Self;

    // Checks if this distribution carries no information
    fn is_uniform(&self) -> bool;

    // Multiplies two distributions pointwise and renormalizes the result
    fn product(&self, rhs: &Self) -> Result<Self>;

    // Returns the largest absolute difference between the parameters of two distributions
    fn max_diff(&self, rhs: &Self) -> f64;

    // Multiplies all given distributions and renormalizes once at the end, so the result does not depend on their order.
    // Uniform inputs are skipped, so the product of a single informative message is that message exactly,
    // and the product of no messages is uniform.
    fn product_all<'a, I>(distributions: I) -> Result<Self>
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>;
}
