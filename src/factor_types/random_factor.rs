use std::fmt::Display;

use log::debug;

use crate::{
    distributions::distribution_trait::Distribution, error::Result,
    message::message_store::MessageStore,
};

use super::factor_trait::Factor;

// Update rules of a factor that draws the variable from a fixed prior
pub struct RandomOp;

impl RandomOp {
    // The message from the factor to the variable is the prior itself
    pub fn average_conditional<D: Distribution>(prior: &D) -> D {
        prior.clone()
    }
}

// A factor that draws the variable from a fixed prior
#[derive(Debug, Clone, PartialEq)]
pub struct RandomFactor<D: Distribution> {
    prior: D,
}

impl<D: Distribution> RandomFactor<D> {
    pub fn new(prior: D) -> Self {
        RandomFactor { prior }
    }

    pub fn prior(&self) -> &D {
        &self.prior
    }
}

impl<D: Distribution> Factor<D> for RandomFactor<D> {
    fn name(&self) -> &'static str {
        "Random"
    }

    fn send(&self, messages: &mut MessageStore<D>) -> Result<f64> {
        let message = RandomOp::average_conditional(&self.prior);
        debug!("Random factor sends {} to the variable", message);
        Ok(messages.set_from_prior_forward(message))
    }
}

impl<D: Distribution> Display for RandomFactor<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Random({})", self.prior)
    }
}
