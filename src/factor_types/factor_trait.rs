use std::fmt::Display;

use crate::{
    distributions::distribution_trait::Distribution, error::Result,
    message::message_store::MessageStore,
};

pub trait Factor<D: Distribution>: Display {
    // Name of the factor kind, used in logs
    fn name(&self) -> &'static str;

    // Computes the outgoing messages of this factor from the messages in the store,
    // writes them back, and returns the largest change made to any message
    fn send(&self, messages: &mut MessageStore<D>) -> Result<f64>;
}
