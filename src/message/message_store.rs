use bitvec::{order::LocalBits, vec::BitVec};
use log::debug;

use crate::{
    distributions::distribution_trait::Distribution,
    error::{EpError, Result},
};

// Stores the messages around one variable node in a star-shaped factor graph
// Every slot starts at uniform, and new values replace old ones in the same slot
#[derive(Debug, Clone)]
pub struct MessageStore<D: Distribution> {
    uses_backward: Vec<D>,                  // messages from the use sites into the combining factor
    uses_forward: Vec<D>,                   // messages from the combining factor back out to the use sites
    from_prior_forward: D,                  // message from the prior (definition) of the variable
    to_prior_backward: D,                   // message from the combining factor back to the prior
    marginal: D,                            // current estimate of the posterior
    use_is_dirty: BitVec<usize, LocalBits>, // if a use message was written since the last combine
}

impl<D: Distribution> MessageStore<D> {
    // Creates a store with uniform messages for the given number of use sites
    pub fn with_uses(num_uses: usize) -> Self {
        MessageStore {
            uses_backward: vec![D::uniform(); num_uses],
            uses_forward: vec![D::uniform(); num_uses],
            from_prior_forward: D::uniform(),
            to_prior_backward: D::uniform(),
            marginal: D::uniform(),
            use_is_dirty: BitVec::repeat(false, num_uses),
        }
    }

    pub fn num_uses(&self) -> usize {
        self.uses_backward.len()
    }

    fn check_use_index(&self, index: usize) -> Result<()> {
        if index >= self.num_uses() {
            return Err(EpError::UseIndexOutOfRange {
                index,
                num_uses: self.num_uses(),
            });
        }
        Ok(())
    }

    pub fn uses_backward(&self) -> &[D] {
        &self.uses_backward
    }

    pub fn use_backward(&self, index: usize) -> Result<&D> {
        self.check_use_index(index)?;
        Ok(&self.uses_backward[index])
    }

    // Replaces the message coming from a use site and marks it as changed
    pub fn set_use_backward(&mut self, index: usize, message: D) -> Result<()> {
        self.check_use_index(index)?;
        debug!("Setting use message {} to {}", index, message);
        self.uses_backward[index] = message;
        self.use_is_dirty.set(index, true);
        Ok(())
    }

    pub fn uses_forward(&self) -> &[D] {
        &self.uses_forward
    }

    pub fn use_forward(&self, index: usize) -> Result<&D> {
        self.check_use_index(index)?;
        Ok(&self.uses_forward[index])
    }

    // Replaces the message sent to a use site and returns how much it changed
    pub fn set_use_forward(&mut self, index: usize, message: D) -> Result<f64> {
        self.check_use_index(index)?;
        let diff = self.uses_forward[index].max_diff(&message);
        self.uses_forward[index] = message;
        Ok(diff)
    }

    pub fn from_prior_forward(&self) -> &D {
        &self.from_prior_forward
    }

    // Replaces the message from the prior and returns how much it changed
    pub fn set_from_prior_forward(&mut self, message: D) -> f64 {
        let diff = self.from_prior_forward.max_diff(&message);
        self.from_prior_forward = message;
        diff
    }

    pub fn to_prior_backward(&self) -> &D {
        &self.to_prior_backward
    }

    // Replaces the message sent back to the prior and returns how much it changed
    pub fn set_to_prior_backward(&mut self, message: D) -> f64 {
        let diff = self.to_prior_backward.max_diff(&message);
        self.to_prior_backward = message;
        diff
    }

    pub fn marginal(&self) -> &D {
        &self.marginal
    }

    // Replaces the marginal and returns how much it changed
    pub fn set_marginal(&mut self, marginal: D) -> f64 {
        let diff = self.marginal.max_diff(&marginal);
        self.marginal = marginal;
        diff
    }

    // Checks if any use message was written since the flags were last cleared
    pub fn has_dirty_uses(&self) -> bool {
        self.use_is_dirty.any()
    }

    pub fn clear_dirty_uses(&mut self) {
        self.use_is_dirty.fill(false);
    }

    // Resets every message that is computed during inference back to uniform,
    // keeping the message from the prior and the messages written by the use sites
    pub fn discard_computed(&mut self) {
        self.uses_forward.fill(D::uniform());
        self.to_prior_backward = D::uniform();
        self.marginal = D::uniform();
    }
}
