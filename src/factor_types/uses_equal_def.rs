use std::{fmt::Display, iter};

use log::debug;

use crate::{
    distributions::distribution_trait::Distribution,
    error::{EpError, Result},
    message::message_store::MessageStore,
};

use super::factor_trait::Factor;

// Update rules of the factor that ties the definition of a variable to all of its uses,
// i.e., all incoming messages must agree on one value of the variable.
// For conjugate messages the product is exact, so a single pass reaches the fixed point.
pub struct UsesEqualDefOp;

impl UsesEqualDefOp {
    // Computes the marginal of the variable as the normalized product of all use messages and the definition message
    pub fn marginal_average_conditional<D: Distribution>(
        uses: &[D],
        from_def: &D,
        previous: &D,
    ) -> Result<D> {
        let marginal = if uses.is_empty() {
            from_def.clone()
        } else {
            D::product_all(uses.iter().chain(iter::once(from_def)))?
        };
        debug!(
            "Marginal {} -> {} from {} uses",
            previous,
            marginal,
            uses.len()
        );
        Ok(marginal)
    }

    // Computes the message to the use with the given index by leaving that use's own message out of the product
    pub fn use_average_conditional<D: Distribution>(
        uses: &[D],
        from_def: &D,
        index: usize,
    ) -> Result<D> {
        if index >= uses.len() {
            return Err(EpError::UseIndexOutOfRange {
                index,
                num_uses: uses.len(),
            });
        }
        D::product_all(
            uses.iter()
                .enumerate()
                .filter(|(use_index, _)| *use_index != index)
                .map(|(_, message)| message)
                .chain(iter::once(from_def)),
        )
    }

    // Computes the message back to the definition of the variable, i.e., the product of all use messages
    pub fn def_average_conditional<D: Distribution>(uses: &[D]) -> Result<D> {
        D::product_all(uses)
    }
}

// The factor that combines the uses of a variable with its definition
#[derive(Debug, Clone, PartialEq)]
pub struct UsesEqualDefFactor {
    num_uses: usize,
}

impl UsesEqualDefFactor {
    pub fn new(num_uses: usize) -> Self {
        UsesEqualDefFactor { num_uses }
    }

    pub fn num_uses(&self) -> usize {
        self.num_uses
    }
}

impl<D: Distribution> Factor<D> for UsesEqualDefFactor {
    fn name(&self) -> &'static str {
        "UsesEqualDef"
    }

    fn send(&self, messages: &mut MessageStore<D>) -> Result<f64> {
        let marginal = UsesEqualDefOp::marginal_average_conditional(
            messages.uses_backward(),
            messages.from_prior_forward(),
            messages.marginal(),
        )?;

        // Compute every outgoing message before writing any, so that a failure leaves the store untouched
        let to_def = UsesEqualDefOp::def_average_conditional(messages.uses_backward())?;
        let mut to_uses = Vec::with_capacity(messages.num_uses());
        for index in 0..messages.num_uses() {
            to_uses.push(UsesEqualDefOp::use_average_conditional(
                messages.uses_backward(),
                messages.from_prior_forward(),
                index,
            )?);
        }

        let mut delta = messages
            .set_marginal(marginal)
            .max(messages.set_to_prior_backward(to_def));
        for (index, message) in to_uses.into_iter().enumerate() {
            delta = delta.max(messages.set_use_forward(index, message)?);
        }
        messages.clear_dirty_uses();
        Ok(delta)
    }
}

impl Display for UsesEqualDefFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UsesEqualDef({} uses)", self.num_uses)
    }
}
