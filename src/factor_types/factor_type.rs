use std::fmt::Display;

use crate::{
    distributions::distribution_trait::Distribution, error::Result,
    message::message_store::MessageStore,
};

use super::{factor_trait::Factor, random_factor::RandomFactor, uses_equal_def::UsesEqualDefFactor};

// The closed set of factor kinds the engine knows how to send messages for
#[derive(Debug, Clone, PartialEq)]
pub enum FactorType<D: Distribution> {
    Random(RandomFactor<D>),
    UsesEqualDef(UsesEqualDefFactor),
}

impl<D: Distribution> From<RandomFactor<D>> for FactorType<D> {
    fn from(value: RandomFactor<D>) -> Self {
        FactorType::Random(value)
    }
}

impl<D: Distribution> From<UsesEqualDefFactor> for FactorType<D> {
    fn from(value: UsesEqualDefFactor) -> Self {
        FactorType::UsesEqualDef(value)
    }
}

macro_rules! match_factor_action {
    ($factor_type:ident, $factor_match:ident, $action:expr) => {
        match $factor_type {
            FactorType::Random($factor_match) => $action,
            FactorType::UsesEqualDef($factor_match) => $action,
        }
    };
}

impl<D: Distribution> Factor<D> for FactorType<D> {
    fn name(&self) -> &'static str {
        match_factor_action!(self, factor, Factor::<D>::name(factor))
    }

    fn send(&self, messages: &mut MessageStore<D>) -> Result<f64> {
        match_factor_action!(self, factor, factor.send(messages))
    }
}

impl<D: Distribution> Display for FactorType<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match_factor_action!(self, factor, Display::fmt(factor, f))
    }
}

#[cfg(test)]
mod tests {
    use crate::distributions::bernoulli::Bernoulli;

    use super::*;

    #[test]
    fn dispatch() {
        let prior = Bernoulli::new(0.2).unwrap();
        let random: FactorType<Bernoulli> = RandomFactor::new(prior).into();
        let uses_equal_def: FactorType<Bernoulli> = UsesEqualDefFactor::new(0).into();

        assert_eq!(random.name(), "Random");
        assert_eq!(uses_equal_def.name(), "UsesEqualDef");
        assert_eq!(random.to_string(), "Random(Bernoulli(0.2))");
        assert_eq!(uses_equal_def.to_string(), "UsesEqualDef(0 uses)");
        assert!(matches!(&uses_equal_def, FactorType::UsesEqualDef(factor) if factor.num_uses() == 0));

        let mut messages = MessageStore::<Bernoulli>::with_uses(0);
        random.send(&mut messages).unwrap();
        uses_equal_def.send(&mut messages).unwrap();
        assert_eq!(messages.marginal(), &prior);
    }
}
