pub mod error;

pub mod distributions {
    pub mod bernoulli;
    pub mod distribution_trait;
}

pub mod message {
    pub mod message_store;
}

pub mod factor_types {
    pub mod factor_trait;
    pub mod factor_type;
    pub mod random_factor;
    pub mod uses_equal_def;
}

pub mod model {
    pub mod factor_graph;
    pub mod schedule;
}

pub mod engine {
    pub mod expectation_propagation;
    pub mod options;
}

pub use distributions::{bernoulli::Bernoulli, distribution_trait::Distribution};
pub use engine::{
    expectation_propagation::{EngineState, ExpectationPropagation},
    options::EngineOptions,
};
pub use error::{EpError, Result};
pub use model::factor_graph::Model;
