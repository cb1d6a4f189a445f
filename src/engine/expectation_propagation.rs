use std::{slice::Iter, time::Instant};

use log::{debug, info, warn};
use petgraph::graph::NodeIndex;

use crate::{
    distributions::{bernoulli::Bernoulli, distribution_trait::Distribution},
    error::{EpError, Result},
    factor_types::factor_trait::Factor,
    message::message_store::MessageStore,
    model::{
        factor_graph::{FactorGraph, Model},
        schedule::Schedule,
    },
};

use super::options::EngineOptions;

// Lifecycle of an inference run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unconfigured, // constructed or reconfigured, reset() has not run yet
    Reset,        // constants are set and constant messages are computed
    Initialised,  // the marginal is available, further updates may change it
    Converged,    // the marginal is at the fixed point of the schedule
}

// Runs Expectation Propagation over the star-shaped factor graph of one variable.
// The engine exclusively owns the messages of its variable; independent variables need independent engines.
pub struct ExpectationPropagation<D: Distribution> {
    model: Model<D>,
    options: EngineOptions,
    factor_graph: FactorGraph<D>,
    schedule: Schedule,
    messages: MessageStore<D>,
    state: EngineState,
    iterations: usize, // number of updates since initialise() that recomputed messages
}

impl<D: Distribution> ExpectationPropagation<D> {
    // Builds the factor graph and the schedule for the given model
    pub fn new(model: Model<D>, options: EngineOptions) -> Self {
        let factor_graph = FactorGraph::new(&model);
        let schedule = Schedule::new(&factor_graph);
        let messages = MessageStore::with_uses(model.num_uses());
        ExpectationPropagation {
            model,
            options,
            factor_graph,
            schedule,
            messages,
            state: EngineState::Unconfigured,
            iterations: 0,
        }
    }

    // Replaces the model (prior and number of use sites), reset() must be called before the next run
    pub fn reconfigure(&mut self, model: Model<D>) {
        debug!(
            "Reconfiguring with prior {} and {} uses",
            model.prior(),
            model.num_uses()
        );
        self.factor_graph = FactorGraph::new(&model);
        self.schedule = Schedule::new(&self.factor_graph);
        self.messages = MessageStore::with_uses(model.num_uses());
        self.model = model;
        self.state = EngineState::Unconfigured;
        self.iterations = 0;
    }

    pub fn model(&self) -> &Model<D> {
        &self.model
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn num_uses(&self) -> usize {
        self.model.num_uses()
    }

    fn require(&self, operation: &'static str, allowed: &[EngineState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(EpError::NotInitialised {
                operation,
                state: self.state,
            })
        }
    }

    // Sends messages from the given factors in order and returns the largest change
    fn send_all(
        factor_graph: &FactorGraph<D>,
        messages: &mut MessageStore<D>,
        steps: Iter<NodeIndex<usize>>,
    ) -> Result<f64> {
        let mut delta: f64 = 0.;
        for factor in steps.filter_map(|node| factor_graph.factor(*node)) {
            debug!("Sending messages from factor {}", factor);
            delta = delta.max(factor.send(messages)?);
        }
        Ok(delta)
    }

    // Drops everything computed since reset, leaving the engine ready for another initialise()
    fn discard(&mut self, error: EpError) -> EpError {
        warn!("Discarding messages after error: {}", error);
        self.messages.discard_computed();
        self.state = EngineState::Reset;
        self.iterations = 0;
        error
    }

    // Sets constants, sizes the use message arrays and computes the messages that depend only on constants.
    // Previously written use messages are cleared.
    pub fn reset(&mut self) -> Result<()> {
        debug!("In reset() with {} uses", self.num_uses());

        self.messages = MessageStore::with_uses(self.num_uses());
        self.iterations = 0;
        if let Err(error) =
            Self::send_all(&self.factor_graph, &mut self.messages, self.schedule.reset_iter())
        {
            self.state = EngineState::Unconfigured;
            return Err(error);
        }
        self.state = EngineState::Reset;
        Ok(())
    }

    // Computes the initial marginal, along with every other message the schedule needs only once
    pub fn initialise(&mut self) -> Result<()> {
        self.require(
            "initialise",
            &[
                EngineState::Reset,
                EngineState::Initialised,
                EngineState::Converged,
            ],
        )?;
        debug!("In initialise()");

        self.messages.discard_computed();
        if let Err(error) = Self::send_all(
            &self.factor_graph,
            &mut self.messages,
            self.schedule.initialise_iter(),
        ) {
            return Err(self.discard(error));
        }
        self.messages.clear_dirty_uses();
        self.iterations = 0;
        self.state = EngineState::Initialised;
        Ok(())
    }

    // Performs one iteration of message passing and returns the largest change to any message.
    // When the schedule has no iterative part, or no use message changed since the last pass,
    // nothing is recomputed and the engine reports convergence.
    pub fn update(&mut self) -> Result<f64> {
        self.require(
            "update",
            &[EngineState::Initialised, EngineState::Converged],
        )?;

        if self.schedule.converges_without_iteration() {
            debug!("Schedule converged without iteration, update() does nothing");
            self.state = EngineState::Converged;
            return Ok(0.);
        }
        if !self.messages.has_dirty_uses() {
            debug!("No use message changed since the last pass, update() does nothing");
            self.state = EngineState::Converged;
            return Ok(0.);
        }

        let delta = match Self::send_all(
            &self.factor_graph,
            &mut self.messages,
            self.schedule.iteration_iter(),
        ) {
            Ok(delta) => delta,
            Err(error) => return Err(self.discard(error)),
        };
        self.iterations += 1;
        self.state = if delta <= self.options.tolerance() {
            EngineState::Converged
        } else {
            EngineState::Initialised
        };
        debug!(
            "Iteration {} changed messages by at most {}",
            self.iterations, delta
        );
        Ok(delta)
    }

    // Returns the current estimate of the marginal
    pub fn marginal(&self) -> Result<D> {
        self.require(
            "query the marginal",
            &[EngineState::Initialised, EngineState::Converged],
        )?;
        Ok(self.messages.marginal().clone())
    }

    // Returns the current message to the use site with the given index
    pub fn use_message(&self, index: usize) -> Result<D> {
        self.require(
            "query a use message",
            &[EngineState::Initialised, EngineState::Converged],
        )?;
        self.messages.use_forward(index).cloned()
    }

    // Returns the current message from the uses back to the prior, i.e., the evidence gathered about the variable
    pub fn prior_message(&self) -> Result<D> {
        self.require(
            "query the message to the prior",
            &[EngineState::Initialised, EngineState::Converged],
        )?;
        Ok(self.messages.to_prior_backward().clone())
    }

    // Writes the message coming from the use site with the given index, to be combined by the next update
    pub fn set_use_message(&mut self, index: usize, message: D) -> Result<()> {
        self.require(
            "set a use message",
            &[
                EngineState::Reset,
                EngineState::Initialised,
                EngineState::Converged,
            ],
        )?;
        self.messages.set_use_backward(index, message)?;
        if self.state == EngineState::Converged {
            self.state = EngineState::Initialised;
        }
        Ok(())
    }

    // Runs inference from the current configuration until convergence, the iteration limit, or the time limit.
    // Use messages written after reset() are kept.
    pub fn run(&mut self) -> Result<D> {
        let time_start = Instant::now();

        if self.state == EngineState::Unconfigured {
            self.reset()?;
        }
        self.initialise()?;

        for _ in 0..self.options.max_iterations() {
            if self.state == EngineState::Converged {
                break;
            }
            if time_start.elapsed() >= self.options.time_max() {
                warn!(
                    "Time limit {:?} reached after {} iterations",
                    self.options.time_max(),
                    self.iterations
                );
                break;
            }
            self.update()?;
        }
        if self.state != EngineState::Converged {
            warn!(
                "Inference stopped before convergence after {} iterations",
                self.iterations
            );
        }

        let marginal = self.marginal()?;
        info!(
            "Inference finished with marginal {} after {} iterations. Elapsed time {:?}.",
            marginal,
            self.iterations,
            time_start.elapsed()
        );
        Ok(marginal)
    }
}

impl ExpectationPropagation<Bernoulli> {
    // Creates an engine for a Bernoulli variable, checking the prior probability
    pub fn bernoulli(prior_prob_true: f64, num_uses: usize) -> Result<Self> {
        Ok(ExpectationPropagation::new(
            Model::bernoulli(prior_prob_true, num_uses)?,
            EngineOptions::default(),
        ))
    }

    // Writes the message from a use site given as a probability of the variable being true
    pub fn set_use_probability(&mut self, index: usize, prob_true: f64) -> Result<()> {
        self.set_use_message(index, Bernoulli::new(prob_true)?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    use super::*;

    fn bernoulli(prob: f64) -> Bernoulli {
        Bernoulli::new(prob).unwrap()
    }

    fn product_rule(prior: f64, message: f64) -> f64 {
        let mass_true = prior * message;
        let mass_false = (1.0 - prior) * (1.0 - message);
        mass_true / (mass_true + mass_false)
    }

    #[test]
    fn prior_without_uses() {
        let mut engine = ExpectationPropagation::bernoulli(0.01, 0).unwrap();
        engine.reset().unwrap();
        engine.initialise().unwrap();
        assert_eq!(engine.marginal(), Ok(bernoulli(0.01)));
    }

    #[test]
    fn marginal_is_prior_for_all_priors() {
        for index in 0..=100 {
            let prior = index as f64 / 100.;
            let mut engine = ExpectationPropagation::bernoulli(prior, 0).unwrap();
            engine.reset().unwrap();
            engine.initialise().unwrap();
            assert_eq!(engine.marginal().unwrap().prob_true(), prior);
        }
    }

    #[test]
    fn product_rule_with_one_use() {
        for prior in [0.01, 0.2, 0.5, 0.8, 0.99] {
            for message in [0.05, 0.3, 0.5, 0.9, 0.999] {
                let mut engine = ExpectationPropagation::bernoulli(prior, 1).unwrap();
                engine.reset().unwrap();
                engine.set_use_probability(0, message).unwrap();
                engine.initialise().unwrap();
                assert_relative_eq!(
                    engine.marginal().unwrap().prob_true(),
                    product_rule(prior, message),
                    epsilon = 1e-12
                );
            }
        }
    }

    #[test]
    fn uniform_prior_with_one_use() {
        let mut engine = ExpectationPropagation::bernoulli(0.5, 1).unwrap();
        engine.reset().unwrap();
        engine.set_use_probability(0, 0.9).unwrap();
        engine.initialise().unwrap();
        assert_relative_eq!(engine.marginal().unwrap().prob_true(), 0.9, epsilon = 1e-12);
    }

    #[test]
    fn update_is_idempotent() {
        for num_uses in [0, 1] {
            let mut engine = ExpectationPropagation::bernoulli(0.3, num_uses).unwrap();
            engine.reset().unwrap();
            if num_uses == 1 {
                engine.set_use_probability(0, 0.7).unwrap();
            }
            engine.initialise().unwrap();
            let marginal = engine.marginal().unwrap();

            for _ in 0..10 {
                assert_eq!(engine.update(), Ok(0.));
                assert_eq!(engine.marginal(), Ok(marginal));
                assert_eq!(engine.state(), EngineState::Converged);
            }
            assert_eq!(engine.iterations(), 0);
        }
    }

    #[test]
    fn update_combines_new_use_messages() {
        let mut engine = ExpectationPropagation::bernoulli(0.2, 2).unwrap();
        engine.reset().unwrap();
        engine.initialise().unwrap();
        assert_eq!(engine.marginal(), Ok(bernoulli(0.2)));

        engine.set_use_probability(0, 0.9).unwrap();
        let delta = engine.update().unwrap();
        let expected = product_rule(0.2, 0.9);
        assert_relative_eq!(engine.marginal().unwrap().prob_true(), expected, epsilon = 1e-12);
        assert_relative_eq!(delta, expected - 0.2, epsilon = 1e-12);
        assert_eq!(engine.iterations(), 1);
        assert_eq!(engine.state(), EngineState::Initialised);

        // The message to the other use carries the prior and the first use
        assert_relative_eq!(
            engine.use_message(1).unwrap().prob_true(),
            expected,
            epsilon = 1e-12
        );
        assert_eq!(engine.use_message(0), Ok(bernoulli(0.2)));

        assert_eq!(engine.update(), Ok(0.));
        assert_eq!(engine.state(), EngineState::Converged);
        assert_eq!(engine.iterations(), 1);
    }

    #[test]
    fn contradiction() {
        let mut engine = ExpectationPropagation::bernoulli(1.0, 1).unwrap();
        engine.reset().unwrap();
        engine.set_use_probability(0, 0.0).unwrap();
        assert_eq!(engine.initialise(), Err(EpError::InconsistentEvidence));

        // The partial result is discarded
        assert_eq!(engine.state(), EngineState::Reset);
        assert!(matches!(
            engine.marginal(),
            Err(EpError::NotInitialised { .. })
        ));
    }

    #[test]
    fn contradiction_during_update() {
        let mut engine = ExpectationPropagation::bernoulli(1.0, 1).unwrap();
        engine.reset().unwrap();
        engine.initialise().unwrap();
        assert_eq!(engine.marginal(), Ok(Bernoulli::point_mass(true)));

        engine.set_use_message(0, Bernoulli::point_mass(false)).unwrap();
        assert_eq!(engine.update(), Err(EpError::InconsistentEvidence));
        assert_eq!(engine.state(), EngineState::Reset);
    }

    #[test]
    fn out_of_order_calls() {
        let mut engine = ExpectationPropagation::bernoulli(0.01, 1).unwrap();
        assert_eq!(engine.state(), EngineState::Unconfigured);
        assert_eq!(
            engine.marginal(),
            Err(EpError::NotInitialised {
                operation: "query the marginal",
                state: EngineState::Unconfigured
            })
        );
        assert!(matches!(
            engine.update(),
            Err(EpError::NotInitialised { .. })
        ));
        assert!(matches!(
            engine.initialise(),
            Err(EpError::NotInitialised { .. })
        ));
        assert!(matches!(
            engine.set_use_probability(0, 0.5),
            Err(EpError::NotInitialised { .. })
        ));

        engine.reset().unwrap();
        assert_eq!(
            engine.marginal(),
            Err(EpError::NotInitialised {
                operation: "query the marginal",
                state: EngineState::Reset
            })
        );
        assert!(matches!(
            engine.update(),
            Err(EpError::NotInitialised { .. })
        ));
        assert!(matches!(
            engine.use_message(0),
            Err(EpError::NotInitialised { .. })
        ));
    }

    #[test]
    fn invalid_probabilities() {
        assert!(matches!(
            ExpectationPropagation::bernoulli(1.01, 0),
            Err(EpError::InvalidProbability(_))
        ));

        let mut engine = ExpectationPropagation::bernoulli(0.5, 1).unwrap();
        engine.reset().unwrap();
        assert_eq!(
            engine.set_use_probability(0, -0.5),
            Err(EpError::InvalidProbability(-0.5))
        );
        assert_eq!(
            engine.set_use_probability(1, 0.5),
            Err(EpError::UseIndexOutOfRange {
                index: 1,
                num_uses: 1
            })
        );
    }

    #[test]
    fn reset_is_idempotent() {
        let mut engine = ExpectationPropagation::bernoulli(0.4, 1).unwrap();
        engine.reset().unwrap();
        engine.set_use_probability(0, 0.9).unwrap();
        engine.reset().unwrap();
        engine.reset().unwrap();
        assert_eq!(engine.state(), EngineState::Reset);

        // Reset clears use messages written before it
        engine.initialise().unwrap();
        assert_eq!(engine.marginal(), Ok(bernoulli(0.4)));
    }

    #[test]
    fn reconfigure() {
        let mut engine = ExpectationPropagation::bernoulli(0.01, 0).unwrap();
        assert_eq!(engine.run(), Ok(bernoulli(0.01)));

        engine.reconfigure(Model::bernoulli(0.5, 1).unwrap());
        assert_eq!(engine.state(), EngineState::Unconfigured);
        assert_eq!(engine.num_uses(), 1);
        assert_eq!(engine.model().prior(), &bernoulli(0.5));
        assert!(!engine.schedule().converges_without_iteration());

        engine.reset().unwrap();
        engine.set_use_probability(0, 0.9).unwrap();
        assert_relative_eq!(engine.run().unwrap().prob_true(), 0.9, epsilon = 1e-12);
    }

    #[test]
    fn run() {
        let mut engine = ExpectationPropagation::bernoulli(0.01, 0).unwrap();
        assert_eq!(engine.run(), Ok(bernoulli(0.01)));
        assert_eq!(engine.state(), EngineState::Converged);
        assert_eq!(engine.iterations(), 0);
        assert!(engine.schedule().converges_without_iteration());
    }

    #[test]
    fn run_with_options() {
        let mut options = EngineOptions::default();
        options.set_max_iterations(0);
        let mut engine = ExpectationPropagation::new(Model::bernoulli(0.3, 0).unwrap(), options);

        // Without any update the engine stays initialised but still answers queries
        assert_eq!(engine.run(), Ok(bernoulli(0.3)));
        assert_eq!(engine.state(), EngineState::Initialised);
        assert_eq!(engine.options().max_iterations(), 0);
    }

    #[test]
    fn run_with_time_limit() {
        let mut options = EngineOptions::default();
        options.set_time_max(Duration::ZERO);
        let mut engine = ExpectationPropagation::new(Model::bernoulli(0.2, 2).unwrap(), options);
        engine.reset().unwrap();
        engine.set_use_probability(0, 0.9).unwrap();

        // The limit is hit before the first update, so run() returns the initial marginal
        let marginal = engine.run().unwrap();
        assert_relative_eq!(marginal.prob_true(), product_rule(0.2, 0.9), epsilon = 1e-12);
        assert_eq!(engine.state(), EngineState::Initialised);
        assert_eq!(engine.iterations(), 0);

        // Without the limit the same run converges
        let mut engine = ExpectationPropagation::bernoulli(0.2, 2).unwrap();
        engine.reset().unwrap();
        engine.set_use_probability(0, 0.9).unwrap();
        assert_eq!(engine.run(), Ok(marginal));
        assert_eq!(engine.state(), EngineState::Converged);
    }

    #[test]
    fn prior_message() {
        let mut engine = ExpectationPropagation::bernoulli(0.01, 3).unwrap();
        engine.reset().unwrap();
        assert!(matches!(
            engine.prior_message(),
            Err(EpError::NotInitialised { .. })
        ));

        // Without evidence from the uses nothing flows back to the prior
        engine.initialise().unwrap();
        assert_eq!(engine.prior_message(), Ok(Bernoulli::uniform()));

        engine.set_use_probability(0, 0.8).unwrap();
        engine.set_use_probability(2, 0.6).unwrap();
        engine.update().unwrap();
        assert_relative_eq!(
            engine.prior_message().unwrap().prob_true(),
            product_rule(0.8, 0.6),
            epsilon = 1e-12
        );
        // The prior itself is not part of the message back to it
        assert_relative_eq!(
            engine.marginal().unwrap().prob_true(),
            product_rule(0.01, product_rule(0.8, 0.6)),
            epsilon = 1e-12
        );

        // A failed update discards it with the other computed messages
        engine.set_use_message(1, Bernoulli::point_mass(true)).unwrap();
        engine.set_use_message(2, Bernoulli::point_mass(false)).unwrap();
        assert_eq!(engine.update(), Err(EpError::InconsistentEvidence));
        assert!(matches!(
            engine.prior_message(),
            Err(EpError::NotInitialised { .. })
        ));
    }

    #[test]
    fn engines_are_independent() {
        fn assert_send<T: Send>() {}
        assert_send::<ExpectationPropagation<Bernoulli>>();

        let handles: Vec<_> = [0.1, 0.2, 0.3]
            .into_iter()
            .map(|prior| {
                std::thread::spawn(move || {
                    let mut engine = ExpectationPropagation::bernoulli(prior, 0).unwrap();
                    engine.run().unwrap().prob_true()
                })
            })
            .collect();
        let marginals: Vec<f64> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(marginals, vec![0.1, 0.2, 0.3]);
    }
}
