use std::time::Duration;

// Options for running inference to convergence with `ExpectationPropagation::run()`
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    max_iterations: usize,
    time_max: Duration,
    tolerance: f64, // updates changing no message by more than this count as converged
}

impl EngineOptions {
    pub fn set_max_iterations(&mut self, value: usize) -> &mut Self {
        self.max_iterations = value;
        self
    }

    pub fn set_time_max(&mut self, value: Duration) -> &mut Self {
        self.time_max = value;
        self
    }

    pub fn set_tolerance(&mut self, value: f64) -> &mut Self {
        self.tolerance = value;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn time_max(&self) -> Duration {
        self.time_max
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            max_iterations: 100,
            time_max: Duration::new(60, 0),
            tolerance: 1e-10,
        }
    }
}
