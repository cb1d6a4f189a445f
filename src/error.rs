use crate::engine::expectation_propagation::EngineState;

// Errors reported by the distributions, the factor operators and the inference engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EpError {
    #[error("cannot {operation} in state {state:?}")]
    NotInitialised {
        operation: &'static str,
        state: EngineState,
    },
    #[error("inconsistent evidence: the combined messages assign zero mass to both outcomes")]
    InconsistentEvidence,
    #[error("invalid probability {0}, expected a value in [0, 1]")]
    InvalidProbability(f64),
    #[error("use index {index} is out of range for {num_uses} use sites")]
    UseIndexOutOfRange { index: usize, num_uses: usize },
}

pub type Result<T> = std::result::Result<T, EpError>;
