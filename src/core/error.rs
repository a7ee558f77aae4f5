//! Run-level error taxonomy and exit codes.

use anyhow::Result;

use crate::core::extract::ExtractError;
use crate::core::history::HistoryError;

/// Domain-specific error taxonomy for exit-code mapping
#[derive(thiserror::Error, Debug, Clone)]
pub enum RunError {
    /// Some files could not be applied or restored
    #[error("{0}")]
    Partial(String),

    /// Files changed outside itf; nothing was done
    #[error("{0}")]
    Conflict(String),

    /// Unusable input or arguments
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A required tool or resource is unavailable
    #[error("environment: {0}")]
    Environment(String),

    /// History has nowhere to move
    #[error("{0}")]
    NothingToStep(String),

    /// Unexpected failures
    #[error("internal error: {0}")]
    Internal(String),
}

/// 0=success, 2=partial/conflict, 3=invalid, 4=environment, 5=internal, 6=nothing to undo/redo
pub fn exit_code_for(e: &RunError) -> i32 {
    match e {
        RunError::Partial(_) | RunError::Conflict(_) => 2,
        RunError::InvalidInput(_) => 3,
        RunError::Environment(_) => 4,
        RunError::Internal(_) => 5,
        RunError::NothingToStep(_) => 6,
    }
}

/// Map any handler error onto the taxonomy
pub fn classify(e: anyhow::Error) -> RunError {
    if let Some(run) = e.downcast_ref::<RunError>() {
        return run.clone();
    }
    if let Some(h) = e.downcast_ref::<HistoryError>() {
        return match h {
            HistoryError::NothingToRevert | HistoryError::NothingToRedo => {
                RunError::NothingToStep(h.to_string())
            }
            HistoryError::Storage(_) => RunError::Internal(format!("{e:#}")),
        };
    }
    if e.downcast_ref::<ExtractError>().is_some() {
        return RunError::InvalidInput(format!("{e:#}"));
    }
    RunError::Internal(format!("{e:#}"))
}

/// Convert Result<()> to exit codes for the CLI harness
pub fn finish_with_exit(result: Result<()>) -> ! {
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            let typed = classify(e);
            eprintln!("{typed}");
            std::process::exit(exit_code_for(&typed));
        }
    }
}
