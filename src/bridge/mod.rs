//! Bridge between the auditor and the inspected page.
//!
//! The two share no memory: the auditor can only submit an expression for
//! evaluation in the page and read back the JSON result. Everything the
//! poller needs goes through [`InspectedPage`].

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

mod cdp;
mod controller;
mod poller;
mod simulated;

pub use cdp::CdpPage;
pub use controller::PollerController;
pub use poller::{PollOutcome, Poller, PollerCommand};
pub use simulated::SimulatedPage;

/// JSON-RPC "invalid params" code Chrome returns for a stale context id.
const CONTEXT_INVALID_CODE: &str = "-32602";
const CONTEXT_INVALID_SIGNATURES: [&str; 2] = [
    "uniqueContextId",
    "Cannot find context with specified id",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The page context the bridge targeted is gone (navigation, reload).
    #[error("execution context invalidated: {0}")]
    ContextInvalidated(String),
    #[error("evaluation failed: {0}")]
    Failed(String),
}

impl EvalError {
    pub fn is_context_invalidated(&self) -> bool {
        matches!(self, EvalError::ContextInvalidated(_))
    }
}

/// Sort a raw bridge error message into the two recovery paths.
pub fn classify_eval_error(message: &str) -> EvalError {
    let invalidated = message.contains(CONTEXT_INVALID_CODE)
        || CONTEXT_INVALID_SIGNATURES
            .iter()
            .any(|signature| message.contains(signature));

    if invalidated {
        EvalError::ContextInvalidated(message.to_string())
    } else {
        EvalError::Failed(message.to_string())
    }
}

/// Main-frame navigation reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    pub url: String,
}

#[async_trait]
pub trait InspectedPage: Send + Sync {
    /// Evaluate `expression` in the page and return its value by JSON.
    async fn evaluate(&self, expression: &str) -> Result<Value, EvalError>;

    /// Subscribe to main-frame navigations.
    async fn navigation_events(&self) -> anyhow::Result<mpsc::UnboundedReceiver<NavigationEvent>>;
}
