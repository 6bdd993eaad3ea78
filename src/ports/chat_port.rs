//! Chat completion port trait.

use crate::domain::error::StockpickError;
use crate::domain::llm::{ChatRequest, Provider};

pub trait ChatPort {
    /// Send one chat request to `provider` and return the reply text.
    fn complete(&self, provider: &Provider, request: &ChatRequest) -> Result<String, StockpickError>;
}
