pub mod circuit_breaker;
pub mod client;
pub mod openrouter;
pub mod replicate;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use client::{classify_status, ProviderCall, ProviderClient};
pub use openrouter::{ChatCompletion, ChatReply, ChatTurn, ImageGeneration, TokenUsage};
pub use replicate::{CreatePrediction, ModelRef, ReplicateBackend};
