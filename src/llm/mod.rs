pub mod provider;

pub use provider::{
    Completion, DEFAULT_MAX_TOKENS, DEFAULT_PROVIDERS, DEFAULT_TEMPERATURE, ProviderChain,
    ProviderConfig, ProviderShape,
};
