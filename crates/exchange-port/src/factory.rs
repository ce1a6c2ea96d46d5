//! Adapter factory keyed by a string tag: an explicit capability interface,
//! not an inheritance tree. The concrete adapter crates register themselves
//! by implementing
//! [`AdapterBuilder`] and are wired together in the workspace binary, since
//! `exchange-port` cannot depend on its own adapters without a cycle.

use std::sync::Arc;

use crate::{credentials::ExchangeCredentials, error::ExchangeError, ExchangePort};

pub trait AdapterBuilder: Send + Sync {
    fn name(&self) -> &'static str;
    fn build(&self, credentials: ExchangeCredentials) -> Result<Arc<dyn ExchangePort>, ExchangeError>;
}

#[derive(Default)]
pub struct ExchangeFactory {
    builders: Vec<Box<dyn AdapterBuilder>>,
}

impl ExchangeFactory {
    pub fn new() -> Self {
        Self { builders: Vec::new() }
    }

    pub fn register(mut self, builder: Box<dyn AdapterBuilder>) -> Self {
        self.builders.push(builder);
        self
    }

    pub fn create(&self, name: &str, credentials: ExchangeCredentials) -> Result<Arc<dyn ExchangePort>, ExchangeError> {
        self.builders
            .iter()
            .find(|b| b.name() == name)
            .ok_or_else(|| ExchangeError::Decode(format!("no adapter registered for '{name}'")))?
            .build(credentials)
    }
}
