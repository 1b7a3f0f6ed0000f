use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use jsonschema::Validator;
use serde_json::Value;

use crate::error::{CapabilityError, RegistryError};

/// Default deadline for one capability's native call.
pub const DEFAULT_CAPABILITY_TIMEOUT: Duration = Duration::from_secs(30);

type InvokeFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, CapabilityError>> + Send + Sync>;

/// A named, schema-described operation exposed to external clients.
#[derive(Clone)]
pub struct Capability {
    name: String,
    description: String,
    input_schema: Value,
    timeout: Duration,
    invoke: InvokeFn,
}

impl Capability {
    /// Create a capability backed by `invoke`, which receives the validated
    /// arguments object.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        invoke: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CapabilityError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            timeout: DEFAULT_CAPABILITY_TIMEOUT,
            invoke: Arc::new(move |arguments| invoke(arguments).boxed()),
        }
    }

    /// Override the deadline [`CapabilityRegistry::call`] enforces.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

struct Entry {
    capability: Capability,
    validator: Validator,
}

/// Ordered registry of capabilities with compiled input validators.
///
/// Listing order is registration order; lookup is by exact name.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile the capability's input schema and add it.
    pub fn register(&mut self, capability: Capability) -> Result<(), RegistryError> {
        if self.index.contains_key(capability.name()) {
            return Err(RegistryError::Duplicate(capability.name().to_string()));
        }

        let validator = jsonschema::validator_for(capability.input_schema()).map_err(|err| {
            RegistryError::InvalidSchema {
                name: capability.name().to_string(),
                message: err.to_string(),
            }
        })?;

        tracing::debug!(capability = capability.name(), "registered capability");
        self.index
            .insert(capability.name().to_string(), self.entries.len());
        self.entries.push(Entry {
            capability,
            validator,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.index
            .get(name)
            .map(|&position| &self.entries[position].capability)
    }

    /// Capabilities in registration order.
    pub fn list(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter().map(|entry| &entry.capability)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check `arguments` against the named capability's input schema.
    pub fn validate(&self, name: &str, arguments: &Value) -> Result<(), CapabilityError> {
        let entry = self.entry(name)?;
        let mut errors = entry.validator.iter_errors(arguments);
        if let Some(first) = errors.next() {
            let mut message = first.to_string();
            for err in errors.take(3) {
                message.push_str("; ");
                message.push_str(&err.to_string());
            }
            return Err(CapabilityError::InvalidArguments {
                name: name.to_string(),
                message,
            });
        }
        Ok(())
    }

    /// Look up, validate, and invoke a capability, bounded by its timeout.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, CapabilityError> {
        self.validate(name, &arguments)?;
        let capability = &self.entry(name)?.capability;
        let timeout = capability.timeout();
        match tokio::time::timeout(timeout, (capability.invoke)(arguments)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CapabilityError::Timeout {
                name: name.to_string(),
                timeout,
            }),
        }
    }

    fn entry(&self, name: &str) -> Result<&Entry, CapabilityError> {
        self.index
            .get(name)
            .map(|&position| &self.entries[position])
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))
    }
}
