//! Stages: units of per-event work over a shared `Store`.
//!
//! A stage is configured once from a JSON parameter object and then asked
//! to process each event. The store is handed to `process` explicitly; there
//! is no ambient registry. `StageFactory` maps type names to constructors so
//! a `Pipeline` can be assembled from configuration.

mod clear_products;
mod random_data;

pub use clear_products::ClearProductsStage;
pub use random_data::{Parameter, RandomDataGeneratorStage};

use crate::bundle::{BundleError, InputBundle};
use crate::error::StoreError;
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StageError {
    #[error("unknown stage type: {0}")]
    UnknownStage(String),

    #[error("{stage}: invalid parameters: {reason}")]
    InvalidParameter { stage: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("invalid pipeline configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One unit of per-event work.
pub trait Stage<P> {
    fn name(&self) -> &str;

    /// Configure from a parameter object. Called once, before any `process`.
    fn init(&mut self, parameters: &Value) -> Result<(), StageError>;

    fn process(&mut self, store: &Store<P>, input: &InputBundle) -> Result<(), StageError>;
}

/// Deserialize a stage's parameter object; `null` yields the defaults.
pub(crate) fn parse_parameters<T>(stage: &str, parameters: &Value) -> Result<T, StageError>
where
    T: DeserializeOwned + Default,
{
    if parameters.is_null() {
        return Ok(T::default());
    }
    T::deserialize(parameters).map_err(|e| StageError::InvalidParameter {
        stage: stage.to_string(),
        reason: e.to_string(),
    })
}

pub type StageConstructor<P> = fn() -> Box<dyn Stage<P>>;

/// Registry of stage constructors keyed by type name.
pub struct StageFactory<P> {
    constructors: BTreeMap<String, StageConstructor<P>>,
}

impl<P> Default for StageFactory<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> StageFactory<P> {
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, kind: impl Into<String>, constructor: StageConstructor<P>) {
        self.constructors.insert(kind.into(), constructor);
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> + '_ {
        self.constructors.keys().map(String::as_str)
    }

    /// Construct and initialize a stage of type `kind`.
    pub fn create(&self, kind: &str, parameters: &Value) -> Result<Box<dyn Stage<P>>, StageError> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| StageError::UnknownStage(kind.to_string()))?;
        let mut stage = constructor();
        stage.init(parameters)?;
        debug!(stage = stage.name(), "stage initialized");
        Ok(stage)
    }
}

impl<P: From<Parameter> + 'static> StageFactory<P> {
    /// A factory that knows the built-in stages.
    pub fn with_builtin() -> Self {
        let mut factory = Self::new();
        factory.register(ClearProductsStage::KIND, || -> Box<dyn Stage<P>> {
            Box::new(ClearProductsStage::default())
        });
        factory.register(RandomDataGeneratorStage::KIND, || -> Box<dyn Stage<P>> {
            Box::new(RandomDataGeneratorStage::default())
        });
        factory
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct StageConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: Value,
}

/// Ordered list of stages making up a pipeline.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, StageError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StageError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

/// Stages run in order against one shared store.
pub struct Pipeline<P> {
    store: Arc<Store<P>>,
    stages: Vec<Box<dyn Stage<P>>>,
}

impl<P> Pipeline<P> {
    pub fn new(store: Arc<Store<P>>) -> Self {
        Self {
            store,
            stages: Vec::new(),
        }
    }

    pub fn from_config(
        store: Arc<Store<P>>,
        factory: &StageFactory<P>,
        config: &PipelineConfig,
    ) -> Result<Self, StageError> {
        let mut pipeline = Self::new(store);
        for stage in &config.stages {
            pipeline.push(factory.create(&stage.kind, &stage.parameters)?);
        }
        info!(stages = pipeline.stages.len(), "pipeline assembled");
        Ok(pipeline)
    }

    pub fn push(&mut self, stage: Box<dyn Stage<P>>) {
        self.stages.push(stage);
    }

    pub fn store(&self) -> &Arc<Store<P>> {
        &self.store
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage on one event, stopping at the first failure.
    pub fn process_event(&mut self, input: &InputBundle) -> Result<(), StageError> {
        for stage in &mut self.stages {
            debug!(stage = stage.name(), "processing event");
            stage.process(&self.store, input)?;
        }
        Ok(())
    }
}
