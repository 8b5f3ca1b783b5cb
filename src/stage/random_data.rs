use super::{parse_parameters, Stage, StageError};
use crate::bundle::InputBundle;
use crate::fields::{FieldAccess, FieldRegistry, FieldValue};
use crate::product::Product;
use crate::store::Store;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// A named scalar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
}

impl Parameter {
    fn registry() -> &'static FieldRegistry<Parameter> {
        static FIELDS: OnceLock<FieldRegistry<Parameter>> = OnceLock::new();
        FIELDS.get_or_init(|| {
            FieldRegistry::<Parameter>::new()
                .with_field("name", |p| FieldValue::Text(p.name.clone()))
                .with_field("value", |p| FieldValue::F64(p.value))
        })
    }
}

impl FieldAccess for Parameter {
    fn field(&self, name: &str) -> Option<FieldValue> {
        Self::registry().get(self, name)
    }

    fn fields(&self) -> BTreeMap<&'static str, FieldValue> {
        Self::registry().all(self)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RandomDataParameters {
    product_name: String,
    min: f64,
    max: f64,
    seed: u64,
}

impl Default for RandomDataParameters {
    fn default() -> Self {
        Self {
            product_name: "random_value".to_string(),
            min: 0.0,
            max: 1.0,
            seed: 0,
        }
    }
}

/// Writes a uniformly distributed `Parameter` into the store every event,
/// replacing the previous one. The product is tagged `generated`.
///
/// Parameters: `product_name` (default `random_value`), `min` (0.0),
/// `max` (1.0), `seed` (0).
#[derive(Debug)]
pub struct RandomDataGeneratorStage {
    product_name: String,
    min: f64,
    max: f64,
    rng: StdRng,
}

impl RandomDataGeneratorStage {
    pub const KIND: &'static str = "RandomDataGeneratorStage";
    pub const TAG: &'static str = "generated";
}

impl Default for RandomDataGeneratorStage {
    fn default() -> Self {
        let params = RandomDataParameters::default();
        Self {
            product_name: params.product_name,
            min: params.min,
            max: params.max,
            rng: StdRng::seed_from_u64(params.seed),
        }
    }
}

impl<P: From<Parameter>> Stage<P> for RandomDataGeneratorStage {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn init(&mut self, parameters: &Value) -> Result<(), StageError> {
        let params: RandomDataParameters = parse_parameters(Self::KIND, parameters)?;
        if !(params.min.is_finite() && params.max.is_finite() && params.min <= params.max) {
            return Err(StageError::InvalidParameter {
                stage: Self::KIND.to_string(),
                reason: format!("need finite min <= max, got [{}, {}]", params.min, params.max),
            });
        }
        self.product_name = params.product_name;
        self.min = params.min;
        self.max = params.max;
        self.rng = StdRng::seed_from_u64(params.seed);
        debug!(
            stage = Self::KIND,
            product = %self.product_name,
            min = self.min,
            max = self.max,
            seed = params.seed,
            "configured generator"
        );
        Ok(())
    }

    fn process(&mut self, store: &Store<P>, _input: &InputBundle) -> Result<(), StageError> {
        let value = self.rng.random_range(self.min..=self.max);
        let parameter = Parameter {
            name: self.product_name.clone(),
            value,
        };
        store.add_or_update(
            self.product_name.clone(),
            Product::new(P::from(parameter)).with_tag(Self::TAG),
        );
        debug!(stage = Self::KIND, product = %self.product_name, value, "generated value");
        Ok(())
    }
}
