use super::{parse_parameters, Stage, StageError};
use crate::bundle::InputBundle;
use crate::store::Store;
use crate::tags::TagSet;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ClearParameters {
    products: Vec<String>,
    tags: TagSet,
}

/// Removes named products and products carrying any configured tag.
///
/// Parameters: `products` (array of names), `tags` (array of tags).
#[derive(Debug, Default)]
pub struct ClearProductsStage {
    products: Vec<String>,
    tags: TagSet,
}

impl ClearProductsStage {
    pub const KIND: &'static str = "ClearProductsStage";
}

impl<P> Stage<P> for ClearProductsStage {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn init(&mut self, parameters: &Value) -> Result<(), StageError> {
        let params: ClearParameters = parse_parameters(Self::KIND, parameters)?;
        self.products = params.products;
        self.tags = params.tags;
        debug!(
            stage = Self::KIND,
            products = self.products.len(),
            tags = self.tags.len(),
            "configured products and tags to clear"
        );
        Ok(())
    }

    fn process(&mut self, store: &Store<P>, _input: &InputBundle) -> Result<(), StageError> {
        let mut doomed: BTreeSet<String> = self.products.iter().cloned().collect();
        doomed.extend(store.get_names_with_any_tags(&self.tags));
        if doomed.is_empty() {
            return Ok(());
        }
        let doomed: Vec<String> = doomed.into_iter().collect();
        let removed = store.remove_multiple(&doomed);
        debug!(stage = Self::KIND, requested = doomed.len(), removed, "cleared products");
        Ok(())
    }
}
