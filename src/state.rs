//! Published model shared with readers. Replaced wholesale after each successful reload so
//! readers never see a partially resolved graph.

use crate::error::ModelError;
use crate::model::ModelGraph;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub struct ModelState {
    graph: Arc<RwLock<Arc<ModelGraph>>>,
}

impl ModelState {
    pub fn new(graph: ModelGraph) -> Self {
        ModelState {
            graph: Arc::new(RwLock::new(Arc::new(graph))),
        }
    }

    /// Current published graph. The snapshot stays valid after later publishes.
    pub fn snapshot(&self) -> Result<Arc<ModelGraph>, ModelError> {
        let guard = self.graph.read().map_err(|_| ModelError::State("state lock".into()))?;
        Ok(Arc::clone(&guard))
    }

    pub(crate) fn publish(&self, graph: ModelGraph) -> Result<Arc<ModelGraph>, ModelError> {
        let graph = Arc::new(graph);
        let mut guard = self.graph.write().map_err(|_| ModelError::State("state lock".into()))?;
        *guard = Arc::clone(&graph);
        Ok(graph)
    }
}
