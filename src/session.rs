use std::sync::Arc;

use crate::config::ServerConfig;
use crate::traits::{TableHandle, Warehouse, WarehouseError, WarehouseResult};

/// The cached fetch handle onto one `(dataset, table)` pair. Replaced
/// wholesale when the pair changes; never shared across connections.
pub struct SourceBinding {
    dataset: String,
    table: String,
    handle: Box<dyn TableHandle>,
}

impl SourceBinding {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>, handle: Box<dyn TableHandle>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
            handle,
        }
    }

    /// The reuse rule: a binding is reused iff both dataset and table match.
    pub fn matches(&self, dataset: &str, table: &str) -> bool {
        self.dataset == dataset && self.table == table
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn handle(&self) -> &dyn TableHandle {
        self.handle.as_ref()
    }
}

/// Per-connection mutable state: the current source binding plus the
/// immutable configuration snapshot. Owned exclusively by one connection
/// task, created at connection open and dropped at close.
pub struct SessionState {
    config: Arc<ServerConfig>,
    binding: Option<SourceBinding>,
}

impl SessionState {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config,
            binding: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn config_arc(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.config)
    }

    pub fn dataset_id(&self) -> &str {
        &self.config.dataset_id
    }

    /// The currently bound handle, if any. Requests that must not create a
    /// binding (`unit`) go through here.
    pub fn current_handle(&self) -> Option<&dyn TableHandle> {
        self.binding.as_ref().map(SourceBinding::handle)
    }

    /// Return a handle bound to `(dataset, table)`, reusing the current
    /// binding when the pair is unchanged and opening a fresh one otherwise.
    /// The superseded binding is dropped with its resources.
    pub async fn bind(
        &mut self,
        warehouse: &dyn Warehouse,
        table: &str,
    ) -> WarehouseResult<&dyn TableHandle> {
        let dataset = self.config.dataset_id.clone();
        let reuse = self
            .binding
            .as_ref()
            .is_some_and(|b| b.matches(&dataset, table));
        if !reuse {
            let handle = warehouse.open(&dataset, table).await?;
            self.binding = Some(SourceBinding::new(dataset, table, handle));
        }
        match &self.binding {
            Some(binding) => Ok(binding.handle()),
            None => Err(WarehouseError::Internal(
                "source binding missing after rebind".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use async_trait::async_trait;

    struct NullHandle;

    #[async_trait]
    impl TableHandle for NullHandle {
        async fn fetch(&self, _columns: &[String], _row_cap: usize) -> WarehouseResult<Frame> {
            Ok(Frame::new())
        }
    }

    #[test]
    fn reuse_requires_both_dataset_and_table_to_match() {
        let binding = SourceBinding::new("ds", "c4-31110", Box::new(NullHandle));
        assert!(binding.matches("ds", "c4-31110"));
        assert!(!binding.matches("ds", "c4-31111"));
        assert!(!binding.matches("other", "c4-31110"));
    }
}
