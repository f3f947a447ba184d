use async_trait::async_trait;
use dashmap::DashMap;
use engine_errors::EngineError;

use crate::model::DataSource;
use crate::traits::DataSourceStore;

pub struct InMemoryDataSourceStore {
    sources: DashMap<String, DataSource>,
}

impl InMemoryDataSourceStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: DashMap::new(),
        }
    }
}

impl Default for InMemoryDataSourceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSourceStore for InMemoryDataSourceStore {
    async fn create(&self, source: DataSource) -> Result<DataSource, EngineError> {
        if self.sources.contains_key(&source.id) {
            return Err(EngineError::Conflict(format!(
                "data source '{}' already exists",
                source.id
            )));
        }
        self.sources.insert(source.id.clone(), source.clone());
        Ok(source)
    }

    async fn get(&self, account_id: &str, id: &str) -> Result<DataSource, EngineError> {
        self.sources
            .get(id)
            .filter(|s| s.account_id == account_id)
            .map(|s| s.clone())
            .ok_or(EngineError::NotFound)
    }

    async fn list(&self, account_id: &str) -> Result<Vec<DataSource>, EngineError> {
        Ok(self
            .sources
            .iter()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(id: &str, account_id: &str) -> DataSource {
        DataSource {
            id: id.to_owned(),
            account_id: account_id.to_owned(),
            name: "prices".to_owned(),
            url: "https://stub/ok".to_owned(),
            method: "GET".to_owned(),
            headers: HashMap::new(),
            body_template: None,
            aggregation: None,
            alternate_source_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn cross_account_lookup_fails() {
        let store = InMemoryDataSourceStore::new();
        store.create(source("s1", "a1")).await.unwrap();
        assert!(store.get("a2", "s1").await.is_err());
        assert!(store.get("a1", "s1").await.is_ok());
    }
}
