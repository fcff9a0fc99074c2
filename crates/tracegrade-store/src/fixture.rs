//! JSON fixture files loaded into the in-memory stores.
//!
//! A fixture file is a single JSON document:
//!
//! ```json
//! { "traces": [...], "analyses": [...], "definitions": [...] }
//! ```
//!
//! The CLI runs against fixtures so the engine can be exercised without a
//! database.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fakes::{
    MemoryAnalysisStore, MemoryComparisonLedger, MemoryDefinitionStore, MemoryResultLedger,
    MemoryTraceStore,
};
use crate::schema::{AnalysisRecord, EvaluationDefinition, TraceRecord};
use crate::storage_traits::StorageResult;

/// Decoded contents of a fixture file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureSet {
    #[serde(default)]
    pub traces: Vec<TraceRecord>,
    #[serde(default)]
    pub analyses: Vec<AnalysisRecord>,
    #[serde(default)]
    pub definitions: Vec<EvaluationDefinition>,
}

/// Every store the engine needs, seeded from a [`FixtureSet`].
#[derive(Debug, Clone)]
pub struct FixtureStore {
    pub traces: Arc<MemoryTraceStore>,
    pub analyses: Arc<MemoryAnalysisStore>,
    pub definitions: Arc<MemoryDefinitionStore>,
    pub results: Arc<MemoryResultLedger>,
    pub comparisons: Arc<MemoryComparisonLedger>,
}

impl FixtureStore {
    /// Read and decode a fixture file.
    pub async fn load(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let set: FixtureSet = serde_json::from_str(&raw)?;
        debug!(
            path = %path.display(),
            traces = set.traces.len(),
            analyses = set.analyses.len(),
            definitions = set.definitions.len(),
            "loaded fixture set"
        );
        Ok(Self::from_set(set))
    }

    pub fn from_set(set: FixtureSet) -> Self {
        let store = Self {
            traces: Arc::new(MemoryTraceStore::new()),
            analyses: Arc::new(MemoryAnalysisStore::new()),
            definitions: Arc::new(MemoryDefinitionStore::new()),
            results: Arc::new(MemoryResultLedger::new()),
            comparisons: Arc::new(MemoryComparisonLedger::new()),
        };
        for trace in set.traces {
            store.traces.insert(trace);
        }
        for analysis in set.analyses {
            store.analyses.insert(analysis);
        }
        for definition in set.definitions {
            store.definitions.insert(definition);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AnalysisId, EvaluationId, TraceId};
    use crate::storage_traits::{AnalysisStore, DefinitionStore, TraceStore};

    #[tokio::test]
    async fn test_demo_fixture_loads_into_every_store() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/demo.json");
        let store = FixtureStore::load(&path).await.unwrap();

        let trace = store.traces.get(&TraceId::from("trace-capital")).await.unwrap();
        assert_eq!(trace.organization_id, "org-demo");
        assert_eq!(trace.tokens.total_tokens, 23);

        let judge = store
            .definitions
            .get(&EvaluationId::from("helpfulness"))
            .await
            .unwrap();
        assert!(judge.is_visible_to("org-other"));

        let analysis = store.analyses.get(&AnalysisId::from("analysis-b")).await.unwrap();
        assert_eq!(analysis.stage_names(), ["research", "summary"]);
        assert!(store.results.is_empty());
    }

    #[tokio::test]
    async fn test_sections_are_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, r#"{"traces": []}"#).unwrap();

        let store = FixtureStore::load(&path).await.unwrap();
        assert!(store
            .analyses
            .get(&AnalysisId::from("anything"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_malformed_fixture_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(FixtureStore::load(&path).await.is_err());
    }
}
