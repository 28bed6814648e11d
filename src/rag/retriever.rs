//! Parallel similarity search across every configured source.
//!
//! Each source runs under its own timeout and its failure is captured into
//! its own result slot. The joined map always has one entry per source.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use super::index::VectorIndex;
use super::types::{RawMatch, SourceName};
use crate::core::errors::PipelineError;

pub struct SourceBinding {
    pub name: SourceName,
    pub index: Arc<dyn VectorIndex>,
    pub timeout: Duration,
}

pub struct MultiSourceRetriever {
    sources: Vec<SourceBinding>,
}

impl MultiSourceRetriever {
    pub fn new(sources: Vec<SourceBinding>) -> Self {
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<SourceName> {
        self.sources.iter().map(|s| s.name).collect()
    }

    pub async fn retrieve_all(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> BTreeMap<SourceName, Vec<RawMatch>> {
        let outcomes = join_all(self.sources.iter().map(|source| async move {
            let started = tokio::time::Instant::now();
            let result = query_source(source, vector, top_k).await;
            (source.name, started.elapsed(), result)
        }))
        .await;

        let mut results = BTreeMap::new();
        for (name, elapsed, result) in outcomes {
            let matches = match result {
                Ok(matches) => {
                    tracing::debug!(
                        source = %name,
                        matches = matches.len(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "source search finished"
                    );
                    matches
                }
                Err(err) => {
                    tracing::warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        "{}; continuing without it",
                        err
                    );
                    Vec::new()
                }
            };
            results.insert(name, matches);
        }
        results
    }
}

async fn query_source(
    source: &SourceBinding,
    vector: &[f32],
    top_k: usize,
) -> Result<Vec<RawMatch>, PipelineError> {
    match tokio::time::timeout(source.timeout, source.index.query(vector, top_k)).await {
        Ok(Ok(matches)) => Ok(matches),
        Ok(Err(err)) => Err(PipelineError::RetrievalSourceUnavailable {
            source_name: source.name,
            message: err.to_string(),
        }),
        Err(_) => Err(PipelineError::RetrievalSourceUnavailable {
            source_name: source.name,
            message: format!("timed out after {} ms", source.timeout.as_millis()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ApiError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Matches(Vec<&'static str>),
        Fail,
        Hang,
    }

    struct FakeIndex {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl FakeIndex {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VectorIndex for FakeIndex {
        async fn query(&self, _vector: &[f32], top_k: usize) -> Result<Vec<RawMatch>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Matches(ids) => Ok(ids
                    .iter()
                    .take(top_k)
                    .map(|id| RawMatch {
                        id: id.to_string(),
                        score: Some(0.9),
                        ..RawMatch::default()
                    })
                    .collect()),
                Behaviour::Fail => Err(ApiError::Upstream("503 Service Unavailable".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(vec![])
                }
            }
        }
    }

    fn binding(name: SourceName, index: Arc<FakeIndex>, timeout_ms: u64) -> SourceBinding {
        SourceBinding {
            name,
            index,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn every_source_gets_an_entry() {
        let retriever = MultiSourceRetriever::new(vec![
            binding(SourceName::Restaurant, FakeIndex::new(Behaviour::Matches(vec!["a", "b"])), 500),
            binding(SourceName::Wikipedia, FakeIndex::new(Behaviour::Matches(vec![])), 500),
            binding(SourceName::News, FakeIndex::new(Behaviour::Matches(vec!["c"])), 500),
        ]);

        let results = retriever.retrieve_all(&[0.1, 0.2], 20).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[&SourceName::Restaurant].len(), 2);
        assert!(results[&SourceName::Wikipedia].is_empty());
        assert_eq!(results[&SourceName::News][0].id, "c");
    }

    #[tokio::test]
    async fn failing_source_is_isolated() {
        let news = FakeIndex::new(Behaviour::Fail);
        let retriever = MultiSourceRetriever::new(vec![
            binding(SourceName::Restaurant, FakeIndex::new(Behaviour::Matches(vec!["a"])), 500),
            binding(SourceName::Wikipedia, FakeIndex::new(Behaviour::Matches(vec!["w"])), 500),
            binding(SourceName::News, news.clone(), 500),
        ]);

        let results = retriever.retrieve_all(&[0.1], 20).await;

        assert_eq!(results[&SourceName::Restaurant].len(), 1);
        assert_eq!(results[&SourceName::Wikipedia].len(), 1);
        assert!(results[&SourceName::News].is_empty());
        assert_eq!(news.calls.load(Ordering::SeqCst), 1, "no retries");
    }

    #[tokio::test]
    async fn slow_source_times_out_without_blocking_siblings() {
        let retriever = MultiSourceRetriever::new(vec![
            binding(SourceName::Restaurant, FakeIndex::new(Behaviour::Matches(vec!["a"])), 2_000),
            binding(SourceName::News, FakeIndex::new(Behaviour::Hang), 100),
        ]);

        let started = std::time::Instant::now();
        let results = retriever.retrieve_all(&[0.1], 20).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(results[&SourceName::Restaurant].len(), 1);
        assert!(results[&SourceName::News].is_empty());
    }

    #[tokio::test]
    async fn top_k_is_forwarded() {
        let retriever = MultiSourceRetriever::new(vec![binding(
            SourceName::Restaurant,
            FakeIndex::new(Behaviour::Matches(vec!["a", "b", "c"])),
            500,
        )]);

        let results = retriever.retrieve_all(&[0.1], 2).await;
        assert_eq!(results[&SourceName::Restaurant].len(), 2);
    }
}
