//! Mock source for testing purposes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::models::{Citation, SearchRequest};
use crate::sources::{Source, SourceError};

/// A scripted in-memory source.
///
/// Terms map to ordered identifier lists and identifiers map to citations.
/// Metadata is returned in reverse order so callers cannot rely on the fetch
/// preserving search order.
#[derive(Debug, Default)]
pub struct MockSource {
    results: Mutex<HashMap<String, Vec<String>>>,
    catalogue: Mutex<HashMap<String, Citation>>,
    search_error: Mutex<Option<SourceError>>,
    fetch_error: Mutex<Option<SourceError>>,
    latency: Option<Duration>,
    search_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    last_request: Mutex<Option<SearchRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockSource {
    /// Create a new mock source with no results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Add a term whose search returns the given citations, in order.
    pub fn with_results(self, term: &str, citations: Vec<Citation>) -> Self {
        self.set_results(term, citations);
        self
    }

    /// Register search results for a term and add the citations to the catalogue.
    pub fn set_results(&self, term: &str, citations: Vec<Citation>) {
        let ids = citations.iter().map(|c| c.pmid.clone()).collect();
        lock(&self.results).insert(term.to_string(), ids);

        let mut catalogue = lock(&self.catalogue);
        for citation in citations {
            catalogue.insert(citation.pmid.clone(), citation);
        }
    }

    /// Make a term return identifiers that have no metadata
    pub fn set_ids(&self, term: &str, ids: &[&str]) {
        lock(&self.results).insert(
            term.to_string(),
            ids.iter().map(|id| id.to_string()).collect(),
        );
    }

    /// Fail every search with `error`
    pub fn fail_search(&self, error: SourceError) {
        *lock(&self.search_error) = Some(error);
    }

    /// Fail every metadata fetch with `error`
    pub fn fail_fetch(&self, error: SourceError) {
        *lock(&self.fetch_error) = Some(error);
    }

    /// Clear any scripted errors.
    pub fn clear_errors(&self) {
        *lock(&self.search_error) = None;
        *lock(&self.fetch_error) = None;
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// The request seen by the most recent search
    pub fn last_request(&self) -> Option<SearchRequest> {
        lock(&self.last_request).clone()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    async fn search_ids(&self, request: &SearchRequest) -> Result<Vec<String>, SourceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_request) = Some(request.clone());
        self.pause().await;

        if let Some(error) = lock(&self.search_error).clone() {
            return Err(error);
        }

        let mut ids = lock(&self.results)
            .get(&request.term)
            .cloned()
            .unwrap_or_default();
        ids.truncate(request.retmax as usize);
        Ok(ids)
    }

    async fn fetch_citations(&self, ids: &[String]) -> Result<Vec<Citation>, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if let Some(error) = lock(&self.fetch_error).clone() {
            return Err(error);
        }

        let catalogue = lock(&self.catalogue);
        Ok(ids
            .iter()
            .rev()
            .filter_map(|id| catalogue.get(id).cloned())
            .collect())
    }
}

/// Helper function to create a mock citation for testing.
pub fn make_citation(pmid: &str, title: &str) -> Citation {
    Citation::new(pmid)
        .title(title)
        .author("Doe J")
        .journal("J Test")
        .pub_date("2024 Mar 5")
        .abstract_text(format!("Abstract of {}.", title))
}
