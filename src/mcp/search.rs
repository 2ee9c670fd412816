//! The `search_abstracts` tool: validate, search, fetch, shape.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::mcp::tools::{ToolError, ToolHandler};
use crate::models::{
    DateType, SearchRequest, SearchResult, SortOrder, DEFAULT_RETMAX, MAX_RETMAX,
};
use crate::sources::{Source, SourceError};

/// Handler for `search_abstracts`
///
/// Holds only the shared source; every call runs its own linear pipeline, so
/// one handler can serve any number of concurrent invocations.
#[derive(Debug, Clone)]
pub struct SearchAbstractsHandler {
    source: Arc<dyn Source>,
}

impl SearchAbstractsHandler {
    pub const TOOL_NAME: &'static str = "search_abstracts";

    pub const DESCRIPTION: &'static str = "Search abstracts on PubMed database based on the request parameters. \
        Returns formatted text containing article titles, abstracts, authors, journal names, \
        publication dates, DOIs, and PMIDs.";

    pub fn new(source: Arc<dyn Source>) -> Self {
        Self { source }
    }

    /// JSON Schema for the tool arguments
    pub fn input_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "term": {
                    "type": "string",
                    "description": "Entrez text query, e.g. 'asthma treatment' or 'cancer[title] AND 2023[pdat]'",
                    "minLength": 1
                },
                "retmax": {
                    "type": "integer",
                    "description": format!("Number of PMIDs to return (default={}, max={})", DEFAULT_RETMAX, MAX_RETMAX),
                    "default": DEFAULT_RETMAX,
                    "minimum": 1,
                    "maximum": MAX_RETMAX
                },
                "sort": {
                    "type": "string",
                    "description": "Sort method for results",
                    "enum": SortOrder::VALUES
                },
                "field": {
                    "type": "string",
                    "description": "Search field to limit the entire search; equivalent to adding [field] to term"
                },
                "datetype": {
                    "type": "string",
                    "description": "Type of date used to limit search: mdat (modification date), pdat (publication date), edat (Entrez date)",
                    "enum": DateType::VALUES
                },
                "reldate": {
                    "type": "integer",
                    "description": "Only items with datetype within the last n days; cannot be combined with mindate/maxdate",
                    "minimum": 0
                },
                "mindate": {
                    "type": "string",
                    "description": "Start of date range (YYYY/MM/DD, YYYY/MM or YYYY); requires maxdate",
                    "pattern": r"^\d{4}(/\d{2}(/\d{2})?)?$"
                },
                "maxdate": {
                    "type": "string",
                    "description": "End of date range (YYYY/MM/DD, YYYY/MM or YYYY); requires mindate",
                    "pattern": r"^\d{4}(/\d{2}(/\d{2})?)?$"
                }
            },
            "required": ["term"]
        })
    }

    /// JSON Schema for the value returned by [`ToolHandler::execute`]
    pub fn output_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "Numbered citations with abstracts, ready for display"
                },
                "count": {"type": "integer", "minimum": 0},
                "citations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "pmid": {"type": "string"},
                            "title": {"type": "string"},
                            "authors": {"type": "array", "items": {"type": "string"}},
                            "journal": {"type": ["string", "null"]},
                            "pub_date": {"type": ["string", "null"]},
                            "doi": {"type": ["string", "null"]},
                            "abstract": {"type": ["string", "null"]}
                        },
                        "required": ["pmid", "title", "authors"]
                    }
                }
            },
            "required": ["text", "count", "citations"]
        })
    }

    /// Run one search end to end.
    ///
    /// Arguments are validated before any upstream call. The metadata fetch is
    /// skipped when the search returns no identifiers, and the result keeps the
    /// search order regardless of how the fetch orders its records.
    pub async fn search(&self, arguments: &Value) -> Result<SearchResult, ToolError> {
        let request = SearchRequest::from_arguments(arguments)?;

        tracing::debug!(
            source = self.source.id(),
            term = %request.term,
            retmax = request.retmax,
            "Searching"
        );

        let ids = self
            .source
            .search_ids(&request)
            .await
            .inspect_err(|e| self.log_upstream_failure("search", e))?;
        if ids.is_empty() {
            tracing::info!(term = %request.term, "No matching articles");
            return Ok(SearchResult::empty(request.term));
        }

        let fetched = self
            .source
            .fetch_citations(&ids)
            .await
            .inspect_err(|e| self.log_upstream_failure("fetch", e))?;
        let result = SearchResult::assemble(request.term, &ids, fetched);

        tracing::info!(term = %result.term, count = result.len(), "Search complete");
        Ok(result)
    }

    fn log_upstream_failure(&self, stage: &str, err: &SourceError) {
        tracing::warn!(
            stage,
            transient = err.is_transient(),
            "{} request failed: {}",
            self.source.name(),
            err
        );
    }
}

#[async_trait]
impl ToolHandler for SearchAbstractsHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let result = self.search(&args).await?;
        Ok(result.to_tool_output())
    }
}
