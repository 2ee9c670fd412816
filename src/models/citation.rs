//! Citation summaries and the per-request search result.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Text returned when a search matches nothing
pub const NO_RESULTS_TEXT: &str = "No articles found matching the search criteria.";

/// One PubMed record, as much of it as the metadata fetch returned
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Citation {
    /// PubMed identifier
    pub pmid: String,

    pub title: String,

    /// Author names in listing order ("Bellanti JA", or a collective name)
    pub authors: Vec<String>,

    pub journal: Option<String>,

    /// Publication date as printed by PubMed ("2025 Jan 1", "2019 Spring")
    pub pub_date: Option<String>,

    pub doi: Option<String>,

    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
}

impl Citation {
    pub fn new(pmid: impl Into<String>) -> Self {
        Self {
            pmid: pmid.into(),
            ..Default::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn journal(mut self, journal: impl Into<String>) -> Self {
        self.journal = Some(journal.into());
        self
    }

    pub fn pub_date(mut self, date: impl Into<String>) -> Self {
        self.pub_date = Some(date.into());
        self
    }

    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    pub fn abstract_text(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    /// PubMed landing page
    pub fn url(&self) -> String {
        format!("https://pubmed.ncbi.nlm.nih.gov/{}/", self.pmid)
    }

    /// Whether the metadata fetch returned anything for this record
    pub fn has_metadata(&self) -> bool {
        !self.title.is_empty()
            || !self.authors.is_empty()
            || self.journal.is_some()
            || self.pub_date.is_some()
    }

    /// Render as a numbered abstract block in the PubMed text listing layout
    pub fn render(&self, position: usize) -> String {
        if !self.has_metadata() {
            return format!(
                "{}. PMID: {} (metadata unavailable)\n{}",
                position,
                self.pmid,
                self.url()
            );
        }

        let source = [self.journal.as_deref(), self.pub_date.as_deref()]
            .into_iter()
            .flatten()
            .map(|part| part.trim_end_matches('.'))
            .collect::<Vec<_>>()
            .join(". ");

        let mut blocks = Vec::new();
        blocks.push(if source.is_empty() {
            format!("{}.", position)
        } else {
            format!("{}. {}.", position, source)
        });
        if !self.title.is_empty() {
            blocks.push(self.title.clone());
        }
        if !self.authors.is_empty() {
            blocks.push(format!("{}.", self.authors.join(", ")));
        }
        if let Some(text) = self.abstract_text.as_deref().filter(|t| !t.is_empty()) {
            blocks.push(text.to_string());
        }

        let mut ids = Vec::new();
        if let Some(doi) = &self.doi {
            ids.push(format!("DOI: {}", doi));
        }
        ids.push(format!("PMID: {}", self.pmid));
        blocks.push(ids.join("\n"));

        blocks.join("\n\n")
    }
}

/// Ordered citation summaries produced by one search
///
/// Owned by the request that produced it and dropped once the response is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The query term, echoed back
    pub term: String,

    pub citations: Vec<Citation>,
}

impl SearchResult {
    pub fn empty(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            citations: Vec::new(),
        }
    }

    /// Pair fetched metadata with identifiers, keeping the search order.
    ///
    /// The fetch may return records in any order and may omit some; an omitted
    /// identifier keeps its slot with empty metadata.
    pub fn assemble(term: impl Into<String>, ids: &[String], fetched: Vec<Citation>) -> Self {
        let by_pmid: HashMap<String, Citation> = fetched
            .into_iter()
            .map(|citation| (citation.pmid.clone(), citation))
            .collect();

        let citations = ids
            .iter()
            .map(|id| by_pmid.get(id).cloned().unwrap_or_else(|| Citation::new(id)))
            .collect();

        Self {
            term: term.into(),
            citations,
        }
    }

    pub fn len(&self) -> usize {
        self.citations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }

    /// Identifiers in result order
    pub fn ids(&self) -> Vec<&str> {
        self.citations.iter().map(|c| c.pmid.as_str()).collect()
    }

    /// Full text listing, one block per citation
    pub fn render(&self) -> String {
        if self.is_empty() {
            return NO_RESULTS_TEXT.to_string();
        }

        self.citations
            .iter()
            .enumerate()
            .map(|(i, citation)| citation.render(i + 1))
            .collect::<Vec<_>>()
            .join("\n\n\n")
    }

    /// Tool-result payload: display text plus the structured records
    ///
    /// The MCP layer wraps this value in the call result's text content, so it
    /// carries no `content` envelope of its own.
    pub fn to_tool_output(&self) -> Value {
        json!({
            "text": self.render(),
            "count": self.len(),
            "citations": self.citations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Citation {
        Citation::new("39741377")
            .title("Exploring mast cell disorders.")
            .author("Bellanti JA")
            .author("Settipane RA")
            .journal("Allergy Asthma Proc")
            .pub_date("2025 Jan 1")
            .doi("10.2500/aap.2025.46.240102")
            .abstract_text("Mast cells are...")
    }

    #[test]
    fn test_render_listing_block() {
        let text = sample().render(1);
        assert!(text.starts_with("1. Allergy Asthma Proc. 2025 Jan 1."));
        assert!(text.contains("Exploring mast cell disorders."));
        assert!(text.contains("Bellanti JA, Settipane RA."));
        assert!(text.contains("DOI: 10.2500/aap.2025.46.240102"));
        assert!(text.ends_with("PMID: 39741377"));
    }

    #[test]
    fn test_render_without_metadata() {
        let text = Citation::new("123").render(4);
        assert!(text.starts_with("4. PMID: 123 (metadata unavailable)"));
        assert!(text.contains("https://pubmed.ncbi.nlm.nih.gov/123/"));
    }

    #[test]
    fn test_assemble_keeps_search_order() {
        let ids = vec!["3".to_string(), "1".to_string(), "2".to_string()];
        let fetched = vec![
            Citation::new("1").title("one"),
            Citation::new("2").title("two"),
            Citation::new("3").title("three"),
        ];

        let result = SearchResult::assemble("x", &ids, fetched);
        assert_eq!(result.ids(), vec!["3", "1", "2"]);
        assert_eq!(result.citations[0].title, "three");
    }

    #[test]
    fn test_assemble_missing_metadata_keeps_slot() {
        let ids = vec!["1".to_string(), "2".to_string()];
        let result = SearchResult::assemble("x", &ids, vec![Citation::new("2").title("two")]);

        assert_eq!(result.len(), 2);
        assert!(!result.citations[0].has_metadata());
        assert_eq!(result.citations[1].title, "two");
    }

    #[test]
    fn test_empty_result() {
        let result = SearchResult::empty("nothing");
        assert!(result.is_empty());
        assert_eq!(result.render(), NO_RESULTS_TEXT);

        let output = result.to_tool_output();
        assert_eq!(output["count"], 0);
        assert_eq!(output["text"], NO_RESULTS_TEXT);
    }

    #[test]
    fn test_tool_output_shape() {
        let result = SearchResult::assemble("x", &["39741377".to_string()], vec![sample()]);
        let output = result.to_tool_output();

        assert!(output.get("content").is_none());
        assert!(output["text"].as_str().unwrap().starts_with("1. "));
        assert_eq!(output["count"], 1);
        assert_eq!(output["citations"][0]["pmid"], "39741377");
        assert_eq!(output["citations"][0]["abstract"], "Mast cells are...");
    }
}
