//! Core data models for PubMed searches.

mod citation;
mod search;

pub use citation::{Citation, SearchResult, NO_RESULTS_TEXT};
pub use search::{
    ArgumentError, DateBound, DateRange, DateType, SearchRequest, SortOrder, DEFAULT_RETMAX,
    MAX_RETMAX,
};
