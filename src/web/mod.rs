//! External web collaborators: search and page fetching.
//!
//! Both are black boxes to the rest of the pipeline: a query becomes a
//! list of `{title, url, snippet}` results, a URL becomes plain text.

pub mod fetch;
pub mod search;

pub use fetch::{domain_of, PageFetcher};
pub use search::{search_web, SearchResult};
