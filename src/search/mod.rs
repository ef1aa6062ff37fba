//! Search filters and inline query parsing

pub mod filters;
pub mod query;

pub use filters::{SearchFilter, SearchFilters};
pub use query::{ParsedQuery, parse_query};
