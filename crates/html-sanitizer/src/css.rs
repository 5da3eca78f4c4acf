//! CSS tokenization and style sanitization.
//!
//! Styles are part of an element's attribute surface, and their safety is
//! not free: `url()` smuggles protocols, `expression()` executes script in
//! legacy engines, and a property like `position` lets content escape its
//! box and shadow the host page. The pipeline here is tokenize → validate
//! against a property schema → re-serialize in a normal form that re-lexes
//! to the same token stream.

pub mod schema;
pub mod tokens;

mod sanitize;

pub use sanitize::{sanitize_declarations, sanitize_stylesheet};
