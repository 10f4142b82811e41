//! Document parsing: the routine the pool runs and the façade callers use.

pub mod extract;
pub mod parser;

pub use extract::{extract_text, Document, DocumentKind, ExtractError, TextExtractor};
pub use parser::{DocumentParser, ParseError, ParsePath, ParsePool};
