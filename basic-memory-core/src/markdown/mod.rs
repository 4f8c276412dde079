//! Markdown knowledge parsing and writing.
//!
//! One Markdown file maps to one entity. The parser splits a file into a
//! frontmatter record, a body, and the observations and wiki-style relations
//! extracted from bullet lines anywhere in the body. The writer re-emits a
//! document so that parse/serialize round-trips, modulo whitespace inside
//! the body.
//!
//! The parser is deterministic and offline: it never touches the store.

mod frontmatter;
mod parser;
mod writer;

pub use frontmatter::{add_frontmatter, parse_frontmatter};
pub use parser::{EntityDoc, EntityParser, Frontmatter};
pub use writer::{format_observation, format_relation, to_markdown};
