pub mod fallback;
pub mod generator;
pub mod parse;

pub use generator::{ContentGenerator, ContentSource, Generated};
