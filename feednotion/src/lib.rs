// Library interface for feednotion modules
// This allows tests and the binaries to import modules

pub mod error;
pub mod filter;
pub mod http;
pub mod ingestion;
pub mod item;
pub mod listing;
pub mod llm;
pub mod notion;
pub mod scraping;
pub mod sync;
