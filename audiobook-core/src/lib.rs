//! Catalog, metadata assembly, provider chain, operation queue, and file
//! organizer for a personal audiobook library.

pub mod assembler;
pub mod bulk_fetch;
pub mod catalog;
pub mod cover_fetcher;
pub mod error;
pub mod event_hub;
pub mod folder_parser;
pub mod organizer;
pub mod orchestration;
pub mod providers;
pub mod scanner;
pub mod tags;
pub mod types;

pub use bulk_fetch::{BulkFetchHandler, BulkFetchParams};
pub use catalog::{StaleWriteGuard, Store};
pub use cover_fetcher::CoverFetcher;
pub use error::{CoreError, Result};
pub use event_hub::{Event, EventHub};
pub use organizer::{OrganizeHandler, OrganizeOutcome, OrganizeParams, OrganizeTemplate, Organizer};
pub use orchestration::{HandlerRegistry, OperationContext, OperationHandler, OperationQueue};
pub use providers::{Chain, ChainOutcome, MetadataSource, ProviderError};
pub use scanner::{ScanHandler, ScanParams, ScanSummary, Scanner};
pub use types::*;
