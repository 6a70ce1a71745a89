//! Tender API source client.
//!
//! Pages through the project search endpoint with a `lastItem` cursor, keeps
//! only actionable publications (tenders and advance notices), and fetches
//! one detail document per project with a fixed delay between requests.

mod client;

pub use client::{
    ACTIONABLE_PUB_TYPES, SourceClient, SummaryQuery, is_actionable, publication_window_start,
};
