//! Component discovery and exhaustive state capture for web pages.
//!
//! A page is scanned into a component inventory, every entry is driven
//! through its interaction protocol, and the result is persisted into a
//! structured knowledge store with resumable checkpoints.

pub mod browser;
pub mod capture;
pub mod cli;
pub mod discovery;
pub mod error;
pub mod locator;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod trace;
