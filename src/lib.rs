// Library exports for packet-tally
pub mod analysis;
pub mod capture;
pub mod config;
pub mod persistence;
pub mod utils;

pub use analysis::{classifier, session, sink, statistics};
pub use capture::{pcap_engine, record, source};
pub use config::settings;
pub use utils::formatting;

// Error types
pub use anyhow::{Error, Result};
