//! Guard-rail tools. Each module owns one entry of the tool catalogue.

pub mod api_changes;
pub mod backup;
pub mod quarantine;
pub mod snapshot;
