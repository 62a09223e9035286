pub mod analysis;
pub mod metrics;
pub mod property;
pub mod report;
pub mod settings;
pub mod tenant;
