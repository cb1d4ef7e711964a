//! Campaign efficiency ranking.
//!
//! Loads an ad campaign export, drops campaigns that have not spent or
//! converted enough to be judged, ranks the rest by cost per result then
//! CPC, and optionally attaches creative copy to the top performers.

pub mod analyzer;
pub mod enrichment;
pub mod error;
pub mod loader;
pub mod models;
pub mod report;
pub mod threshold;

pub use analyzer::{CampaignAnalyzer, CampaignReport, RankedCampaign, ReportOutcome};
pub use error::ReportError;
pub use models::Config;
