use crate::error::ReportError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column headers of the primary campaign export
pub mod columns {
    pub const CAMPAIGN_NAME: &str = "Campaign name";
    pub const AD_SET_NAME: &str = "Ad Set Name";
    pub const AD_NAME: &str = "Ad name";
    pub const RESULTS: &str = "Results";
    pub const COST_PER_RESULT: &str = "Cost per result";
    pub const CPC: &str = "CPC (cost per link click)";
    pub const AMOUNT_SPENT: &str = "Amount spent (GBP)";
    pub const CTR: &str = "CTR (all)";

    pub const REQUIRED: [&str; 7] = [
        CAMPAIGN_NAME,
        AD_SET_NAME,
        AD_NAME,
        RESULTS,
        COST_PER_RESULT,
        CPC,
        AMOUNT_SPENT,
    ];

    /// Derived column appended to the output file
    pub const EFFICIENCY_SCORE: &str = "efficiency_score";

    // Creative export
    pub const CREATIVE_AD_NAME: &str = "Ad Name";
    pub const PRIMARY_TEXT: &str = "Primary Text";
    pub const HEADLINE: &str = "Headline";

    pub const CREATIVE_REQUIRED: [&str; 3] = [CREATIVE_AD_NAME, PRIMARY_TEXT, HEADLINE];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_file: String,
    pub output_file: String,
    pub creative_file: Option<String>,
    pub top_k: usize,
    pub numeric_policy: NumericPolicy,
    pub cost_per_result: CostPerResultPolicy,
    pub threshold: ThresholdConfig,
    pub enrichment: EnrichmentConfig,
}

/// How non-numeric cells in numeric columns are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumericPolicy {
    /// Coerce to null and log a warning
    #[serde(rename = "permissive")]
    Permissive,
    /// Abort the run on the first bad cell
    #[serde(rename = "strict")]
    Strict,
}

/// Whether `Cost per result` is trusted or derived from spend / results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostPerResultPolicy {
    /// Use the exported value; derive it only when the cell is empty
    #[serde(rename = "as_given")]
    AsGiven,
    /// Always use `amount_spent / results` when results > 0
    #[serde(rename = "recompute")]
    Recompute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdPolicy {
    #[serde(rename = "fixed")]
    Fixed,
    #[serde(rename = "percentile")]
    Percentile,
    #[serde(rename = "dispersion")]
    Dispersion,
}

/// Cutoff used by the percentile policy when the dataset is too small
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmallDatasetFallback {
    /// `mean - 1 * std_dev`
    #[serde(rename = "mean_minus_std")]
    MeanMinusStd,
    /// `median * 0.5`
    #[serde(rename = "half_median")]
    HalfMedian,
    /// No filtering at all
    #[serde(rename = "keep_all")]
    KeepAll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub policy: ThresholdPolicy,
    pub percentile: f64,
    pub min_results: f64,
    pub min_amount_spent: f64,
    pub small_dataset_size: usize,
    pub small_dataset_fallback: SmallDatasetFallback,
}

/// Deepest rung of the matching ladder that enrichment may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrichmentPolicy {
    #[serde(rename = "exact")]
    Exact,
    #[serde(rename = "positional")]
    Positional,
    #[serde(rename = "keyword_score")]
    KeywordScore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub policy: EnrichmentPolicy,
    pub keywords: Vec<String>,
    pub min_match_fraction: f64,
    /// Ad name -> zero-based row index in the creative file
    pub positional: BTreeMap<String, usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_file: "Historic Report CA.csv".to_string(),
            output_file: "sorted_campaigns.csv".to_string(),
            creative_file: None,
            top_k: 5,
            numeric_policy: NumericPolicy::Permissive,
            cost_per_result: CostPerResultPolicy::AsGiven,
            threshold: ThresholdConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            policy: ThresholdPolicy::Percentile,
            percentile: 25.0,
            min_results: 100.0,
            min_amount_spent: 1000.0,
            small_dataset_size: 10,
            small_dataset_fallback: SmallDatasetFallback::MeanMinusStd,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            policy: EnrichmentPolicy::KeywordScore,
            keywords: [
                "sale", "offer", "free", "new", "discount", "shipping", "gift", "limited",
                "summer", "winter", "video", "carousel",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
            min_match_fraction: 0.3,
            positional: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> Result<Self, ReportError> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> Result<(), ReportError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ReportError::InvalidConfig(e.to_string()))?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    /// Reject values no policy can work with
    pub fn validate(&self) -> Result<(), ReportError> {
        let t = &self.threshold;
        if !(0.0..=100.0).contains(&t.percentile) {
            return Err(ReportError::InvalidConfig(format!(
                "percentile must be between 0 and 100, got {}",
                t.percentile
            )));
        }
        if t.min_results < 0.0 || t.min_amount_spent < 0.0 {
            return Err(ReportError::InvalidConfig(
                "fixed minimums must not be negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.enrichment.min_match_fraction) {
            return Err(ReportError::InvalidConfig(format!(
                "min_match_fraction must be between 0 and 1, got {}",
                self.enrichment.min_match_fraction
            )));
        }
        Ok(())
    }
}

/// One row of the campaign export
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignRecord {
    /// One-based data row in the source file (header excluded)
    pub row: usize,
    pub campaign_name: String,
    pub ad_set_name: String,
    pub ad_name: String,
    pub results: Option<f64>,
    pub amount_spent: Option<f64>,
    pub cost_per_result: Option<f64>,
    pub cpc: Option<f64>,
    pub ctr: Option<f64>,
    /// Every cell of the source row, in source column order
    pub fields: Vec<String>,
}

impl CampaignRecord {
    /// `amount_spent / results`, when both are known and results is positive
    pub fn derived_cost_per_result(&self) -> Option<f64> {
        match (self.amount_spent, self.results) {
            (Some(spent), Some(results)) if results > 0.0 => Some(spent / results),
            _ => None,
        }
    }

    pub fn apply_cost_policy(&mut self, policy: CostPerResultPolicy) {
        let derived = self.derived_cost_per_result();
        match policy {
            CostPerResultPolicy::AsGiven => {
                if self.cost_per_result.is_none() {
                    self.cost_per_result = derived;
                }
            }
            CostPerResultPolicy::Recompute => {
                if derived.is_some() {
                    self.cost_per_result = derived;
                }
            }
        }
    }
}

/// One row of the creative export
#[derive(Debug, Clone, PartialEq)]
pub struct CreativeRecord {
    pub ad_name: String,
    pub primary_text: String,
    pub headline: String,
}

/// Minimums a campaign must reach on both axes to be ranked
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub min_results: f64,
    pub min_amount_spent: f64,
}

impl Threshold {
    pub fn admits(&self, record: &CampaignRecord) -> bool {
        match (record.results, record.amount_spent) {
            (Some(results), Some(spent)) => {
                results >= self.min_results && spent >= self.min_amount_spent
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(results: Option<f64>, spent: Option<f64>, cpr: Option<f64>) -> CampaignRecord {
        CampaignRecord {
            row: 1,
            campaign_name: "Spring".to_string(),
            ad_set_name: "Set".to_string(),
            ad_name: "Ad".to_string(),
            results,
            amount_spent: spent,
            cost_per_result: cpr,
            cpc: Some(0.5),
            ctr: None,
            fields: Vec::new(),
        }
    }

    #[test]
    fn threshold_requires_both_axes() {
        let threshold = Threshold { min_results: 50.0, min_amount_spent: 500.0 };
        assert!(threshold.admits(&record(Some(50.0), Some(500.0), None)));
        assert!(!threshold.admits(&record(Some(10.0), Some(5000.0), None)));
        assert!(!threshold.admits(&record(Some(500.0), Some(100.0), None)));
        assert!(!threshold.admits(&record(None, Some(5000.0), None)));
    }

    #[test]
    fn cost_policy_as_given_only_fills_gaps() {
        let mut given = record(Some(10.0), Some(200.0), Some(25.0));
        given.apply_cost_policy(CostPerResultPolicy::AsGiven);
        assert_eq!(given.cost_per_result, Some(25.0));

        let mut missing = record(Some(10.0), Some(200.0), None);
        missing.apply_cost_policy(CostPerResultPolicy::AsGiven);
        assert_eq!(missing.cost_per_result, Some(20.0));
    }

    #[test]
    fn cost_policy_recompute_overrides_export() {
        let mut given = record(Some(10.0), Some(200.0), Some(25.0));
        given.apply_cost_policy(CostPerResultPolicy::Recompute);
        assert_eq!(given.cost_per_result, Some(20.0));

        // zero results cannot be divided, keep the export
        let mut zero = record(Some(0.0), Some(200.0), Some(25.0));
        zero.apply_cost_policy(CostPerResultPolicy::Recompute);
        assert_eq!(zero.cost_per_result, Some(25.0));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut config = Config::default();
        config.creative_file = Some("creatives.csv".to_string());
        config.enrichment.positional.insert("Ad 1".to_string(), 2);
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.creative_file.as_deref(), Some("creatives.csv"));
        assert_eq!(parsed.enrichment.positional.get("Ad 1"), Some(&2));
        assert_eq!(parsed.threshold.policy, ThresholdPolicy::Percentile);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: Config = toml::from_str("top_k = 3\n[threshold]\npolicy = \"fixed\"\n").unwrap();
        assert_eq!(parsed.top_k, 3);
        assert_eq!(parsed.threshold.policy, ThresholdPolicy::Fixed);
        assert_eq!(parsed.threshold.percentile, 25.0);
        assert_eq!(parsed.output_file, "sorted_campaigns.csv");
    }

    #[test]
    fn validate_rejects_out_of_range_percentile() {
        let mut config = Config::default();
        config.threshold.percentile = 120.0;
        assert!(matches!(config.validate(), Err(ReportError::InvalidConfig(_))));
    }
}
