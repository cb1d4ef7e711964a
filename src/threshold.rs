//! Statistical cutoff that decides which campaigns have been tested enough
//! to be ranked.
//!
//! The threshold is always computed from the full loaded dataset, never from
//! a filtered subset, and is applied as a logical AND over results and spend.

use crate::models::{
    CampaignRecord, SmallDatasetFallback, Threshold, ThresholdConfig, ThresholdPolicy,
};
use statrs::statistics::Statistics;
use tracing::{debug, info};

/// Which rule actually produced a threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdSource {
    Fixed,
    Percentile(f64),
    MeanMinusStd,
    HalfMedian,
    KeepAll,
}

impl std::fmt::Display for ThresholdSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThresholdSource::Fixed => write!(f, "fixed minimums"),
            ThresholdSource::Percentile(p) => write!(f, "{}th percentile", p),
            ThresholdSource::MeanMinusStd => write!(f, "mean - 1 std dev"),
            ThresholdSource::HalfMedian => write!(f, "half of median"),
            ThresholdSource::KeepAll => write!(f, "no cutoff (small dataset)"),
        }
    }
}

/// Threshold chosen for one run and how it was chosen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdDecision {
    pub threshold: Threshold,
    pub source: ThresholdSource,
}

pub struct ThresholdFilter<'a> {
    config: &'a ThresholdConfig,
}

impl<'a> ThresholdFilter<'a> {
    pub fn new(config: &'a ThresholdConfig) -> Self {
        Self { config }
    }

    /// Derive the cutoff from every loaded record
    pub fn compute(&self, records: &[CampaignRecord]) -> ThresholdDecision {
        let results: Vec<f64> = records.iter().filter_map(|r| r.results).collect();
        let spent: Vec<f64> = records.iter().filter_map(|r| r.amount_spent).collect();

        let decision = match self.config.policy {
            ThresholdPolicy::Fixed => ThresholdDecision {
                threshold: Threshold {
                    min_results: self.config.min_results,
                    min_amount_spent: self.config.min_amount_spent,
                },
                source: ThresholdSource::Fixed,
            },
            ThresholdPolicy::Dispersion => {
                dispersion_threshold(&results, &spent, SmallDatasetFallback::MeanMinusStd)
            }
            ThresholdPolicy::Percentile => {
                if records.len() < self.config.small_dataset_size {
                    debug!(
                        "{} records is below the small dataset size of {}, using fallback",
                        records.len(),
                        self.config.small_dataset_size
                    );
                    dispersion_threshold(&results, &spent, self.config.small_dataset_fallback)
                } else {
                    let p = self.config.percentile;
                    ThresholdDecision {
                        threshold: Threshold {
                            min_results: percentile(&results, p).unwrap_or(0.0),
                            min_amount_spent: percentile(&spent, p).unwrap_or(0.0),
                        },
                        source: ThresholdSource::Percentile(p),
                    }
                }
            }
        };

        info!(
            "Threshold ({}): results >= {:.2}, amount spent >= {:.2}",
            decision.source, decision.threshold.min_results, decision.threshold.min_amount_spent
        );
        decision
    }

    /// Keep records that pass the threshold, preserving input order
    pub fn apply(&self, records: &[CampaignRecord], threshold: &Threshold) -> Vec<CampaignRecord> {
        let passed: Vec<CampaignRecord> = records
            .iter()
            .filter(|r| threshold.admits(r))
            .cloned()
            .collect();

        info!(
            "{} of {} campaigns meet the threshold ({} filtered out)",
            passed.len(),
            records.len(),
            records.len() - passed.len()
        );
        passed
    }
}

fn dispersion_threshold(
    results: &[f64],
    spent: &[f64],
    fallback: SmallDatasetFallback,
) -> ThresholdDecision {
    let (min_results, min_amount_spent, source) = match fallback {
        SmallDatasetFallback::MeanMinusStd => (
            mean_minus_std(results),
            mean_minus_std(spent),
            ThresholdSource::MeanMinusStd,
        ),
        SmallDatasetFallback::HalfMedian => (
            percentile(results, 50.0).map_or(0.0, |m| m * 0.5),
            percentile(spent, 50.0).map_or(0.0, |m| m * 0.5),
            ThresholdSource::HalfMedian,
        ),
        SmallDatasetFallback::KeepAll => (f64::NEG_INFINITY, f64::NEG_INFINITY, ThresholdSource::KeepAll),
    };

    ThresholdDecision {
        threshold: Threshold {
            min_results,
            min_amount_spent,
        },
        source,
    }
}

/// Sample mean minus one sample standard deviation; std dev of a single value is 0
fn mean_minus_std(values: &[f64]) -> f64 {
    match values.len() {
        0 => 0.0,
        1 => values[0],
        _ => values.mean() - values.std_dev(),
    }
}

/// Linear interpolation between closest ranks, `pos = (n - 1) * p / 100`
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let p = p.clamp(0.0, 100.0);
    let pos = (sorted.len() - 1) as f64 * (p / 100.0);
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let fraction = pos - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}
