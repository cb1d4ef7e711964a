use crate::enrichment::{CreativeMatch, CreativeMatcher};
use crate::error::ReportError;
use crate::loader::{CampaignLoader, CampaignTable};
use crate::models::{CampaignRecord, Config, CreativeRecord};
use crate::threshold::{ThresholdDecision, ThresholdFilter};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RankedCampaign {
    pub record: CampaignRecord,
    /// Average of the cost-per-result and CPC ranks (1 = best); None if either metric is missing
    pub efficiency_score: Option<f64>,
    pub creative: Option<CreativeMatch>,
}

#[derive(Debug, Clone)]
pub struct CampaignReport {
    pub headers: Vec<String>,
    pub total_records: usize,
    pub threshold: ThresholdDecision,
    pub ranked: Vec<RankedCampaign>,
    /// True when a creative table was available and matched against the top campaigns
    pub enriched: bool,
    pub top_k: usize,
}

/// Result of a run that did not fail
#[derive(Debug, Clone)]
pub enum ReportOutcome {
    Ranked(CampaignReport),
    /// Nothing reached the threshold; not an error
    NoneQualified {
        headers: Vec<String>,
        total_records: usize,
        threshold: ThresholdDecision,
    },
}

pub struct CampaignAnalyzer<'a> {
    pub config: &'a Config,
}

impl<'a> CampaignAnalyzer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Load both exports named in the config and run the whole pipeline
    pub fn run(&self) -> Result<ReportOutcome, ReportError> {
        self.config.validate()?;
        let loader = CampaignLoader::new(self.config.numeric_policy, self.config.cost_per_result)?;
        let table = loader.load_campaigns(&self.config.input_file)?;

        let creatives = match &self.config.creative_file {
            Some(path) => match loader.load_creatives(path) {
                Ok(creatives) => Some(creatives),
                Err(e) => {
                    warn!("Skipping creative enrichment: {}", e);
                    None
                }
            },
            None => None,
        };

        self.analyze(table, creatives.as_deref())
    }

    /// Threshold, rank and enrich an already loaded table
    pub fn analyze(
        &self,
        table: CampaignTable,
        creatives: Option<&[CreativeRecord]>,
    ) -> Result<ReportOutcome, ReportError> {
        self.config.validate()?;
        let total_records = table.records.len();
        info!("Analyzing {} campaigns", total_records);

        // Step 1: Cutoff from the full dataset, then filter
        let filter = ThresholdFilter::new(&self.config.threshold);
        let threshold = filter.compute(&table.records);
        let filtered = filter.apply(&table.records, &threshold.threshold);

        if filtered.is_empty() {
            warn!("No campaigns met the minimum threshold criteria");
            return Ok(ReportOutcome::NoneQualified {
                headers: table.headers,
                total_records,
                threshold,
            });
        }

        // Step 2: Order by cost per result, then CPC
        let mut ranked = rank_campaigns(filtered);

        // Step 3: Attach creative copy to the top performers
        let enriched = match creatives {
            Some(creatives) => match self.enrich(&mut ranked, creatives) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Skipping creative enrichment: {}", e);
                    false
                }
            },
            None => false,
        };

        Ok(ReportOutcome::Ranked(CampaignReport {
            headers: table.headers,
            total_records,
            threshold,
            ranked,
            enriched,
            top_k: self.config.top_k,
        }))
    }

    fn enrich(
        &self,
        ranked: &mut [RankedCampaign],
        creatives: &[CreativeRecord],
    ) -> Result<(), ReportError> {
        let matcher = CreativeMatcher::new(&self.config.enrichment, creatives)?;
        let top_k = self.config.top_k.min(ranked.len());

        for campaign in ranked.iter_mut().take(top_k) {
            campaign.creative = matcher.find(&campaign.record);
            match &campaign.creative {
                Some(found) => info!(
                    "Matched '{}' to creative '{}' by {}",
                    campaign.record.ad_name, found.creative.ad_name, found.method
                ),
                None => warn!(
                    "No creative found for '{}' / '{}'",
                    campaign.record.campaign_name, campaign.record.ad_name
                ),
            }
        }
        Ok(())
    }
}

/// Stable sort by cost per result, then CPC; missing values go last
pub fn sort_by_efficiency(records: &mut [CampaignRecord]) {
    records.sort_by(|a, b| {
        compare_metric(a.cost_per_result, b.cost_per_result)
            .then_with(|| compare_metric(a.cpc, b.cpc))
    });
}

fn compare_metric(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort the filtered campaigns and compute their efficiency scores
pub fn rank_campaigns(mut records: Vec<CampaignRecord>) -> Vec<RankedCampaign> {
    sort_by_efficiency(&mut records);
    let scores = efficiency_scores(&records);

    let distinct: HashSet<u64> = scores.iter().flatten().map(|s| s.to_bits()).collect();
    let scored = scores.iter().flatten().count();
    if distinct.len() < scored {
        warn!(
            "Efficiency scores are not unique ({} distinct of {})",
            distinct.len(),
            scored
        );
    }
    let descending = descending_steps(&scores);
    if descending > 0 {
        warn!(
            "Efficiency scores are not monotonic with the ranking ({} decreasing steps)",
            descending
        );
    }

    records
        .into_iter()
        .zip(scores)
        .map(|(record, efficiency_score)| RankedCampaign {
            record,
            efficiency_score,
            creative: None,
        })
        .collect()
}

/// Adjacent pairs where the later row scores better than the earlier one
pub fn descending_steps(scores: &[Option<f64>]) -> usize {
    scores
        .windows(2)
        .filter(|pair| matches!(pair, [Some(a), Some(b)] if b < a))
        .count()
}

/// `(rank(cost_per_result) + rank(cpc)) / 2` per record
pub fn efficiency_scores(records: &[CampaignRecord]) -> Vec<Option<f64>> {
    let cpr_values: Vec<Option<f64>> = records.iter().map(|r| r.cost_per_result).collect();
    let cpc_values: Vec<Option<f64>> = records.iter().map(|r| r.cpc).collect();
    let cpr_ranks = average_ranks(&cpr_values);
    let cpc_ranks = average_ranks(&cpc_values);

    cpr_ranks
        .into_iter()
        .zip(cpc_ranks)
        .map(|(a, b)| Some((a? + b?) / 2.0))
        .collect()
}

/// One-based ascending ranks, ties share the mean of their positions; missing values get no rank
pub fn average_ranks(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut present: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .collect();
    present.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut ranks = vec![None; values.len()];
    let mut start = 0;
    while start < present.len() {
        let mut end = start;
        while end + 1 < present.len() && present[end + 1].1 == present[start].1 {
            end += 1;
        }
        // positions start..=end are 1-based start+1..=end+1
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &(idx, _) in &present[start..=end] {
            ranks[idx] = Some(rank);
        }
        start = end + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, cpr: Option<f64>, cpc: Option<f64>) -> CampaignRecord {
        CampaignRecord {
            row: 0,
            campaign_name: name.to_string(),
            ad_set_name: String::new(),
            ad_name: String::new(),
            results: Some(100.0),
            amount_spent: Some(1000.0),
            cost_per_result: cpr,
            cpc,
            ctr: None,
            fields: Vec::new(),
        }
    }

    fn names(records: &[CampaignRecord]) -> Vec<&str> {
        records.iter().map(|r| r.campaign_name.as_str()).collect()
    }

    #[test]
    fn sorts_by_cost_then_cpc() {
        let mut records = vec![
            record("A", Some(10.0), Some(0.5)),
            record("B", Some(8.2), Some(0.4)),
            record("C", Some(8.2), Some(0.3)),
        ];
        sort_by_efficiency(&mut records);
        assert_eq!(names(&records), vec!["C", "B", "A"]);
    }

    #[test]
    fn full_ties_keep_input_order() {
        let mut records = vec![
            record("first", Some(5.0), Some(1.0)),
            record("second", Some(5.0), Some(1.0)),
            record("third", Some(5.0), Some(1.0)),
        ];
        sort_by_efficiency(&mut records);
        assert_eq!(names(&records), vec!["first", "second", "third"]);
    }

    #[test]
    fn missing_metrics_sort_last() {
        let mut records = vec![
            record("no-cost", None, Some(0.1)),
            record("no-cpc", Some(3.0), None),
            record("full", Some(3.0), Some(0.9)),
        ];
        sort_by_efficiency(&mut records);
        assert_eq!(names(&records), vec!["full", "no-cpc", "no-cost"]);
    }

    #[test]
    fn average_ranks_share_ties() {
        let ranks = average_ranks(&[Some(3.0), Some(1.0), Some(3.0), None]);
        assert_eq!(ranks, vec![Some(2.5), Some(1.0), Some(2.5), None]);
    }

    #[test]
    fn efficiency_score_averages_both_ranks() {
        let records = vec![
            record("B", Some(8.2), Some(0.4)),
            record("A", Some(10.0), Some(0.5)),
        ];
        assert_eq!(efficiency_scores(&records), vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn efficiency_score_is_none_without_cpc() {
        let records = vec![record("A", Some(1.0), None)];
        assert_eq!(efficiency_scores(&records), vec![None]);
    }

    #[test]
    fn ranking_twice_is_stable() {
        let records = vec![
            record("A", Some(4.0), Some(0.5)),
            record("B", Some(2.0), Some(0.7)),
            record("C", Some(2.0), Some(0.7)),
            record("D", Some(1.0), Some(0.9)),
        ];
        let once = rank_campaigns(records);
        let again = rank_campaigns(once.iter().map(|r| r.record.clone()).collect());
        let first: Vec<_> = once.iter().map(|r| r.record.campaign_name.clone()).collect();
        let second: Vec<_> = again.iter().map(|r| r.record.campaign_name.clone()).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["D", "B", "C", "A"]);
    }

    #[test]
    fn descending_steps_flags_non_monotonic_scores() {
        assert_eq!(descending_steps(&[Some(1.0), Some(1.5), Some(1.5), None, Some(0.5)]), 0);
        // cheap cost but expensive CPC scores worse than the next row
        let records = vec![
            record("A", Some(1.0), Some(0.9)),
            record("B", Some(2.0), Some(0.1)),
            record("C", Some(3.0), Some(0.2)),
        ];
        let scores = efficiency_scores(&records);
        assert_eq!(scores, vec![Some(2.0), Some(1.5), Some(2.5)]);
        assert_eq!(descending_steps(&scores), 1);
    }

    fn table(records: Vec<CampaignRecord>) -> CampaignTable {
        CampaignTable {
            headers: vec!["Campaign name".to_string()],
            records,
        }
    }

    #[test]
    fn analyze_rejects_out_of_range_percentile() {
        let mut config = Config::default();
        config.threshold.percentile = 150.0;
        let records = (0..12)
            .map(|i| record(&format!("C{}", i), Some(i as f64), Some(0.5)))
            .collect();
        let result = CampaignAnalyzer::new(&config).analyze(table(records), None);
        assert!(matches!(result, Err(ReportError::InvalidConfig(_))));
    }

    #[test]
    fn unbuildable_keyword_skips_enrichment_only() {
        let mut config = Config::default();
        config.threshold.policy = crate::models::ThresholdPolicy::Fixed;
        config.threshold.min_results = 1.0;
        config.threshold.min_amount_spent = 1.0;
        config.enrichment.keywords = vec!["x".repeat(5_000_000)];
        let creatives = vec![CreativeRecord {
            ad_name: "Other".to_string(),
            primary_text: String::new(),
            headline: String::new(),
        }];

        let outcome = CampaignAnalyzer::new(&config)
            .analyze(table(vec![record("A", Some(1.0), Some(0.5))]), Some(&creatives))
            .unwrap();
        match outcome {
            ReportOutcome::Ranked(report) => {
                assert!(!report.enriched);
                assert_eq!(report.ranked.len(), 1);
                assert!(report.ranked[0].creative.is_none());
            }
            ReportOutcome::NoneQualified { .. } => panic!("expected a ranked report"),
        }
    }
}
