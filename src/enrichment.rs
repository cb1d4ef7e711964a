use crate::error::ReportError;
use crate::models::{CampaignRecord, CreativeRecord, EnrichmentConfig, EnrichmentPolicy};
use regex::Regex;
use tracing::debug;

/// How a creative was tied to a campaign
#[derive(Debug, Clone, PartialEq)]
pub enum MatchMethod {
    Exact,
    Positional,
    Keyword { score: usize, fraction: f64 },
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchMethod::Exact => write!(f, "exact ad name"),
            MatchMethod::Positional => write!(f, "positional mapping"),
            MatchMethod::Keyword { score, fraction } => {
                write!(f, "keyword overlap ({} keywords, {:.0}%)", score, fraction * 100.0)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreativeMatch {
    pub creative: CreativeRecord,
    pub method: MatchMethod,
}

/// Finds the creative for a campaign, walking exact -> positional -> keyword
/// as far as the configured policy allows.
pub struct CreativeMatcher<'a> {
    config: &'a EnrichmentConfig,
    creatives: &'a [CreativeRecord],
    keyword_patterns: Vec<Regex>,
}

impl<'a> CreativeMatcher<'a> {
    pub fn new(
        config: &'a EnrichmentConfig,
        creatives: &'a [CreativeRecord],
    ) -> Result<Self, ReportError> {
        let keyword_patterns = config
            .keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(k.trim()))))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            creatives,
            keyword_patterns,
        })
    }

    pub fn find(&self, campaign: &CampaignRecord) -> Option<CreativeMatch> {
        if let Some(found) = self.exact(campaign) {
            return Some(found);
        }
        if self.config.policy == EnrichmentPolicy::Exact {
            return None;
        }

        if let Some(found) = self.positional(campaign) {
            return Some(found);
        }
        if self.config.policy == EnrichmentPolicy::Positional {
            return None;
        }

        self.keyword(campaign)
    }

    fn exact(&self, campaign: &CampaignRecord) -> Option<CreativeMatch> {
        let ad_name = campaign.ad_name.trim();
        if ad_name.is_empty() {
            return None;
        }
        self.creatives
            .iter()
            .find(|c| c.ad_name.trim() == ad_name)
            .map(|c| CreativeMatch {
                creative: c.clone(),
                method: MatchMethod::Exact,
            })
    }

    fn positional(&self, campaign: &CampaignRecord) -> Option<CreativeMatch> {
        let index = *self.config.positional.get(campaign.ad_name.trim())?;
        match self.creatives.get(index) {
            Some(c) => Some(CreativeMatch {
                creative: c.clone(),
                method: MatchMethod::Positional,
            }),
            None => {
                debug!(
                    "Positional mapping for '{}' points at row {} but only {} creatives exist",
                    campaign.ad_name,
                    index,
                    self.creatives.len()
                );
                None
            }
        }
    }

    /// Best creative by shared keywords; the first creative wins a tie
    fn keyword(&self, campaign: &CampaignRecord) -> Option<CreativeMatch> {
        if self.keyword_patterns.is_empty() {
            return None;
        }

        let in_campaign: Vec<&Regex> = self
            .keyword_patterns
            .iter()
            .filter(|p| p.is_match(&campaign.campaign_name))
            .collect();
        if in_campaign.is_empty() {
            return None;
        }

        let mut best: Option<(usize, &CreativeRecord)> = None;
        for creative in self.creatives {
            let text = format!(
                "{} {} {}",
                creative.ad_name, creative.primary_text, creative.headline
            );
            let score = in_campaign.iter().filter(|p| p.is_match(&text)).count();
            if score > 0 && best.map_or(true, |(top, _)| score > top) {
                best = Some((score, creative));
            }
        }

        let (score, creative) = best?;
        let fraction = score as f64 / self.keyword_patterns.len() as f64;
        if fraction > self.config.min_match_fraction {
            Some(CreativeMatch {
                creative: creative.clone(),
                method: MatchMethod::Keyword { score, fraction },
            })
        } else {
            debug!(
                "Best keyword match for '{}' covers {:.0}% of keywords, below {:.0}%",
                campaign.campaign_name,
                fraction * 100.0,
                self.config.min_match_fraction * 100.0
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creative(ad_name: &str, text: &str, headline: &str) -> CreativeRecord {
        CreativeRecord {
            ad_name: ad_name.to_string(),
            primary_text: text.to_string(),
            headline: headline.to_string(),
        }
    }

    fn campaign(campaign_name: &str, ad_name: &str) -> CampaignRecord {
        CampaignRecord {
            row: 1,
            campaign_name: campaign_name.to_string(),
            ad_set_name: String::new(),
            ad_name: ad_name.to_string(),
            results: Some(10.0),
            amount_spent: Some(100.0),
            cost_per_result: Some(10.0),
            cpc: Some(1.0),
            ctr: None,
            fields: Vec::new(),
        }
    }

    fn config(policy: EnrichmentPolicy) -> EnrichmentConfig {
        EnrichmentConfig {
            policy,
            keywords: ["summer", "sale", "free", "shipping"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            min_match_fraction: 0.3,
            ..EnrichmentConfig::default()
        }
    }

    #[test]
    fn exact_name_wins_first() {
        let creatives = vec![
            creative("Other", "Summer sale", "Free shipping"),
            creative("Ad 7", "Plain copy", "Plain"),
        ];
        let cfg = config(EnrichmentPolicy::KeywordScore);
        let matcher = CreativeMatcher::new(&cfg, &creatives).unwrap();
        let found = matcher.find(&campaign("Summer Sale Free Shipping", "Ad 7")).unwrap();
        assert_eq!(found.method, MatchMethod::Exact);
        assert_eq!(found.creative.ad_name, "Ad 7");
    }

    #[test]
    fn positional_mapping_used_when_names_differ() {
        let creatives = vec![creative("A", "", ""), creative("B", "", "")];
        let mut cfg = config(EnrichmentPolicy::Positional);
        cfg.positional.insert("Video v2".to_string(), 1);
        let matcher = CreativeMatcher::new(&cfg, &creatives).unwrap();
        let found = matcher.find(&campaign("Anything", "Video v2")).unwrap();
        assert_eq!(found.method, MatchMethod::Positional);
        assert_eq!(found.creative.ad_name, "B");
    }

    #[test]
    fn positional_out_of_range_is_a_miss() {
        let creatives = vec![creative("A", "", "")];
        let mut cfg = config(EnrichmentPolicy::Positional);
        cfg.positional.insert("Video v2".to_string(), 9);
        let matcher = CreativeMatcher::new(&cfg, &creatives).unwrap();
        assert!(matcher.find(&campaign("Anything", "Video v2")).is_none());
    }

    #[test]
    fn keyword_overlap_picks_highest_score() {
        let creatives = vec![
            creative("X", "Our summer collection", "New in"),
            creative("Y", "Summer SALE now on", "Free shipping today"),
        ];
        let cfg = config(EnrichmentPolicy::KeywordScore);
        let matcher = CreativeMatcher::new(&cfg, &creatives).unwrap();
        let found = matcher.find(&campaign("Summer Sale - Free Shipping", "unmapped")).unwrap();
        assert_eq!(found.creative.ad_name, "Y");
        assert_eq!(found.method, MatchMethod::Keyword { score: 4, fraction: 1.0 });
    }

    #[test]
    fn keyword_score_below_fraction_is_a_miss() {
        // one of four keywords = 25%, not above 30%
        let creatives = vec![creative("X", "Summer collection", "")];
        let cfg = config(EnrichmentPolicy::KeywordScore);
        let matcher = CreativeMatcher::new(&cfg, &creatives).unwrap();
        assert!(matcher.find(&campaign("Summer launch", "unmapped")).is_none());
    }

    #[test]
    fn exact_policy_never_falls_through() {
        let creatives = vec![creative("Y", "Summer sale", "Free shipping")];
        let cfg = config(EnrichmentPolicy::Exact);
        let matcher = CreativeMatcher::new(&cfg, &creatives).unwrap();
        assert!(matcher.find(&campaign("Summer Sale Free Shipping", "unmapped")).is_none());
    }

    #[test]
    fn keywords_match_whole_words_only() {
        // "sales" and "freebie" do not contain the whole words "sale" / "free"
        let creatives = vec![creative("X", "sales freebie summery", "shippings")];
        let cfg = config(EnrichmentPolicy::KeywordScore);
        let matcher = CreativeMatcher::new(&cfg, &creatives).unwrap();
        assert!(matcher.find(&campaign("Summer Sale Free Shipping", "unmapped")).is_none());
    }
}
