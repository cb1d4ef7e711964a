use crate::error::ReportError;
use crate::models::{columns, CampaignRecord, CostPerResultPolicy, CreativeRecord, NumericPolicy};
use csv::{ReaderBuilder, StringRecord, Trim};
use regex::Regex;
use std::path::Path;
use tracing::{debug, info, warn};

/// Parsed primary table: source headers plus one record per data row
#[derive(Debug, Clone)]
pub struct CampaignTable {
    pub headers: Vec<String>,
    pub records: Vec<CampaignRecord>,
}

/// Reads campaign and creative exports into typed records
pub struct CampaignLoader {
    numeric_policy: NumericPolicy,
    cost_policy: CostPerResultPolicy,
    amount_regex: Regex,
}

/// Column positions of the fields the pipeline reads
struct ColumnIndex {
    campaign_name: usize,
    ad_set_name: usize,
    ad_name: usize,
    results: usize,
    cost_per_result: usize,
    cpc: usize,
    amount_spent: usize,
    ctr: Option<usize>,
}

impl CampaignLoader {
    pub fn new(
        numeric_policy: NumericPolicy,
        cost_policy: CostPerResultPolicy,
    ) -> Result<Self, ReportError> {
        // optional currency sign, thousands separators, optional trailing percent
        let amount_regex = Regex::new(r"^[£$€]?\s*(-?(?:\d[\d,]*)?(?:\.\d+)?)\s*%?$")?;
        Ok(Self {
            numeric_policy,
            cost_policy,
            amount_regex,
        })
    }

    pub fn load_campaigns(&self, file_path: &str) -> Result<CampaignTable, ReportError> {
        let mut reader = open_reader(file_path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ReportError::EmptyInput {
                path: file_path.to_string(),
            });
        }

        let index = ColumnIndex::resolve(&headers)?;
        if index.ctr.is_none() {
            debug!("No '{}' column in {}", columns::CTR, file_path);
        }

        let mut records = Vec::new();
        for (i, row) in reader.records().enumerate() {
            let row = row?;
            let row_number = i + 1;
            let mut record = self.parse_campaign_row(&row, &index, row_number)?;
            record.apply_cost_policy(self.cost_policy);
            records.push(record);
        }

        if records.is_empty() {
            return Err(ReportError::EmptyInput {
                path: file_path.to_string(),
            });
        }

        info!("Loaded {} campaign rows from {}", records.len(), file_path);
        Ok(CampaignTable { headers, records })
    }

    /// Reads the creative export. Callers treat any error here as "skip enrichment".
    pub fn load_creatives(&self, file_path: &str) -> Result<Vec<CreativeRecord>, ReportError> {
        let mut reader = open_reader(file_path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let missing = missing_columns(&headers, &columns::CREATIVE_REQUIRED);
        if !missing.is_empty() {
            return Err(ReportError::MissingColumns { columns: missing });
        }

        let position = |name: &str| headers.iter().position(|h| h == name).unwrap_or(0);
        let ad_name = position(columns::CREATIVE_AD_NAME);
        let primary_text = position(columns::PRIMARY_TEXT);
        let headline = position(columns::HEADLINE);

        let mut creatives = Vec::new();
        for row in reader.records() {
            let row = row?;
            creatives.push(CreativeRecord {
                ad_name: cell(&row, ad_name).to_string(),
                primary_text: cell(&row, primary_text).to_string(),
                headline: cell(&row, headline).to_string(),
            });
        }

        if creatives.is_empty() {
            return Err(ReportError::EmptyInput {
                path: file_path.to_string(),
            });
        }

        info!("Loaded {} creative rows from {}", creatives.len(), file_path);
        Ok(creatives)
    }

    fn parse_campaign_row(
        &self,
        row: &StringRecord,
        index: &ColumnIndex,
        row_number: usize,
    ) -> Result<CampaignRecord, ReportError> {
        let number = |column: &str, idx: usize| self.parse_numeric(column, cell(row, idx), row_number);

        Ok(CampaignRecord {
            row: row_number,
            campaign_name: cell(row, index.campaign_name).to_string(),
            ad_set_name: cell(row, index.ad_set_name).to_string(),
            ad_name: cell(row, index.ad_name).to_string(),
            results: number(columns::RESULTS, index.results)?,
            amount_spent: number(columns::AMOUNT_SPENT, index.amount_spent)?,
            cost_per_result: number(columns::COST_PER_RESULT, index.cost_per_result)?,
            cpc: number(columns::CPC, index.cpc)?,
            ctr: match index.ctr {
                Some(idx) => number(columns::CTR, idx)?,
                None => None,
            },
            fields: row.iter().map(str::to_string).collect(),
        })
    }

    /// Empty cells are null. Unparseable cells are null (permissive) or an error (strict).
    /// A trailing `%` turns the value into a fraction.
    fn parse_numeric(
        &self,
        column: &str,
        raw: &str,
        row_number: usize,
    ) -> Result<Option<f64>, ReportError> {
        if raw.is_empty() {
            return Ok(None);
        }

        let value = self
            .amount_regex
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().replace(',', ""))
            .and_then(|cleaned| cleaned.parse::<f64>().ok())
            .or_else(|| raw.parse::<f64>().ok())
            .map(|v| if raw.ends_with('%') { v / 100.0 } else { v });

        match value {
            Some(v) if v.is_nan() => Ok(None),
            Some(v) if v.is_finite() => {
                if v < 0.0 {
                    warn!(
                        "Negative value {} in column '{}' at row {}; keeping it",
                        v, column, row_number
                    );
                }
                Ok(Some(v))
            }
            _ => match self.numeric_policy {
                NumericPolicy::Strict => Err(ReportError::NonNumericValue {
                    column: column.to_string(),
                    row: row_number,
                    value: raw.to_string(),
                }),
                NumericPolicy::Permissive => {
                    warn!(
                        "Non-numeric value {:?} in column '{}' at row {}; treating as missing",
                        raw, column, row_number
                    );
                    Ok(None)
                }
            },
        }
    }
}

impl ColumnIndex {
    fn resolve(headers: &[String]) -> Result<Self, ReportError> {
        let missing = missing_columns(headers, &columns::REQUIRED);
        if !missing.is_empty() {
            return Err(ReportError::MissingColumns { columns: missing });
        }

        let position = |name: &str| headers.iter().position(|h| h == name);
        let required = |name: &str| position(name).unwrap_or(0);

        Ok(Self {
            campaign_name: required(columns::CAMPAIGN_NAME),
            ad_set_name: required(columns::AD_SET_NAME),
            ad_name: required(columns::AD_NAME),
            results: required(columns::RESULTS),
            cost_per_result: required(columns::COST_PER_RESULT),
            cpc: required(columns::CPC),
            amount_spent: required(columns::AMOUNT_SPENT),
            ctr: position(columns::CTR),
        })
    }
}

fn open_reader(file_path: &str) -> Result<csv::Reader<std::fs::File>, ReportError> {
    if !Path::new(file_path).exists() {
        return Err(ReportError::InputNotFound {
            path: file_path.to_string(),
        });
    }

    let reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_path(file_path)?;
    Ok(reader)
}

/// Every required column absent from `headers`, in required order
fn missing_columns(headers: &[String], required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !headers.iter().any(|h| h == *name))
        .map(|name| name.to_string())
        .collect()
}

fn cell(row: &StringRecord, idx: usize) -> &str {
    row.get(idx).unwrap_or("")
}
