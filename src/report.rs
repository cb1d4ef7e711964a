use crate::analyzer::{CampaignReport, RankedCampaign};
use crate::error::ReportError;
use crate::models::columns;
use crate::threshold::ThresholdDecision;
use csv::Writer;
use std::path::Path;
use tracing::info;

/// Summary block, ranked table and (when enriched) creative details
pub fn render_report(report: &CampaignReport) -> String {
    let mut content = String::new();
    content.push_str(&render_summary(
        report.total_records,
        report.ranked.len(),
        &report.threshold,
    ));

    let ranked: Vec<&RankedCampaign> = report.ranked.iter().collect();
    let avg_cpr = average(ranked.iter().filter_map(|r| r.record.cost_per_result));
    let avg_cpc = average(ranked.iter().filter_map(|r| r.record.cpc));
    content.push_str(&format!("Average cost per result: {}\n", money(avg_cpr)));
    content.push_str(&format!("Average CPC: {}\n\n", money(avg_cpc)));

    content.push_str("Top performing campaigns (sorted by cost per result and CPC):\n");
    content.push_str(&render_table(&report.ranked));

    if report.enriched {
        content.push_str(&render_creatives(report));
    }
    content
}

/// Shown instead of the table when no campaign passed the threshold
pub fn render_no_results(total_records: usize, threshold: &ThresholdDecision) -> String {
    let mut content = render_summary(total_records, 0, threshold);
    content.push_str("\nNo campaigns met the minimum threshold criteria.\n");
    content
}

fn render_summary(total: usize, passed: usize, threshold: &ThresholdDecision) -> String {
    let mut content = String::new();
    content.push_str("Processed Campaign Data:\n");
    content.push_str("------------------------\n");
    content.push_str(&format!("Total campaigns analyzed: {}\n", total));
    content.push_str(&format!("Campaigns meeting minimum thresholds: {}\n", passed));
    content.push_str(&format!("Threshold policy: {}\n", threshold.source));
    content.push_str(&format!(
        "Minimum results threshold: {}\n",
        cutoff(threshold.threshold.min_results, "")
    ));
    content.push_str(&format!(
        "Minimum amount spent threshold: {}\n",
        cutoff(threshold.threshold.min_amount_spent, "£")
    ));
    content
}

fn render_table(ranked: &[RankedCampaign]) -> String {
    let headers = [
        "#",
        columns::CAMPAIGN_NAME,
        columns::AD_SET_NAME,
        columns::AD_NAME,
        columns::RESULTS,
        columns::COST_PER_RESULT,
        columns::CPC,
        columns::AMOUNT_SPENT,
        columns::EFFICIENCY_SCORE,
    ];

    let rows: Vec<Vec<String>> = ranked
        .iter()
        .enumerate()
        .map(|(i, r)| {
            vec![
                (i + 1).to_string(),
                r.record.campaign_name.clone(),
                r.record.ad_set_name.clone(),
                r.record.ad_name.clone(),
                number(r.record.results, 0),
                number(r.record.cost_per_result, 2),
                number(r.record.cpc, 2),
                number(r.record.amount_spent, 2),
                number(r.efficiency_score, 1),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let mut content = line(headers.to_vec());
    for row in &rows {
        content.push_str(&line(row.iter().map(String::as_str).collect()));
    }
    content
}

fn render_creatives(report: &CampaignReport) -> String {
    let mut content = String::new();
    content.push_str(&format!("\nCreative details for top {} campaigns:\n", report.top_k));
    content.push_str("======================================\n\n");

    for (i, campaign) in report.ranked.iter().take(report.top_k).enumerate() {
        content.push_str(&format!(
            "{}. {} / {}\n",
            i + 1,
            campaign.record.campaign_name,
            campaign.record.ad_name
        ));
        match &campaign.creative {
            Some(found) => {
                content.push_str(&format!("Matched by: {}\n", found.method));
                content.push_str(&format!("Headline: {}\n", found.creative.headline));
                content.push_str(&format!("Primary text: {}\n\n", found.creative.primary_text));
            }
            None => content.push_str("No matching creative found\n\n"),
        }
    }
    content
}

/// Filtered and sorted rows with every source column, plus derived columns
pub fn write_output_csv(report: &CampaignReport, output_path: &str) -> Result<(), ReportError> {
    let mut writer = Writer::from_path(Path::new(output_path))?;

    let mut header_row: Vec<&str> = report.headers.iter().map(String::as_str).collect();
    header_row.push(columns::EFFICIENCY_SCORE);
    if report.enriched {
        header_row.push(columns::PRIMARY_TEXT);
        header_row.push(columns::HEADLINE);
    }
    writer.write_record(&header_row)?;

    for campaign in &report.ranked {
        let mut row: Vec<String> = campaign.record.fields.clone();
        row.resize(report.headers.len(), String::new());
        row.push(campaign.efficiency_score.map(|s| s.to_string()).unwrap_or_default());
        if report.enriched {
            let (text, headline) = campaign
                .creative
                .as_ref()
                .map(|c| (c.creative.primary_text.clone(), c.creative.headline.clone()))
                .unwrap_or_default();
            row.push(text);
            row.push(headline);
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    info!("Wrote {} rows to {}", report.ranked.len(), output_path);
    Ok(())
}

/// Header-only output for a run where nothing passed the threshold
pub fn write_empty_output(headers: &[String], output_path: &str) -> Result<(), ReportError> {
    let mut writer = Writer::from_path(Path::new(output_path))?;

    let mut header_row: Vec<&str> = headers.iter().map(String::as_str).collect();
    header_row.push(columns::EFFICIENCY_SCORE);
    writer.write_record(&header_row)?;

    writer.flush()?;
    info!("Wrote header-only {} (no campaigns qualified)", output_path);
    Ok(())
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

fn number(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => "-".to_string(),
    }
}

fn money(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("£{:.2}", v),
        None => "-".to_string(),
    }
}

fn cutoff(value: f64, prefix: &str) -> String {
    if value.is_finite() {
        format!("{}{:.2}", prefix, value)
    } else {
        "none".to_string()
    }
}
