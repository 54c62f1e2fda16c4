use std::collections::BTreeMap;
use std::fmt::Write;

use crate::competitors::Competitor;
use crate::record::CompanyRecord;

/// Format styles supported when rendering a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Produce a report string for a batch of records keyed by canonical name.
pub fn render_batch(
    batch: &BTreeMap<String, CompanyRecord>,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(batch),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(batch)?),
    }
}

fn render_human(batch: &BTreeMap<String, CompanyRecord>) -> anyhow::Result<String> {
    let mut out = String::new();
    if batch.is_empty() {
        writeln!(out, "No companies analyzed.")?;
        return Ok(out);
    }

    for (index, record) in batch.values().enumerate() {
        if index > 0 {
            writeln!(out)?;
        }
        writeln!(out, "{} ({})", record.full_name, record.canonical_name)?;
        for (issue, result) in &record.metrics {
            writeln!(
                out,
                "  {id:<8} score {score:>7.3}  confidence {confidence:>9.3}  {description}",
                id = issue.code(),
                score = result.score,
                confidence = result.confidence,
                description = issue.description(),
            )?;
        }
        if !record.competitors.is_empty() {
            let names: Vec<&str> = record.competitors.iter().map(competitor_label).collect();
            writeln!(out, "  Competitors: {}", names.join(", "))?;
        }
        writeln!(out, "  Sources: {}", record.sources.len())?;
    }

    Ok(out)
}

fn competitor_label(competitor: &Competitor) -> &str {
    match competitor {
        Competitor::Name(name) => name,
        Competitor::Product(product) => &product.product_name,
    }
}
