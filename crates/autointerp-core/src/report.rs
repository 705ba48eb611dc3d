use std::fmt::Write;

use serde::Serialize;

use crate::scorer::{ClassifierRow, EmbeddingRow, RecallRow, ScoreBreakdown, ScoreRecord};

/// Format styles supported by [`render_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Render a score record for logs and operator tooling.
pub fn render_score(record: &ScoreRecord, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(record),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&JsonScore::from(record))?),
    }
}

fn render_human(record: &ScoreRecord) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "Score: {:.3}", record.value)?;
    writeln!(
        out,
        "Scorer: {} ({})",
        record.scorer_type, record.scorer_model
    )?;
    writeln!(out)?;

    if record.breakdown.row_count() == 0 {
        writeln!(out, "No rows recorded.")?;
        return Ok(out);
    }

    match &record.breakdown {
        ScoreBreakdown::Recall(breakdown) => {
            writeln!(
                out,
                "Correct: {}/{}",
                breakdown.correct(),
                breakdown.total()
            )?;
            for (label, rows, expected) in [
                ("Top", &breakdown.top, true),
                ("Zero", &breakdown.zero, false),
                ("Decoy", &breakdown.decoy, false),
            ] {
                write_recall_rows(&mut out, label, rows, expected)?;
            }
        }
        ScoreBreakdown::Classifier(rows) => {
            writeln!(out, "Rows:")?;
            for row in rows {
                write_classifier_row(&mut out, row)?;
            }
        }
        ScoreBreakdown::Embedding(rows) => {
            writeln!(out, "Rows:")?;
            for row in rows {
                write_embedding_row(&mut out, row)?;
            }
        }
    }
    Ok(out)
}

fn write_recall_rows(
    out: &mut String,
    label: &str,
    rows: &[RecallRow],
    expected: bool,
) -> anyhow::Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    writeln!(out, "{label}:")?;
    for row in rows {
        let mark = if row.matched == expected { "ok" } else { "miss" };
        writeln!(
            out,
            "  - [{mark:>4}] match={matched} \"{text}\"",
            matched = row.matched,
            text = single_line(&row.tokens.concat()),
        )?;
        if !row.reason.trim().is_empty() {
            writeln!(out, "      {}", single_line(&row.reason))?;
        }
    }
    Ok(())
}

fn write_classifier_row(out: &mut String, row: &ClassifierRow) -> anyhow::Result<()> {
    writeln!(
        out,
        "  - {distance:>5} truth={truth} predicted={predicted} \"{text}\"",
        distance = distance_label(row.distance),
        truth = row.ground_truth,
        predicted = row.prediction,
        text = single_line(&row.text),
    )?;
    Ok(())
}

fn write_embedding_row(out: &mut String, row: &EmbeddingRow) -> anyhow::Result<()> {
    writeln!(
        out,
        "  - {distance:>5} similarity={similarity:.3} \"{text}\"",
        distance = distance_label(row.distance),
        similarity = row.similarity,
        text = single_line(&row.text),
    )?;
    Ok(())
}

fn distance_label(distance: f64) -> String {
    if crate::scorer::quantile::is_excluded(distance) {
        "n/a".to_string()
    } else {
        format!("{distance:.0}")
    }
}

fn single_line(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonScore<'a> {
    value: f64,
    scorer_type: &'static str,
    scorer_model: &'a str,
    row_count: usize,
    breakdown: &'a ScoreBreakdown,
}

impl<'a> From<&'a ScoreRecord> for JsonScore<'a> {
    fn from(record: &'a ScoreRecord) -> Self {
        Self {
            value: record.value,
            scorer_type: record.scorer_type.as_str(),
            scorer_model: &record.scorer_model,
            row_count: record.breakdown.row_count(),
            breakdown: &record.breakdown,
        }
    }
}
