//! Subcommands and the plumbing they share

pub mod explain;
pub mod feed;
pub mod ids;
pub mod updates;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use pubflow_core::{Seq, field_str};
use pubflow_pubmed::{Db, EutilsSource, SidecarClassifier, Summary};
use pubflow_store::FileStore;
use serde_json::Value;

use crate::config::Config;

/// Print a key-value summary table on stderr
pub(crate) fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

pub(crate) fn print_run_summary(title: &str, input_label: &str, summary: &Summary) {
    let rate = if summary.tested == 0 {
        0.0
    } else {
        summary.hits as f64 * 100.0 / summary.tested as f64
    };
    print_summary(
        title,
        &[
            (input_label, summary.inputs.to_string()),
            ("Failed batches", summary.failed_batches.to_string()),
            ("Tested", summary.tested.to_string()),
            ("Hits", format!("{} ({rate:.2}%)", summary.hits)),
            ("Stored", summary.stored.to_string()),
            ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
        ],
    );
}

pub(crate) fn open_store(config: &Config) -> Result<FileStore> {
    FileStore::open(&config.store.dir)
        .with_context(|| format!("Failed to open store at {}", config.store.dir.display()))
}

pub(crate) fn spawn_classifier(config: &Config) -> Result<SidecarClassifier> {
    let command = config
        .classifier
        .command
        .as_deref()
        .context("No classifier configured (set [classifier] command)")?;
    let classifier =
        SidecarClassifier::spawn(command, &config.classifier.args, config.classifier.threshold)?;
    Ok(classifier)
}

pub(crate) fn eutils(config: &Config, db: Db) -> EutilsSource {
    EutilsSource::new(db)
        .with_url(config.ncbi.efetch_url.clone())
        .with_api_key(config.ncbi.api_key.clone())
        .with_batch_size(config.ncbi.efetch_batch_size)
}

/// Id from one input line.
///
/// Accepts a bare id, a JSON string or number, or a JSON object carrying
/// `pmid` (or `id`). Blank lines yield `None`.
pub(crate) fn parse_id_line(line: &str) -> Result<Option<String>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with(['{', '"']) {
        return Ok(Some(line.to_string()));
    }
    let value: Value =
        serde_json::from_str(line).with_context(|| format!("Invalid id line: {line}"))?;
    let id = match &value {
        Value::Object(obj) => field_str(obj.get("pmid")).or_else(|| field_str(obj.get("id"))),
        other => field_str(Some(other)),
    };
    id.filter(|id| !id.is_empty())
        .map(Some)
        .with_context(|| format!("No pmid in line: {line}"))
}

/// Lazily read ids from `input`, or stdin when absent.
pub(crate) fn read_ids(input: Option<&Path>) -> Result<Seq<'static, Result<String>>> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(std::io::stdin())),
    };
    let ids = reader.lines().filter_map(|line| {
        let line = match line {
            Ok(line) => line,
            Err(e) => return Some(Err(anyhow::Error::new(e).context("Failed to read ids"))),
        };
        parse_id_line(&line).transpose()
    });
    Ok(Box::new(ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn id_line_forms() {
        assert_eq!(parse_id_line("123").unwrap(), Some("123".into()));
        assert_eq!(parse_id_line("  ").unwrap(), None);
        assert_eq!(parse_id_line("\"456\"").unwrap(), Some("456".into()));
        assert_eq!(
            parse_id_line(r#"{"pmid": 789, "title": "x"}"#).unwrap(),
            Some("789".into())
        );
        assert_eq!(parse_id_line(r#"{"id": "10"}"#).unwrap(), Some("10".into()));
    }

    #[test]
    fn id_line_without_pmid_fails() {
        assert!(parse_id_line(r#"{"title": "x"}"#).is_err());
        assert!(parse_id_line("{not json").is_err());
    }

    #[test]
    fn read_ids_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1\n\n{{\"pmid\": \"2\"}}\n3").unwrap();
        let ids: Vec<String> = read_ids(Some(file.path()))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
