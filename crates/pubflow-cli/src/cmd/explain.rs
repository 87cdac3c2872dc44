//! Explain subcommand - per-sentence scores for a list of PubMed ids
//!
//! Writes one JSON object per citation to stdout; nothing is stored.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use pubflow_core::{SeqExt, field_str};
use pubflow_pubmed::{Db, Explanation, explain_ids};
use serde_json::json;

use super::{eutils, read_ids, spawn_classifier};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ExplainArgs {
    /// Id file, one id or JSON object per line (default: stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Maximum number of ids to explain
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Include every scored sentence, not just the best one
    #[arg(long)]
    pub all_sentences: bool,
}

fn to_json(explanation: &Explanation, all_sentences: bool) -> serde_json::Value {
    let best = explanation.best_sentence();
    let mut out = json!({
        "pmid": field_str(explanation.document.get("pmid")),
        "title": explanation.document.get("title"),
        "classification": explanation.classification,
        "probability": explanation.probability,
        "best_sentence": best.map(|s| &s.text),
        "best_score": best.map(|s| s.score),
    });
    if all_sentences {
        out["sentences"] = json!(explanation.sentences);
    }
    out
}

pub fn run(args: ExplainArgs, config: &Config) -> Result<()> {
    let mut pipeline = config.pipeline();
    pipeline.max_ids = args.limit;
    pipeline.validate()?;

    let ids = read_ids(args.input.as_deref())?;
    let classifier = spawn_classifier(config)?;
    let pubmed = eutils(config, Db::Pubmed);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut count = 0usize;
    for explanation in explain_ids(&pipeline, ids, &pubmed, classifier)?.until_shutdown() {
        let explanation = explanation?;
        serde_json::to_writer(&mut out, &to_json(&explanation, args.all_sentences))?;
        writeln!(out).context("Failed to write to stdout")?;
        count += 1;
    }
    out.flush()?;
    log::info!("Explained {count} citations");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubflow_pubmed::Sentence;

    #[test]
    fn explanation_json_carries_best_sentence() {
        let document = json!({"pmid": "12", "title": "T"}).as_object().unwrap().clone();
        let explanation = Explanation {
            document,
            classification: 1,
            probability: 0.97,
            sentences: vec![
                Sentence { text: "low".into(), score: 0.1 },
                Sentence { text: "high".into(), score: 0.9 },
            ],
        };
        let out = to_json(&explanation, false);
        assert_eq!(out["pmid"], json!("12"));
        assert_eq!(out["best_sentence"], json!("high"));
        assert!(out.get("sentences").is_none());

        let out = to_json(&explanation, true);
        assert_eq!(out["sentences"].as_array().unwrap().len(), 2);
    }
}
