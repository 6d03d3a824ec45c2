use std::fs;
use std::io::Write;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::NormalizeArgs;
use crate::pipeline::headings::Section;
use crate::pipeline::normalize::{NarrativeNormalizer, ResultsOutcome};

pub fn run(args: NormalizeArgs) -> Result<()> {
    let generated = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let results = fs::read_to_string(&args.results)
        .with_context(|| format!("failed to read {}", args.results.display()))?;
    let results_body = results_body_lines(&results);

    let normalizer = NarrativeNormalizer::new(!args.no_synthesize_results)?;
    let normalized = normalizer.normalize(&generated, &results_body);

    info!(
        headings = normalized.report.headings_canonicalized,
        bullets_added = normalized.report.bullets_added,
        glyphs_unified = normalized.report.glyphs_unified,
        ambiguous = normalized.report.ambiguous_lines,
        "normalized text"
    );
    if normalized.report.results == ResultsOutcome::Missing {
        warn!("results section absent from output");
    }

    match &args.output {
        Some(path) => fs::write(path, format!("{}\n", normalized.text))
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", normalized.text).context("failed to write stdout")?;
        }
    }
    Ok(())
}

/// Non-blank lines of a results file; a leading results heading is dropped.
fn results_body_lines(raw: &str) -> Vec<String> {
    let normalized = raw.replace("\r\n", "\n");
    let mut lines = normalized
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(ToString::to_string)
        .collect::<Vec<String>>();
    if lines
        .first()
        .is_some_and(|line| line.trim() == Section::Results.canonical_label())
    {
        lines.remove(0);
    }
    lines
}
