//! Five-stage rewrite of generated report text.
//!
//! Stages run in a fixed order and never look back at earlier lines:
//! newline normalization, heading canonicalization, section-scoped bullet
//! enforcement, bullet glyph unification, results replacement. None of them
//! fails; lines they do not understand pass through unchanged.

use serde::Serialize;
use tracing::{debug, warn};

use super::headings::{BULLET_PREFIX, HeadingGrammar, Section};


#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultsOutcome {
    Replaced,
    Synthesized,
    Missing,
}

#[derive(Debug, Clone, Serialize)]
pub struct NormalizationReport {
    pub headings_canonicalized: usize,
    pub bullets_added: usize,
    pub glyphs_unified: usize,
    pub ambiguous_lines: usize,
    pub duplicate_results_dropped: usize,
    pub results: ResultsOutcome,
}

#[derive(Debug, Clone)]
pub struct NormalizedText {
    pub text: String,
    pub report: NormalizationReport,
}

pub struct NarrativeNormalizer {
    grammar: HeadingGrammar,
    synthesize_missing_results: bool,
}

impl NarrativeNormalizer {
    pub fn new(synthesize_missing_results: bool) -> anyhow::Result<Self> {
        Ok(Self {
            grammar: HeadingGrammar::new()?,
            synthesize_missing_results,
        })
    }

    pub fn grammar(&self) -> &HeadingGrammar {
        &self.grammar
    }

    /// Runs all five stages; `results_body` replaces the results section.
    pub fn normalize(&self, raw: &str, results_body: &[String]) -> NormalizedText {
        let text = normalize_newlines(raw);
        let (text, headings_canonicalized, ambiguous_lines) = self.canonicalize_headings(&text);
        let (text, bullets_added) = self.enforce_section_bullets(&text);
        let (text, glyphs_unified) = self.unify_bullet_glyphs(&text);
        let (text, results, duplicate_results_dropped) =
            self.replace_results_section(&text, results_body);

        let report = NormalizationReport {
            headings_canonicalized,
            bullets_added,
            glyphs_unified,
            ambiguous_lines,
            duplicate_results_dropped,
            results,
        };
        debug!(
            headings = report.headings_canonicalized,
            bullets_added = report.bullets_added,
            glyphs_unified = report.glyphs_unified,
            ambiguous = report.ambiguous_lines,
            results = ?report.results,
            "normalized generated text"
        );

        NormalizedText { text, report }
    }

    /// Stage 2: rewrite recognized headings to their canonical label.
    pub fn canonicalize_headings(&self, text: &str) -> (String, usize, usize) {
        let mut rewritten = 0usize;
        let mut ambiguous = 0usize;

        let lines = text
            .split('\n')
            .enumerate()
            .map(|(index, line)| {
                if let Some(section) = self.grammar.classify(line) {
                    let label = section.canonical_label();
                    if line != label {
                        rewritten += 1;
                        debug!(line = index + 1, section = section.as_str(), "canonicalized heading");
                    }
                    return label.to_string();
                }
                if self.grammar.looks_like_unknown_heading(line) {
                    ambiguous += 1;
                    debug!(line = index + 1, "unrecognized heading left unchanged");
                }
                line.to_string()
            })
            .collect::<Vec<String>>();

        (lines.join("\n"), rewritten, ambiguous)
    }

    /// Stage 3: bullet every content line under progress, issues and actions.
    pub fn enforce_section_bullets(&self, text: &str) -> (String, usize) {
        let mut section: Option<Section> = None;
        let mut added = 0usize;

        let lines = text
            .split('\n')
            .map(|line| {
                if let Some(next) = self.grammar.classify(line) {
                    section = Some(next);
                    return line.to_string();
                }
                if self.grammar.is_section_boundary(line) {
                    return line.to_string();
                }

                let content = line.trim();
                let wants_bullet = section.is_some_and(Section::wants_bullets);
                if wants_bullet && !content.is_empty() && !self.grammar.has_bullet(line) {
                    added += 1;
                    return format!("{BULLET_PREFIX}{content}");
                }
                line.to_string()
            })
            .collect::<Vec<String>>();

        (lines.join("\n"), added)
    }

    /// Stage 4: unify alternative bullet glyphs; headings lose any glyph.
    pub fn unify_bullet_glyphs(&self, text: &str) -> (String, usize) {
        let mut unified = 0usize;

        let lines = text
            .split('\n')
            .map(|line| {
                if self.grammar.is_heading(line) {
                    return self.grammar.strip_bullet(line).to_string();
                }
                match self.grammar.unify_bullet(line) {
                    Some(replaced) => {
                        if replaced != line {
                            unified += 1;
                        }
                        replaced
                    }
                    None => line.to_string(),
                }
            })
            .collect::<Vec<String>>();

        (lines.join("\n"), unified)
    }

    /// Stage 5: splice the authoritative body under the results heading.
    ///
    /// Everything between the first results heading and the next section
    /// boundary is discarded. Later results sections are dropped whole.
    pub fn replace_results_section(
        &self,
        text: &str,
        results_body: &[String],
    ) -> (String, ResultsOutcome, usize) {
        let lines = text.split('\n').collect::<Vec<&str>>();
        let mut out = Vec::<String>::with_capacity(lines.len() + results_body.len());
        let mut outcome = ResultsOutcome::Missing;
        let mut duplicates = 0usize;
        let mut index = 0usize;

        while index < lines.len() {
            let line = lines[index];
            if self.grammar.classify(line) != Some(Section::Results) {
                out.push(line.to_string());
                index += 1;
                continue;
            }

            if outcome == ResultsOutcome::Missing {
                out.push(Section::Results.canonical_label().to_string());
                out.extend(results_body.iter().cloned());
                outcome = ResultsOutcome::Replaced;
            } else {
                duplicates += 1;
            }

            index += 1;
            while index < lines.len() && !self.grammar.is_section_boundary(lines[index]) {
                index += 1;
            }
        }

        if duplicates > 0 {
            warn!(count = duplicates, "dropped duplicate results sections");
        }

        if outcome == ResultsOutcome::Missing && self.synthesize_missing_results {
            while out.last().is_some_and(|line| line.trim().is_empty()) {
                out.pop();
            }
            if !out.is_empty() {
                out.push(String::new());
            }
            out.push(Section::Results.canonical_label().to_string());
            out.extend(results_body.iter().cloned());
            outcome = ResultsOutcome::Synthesized;
            warn!("generated text had no results heading; appended the results block");
        } else if outcome == ResultsOutcome::Missing {
            warn!("generated text had no results heading; results block omitted");
        }

        (out.join("\n"), outcome, duplicates)
    }
}

/// Stage 1: CRLF, lone CR and escaped `\n` sequences become `\n`.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace("\\n", "\n")
}

/// Lines of the first results section, for checking the replacement.
pub fn results_section_lines<'a>(grammar: &HeadingGrammar, text: &'a str) -> Option<Vec<&'a str>> {
    let mut lines = text.split('\n');
    lines.find(|line| grammar.classify(line) == Some(Section::Results))?;
    Some(lines.take_while(|line| !grammar.is_section_boundary(line)).collect())
}
