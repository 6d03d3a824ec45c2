use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;

/// Canonical bullet prefix: half-width space, middle dot, half-width space.
pub const BULLET_PREFIX: &str = " • ";

const SHORTCODE_ALIASES: [(&str, &str); 4] = [
    (":チェックマーク_緑:", ":white_check_mark:"),
    (":警告:", ":warning:"),
    (":ダッシュ:", ":dash:"),
    (":上昇折れ線グラフ:", ":chart_with_upwards_trend:"),
];

/// The four section identities of a report.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Progress,
    Issues,
    Actions,
    Results,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Progress,
        Section::Issues,
        Section::Actions,
        Section::Results,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Issues => "issues",
            Self::Actions => "actions",
            Self::Results => "results",
        }
    }

    pub fn canonical_label(self) -> &'static str {
        match self {
            Self::Progress => ":white_check_mark: 進捗 :",
            Self::Issues => ":warning: 課題 :",
            Self::Actions => ":dash: ネクストアクション",
            Self::Results => ":chart_with_upwards_trend: 結果",
        }
    }

    /// Sections whose content lines are always bulleted.
    pub fn wants_bullets(self) -> bool {
        !matches!(self, Self::Results)
    }
}

/// Recognizes section headings and bullet glyphs in generated text.
pub struct HeadingGrammar {
    heading: Regex,
    heading_marker: Regex,
    marked_results: Regex,
    leading_bullet: Regex,
    markdown_heading: Regex,
}

impl HeadingGrammar {
    pub fn new() -> Result<Self> {
        let heading = Regex::new(
            r"(?ix)
            ^
            (?: :(?:white_check_mark|warning|dash|chart_with_upwards_trend):
              | ✅ | ⚠\x{FE0F}? | 💨 | 📈 )?
            \s*
            (?:
                (?P<progress>進捗|progress)
              | (?P<issues>課題|issues?)
              | (?P<actions>ネクストアクション|次のアクション|next\s*actions?)
              | (?P<results>結果|実績|results?)
            )
            \s*[:：]?\s*
            $",
        )
        .context("failed to compile heading regex")?;
        let heading_marker = Regex::new(
            r"^(?::(?:white_check_mark|warning|dash|chart_with_upwards_trend):|✅|⚠|💨|📈)",
        )
        .context("failed to compile heading marker regex")?;
        // A results marker followed by the section word, with any trailing text.
        let marked_results = Regex::new(r"^(?::chart_with_upwards_trend:|📈)\s*(?:結果|実績)")
            .context("failed to compile results heading regex")?;
        // `-` and `*` need a following space so `-5%` and `**bold**` survive.
        let leading_bullet = Regex::new(
            r"^\s*(?:[-*][\x{FE0E}\x{FE0F}]?\s+|[•・●▪▶►※][\x{FE0E}\x{FE0F}]?\s*)",
        )
        .context("failed to compile bullet regex")?;
        let markdown_heading =
            Regex::new(r"^#{1,6}\s*").context("failed to compile markdown heading regex")?;

        Ok(Self {
            heading,
            heading_marker,
            marked_results,
            leading_bullet,
            markdown_heading,
        })
    }

    /// Section identity of a heading line, tolerating bullets, markdown
    /// markers, bold wrapping and localized shortcode aliases.
    pub fn classify(&self, line: &str) -> Option<Section> {
        let candidate = self.heading_candidate(line);
        let Some(captures) = self.heading.captures(&candidate) else {
            return self
                .marked_results
                .is_match(&candidate)
                .then_some(Section::Results);
        };

        if captures.name("progress").is_some() {
            Some(Section::Progress)
        } else if captures.name("issues").is_some() {
            Some(Section::Issues)
        } else if captures.name("actions").is_some() {
            Some(Section::Actions)
        } else if captures.name("results").is_some() {
            Some(Section::Results)
        } else {
            None
        }
    }

    pub fn is_heading(&self, line: &str) -> bool {
        self.classify(line).is_some()
    }

    /// Starts like a heading (shortcode or pictograph) yet names no known section.
    pub fn looks_like_unknown_heading(&self, line: &str) -> bool {
        let candidate = self.heading_candidate(line);
        self.heading_marker.is_match(&candidate) && self.classify(line).is_none()
    }

    /// Ends a section: a known heading, or an unbulleted line that opens with
    /// a heading shortcode or pictograph.
    pub fn is_section_boundary(&self, line: &str) -> bool {
        if self.is_heading(line) {
            return true;
        }
        let trimmed = line.trim();
        self.heading_marker.is_match(&canonical_shortcodes(trimmed))
    }

    pub fn has_bullet(&self, line: &str) -> bool {
        self.leading_bullet.is_match(line)
    }

    /// Replaces any recognized leading bullet glyph with the canonical prefix.
    pub fn unify_bullet(&self, line: &str) -> Option<String> {
        let found = self.leading_bullet.find(line)?;
        Some(format!("{BULLET_PREFIX}{}", &line[found.end()..]))
    }

    pub fn strip_bullet<'a>(&self, line: &'a str) -> &'a str {
        match self.leading_bullet.find(line) {
            Some(found) => &line[found.end()..],
            None => line,
        }
    }

    fn heading_candidate(&self, line: &str) -> String {
        let trimmed = self.strip_bullet(line.trim()).trim();
        let trimmed = self.markdown_heading.replace(trimmed, "");
        let mut candidate = trimmed.trim().to_string();

        if let Some(inner) = candidate
            .strip_prefix("**")
            .and_then(|value| value.strip_suffix("**"))
        {
            candidate = inner.trim().to_string();
        }
        canonical_shortcodes(&candidate)
    }
}

fn canonical_shortcodes(text: &str) -> String {
    let mut replaced = text.to_string();
    for (alias, canonical) in SHORTCODE_ALIASES {
        if replaced.contains(alias) {
            replaced = replaced.replace(alias, canonical);
        }
    }
    replaced
}
