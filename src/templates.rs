//! Built-in card templates.
//!
//! A template is the geometric half of a visual theme: page margins and the
//! typographic metrics the measurer needs (font sizes, line heights, gaps).
//! Colours and typefaces belong to the rendering backend and are not
//! modelled here.
//!
//! | Template  | Body font | Margins (top/bottom/side) | Best for |
//! |-----------|-----------|---------------------------|----------|
//! | `clean`   | 40 px     | 120 / 150 / 96            | Default: airy, readable on phones |
//! | `compact` | 34 px     | 80 / 110 / 64             | Dense notes, code-heavy posts |

use crate::measure::StyleContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Page margins in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margins {
    pub top: u32,
    pub bottom: u32,
    pub side: u32,
}

/// Named preset of margins and text metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    #[default]
    Clean,
    Compact,
}

impl Template {
    pub const ALL: [Template; 2] = [Template::Clean, Template::Compact];

    pub fn name(&self) -> &'static str {
        match self {
            Template::Clean => "clean",
            Template::Compact => "compact",
        }
    }

    /// Bottom margin includes room for the page-number footer.
    pub fn margins(&self) -> Margins {
        match self {
            Template::Clean => Margins {
                top: 120,
                bottom: 150,
                side: 96,
            },
            Template::Compact => Margins {
                top: 80,
                bottom: 110,
                side: 64,
            },
        }
    }

    pub fn style(&self) -> StyleContext {
        match self {
            Template::Clean => StyleContext {
                body_font_px: 40.0,
                line_height: 1.6,
                heading_scale: [1.6, 1.4, 1.25, 1.1, 1.0, 1.0],
                code_font_px: 30.0,
                code_line_height: 1.45,
                code_padding_px: 24,
                block_gap_px: 28,
                list_indent_px: 48,
                divider_px: 4,
                glyph_width_ratio: 0.55,
            },
            Template::Compact => StyleContext {
                body_font_px: 34.0,
                line_height: 1.5,
                heading_scale: [1.5, 1.3, 1.2, 1.1, 1.0, 1.0],
                code_font_px: 26.0,
                code_line_height: 1.4,
                code_padding_px: 16,
                block_gap_px: 20,
                list_indent_px: 40,
                divider_px: 3,
                glyph_width_ratio: 0.55,
            },
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Template {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Template::ALL
            .into_iter()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Template::ALL.iter().map(Template::name).collect();
                format!("unknown template '{s}' (known: {})", known.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names_case_insensitively() {
        assert_eq!("Clean".parse::<Template>(), Ok(Template::Clean));
        assert_eq!(" compact ".parse::<Template>(), Ok(Template::Compact));
    }

    #[test]
    fn unknown_template_lists_choices() {
        let err = "glossy".parse::<Template>().unwrap_err();
        assert!(err.contains("clean"), "got: {err}");
    }

    #[test]
    fn compact_is_denser_than_clean() {
        let clean = Template::Clean.style();
        let compact = Template::Compact.style();
        assert!(compact.body_font_px < clean.body_font_px);
        assert!(Template::Compact.margins().top < Template::Clean.margins().top);
    }
}
