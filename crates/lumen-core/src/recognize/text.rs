#[cfg(feature = "config")]
use clap::{ArgAction, Args};
use serde::{Deserialize, Serialize};

use super::Recognition;

/// One detected line of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    pub confidence: f32,
}

impl TextLine {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Post-processing applied to detected lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct TextCleanup {
    /// Lines below this confidence are dropped.
    #[cfg_attr(
        feature = "config",
        arg(long = "ocr-min-confidence", env = "OCR_MIN_CONFIDENCE", default_value_t = 0.0)
    )]
    #[serde(default)]
    pub min_confidence: f32,

    /// Trims leading and trailing whitespace of every line.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "ocr-strip-whitespace",
            env = "OCR_STRIP_WHITESPACE",
            default_value_t = true,
            action = ArgAction::Set
        )
    )]
    #[serde(default = "default_strip_whitespace")]
    pub strip_whitespace: bool,

    /// Drops lines that are empty after stripping.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "ocr-remove-empty-lines",
            env = "OCR_REMOVE_EMPTY_LINES",
            default_value_t = false,
            action = ArgAction::Set
        )
    )]
    #[serde(default)]
    pub remove_empty_lines: bool,

    /// Joins lines with spaces into one paragraph instead of newlines.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "ocr-paragraph-mode",
            env = "OCR_PARAGRAPH_MODE",
            default_value_t = false,
            action = ArgAction::Set
        )
    )]
    #[serde(default)]
    pub paragraph_mode: bool,
}

fn default_strip_whitespace() -> bool {
    true
}

impl Default for TextCleanup {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            strip_whitespace: default_strip_whitespace(),
            remove_empty_lines: false,
            paragraph_mode: false,
        }
    }
}

/// Turns detected lines into one [`Recognition`].
///
/// The confidence is the mean over the lines that survive the confidence
/// filter, or `0.0` when none do.
pub fn assemble(lines: impl IntoIterator<Item = TextLine>, cleanup: &TextCleanup) -> Recognition {
    let kept: Vec<TextLine> = lines
        .into_iter()
        .filter(|line| line.confidence >= cleanup.min_confidence)
        .collect();

    let confidence = if kept.is_empty() {
        0.0
    } else {
        kept.iter().map(|line| line.confidence).sum::<f32>() / kept.len() as f32
    };

    let texts = kept
        .iter()
        .map(|line| {
            if cleanup.strip_whitespace {
                line.text.trim()
            } else {
                line.text.as_str()
            }
        })
        .filter(|text| !cleanup.remove_empty_lines || !text.trim().is_empty());

    let separator = if cleanup.paragraph_mode { " " } else { "\n" };
    let text = texts.collect::<Vec<_>>().join(separator);

    Recognition::new(text, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines() -> Vec<TextLine> {
        vec![
            TextLine::new("  Invoice 42 ", 0.9),
            TextLine::new("   ", 0.8),
            TextLine::new("smudge", 0.1),
            TextLine::new("Total: 10", 0.7),
        ]
    }

    #[test]
    fn default_cleanup_strips_and_keeps_empty_lines() {
        let recognition = assemble(lines(), &TextCleanup::default());
        assert_eq!(recognition.text, "Invoice 42\n\nsmudge\nTotal: 10");
        assert!((recognition.confidence - 0.625).abs() < 1e-6);
    }

    #[test]
    fn filters_low_confidence_and_empty_lines() {
        let cleanup = TextCleanup {
            min_confidence: 0.5,
            remove_empty_lines: true,
            ..TextCleanup::default()
        };
        let recognition = assemble(lines(), &cleanup);
        assert_eq!(recognition.text, "Invoice 42\nTotal: 10");
        assert!((recognition.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn paragraph_mode_joins_with_spaces() {
        let cleanup = TextCleanup {
            remove_empty_lines: true,
            paragraph_mode: true,
            ..TextCleanup::default()
        };
        assert_eq!(
            assemble(lines(), &cleanup).text,
            "Invoice 42 smudge Total: 10"
        );
    }

    #[test]
    fn no_lines_means_zero_confidence() {
        let cleanup = TextCleanup {
            min_confidence: 0.95,
            ..TextCleanup::default()
        };
        let recognition = assemble(lines(), &cleanup);
        assert_eq!(recognition.text, "");
        assert_eq!(recognition.confidence, 0.0);
    }

    #[test]
    fn without_stripping_text_is_verbatim() {
        let cleanup = TextCleanup {
            strip_whitespace: false,
            ..TextCleanup::default()
        };
        let recognition = assemble(vec![TextLine::new(" a ", 1.0)], &cleanup);
        assert_eq!(recognition.text, " a ");
    }
}
