//! The three detectors. Each is a pure function of the tables and the scan
//! input; confidence comes from aggregate counts, so sample order never
//! changes the result.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use estate_core::Category;

use crate::error::DetectorError;
use crate::tables::{ClassificationTables, PatternRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Name,
    Pattern,
    Shape,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Name => "name",
            DetectorKind::Pattern => "pattern",
            DetectorKind::Shape => "shape",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How sample text is matched against patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The trimmed value must match a pattern as a whole (column samples).
    WholeValue,
    /// Any occurrence inside the text counts (lines of a file).
    Anywhere,
}

/// What the detectors look at.
#[derive(Debug, Clone, Copy)]
pub struct ScanInput<'a> {
    pub name: &'a str,
    pub samples: &'a [Value],
    pub mode: MatchMode,
}

/// One detector's confidence for one category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    pub category: Category,
    pub detector: DetectorKind,
    pub confidence: f64,
}

// ── Name ─────────────────────────────────────────────────────────

/// Keyword hit in the lowercased name: fixed `name` weight per category.
pub fn name_detector(tables: &ClassificationTables, input: &ScanInput<'_>) -> Vec<Signal> {
    let name = input.name.to_lowercase();
    let weight = tables.weights().name;

    tables
        .keywords()
        .iter()
        .filter(|rule| rule.keywords.iter().any(|kw| name.contains(kw.as_str())))
        .map(|rule| Signal {
            category: rule.category,
            detector: DetectorKind::Name,
            confidence: weight,
        })
        .collect()
}

// ── Pattern ──────────────────────────────────────────────────────

/// Share of non-null samples matching any of a category's patterns.
/// Categories without a single hit are not reported.
pub fn pattern_detector(
    tables: &ClassificationTables,
    input: &ScanInput<'_>,
) -> Result<Vec<Signal>, DetectorError> {
    let texts = sample_texts(DetectorKind::Pattern, input.samples)?;
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let total = texts.len() as f64;

    let signals = Category::ALL
        .iter()
        .filter_map(|&category| {
            let rules: Vec<&PatternRule> = tables.patterns_for(category).collect();
            if rules.is_empty() {
                return None;
            }
            let hits = texts
                .iter()
                .filter(|text| rules.iter().any(|rule| pattern_hit(rule, text, input.mode)))
                .count();
            (hits > 0).then(|| Signal {
                category,
                detector: DetectorKind::Pattern,
                confidence: (hits as f64 / total).min(1.0),
            })
        })
        .collect();
    Ok(signals)
}

fn pattern_hit(rule: &PatternRule, text: &str, mode: MatchMode) -> bool {
    match mode {
        MatchMode::WholeValue => rule.whole.is_match(text) && !rule.excludes(text),
        MatchMode::Anywhere => rule
            .anywhere
            .find_iter(text)
            .any(|m| !rule.excludes(m.as_str())),
    }
}

// ── Shape ────────────────────────────────────────────────────────

/// Pattern hits that also pass their structural check. Full `shape` weight
/// once the valid share of non-null samples reaches `shape_quorum`,
/// proportionally less below it. Only patterns carrying a check count.
pub fn shape_detector(
    tables: &ClassificationTables,
    input: &ScanInput<'_>,
) -> Result<Vec<Signal>, DetectorError> {
    let texts = sample_texts(DetectorKind::Shape, input.samples)?;
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let total = texts.len() as f64;
    let weights = tables.weights();

    let signals = Category::ALL
        .iter()
        .filter_map(|&category| {
            let rules: Vec<&PatternRule> = tables
                .patterns_for(category)
                .filter(|rule| rule.check.is_some())
                .collect();
            if rules.is_empty() {
                return None;
            }
            let valid = texts
                .iter()
                .filter(|text| rules.iter().any(|rule| shape_hit(rule, text, input.mode)))
                .count();
            if valid == 0 {
                return None;
            }
            let ratio = valid as f64 / total;
            let confidence = if ratio >= weights.shape_quorum {
                weights.shape
            } else {
                weights.shape * ratio
            };
            Some(Signal {
                category,
                detector: DetectorKind::Shape,
                confidence,
            })
        })
        .collect();
    Ok(signals)
}

fn shape_hit(rule: &PatternRule, text: &str, mode: MatchMode) -> bool {
    let Some(check) = rule.check else {
        return false;
    };
    match mode {
        MatchMode::WholeValue => rule.whole.is_match(text) && check.validate(text),
        MatchMode::Anywhere => rule
            .anywhere
            .find_iter(text)
            .any(|m| check.validate(m.as_str())),
    }
}

// ── Samples ──────────────────────────────────────────────────────

/// Scalar samples as trimmed text. Nulls and blank strings are dropped;
/// arrays and objects fail the detector.
fn sample_texts(
    detector: DetectorKind,
    samples: &[Value],
) -> Result<Vec<Cow<'_, str>>, DetectorError> {
    let mut texts = Vec::with_capacity(samples.len());
    for (index, value) in samples.iter().enumerate() {
        let text = match value {
            Value::Null => continue,
            Value::String(s) => Cow::Borrowed(s.trim()),
            Value::Number(n) => Cow::Owned(n.to_string()),
            Value::Bool(b) => Cow::Owned(b.to_string()),
            Value::Array(_) => return Err(unsupported(detector, index, "an array")),
            Value::Object(_) => return Err(unsupported(detector, index, "an object")),
        };
        if !text.is_empty() {
            texts.push(text);
        }
    }
    Ok(texts)
}

fn unsupported(detector: DetectorKind, index: usize, found: &str) -> DetectorError {
    DetectorError::UnsupportedValue {
        detector,
        index,
        found: found.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tables() -> ClassificationTables {
        ClassificationTables::standard().unwrap()
    }

    fn column<'a>(name: &'a str, samples: &'a [Value]) -> ScanInput<'a> {
        ScanInput {
            name,
            samples,
            mode: MatchMode::WholeValue,
        }
    }

    #[test]
    fn test_name_detector_is_case_insensitive_substring() {
        let signals = name_detector(&tables(), &column("Customer_EMAIL_Address", &[]));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].category, Category::ContactInfo);
        assert_eq!(signals[0].confidence, 0.6);

        assert!(name_detector(&tables(), &column("notes", &[])).is_empty());
    }

    #[test]
    fn test_pattern_ratio_ignores_nulls_and_blanks() {
        let samples = vec![
            json!("a@example.com"),
            Value::Null,
            json!("   "),
            json!("not an email"),
        ];
        let signals = pattern_detector(&tables(), &column("contact", &samples)).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].category, Category::ContactInfo);
        assert_eq!(signals[0].confidence, 0.5);
    }

    #[test]
    fn test_pattern_whole_value_vs_anywhere() {
        let samples = vec![json!("ticket from a@example.com")];
        let whole = pattern_detector(&tables(), &column("body", &samples)).unwrap();
        assert!(whole.is_empty());

        let anywhere = ScanInput {
            mode: MatchMode::Anywhere,
            ..column("body", &samples)
        };
        let signals = pattern_detector(&tables(), &anywhere).unwrap();
        assert_eq!(signals[0].category, Category::ContactInfo);
    }

    #[test]
    fn test_bare_cpf_is_not_a_phone() {
        let cpf = vec![json!("52998224725")];
        let signals = pattern_detector(&tables(), &column("doc", &cpf)).unwrap();
        let categories: Vec<_> = signals.iter().map(|s| s.category).collect();
        assert_eq!(categories, vec![Category::NationalId]);

        // same shape, failing the CPF check digits: still a phone
        let phone = vec![json!("11912345678")];
        let signals = pattern_detector(&tables(), &column("doc", &phone)).unwrap();
        assert!(signals.iter().any(|s| s.category == Category::ContactInfo));
    }

    #[test]
    fn test_pattern_is_order_insensitive() {
        let a = vec![json!("123.456.789-09"), json!("x"), json!("y")];
        let b = vec![json!("y"), json!("123.456.789-09"), json!("x")];
        assert_eq!(
            pattern_detector(&tables(), &column("c", &a)).unwrap(),
            pattern_detector(&tables(), &column("c", &b)).unwrap()
        );
    }

    #[test]
    fn test_shape_requires_valid_checksums() {
        let invalid = vec![json!("123.456.789-01"), json!("999.888.777-66")];
        assert!(shape_detector(&tables(), &column("c", &invalid)).unwrap().is_empty());

        let valid = vec![json!("123.456.789-09"), json!("529.982.247-25"), json!("n/a")];
        let signals = shape_detector(&tables(), &column("c", &valid)).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].category, Category::NationalId);
        assert_eq!(signals[0].confidence, 0.9);
    }

    #[test]
    fn test_shape_below_quorum_scales() {
        let samples = vec![
            json!("4111 1111 1111 1111"),
            json!("a"),
            json!("b"),
            json!("c"),
        ];
        let signals = shape_detector(&tables(), &column("c", &samples)).unwrap();
        assert_eq!(signals[0].category, Category::Financial);
        assert!((signals[0].confidence - 0.225).abs() < 1e-9);
    }

    #[test]
    fn test_non_scalar_sample_fails_detector() {
        let samples = vec![json!("a@example.com"), json!({"nested": true})];
        let err = pattern_detector(&tables(), &column("c", &samples)).unwrap_err();
        assert_eq!(
            err,
            DetectorError::UnsupportedValue {
                detector: DetectorKind::Pattern,
                index: 1,
                found: "an object".to_string(),
            }
        );
    }

    #[test]
    fn test_numbers_are_matched_as_text() {
        let samples = vec![json!(52998224725_u64)];
        let signals = pattern_detector(&tables(), &column("c", &samples)).unwrap();
        assert!(signals.iter().any(|s| s.category == Category::NationalId));
    }
}
