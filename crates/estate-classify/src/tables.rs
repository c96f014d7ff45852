//! Immutable detector configuration: keyword lists, regex patterns,
//! severity mapping and detector weights, keyed by category.
//!
//! Built once, then shared read-only (behind an `Arc`) by every
//! classification call.
//!
//! Patterns may overlap in shape. Where one value fits two patterns and a
//! check digit decides, the losing pattern carries an exclusion.

use std::collections::BTreeMap;

use regex::Regex;

use estate_core::config::ClassifyConfig;
use estate_core::{Category, Severity};

use crate::error::{ClassifyError, Result};
use crate::validate::ShapeCheck;

/// Column or file name keywords for one category. Matched as
/// case-insensitive substrings.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub category: Category,
    pub keywords: Vec<String>,
}

/// A named value pattern. `whole` matches a complete (trimmed) column
/// value; `anywhere` finds occurrences inside free text.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub label: String,
    pub category: Category,
    pub whole: Regex,
    pub anywhere: Regex,
    /// Structural check run on pattern hits by the shape detector.
    pub check: Option<ShapeCheck>,
    /// Hits passing this check belong to another pattern and are not
    /// counted for this one.
    pub exclude: Option<ShapeCheck>,
}

impl PatternRule {
    pub fn new(
        label: &str,
        category: Category,
        body: &str,
        check: Option<ShapeCheck>,
    ) -> Result<Self> {
        let compile = |source: String| {
            Regex::new(&source).map_err(|e| ClassifyError::InvalidPattern {
                label: label.to_string(),
                reason: e.to_string(),
            })
        };
        Ok(Self {
            label: label.to_string(),
            category,
            whole: compile(format!(r"^(?:{body})$"))?,
            anywhere: compile(format!(r"\b(?:{body})\b"))?,
            check,
            exclude: None,
        })
    }

    pub fn excluding(mut self, check: ShapeCheck) -> Self {
        self.exclude = Some(check);
        self
    }

    /// Whether `text` is claimed by the excluded check.
    pub fn excludes(&self, text: &str) -> bool {
        self.exclude.is_some_and(|check| check.validate(text))
    }
}

/// Confidence weights of the name and shape detectors. The pattern detector
/// scores by match ratio and has no weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorWeights {
    pub name: f64,
    pub shape: f64,
    pub shape_quorum: f64,
}

impl Default for DetectorWeights {
    fn default() -> Self {
        Self {
            name: 0.6,
            shape: 0.9,
            shape_quorum: 0.5,
        }
    }
}

const STANDARD_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::NationalId,
        &["cpf", "ssn", "social", "tax_id", "passport", "passaporte"],
    ),
    (Category::BusinessId, &["cnpj", "inscricao_estadual"]),
    (
        Category::ContactInfo,
        &["email", "e-mail", "mail", "phone", "telefone", "celular", "mobile"],
    ),
    (
        Category::Financial,
        &["card", "credit", "cartao", "iban", "account_number", "bank_account"],
    ),
    (
        Category::Technical,
        &["ip_address", "ip_addr", "ipv4", "hostname", "mac_address"],
    ),
    (Category::Temporal, &["birth", "nascimento", "dob"]),
];

const STANDARD_PATTERNS: &[(&str, Category, &str, Option<ShapeCheck>)] = &[
    (
        "CPF",
        Category::NationalId,
        r"\d{3}\.?\d{3}\.?\d{3}-?\d{2}",
        Some(ShapeCheck::Cpf),
    ),
    (
        "CNPJ",
        Category::BusinessId,
        r"\d{2}\.?\d{3}\.?\d{3}/?\d{4}-?\d{2}",
        Some(ShapeCheck::Cnpj),
    ),
    (
        "Email",
        Category::ContactInfo,
        r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
        None,
    ),
    (
        "Phone_BR",
        Category::ContactInfo,
        r"(?:\+55\s?)?(?:\(?\d{2}\)?\s?)?(?:9\s?)?\d{4}-?\d{4}",
        None,
    ),
    (
        "Credit_Card",
        Category::Financial,
        r"(?:\d{4}[\s-]?){3}\d{4}",
        Some(ShapeCheck::Luhn),
    ),
    (
        "IPv4",
        Category::Technical,
        r"(?:\d{1,3}\.){3}\d{1,3}",
        Some(ShapeCheck::Ipv4),
    ),
    (
        "SSN_US",
        Category::NationalId,
        r"\d{3}-\d{2}-\d{4}",
        Some(ShapeCheck::SsnUs),
    ),
    (
        "Date_BR",
        Category::Temporal,
        r"\d{2}/\d{2}/\d{4}",
        Some(ShapeCheck::DateBr),
    ),
];

/// A bare 11-digit CPF also has the shape of a mobile number; valid CPFs
/// are not counted as phones.
const STANDARD_EXCLUSIONS: &[(&str, ShapeCheck)] = &[("Phone_BR", ShapeCheck::Cpf)];

/// Everything the detectors read.
#[derive(Debug, Clone)]
pub struct ClassificationTables {
    keywords: Vec<KeywordRule>,
    patterns: Vec<PatternRule>,
    severities: BTreeMap<Category, Severity>,
    weights: DetectorWeights,
    min_confidence: f64,
    max_samples: usize,
}

impl ClassificationTables {
    /// The built-in tables: Brazilian and US identifiers, contact data,
    /// card numbers, IPv4 addresses and dates.
    pub fn standard() -> Result<Self> {
        let keywords = STANDARD_KEYWORDS
            .iter()
            .map(|(category, words)| KeywordRule {
                category: *category,
                keywords: words.iter().map(|w| w.to_string()).collect(),
            })
            .collect();

        let patterns = STANDARD_PATTERNS
            .iter()
            .map(|(label, category, body, check)| -> Result<PatternRule> {
                let rule = PatternRule::new(label, *category, body, *check)?;
                Ok(match STANDARD_EXCLUSIONS.iter().find(|(l, _)| l == label) {
                    Some((_, exclude)) => rule.excluding(*exclude),
                    None => rule,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let severities = BTreeMap::from([
            (Category::NationalId, Severity::Critical),
            (Category::Financial, Severity::Critical),
            (Category::BusinessId, Severity::Medium),
            (Category::ContactInfo, Severity::Medium),
            (Category::Technical, Severity::Low),
            (Category::Temporal, Severity::Low),
        ]);

        Ok(Self {
            keywords,
            patterns,
            severities,
            weights: DetectorWeights::default(),
            min_confidence: 0.3,
            max_samples: 100,
        })
    }

    /// Override weights and thresholds from configuration. Values outside
    /// [0, 1] are rejected.
    pub fn with_config(mut self, config: &ClassifyConfig) -> Result<Self> {
        config.validate()?;
        self.weights = DetectorWeights {
            name: config.name_weight,
            shape: config.shape_weight,
            shape_quorum: config.shape_quorum,
        };
        self.min_confidence = config.min_confidence;
        self.max_samples = config.max_samples;
        Ok(self)
    }

    /// Add keywords to a category.
    pub fn with_keywords(mut self, category: Category, words: &[&str]) -> Self {
        let words = words.iter().map(|w| w.to_lowercase());
        match self.keywords.iter_mut().find(|r| r.category == category) {
            Some(rule) => rule.keywords.extend(words),
            None => self.keywords.push(KeywordRule {
                category,
                keywords: words.collect(),
            }),
        }
        self
    }

    /// Add a value pattern.
    pub fn with_pattern(mut self, rule: PatternRule) -> Self {
        self.patterns.push(rule);
        self
    }

    pub fn keywords(&self) -> &[KeywordRule] {
        &self.keywords
    }

    pub fn patterns(&self) -> &[PatternRule] {
        &self.patterns
    }

    /// Patterns of one category.
    pub fn patterns_for(&self, category: Category) -> impl Iterator<Item = &PatternRule> {
        self.patterns.iter().filter(move |p| p.category == category)
    }

    /// Fixed severity of a category. Categories missing from the map are
    /// reported as `Info`.
    pub fn severity(&self, category: Category) -> Severity {
        self.severities
            .get(&category)
            .copied()
            .unwrap_or(Severity::Info)
    }

    pub fn weights(&self) -> DetectorWeights {
        self.weights
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_tables_compile() {
        let tables = ClassificationTables::standard().unwrap();
        assert_eq!(tables.patterns().len(), 8);
        assert_eq!(tables.patterns_for(Category::NationalId).count(), 2);
        assert_eq!(tables.severity(Category::NationalId), Severity::Critical);
        assert_eq!(tables.severity(Category::ContactInfo), Severity::Medium);
        assert_eq!(tables.severity(Category::Temporal), Severity::Low);
    }

    #[test]
    fn test_whole_and_anywhere_matching() {
        let tables = ClassificationTables::standard().unwrap();
        let cpf = &tables.patterns()[0];
        assert!(cpf.whole.is_match("123.456.789-09"));
        assert!(!cpf.whole.is_match("cpf 123.456.789-09"));
        assert!(cpf.anywhere.is_match("cpf 123.456.789-09 ok"));
    }

    #[test]
    fn test_config_overrides() {
        let config = ClassifyConfig {
            min_confidence: 0.5,
            name_weight: 0.4,
            shape_weight: 0.8,
            shape_quorum: 0.75,
            max_samples: 10,
        };
        let tables = ClassificationTables::standard()
            .unwrap()
            .with_config(&config)
            .unwrap();
        assert_eq!(tables.weights().name, 0.4);
        assert_eq!(tables.weights().shape_quorum, 0.75);
        assert_eq!(tables.min_confidence(), 0.5);
        assert_eq!(tables.max_samples(), 10);
    }

    #[test]
    fn test_weight_above_one_is_rejected() {
        let config = ClassifyConfig {
            name_weight: 1.7,
            ..ClassifyConfig::default()
        };
        let err = ClassificationTables::standard()
            .unwrap()
            .with_config(&config)
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Estate(_)));
    }

    #[test]
    fn test_extending_tables() {
        let tables = ClassificationTables::standard()
            .unwrap()
            .with_keywords(Category::Financial, &["PIX_Key"])
            .with_pattern(
                PatternRule::new("IBAN", Category::Financial, r"[A-Z]{2}\d{2}[A-Z0-9]{11,30}", None)
                    .unwrap(),
            );
        let financial = tables
            .keywords()
            .iter()
            .find(|r| r.category == Category::Financial)
            .unwrap();
        assert!(financial.keywords.contains(&"pix_key".to_string()));
        assert_eq!(tables.patterns_for(Category::Financial).count(), 2);
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        let err = PatternRule::new("broken", Category::Technical, r"(\d+", None).unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidPattern { .. }));
    }
}
