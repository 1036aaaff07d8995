//! Validation of untrusted extraction output.
//!
//! The extraction service returns free-form text that is supposed to hold a
//! JSON object. Nothing from it reaches the record store or the cache until
//! it has passed through [`validate`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Highest score the analysis may report
pub const MAX_SCORE: i64 = 100;

/// A validated analysis result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "serde_json::Value")]
pub struct AnalysisResult {
    score: u8,
    recommendations: Vec<String>,
    analysis_timestamp: DateTime<Utc>,
}

impl AnalysisResult {
    /// Build a result from already-typed parts, applying the same rules as
    /// [`validate`]
    pub fn new(
        score: i64,
        recommendations: Vec<String>,
        analysis_timestamp: DateTime<Utc>,
    ) -> Result<Self, SchemaViolation> {
        let score = check_score(score)?;
        let recommendations = recommendations
            .into_iter()
            .enumerate()
            .map(|(index, rec)| check_recommendation(index, &rec))
            .collect::<Result<Vec<_>, _>>()?;

        if recommendations.is_empty() {
            return Err(SchemaViolation::EmptyRecommendations);
        }

        Ok(Self {
            score,
            recommendations,
            analysis_timestamp,
        })
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn recommendations(&self) -> &[String] {
        &self.recommendations
    }

    pub fn analysis_timestamp(&self) -> DateTime<Utc> {
        self.analysis_timestamp
    }
}

impl TryFrom<Value> for AnalysisResult {
    type Error = SchemaViolation;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        validate_value(value)
    }
}

/// Reasons an extraction result is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("Output is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Top-level value must be an object, got {0}")]
    NotAnObject(&'static str),

    #[error("Missing field 'score'")]
    MissingScore,

    #[error("Field 'score' must be a number, got {0}")]
    NonNumericScore(String),

    #[error("Field 'score' must be an integer, got {0}")]
    NonIntegerScore(String),

    #[error("Field 'score' must be within 0..={max}, got {0}", max = MAX_SCORE)]
    ScoreOutOfRange(i64),

    #[error("Missing field 'recommendations'")]
    MissingRecommendations,

    #[error("Field 'recommendations' must be a list, got {0}")]
    RecommendationsNotAList(&'static str),

    #[error("Field 'recommendations' must not be empty")]
    EmptyRecommendations,

    #[error("Recommendation {index} must be a string, got {found}")]
    NonStringRecommendation { index: usize, found: &'static str },

    #[error("Recommendation {0} is blank")]
    BlankRecommendation(usize),

    #[error("Timestamp '{0}' is neither RFC 3339 nor YYYY-MM-DD")]
    InvalidTimestamp(String),
}

/// Parse and validate raw extraction output
pub fn validate(raw: &str) -> Result<AnalysisResult, SchemaViolation> {
    let body = strip_code_fence(raw);
    let value: Value =
        serde_json::from_str(body).map_err(|e| SchemaViolation::MalformedJson(e.to_string()))?;
    validate_value(value)
}

/// Validate an already-parsed JSON value
pub fn validate_value(value: Value) -> Result<AnalysisResult, SchemaViolation> {
    let object = match value {
        Value::Object(map) => map,
        other => return Err(SchemaViolation::NotAnObject(type_name(&other))),
    };

    let score = read_score(&object)?;
    let recommendations = read_recommendations(&object)?;
    let analysis_timestamp = read_timestamp(&object)?;

    Ok(AnalysisResult {
        score,
        recommendations,
        analysis_timestamp,
    })
}

fn read_score(object: &Map<String, Value>) -> Result<u8, SchemaViolation> {
    let number = match object.get("score") {
        None | Some(Value::Null) => return Err(SchemaViolation::MissingScore),
        Some(Value::Number(n)) => n,
        Some(other) => return Err(SchemaViolation::NonNumericScore(other.to_string())),
    };

    let score = match number.as_i64() {
        Some(score) => score,
        None => match number.as_f64() {
            // 82.0 is accepted, 82.5 is not
            Some(f) if f.fract() == 0.0 && f.abs() < 1e9 => f as i64,
            _ => return Err(SchemaViolation::NonIntegerScore(number.to_string())),
        },
    };

    check_score(score)
}

fn check_score(score: i64) -> Result<u8, SchemaViolation> {
    if !(0..=MAX_SCORE).contains(&score) {
        return Err(SchemaViolation::ScoreOutOfRange(score));
    }
    Ok(score as u8)
}

fn read_recommendations(object: &Map<String, Value>) -> Result<Vec<String>, SchemaViolation> {
    let items = match object.get("recommendations") {
        None | Some(Value::Null) => return Err(SchemaViolation::MissingRecommendations),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(SchemaViolation::RecommendationsNotAList(type_name(other))),
    };

    if items.is_empty() {
        return Err(SchemaViolation::EmptyRecommendations);
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(text) => check_recommendation(index, text),
            other => Err(SchemaViolation::NonStringRecommendation {
                index,
                found: type_name(other),
            }),
        })
        .collect()
}

fn check_recommendation(index: usize, text: &str) -> Result<String, SchemaViolation> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SchemaViolation::BlankRecommendation(index));
    }
    Ok(trimmed.to_string())
}

fn read_timestamp(object: &Map<String, Value>) -> Result<DateTime<Utc>, SchemaViolation> {
    // The prompt asks for `analysisDate`; the wire shape uses `analysisTimestamp`
    let raw = object
        .get("analysisTimestamp")
        .filter(|v| !v.is_null())
        .or_else(|| object.get("analysisDate").filter(|v| !v.is_null()));

    match raw {
        None => Ok(Utc::now()),
        Some(Value::String(text)) => parse_timestamp(text)
            .ok_or_else(|| SchemaViolation::InvalidTimestamp(text.clone())),
        Some(other) => Err(SchemaViolation::InvalidTimestamp(other.to_string())),
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Drop one surrounding markdown code fence, if present
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };

    // Skip the info string ("json") on the opening line
    match body.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => body.trim(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The permanent record written once per content hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    /// Content hash of the analysed artifact
    pub record_id: String,
    pub score: u8,
    pub recommendations: Vec<String>,
    pub analysis_timestamp: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(record_id: impl Into<String>, result: &AnalysisResult) -> Self {
        Self {
            record_id: record_id.into(),
            score: result.score,
            recommendations: result.recommendations.clone(),
            analysis_timestamp: result.analysis_timestamp,
        }
    }
}
