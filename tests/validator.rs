//! Validator Integration Tests
//!
//! Extraction output as language models actually produce it.

use chrono::{Datelike, Timelike};
use resume_gate::domain::{validate, AnalysisResult, SchemaViolation};
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_accepts_prompt_shaped_output() {
    let raw = r#"{
        "score": 82,
        "recommendations": ["Add metrics", "Quantify impact"],
        "analysisDate": "2024-05-01"
    }"#;

    let result = assert_ok!(validate(raw));
    assert_eq!(result.score(), 82);
    assert_eq!(result.recommendations(), ["Add metrics", "Quantify impact"]);
    assert_eq!(result.analysis_timestamp().year(), 2024);
    assert_eq!(result.analysis_timestamp().month(), 5);
    assert_eq!(result.analysis_timestamp().hour(), 0);
}

#[test]
fn test_accepts_fenced_output() {
    let raw = "```json\n{\"score\": 64, \"recommendations\": [\"Shorten\"]}\n```";
    let result = assert_ok!(validate(raw));
    assert_eq!(result.score(), 64);
}

#[test]
fn test_accepts_rfc3339_timestamp() {
    let raw = r#"{"score": 5, "recommendations": ["x"], "analysisTimestamp": "2024-05-01T10:30:00+02:00"}"#;
    let result = assert_ok!(validate(raw));
    assert_eq!(result.analysis_timestamp().hour(), 8);
}

#[test]
fn test_score_bounds_are_inclusive() {
    assert_ok!(validate(r#"{"score": 0, "recommendations": ["x"]}"#));
    assert_ok!(validate(r#"{"score": 100, "recommendations": ["x"]}"#));
    assert_eq!(
        assert_err!(validate(r#"{"score": 101, "recommendations": ["x"]}"#)),
        SchemaViolation::ScoreOutOfRange(101)
    );
}

#[test]
fn test_rejections() {
    let cases: Vec<(&str, SchemaViolation)> = vec![
        (r#"[1, 2]"#, SchemaViolation::NotAnObject("array")),
        (r#"{"recommendations": ["x"]}"#, SchemaViolation::MissingScore),
        (
            r#"{"score": "high", "recommendations": ["x"]}"#,
            SchemaViolation::NonNumericScore("\"high\"".to_string()),
        ),
        (
            r#"{"score": 82.5, "recommendations": ["x"]}"#,
            SchemaViolation::NonIntegerScore("82.5".to_string()),
        ),
        (r#"{"score": 82}"#, SchemaViolation::MissingRecommendations),
        (
            r#"{"score": 82, "recommendations": "x"}"#,
            SchemaViolation::RecommendationsNotAList("string"),
        ),
        (
            r#"{"score": 82, "recommendations": []}"#,
            SchemaViolation::EmptyRecommendations,
        ),
        (
            r#"{"score": 82, "recommendations": ["ok", 3]}"#,
            SchemaViolation::NonStringRecommendation {
                index: 1,
                found: "number",
            },
        ),
        (
            r#"{"score": 82, "recommendations": ["ok", "   "]}"#,
            SchemaViolation::BlankRecommendation(1),
        ),
        (
            r#"{"score": 82, "recommendations": ["ok"], "analysisDate": "yesterday"}"#,
            SchemaViolation::InvalidTimestamp("yesterday".to_string()),
        ),
    ];

    for (raw, expected) in cases {
        assert_eq!(validate(raw), Err(expected), "{}", raw);
    }
}

#[test]
fn test_prose_is_malformed() {
    let err = assert_err!(validate("Sure! Here is the analysis: score 82"));
    assert!(matches!(err, SchemaViolation::MalformedJson(_)));
}

#[test]
fn test_deserialization_enforces_validation() {
    let ok: AnalysisResult =
        serde_json::from_str(r#"{"score": 82, "recommendations": ["Add metrics"]}"#).unwrap();
    assert_eq!(ok.score(), 82);

    let bad = serde_json::from_str::<AnalysisResult>(r#"{"score": 500, "recommendations": ["x"]}"#);
    assert!(bad.is_err());
}
