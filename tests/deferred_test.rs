//! Deferred Expression Tests
//!
//! Expressions are parsed at construction, evaluated when the owning task
//! starts, and fail the task (not the chain) when malformed.

use fluid::binding::{resolve, Arg, DeferredError, EvalError};
use fluid::{deferred, Deferred, FluidError, ResultStore};
use serde_json::json;

// ═══════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════

/// Store with `method = [1, 2]`, `user = {...}` and a pending `later`
fn store() -> ResultStore {
    let store = ResultStore::new();
    store.reserve("method");
    store.reserve("method");
    store.assign("method", 0, json!(1)).unwrap();
    store.assign("method", 1, json!(2)).unwrap();
    store.reserve("user");
    store
        .assign("user", 0, json!({"name": "Ada", "langs": ["en", "fr"], "age": 36}))
        .unwrap();
    store.reserve("later");
    store
}

// ═══════════════════════════════════════════════════════════════════════════
// Evaluation
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_paths_into_sequences_and_objects() {
    let results = store().snapshot();
    assert_eq!(deferred("method[1]").evaluate(&results).unwrap(), json!(2));
    assert_eq!(deferred("this.user.langs[1]").evaluate(&results).unwrap(), json!("fr"));
    assert_eq!(deferred("$.user.name").evaluate(&results).unwrap(), json!("Ada"));
}

#[test]
fn test_arithmetic_over_results() {
    let results = store().snapshot();
    assert_eq!(
        deferred("method[0] + method[1] * 10").evaluate(&results).unwrap(),
        json!(21)
    );
    assert_eq!(deferred("user.age / 8").evaluate(&results).unwrap(), json!(4.5));
}

#[test]
fn test_pending_slot_is_null() {
    let results = store().snapshot();
    assert_eq!(deferred("later").evaluate(&results).unwrap(), json!(null));
    assert_eq!(deferred("later ?? 0").evaluate(&results).unwrap(), json!(0));
}

#[test]
fn test_comparison_yields_boolean() {
    let results = store().snapshot();
    assert_eq!(
        deferred("user.age >= 18").evaluate(&results).unwrap(),
        json!(true)
    );
    // Comparisons do not chain
    assert!(!deferred("1 < 2 < 3").is_valid());
}

#[test]
fn test_missing_result_is_an_error() {
    let results = store().snapshot();
    let err = deferred("nobody.name").evaluate(&results).unwrap_err();
    assert_eq!(err, DeferredError::Eval(EvalError::UnknownResult("nobody".into())));
}

#[test]
fn test_index_past_end_is_an_error() {
    let results = store().snapshot();
    let err = deferred("method[5]").evaluate(&results).unwrap_err();
    assert!(err.to_string().contains("method[5]"));
}

// ═══════════════════════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_lenient_construction_defers_parse_errors() {
    let d = deferred("method[");
    assert!(!d.is_valid());
    assert_eq!(d.source(), "method[");
    assert!(d.expr().is_none());
}

#[test]
fn test_strict_parse() {
    match Deferred::parse("1 + + ") {
        Err(FluidError::ExpressionParse { expression, .. }) => assert_eq!(expression, "1 + + "),
        other => panic!("expected ExpressionParse, got {:?}", other.map(|d| d.to_string())),
    }
}

#[test]
fn test_no_code_execution_surface() {
    // Calls and assignments are not part of the grammar
    for source in ["process.exit(1)", "a = 1", "x; y", "`cmd`"] {
        assert!(!deferred(source).is_valid(), "{} should not parse", source);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Resolution through Arg
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_resolve_error_identifies_target_and_expression() {
    let results = store().snapshot();
    let err = resolve(&Arg::from(deferred("user.missing")), "report", &results).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("FLUID-020"));
    assert!(message.contains("'report'"));
    assert!(message.contains("`user.missing`"));
}

#[test]
fn test_object_nesting_is_one_level() {
    let results = store().snapshot();
    let arg = Arg::object()
        .field("top", deferred("method[0]"))
        .field("nested", json!({"inner": "method[0]"}))
        .build();
    assert_eq!(
        resolve(&arg, "t", &results).unwrap(),
        json!({"top": 1, "nested": {"inner": "method[0]"}})
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// Inside a plan
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_integer_overflow_in_plan_yields_float() {
    let ctx = fluid::Context::new().sync_function("m", Ok);
    let results = fluid::fluid(ctx)
        .call("m", deferred("(-9223372036854775807 - 1) / -1"))
        .go()
        .await
        .unwrap();
    assert_eq!(results["m"], json!(9.223372036854775807e18));
}

#[test]
fn test_deeply_nested_expression_fails_strict_parse() {
    let source = format!("{}m{}", "(".repeat(100_000), ")".repeat(100_000));
    match Deferred::parse(&source) {
        Err(FluidError::ExpressionParse { details, .. }) => {
            assert!(details.contains("nested too deeply"))
        }
        other => panic!("expected ExpressionParse, got {:?}", other.map(|d| d.to_string())),
    }
}
