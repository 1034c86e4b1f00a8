use skaigate::plan::{decode_plan, DecodeError, OperationPlan};

#[test]
fn plan_decode_module_reads_bare_json_plan() {
    let plan = decode_plan(
        r#"{"operation":"SELECT","table":"activities","filters":{"project_id":"p-1"},"explanation":"list activities"}"#,
    )
    .expect("plan");
    match plan {
        OperationPlan::Select {
            table,
            filters,
            explanation,
        } => {
            assert_eq!(table.as_str(), "activities");
            assert_eq!(filters.get("project_id").unwrap(), "p-1");
            assert_eq!(explanation, "list activities");
        }
        other => panic!("expected select, got {other:?}"),
    }
}

#[test]
fn plan_decode_module_fenced_output_equals_unwrapped_output() {
    let bare = r#"{"operation":"INSERT","table":"activities","data":{"name":"Site Prep"},"explanation":"","requiresConfirmation":false}"#;
    let fenced = format!("```json\n{bare}\n```");
    let from_bare = decode_plan(bare).expect("bare plan");
    let from_fenced = decode_plan(&fenced).expect("fenced plan");
    assert_eq!(from_bare, from_fenced);

    let anon_fence = format!("```\n{bare}\n```");
    assert_eq!(decode_plan(&anon_fence).expect("anon fenced plan"), from_bare);
}

#[test]
fn plan_decode_module_extracts_first_balanced_object_from_prose() {
    let text = r#"Here is the plan you asked for:
{"operation":"DELETE","table":"tasks","filters":{"name":"Old {task}"},"requiresConfirmation":true}
Let me know if you need anything else."#;
    let plan = decode_plan(text).expect("plan");
    match plan {
        OperationPlan::Delete {
            table,
            filters,
            requires_confirmation,
            ..
        } => {
            assert_eq!(table.as_str(), "tasks");
            assert_eq!(filters.get("name").unwrap(), "Old {task}");
            assert!(requires_confirmation);
        }
        other => panic!("expected delete, got {other:?}"),
    }
}

#[test]
fn plan_decode_module_malformed_output_keeps_raw_text() {
    let raw = "I'm sorry, I can't translate that into an operation.";
    let err = decode_plan(raw).expect_err("must not guess a plan");
    assert_eq!(err.raw_output(), raw);
    assert!(matches!(err, DecodeError::Json { .. }));

    let empty = decode_plan("   ").expect_err("empty output");
    assert!(matches!(empty, DecodeError::Empty { .. }));
}

#[test]
fn plan_decode_module_rejects_unknown_verbs_and_shapes() {
    let upsert = decode_plan(r#"{"operation":"UPSERT","table":"activities","data":{"a":1}}"#)
        .expect_err("unknown verb");
    assert!(matches!(upsert, DecodeError::Shape { .. }));
    assert!(upsert.to_string().contains("UPSERT"));

    let insert_no_data =
        decode_plan(r#"{"operation":"INSERT","table":"activities"}"#).expect_err("missing data");
    assert!(matches!(insert_no_data, DecodeError::Shape { .. }));

    let delete_unfiltered = decode_plan(r#"{"operation":"DELETE","table":"activities"}"#)
        .expect_err("delete without filters");
    assert!(delete_unfiltered.to_string().contains("filters"));

    let bad_filters =
        decode_plan(r#"{"operation":"SELECT","table":"activities","filters":[1,2]}"#)
            .expect_err("filters must be an object");
    assert!(matches!(bad_filters, DecodeError::Shape { .. }));
}

#[test]
fn plan_decode_module_rejects_non_snake_case_table_names() {
    let upper = decode_plan(r#"{"operation":"SELECT","table":"Activities"}"#)
        .expect_err("table names are lowercase");
    assert!(matches!(upper, DecodeError::Shape { .. }));

    let hyphen = decode_plan(r#"{"operation":"SELECT","table":"auth-users"}"#)
        .expect_err("table names use underscores");
    assert!(matches!(hyphen, DecodeError::Shape { .. }));

    decode_plan(r#"{"operation":"SELECT","table":"wbs_items"}"#).expect("snake_case table");
}

#[test]
fn plan_decode_module_normalizes_verb_case() {
    let plan = decode_plan(r#"{"operation":"select","table":"costs"}"#).expect("plan");
    assert_eq!(plan.verb(), "SELECT");

    let mixed =
        decode_plan(r#"{"operation":"Update","table":"costs","data":{"amount":5},"filters":{}}"#)
            .expect("plan");
    assert_eq!(mixed.verb(), "UPDATE");
}
