//! Logical laws of compiled criteria, checked by evaluating the document
//! filter against generated documents.

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use sift_core::{CriteriaOperator, DynamicQuery, QueryBuilder};
use sift_query::{DocumentCompiler, DocumentFilter, QueryCompiler};

const FIELDS: [&str; 3] = ["a", "b", "dept.c"];

#[derive(Debug, Clone, Copy)]
enum Op {
    Eq,
    Gt,
    Lt,
}

#[derive(Debug, Clone, Copy)]
struct Check {
    field: usize,
    op: Op,
    value: i64,
}

/// Field slot: absent, explicit null, or a number
type Slot = Option<Option<i64>>;

fn slot_strategy() -> impl Strategy<Value = Slot> {
    prop_oneof![
        1 => Just(None),
        1 => Just(Some(None)),
        4 => (0i64..4).prop_map(|v| Some(Some(v))),
    ]
}

fn check_strategy() -> impl Strategy<Value = Check> {
    (0usize..3, 0u8..3, 0i64..4).prop_map(|(field, op, value)| Check {
        field,
        op: match op {
            0 => Op::Eq,
            1 => Op::Gt,
            _ => Op::Lt,
        },
        value,
    })
}

fn document(slots: &[Slot; 3]) -> Value {
    let mut root = Map::new();
    for (name, slot) in ["a", "b"].iter().zip(slots.iter()) {
        if let Some(value) = slot {
            root.insert(name.to_string(), json!(value));
        }
    }
    if let Some(value) = slots[2] {
        root.insert("dept".to_string(), json!({"c": value}));
    }
    Value::Object(root)
}

/// Relation stored as an array of sub-documents, each with an `n` slot
fn roles_document(roles: &[Slot]) -> Value {
    let elements: Vec<Value> = roles
        .iter()
        .map(|slot| match slot {
            None => json!({}),
            Some(value) => json!({"n": value}),
        })
        .collect();
    json!({"roles": elements})
}

fn holds(check: &Check, slots: &[Slot; 3]) -> bool {
    match slots[check.field] {
        Some(Some(x)) => match check.op {
            Op::Eq => x == check.value,
            Op::Gt => x > check.value,
            Op::Lt => x < check.value,
        },
        _ => false,
    }
}

fn add(builder: QueryBuilder, check: &Check) -> QueryBuilder {
    let field = FIELDS[check.field];
    match check.op {
        Op::Eq => builder.equal(field, check.value),
        Op::Gt => builder.greater_than(field, check.value),
        Op::Lt => builder.less_than(field, check.value),
    }
}

fn filter(query: &DynamicQuery) -> DocumentFilter {
    DocumentCompiler::default()
        .compile(query, "docs")
        .expect("query compiles")
        .native
        .filter
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn test_or_of_ands(
        groups in prop::collection::vec(prop::collection::vec(check_strategy(), 1..4), 1..4),
        slots in [slot_strategy(), slot_strategy(), slot_strategy()],
    ) {
        let mut builder = DynamicQuery::builder();
        for (i, group) in groups.iter().enumerate() {
            if i > 0 {
                builder = builder.or();
            }
            for check in group {
                builder = add(builder, check);
            }
        }

        let expected = groups.iter().any(|group| group.iter().all(|c| holds(c, &slots)));
        prop_assert_eq!(filter(&builder.build()).matches(&document(&slots)), expected);
    }

    #[test]
    fn test_without_or_is_one_and_group(
        checks in prop::collection::vec(check_strategy(), 1..5),
        slots in [slot_strategy(), slot_strategy(), slot_strategy()],
    ) {
        let query = checks.iter().fold(DynamicQuery::builder(), add).build();
        let expected = checks.iter().all(|c| holds(c, &slots));
        prop_assert_eq!(filter(&query).matches(&document(&slots)), expected);
    }

    #[test]
    fn test_equal_and_not_equal_many(
        field in 0usize..3,
        values in prop::collection::vec(0i64..4, 1..4),
        slots in [slot_strategy(), slot_strategy(), slot_strategy()],
    ) {
        let key = FIELDS[field];
        let wire: Vec<Value> = values.iter().map(|v| json!(v)).collect();
        let doc = document(&slots);

        let equal = DynamicQuery::builder()
            .filter(key, CriteriaOperator::Equal, wire.clone())
            .build();
        let not_equal = DynamicQuery::builder()
            .filter(key, CriteriaOperator::NotEqual, wire)
            .build();

        let present = matches!(slots[field], Some(Some(_)));
        let member = matches!(slots[field], Some(Some(x)) if values.contains(&x));

        prop_assert_eq!(filter(&equal).matches(&doc), member);
        prop_assert_eq!(filter(&not_equal).matches(&doc), present && !member);
    }

    #[test]
    fn test_specified_is_exact_complement(
        key in prop::sample::select(vec!["a", "b", "dept.c", "dept<c"]),
        slots in [slot_strategy(), slot_strategy(), slot_strategy()],
    ) {
        let doc = document(&slots);
        let specified = DynamicQuery::builder().specified(key, true).build();
        let unspecified = DynamicQuery::builder().specified(key, false).build();

        prop_assert_ne!(filter(&specified).matches(&doc), filter(&unspecified).matches(&doc));
    }

    #[test]
    fn test_nested_array_equal_and_not_equal(
        values in prop::collection::vec(0i64..4, 1..4),
        roles in prop::collection::vec(slot_strategy(), 0..5),
    ) {
        let wire: Vec<Value> = values.iter().map(|v| json!(v)).collect();
        let doc = roles_document(&roles);

        let equal = DynamicQuery::builder()
            .filter("roles.n", CriteriaOperator::Equal, wire.clone())
            .build();
        let not_equal = DynamicQuery::builder()
            .filter("roles.n", CriteriaOperator::NotEqual, wire)
            .build();

        let some_member = roles
            .iter()
            .any(|slot| matches!(slot, Some(Some(x)) if values.contains(x)));
        let some_other = roles
            .iter()
            .any(|slot| matches!(slot, Some(Some(x)) if !values.contains(x)));

        prop_assert_eq!(filter(&equal).matches(&doc), some_member);
        prop_assert_eq!(filter(&not_equal).matches(&doc), some_other);
    }

    #[test]
    fn test_nested_array_specified_is_exact_complement(
        key in prop::sample::select(vec!["roles.n", "roles<n"]),
        roles in prop::collection::vec(slot_strategy(), 0..5),
    ) {
        let doc = roles_document(&roles);
        let specified = DynamicQuery::builder().specified(key, true).build();
        let unspecified = DynamicQuery::builder().specified(key, false).build();

        let expected = if key == "roles<n" {
            !roles.is_empty()
        } else {
            roles.iter().any(|slot| matches!(slot, Some(Some(_))))
        };
        prop_assert_eq!(filter(&specified).matches(&doc), expected);
        prop_assert_eq!(filter(&unspecified).matches(&doc), !expected);
    }
}

#[test]
fn test_left_join_specified_follows_parent() {
    let query = DynamicQuery::builder().specified("dept<c", true).build();
    let compiled = filter(&query);

    assert!(compiled.matches(&json!({"dept": {"c": null}})));
    assert!(!compiled.matches(&json!({"a": 1})));
}
