//! End-to-end SELECT tests over in-memory collections.

use loupe::{
    Catalog, Engine, ExecutorError, HostFunction, NamedRow, QueryError, Signature, Type, Value,
};

#[derive(Debug, Clone)]
struct Foo {
    a: i64,
    b: String,
}
loupe::impl_record!(Foo { a, b });

#[allow(dead_code)]
struct Secret {
    a: i64,
    token: String,
}
loupe::impl_record!(Secret { a, .. });

#[derive(Debug, Default, PartialEq)]
struct Total {
    total: i64,
    label: String,
}
loupe::impl_from_row!(Total { total, label });

fn foos(rows: &[(i64, &str)]) -> Vec<Foo> {
    rows.iter()
        .map(|&(a, b)| Foo {
            a,
            b: b.to_string(),
        })
        .collect()
}

fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .add_table(
            "src",
            foos(&[(1, "hello"), (2, "world"), (3, "hello"), (4, "world"), (5, "hello")]),
        )
        .add_table("first", foos(&[(1, "A"), (2, "B"), (3, "C")]))
        .add_table("second", foos(&[(2, "X"), (3, "Y"), (4, "Z")]))
        .add_table("empty", Vec::<Foo>::new())
        .add_record("single", Secret {
            a: 7,
            token: "t".to_string(),
        });
    catalog
}

async fn query(sql: &str) -> Result<Vec<Vec<Value>>, QueryError> {
    Engine::new().collect(sql, &catalog()).await
}

async fn rows(sql: &str) -> Vec<Vec<Value>> {
    query(sql).await.unwrap_or_else(|e| panic!("{sql}: {e}"))
}

fn executor_error(result: Result<Vec<Vec<Value>>, QueryError>) -> ExecutorError {
    match result {
        Err(QueryError::Executor(e)) => e,
        other => panic!("expected executor error, got {:?}", other),
    }
}

fn row(values: &[Value]) -> Vec<Value> {
    values.to_vec()
}

fn int(n: i64) -> Value {
    Value::Int64(n)
}

fn text(s: &str) -> Value {
    Value::from(s)
}

// ============================================================================
// Filtering and projection
// ============================================================================

#[tokio::test]
async fn test_where_filters_rows() {
    let mut catalog = Catalog::new();
    catalog.add_table("src", foos(&[(1, "hello"), (2, "world"), (3, "hello")]));
    let result: Vec<Vec<Value>> = Engine::new()
        .collect("SELECT * FROM src WHERE A > 1", &catalog)
        .await
        .unwrap();
    assert_eq!(
        result,
        vec![row(&[int(2), text("world")]), row(&[int(3), text("hello")])]
    );
}

#[tokio::test]
async fn test_boolean_precedence() {
    let result = rows("SELECT A FROM src WHERE NOT A > 3 AND B = 'world' OR A = 5").await;
    assert_eq!(result, vec![row(&[int(2)]), row(&[int(5)])]);
}

#[tokio::test]
async fn test_decisive_side_masks_error() {
    // The right side compares text with an integer, but the left side
    // already decides AND.
    let result = rows("SELECT A FROM src WHERE A > 100 AND B > 1").await;
    assert!(result.is_empty());
    let result = rows("SELECT A FROM src WHERE A > 0 OR B > 1").await;
    assert_eq!(result.len(), 5);
    let err = executor_error(query("SELECT A FROM src WHERE A = 2 AND B > 1").await);
    assert!(matches!(err, ExecutorError::TypeMismatch { .. }));
}

#[tokio::test]
async fn test_expressions_and_functions() {
    let result = rows(
        "SELECT A * 2 + 1, B || '!', upper(B), substr(B, 1, 3), char_length(B), A / 2 \
         FROM src WHERE A = 2",
    )
    .await;
    assert_eq!(
        result,
        vec![row(&[
            int(5),
            text("world!"),
            text("WORLD"),
            text("orl"),
            int(5),
            Value::Float64(1.0),
        ])]
    );
}

#[tokio::test]
async fn test_like_and_in() {
    let result = rows("SELECT A FROM src WHERE B LIKE 'w%' AND A NOT IN (4, 5)").await;
    assert_eq!(result, vec![row(&[int(2)])]);
    let result = rows("SELECT A FROM src WHERE B ILIKE 'HEL_O' AND A IN (1, 5)").await;
    assert_eq!(result, vec![row(&[int(1)]), row(&[int(5)])]);
}

#[tokio::test]
async fn test_column_names() {
    let stream = Engine::new()
        .execute_sql("SELECT A, B AS label, lower(B), A + 1 FROM src", &catalog())
        .unwrap();
    assert_eq!(stream.columns(), ["A", "label", "lower", "?column?"]);
}

#[tokio::test]
async fn test_select_without_from() {
    assert_eq!(rows("SELECT 1 + 2, 'x'").await, vec![row(&[int(3), text("x")])]);
}

#[tokio::test]
async fn test_private_fields() {
    let err = executor_error(query("SELECT * FROM single").await);
    assert!(matches!(err, ExecutorError::PrivateFields { .. }));
    assert_eq!(rows("SELECT a FROM single").await, vec![row(&[int(7)])]);
}

#[tokio::test]
async fn test_idempotent() {
    let sql = "SELECT B, SUM(A) FROM src GROUP BY B ORDER BY B DESC";
    assert_eq!(rows(sql).await, rows(sql).await);
}

// ============================================================================
// Grouping and aggregation
// ============================================================================

#[tokio::test]
async fn test_group_by_sum_order_by_alias() {
    let result = rows("SELECT SUM(A) AS A, B FROM src GROUP BY B ORDER BY A").await;
    assert_eq!(
        result,
        vec![row(&[int(6), text("world")]), row(&[int(9), text("hello")])]
    );
}

#[tokio::test]
async fn test_having() {
    let result = rows("SELECT SUM(A) AS A, B FROM src GROUP BY B HAVING SUM(A) < 7").await;
    assert_eq!(result, vec![row(&[int(6), text("world")])]);
    let result = rows("SELECT SUM(A) AS A, B FROM src GROUP BY B HAVING A < 7").await;
    assert_eq!(result, vec![row(&[int(6), text("world")])]);
}

#[tokio::test]
async fn test_group_by_select_alias() {
    let result = rows("SELECT upper(B) AS g, COUNT(*) FROM src GROUP BY g ORDER BY g").await;
    assert_eq!(
        result,
        vec![row(&[text("HELLO"), int(3)]), row(&[text("WORLD"), int(2)])]
    );
}

#[tokio::test]
async fn test_aggregate_functions() {
    let result = rows(
        "SELECT COUNT(*), COUNT(DISTINCT B), SUM(A), AVG(A), MIN(B), MAX(A) FROM src",
    )
    .await;
    assert_eq!(
        result,
        vec![row(&[
            int(5),
            int(2),
            int(15),
            Value::Float64(3.0),
            text("hello"),
            int(5),
        ])]
    );
}

#[tokio::test]
async fn test_aggregates_over_empty_input() {
    let result = rows("SELECT COUNT(*), SUM(A), B FROM empty").await;
    assert_eq!(result, vec![row(&[int(0), Value::Null, Value::Null])]);
    let result = rows("SELECT B, COUNT(*) FROM empty GROUP BY B").await;
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_aggregate_placement_errors() {
    let err = executor_error(query("SELECT A FROM src WHERE SUM(A) > 1").await);
    assert!(matches!(err, ExecutorError::IllegalAggregate { .. }));
    let err = executor_error(query("SELECT SUM(COUNT(A)) FROM src").await);
    assert!(matches!(err, ExecutorError::NestedAggregate { .. }));
}

// ============================================================================
// Joins
// ============================================================================

#[tokio::test]
async fn test_inner_join() {
    let result = rows(
        "SELECT first.A, second.B FROM first JOIN second ON first.A = second.A",
    )
    .await;
    assert_eq!(result, vec![row(&[int(2), text("X")]), row(&[int(3), text("Y")])]);
}

#[tokio::test]
async fn test_left_join() {
    let result = rows(
        "SELECT first.A, second.B FROM first LEFT JOIN second ON first.A = second.A",
    )
    .await;
    assert_eq!(
        result,
        vec![
            row(&[int(1), Value::Null]),
            row(&[int(2), text("X")]),
            row(&[int(3), text("Y")]),
        ]
    );
}

#[tokio::test]
async fn test_right_join() {
    let result = rows(
        "SELECT second.A, first.B FROM first RIGHT JOIN second ON first.A = second.A",
    )
    .await;
    assert_eq!(
        result,
        vec![
            row(&[int(2), text("B")]),
            row(&[int(3), text("C")]),
            row(&[int(4), Value::Null]),
        ]
    );
}

#[tokio::test]
async fn test_join_with_aliases_and_three_tables() {
    let result = rows(
        "SELECT f.A, s.B, x.B FROM first f \
         JOIN second s ON f.A = s.A \
         LEFT JOIN src x ON x.A = s.A + 1",
    )
    .await;
    assert_eq!(
        result,
        vec![
            row(&[int(2), text("X"), text("hello")]),
            row(&[int(3), text("Y"), text("world")]),
        ]
    );
}

#[tokio::test]
async fn test_unsupported_joins() {
    for sql in [
        "SELECT * FROM first CROSS JOIN second",
        "SELECT * FROM first NATURAL JOIN second",
        "SELECT * FROM first, second",
        "SELECT * FROM first JOIN second USING (A)",
    ] {
        let err = executor_error(query(sql).await);
        assert!(matches!(err, ExecutorError::Unsupported(_)), "{sql}: {err}");
    }
}

// ============================================================================
// Ordering and limits
// ============================================================================

#[tokio::test]
async fn test_order_by_desc_reverses_distinct_keys() {
    let asc = rows("SELECT A FROM src ORDER BY A").await;
    let mut desc = rows("SELECT A FROM src ORDER BY A DESC").await;
    desc.reverse();
    assert_eq!(asc, desc);
}

#[tokio::test]
async fn test_order_by_ties_keep_arrival_order() {
    let result = rows("SELECT A FROM src ORDER BY B DESC").await;
    assert_eq!(
        result,
        vec![
            row(&[int(2)]),
            row(&[int(4)]),
            row(&[int(1)]),
            row(&[int(3)]),
            row(&[int(5)]),
        ]
    );
}

#[tokio::test]
async fn test_limit_and_offset() {
    assert_eq!(rows("SELECT A FROM src LIMIT 2").await.len(), 2);
    assert_eq!(rows("SELECT A FROM src LIMIT 100").await.len(), 5);
    assert_eq!(
        rows("SELECT A FROM src ORDER BY A DESC LIMIT 2 OFFSET 1").await,
        vec![row(&[int(4)]), row(&[int(3)])]
    );
    assert!(rows("SELECT A FROM src LIMIT 0").await.is_empty());
}

#[tokio::test]
async fn test_error_past_filled_limit_is_ignored() {
    // Only the first row passes without comparing text to an integer.
    let sql = "SELECT A FROM src WHERE A = 1 OR B > 1";
    for _ in 0..20 {
        assert_eq!(rows(&format!("{sql} LIMIT 1")).await, vec![row(&[int(1)])]);
    }
    let err = executor_error(query(&format!("{sql} LIMIT 2")).await);
    assert!(matches!(err, ExecutorError::TypeMismatch { .. }), "{err}");
    let err = executor_error(query(&format!("{sql} OFFSET 1")).await);
    assert!(matches!(err, ExecutorError::TypeMismatch { .. }), "{err}");
    let err = executor_error(query(&format!("{sql} ORDER BY A LIMIT 1")).await);
    assert!(matches!(err, ExecutorError::TypeMismatch { .. }), "{err}");
}

// ============================================================================
// Subqueries and UNION
// ============================================================================

#[tokio::test]
async fn test_in_subquery() {
    let result = rows("SELECT A FROM first WHERE A IN (SELECT A FROM second ORDER BY A DESC)").await;
    assert_eq!(result, vec![row(&[int(2)]), row(&[int(3)])]);
    let result = rows("SELECT A FROM first WHERE A NOT IN (SELECT A FROM second)").await;
    assert_eq!(result, vec![row(&[int(1)])]);
}

#[tokio::test]
async fn test_from_subquery() {
    let result = rows(
        "SELECT s.total FROM (SELECT A * 2 AS total FROM first) AS s WHERE s.total > 2",
    )
    .await;
    assert_eq!(result, vec![row(&[int(4)]), row(&[int(6)])]);
}

#[tokio::test]
async fn test_join_against_subquery() {
    let result = rows(
        "SELECT first.B, s.A FROM first JOIN (SELECT A FROM second) AS s ON first.A = s.A",
    )
    .await;
    assert_eq!(result, vec![row(&[text("B"), int(2)]), row(&[text("C"), int(3)])]);
}

#[tokio::test]
async fn test_union_all() {
    let stream = Engine::new()
        .execute_sql("SELECT A FROM first UNION ALL SELECT A AS other FROM second", &catalog())
        .unwrap();
    assert_eq!(stream.columns(), ["A"]);

    let mut result = rows("SELECT A FROM first UNION SELECT A FROM second").await;
    result.sort_by_key(|r| match r[0] {
        Value::Int64(n) => n,
        _ => unreachable!(),
    });
    assert_eq!(
        result,
        vec![
            row(&[int(1)]),
            row(&[int(2)]),
            row(&[int(2)]),
            row(&[int(3)]),
            row(&[int(3)]),
            row(&[int(4)]),
        ]
    );
}

#[tokio::test]
async fn test_union_column_count_mismatch() {
    let err = executor_error(query("SELECT A FROM first UNION SELECT A, B FROM second").await);
    assert_eq!(err, ExecutorError::ColumnCountMismatch { left: 1, right: 2 });
    let err = executor_error(query("SELECT A FROM first EXCEPT SELECT A FROM second").await);
    assert!(matches!(err, ExecutorError::NotImplemented(_)));
}

// ============================================================================
// Host bindings and errors
// ============================================================================

#[tokio::test]
async fn test_host_function() {
    let mut catalog = catalog();
    catalog.add_function(
        "twice",
        HostFunction::new(Signature::new([Type::Int], Type::Int), |args| match args {
            [Value::Int64(n)] => Ok(Value::Int64(n * 2)),
            _ => Err("bad arguments".to_string()),
        }),
    );
    catalog.add_function(
        "label",
        HostFunction::new(Signature::new([Type::Text], Type::Int), |_| {
            Ok(Value::from("12"))
        }),
    );
    let result: Vec<Vec<Value>> = Engine::new()
        .collect("SELECT TWICE(A), label(B) FROM first WHERE A = 3", &catalog)
        .await
        .unwrap();
    assert_eq!(result, vec![row(&[int(6), int(12)])]);
}

fn pick(fail_on: i64, panics: bool) -> HostFunction {
    HostFunction::new(Signature::new([Type::Int], Type::Int), move |args| match args {
        [Value::Int64(n)] if *n == fail_on && panics => panic!("cannot pick {n}"),
        [Value::Int64(n)] if *n == fail_on => Err(format!("cannot pick {n}")),
        [v] => Ok(v.clone()),
        _ => Err("bad arguments".to_string()),
    })
}

#[tokio::test]
async fn test_host_function_error_fails_the_query() {
    let mut catalog = catalog();
    catalog.add_function("pick", pick(3, false));
    let err = executor_error(
        Engine::new()
            .collect("SELECT pick(A) FROM src", &catalog)
            .await,
    );
    assert_eq!(
        err,
        ExecutorError::FunctionFailed {
            function: "pick".to_string(),
            message: "cannot pick 3".to_string(),
        }
    );
}

#[tokio::test]
async fn test_host_function_panic_fails_the_query() {
    let mut catalog = catalog();
    catalog.add_function("pick", pick(3, true));
    for sql in [
        "SELECT pick(A) FROM src",
        "SELECT A FROM src WHERE pick(A) > 0",
        "SELECT A FROM src ORDER BY pick(A)",
    ] {
        let err = executor_error(Engine::new().collect(sql, &catalog).await);
        assert!(
            matches!(&err, ExecutorError::FunctionFailed { function, message }
                if function == "pick" && message.contains("cannot pick 3")),
            "{sql}: {err}"
        );
    }
}

#[tokio::test]
async fn test_typed_rows() {
    let result: Vec<Total> = Engine::new()
        .collect(
            "SELECT B AS label, SUM(A) AS total FROM src GROUP BY B ORDER BY total",
            &catalog(),
        )
        .await
        .unwrap();
    assert_eq!(
        result,
        vec![
            Total {
                total: 6,
                label: "world".to_string(),
            },
            Total {
                total: 9,
                label: "hello".to_string(),
            },
        ]
    );

    let named: Vec<NamedRow> = Engine::new()
        .collect("SELECT A AS key FROM first LIMIT 1", &catalog())
        .await
        .unwrap();
    assert_eq!(named[0].get("KEY"), Some(&int(1)));
}

#[tokio::test]
async fn test_runtime_errors_fail_the_query() {
    let err = executor_error(query("SELECT A FROM src WHERE A > NULL").await);
    assert_eq!(err, ExecutorError::NullComparison { op: ">" });
    let err = executor_error(query("SELECT A FROM src WHERE A").await);
    assert!(matches!(err, ExecutorError::NotBoolean { value: Value::Int64(1) }));
    let err = executor_error(query("SELECT A % 0 FROM src").await);
    assert_eq!(err, ExecutorError::DivisionByZero);
}

#[tokio::test]
async fn test_plan_errors() {
    let err = executor_error(query("SELECT nope FROM src").await);
    assert!(matches!(err, ExecutorError::ColumnNotFound { .. }));
    let err = executor_error(query("SELECT x.A FROM src").await);
    assert!(matches!(err, ExecutorError::TableNotFound { .. }));
    let err = executor_error(query("SELECT DISTINCT A FROM src").await);
    assert!(matches!(err, ExecutorError::Unsupported(_)));
    let err = executor_error(query("SELECT CASE WHEN A = 1 THEN 1 END FROM src").await);
    assert!(matches!(err, ExecutorError::NotImplemented(_)));
    assert!(matches!(query("SELEC 1").await, Err(QueryError::Syntax(_))));
}
