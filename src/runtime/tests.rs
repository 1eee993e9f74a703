use super::*;
use crate::language::parser::parse_program;
use serde_json::{json, Value as Json};

fn run_with(interpreter: &Interpreter, source: &str, input: Json) -> Vec<RuntimeResult<Json>> {
    let program = parse_program(source).expect("parse");
    let results = interpreter
        .evaluate(&program, Value::from(input))
        .map(|item| item.map(|value| value.to_json()))
        .collect();
    results
}

fn run(source: &str, input: Json) -> Vec<RuntimeResult<Json>> {
    run_with(&Interpreter::default(), source, input)
}

fn values(source: &str, input: Json) -> Vec<Json> {
    run(source, input)
        .into_iter()
        .collect::<RuntimeResult<Vec<_>>>()
        .expect("evaluation failed")
}

fn single_error(source: &str, input: Json) -> RuntimeError {
    let mut results = run(source, input);
    match results.pop() {
        Some(Err(err)) => err,
        other => panic!("expected the stream to end in an error, got {other:?}"),
    }
}

#[test]
fn filter_arguments_run_against_the_call_input() {
    let source = "def add_mul(adder; multiplier): (. + adder) * multiplier; 10 | add_mul(. + 5; . - 2)";
    assert_eq!(values(source, json!(null)), vec![json!(200)]);
}

#[test]
fn accumulator_style_map_with_overloads() {
    let source = "def my_map($accumulator; func): if length==0 then $accumulator \
                  else first as $elem | .[1:] | my_map($accumulator + [$elem|func]; func) end; \
                  def my_map(func): my_map([]; func); [1,2,3,4] | my_map(.*10)";
    assert_eq!(values(source, json!(null)), vec![json!([10, 20, 30, 40])]);
}

#[test]
fn definitions_are_not_visible_before_they_are_declared() {
    let err = single_error("def a: b(1); def b(x): x; a", json!(null));
    assert_eq!(
        err,
        RuntimeError::UndefinedFunction {
            name: "b".into(),
            arity: 1
        }
    );
}

#[test]
fn definitions_resolve_lexically_not_dynamically() {
    let source = "def x: 1; def f: x; def x: 2; [f, x]";
    assert_eq!(values(source, json!(null)), vec![json!([1, 2])]);
}

#[test]
fn same_name_different_arity_are_distinct() {
    let source = r#"def f: "zero"; def f(a): "one"; def f(a; b): "two"; [f, f(1), f(1; 2)]"#;
    assert_eq!(values(source, json!(null)), vec![json!(["zero", "one", "two"])]);
}

#[test]
fn calling_with_an_unknown_arity_is_undefined() {
    let err = single_error("def f(a): a; f(1; 2)", json!(null));
    assert_eq!(
        err,
        RuntimeError::UndefinedFunction {
            name: "f".into(),
            arity: 2
        }
    );
}

#[test]
fn nested_definitions_stay_local() {
    let source = "def outer: def inner: 1; inner + 1; outer, inner";
    let results = run(source, json!(null));
    assert_eq!(results[0], Ok(json!(2)));
    assert_eq!(
        results[1],
        Err(RuntimeError::UndefinedFunction {
            name: "inner".into(),
            arity: 0
        })
    );
    assert_eq!(results.len(), 2);
}

#[test]
fn nested_definitions_see_enclosing_parameters() {
    let source = "def outer(f): def inner: f * 2; inner; 3 | outer(. + 1)";
    assert_eq!(values(source, json!(null)), vec![json!(8)]);
}

#[test]
fn parameters_shadow_outer_functions_for_one_invocation() {
    let source = r#"def code: "outer"; def equals($code): code == $code; [equals("x"), code]"#;
    assert_eq!(values(source, json!(null)), vec![json!([true, "outer"])]);
}

#[test]
fn user_definitions_shadow_builtins() {
    let source = "def length: 42; [1, 2] | length";
    assert_eq!(values(source, json!(null)), vec![json!(42)]);
}

#[test]
fn materialized_parameter_runs_body_once_per_value() {
    let source = "def f($a; b): [$a, b]; f(5, 4; 1)";
    assert_eq!(values(source, json!(null)), vec![json!([5, 1]), json!([4, 1])]);
}

#[test]
fn materialized_parameters_form_a_cross_product() {
    let source = "def g($a; $b): [$a, $b]; [g(1, 2; 3, 4)]";
    assert_eq!(
        values(source, json!(null)),
        vec![json!([[1, 3], [1, 4], [2, 3], [2, 4]])]
    );
}

#[test]
fn materialized_parameter_is_also_a_filter() {
    let source = "def f($x): [x, $x]; f(.a)";
    assert_eq!(values(source, json!({"a": 7})), vec![json!([7, 7])]);
}

#[test]
fn filter_arguments_are_evaluated_each_time_they_are_referenced() {
    let source = "def twice(f): [f, (. + 1 | f)]; 1 | twice(. * 10)";
    assert_eq!(values(source, json!(null)), vec![json!([10, 20])]);
}

#[test]
fn multi_output_filter_arguments_stream_through() {
    let source = "def f(g): [g]; f(1, 2, 3)";
    assert_eq!(values(source, json!(null)), vec![json!([1, 2, 3])]);
}

#[test]
fn tail_recursion_runs_in_constant_space() {
    let source = "def count_up: if . >= 100000 then . else . + 1 | count_up end; 0 | count_up";
    assert_eq!(values(source, json!(null)), vec![json!(100000)]);
}

#[test]
fn tail_recursion_through_local_definitions_and_bindings() {
    let source = "def count_up: def label: \"count\"; \
                  if . < 100000 then (. + 1) as $n | $n | count_up else {(label): .} end; \
                  0 | count_up";
    assert_eq!(values(source, json!(null)), vec![json!({"count": 100000})]);
}

#[test]
fn tail_recursion_keeps_sibling_outputs() {
    let source = "def down: if . > 0 then (. - 1, . - 2) | down else . end; [3 | down]";
    assert_eq!(values(source, json!(null)), vec![json!([0, -1, 0, 0, -1])]);
}

#[test]
fn tail_recursion_does_not_pull_pending_siblings() {
    let source = "def spin: spin; \
                  def f: if . == 0 then \"done\" else (. - 1, spin) | f end; \
                  first(3 | f)";
    assert_eq!(values(source, json!(null)), vec![json!("done")]);
}

#[test]
fn non_tail_recursion_close_to_the_default_limit() {
    let by_input = "def depth: if . == 0 then 0 else (. - 1 | depth) + 1 end; 1000 | depth";
    assert_eq!(values(by_input, json!(null)), vec![json!(1000)]);
    let by_argument = "def f($n): if $n == 0 then 0 else f($n - 1) + 1 end; f(1000)";
    assert_eq!(values(by_argument, json!(null)), vec![json!(1000)]);
}

#[test]
fn deep_filter_argument_chains() {
    let source = "def f(g; $n): if $n == 0 then g else f(g + 1; $n - 1) end; f(0; 1000)";
    assert_eq!(values(source, json!(null)), vec![json!(1000)]);
}

#[test]
fn default_limit_reports_runaway_recursion() {
    let source = "def forever: (. + 1 | forever) + 1; 0 | forever";
    assert_eq!(
        run(source, json!(null)),
        vec![Err(RuntimeError::DepthExceeded {
            limit: Options::default().max_depth
        })]
    );
}

#[test]
fn arithmetic_extremes_are_values_or_errors() {
    assert_eq!(
        values("(-9223372036854775808) % -1", json!(null)),
        vec![json!(0)]
    );
    assert!(matches!(
        single_error(r#""ab" * 1e19"#, json!(null)),
        RuntimeError::TypeMismatch { .. }
    ));
}

#[test]
fn non_tail_recursion_nests() {
    let source = "def depth: if . == 0 then 0 else (. - 1 | depth) + 1 end; 40 | depth";
    assert_eq!(values(source, json!(null)), vec![json!(40)]);
}

#[test]
fn non_tail_recursion_stops_at_the_depth_limit() {
    let interpreter = Interpreter::new(Options { max_depth: 50 });
    let source = "def depth: if . == 0 then 0 else (. - 1 | depth) + 1 end; 5000 | depth";
    let results = run_with(&interpreter, source, json!(null));
    assert_eq!(
        results,
        vec![Err(RuntimeError::DepthExceeded { limit: 50 })]
    );
}

#[test]
fn infinite_generators_are_consumed_lazily() {
    let source = "def nat: ., (. + 1 | nat); [limit(5; 0 | nat)], first(10 | nat)";
    assert_eq!(
        values(source, json!(null)),
        vec![json!([0, 1, 2, 3, 4]), json!(10)]
    );
}

#[test]
fn an_error_ends_the_stream_after_earlier_outputs() {
    let results = run(r#"1, error("boom"), 3"#, json!(null));
    assert_eq!(
        results,
        vec![
            Ok(json!(1)),
            Err(RuntimeError::User {
                value: Value::string("boom")
            })
        ]
    );
}

#[test]
fn errors_inside_a_function_propagate_to_the_caller() {
    let err = single_error("def f: .a; 1 | f", json!(null));
    assert!(matches!(err, RuntimeError::Index { .. }), "{err:?}");
}

#[test]
fn undefined_variables_are_reported() {
    let err = single_error("$nope", json!(null));
    assert_eq!(
        err,
        RuntimeError::UndefinedVariable {
            name: "nope".into()
        }
    );
}

#[test]
fn interpreter_variables_are_visible_everywhere() {
    let interpreter = Interpreter::default().with_var("greeting", Value::string("hi"));
    let results = run_with(&interpreter, "def f: $greeting; f", json!(null));
    assert_eq!(results, vec![Ok(json!("hi"))]);
}

#[test]
fn binary_operators_iterate_the_right_side_outermost() {
    assert_eq!(
        values("[(1, 2) + (10, 20)]", json!(null)),
        vec![json!([11, 12, 21, 22])]
    );
}

#[test]
fn reduce_and_bindings() {
    assert_eq!(
        values("reduce .[] as $x (0; . + $x)", json!([1, 2, 3])),
        vec![json!(6)]
    );
    assert_eq!(
        values(". as $x | [$x, $x]", json!(3)),
        vec![json!([3, 3])]
    );
}

#[test]
fn alternative_falls_back_on_false_null_and_errors() {
    assert_eq!(values(r#".missing // "default""#, json!({})), vec![json!("default")]);
    assert_eq!(values("(1, null, 2) // 3", json!(null)), vec![json!(1), json!(2)]);
    assert_eq!(values(r#"error("x") // 1"#, json!(null)), vec![json!(1)]);
}

#[test]
fn object_construction_forms() {
    let source = r#"{a: 1, "b": 2, (.k): 3, k, $v}"#;
    let interpreter = Interpreter::default().with_var("v", Value::from(true));
    let results = run_with(&interpreter, source, json!({"k": "c"}));
    assert_eq!(
        results,
        vec![Ok(json!({"a": 1, "b": 2, "c": 3, "k": "c", "v": true}))]
    );
}

#[test]
fn if_without_else_passes_input_through() {
    assert_eq!(
        values("[.[] | if . > 1 then . * 10 end]", json!([1, 2])),
        vec![json!([1, 20])]
    );
}

#[test]
fn builtins_cover_common_filters() {
    assert_eq!(
        values("[.[] | select(. % 2 == 0)] | map(. + 1)", json!([1, 2, 3, 4])),
        vec![json!([3, 5])]
    );
    assert_eq!(
        values("[range(3)], [range(2; 4)], (keys | add), ([.[]] | length)", json!({"x": 1, "y": 2})),
        vec![json!([0, 1, 2]), json!([2, 3]), json!("xy"), json!(2)]
    );
    assert_eq!(values("[..]", json!({"a": [1]})), vec![json!([{"a": [1]}, [1], 1])]);
    assert_eq!(values("[.[] | tostring]", json!([1, "a"])), vec![json!(["1", "a"])]);
}
