use anise_core::ast::Value;
use anise_core::error::AniseError;
use anise_core::Evaluator;

fn ev() -> Evaluator {
    Evaluator::new().expect("bootstrap")
}

fn run(evaluator: &Evaluator, src: &str) -> Value {
    evaluator
        .eval_source(src)
        .unwrap_or_else(|e| panic!("{} failed: {}", src, e))
}

#[test]
fn unbound_symbols_report_their_name() {
    let e = ev();
    let err = e.eval_source("nope").unwrap_err();
    assert!(matches!(err, AniseError::UnboundSymbol(_)), "got {}", err);
    assert_eq!(err.message(), "nope");
}

#[test]
fn calling_a_non_function_is_an_application_error() {
    let e = ev();
    let err = e.eval_source("(3 4)").unwrap_err();
    assert!(matches!(err, AniseError::Application(_)), "got {}", err);
}

#[test]
fn arity_mismatches_name_the_function() {
    let e = ev();
    run(&e, "(define (two a b) a)");
    let err = e.eval_source("(two 1)").unwrap_err();
    assert!(matches!(err, AniseError::Arity(_)), "got {}", err);
    assert!(err.message().contains("two"));
}

#[test]
fn info_tags_match_the_error_kind() {
    let e = ev();
    assert_eq!(
        run(&e, "(try* missing (catch e (error-info e)))"),
        Value::symbol("unbound-symbol")
    );
    assert_eq!(
        run(&e, "(try* ((lambda (x) x)) (catch e (error-info e)))"),
        Value::symbol("arity-error")
    );
    assert_eq!(
        run(&e, "(try* (first 3) (catch e (error-info e)))"),
        Value::symbol("type-error")
    );
    assert_eq!(
        run(&e, "(try* (3) (catch e (error-info e)))"),
        Value::symbol("runtime-error")
    );
}

#[test]
fn catch_binds_the_error_object_in_a_fresh_frame() {
    let e = ev();
    assert_eq!(
        run(&e, "(try* (error! \"oops\") (catch e (error-msg e)))"),
        Value::string("oops")
    );
    // the binding does not escape the handler
    assert!(e.eval_source("e").is_err());
}

#[test]
fn try_returns_the_body_value_when_nothing_raises() {
    let e = ev();
    assert_eq!(run(&e, "(try* (+ 1 2) (catch e :caught))"), Value::Int(3));
}

#[test]
fn catch_validator_can_veto() {
    let e = ev();
    // validator accepts: the handler runs
    assert_eq!(
        run(
            &e,
            "(try* (error! \"boom\" 'custom) \
               (catch (lambda (err) (= (error-info err) 'custom)) e :handled))"
        ),
        Value::keyword("handled")
    );
    // validator rejects: the original error re-raises
    let err = e
        .eval_source(
            "(try* (error! \"boom\" 'other) \
               (catch (lambda (err) (= (error-info err) 'custom)) e :handled))",
        )
        .unwrap_err();
    assert!(matches!(err, AniseError::Custom(_, _)), "got {}", err);
}

#[test]
fn catch_discard_slot_skips_the_validator() {
    let e = ev();
    // `_` in the validator slot: no validator, the error binds to `e`
    assert_eq!(
        run(
            &e,
            "(try* (error! \"boom\" 'custom) (catch _ e (error-info e)))"
        ),
        Value::symbol("custom")
    );
}

#[test]
fn errors_carry_the_call_trace() {
    let e = ev();
    run(&e, "(define (inner) missing)");
    run(&e, "(define (outer) (inner))");
    let err = e.eval_source("(outer)").unwrap_err();
    let trace = err.trace();
    assert!(trace.iter().any(|f| f == "inner"), "trace: {:?}", trace);
    assert!(trace.iter().any(|f| f == "outer"), "trace: {:?}", trace);
}

#[test]
fn error_trace_is_visible_to_interpreted_code() {
    let e = ev();
    run(&e, "(define (inner) missing)");
    assert_eq!(
        run(
            &e,
            "(try* (inner) (catch e (contains? (error-trace e) \"inner\")))"
        ),
        Value::Bool(true)
    );
}

#[test]
fn nested_try_rethrows_outward() {
    let e = ev();
    assert_eq!(
        run(
            &e,
            "(try* (try* (error! \"inner\") (catch e (error! \"outer\"))) \
               (catch e (error-msg e)))"
        ),
        Value::string("outer")
    );
}

#[test]
fn duplicate_generic_registration_raises() {
    let e = ev();
    run(&e, "(def-generic x (show x) (lambda (x) :fallback))");
    run(&e, "(define ::int show (lambda (x) :first))");
    let err = e
        .eval_source("(define ::int show (lambda (x) :second))")
        .unwrap_err();
    assert!(
        matches!(err, AniseError::Reimplementation(_)),
        "got {}",
        err
    );
    assert_eq!(run(&e, "(show 1)"), Value::keyword("first"));
}
