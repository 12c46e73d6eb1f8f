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
fn module_exports_are_namespaced() {
    let e = ev();
    run(&e, "(module geo (define (area r) (* r r)))");
    assert_eq!(run(&e, "(geo/area 3)"), Value::Int(9));
    // the unqualified name does not leak into the global frame
    assert!(e.eval_source("(area 3)").is_err());
}

#[test]
fn module_redeclaration_is_idempotent() {
    let e = ev();
    run(&e, "(module geo (define (area r) (* r r)))");
    run(&e, "(module geo (define (area r) 0))");
    assert_eq!(run(&e, "(geo/area 3)"), Value::Int(9));
}

#[test]
fn module_bodies_fall_back_to_global() {
    let e = ev();
    run(&e, "(define scale 10)");
    run(&e, "(module m (define (scaled x) (* x scale)))");
    assert_eq!(run(&e, "(m/scaled 4)"), Value::Int(40));
}

#[test]
fn modules_do_not_share_private_names() {
    let e = ev();
    run(&e, "(module a (define secret 1) (define (peek) secret))");
    run(&e, "(module b (define (try-peek) secret))");
    assert_eq!(run(&e, "(a/peek)"), Value::Int(1));
    // `secret` resolves in a's frame, not in b's
    let err = e.eval_source("(b/try-peek)").unwrap_err();
    assert!(matches!(err, AniseError::UnboundSymbol(_)), "got {}", err);
}

#[test]
fn import_copies_exports_with_an_alias_prefix() {
    let e = ev();
    run(&e, "(module geo (define (area r) (* r r)))");
    run(&e, "(module shapes (import geo g) (define (square r) (g/area r)))");
    assert_eq!(run(&e, "(shapes/square 4)"), Value::Int(16));
}

#[test]
fn import_without_an_alias_is_unprefixed() {
    let e = ev();
    run(&e, "(module geo (define (area r) (* r r)))");
    run(&e, "(module flat (import geo) (define (sq r) (area r)))");
    assert_eq!(run(&e, "(flat/sq 5)"), Value::Int(25));
}

#[test]
fn importing_an_unknown_module_raises() {
    let e = ev();
    let err = e
        .eval_source("(module m (import nowhere))")
        .unwrap_err();
    assert!(matches!(err, AniseError::UnboundSymbol(_)), "got {}", err);
}

#[test]
fn same_frame_redefinition_raises() {
    let e = ev();
    run(&e, "(define x 1)");
    let err = e.eval_source("(define x 2)").unwrap_err();
    assert!(matches!(err, AniseError::AlreadyDefined(_)), "got {}", err);
    assert_eq!(run(&e, "x"), Value::Int(1));
}

#[test]
fn nested_shadowing_is_allowed_and_restored() {
    let e = ev();
    run(&e, "(define x 1)");
    assert_eq!(run(&e, "(let (x 2) (let (x 3) x))"), Value::Int(3));
    assert_eq!(run(&e, "(let (x 2) x)"), Value::Int(2));
    assert_eq!(run(&e, "x"), Value::Int(1));
}

#[test]
fn underscore_discards_the_binding() {
    let e = ev();
    run(&e, "(define _ 1)");
    run(&e, "(define _ 2)");
    let err = e.eval_source("_").unwrap_err();
    assert!(matches!(err, AniseError::UnboundSymbol(_)), "got {}", err);
}

#[test]
fn lambda_parameters_shadow_globals() {
    let e = ev();
    run(&e, "(define x 1)");
    run(&e, "(define (f x) (* x 10))");
    assert_eq!(run(&e, "(f 5)"), Value::Int(50));
    assert_eq!(run(&e, "x"), Value::Int(1));
}

#[test]
fn duplicate_parameters_are_rejected() {
    let e = ev();
    assert!(e.eval_source("(lambda (a a) a)").is_err());
    // `_` may repeat
    assert_eq!(run(&e, "((lambda (_ _ c) c) 1 2 3)"), Value::Int(3));
}

#[test]
fn variadic_parameters_collect_a_list() {
    let e = ev();
    run(&e, "(define (gather a & rest) (list a rest))");
    assert_eq!(
        run(&e, "(= (gather 1 2 3) (list 1 (list 2 3)))"),
        Value::Bool(true)
    );
    assert_eq!(
        run(&e, "(= (gather 1) (list 1 '()))"),
        Value::Bool(true)
    );
    assert!(e.eval_source("(gather)").is_err());
}
