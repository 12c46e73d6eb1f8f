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
fn let_binds_and_evaluates() {
    let e = ev();
    assert_eq!(run(&e, "(let (x 1 y 2) (+ x y))"), Value::Int(3));
    assert_eq!(run(&e, "(let ((x 1) (y 2)) (+ x y))"), Value::Int(3));
}

#[test]
fn let_star_sees_earlier_bindings() {
    let e = ev();
    assert_eq!(run(&e, "(let* (x 1 y (+ x 1)) y)"), Value::Int(2));
    assert_eq!(run(&e, "(let* ((x 1) (y (+ x 1))) y)"), Value::Int(2));
}

#[test]
fn let_rejects_malformed_binding_pairs() {
    let e = ev();
    assert!(e.eval_source("(let (x 1 y) y)").is_err());
    assert!(e.eval_source("(let ((x 1 2)) x)").is_err());
    assert!(e.eval_source("(let ((1 x)) x)").is_err());
}

#[test]
fn factorial_of_five() {
    let e = ev();
    run(&e, "(define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))");
    assert_eq!(run(&e, "(fact 5)"), Value::Int(120));
}

#[test]
fn caught_error_exposes_its_info_tag() {
    let e = ev();
    assert_eq!(
        run(&e, "(try* (error! \"boom\" 'custom) (catch e (error-info e)))"),
        Value::symbol("custom")
    );
}

#[test]
fn map_get_finds_the_value() {
    let e = ev();
    assert_eq!(run(&e, "(map-get {:a 1 :b 2} :b)"), Value::Int(2));
    assert_eq!(run(&e, "(map-get (map-of \"a\" 1 \"b\" 2) \"b\")"), Value::Int(2));
}

#[test]
fn map_of_requires_paired_arguments() {
    let e = ev();
    assert_eq!(run(&e, "(size (map-of))"), Value::Int(0));
    let err = e.eval_source("(map-of :odd)").unwrap_err();
    assert!(matches!(err, AniseError::Arity(_)), "got {}", err);
}

#[test]
fn define_returns_the_name() {
    let e = ev();
    assert_eq!(run(&e, "(define seven 7)"), Value::symbol("seven"));
    assert_eq!(run(&e, "seven"), Value::Int(7));
}

#[test]
fn collection_literals_evaluate_their_elements() {
    let e = ev();
    run(&e, "(define five 5)");
    assert_eq!(run(&e, "(get [five (+ 1 2)] 0)"), Value::Int(5));
    assert_eq!(run(&e, "(get [five (+ 1 2)] 1)"), Value::Int(3));
    assert_eq!(run(&e, "(map-get {:a (+ 1 2)} :a)"), Value::Int(3));
    // quoting suppresses the evaluation
    assert_eq!(run(&e, "(get '[five] 0)"), Value::symbol("five"));
}

#[test]
fn truthiness_rules() {
    let e = ev();
    assert_eq!(run(&e, "(if 0 :a :b)"), Value::keyword("a"));
    assert_eq!(run(&e, "(if \"\" :a :b)"), Value::keyword("a"));
    assert_eq!(run(&e, "(if '() :a :b)"), Value::keyword("b"));
    assert_eq!(run(&e, "(if Nothing :a :b)"), Value::keyword("b"));
    assert_eq!(run(&e, "(if #f :a :b)"), Value::keyword("b"));
    assert_eq!(run(&e, "(if [] :a :b)"), Value::keyword("a"));
}

#[test]
fn cond_picks_the_first_truthy_clause() {
    let e = ev();
    assert_eq!(
        run(&e, "(cond #f :no (= 1 1) :yes #t :late)"),
        Value::keyword("yes")
    );
    assert_eq!(run(&e, "(cond #f :no)"), Value::Nothing);
}

#[test]
fn division_builds_rationals() {
    let e = ev();
    assert_eq!(
        run(&e, "(/ 1 2)"),
        Value::Rational(num_rational::Rational64::new(1, 2))
    );
    assert_eq!(run(&e, "(+ 1/2 1/2)"), Value::Int(1));
    assert_eq!(run(&e, "(/ 4 2)"), Value::Int(2));
    assert_eq!(run(&e, "(/ 1.0 2)"), Value::Float(0.5));
    assert!(e.eval_source("(/ 1 0)").is_err());
}

#[test]
fn hash_lambda_placeholders() {
    let e = ev();
    assert_eq!(run(&e, "(#(+ %1 %2) 1 2)"), Value::Int(3));
    assert_eq!(run(&e, "(#(size %*) 1 2 3)"), Value::Int(3));
    assert_eq!(run(&e, "(#(first %&) 9 8)"), Value::Int(9));
    assert_eq!(run(&e, "(#(* % 2) 21)"), Value::Int(42));
    // unused slots bind Nothing
    assert_eq!(run(&e, "(#(nothing? %2) 1)"), Value::Bool(true));
}

#[test]
fn quasiquote_templates() {
    let e = ev();
    run(&e, "(define x 5)");
    let expected = run(&e, "(list 'a 5 1 2)");
    assert_eq!(run(&e, "`(a ~x ~@(list 1 2))"), expected);
    assert_eq!(run(&e, "`[~x ~@(list 1 2)]"), run(&e, "(vector 5 1 2)"));
}

#[test]
fn record_types() {
    let e = ev();
    run(&e, "(def-type point x y)");
    run(&e, "(define p (make-point 1 2))");
    assert_eq!(run(&e, "(point? p)"), Value::Bool(true));
    assert_eq!(run(&e, "(point? 3)"), Value::Bool(false));
    assert_eq!(run(&e, "(point-x p)"), Value::Int(1));
    assert_eq!(run(&e, "(point-y p)"), Value::Int(2));
    assert_eq!(run(&e, "(= (type-of p) ::point)"), Value::Bool(true));
    assert!(e.eval_source("(point-x 3)").is_err());
}

#[test]
fn memoize_skips_repeat_work() {
    let e = ev();
    run(&e, "(define calls (box 0))");
    run(
        &e,
        "(define inc (memoize (lambda (n) \
           (box-set! calls (+ (unbox calls) 1)) (+ n 1))))",
    );
    assert_eq!(run(&e, "(inc 4)"), Value::Int(5));
    assert_eq!(run(&e, "(inc 4)"), Value::Int(5));
    assert_eq!(run(&e, "(unbox calls)"), Value::Int(1));
    assert_eq!(run(&e, "(inc 5)"), Value::Int(6));
    assert_eq!(run(&e, "(unbox calls)"), Value::Int(2));
}

#[test]
fn partial_and_apply() {
    let e = ev();
    assert_eq!(run(&e, "((partial + 1) 2)"), Value::Int(3));
    assert_eq!(run(&e, "(apply + 1 '(2 3))"), Value::Int(6));
    assert_eq!(run(&e, "(apply list '(1 2))"), run(&e, "(list 1 2)"));
}

#[test]
fn generic_dispatch_and_fallback() {
    let e = ev();
    run(
        &e,
        "(def-generic obj (describe obj) (lambda (obj) :fallback))",
    );
    run(&e, "(define ::int describe (lambda (n) :int))");
    assert_eq!(run(&e, "(describe 3)"), Value::keyword("int"));
    assert_eq!(run(&e, "(describe \"s\")"), Value::keyword("fallback"));
}

#[test]
fn reserved_symbols_cannot_be_called_directly() {
    let e = ev();
    assert!(e.eval_source("((id if) 1 2 3)").is_err());
    assert!(e.eval_source("(define if 3)").is_err());
}

#[test]
fn higher_order_primitives() {
    let e = ev();
    assert_eq!(
        run(&e, "(map #(+ %1 1) '(1 2 3))"),
        run(&e, "(list 2 3 4)")
    );
    assert_eq!(
        run(&e, "(filter #(< %1 3) '(1 2 3 4))"),
        run(&e, "(list 1 2)")
    );
    assert_eq!(run(&e, "(foldl + 0 (range 1 5))"), Value::Int(10));
}

#[test]
fn impure_names_disable_elision() {
    let e = ev();
    e.set_aggressive_optimization(true);
    run(&e, "(define hits (box 0))");
    run(
        &e,
        "(define (f) (box-set! hits (+ (unbox hits) 1)) :done)",
    );
    run(&e, "(f)");
    assert_eq!(run(&e, "(unbox hits)"), Value::Int(1));
    // a pure non-final expression is skipped under the aggressive path
    run(&e, "(define (g) (+ 1 2) :done)");
    assert_eq!(run(&e, "(g)"), Value::keyword("done"));
}
