use anise_core::ast::Value;
use anise_core::Evaluator;

fn ev() -> Evaluator {
    Evaluator::new().expect("bootstrap")
}

fn run(evaluator: &Evaluator, src: &str) -> Value {
    evaluator
        .eval_source(src)
        .unwrap_or_else(|e| panic!("{} failed: {}", src, e))
}

fn setup_counting_macro(e: &Evaluator) {
    run(e, "(define expansions (box 0))");
    run(
        e,
        "(def-macro (twice form) \
           (box-set! expansions (+ (unbox expansions) 1)) \
           (list 'list form form))",
    );
}

#[test]
fn macros_receive_unevaluated_forms() {
    let e = ev();
    run(&e, "(def-macro (quoting form) (list 'quote form))");
    assert_eq!(run(&e, "(quoting (+ 1 2))"), run(&e, "'(+ 1 2)"));
}

#[test]
fn repeated_evaluation_of_the_same_call_site_expands_once() {
    let e = ev();
    setup_counting_macro(&e);
    run(&e, "(define (f) (twice 1))");
    assert_eq!(run(&e, "(f)"), run(&e, "(list 1 1)"));
    assert_eq!(run(&e, "(f)"), run(&e, "(list 1 1)"));
    assert_eq!(run(&e, "(f)"), run(&e, "(list 1 1)"));
    assert_eq!(run(&e, "(unbox expansions)"), Value::Int(1));
}

#[test]
fn distinct_call_sites_expand_independently() {
    let e = ev();
    setup_counting_macro(&e);
    run(&e, "(define (f) (twice 1))");
    run(&e, "(define (g) (twice 2))");
    run(&e, "(f)");
    run(&e, "(g)");
    assert_eq!(run(&e, "(unbox expansions)"), Value::Int(2));
    assert_eq!(run(&e, "(g)"), run(&e, "(list 2 2)"));
    assert_eq!(run(&e, "(unbox expansions)"), Value::Int(2));
}

#[test]
fn macro_results_reflect_the_rewrite() {
    let e = ev();
    run(&e, "(def-macro (always-five) 5)");
    run(&e, "(define (f) (always-five))");
    assert_eq!(run(&e, "(f)"), Value::Int(5));
    assert_eq!(run(&e, "(f)"), Value::Int(5));
}

#[test]
fn macros_compose_with_quasiquote() {
    let e = ev();
    run(
        &e,
        "(def-macro (unless test then otherwise) \
           `(if ~test ~otherwise ~then))",
    );
    assert_eq!(run(&e, "(unless #f :yes :no)"), Value::keyword("yes"));
    assert_eq!(run(&e, "(unless #t :yes :no)"), Value::keyword("no"));
}

#[test]
fn nested_macro_expansion_preserves_inner_call_sites() {
    let e = ev();
    setup_counting_macro(&e);
    // outer expands to a form containing an inner macro call; the inner
    // call site must still expand (and cache) on its own
    run(&e, "(def-macro (outer form) (list 'twice form))");
    run(&e, "(define (f) (outer 3))");
    assert_eq!(run(&e, "(f)"), run(&e, "(list 3 3)"));
    assert_eq!(run(&e, "(f)"), run(&e, "(list 3 3)"));
}

#[test]
fn gensym_names_are_unique() {
    let e = ev();
    assert_eq!(run(&e, "(= (gensym) (gensym))"), Value::Bool(false));
}
