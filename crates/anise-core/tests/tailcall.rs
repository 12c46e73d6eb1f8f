use anise_core::ast::Value;
use anise_core::error::AniseError;
use anise_core::Evaluator;

fn on_big_stack<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(f)
        .expect("spawn")
        .join()
        .expect("join");
}

#[test]
fn self_call_loop_runs_a_million_iterations() {
    let e = Evaluator::new().expect("bootstrap");
    e.eval_source("(define (loop n) (if (= n 0) :done (loop (- n 1))))")
        .unwrap();
    assert_eq!(
        e.eval_source("(loop 1000000)").unwrap(),
        Value::keyword("done")
    );
}

#[test]
fn recur_loops_without_naming_the_function() {
    let e = Evaluator::new().expect("bootstrap");
    e.eval_source(
        "(define (sum n acc) (if (= n 0) acc (recur (- n 1) (+ acc n))))",
    )
    .unwrap();
    assert_eq!(
        e.eval_source("(sum 1000000 0)").unwrap(),
        Value::Int(500000500000)
    );
}

#[test]
fn recur_outside_tail_position_is_an_error() {
    let e = Evaluator::new().expect("bootstrap");
    e.eval_source("(define (bad n) (+ 1 (recur n)))").unwrap();
    let err = e.eval_source("(bad 1)").unwrap_err();
    assert!(matches!(err, AniseError::Syntax(_)), "got {}", err);
}

#[test]
fn non_tail_recursion_hits_the_depth_budget() {
    on_big_stack(|| {
        let e = Evaluator::new().expect("bootstrap");
        e.eval_source("(define (boom n) (+ 1 (boom n)))").unwrap();
        let err = e.eval_source("(boom 0)").unwrap_err();
        assert!(matches!(err, AniseError::StackOverflow(_)), "got {}", err);
        assert!(err.is_fatal());
    });
}

#[test]
fn stack_overflow_is_not_catchable() {
    on_big_stack(|| {
        let e = Evaluator::new().expect("bootstrap");
        e.eval_source("(define (boom n) (+ 1 (boom n)))").unwrap();
        let err = e
            .eval_source("(try* (boom 0) (catch e :caught))")
            .unwrap_err();
        assert!(matches!(err, AniseError::StackOverflow(_)), "got {}", err);
    });
}

#[test]
fn tail_calls_to_a_different_function_still_recurse_normally() {
    let e = Evaluator::new().expect("bootstrap");
    e.eval_source("(define (dec n) (- n 1))").unwrap();
    e.eval_source("(define (f n) (if (= n 0) :done (f (dec n))))")
        .unwrap();
    assert_eq!(e.eval_source("(f 100)").unwrap(), Value::keyword("done"));
}
