use std::time::Instant;

use anise_core::ast::Value;
use anise_core::Evaluator;

fn ev() -> Evaluator {
    Evaluator::new().expect("bootstrap")
}

#[test]
fn append_is_associative() {
    let e = ev();
    assert_eq!(
        e.eval_source("(= (append '(1) (append '(2) '(3))) (append (append '(1) '(2)) '(3)))")
            .unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn appending_nothing_is_identity() {
    let e = ev();
    assert_eq!(
        e.eval_source("(= (append '(1 2)) '(1 2))").unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        e.eval_source("(= (append) '())").unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn repeated_appends_stay_cheap() {
    let e = ev();
    e.eval_source(
        "(define (grow n acc) (if (= n 0) acc (recur (- n 1) (append acc '(1)))))",
    )
    .unwrap();
    let started = Instant::now();
    assert_eq!(
        e.eval_source("(size (grow 1000 '()))").unwrap(),
        Value::Int(1000)
    );
    // appends are amortized O(1); a quadratic copy would blow well past this
    assert!(started.elapsed().as_secs() < 5);
}

#[test]
fn long_append_chains_traverse_fully() {
    let e = ev();
    e.eval_source(
        "(define (grow n acc) (if (= n 0) acc (recur (- n 1) (append acc '(1)))))",
    )
    .unwrap();
    e.eval_source(
        "(define (walk l acc) (if (empty? l) acc (recur (rest l) (+ acc (first l)))))",
    )
    .unwrap();
    let started = Instant::now();
    // first/rest over the whole chain must neither recurse on the host
    // stack nor go quadratic
    assert_eq!(
        e.eval_source("(walk (grow 20000 '()) 0)").unwrap(),
        Value::Int(20000)
    );
    assert!(started.elapsed().as_secs() < 5);
}

#[test]
fn size_is_memoized_after_one_traversal() {
    let e = ev();
    e.eval_source("(define big (range 0 100000))").unwrap();
    assert_eq!(e.eval_source("(size big)").unwrap(), Value::Int(100000));
    let started = Instant::now();
    for _ in 0..1000 {
        assert_eq!(e.eval_source("(size big)").unwrap(), Value::Int(100000));
    }
    assert!(started.elapsed().as_secs() < 5);
}

#[test]
fn indexing_and_views() {
    let e = ev();
    assert_eq!(e.eval_source("(get '(1 2 3) 2)").unwrap(), Value::Int(3));
    assert_eq!(e.eval_source("(get '(1 2 3) 9)").unwrap(), Value::Nothing);
    assert_eq!(
        e.eval_source("(first (rest (list 1 2 3)))").unwrap(),
        Value::Int(2)
    );
    assert_eq!(
        e.eval_source("(get (append '(1 2) '(3 4)) 3)").unwrap(),
        Value::Int(4)
    );
}

#[test]
fn cons_and_equality() {
    let e = ev();
    assert_eq!(
        e.eval_source("(= (cons 1 '(2 3)) '(1 2 3))").unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        e.eval_source("(= '(1 2) '(1 2 3))").unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        e.eval_source("(= (list 1 2) '(1 2))").unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn head_of_empty_is_nothing() {
    let e = ev();
    assert_eq!(e.eval_source("(first '())").unwrap(), Value::Nothing);
    assert_eq!(
        e.eval_source("(= (rest '()) '())").unwrap(),
        Value::Bool(true)
    );
    assert!(e.eval_source("(first 3)").is_err());
}
