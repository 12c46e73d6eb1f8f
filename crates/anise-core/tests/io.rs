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

fn scratch_path(name: &str) -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("anise-io-{}-{}", std::process::id(), name));
    p
}

#[test]
fn spit_and_slurp_round_trip() {
    let e = ev();
    let path = scratch_path("spit");
    let path_str = path.display().to_string();
    run(&e, &format!("(spit! \"{}\" \"hello\")", path_str));
    assert_eq!(
        run(&e, &format!("(slurp! \"{}\")", path_str)),
        Value::string("hello")
    );
    let _ = std::fs::remove_file(&path);
}

#[test]
fn spit_append_accumulates() {
    let e = ev();
    let path = scratch_path("append");
    let path_str = path.display().to_string();
    let _ = std::fs::remove_file(&path);
    run(&e, &format!("(spit-append! \"{}\" \"one\")", path_str));
    run(&e, &format!("(spit-append! \"{}\" \"two\")", path_str));
    assert_eq!(
        run(&e, &format!("(slurp! \"{}\")", path_str)),
        Value::string("onetwo")
    );
    let _ = std::fs::remove_file(&path);
}

#[test]
fn spit_append_renders_non_strings() {
    let e = ev();
    let path = scratch_path("render");
    let path_str = path.display().to_string();
    let _ = std::fs::remove_file(&path);
    run(&e, &format!("(spit-append! \"{}\" 42)", path_str));
    assert_eq!(
        run(&e, &format!("(slurp! \"{}\")", path_str)),
        Value::string("42")
    );
    let _ = std::fs::remove_file(&path);
}

#[test]
fn exit_rejects_a_non_integer_status() {
    let e = ev();
    let err = e.eval_source("(exit! :now)").unwrap_err();
    assert!(matches!(err, AniseError::Type(_)), "got {}", err);
}

#[test]
fn slurping_a_missing_file_is_an_error() {
    let e = ev();
    let err = e
        .eval_source("(slurp! \"/no/such/anise/file\")")
        .unwrap_err();
    assert!(matches!(err, AniseError::Application(_)), "got {}", err);
}
