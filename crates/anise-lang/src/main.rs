use std::process::ExitCode;

use anise_core::ast::Value;
use anise_core::env;
use anise_core::error::format_error;
use anise_core::repl;
use anise_core::seq::ListHandle;
use anise_core::Evaluator;

struct Invocation {
    files: Vec<String>,
    one_liners: Vec<String>,
    program_args: Vec<String>,
}

fn parse_args(args: Vec<String>) -> Result<Invocation, String> {
    let mut invocation = Invocation {
        files: Vec::new(),
        one_liners: Vec::new(),
        program_args: Vec::new(),
    };
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-e" => match iter.next() {
                Some(code) => invocation.one_liners.push(code),
                None => return Err("-e needs an argument".to_string()),
            },
            "-args" => {
                invocation.program_args.extend(iter);
                break;
            }
            _ => invocation.files.push(arg),
        }
    }
    Ok(invocation)
}

fn main() -> ExitCode {
    let invocation = match parse_args(std::env::args().skip(1).collect()) {
        Ok(inv) => inv,
        Err(msg) => {
            eprintln!("usage: anise [file...] [-e CODE] [-args ...]: {}", msg);
            return ExitCode::FAILURE;
        }
    };

    let evaluator = match Evaluator::new() {
        Ok(ev) => ev,
        Err(err) => {
            for line in format_error(&err) {
                eprintln!("{}", line);
            }
            return ExitCode::FAILURE;
        }
    };

    let program_args: Vec<Value> = invocation
        .program_args
        .iter()
        .map(|a| Value::string(a.clone()))
        .collect();
    if let Err(err) = env::define(
        &evaluator.global_env(),
        "*ARGS*",
        Value::List(ListHandle::from_vec(program_args)),
    ) {
        for line in format_error(&err) {
            eprintln!("{}", line);
        }
        return ExitCode::FAILURE;
    }

    for file in &invocation.files {
        let source = match std::fs::read_to_string(file) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("cannot read {}: {}", file, e);
                return ExitCode::FAILURE;
            }
        };
        if let Err(err) = evaluator.eval_source(&source) {
            for line in format_error(&err) {
                eprintln!("{}", line);
            }
            return ExitCode::FAILURE;
        }
    }

    for code in &invocation.one_liners {
        match evaluator.eval_source(code) {
            Ok(value) => println!("{:?}", value),
            Err(err) => {
                for line in format_error(&err) {
                    eprintln!("{}", line);
                }
                return ExitCode::FAILURE;
            }
        }
    }

    if invocation.files.is_empty() && invocation.one_liners.is_empty() {
        if let Err(err) = repl::run(&evaluator) {
            for line in format_error(&err) {
                eprintln!("{}", line);
            }
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}
