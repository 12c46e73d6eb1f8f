use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::{format_error, AniseError, ERROR_TAG, WARN_TAG};
use crate::eval::Evaluator;
use crate::printer;

const PROMPT: &str = "anise> ";

fn history_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".anise-history"))
}

/// Line-oriented interactive loop. Evaluation errors are printed and the
/// loop continues; Ctrl-D ends the session.
pub fn run(evaluator: &Evaluator) -> Result<(), AniseError> {
    let mut editor =
        DefaultEditor::new().map_err(|e| AniseError::application(e.to_string()))?;
    let history = history_path();
    if let Some(path) = &history {
        let _ = editor.load_history(path);
    }
    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);
                match evaluator.eval_source(&line) {
                    Ok(value) => println!("{}", printer::print_readable(&value)),
                    Err(err) => {
                        for line in format_error(&err) {
                            eprintln!("{}", line);
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{} {}", ERROR_TAG, err);
                break;
            }
        }
    }
    if let Some(path) = &history {
        if editor.save_history(path).is_err() {
            eprintln!("{} could not save history to {}", WARN_TAG, path.display());
        }
    }
    Ok(())
}
