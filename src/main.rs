use std::process::ExitCode;

use colored::Colorize;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let mut database_path: Option<String> = None;
    for a in args.iter().skip(1) {
        match a.as_str() {
            // Reserved for future use; currently a no-op.
            "--proof" => {}
            other if !other.starts_with("--") && database_path.is_none() => {
                database_path = Some(other.to_string());
            }
            other => {
                eprintln!("unrecognized argument: {}", other);
                return ExitCode::from(2);
            }
        }
    }
    let database_path = match database_path {
        Some(p) => p,
        None => {
            eprintln!("usage: inspect <database> [--proof]");
            return ExitCode::from(2);
        }
    };

    let db = match sqlite_inspect::page::Database::open(&database_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("{}", format!("failed to open {}: {}", database_path, e).red());
            return ExitCode::from(1);
        }
    };

    if let Ok(meta) = std::fs::metadata(&database_path) {
        println!("Real file size: {}\n", meta.len());
    }
    println!("{}", db.header.signature_string());
    if let Some(m) = &db.length_mismatch {
        println!("{}", m.yellow());
    }
    for w in &db.header.warnings {
        println!("{}", w.yellow());
    }

    sqlite_inspect::repl::run(&db);
    ExitCode::SUCCESS
}
