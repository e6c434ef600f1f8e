//! histdb - command-line interface.

use std::path::PathBuf;
use std::process::ExitCode;

use histdb::db::{Database, DatabaseConfig, DatabaseError};
use histdb::rebase::{BranchRewrite, TagMapping};
use histdb::storage::{BranchName, CommitId};
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let mut path = PathBuf::from(".histdb");
    let mut verbose = 0u8;
    let mut command = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" | "--database" => {
                i += 1;
                if i < args.len() {
                    path = PathBuf::from(&args[i]);
                }
            }
            "-v" | "--verbose" => {
                verbose = verbose.saturating_add(1);
            }
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("histdb v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            _ => {
                command = args[i..].to_vec();
                break;
            }
        }
        i += 1;
    }

    init_tracing(verbose);

    if command.is_empty() {
        print_help();
        return ExitCode::FAILURE;
    }

    let config = DatabaseConfig::new(&path);
    let db = match Database::open_with_config(config) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error opening database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&db, &command[0], &command[1..]) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(hint) = e.downcast_ref::<DatabaseError>().and_then(DatabaseError::hint) {
                eprintln!("hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

/// `HISTDB_LOG` overrides the level picked from `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("HISTDB_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn run(db: &Database, command: &str, args: &[String]) -> CliResult {
    match command {
        "tables" => {
            for table in db.list_tables()? {
                println!("{}", table);
            }
        }
        "log" => {
            let limit = args.first().map(|n| n.parse::<usize>()).transpose()?;
            for commit in db.history(limit)? {
                println!("{} {} {}", commit.id.short(), commit.commit_time.to_rfc3339(), commit.summary());
            }
        }
        "needs-migration" => {
            if db.needs_migration()? {
                println!("tags are shared between tables, run `histdb migrate`");
            } else {
                println!("no migration needed");
            }
        }
        "migrate" => {
            for rewrite in db.migrate()? {
                print_rewrite(&rewrite);
            }
        }
        "rebase-tags" => {
            let [branch, mapping] = args else {
                return Err("usage: histdb rebase-tags <branch> <mapping.json>".into());
            };
            let branch = BranchName::new(branch.as_str())?;
            let mapping = TagMapping::from_json(&std::fs::read_to_string(mapping)?)?;
            print_rewrite(&db.rebase_tags(&branch, &mapping)?);
        }
        "cp" => copy_table(db, args)?,
        other => return Err(format!("unknown command: {}", other).into()),
    }
    Ok(())
}

fn copy_table(db: &Database, args: &[String]) -> CliResult {
    let mut force = false;
    let mut commit = None;
    let mut names = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-f" | "--force" => force = true,
            "--commit" => {
                i += 1;
                let hex = args.get(i).ok_or("--commit needs a commit id")?;
                commit = Some(CommitId::from_hex(hex)?);
            }
            name => names.push(name),
        }
        i += 1;
    }

    let [from, to] = names.as_slice() else {
        return Err("usage: histdb cp [--commit ID] [-f] <old> <new>".into());
    };
    let id = db.copy_table(from, to, commit, force)?;
    println!("copied {} to {} in {}", from, to, id.short());
    Ok(())
}

fn print_rewrite(rewrite: &BranchRewrite) {
    if rewrite.old_head == rewrite.new_head {
        println!("{}: unchanged at {}", rewrite.branch, rewrite.old_head.short());
        return;
    }
    print!(
        "{}: {} -> {}",
        rewrite.branch,
        rewrite.old_head.short(),
        rewrite.new_head.short()
    );
    match &rewrite.backup_ref {
        Some(backup) => println!(" (backup: {})", backup),
        None => println!(),
    }
}

fn print_help() {
    println!("histdb - a git-backed relational store with tag-preserving history rewrites");
    println!();
    println!("Usage: histdb [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("Options:");
    println!("  -d, --database PATH    Path to database directory (default: .histdb)");
    println!("  -v, --verbose          More logging (repeat for debug)");
    println!("  -h, --help             Show this help message");
    println!("  --version              Show version");
    println!();
    println!("Commands:");
    println!("  tables                                List tables on main");
    println!("  log [N]                               Show the last N commits");
    println!("  needs-migration                       Check for tags shared between tables");
    println!("  migrate                               Make tags unique across every branch");
    println!("  rebase-tags <branch> <mapping.json>   Rewrite a branch with new tags");
    println!("  cp [--commit ID] [-f] <old> <new>     Copy a table");
    println!();
    println!("Set HISTDB_LOG (e.g. HISTDB_LOG=histdb=debug) to control logging.");
}
