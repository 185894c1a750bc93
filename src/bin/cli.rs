//! QuillKV CLI
//!
//! Interactive shell over a single store.

use std::io::{self, BufRead, Write};

use clap::Parser;
use quillkv::{Command, Config, Discipline, SnapshotBackend, SnapshotFormat, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// QuillKV CLI
#[derive(Parser, Debug)]
#[command(name = "quillkv-cli")]
#[command(about = "Interactive shell for a QuillKV store")]
#[command(version)]
struct Args {
    /// Store name
    name: String,

    /// Data directory
    #[arg(short, long, default_value = "./quillkv_data")]
    data_dir: String,

    /// Snapshot format (text, json, binary)
    #[arg(short, long, default_value = "text")]
    format: SnapshotFormat,

    /// WAL discipline (simple, durable-ack)
    #[arg(short = 'w', long, default_value = "simple")]
    discipline: Discipline,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,quillkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("QuillKV CLI v{}", quillkv::VERSION);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .name(&args.name)
        .snapshot_format(args.format)
        .discipline(args.discipline)
        .build();

    let mut store = match Store::open(config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        wal = %store.wal().path().display(),
        snapshot = %store.backend().path().display(),
        "Store files"
    );
    println!("Store '{}' ready. Commands: set/incr/get/delete/exists/clear/drop/exit", args.name);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    loop {
        print!("> ");
        let _ = stdout.flush();

        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") {
            break;
        }

        let command = match Command::parse(input) {
            Ok(command) => command,
            Err(e) => {
                println!("error: {}", e);
                continue;
            }
        };
        let is_drop = command == Command::Drop;

        match store.execute(command) {
            Ok(reply) => println!("{}", reply),
            Err(e) => println!("error: {}", e),
        }

        if is_drop {
            println!("Store '{}' deleted", args.name);
            return;
        }
    }

    if let Err(e) = store.close() {
        tracing::error!("Failed to close store: {}", e);
        std::process::exit(1);
    }
}
