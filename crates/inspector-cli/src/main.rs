use clap::{Args as ClapArgs, Parser, Subcommand};
use inspector_core::{SessionOptions, TextEncoding};
use log::debug;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "inspector",
    about = "Convert JSON documents to and from versioned inspector streams",
    version
)]
struct Cli {
    /// Log session details (same as RUST_LOG=debug)
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Encode a JSON file into a stream
    Encode(EncodeArgs),
    /// Decode a stream back to pretty JSON; prints or writes with --out
    Decode(DecodeArgs),
    /// Encode a JSON file in memory and report sizes
    Stats(StatsArgs),
}

#[derive(ClapArgs, Debug)]
struct EncodeArgs {
    /// Input JSON path
    #[arg(long, value_name = "JSON")]
    input: PathBuf,
    /// Output stream path
    #[arg(long, value_name = "BIN")]
    output: PathBuf,
    /// Store strings as UTF-16LE instead of UTF-8
    #[arg(long, default_value_t = false)]
    utf16: bool,
}

#[derive(ClapArgs, Debug)]
struct DecodeArgs {
    /// Input stream path
    #[arg(long, value_name = "BIN")]
    input: PathBuf,
    /// Optional output .json path to write; otherwise prints to stdout
    #[arg(long)]
    out: Option<PathBuf>,
    /// Stream strings are UTF-16LE
    #[arg(long, default_value_t = false)]
    utf16: bool,
}

#[derive(ClapArgs, Debug)]
struct StatsArgs {
    /// Input JSON path
    #[arg(long, value_name = "JSON")]
    input: PathBuf,
    /// Measure with UTF-16LE strings
    #[arg(long, default_value_t = false)]
    utf16: bool,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    match cli.cmd {
        Cmd::Encode(a) => cmd_encode(a),
        Cmd::Decode(a) => cmd_decode(a),
        Cmd::Stats(a) => cmd_stats(a),
    }
}

fn options(utf16: bool) -> SessionOptions {
    SessionOptions {
        encoding: if utf16 {
            TextEncoding::Utf16Le
        } else {
            TextEncoding::Utf8
        },
        ..SessionOptions::default()
    }
}

fn load_json(path: &Path) -> serde_json::Value {
    let data = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error reading JSON: {}", e);
        std::process::exit(2);
    });
    serde_json::from_str(&data).unwrap_or_else(|e| {
        eprintln!("invalid JSON: {}", e);
        std::process::exit(3);
    })
}

fn cmd_encode(args: EncodeArgs) {
    let value = load_json(&args.input);
    let stats = inspector_core::write_json_stream(&args.output, &value, options(args.utf16))
        .unwrap_or_else(|e| {
            eprintln!("encode error: {}", e);
            std::process::exit(4);
        });
    debug!("wrote {} bytes to {}", stats.bytes, args.output.display());
}

fn cmd_decode(args: DecodeArgs) {
    let value = inspector_core::read_json_stream(&args.input, options(args.utf16))
        .unwrap_or_else(|e| {
            eprintln!("decode error: {}", e);
            std::process::exit(2);
        });
    let text = serde_json::to_string_pretty(&value).unwrap_or_else(|e| {
        eprintln!("error: {}", e);
        std::process::exit(3);
    });
    if let Some(out) = args.out {
        std::fs::write(&out, text).unwrap_or_else(|e| {
            eprintln!("error writing: {}", e);
            std::process::exit(5);
        });
    } else {
        println!("{}", text);
    }
}

fn cmd_stats(args: StatsArgs) {
    let value = load_json(&args.input);
    let text_len = serde_json::to_vec(&value).map(|v| v.len()).unwrap_or_default();
    let (_, stats) =
        inspector_core::encode_json(&value, options(args.utf16)).unwrap_or_else(|e| {
            eprintln!("encode error: {}", e);
            std::process::exit(4);
        });
    println!("json bytes\t{}", text_len);
    println!("stream bytes\t{}", stats.bytes);
    println!("pooled strings\t{}", stats.strings);
}
