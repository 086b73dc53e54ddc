//! usdc CLI - Tool for inspecting and rewriting crate (.usdc) files.

use std::collections::BTreeMap;
use std::env;
use std::path::Path as FsPath;
use std::time::Instant;

use serde_json::{json, Map, Value as Json};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use usdc::crate_file::CrateFile;
use usdc::data::CrateData;
use usdc::format::SpecType;
use usdc::value::Path;

/// Env var with a tracing filter, used when no verbosity flag is given.
const ENV_LOG: &str = "USDC_LOG";

/// Longest value rendering printed by the text dump.
const MAX_VALUE_WIDTH: usize = 120;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Default,
    Debug,
    Trace,
}

fn init_tracing(verbosity: Verbosity) {
    let filter = match verbosity {
        Verbosity::Quiet => EnvFilter::new("off"),
        Verbosity::Debug => EnvFilter::new("usdc=debug,usdc_cli=debug"),
        Verbosity::Trace => EnvFilter::new("usdc=trace,usdc_cli=trace"),
        Verbosity::Default => EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut verbosity = Verbosity::Default;
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => verbosity = Verbosity::Debug,
            "-vv" | "--trace" => verbosity = Verbosity::Trace,
            "-q" | "--quiet" => verbosity = Verbosity::Quiet,
            _ => filtered_args.push(arg),
        }
    }

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let json_mode = filtered_args.iter().any(|&s| s == "--json" || s == "-j");
    init_tracing(if json_mode { Verbosity::Quiet } else { verbosity });

    let result = match filtered_args[0] {
        "info" | "i" => match filtered_args.get(1) {
            Some(file) => cmd_info(file),
            None => usage("usdc-cli info <file.usdc>"),
        },
        "sections" | "s" => match filtered_args.get(1) {
            Some(file) => cmd_sections(file),
            None => usage("usdc-cli sections <file.usdc>"),
        },
        "dump" | "d" => match filtered_args.get(1) {
            Some(file) => {
                let pattern = filtered_args.get(2).filter(|&&s| s != "--json" && s != "-j").copied();
                cmd_dump(file, pattern, json_mode)
            }
            None => usage("usdc-cli dump <file.usdc> [pattern] [--json]"),
        },
        "copy" | "c" => match (filtered_args.get(1), filtered_args.get(2)) {
            (Some(input), Some(output)) => cmd_copy(input, output),
            _ => usage("usdc-cli copy <input.usdc> <output.usdc>"),
        },
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("usdc-cli {} (built {})", env!("CARGO_PKG_VERSION"), env!("USDC_BUILD_DATE"));
            Ok(())
        }
        // Default: if file exists, show info; otherwise error
        other => {
            if FsPath::new(other).exists() {
                cmd_info(other)
            } else {
                eprintln!("Unknown command: {}", other);
                eprintln!();
                print_help();
                std::process::exit(1);
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn usage(line: &str) -> usdc::Result<()> {
    eprintln!("Error: missing arguments");
    eprintln!("Usage: {}", line);
    std::process::exit(1);
}

fn print_help() {
    println!("usdc-cli - crate (.usdc) file toolkit");
    println!();
    println!("USAGE:");
    println!("    usdc-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info     <file>                Show version and table sizes");
    println!("    s, sections <file>                Show the table of contents");
    println!("    d, dump     <file> [pattern]      Dump specs and fields (filter by path)");
    println!("    c, copy     <in> <out>            Rewrite a file through the writer");
    println!("    h, help                           Show this help");
    println!("    version                           Show version and build date");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Suppress all log output");
    println!("    -j, --json       Dump as JSON");
    println!();
    println!("ENVIRONMENT:");
    println!("    {}                          Log filter when no -v/-q flag is given", ENV_LOG);
    println!("    USDC_WRITE_NEW_FILES_AS_VERSION   Version for newly written files (default 0.7.0)");
    println!("    USDC_USE_PREAD                    Read with pread instead of mmap");
    println!();
    println!("EXAMPLES:");
    println!("    usdc-cli info scene.usdc");
    println!("    usdc-cli dump scene.usdc /World/Cube");
    println!("    usdc-cli dump scene.usdc --json > scene.json");
    println!("    usdc-cli copy old.usdc new.usdc");
    println!();
    println!("NOTE:");
    println!("    Compressed sections are zlib blocks. Files written by usdc-cli are read");
    println!("    back by this tool but are not interchangeable with other USD software.");
}

fn cmd_info(path: &str) -> usdc::Result<()> {
    info!("opening {}", path);
    let start = Instant::now();
    let data = CrateData::open(path)?;
    debug!("opened in {:.1?}", start.elapsed());
    let file = data.file();
    let tables = file.tables();

    println!("File:     {}", path);
    println!("Version:  {} (software {})", file.file_version(), file.software_version());
    if let Some(kind) = file.backend_kind() {
        println!("Backend:  {}", kind);
    }
    println!();
    println!("Tables:");
    println!("  Tokens:  {}", tables.tokens.len());
    println!("  Strings: {}", tables.strings.len());
    println!("  Paths:   {}", tables.paths.len());
    println!();

    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    data.visit_specs(|_, spec_type| {
        *by_type.entry(spec_type.to_string()).or_default() += 1;
        true
    });
    println!("Specs: {}", data.len());
    for (name, count) in &by_type {
        println!("  {:<20} {}", name, count);
    }

    let times = data.list_all_time_samples();
    if let (Some(first), Some(last)) = (times.first(), times.last()) {
        println!();
        println!("Time samples: {} distinct times in [{}, {}]", times.len(), first, last);
    }
    Ok(())
}

fn cmd_sections(path: &str) -> usdc::Result<()> {
    let file = CrateFile::open(path)?;
    println!("File:     {}", path);
    println!("Version:  {}", file.file_version());
    println!();
    println!("{:<16} {:>12} {:>12} {:>12}", "NAME", "START", "SIZE", "END");
    for section in file.sections() {
        println!("{:<16} {:>12} {:>12} {:>12}", section.name, section.start, section.size, section.end());
    }
    Ok(())
}

fn render(value: &Json) -> String {
    let text = value.to_string();
    if text.chars().count() <= MAX_VALUE_WIDTH {
        return text;
    }
    let cut: String = text.chars().take(MAX_VALUE_WIDTH).collect();
    format!("{}...", cut)
}

fn cmd_dump(path: &str, pattern: Option<&str>, json_mode: bool) -> usdc::Result<()> {
    let data = CrateData::open(path)?;

    let mut paths: Vec<(Path, SpecType)> = Vec::new();
    data.visit_specs(|p, t| {
        if pattern.map_or(true, |pat| p.to_string().contains(pat)) {
            paths.push((p.clone(), t));
        }
        true
    });
    debug!("dumping {} of {} specs", paths.len(), data.len());

    let mut out = Map::new();
    for (spec_path, spec_type) in &paths {
        let mut fields = Map::new();
        for name in data.list_fields(spec_path) {
            let value = match data.get_field(spec_path, &name)? {
                Some(v) => v.to_json(),
                None => Json::Null,
            };
            fields.insert(name.to_string(), value);
        }

        if json_mode {
            out.insert(spec_path.to_string(), json!({ "type": spec_type.to_string(), "fields": fields }));
        } else {
            println!("<{}> {}", spec_path, spec_type);
            for (name, value) in &fields {
                println!("    {} = {}", name, render(value));
            }
        }
    }

    if json_mode {
        let text = serde_json::to_string_pretty(&Json::Object(out))
            .map_err(|e| usdc::Error::other(format!("JSON encoding failed: {}", e)))?;
        println!("{}", text);
    }
    Ok(())
}

fn cmd_copy(input: &str, output: &str) -> usdc::Result<()> {
    info!("copying {} -> {}", input, output);
    let start = Instant::now();
    let mut data = CrateData::open(input)?;
    data.save(output)?;
    debug!("copied in {:.1?}", start.elapsed());
    let written = CrateFile::open(output)?;
    println!("Copied {} -> {} ({} specs, version {})", input, output, data.len(), written.file_version());
    println!("Note: the output uses zlib block compression and is readable by usdc only");
    Ok(())
}
