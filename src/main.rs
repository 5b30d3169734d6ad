//! Outliner CLI
use outliner::{OutlineError, OutlineOptions, Outliner, Program};
use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process;
use tracing::Level;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Outliner v{}", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    outliner [OPTIONS] <PROGRAM>");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -h, --help             Print this help message");
    eprintln!("    -V, --version          Print version information");
    eprintln!("    -c, --config <FILE>    Read the [outline] table from FILE");
    eprintln!("    -o, --output <FILE>    Write the listing to FILE (default: stdout)");
    eprintln!("    -t, --threads <N>      Worker threads (default: OUTLINER_THREADS or CPU count)");
    eprintln!("    --threshold <N>        Method and site frequency threshold");
    eprintln!("    --min-size <N>         Minimum operations per outline");
    eprintln!("    --stats                Print statistics to stderr");
    eprintln!("    -v, --verbose          Log pass progress (repeat for more detail)");
    eprintln!("    -q, --quiet            Only log errors");
    eprintln!();
    eprintln!("ARGUMENTS:");
    eprintln!("    <PROGRAM>              Program in TOML form (use '-' for stdin)");
    eprintln!();
    eprintln!("EXAMPLES:");
    eprintln!("    outliner demos/program.toml");
    eprintln!("    outliner -c demos/outline.toml --stats demos/program.toml");
    eprintln!("    cat program.toml | outliner --threshold 2 -");
}

fn print_version() {
    println!("Outliner {}", VERSION);
}

struct Options {
    input: Option<String>,
    output: Option<String>,
    config: Option<String>,
    threads: Option<usize>,
    threshold: Option<usize>,
    min_size: Option<usize>,
    show_stats: bool,
    verbosity: u8,
    quiet: bool,
}

fn parse_number(args: &[String], i: usize, flag: &str) -> Result<usize, String> {
    let value = args
        .get(i)
        .ok_or_else(|| format!("Missing value after {}", flag))?;
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

/// Level bump of a `-v`, `-vv`, `-vvv`... or `--verbose` flag
fn verbosity_flag(arg: &str) -> Option<u8> {
    if arg == "--verbose" {
        return Some(1);
    }
    let repeated = arg.strip_prefix('-')?;
    if repeated.is_empty() || !repeated.bytes().all(|b| b == b'v') {
        return None;
    }
    Some(u8::try_from(repeated.len()).unwrap_or(u8::MAX))
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    parse_arg_list(&args)
}

fn parse_arg_list(args: &[String]) -> Result<Options, String> {
    let mut options = Options {
        input: None,
        output: None,
        config: None,
        threads: None,
        threshold: None,
        min_size: None,
        show_stats: false,
        verbosity: 0,
        quiet: false,
    };
    let mut i = 1;

    while i < args.len() {
        if let Some(bump) = verbosity_flag(&args[i]) {
            options.verbosity = options.verbosity.saturating_add(bump);
            i += 1;
            continue;
        }
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-V" | "--version" => {
                print_version();
                process::exit(0);
            }
            "-o" | "--output" => {
                i += 1;
                let path = args.get(i).ok_or("Missing output file after -o")?;
                options.output = Some(path.clone());
            }
            "-c" | "--config" => {
                i += 1;
                let path = args.get(i).ok_or("Missing config file after -c")?;
                options.config = Some(path.clone());
            }
            "-t" | "--threads" => {
                i += 1;
                options.threads = Some(parse_number(args, i, "--threads")?);
            }
            "--threshold" => {
                i += 1;
                options.threshold = Some(parse_number(args, i, "--threshold")?);
            }
            "--min-size" => {
                i += 1;
                options.min_size = Some(parse_number(args, i, "--min-size")?);
            }
            "--stats" => options.show_stats = true,
            "-q" | "--quiet" => options.quiet = true,
            arg if arg.starts_with('-') && arg != "-" => {
                return Err(format!("Unknown option: {}", arg));
            }
            arg => {
                if options.input.is_some() {
                    return Err("Multiple input files specified".to_string());
                }
                options.input = Some(arg.to_string());
            }
        }
        i += 1;
    }

    Ok(options)
}

fn log_level(options: &Options) -> Level {
    match (options.quiet, options.verbosity) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, 2) => Level::DEBUG,
        (false, _) => Level::TRACE,
    }
}

fn init_logging(options: &Options) {
    let level = log_level(options);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn read_input(input: &str) -> Result<String, String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| format!("Failed to read from stdin: {}", e))?;
        Ok(buffer)
    } else {
        let path = Path::new(input);
        if !path.exists() {
            return Err(format!("Input file not found: {}", input));
        }
        fs::read_to_string(path).map_err(|e| format!("Failed to read file '{}': {}", input, e))
    }
}

fn write_output(output: Option<&str>, content: &str) -> Result<(), String> {
    match output {
        Some(path) => {
            let mut file = fs::File::create(path)
                .map_err(|e| format!("Failed to create output file '{}': {}", path, e))?;
            file.write_all(content.as_bytes())
                .map_err(|e| format!("Failed to write to output file '{}': {}", path, e))?;
            Ok(())
        }
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}

fn outline_options(options: &Options) -> Result<OutlineOptions, String> {
    let mut outline = match &options.config {
        Some(path) => OutlineOptions::load(Path::new(path)).map_err(|e| e.to_string())?,
        None => OutlineOptions::default(),
    };
    if let Some(threads) = options.threads {
        outline.threads = threads;
    }
    if let Some(threshold) = options.threshold {
        outline = outline.with_thresholds(threshold);
    }
    if let Some(min_size) = options.min_size {
        outline.min_size = min_size;
    }
    outline.validate().map_err(|e| e.to_string())?;
    Ok(outline)
}

enum Failure {
    Usage(String),
    Outline(OutlineError),
}

fn run(options: &Options, input: &str) -> Result<String, Failure> {
    let outline = outline_options(options).map_err(Failure::Usage)?;
    let source = read_input(input).map_err(Failure::Usage)?;
    let mut program = Program::parse_toml(&source).map_err(|e| Failure::Usage(e.to_string()))?;

    let mut outliner = Outliner::new(outline).map_err(Failure::Outline)?;
    let report = outliner.run(&mut program).map_err(Failure::Outline)?;

    let mut listing = String::new();
    if let Some(holder) = &report.holder {
        listing.push_str(&holder.to_string());
        listing.push('\n');
    }
    for method in program.methods.iter().filter(|m| !m.is_outline) {
        listing.push_str(&method.to_string());
        listing.push('\n');
    }

    if options.show_stats {
        eprintln!("{}", report.stats);
    }
    Ok(listing)
}

fn main() {
    let options = match parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    let Some(input) = options.input.clone() else {
        eprintln!("Error: Missing input program");
        eprintln!();
        print_usage();
        process::exit(1);
    };

    init_logging(&options);

    let output = match run(&options, &input) {
        Ok(output) => output,
        Err(Failure::Usage(e)) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
        Err(Failure::Outline(e)) if e.is_internal() => {
            eprintln!("internal error: {}", e);
            process::exit(2);
        }
        Err(Failure::Outline(e)) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_output(options.output.as_deref(), &output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        let args: Vec<String> = std::iter::once("outliner")
            .chain(args.iter().copied())
            .map(String::from)
            .collect();
        parse_arg_list(&args)
    }

    #[test]
    fn test_repeated_verbose_flags_accumulate() {
        assert_eq!(parse(&["-v", "p.toml"]).expect("parses").verbosity, 1);
        assert_eq!(parse(&["-vv", "p.toml"]).expect("parses").verbosity, 2);
        assert_eq!(parse(&["-vvv", "p.toml"]).expect("parses").verbosity, 3);
        assert_eq!(parse(&["-v", "--verbose", "-vv", "p.toml"]).expect("parses").verbosity, 4);

        let options = parse(&["-vvvvv", "p.toml"]).expect("parses");
        assert_eq!(log_level(&options), Level::TRACE);
    }

    #[test]
    fn test_verbosity_flag_shapes() {
        assert_eq!(verbosity_flag("-v"), Some(1));
        assert_eq!(verbosity_flag("-vvvv"), Some(4));
        assert_eq!(verbosity_flag("--verbose"), Some(1));
        assert_eq!(verbosity_flag("-"), None);
        assert_eq!(verbosity_flag("-vq"), None);
        assert_eq!(verbosity_flag("--vv"), None);
        assert!(parse(&["-vx", "p.toml"]).is_err());
    }

    #[test]
    fn test_quiet_wins_over_verbose() {
        let options = parse(&["-q", "-vvv", "-"]).expect("parses");
        assert_eq!(options.input.as_deref(), Some("-"));
        assert_eq!(log_level(&options), Level::ERROR);
    }
}
