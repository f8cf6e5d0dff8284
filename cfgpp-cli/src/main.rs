#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # cfgpp CLI
//!
//! Command-line front-end for the cfgpp preprocessor library: enumerate the
//! `#ifdef` configurations of a C/C++ file and emit the preprocessed text
//! for one or all of them.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use cfgpp::{Diagnostic, ErrorSink, Preprocessor, Settings, Severity};
use clap::Parser;

/// Exit codes for different error conditions
mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const IO_ERROR: i32 = 2;
    pub const PREPROCESS_ERROR: i32 = 3;
}

/// Command-line interface for the cfgpp preprocessor
#[derive(Parser)]
#[command(
    name = "cfgpp",
    version,
    about = "A configuration-enumerating C/C++ preprocessor",
    long_about = "cfgpp preprocesses C/C++ sources the way a static analyser needs it: \
                  it discovers every #ifdef configuration of a file and can emit the \
                  preprocessed translation unit for each of them.",
    after_help = "EXAMPLES:
  # List the configurations of a file
  $ cfgpp input.c --list-configs

  # Preprocess every configuration
  $ cfgpp input.c

  # Preprocess one configuration only
  $ cfgpp input.c --config 'A;B=1'

  # Preprocess with fixed user defines and an include path
  $ cfgpp input.c -D 'DEBUG;VERSION=2' -I include/

  # Read from stdin, list configurations as JSON
  $ cat input.c | cfgpp - --list-configs --json"
)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Input C/C++ file to preprocess (use '-' for stdin)
    input: PathBuf,

    /// Write output to a file instead of stdout
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Add a directory to the include search path
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// Fixed defines, in configuration form (e.g. 'DEBUG;VERSION=2');
    /// disables configuration enumeration
    #[arg(short = 'D', long = "define", value_name = "DEFINES")]
    defines: Option<String>,

    /// Preprocess only this configuration
    #[arg(long, value_name = "CFG", conflicts_with = "defines")]
    config: Option<String>,

    /// Only enumerate and print the configurations
    #[arg(long)]
    list_configs: bool,

    /// Collect inline 'cppcheck-suppress' comments and print them
    #[arg(long)]
    inline_suppressions: bool,

    /// Report unhandled configuration shapes
    #[arg(long)]
    debug_warnings: bool,

    /// Enable an optional diagnostic id (e.g. missingInclude)
    #[arg(long = "enable", value_name = "ID")]
    enabled: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Suppress diagnostics on stderr
    #[arg(short = 'q', long)]
    quiet: bool,
}

/// Prints diagnostics to stderr as they arrive.
struct StderrSink {
    quiet: bool,
    errors: usize,
}

impl ErrorSink for StderrSink {
    fn report_err(&mut self, diag: &Diagnostic) {
        if diag.severity == Severity::Error {
            self.errors += 1;
        }
        if !self.quiet {
            eprintln!("{}", diag);
        }
    }
}

fn main() {
    std::process::exit(match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            determine_exit_code(&e)
        }
    });
}

/// Determine the appropriate exit code based on the error
fn determine_exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<std::io::Error>().is_some() {
        exit_code::IO_ERROR
    } else {
        exit_code::GENERAL_ERROR
    }
}

fn read_input(input: &PathBuf) -> Result<(String, String)> {
    if input.as_os_str() == "-" {
        let mut buffer = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buffer)
            .context("Failed to read stdin")?;
        Ok((
            String::from_utf8_lossy(&buffer).into_owned(),
            "<stdin>".to_string(),
        ))
    } else {
        let bytes =
            std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
        Ok((
            String::from_utf8_lossy(&bytes).into_owned(),
            input.display().to_string(),
        ))
    }
}

fn write_output(output: Option<&PathBuf>, text: &str) -> Result<()> {
    match output {
        Some(path) if path.as_os_str() != "-" => std::fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display())),
        _ => {
            print!("{}", text);
            Ok(())
        }
    }
}

fn build_settings(cli: &Cli) -> Settings {
    let mut settings = Settings::new();
    if let Some(defines) = &cli.defines {
        settings.user_defines = defines.clone();
    }
    settings.inline_suppressions = cli.inline_suppressions;
    settings.debug_warnings = cli.debug_warnings;
    for id in &cli.enabled {
        settings.enable(id);
    }
    settings
}

// include paths are plain prefixes inside the library; make sure they end
// with a separator
fn include_paths(cli: &Cli) -> Vec<String> {
    cli.include_dirs
        .iter()
        .map(|dir| {
            let mut s = dir.display().to_string();
            if !s.ends_with('/') && !s.ends_with('\\') {
                s.push('/');
            }
            s
        })
        .collect()
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    let (code, filename) = read_input(&cli.input)?;
    let settings = build_settings(&cli);
    let paths = include_paths(&cli);

    let mut sink = StderrSink {
        quiet: cli.quiet,
        errors: 0,
    };
    let mut pp = Preprocessor::new(settings);

    let (data, configurations) = pp.preprocess(&code, &filename, &paths, &mut sink);

    if cli.list_configs {
        let text = if cli.json {
            format!("{}\n", serde_json::to_string_pretty(&configurations)?)
        } else {
            let mut out = String::new();
            for cfg in &configurations {
                out.push_str(cfg);
                out.push('\n');
            }
            out
        };
        write_output(cli.output.as_ref(), &text)?;
        return Ok(exit_status(&sink));
    }

    let selected: Vec<String> = match &cli.config {
        Some(cfg) => vec![cfg.clone()],
        None => configurations,
    };

    if cli.json {
        let mut map = serde_json::Map::new();
        for cfg in &selected {
            let text = pp.get_code(&data, cfg, &filename, &mut sink);
            map.insert(cfg.clone(), serde_json::Value::String(text));
        }
        let text = format!("{}\n", serde_json::to_string_pretty(&map)?);
        write_output(cli.output.as_ref(), &text)?;
    } else {
        let mut out = String::new();
        let banner = selected.len() > 1;
        for cfg in &selected {
            if banner {
                out.push_str(&format!("### configuration: \"{}\"\n", cfg));
            }
            out.push_str(&pp.get_code(&data, cfg, &filename, &mut sink));
        }
        write_output(cli.output.as_ref(), &out)?;
    }

    if cli.inline_suppressions && !cli.quiet {
        for s in pp.settings().suppressions.entries() {
            eprintln!("suppression: {} at {}:{}", s.id, s.file, s.line);
        }
    }

    Ok(exit_status(&sink))
}

fn exit_status(sink: &StderrSink) -> i32 {
    if sink.errors > 0 {
        exit_code::PREPROCESS_ERROR
    } else {
        exit_code::SUCCESS
    }
}
