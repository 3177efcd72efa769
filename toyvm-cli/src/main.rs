//! ToyVM - command-line driver
//!
//! Runs the Fibonacci sample through the interpreter, the JIT and the
//! equivalent Rust loop, printing each result followed by its run time.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use tracing::info;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use toyvm_core::config::VmConfig;
use toyvm_core::samples;
use toyvm_core::vm::{Interpreter, JitCompiler, JitConfig};

#[derive(Parser)]
#[command(name = "toyvm")]
#[command(author = "SIL Contributors")]
#[command(version = "2026.1.16")]
#[command(about = "ToyVM - bytecode interpreter vs. JIT vs. native", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Fibonacci sample and time each engine
    Run {
        /// Loop iterations (the program prints term N + 2)
        #[arg(short = 'n', long, default_value_t = 10000, value_parser = clap::value_parser!(u32).range(1..=65535))]
        terms: u32,

        /// Engine to run
        #[arg(short, long, value_enum, default_value_t = Mode::All)]
        mode: Mode,

        /// Memory cells cached in host registers (overrides TOYVM_CACHED_CELLS)
        #[arg(short, long, value_name = "K")]
        cached_cells: Option<usize>,

        /// Trace every interpreted instruction (overrides TOYVM_TRACE)
        #[arg(long)]
        trace: bool,
    },

    /// Print the Fibonacci sample's listing
    Dis {
        /// Loop iterations
        #[arg(short = 'n', long, default_value_t = 10000, value_parser = clap::value_parser!(u32).range(1..=65535))]
        terms: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Bytecode interpreter
    Interp,
    /// Native code from the JIT
    Jit,
    /// The same loop written in Rust
    Native,
    /// All three, in that order
    All,
}

impl Mode {
    fn includes(self, other: Mode) -> bool {
        self == Mode::All || self == other
    }
}

/// Filter used when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "toyvm=info,toyvm_core=info";

/// Adds the per-step interpreter events when tracing is requested
fn log_filter(base: EnvFilter, trace: bool) -> EnvFilter {
    if !trace {
        return base;
    }
    match "toyvm_core=trace".parse::<Directive>() {
        Ok(directive) => base.add_directive(directive),
        Err(_) => base,
    }
}

fn main() {
    let cli = Cli::parse();

    let trace = matches!(cli.command, Commands::Run { trace: true, .. })
        || VmConfig::from_env().trace_execution;
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // Logs go to stderr; stdout carries program output only
    tracing_subscriber::registry()
        .with(log_filter(base, trace))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Run { terms, mode, cached_cells, trace } => {
            run_command(terms, mode, cached_cells, trace)
        }
        Commands::Dis { terms } => dis_command(terms),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(terms: u32, mode: Mode, cached_cells: Option<usize>, trace: bool) -> Result<()> {
    let mut config = VmConfig::from_env();
    if let Some(cells) = cached_cells {
        config = config.with_cached_cells(cells);
    }
    if trace {
        config = config.with_trace(true);
    }

    let program = samples::fibonacci(terms).context("building the Fibonacci program")?;
    info!(terms, instructions = program.len(), "program built");

    if mode.includes(Mode::Interp) {
        let mut interpreter = Interpreter::with_config(&program, &config);
        let start = Instant::now();
        interpreter.run().context("interpreting")?;
        report("vm", start.elapsed());
    }

    if mode.includes(Mode::Jit) {
        let mut compiler = JitCompiler::new(JitConfig::from(&config))?;
        let mut routine = compiler.compile(&program).context("compiling")?;
        let stats = compiler.stats();
        info!(
            code_size = stats.code_size,
            compile_ms = stats.compile_time_ms,
            cached_cells = routine.cached_cells(),
            "routine compiled"
        );

        let start = Instant::now();
        routine.invoke().context("running compiled routine")?;
        report("jit", start.elapsed());
    }

    if mode.includes(Mode::Native) {
        let start = Instant::now();
        let c = samples::fibonacci_native(std::hint::black_box(terms));
        println!("c={}(0x{:08x})", c as i32, c);
        report("native", start.elapsed());
    }

    Ok(())
}

fn dis_command(terms: u32) -> Result<()> {
    let program = samples::fibonacci(terms).context("building the Fibonacci program")?;
    print!("{}", program.disassemble());
    Ok(())
}

fn report(label: &str, elapsed: Duration) {
    println!("{:<8} {:.2}us", label, elapsed.as_secs_f64() * 1e6);
}
