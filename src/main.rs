//! unroll - aggressive loop unrolling for MIR counted loops
//!
//! # Usage
//!
//! ```bash
//! # Unroll the sample `sum` loop by 4 and compare both versions for n = 10
//! unroll demo --trip 10 --count 4
//!
//! # Same, with the five stage dumps of the pass
//! unroll -vv demo --trip 10 --trace
//!
//! # Run the pass over a serialized module
//! unroll apply module.json -o unrolled.json
//!
//! # Print the effective configuration
//! unroll config --count 8 --no-threshold
//! ```

use clap::{Args, Parser, Subcommand};
use compiler::codegen::MirInterpreter;
use compiler::ir::dump::{dump_function_by_name, dump_module};
use compiler::ir::loop_unroll::samples::{expected_sum, sum_loop, SumLoopOptions, SUM_FUNCTION};
use compiler::ir::loop_unroll::{LoopUnrollPass, Threshold, UnrollConfig, UnrollProfile};
use compiler::ir::optimization::{OptimizationPass, OptimizationResult};
use compiler::ir::IrModule;
use compiler::logging;
use log::info;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "unroll")]
#[command(version = "0.1.0")]
#[command(about = "Aggressive unroller for single-block counted loops", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Unroll the sample `sum` loop and compare it with the original
    Demo {
        /// Value of `n`, the loop runs `n - start` times
        #[arg(long)]
        trip: i64,

        /// Initial counter value
        #[arg(long, default_value = "0")]
        start: i64,

        /// Extra instructions in the loop body
        #[arg(long, default_value = "0")]
        filler: usize,

        #[command(flatten)]
        unroll: UnrollArgs,
    },

    /// Run the pass over a JSON-serialized module
    Apply {
        /// Module to read
        input: PathBuf,

        /// Where to write the result (stdout when absent)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the transformed module as MIR text to stderr
        #[arg(long)]
        dump: bool,

        #[command(flatten)]
        unroll: UnrollArgs,
    },

    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        unroll: UnrollArgs,
    },
}

/// Flags layered over the configuration file
#[derive(Args)]
struct UnrollArgs {
    /// TOML configuration file
    #[arg(long, conflicts_with = "profile")]
    config: Option<PathBuf>,

    /// Start from a preset (`baseline` or `compact`)
    #[arg(long)]
    profile: Option<UnrollProfile>,

    /// Unroll factor
    #[arg(long)]
    count: Option<u32>,

    /// Size threshold, or `no-limit`
    #[arg(long, conflicts_with = "no_threshold")]
    threshold: Option<Threshold>,

    /// Remove the size threshold
    #[arg(long)]
    no_threshold: bool,

    /// Use `and trip, F-1` for power-of-two factors
    #[arg(long)]
    and_guard: bool,

    /// Log the MIR after every stage of the pass
    #[arg(long)]
    trace: bool,

    /// Never shrink the factor to fit the threshold
    #[arg(long)]
    no_partial: bool,
}

impl UnrollArgs {
    fn resolve(&self) -> Result<UnrollConfig, String> {
        let mut config = match (&self.config, self.profile) {
            (Some(path), _) => UnrollConfig::load(path).map_err(|e| e.to_string())?,
            (None, Some(profile)) => UnrollConfig::profile(profile),
            (None, None) => UnrollConfig::default(),
        };
        if let Some(count) = self.count {
            config = config.with_count(count);
        }
        if let Some(threshold) = self.threshold {
            config = config.with_threshold(threshold);
        }
        if self.no_threshold {
            config = config.with_threshold(Threshold::NoLimit);
        }
        if self.and_guard {
            config = config.with_and_guard(true);
        }
        if self.trace {
            config = config.with_trace(true);
        }
        if self.no_partial {
            config = config.with_allow_partial(false);
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();

    let stage_dumps = match &cli.command {
        Commands::Demo { unroll, .. } | Commands::Apply { unroll, .. } => unroll.trace,
        Commands::Config { .. } => false,
    };
    let level = logging::cli_level(cli.verbose, stage_dumps);
    if cli.verbose == 0 && std::env::var_os("RUST_LOG").is_some() {
        logging::init_from_env(level);
    } else {
        logging::init_with_level(level);
    }

    let result = match cli.command {
        Commands::Demo {
            trip,
            start,
            filler,
            unroll,
        } => unroll
            .resolve()
            .and_then(|config| run_demo(trip, start, filler, config)),
        Commands::Apply {
            input,
            output,
            dump,
            unroll,
        } => unroll
            .resolve()
            .and_then(|config| apply_file(input, output, dump, config)),
        Commands::Config { unroll } => unroll.resolve().and_then(|config| show_config(&config)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_pass(module: &mut IrModule, config: UnrollConfig) -> OptimizationResult {
    let mut pass = LoopUnrollPass::new(config);
    let result = pass.run_on_module(module);
    info!("{}: {:?}", pass.name(), pass.stats());
    result
}

fn print_result(result: &OptimizationResult) {
    let mut keys: Vec<_> = result.stats.iter().collect();
    keys.sort();
    for (key, value) in keys {
        println!("  {:<16} {}", key, value);
    }
    println!("  {:<16} {}", "blocks_added", result.blocks_added);
}

fn run_demo(trip: i64, start: i64, filler: usize, config: UnrollConfig) -> Result<(), String> {
    let options = SumLoopOptions {
        start,
        filler_ops: filler,
        ..SumLoopOptions::default()
    };
    let original = sum_loop(&options);
    let mut unrolled = original.clone();
    let result = run_pass(&mut unrolled, config);

    println!("== original");
    println!(
        "{}",
        dump_function_by_name(&original, SUM_FUNCTION).unwrap_or_default()
    );
    println!("== unrolled");
    println!(
        "{}",
        dump_function_by_name(&unrolled, SUM_FUNCTION).unwrap_or_default()
    );
    println!("== pass");
    print_result(&result);
    for (name, module) in [("original", &original), ("unrolled", &unrolled)] {
        if let Some(id) = module.get_function_by_name(SUM_FUNCTION) {
            let stats = module.functions[&id].compute_stats();
            println!(
                "  {:<16} {} blocks, {} instructions, {} phis",
                name, stats.block_count, stats.instruction_count, stats.phi_count
            );
        }
    }

    let mut interp = MirInterpreter::new();
    let before = interp
        .execute_by_name(&original, SUM_FUNCTION, &[trip])
        .map_err(|e| format!("original: {}", e))?;
    let before_trace = interp.take_trace();
    let before_steps = interp.steps();

    interp.reset();
    let after = interp
        .execute_by_name(&unrolled, SUM_FUNCTION, &[trip])
        .map_err(|e| format!("unrolled: {}", e))?;
    let after_trace = interp.take_trace();
    let after_steps = interp.steps();

    println!("== run sum({})", trip);
    println!("  expected         {}", expected_sum(&options, trip));
    println!("  original         {} ({} steps)", before, before_steps);
    println!("  unrolled         {} ({} steps)", after, after_steps);
    println!("  observe calls    {}", after_trace.len());

    if before != after || before_trace != after_trace {
        return Err(format!(
            "unrolled loop diverged: {} vs {}, {} vs {} observe calls",
            before,
            after,
            before_trace.len(),
            after_trace.len()
        ));
    }
    Ok(())
}

fn apply_file(
    input: PathBuf,
    output: Option<PathBuf>,
    dump: bool,
    config: UnrollConfig,
) -> Result<(), String> {
    let text = std::fs::read_to_string(&input)
        .map_err(|e| format!("Failed to read {}: {}", input.display(), e))?;
    let mut module = IrModule::from_json(&text)
        .map_err(|e| format!("Failed to parse {}: {}", input.display(), e))?;

    let result = run_pass(&mut module, config);
    if dump {
        eprintln!("{}", dump_module(&module));
    }
    let json = module
        .to_json()
        .map_err(|e| format!("Failed to serialize module: {}", e))?;

    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            println!("Wrote {}", path.display());
            print_result(&result);
        }
        None => {
            println!("{}", json);
            if result.modified {
                eprintln!("{} loop(s) unrolled", result.stat("loops_unrolled"));
            }
        }
    }
    Ok(())
}

fn show_config(config: &UnrollConfig) -> Result<(), String> {
    let text = config.to_toml_string().map_err(|e| e.to_string())?;
    print!("{}", text);
    Ok(())
}
