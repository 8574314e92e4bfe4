/*!
mpfabric command-line driver.

Subcommands cover the operator surface: `generate` random workloads,
`assemble` them into instruction binaries, `run` a simulation, and
`stats` to aggregate a transaction log. Exit code 0 on success, non-zero
on argument, file or fatal invariant errors.
*/

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use mpfabric::dump::DirSink;
use mpfabric::stats::{self, TransactionRecord};
use mpfabric::system::{Pacing, System, SystemConfig};
use mpfabric::workload::{self, WorkloadSpec};
use mpfabric::{asm, program, qos, ArbitScheme};

#[derive(Parser)]
#[command(name = "mpfabric", version, about = "Shared-bus interconnect simulator for MP systems")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Arbitration {
    Fifo,
    Priority,
}

impl From<Arbitration> for ArbitScheme {
    fn from(a: Arbitration) -> Self {
        match a {
            Arbitration::Fifo => ArbitScheme::Fifo,
            Arbitration::Priority => ArbitScheme::Priority,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Generate pseudo-random workloads, one assembler file per PE.
    Generate {
        #[arg(long, default_value_t = 4)]
        pes: usize,
        /// Instructions per PE.
        #[arg(long, default_value_t = 20)]
        instructions: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value = "workloads")]
        out_dir: PathBuf,
    },
    /// Assemble a program into the 64-digit instruction-binary format.
    Assemble {
        input: PathBuf,
        /// Defaults to the input path with a `.bin` extension.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run a simulation over per-PE instruction binaries.
    Run {
        #[arg(long, default_value_t = 2)]
        pes: usize,
        #[arg(long, value_enum, default_value = "fifo")]
        arbitration: Arbitration,
        /// Wait for Enter before each cycle instead of free-running.
        #[arg(long)]
        stepping: bool,
        /// QoS config file (`id: 0xHH` lines; missing PEs default to 0).
        #[arg(long)]
        qos: Option<PathBuf>,
        /// Directory holding `pe_<i>.bin` instruction binaries.
        #[arg(long, default_value = "workloads")]
        program_dir: PathBuf,
        /// Transaction log destination.
        #[arg(long, default_value = "transactions.log")]
        log: PathBuf,
        /// Where to dump cache/shared-memory snapshots after the run.
        #[arg(long)]
        dump_dir: Option<PathBuf>,
        /// Seed for the random initial memory fill.
        #[arg(long)]
        seed: Option<u64>,
        /// Abort if the simulation runs past this many cycles.
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Aggregate a transaction log into per-PE statistics.
    Stats { log: PathBuf },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match dispatch(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate {
            pes,
            instructions,
            seed,
            out_dir,
        } => generate(pes, instructions, seed, &out_dir),
        Command::Assemble { input, output } => assemble(&input, output),
        Command::Run {
            pes,
            arbitration,
            stepping,
            qos,
            program_dir,
            log,
            dump_dir,
            seed,
            max_cycles,
        } => run(
            pes,
            arbitration.into(),
            stepping,
            qos.as_deref(),
            &program_dir,
            &log,
            dump_dir.as_deref(),
            seed,
            max_cycles,
        ),
        Command::Stats { log } => show_stats(&log),
    }
}

fn generate(pes: usize, instructions: usize, seed: Option<u64>, out_dir: &Path) -> Result<()> {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let programs = workload::generate(
        WorkloadSpec {
            pe_count: pes,
            instructions_per_pe: instructions,
        },
        &mut rng,
    );

    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    for (i, text) in programs.iter().enumerate() {
        let path = out_dir.join(format!("pe_{i}.asm"));
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn assemble(input: &Path, output: Option<PathBuf>) -> Result<()> {
    let source = fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let words = asm::assemble_str(&source)
        .with_context(|| format!("assembling {}", input.display()))?;

    let output = output.unwrap_or_else(|| input.with_extension("bin"));
    program::write_program(&output, &words)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "assembled {} instruction(s) into {}",
        words.len(),
        output.display()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run(
    pes: usize,
    scheme: ArbitScheme,
    stepping: bool,
    qos_path: Option<&Path>,
    program_dir: &Path,
    log_path: &Path,
    dump_dir: Option<&Path>,
    seed: Option<u64>,
    max_cycles: Option<u64>,
) -> Result<()> {
    let qos = match qos_path {
        Some(path) => {
            let map = qos::load_qos(path)
                .with_context(|| format!("reading {}", path.display()))?;
            qos::qos_vec(&map, pes)
        }
        None => Vec::new(),
    };

    let mut programs = Vec::with_capacity(pes);
    for i in 0..pes {
        let path = program_dir.join(format!("pe_{i}.bin"));
        let words = program::load_program(&path)
            .with_context(|| format!("loading {}", path.display()))?;
        programs.push(words);
    }

    let mut cfg = SystemConfig::new(pes, scheme);
    cfg.qos = qos;
    cfg.programs = programs;
    cfg.seed = seed;
    cfg.randomize_state = true;
    cfg.max_cycles = max_cycles;

    let mut system = System::new(cfg)?;
    let pacing = if stepping {
        Pacing::Stepped(Box::new(|cycle| {
            print!("cycle {cycle}: press Enter to advance ");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
        }))
    } else {
        Pacing::Auto
    };

    let outcome = system.run(pacing);

    // The log is flushed whether or not the run succeeded.
    let mut log_file = fs::File::create(log_path)
        .with_context(|| format!("creating {}", log_path.display()))?;
    system
        .transaction_log()
        .write_to(&mut log_file)
        .with_context(|| format!("writing {}", log_path.display()))?;

    if let Some(dir) = dump_dir {
        let mut sink = DirSink::new(dir);
        system.dump_state(&mut sink);
    }

    let summary = outcome?;
    println!(
        "finished in {} cycles: {} transaction(s), {} protocol violation(s)",
        summary.cycles, summary.transactions, summary.protocol_violations
    );
    print_summaries(&system.transaction_log().snapshot());
    Ok(())
}

fn show_stats(log_path: &Path) -> Result<()> {
    let text = fs::read_to_string(log_path)
        .with_context(|| format!("reading {}", log_path.display()))?;
    let records: Vec<TransactionRecord> = text
        .lines()
        .filter_map(TransactionRecord::parse_line)
        .collect();
    if records.is_empty() {
        anyhow::bail!("{} holds no parsable transactions", log_path.display());
    }
    print_summaries(&records);
    Ok(())
}

fn print_summaries(records: &[TransactionRecord]) {
    println!("pe  transactions  bytes  latency min/mean/max");
    for s in stats::summarize(records) {
        println!(
            "{:>2}  {:>12}  {:>5}  {}/{}/{}",
            s.pe, s.transactions, s.bytes_moved, s.min_latency, s.mean_latency, s.max_latency
        );
    }
}
