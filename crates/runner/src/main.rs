//! farfield CLI

use clap::{Parser, Subcommand, ValueEnum};
use farfield_runner::{RunReport, RunSpec, SpecParser};
use farfield_synth::ContainmentPriority;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "farfield")]
#[command(about = "Builds synthetic polycrystals from grain statistics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a tessellation from a JSON run spec
    Run {
        /// Path to the run spec
        spec: PathBuf,

        /// Output file for the report (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the seed of the run spec
        #[arg(short, long)]
        seed: Option<u64>,

        /// Annealing time limit in seconds
        #[arg(short, long)]
        time_limit: Option<u64>,

        /// Override the voxel containment priority
        #[arg(short, long, value_enum)]
        priority: Option<PriorityArg>,

        /// Leave per-voxel arrays out of the report
        #[arg(long)]
        summary_only: bool,
    },

    /// Print an example run spec
    Example {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    /// Largest grain wins
    Largest,
    /// Earliest generated grain wins
    Generation,
    /// Grain whose centre is relatively closest wins
    Radial,
}

impl From<PriorityArg> for ContainmentPriority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Largest => ContainmentPriority::LargestFirst,
            PriorityArg::Generation => ContainmentPriority::GenerationOrder,
            PriorityArg::Radial => ContainmentPriority::SmallestRadialDistance,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            spec,
            output,
            seed,
            time_limit,
            priority,
            summary_only,
        } => {
            let parser = SpecParser::new();
            let mut run = parser.prepare(parser.parse_file(&spec)?)?;

            if let Some(seed) = seed {
                run.config = run.config.with_seed(seed);
            }
            if let Some(secs) = time_limit {
                run.config = run.config.with_time_limit(Duration::from_secs(secs));
            }
            if let Some(priority) = priority {
                run.config = run.config.with_priority(priority.into());
            }

            println!("Running {} (seed {})", run.name, run.config.seed);
            let result = run.execute()?;
            let report = RunReport::new(&run.name, &run.domain, &result, !summary_only);

            report.print_summary();

            if let Some(path) = output {
                report.save_json(&path)?;
                println!("Report saved to: {}", path.display());
            }
        }

        Commands::Example { output } => {
            let json = serde_json::to_string_pretty(&RunSpec::example())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("Example written to: {}", path.display());
                }
                None => println!("{}", json),
            }
        }
    }

    Ok(())
}
