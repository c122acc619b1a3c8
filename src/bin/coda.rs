//! CODA - compositional analysis of microbiome count tables
//!
//! Command-line interface for the zero replacement, CLR, ordination and
//! clustering pipeline.

use clap::{Parser, Subcommand, ValueEnum};
use composable_coda::data::{Orientation, RawTable, TableFormat};
use composable_coda::error::Result;
use composable_coda::pipeline::{AllZeroPolicy, Pipeline, PipelineConfig};
use composable_coda::profile::{profile_sparsity, profile_zero_patterns};
use composable_coda::test::TestMethod;
use composable_coda::zero::sparsity_warnings;
use std::path::{Path, PathBuf};

/// Output format of the profile command.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProfileFormat {
    Text,
    Json,
    Yaml,
}

/// CLI-friendly test method.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliTestMethod {
    /// Welch's t-test
    Welch,
    /// Wilcoxon rank-sum test
    Wilcoxon,
}

impl From<CliTestMethod> for TestMethod {
    fn from(method: CliTestMethod) -> Self {
        match method {
            CliTestMethod::Welch => TestMethod::Welch,
            CliTestMethod::Wilcoxon => TestMethod::Wilcoxon,
        }
    }
}

/// Compositional data analysis of count tables
#[derive(Parser)]
#[command(name = "coda")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level: error, warn, info, debug or trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Worker threads for per-sample work (default: all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write every output table
    Run {
        /// Path to pipeline configuration (YAML, or JSON by extension)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to the count table
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Path to the sample metadata table
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Minimum proportion a feature must reach in some sample
        #[arg(long)]
        min_proportion: Option<f64>,

        /// Remove all-zero samples instead of failing
        #[arg(long)]
        drop_all_zero: bool,

        /// Metadata column used to label PCA scores
        #[arg(long)]
        color_by: Option<String>,

        /// Metadata column to compare groups on
        #[arg(long)]
        group: Option<String>,

        /// Reference level of the group column
        #[arg(long, requires = "group")]
        reference: Option<String>,

        /// Test used for the group comparison
        #[arg(long, value_enum, default_value = "welch")]
        test: CliTestMethod,
    },

    /// Profile zero patterns and sparsity of a count table
    Profile {
        /// Path to the count table
        #[arg(short = 'c', long)]
        counts: PathBuf,

        /// Field delimiter
        #[arg(long, default_value = "\t")]
        delimiter: char,

        /// The table has one row per sample
        #[arg(long)]
        samples_as_rows: bool,

        /// Zero fraction above which a feature or sample is flagged
        #[arg(long, default_value = "0.8")]
        z_warning: f64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: ProfileFormat,
    },

    /// Write an example pipeline configuration
    Example {
        /// Output path for the YAML file
        #[arg(short, long, default_value = "pipeline.yaml")]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = cli
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: invalid log level '{}', using info",
                cli.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    if let Some(threads) = cli.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            log::warn!("Could not configure {} threads: {}", threads, e);
        }
    }

    let result = match cli.command {
        Commands::Run {
            config,
            counts,
            metadata,
            output,
            min_proportion,
            drop_all_zero,
            color_by,
            group,
            reference,
            test,
        } => {
            let overrides = RunOverrides {
                min_proportion,
                drop_all_zero,
                color_by,
                group,
                reference,
                test: test.into(),
            };
            cmd_run(config.as_deref(), &counts, metadata.as_deref(), &output, overrides)
        }

        Commands::Profile {
            counts,
            delimiter,
            samples_as_rows,
            z_warning,
            format,
        } => cmd_profile(&counts, delimiter, samples_as_rows, z_warning, format),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Command-line settings that take precedence over the configuration file.
struct RunOverrides {
    min_proportion: Option<f64>,
    drop_all_zero: bool,
    color_by: Option<String>,
    group: Option<String>,
    reference: Option<String>,
    test: TestMethod,
}

/// Run the pipeline and write outputs
fn cmd_run(
    config_path: Option<&Path>,
    counts_path: &Path,
    metadata_path: Option<&Path>,
    output_dir: &Path,
    overrides: RunOverrides,
) -> Result<()> {
    let config = match config_path {
        Some(path) => {
            log::info!("Loading pipeline configuration from {}", path.display());
            PipelineConfig::from_file(path)?
        }
        None => PipelineConfig::default(),
    };

    let mut pipeline = Pipeline::from_config(&config);
    if let Some(tau) = overrides.min_proportion {
        pipeline = pipeline.min_proportion(tau);
    }
    if overrides.drop_all_zero {
        pipeline = pipeline.all_zero_policy(AllZeroPolicy::Drop);
    }
    if let Some(column) = &overrides.color_by {
        pipeline = pipeline.color_by(column);
    }
    if let Some(column) = &overrides.group {
        pipeline = pipeline.group_test(column, overrides.test, overrides.reference.as_deref());
    }

    let output = pipeline.run_files(counts_path, metadata_path)?;
    output.write_dir(output_dir)?;

    let report = output.report();
    eprintln!(
        "Done! {} samples x {} features after filtering",
        report.n_samples, report.n_features
    );
    for (i, ratio) in report.explained_ratio.iter().take(3).enumerate() {
        eprintln!("  PC{}: {:.1}% of variance", i + 1, ratio * 100.0);
    }
    if let Some(test) = &report.group_test {
        eprintln!(
            "  {} ({} vs {}): {} features with q < 0.05",
            test.method, test.comparison, test.reference, test.n_significant
        );
    }
    Ok(())
}

/// Profile zero structure
fn cmd_profile(
    counts_path: &Path,
    delimiter: char,
    samples_as_rows: bool,
    z_warning: f64,
    format: ProfileFormat,
) -> Result<()> {
    let table_format = TableFormat {
        delimiter,
        orientation: if samples_as_rows {
            Orientation::SamplesAsRows
        } else {
            Orientation::FeaturesAsRows
        },
    };
    let raw = RawTable::from_delimited(counts_path, &table_format)?;
    let (counts, missing) = raw.fill_missing()?;

    let sparsity = profile_sparsity(&counts);
    let patterns = profile_zero_patterns(&counts);
    let warnings = sparsity_warnings(&counts, z_warning);

    let profile = serde_json::json!({
        "dimensions": {
            "n_features": counts.n_features(),
            "n_samples": counts.n_samples()
        },
        "missing_values": missing.n_coerced,
        "sparsity": {
            "overall": sparsity.sparsity,
            "median_feature": sparsity.median_feature_sparsity,
            "median_sample": sparsity.median_sample_sparsity
        },
        "zero_patterns": {
            "n_patterns": patterns.n_patterns(),
            "all_zero_samples": patterns
                .all_zero_samples()
                .iter()
                .map(|&s| counts.sample_ids()[s].clone())
                .collect::<Vec<_>>()
        },
        "warnings": warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>()
    });

    match format {
        ProfileFormat::Json => println!("{}", serde_json::to_string_pretty(&profile)?),
        ProfileFormat::Yaml => println!("{}", serde_yaml::to_string(&profile)?),
        ProfileFormat::Text => {
            println!("Data Profile");
            println!("============");
            println!();
            println!("Dimensions:");
            println!("  Features: {}", counts.n_features());
            println!("  Samples:  {}", counts.n_samples());
            println!("  Missing values set to zero: {}", missing.n_coerced);
            println!();
            print!("{}", sparsity);
            println!();
            print!("{}", patterns);
            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for w in &warnings {
                    println!("  {}", w);
                }
            }
        }
    }

    Ok(())
}

/// Write an example configuration
fn cmd_example(output_path: &Path) -> Result<()> {
    let mut config = Pipeline::new()
        .name("example-coda")
        .n_components(3)
        .color_by("group")
        .group_test("group", TestMethod::Welch, None)
        .to_config();
    config.description = Some(
        "CZM zero replacement, CLR, PCA and Ward clustering with a Welch test on 'group'"
            .to_string(),
    );
    let yaml = config.to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example pipeline to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}
