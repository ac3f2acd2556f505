mod config;
mod pipeline;
pub mod results;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::Overrides;
use dual_encoder::NegativeSampling;
use pipeline::{EvalArgs, RankArgs, TrainArgs};

/// dual-encoder: LSTM dual-encoder for reply retrieval.
#[derive(Parser)]
#[command(name = "dual-encoder", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Config overrides shared by `train` and `eval`.
#[derive(clap::Args, Debug)]
struct OverrideArgs {
    /// Override the batch size.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Override the number of epochs.
    #[arg(long)]
    num_epochs: Option<usize>,
    /// Override the base learning rate.
    #[arg(long)]
    learning_rate: Option<f64>,
    /// Override the negative sampling strategy ("random" or "hard").
    #[arg(long)]
    negative_sampling: Option<NegativeSampling>,
    /// Override the number of negatives per positive.
    #[arg(long)]
    num_negative_samples: Option<usize>,
    /// Override the checkpoint directory.
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,
}

impl From<OverrideArgs> for Overrides {
    fn from(args: OverrideArgs) -> Self {
        Overrides {
            batch_size: args.batch_size,
            num_epochs: args.num_epochs,
            learning_rate: args.learning_rate,
            negative_sampling: args.negative_sampling,
            num_negative_samples: args.num_negative_samples,
            checkpoint_dir: args.checkpoint_dir,
        }
    }
}

/// CLI subcommands for training, evaluation and ranking.
#[derive(Subcommand)]
enum Command {
    /// Train the dual encoder on a JSONL pair file.
    Train {
        /// Path to the config TOML file.
        #[arg(long, default_value = "configs/dual_encoder.toml")]
        config: PathBuf,
        /// Training pairs, one `{"query", "reply"}` object per line.
        #[arg(long)]
        train_data: PathBuf,
        /// Held-out pairs evaluated every `eval_interval` steps.
        #[arg(long)]
        valid_data: Option<PathBuf>,
        /// Resume from a checkpoint directory (model + optimizer + meta).
        #[arg(long)]
        resume_from: Option<PathBuf>,
        /// Seed for shuffling, initialization and negative sampling.
        #[arg(long)]
        seed: Option<u64>,
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Evaluate a checkpoint: loss, accuracy and positive probability.
    Eval {
        /// Path to the config TOML file.
        #[arg(long, default_value = "configs/dual_encoder.toml")]
        config: PathBuf,
        /// Checkpoint directory to evaluate.
        #[arg(long)]
        checkpoint: PathBuf,
        /// Pairs to evaluate on.
        #[arg(long)]
        data: PathBuf,
        /// Path to write the JSON report.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Seed for negative sampling.
        #[arg(long)]
        seed: Option<u64>,
        #[command(flatten)]
        overrides: OverrideArgs,
    },
    /// Rank a pool of candidate replies for one or more queries.
    Rank {
        /// Path to the config TOML file.
        #[arg(long, default_value = "configs/dual_encoder.toml")]
        config: PathBuf,
        /// Checkpoint directory to load.
        #[arg(long)]
        checkpoint: PathBuf,
        /// Candidate replies, one per line.
        #[arg(long)]
        replies: PathBuf,
        /// Queries to rank the pool against.
        #[arg(long, required = true, num_args = 1..)]
        query: Vec<String>,
        /// Number of replies to print per query.
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            train_data,
            valid_data,
            resume_from,
            seed,
            overrides,
        } => pipeline::run_train(TrainArgs {
            config,
            train_data,
            valid_data,
            resume_from,
            seed,
            overrides: overrides.into(),
        }),
        Command::Eval {
            config,
            checkpoint,
            data,
            output,
            seed,
            overrides,
        } => pipeline::run_eval(EvalArgs {
            config,
            checkpoint,
            data,
            output,
            seed,
            overrides: overrides.into(),
        }),
        Command::Rank {
            config,
            checkpoint,
            replies,
            query,
            top_k,
            json,
        } => pipeline::run_rank(RankArgs {
            config,
            checkpoint,
            replies,
            queries: query,
            top_k,
            json,
        }),
    }
}
