//! Train, evaluate and rank pipelines behind the CLI subcommands.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::backend::ndarray::{NdArray, NdArrayDevice};
use burn::backend::Autodiff;
use rand::rngs::StdRng;
use rand::SeedableRng;

use dual_encoder::data::embeddings::load_embeddings;
use dual_encoder::training::checkpoint::{load_meta, load_model, load_optimizer};
use dual_encoder::training::metrics::RunningAvg;
use dual_encoder::{
    adam, train, ConfigToml, GlobalStep, PairDataset, ReplyRanker, Trainer, TrainerSettings, Vocabulary,
};

use crate::config::{apply_overrides, load_or_default, Overrides};
use crate::results::{write_json, EvalReport, RankReport, RankedEntry};

// Double precision end to end: encodings, similarity and loss are all f64.
type TrainBackend = Autodiff<NdArray<f64>>;
type InferBackend = NdArray<f64>;

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    pub config: PathBuf,
    pub train_data: PathBuf,
    pub valid_data: Option<PathBuf>,
    /// Checkpoint directory to resume from (model + optimizer + meta).
    pub resume_from: Option<PathBuf>,
    pub seed: Option<u64>,
    pub overrides: Overrides,
}

/// Arguments for the `eval` subcommand.
#[derive(Debug)]
pub struct EvalArgs {
    pub config: PathBuf,
    pub checkpoint: PathBuf,
    pub data: PathBuf,
    pub output: Option<PathBuf>,
    pub seed: Option<u64>,
    pub overrides: Overrides,
}

/// Arguments for the `rank` subcommand.
#[derive(Debug)]
pub struct RankArgs {
    pub config: PathBuf,
    pub checkpoint: PathBuf,
    /// Candidate replies, one per line.
    pub replies: PathBuf,
    pub queries: Vec<String>,
    pub top_k: usize,
    pub json: bool,
}

fn load_toml(path: &Path, overrides: &Overrides) -> anyhow::Result<ConfigToml> {
    let mut config = load_or_default(path)?;
    apply_overrides(&mut config, overrides);
    config.model.validate();
    config.training.validate();
    Ok(config)
}

fn load_vocab(config: &ConfigToml) -> anyhow::Result<Vocabulary> {
    let vocab = Vocabulary::from_file(Path::new(&config.model.vocab_list))?;
    if vocab.len() > config.model.vocab_size {
        anyhow::bail!(
            "vocabulary has {} tokens but vocab_size is {}; raise vocab_size in the config",
            vocab.len(),
            config.model.vocab_size
        );
    }
    Ok(vocab)
}

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Train from scratch (or resume) and write checkpoints.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_toml(&args.config, &args.overrides)?;
    let vocab = load_vocab(&config)?;
    let device = NdArrayDevice::default();
    let mut rng = rng(args.seed);

    let max_length = config.model.max_length;
    let train_data = PairDataset::from_jsonl(&args.train_data, &vocab, max_length)?;
    let valid_data = args
        .valid_data
        .as_deref()
        .map(|path| PairDataset::from_jsonl(path, &vocab, max_length))
        .transpose()?;

    let model_config = config.model.dual_encoder_config();
    let (model, optimizer, mut global_step, start_epoch) = match &args.resume_from {
        Some(dir) => {
            let meta = load_meta(dir)?;
            let model = load_model::<TrainBackend>(dir, &model_config, &device)?;
            let optimizer = load_optimizer(dir, adam::<TrainBackend>(), &device)?;
            tracing::info!(
                dir = %dir.display(),
                global_step = meta.global_step,
                epoch = meta.epoch,
                "Resuming from checkpoint"
            );
            (model, optimizer, meta.global_step(), meta.epoch)
        }
        None => {
            let matrix = load_embeddings(
                &vocab,
                config.model.pretrained_embeddings(),
                config.model.vocab_size,
                config.model.embed_dim,
                &mut rng,
            )?;
            let model = model_config.init_with_embeddings::<TrainBackend>(&matrix, &device, &mut rng);
            (model, adam::<TrainBackend>(), GlobalStep::default(), 0)
        }
    };

    let mut settings = TrainerSettings::from_model_config(&config.model);
    if let Some(seed) = args.seed {
        settings = settings.with_seed(seed);
    }
    let mut trainer = Trainer::new("train", model, optimizer, settings, device)?;

    train(
        &mut trainer,
        &config.training,
        &train_data,
        valid_data.as_ref(),
        &mut global_step,
        start_epoch,
        &mut rng,
    )?;

    println!("\n--- Training Summary ---");
    println!("Pairs: {}", train_data.len());
    println!("Global step: {}", global_step.get());
    println!("Checkpoints: {}", config.training.checkpoint_dir);
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

/// Evaluate a checkpoint on a pair file with dropout disabled.
pub fn run_eval(args: EvalArgs) -> anyhow::Result<()> {
    let config = load_toml(&args.config, &args.overrides)?;
    let vocab = load_vocab(&config)?;
    let device = NdArrayDevice::default();

    let data = PairDataset::from_jsonl(&args.data, &vocab, config.model.max_length)?;
    if data.is_empty() {
        anyhow::bail!("no pairs in {}", args.data.display());
    }
    let global_step = match load_meta(&args.checkpoint) {
        Ok(meta) => meta.global_step(),
        Err(e) => {
            tracing::warn!(error = %e, "No checkpoint metadata, reporting global step 0");
            GlobalStep::default()
        }
    };

    let model = load_model::<TrainBackend>(&args.checkpoint, &config.model.dual_encoder_config(), &device)?;
    let mut settings = TrainerSettings::from_model_config(&config.model);
    if let Some(seed) = args.seed {
        settings = settings.with_seed(seed);
    }
    let mut trainer = Trainer::new("EVAL", model, adam::<TrainBackend>(), settings, device)?;

    let knobs = config.training.eval_knobs();
    let batches = data.batches(config.training.batch_size, None::<&mut StdRng>);
    let mut avg = RunningAvg::new();
    let mut step = global_step;
    for batch in &batches {
        avg.update(&trainer.step(batch, &knobs, &mut step)?);
    }

    let report = EvalReport {
        checkpoint: args.checkpoint.display().to_string(),
        data: args.data.display().to_string(),
        global_step: global_step.get(),
        pairs: data.len(),
        batches: batches.len(),
        num_negative_samples: knobs.num_negative_samples,
        loss: avg.loss().unwrap_or(f64::NAN),
        accuracy: avg.accuracy().unwrap_or(f64::NAN),
        positive_prob: avg.positive_prob().unwrap_or(f64::NAN),
    };

    println!("--- Evaluation ---");
    println!("Checkpoint: {}", report.checkpoint);
    println!("Pairs: {} in {} batches", report.pairs, report.batches);
    println!("Loss: {:.4}", report.loss);
    println!("Accuracy: {:.3}", report.accuracy);
    println!("Positive prob: {:.3}", report.positive_prob);

    if let Some(path) = &args.output {
        write_json(path, &report)?;
        tracing::info!(path = %path.display(), "Wrote evaluation report");
    }
    Ok(())
}

fn read_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    let file = std::fs::File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
    let mut lines = Vec::new();
    for line in std::io::BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    Ok(lines)
}

/// Rank a reply pool for each query.
pub fn run_rank(args: RankArgs) -> anyhow::Result<()> {
    let config = load_toml(&args.config, &Overrides::default())?;
    let vocab = load_vocab(&config)?;
    let replies = read_lines(&args.replies)?;
    if replies.is_empty() {
        anyhow::bail!("no candidate replies in {}", args.replies.display());
    }

    let mut ranker =
        ReplyRanker::<InferBackend>::load(&args.checkpoint, &config.model, vocab, NdArrayDevice::default())?;
    ranker.set_pool(replies);

    let reports: Vec<RankReport> = args
        .queries
        .iter()
        .map(|query| RankReport {
            query: query.clone(),
            replies: ranker
                .rank(query, args.top_k)
                .into_iter()
                .map(|r| RankedEntry {
                    index: r.index,
                    reply: r.reply,
                    score: r.score,
                })
                .collect(),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("Query: {}", report.query);
            for (rank, entry) in report.replies.iter().enumerate() {
                println!("  {:>2}. [{:.4}] {}", rank + 1, entry.score, entry.reply);
            }
        }
    }
    Ok(())
}
