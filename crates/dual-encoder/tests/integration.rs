//! Integration tests for the dual-encoder crate.
//!
//! These exercise cross-module interactions: dataset -> batch -> trainer,
//! model output -> sampler -> objective, the epoch driver with checkpoints,
//! and checkpoint -> ranker. All use the NdArray backend and synthetic data.

use burn::backend::ndarray::{NdArray, NdArrayDevice};
use burn::backend::Autodiff;
use burn::optim::Optimizer;
use burn::prelude::*;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

use dual_encoder::model::bridge::{batch_to_tensors, tensor_to_f64, tensor_to_vec};
use dual_encoder::training::checkpoint::{load_meta, load_model, load_optimizer};
use dual_encoder::training::objective::compute_objective;
use dual_encoder::training::sampler::{negative_mask, positive_mask};
use dual_encoder::{
    adam, train, Batch, DualEncoder, DualEncoderConfig, DualEncoderError, GlobalStep, NegativeSampling,
    PairDataset, ReplyRanker, StepKnobs, Trainer, TrainerSettings, TrainingConfig, Vocabulary,
};

type TestBackend = NdArray<f32>;
type TestAutodiffBackend = Autodiff<NdArray<f32>>;

const MAX_LENGTH: usize = 6;

fn vocab() -> Vocabulary {
    Vocabulary::from_tokens(
        [
            "<unk>", "hello", "hi", "how", "are", "you", "i", "am", "fine", "good", "thanks", "bye",
            "see", "later", "what", "time", "is", "it", "noon", "weather", "sunny",
        ]
        .iter()
        .map(|t| t.to_string())
        .collect(),
    )
}

fn pairs() -> Vec<(&'static str, &'static str)> {
    vec![
        ("hello", "hi"),
        ("how are you", "i am fine thanks"),
        ("bye", "see you later"),
        ("what time is it", "it is noon"),
        ("how is the weather", "it is sunny"),
        ("thanks", "you are good"),
        ("hi how are you", "good thanks"),
        ("see you", "bye"),
    ]
}

fn dataset() -> PairDataset {
    PairDataset::from_pairs(pairs(), &vocab(), MAX_LENGTH)
}

fn model_config() -> DualEncoderConfig {
    DualEncoderConfig::new(vocab().len(), 8, 6)
}

fn settings(sampling: NegativeSampling) -> TrainerSettings {
    TrainerSettings {
        base_learning_rate: 1e-2,
        negative_sampling: sampling,
        max_length: MAX_LENGTH,
        vocab_size: vocab().len(),
        seed: Some(3),
    }
}

fn trainer(
    mode: &str,
    sampling: NegativeSampling,
) -> Trainer<TestAutodiffBackend, impl Optimizer<DualEncoder<TestAutodiffBackend>, TestAutodiffBackend>> {
    let device = Default::default();
    let model = model_config().init::<TestAutodiffBackend>(&device, &mut StdRng::seed_from_u64(2));
    Trainer::new(mode, model, adam::<TestAutodiffBackend>(), settings(sampling), device).unwrap()
}

fn first_batch(size: usize) -> Batch {
    dataset().batches(size, None::<&mut StdRng>).remove(0)
}

fn similarity<B: Backend>(model: &DualEncoder<B>, batch: &Batch) -> Vec<f64> {
    let device = Default::default();
    tensor_to_vec(
        model
            .forward(batch_to_tensors(batch, &device), &StepKnobs::evaluation(0))
            .similarity,
    )
}

// ---------------------------------------------------------------------------
// Trainer steps
// ---------------------------------------------------------------------------

#[test]
fn test_train_steps_reduce_loss_on_fixed_batch() {
    let mut trainer = trainer("TRAIN", NegativeSampling::Random);
    let batch = first_batch(4);
    let knobs = StepKnobs::evaluation(3);
    let mut step = GlobalStep::default();

    let first = trainer.step(&batch, &knobs, &mut step).unwrap();
    let mut last = first.clone();
    for _ in 0..40 {
        last = trainer.step(&batch, &knobs, &mut step).unwrap();
    }

    assert_eq!(step.get(), 41);
    assert_eq!(last.global_step, 41);
    assert!(
        last.loss < first.loss,
        "loss did not decrease: {} -> {}",
        first.loss,
        last.loss
    );
}

#[test]
fn test_eval_mode_changes_nothing() {
    let mut trainer = trainer("val", NegativeSampling::Hard);
    let batch = first_batch(4);
    let before = similarity(trainer.model(), &batch);
    let mut step = GlobalStep::new(5);

    for _ in 0..3 {
        let out = trainer.step(&batch, &StepKnobs::evaluation(2), &mut step).unwrap();
        assert!(out.learning_rate.is_none());
        assert_eq!(out.positive_probs.len(), 4);
        assert_eq!(out.probs.len(), 4 + 8);
    }

    assert_eq!(step.get(), 5);
    assert_eq!(before, similarity(trainer.model(), &batch));
}

#[test]
fn test_step_outputs_are_consistent() {
    let mut trainer = trainer("train", NegativeSampling::Random);
    let mut step = GlobalStep::default();
    let out = trainer
        .step(&first_batch(5), &StepKnobs::evaluation(2), &mut step)
        .unwrap();

    assert_eq!(out.labels.len(), 5 + 5 * 2);
    assert_eq!(&out.labels[..5], &[1.0; 5]);
    assert!(out.labels[5..].iter().all(|&l| l == 0.0));
    for (p, &pred) in out.probs.iter().zip(&out.predictions) {
        assert_eq!(pred, i64::from(*p > 0.5));
    }
    assert_eq!(&out.probs[..5], &out.positive_probs[..]);
    let matches = out
        .predictions
        .iter()
        .zip(&out.labels)
        .filter(|(p, l)| **p as f64 == **l)
        .count();
    assert!((out.accuracy - matches as f64 / out.labels.len() as f64).abs() < 1e-6);
}

#[test]
fn test_malformed_batch_rejected() {
    let mut trainer = trainer("train", NegativeSampling::Random);
    let mut step = GlobalStep::default();

    let mut batch = first_batch(4);
    batch.input_replies.pop();
    let err = trainer
        .step(&batch, &StepKnobs::evaluation(1), &mut step)
        .unwrap_err();
    assert!(matches!(err, DualEncoderError::InvalidBatch(_)), "{err}");

    let mut batch = first_batch(4);
    batch.input_queries[2].push(0);
    assert!(matches!(
        trainer.step(&batch, &StepKnobs::evaluation(1), &mut step),
        Err(DualEncoderError::InvalidBatch(_))
    ));
    assert_eq!(step.get(), 0);
}

// ---------------------------------------------------------------------------
// Sampler + objective on real model output
// ---------------------------------------------------------------------------

fn score_matrix(values: &[f64], n: usize, device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 2> {
    let values: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    Tensor::<TestBackend, 2>::from_data(TensorData::new(values, [n, n]), device)
}

#[test]
fn test_masks_disjoint_on_model_output() {
    let device = Default::default();
    let model = model_config().init::<TestBackend>(&device, &mut StdRng::seed_from_u64(2));
    let batch = first_batch(8);
    let sim = similarity(&model, &batch);
    let pos = positive_mask(8);
    let mut rng = StdRng::seed_from_u64(11);

    for strategy in [NegativeSampling::Random, NegativeSampling::Hard] {
        for k in [1, 3, 7] {
            let neg = negative_mask(&sim, 8, k, strategy, &mut rng);
            assert!(
                neg.iter().zip(&pos).all(|(n, p)| !(*n && *p)),
                "{strategy} k={k} overlaps the diagonal"
            );
        }
    }
}

#[test]
fn test_hard_negatives_are_top_scores_of_model_output() {
    let device = Default::default();
    let model = model_config().init::<TestBackend>(&device, &mut StdRng::seed_from_u64(2));
    let sim = similarity(&model, &first_batch(6));
    let neg = negative_mask(&sim, 6, 2, NegativeSampling::Hard, &mut StdRng::seed_from_u64(0));

    for row in 0..6 {
        let scores = &sim[row * 6..(row + 1) * 6];
        let chosen: Vec<usize> = (0..6).filter(|&j| neg[row * 6 + j]).collect();
        assert_eq!(chosen.len(), 2);
        let min_chosen = chosen.iter().map(|&j| scores[j]).fold(f64::INFINITY, f64::min);
        for j in (0..6).filter(|j| *j != row && !chosen.contains(j)) {
            assert!(scores[j] <= min_chosen, "row {row}: unchosen col {j} outranks a chosen one");
        }
    }
}

#[test]
fn test_degenerate_batch_of_four_uses_every_off_diagonal_pair() {
    let device = Default::default();
    let model = model_config().init::<TestBackend>(&device, &mut StdRng::seed_from_u64(2));
    let sim = similarity(&model, &first_batch(4));
    let neg = negative_mask(&sim, 4, 3, NegativeSampling::Random, &mut StdRng::seed_from_u64(1));
    assert_eq!(neg.iter().filter(|m| **m).count(), 12);

    let sim_tensor = score_matrix(&sim, 4, &device);
    let objective = compute_objective(sim_tensor, &neg);
    let logits = tensor_to_vec(objective.logits);
    assert_eq!(logits.len(), 16);
    let off_diagonal: Vec<f64> = (0..16).filter(|i| i % 5 != 0).map(|i| sim[i]).collect();
    for (a, b) in logits[4..].iter().zip(&off_diagonal) {
        assert!((a - b).abs() < 1e-4);
    }
}

#[test]
fn test_loss_invariant_under_consistent_permutation() {
    let device = Default::default();
    let n = 5;
    let sim: Vec<f64> = (0..n * n).map(|i| ((i * 7 % 11) as f64 - 5.0) * 0.3).collect();
    let perm = [3, 0, 4, 1, 2];
    let permuted: Vec<f64> = (0..n * n)
        .map(|idx| sim[perm[idx / n] * n + perm[idx % n]])
        .collect();

    let all_negatives: Vec<bool> = positive_mask(n).into_iter().map(|p| !p).collect();
    let loss = |values: Vec<f64>| {
        let tensor = score_matrix(&values, n, &device);
        tensor_to_f64(compute_objective(tensor, &all_negatives).loss)
    };
    let a = loss(sim);
    let b = loss(permuted);
    assert!((a - b).abs() < 1e-5, "{a} vs {b}");
}

// ---------------------------------------------------------------------------
// Driver, checkpoints, ranker
// ---------------------------------------------------------------------------

fn training_config(dir: &TempDir) -> TrainingConfig {
    TrainingConfig {
        batch_size: 4,
        num_negative_samples: 2,
        embed_dropout_keep_prob: 1.0,
        lstm_dropout_keep_prob: 0.9,
        dense_dropout_keep_prob: 0.9,
        num_epochs: 2,
        log_interval: 1,
        eval_interval: 2,
        checkpoint_interval: 3,
        checkpoint_dir: dir.path().join("ckpt").to_string_lossy().into_owned(),
    }
}

#[test]
fn test_train_loop_writes_checkpoints() {
    let tmp = TempDir::new().unwrap();
    let config = training_config(&tmp);
    let mut trainer = trainer("train", NegativeSampling::Random);
    let mut step = GlobalStep::default();
    let data = dataset();

    train(
        &mut trainer,
        &config,
        &data,
        Some(&data),
        &mut step,
        0,
        &mut StdRng::seed_from_u64(9),
    )
    .unwrap();

    // 8 pairs / batch 4 = 2 steps per epoch, 2 epochs.
    assert_eq!(step.get(), 4);
    let ckpt = tmp.path().join("ckpt");
    assert!(ckpt.join("step_3").join("meta.json").exists());
    let meta = load_meta(&ckpt.join("final")).unwrap();
    assert_eq!(meta.global_step, 4);
    assert_eq!(meta.epoch, 2);
    assert_eq!(meta.lstm_dim, 6);
}

#[test]
fn test_train_loop_rejects_eval_trainer() {
    let tmp = TempDir::new().unwrap();
    let mut trainer = trainer("EVAL", NegativeSampling::Random);
    let result = train(
        &mut trainer,
        &training_config(&tmp),
        &dataset(),
        None,
        &mut GlobalStep::default(),
        0,
        &mut StdRng::seed_from_u64(9),
    );
    assert!(result.is_err());
}

#[test]
fn test_checkpoint_roundtrip_and_resume() {
    let tmp = TempDir::new().unwrap();
    let device = NdArrayDevice::default();
    let mut trainer = trainer("train", NegativeSampling::Hard);
    let batch = first_batch(4);
    let mut step = GlobalStep::default();
    for _ in 0..3 {
        trainer.step(&batch, &StepKnobs::evaluation(2), &mut step).unwrap();
    }
    let dir = tmp.path().join("step_3");
    trainer.save_checkpoint(&dir, &step, 0).unwrap();

    let loaded: DualEncoder<TestBackend> = load_model(&dir, &model_config(), &device).unwrap();
    let expected = similarity(trainer.model(), &batch);
    let actual = similarity(&loaded, &batch);
    for (a, b) in expected.iter().zip(&actual) {
        assert!((a - b).abs() < 1e-9, "{a} vs {b}");
    }

    // Resume: model + optimizer + step, then keep training.
    let meta = load_meta(&dir).unwrap();
    let mut resumed_step = meta.global_step();
    assert_eq!(resumed_step.get(), 3);
    let model: DualEncoder<TestAutodiffBackend> = load_model(&dir, &model_config(), &device).unwrap();
    let optimizer = load_optimizer(&dir, adam::<TestAutodiffBackend>(), &device).unwrap();
    let mut resumed = Trainer::new("train", model, optimizer, settings(NegativeSampling::Hard), device).unwrap();
    let out = resumed
        .step(&batch, &StepKnobs::evaluation(2), &mut resumed_step)
        .unwrap();
    assert_eq!(out.global_step, 4);
    assert!(out.loss.is_finite());
}

#[test]
fn test_ranker_from_checkpoint_prefers_trained_pairs() {
    let tmp = TempDir::new().unwrap();
    let device = NdArrayDevice::default();
    let mut trainer = trainer("train", NegativeSampling::Random);
    let batch = first_batch(4);
    let mut step = GlobalStep::default();
    for _ in 0..100 {
        trainer.step(&batch, &StepKnobs::evaluation(3), &mut step).unwrap();
    }
    let dir = tmp.path().join("final");
    trainer.save_checkpoint(&dir, &step, 1).unwrap();

    let model_cfg = dual_encoder::ModelConfig {
        vocab_size: vocab().len(),
        embed_dim: 8,
        lstm_dim: 6,
        max_length: MAX_LENGTH,
        ..Default::default()
    };

    let mut ranker = ReplyRanker::<TestBackend>::load(&dir, &model_cfg, vocab(), device).unwrap();
    let all_pairs = pairs();
    let trained = &all_pairs[..4];
    ranker.set_pool(trained.iter().map(|(_, r)| r.to_string()).collect());
    assert_eq!(ranker.pool_size(), 4);

    let ranked = ranker.rank(trained[1].0, 4);
    assert_eq!(ranked.len(), 4);
    assert_eq!(ranked[0].index, 1, "{ranked:?}");
}
