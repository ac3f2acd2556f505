use burn::module::Param;
use burn::prelude::*;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::model::bridge::float_tensor;
use crate::model::dropout::dropout;

/// Configuration for the learned bilinear similarity.
#[derive(Config, Debug)]
pub struct BilinearSimilarityConfig {
    /// Encoding dimension; `M` is `d_model x d_model`.
    pub d_model: usize,
    /// Standard deviation of the truncated-normal initializer.
    #[config(default = 1.0)]
    pub init_std: f64,
}

/// Asymmetric bilinear score `s(q, r) = (q @ M) . r`.
///
/// Dropout regularizes `M` itself, not the encodings. Products are taken in
/// the backend's float element, so an `f64` backend scores in double precision.
#[derive(Module, Debug)]
pub struct BilinearSimilarity<B: Backend> {
    /// Transform matrix `M`, shape (d_model, d_model).
    pub(crate) matrix: Param<Tensor<B, 2>>,
}

/// Draw from `Normal(0, std)`, rejecting samples beyond two standard deviations.
pub(crate) fn truncated_normal(rng: &mut impl Rng, count: usize, std: f64) -> Vec<f32> {
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let x: f64 = rng.sample(StandardNormal);
        if x.abs() <= 2.0 {
            out.push((x * std) as f32);
        }
    }
    out
}

impl BilinearSimilarityConfig {
    /// `M` drawn from `rng`, so a seeded generator gives a reproducible start.
    pub fn init<B: Backend>(&self, device: &B::Device, rng: &mut impl Rng) -> BilinearSimilarity<B> {
        let values = truncated_normal(rng, self.d_model * self.d_model, self.init_std);
        let matrix = float_tensor(values, [self.d_model, self.d_model], device);
        BilinearSimilarity {
            matrix: Param::from_tensor(matrix),
        }
    }
}

impl<B: Backend> BilinearSimilarity<B> {
    /// `queries @ dropout(M)`.
    ///
    /// Input/output shape: `(batch, d_model)`.
    pub fn transform(&self, queries: Tensor<B, 2>, keep_prob: f64) -> Tensor<B, 2> {
        queries.matmul(dropout(self.matrix.val(), keep_prob))
    }

    /// Full similarity matrix: entry `(i, j)` scores query `i` against reply `j`.
    ///
    /// Input shapes: `(n_queries, d_model)`, `(n_replies, d_model)`.
    /// Output shape: `(n_queries, n_replies)`.
    pub fn forward(&self, queries: Tensor<B, 2>, replies: Tensor<B, 2>, keep_prob: f64) -> Tensor<B, 2> {
        self.transform(queries, keep_prob).matmul(replies.transpose())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::optim::GradientsParams;
    use burn::tensor::TensorData;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn to_f64(t: Tensor<TestBackend, 2>) -> Vec<f64> {
        t.into_data().convert::<f64>().to_vec().unwrap()
    }

    fn with_matrix(values: Vec<f32>, d: usize) -> BilinearSimilarity<TestBackend> {
        let device = Default::default();
        BilinearSimilarity {
            matrix: Param::from_tensor(Tensor::from_data(TensorData::new(values, [d, d]), &device)),
        }
    }

    #[test]
    fn test_identity_matrix_is_dot_product() {
        let device = Default::default();
        let sim = with_matrix(vec![1.0, 0.0, 0.0, 1.0], 2);
        let q = Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0], [2, 2]), &device);
        let r = Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![1.0f32, 0.0, 0.0, 1.0], [2, 2]), &device);
        let s = to_f64(sim.forward(q, r, 1.0));
        assert_eq!(s, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_bilinear_form_is_asymmetric() {
        let device = Default::default();
        // M = [[0, 1], [0, 0]] maps q to (0, q_0): s(q, r) = q_0 * r_1.
        let sim = with_matrix(vec![0.0, 1.0, 0.0, 0.0], 2);
        let a = Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![1.0f32, 0.0], [1, 2]), &device);
        let b = Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![0.0f32, 1.0], [1, 2]), &device);
        let ab = to_f64(sim.forward(a.clone(), b.clone(), 1.0))[0];
        let ba = to_f64(sim.forward(b, a, 1.0))[0];
        assert_eq!(ab, 1.0);
        assert_eq!(ba, 0.0);
    }

    #[test]
    fn test_output_is_square_for_in_batch_scoring() {
        let device = Default::default();
        let sim = BilinearSimilarityConfig::new(8).init::<TestBackend>(&device, &mut StdRng::seed_from_u64(0));
        let q = Tensor::<TestBackend, 2>::ones([5, 8], &device);
        let r = Tensor::<TestBackend, 2>::ones([5, 8], &device);
        assert_eq!(sim.forward(q, r, 0.9).dims(), [5, 5]);
    }

    #[test]
    fn test_same_seed_gives_same_matrix() {
        let device = Default::default();
        let config = BilinearSimilarityConfig::new(6);
        let a = config.init::<TestBackend>(&device, &mut StdRng::seed_from_u64(11));
        let b = config.init::<TestBackend>(&device, &mut StdRng::seed_from_u64(11));
        let c = config.init::<TestBackend>(&device, &mut StdRng::seed_from_u64(12));
        assert_eq!(to_f64(a.matrix.val()), to_f64(b.matrix.val()));
        assert_ne!(to_f64(a.matrix.val()), to_f64(c.matrix.val()));
    }

    #[test]
    fn test_gradient_reaches_matrix_through_scores() {
        let device = Default::default();
        let sim = BilinearSimilarityConfig::new(3).init::<TestAutodiffBackend>(&device, &mut StdRng::seed_from_u64(1));
        let q = Tensor::<TestAutodiffBackend, 2>::ones([2, 3], &device).require_grad();
        let r = Tensor::<TestAutodiffBackend, 2>::ones([2, 3], &device);
        let grads = sim.forward(q.clone(), r, 1.0).sum().backward();
        assert!(q.grad(&grads).is_some(), "queries should have gradient");

        let grads = GradientsParams::from_grads(grads, &sim);
        let m_grad = grads
            .get::<NdArray<f32>, 2>(sim.matrix.id)
            .expect("M should have gradient");
        let m_sum: f32 = m_grad.abs().sum().into_scalar().elem();
        assert!(m_sum > 0.0);
    }

    #[test]
    fn test_truncated_normal_bounds() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let values = truncated_normal(&mut rng, 10_000, 0.5);
        assert_eq!(values.len(), 10_000);
        assert!(values.iter().all(|v| v.abs() <= 1.0 + 1e-6));
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64;
        assert!(mean.abs() < 0.05, "mean {mean} too far from 0");
    }
}
