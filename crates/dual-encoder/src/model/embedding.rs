use burn::module::Param;
use burn::prelude::*;
use rand::Rng;

use crate::data::embeddings::EmbeddingMatrix;
use crate::model::bridge::float_tensor;
use crate::model::dropout::row_dropout;

/// Configuration for the trainable token embedding table.
#[derive(Config, Debug)]
pub struct EmbeddingTableConfig {
    /// Number of rows. Row 0 is the unknown/padding token.
    pub vocab_size: usize,
    /// Embedding dimension.
    pub embed_dim: usize,
    /// Half-width of the uniform range used for random initialization.
    #[config(default = 0.25)]
    pub init_range: f64,
}

/// Token embedding table, `(vocab_size, embed_dim)`.
#[derive(Module, Debug)]
pub struct EmbeddingTable<B: Backend> {
    pub(crate) weight: Param<Tensor<B, 2>>,
}

impl EmbeddingTableConfig {
    /// Randomly initialized table, `Uniform(-init_range, init_range)`.
    pub fn init<B: Backend>(&self, device: &B::Device, rng: &mut impl Rng) -> EmbeddingTable<B> {
        let range = self.init_range as f32;
        let values = (0..self.vocab_size * self.embed_dim)
            .map(|_| rng.gen_range(-range..range))
            .collect();
        let weight = float_tensor(values, [self.vocab_size, self.embed_dim], device);
        EmbeddingTable {
            weight: Param::from_tensor(weight),
        }
    }

    /// Table initialized from a loaded matrix (pretrained rows plus random fill).
    ///
    /// # Panics
    /// Panics if the matrix shape does not match this config.
    pub fn init_from_matrix<B: Backend>(
        &self,
        matrix: &EmbeddingMatrix,
        device: &B::Device,
    ) -> EmbeddingTable<B> {
        assert_eq!(
            (matrix.vocab_size, matrix.embed_dim),
            (self.vocab_size, self.embed_dim),
            "embedding matrix shape does not match config"
        );
        let weight = float_tensor(matrix.values.clone(), [matrix.vocab_size, matrix.embed_dim], device);
        EmbeddingTable {
            weight: Param::from_tensor(weight),
        }
    }
}

impl<B: Backend> EmbeddingTable<B> {
    /// The table for one step, with whole-row dropout applied.
    ///
    /// Drawn once per step so queries and replies see the same dropped tokens.
    pub fn table(&self, keep_prob: f64) -> Tensor<B, 2> {
        row_dropout(self.weight.val(), keep_prob)
    }

    /// Number of rows and embedding dimension.
    pub fn dims(&self) -> [usize; 2] {
        self.weight.val().dims()
    }
}

/// Gather rows of `table` for a `(batch, max_length)` id matrix.
///
/// Output shape: `(batch, max_length, embed_dim)`.
pub fn lookup<B: Backend>(table: Tensor<B, 2>, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
    let [batch, max_length] = ids.dims();
    let [_, embed_dim] = table.dims();
    table
        .select(0, ids.reshape([batch * max_length]))
        .reshape([batch, max_length, embed_dim])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::TensorData;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_lookup_shape_and_rows() {
        let device = Default::default();
        let matrix = EmbeddingMatrix {
            vocab_size: 3,
            embed_dim: 2,
            values: vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0],
        };
        let table = EmbeddingTableConfig::new(3, 2).init_from_matrix::<TestBackend>(&matrix, &device);
        let ids = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::new(vec![1i64, 2, 0, 2, 1, 0], [2, 3]),
            &device,
        );
        let out = lookup(table.table(1.0), ids);
        assert_eq!(out.dims(), [2, 3, 2]);
        let values: Vec<f32> = out.into_data().to_vec().unwrap();
        assert_eq!(
            values,
            vec![1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 3.0, 4.0, 1.0, 2.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_random_init_within_range() {
        let device = Default::default();
        let table = EmbeddingTableConfig::new(50, 8)
            .with_init_range(0.1)
            .init::<TestBackend>(&device, &mut StdRng::seed_from_u64(4));
        assert_eq!(table.dims(), [50, 8]);
        let max: f32 = table.weight.val().abs().max().into_scalar().elem();
        assert!(max <= 0.1 + 1e-6, "init out of range: {max}");
    }

    #[test]
    #[should_panic(expected = "does not match config")]
    fn test_matrix_shape_mismatch_panics() {
        let device = Default::default();
        let matrix = EmbeddingMatrix {
            vocab_size: 2,
            embed_dim: 2,
            values: vec![0.0; 4],
        };
        let _ = EmbeddingTableConfig::new(3, 2).init_from_matrix::<TestBackend>(&matrix, &device);
    }
}
