//! Tensor bridge: host-side batches and values to and from burn tensors.
//!
//! Id matrices go in as `Int` tensors and host weights go in converted to the
//! backend's float element. Similarity values, logits and probabilities come
//! back out as `f64` regardless of the backend's precision.

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::data::batch::Batch;

/// A [`Batch`] moved onto a device. Lengths stay on the host: the encoder
/// uses them to bound the unrolled recurrence.
#[derive(Debug, Clone)]
pub struct BatchTensors<B: Backend> {
    pub queries: Tensor<B, 2, Int>,
    pub replies: Tensor<B, 2, Int>,
    pub query_lengths: Vec<usize>,
    pub reply_lengths: Vec<usize>,
}

/// Convert a `(rows, width)` id matrix to an `Int` tensor.
///
/// # Panics
/// Panics if `ids` is empty or rows have inconsistent widths.
pub fn ids_to_tensor<B: Backend>(ids: &[Vec<u32>], device: &B::Device) -> Tensor<B, 2, Int> {
    assert!(!ids.is_empty(), "ids must not be empty");
    let width = ids[0].len();
    for (i, row) in ids.iter().enumerate() {
        assert_eq!(row.len(), width, "row {i} has width {}, expected {width}", row.len());
    }
    let flat: Vec<i64> = ids.iter().flat_map(|row| row.iter().map(|&id| id as i64)).collect();
    Tensor::from_data(TensorData::new(flat, [ids.len(), width]), device)
}

/// Build a float tensor from host `f32` values in the backend's float element.
pub fn float_tensor<B: Backend, const D: usize>(
    values: Vec<f32>,
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    Tensor::from_data(TensorData::new(values, shape).convert::<B::FloatElem>(), device)
}

/// Move a validated batch onto `device`.
pub fn batch_to_tensors<B: Backend>(batch: &Batch, device: &B::Device) -> BatchTensors<B> {
    BatchTensors {
        queries: ids_to_tensor(&batch.input_queries, device),
        replies: ids_to_tensor(&batch.input_replies, device),
        query_lengths: batch.query_lengths.clone(),
        reply_lengths: batch.reply_lengths.clone(),
    }
}

/// Extract all values of a float tensor as `f64`, row-major.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f64> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .expect("float tensor data converts to f64")
}

/// Extract a single `f64` scalar.
///
/// # Panics
/// Panics if the tensor is empty.
pub fn tensor_to_f64<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f64 {
    tensor_to_vec(tensor)[0]
}

/// Extract all values of an `Int` tensor as `i64`.
pub fn int_tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D, Int>) -> Vec<i64> {
    tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .expect("int tensor data converts to i64")
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;
    type TestDoubleBackend = NdArray<f64>;

    #[test]
    fn test_ids_round_trip() {
        let device = Default::default();
        let ids = vec![vec![1u32, 2, 0], vec![4, 0, 0]];
        let tensor = ids_to_tensor::<TestBackend>(&ids, &device);
        assert_eq!(tensor.dims(), [2, 3]);
        assert_eq!(int_tensor_to_vec(tensor), vec![1, 2, 0, 4, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "row 1 has width 2")]
    fn test_ragged_ids_panic() {
        let device = Default::default();
        let _ = ids_to_tensor::<TestBackend>(&[vec![1, 2, 3], vec![1, 2]], &device);
    }

    #[test]
    fn test_batch_to_tensors_keeps_lengths() {
        let device = Default::default();
        let batch = Batch {
            input_queries: vec![vec![1, 0], vec![2, 3]],
            input_replies: vec![vec![4, 0], vec![5, 0]],
            query_lengths: vec![1, 2],
            reply_lengths: vec![1, 1],
        };
        let tensors = batch_to_tensors::<TestBackend>(&batch, &device);
        assert_eq!(tensors.queries.dims(), [2, 2]);
        assert_eq!(tensors.replies.dims(), [2, 2]);
        assert_eq!(tensors.query_lengths, vec![1, 2]);
    }

    #[test]
    fn test_tensor_to_vec_reads_either_precision() {
        let device = Default::default();
        let single = float_tensor::<TestBackend, 1>(vec![1.0, 2.5, -3.0], [3], &device);
        assert_eq!(tensor_to_vec(single.clone()), vec![1.0, 2.5, -3.0]);
        assert_eq!(tensor_to_f64(single.slice([1..2])), 2.5);

        let double = float_tensor::<TestDoubleBackend, 2>(vec![0.5, -1.5, 2.0, 4.0], [2, 2], &device);
        assert_eq!(tensor_to_vec(double.clone()), vec![0.5, -1.5, 2.0, 4.0]);
        // f32 host values land in an f64 tensor; arithmetic stays in f64.
        let sum = tensor_to_f64(double.sum());
        assert_eq!(sum, 5.0);
    }
}
