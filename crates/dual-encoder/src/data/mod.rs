//! External collaborators of the model: vocabulary, initial embeddings,
//! pair dataset and batches.

pub mod batch;
pub mod dataset;
pub mod embeddings;
pub mod vocab;
