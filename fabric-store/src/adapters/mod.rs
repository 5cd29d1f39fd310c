//! Reference adapters for the six data models.

mod cache_memory;
mod document_file;
mod graph_memory;
mod kv_file;
mod kv_redis;
mod relational_sqlite;
mod vector_file;
mod vector_native;

pub use cache_memory::MemoryCacheAdapter;
pub use document_file::FileDocumentAdapter;
pub use graph_memory::MemoryGraphAdapter;
pub use kv_file::FileKeyValueAdapter;
pub use kv_redis::RedisKeyValueAdapter;
pub use relational_sqlite::SqliteRelationalAdapter;
pub use vector_file::FileVectorAdapter;
pub use vector_native::NativeVectorAdapter;

/// L2-normalizes a vector in place, returning it. Zero vectors are left
/// untouched.
pub(crate) fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

/// Inner product of two equal-length vectors.
pub(crate) fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_produces_unit_norm() {
        let normalized = l2_normalize(vec![3.0, 4.0]);
        let norm = normalized.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_is_untouched() {
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn dot_product() {
        assert!((dot(&[1.0, 0.0], &[0.0, 1.0])).abs() < f32::EPSILON);
        assert!((dot(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < f32::EPSILON);
    }
}
