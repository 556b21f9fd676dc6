//! Multitask datasets and loaders.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::autograd::Tensor;
use crate::error::{RebanarError, Result};

/// Features and labels for one split of one dataset.
///
/// Every feature tensor is `[n, ...]` and every label vector has `n`
/// entries; labels are 0-indexed class ids or
/// [`IGNORE_INDEX`](crate::nn::IGNORE_INDEX).
#[derive(Debug, Clone)]
pub struct MultitaskDataset {
    pub name: String,
    pub x_dict: BTreeMap<String, Tensor>,
    pub y_dict: BTreeMap<String, Vec<i64>>,
}

impl MultitaskDataset {
    /// # Errors
    ///
    /// Returns an error if the features and labels disagree on the number of examples.
    pub fn new(
        name: impl Into<String>,
        x_dict: BTreeMap<String, Tensor>,
        y_dict: BTreeMap<String, Vec<i64>>,
    ) -> Result<Self> {
        let dataset = Self {
            name: name.into(),
            x_dict,
            y_dict,
        };
        let n = dataset.len();
        for (field, x) in &dataset.x_dict {
            if x.n_rows() != n {
                return Err(RebanarError::dimension_mismatch(
                    &format!("rows of feature '{field}'"),
                    n,
                    x.n_rows(),
                ));
            }
        }
        for (key, y) in &dataset.y_dict {
            if y.len() != n {
                return Err(RebanarError::dimension_mismatch(
                    &format!("length of label '{key}'"),
                    n,
                    y.len(),
                ));
            }
        }
        Ok(dataset)
    }

    /// Number of examples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x_dict
            .values()
            .next()
            .map(Tensor::n_rows)
            .or_else(|| self.y_dict.values().next().map(Vec::len))
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a label vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the key exists or the length is wrong.
    pub fn insert_labels(&mut self, key: impl Into<String>, labels: Vec<i64>) -> Result<()> {
        let key = key.into();
        if self.y_dict.contains_key(&key) {
            return Err(RebanarError::duplicate("label key", key));
        }
        if labels.len() != self.len() {
            return Err(RebanarError::dimension_mismatch(
                &format!("length of label '{key}'"),
                self.len(),
                labels.len(),
            ));
        }
        self.y_dict.insert(key, labels);
        Ok(())
    }

    fn batch(&self, indices: &[usize]) -> Batch {
        Batch {
            x_dict: self
                .x_dict
                .iter()
                .map(|(k, x)| (k.clone(), x.select_rows(indices)))
                .collect(),
            y_dict: self
                .y_dict
                .iter()
                .map(|(k, y)| {
                    (k.clone(), indices.iter().map(|&i| y[i]).collect())
                })
                .collect(),
        }
    }
}

/// One mini-batch of features and labels.
#[derive(Debug, Clone)]
pub struct Batch {
    pub x_dict: BTreeMap<String, Tensor>,
    pub y_dict: BTreeMap<String, Vec<i64>>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.x_dict.values().next().map_or(0, Tensor::n_rows)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Batches a dataset for one split and maps task names to label keys.
#[derive(Debug, Clone)]
pub struct MultitaskDataLoader {
    pub task_to_label_dict: BTreeMap<String, String>,
    pub dataset: MultitaskDataset,
    pub split: String,
    pub batch_size: usize,
    pub shuffle: bool,
    seed: u64,
}

impl MultitaskDataLoader {
    /// # Errors
    ///
    /// Returns an error if `batch_size` is zero or a mapped label key is
    /// missing from the dataset.
    pub fn new(
        task_to_label_dict: BTreeMap<String, String>,
        dataset: MultitaskDataset,
        split: impl Into<String>,
        batch_size: usize,
        shuffle: bool,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(RebanarError::InvalidHyperparameter {
                param: "batch_size".to_string(),
                value: "0".to_string(),
                constraint: "> 0".to_string(),
            });
        }
        if let Some(key) = task_to_label_dict
            .values()
            .find(|key| !dataset.y_dict.contains_key(*key))
        {
            return Err(RebanarError::missing_key("label key", key.as_str()));
        }
        Ok(Self {
            task_to_label_dict,
            dataset,
            split: split.into(),
            batch_size,
            shuffle,
            seed: 0,
        })
    }

    /// Seed for the per-epoch shuffle.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of batches per epoch.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Batches for `epoch`, shuffled when the loader shuffles.
    ///
    /// The permutation depends only on the seed and the epoch.
    pub fn batches(&self, epoch: usize) -> impl Iterator<Item = Batch> + '_ {
        self.batches_with_seed(self.seed.wrapping_add(epoch as u64))
    }

    /// Batches shuffled with an explicit seed when the loader shuffles.
    pub fn batches_with_seed(&self, seed: u64) -> impl Iterator<Item = Batch> + '_ {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(seed);
            indices.shuffle(&mut rng);
        }
        let batch_size = self.batch_size;
        (0..self.n_batches()).map(move |b| {
            let end = ((b + 1) * batch_size).min(indices.len());
            self.dataset.batch(&indices[b * batch_size..end])
        })
    }

    /// Batches in dataset order, ignoring `shuffle` (used for evaluation).
    pub fn ordered_batches(&self) -> impl Iterator<Item = Batch> + '_ {
        let n = self.dataset.len();
        let batch_size = self.batch_size;
        (0..self.n_batches()).map(move |b| {
            let indices: Vec<usize> = (b * batch_size..((b + 1) * batch_size).min(n)).collect();
            self.dataset.batch(&indices)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> MultitaskDataset {
        let x: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let mut x_dict = BTreeMap::new();
        x_dict.insert("data".to_string(), Tensor::from_vec(x, &[n, 1]));
        let mut y_dict = BTreeMap::new();
        y_dict.insert("labels".to_string(), (0..n as i64).map(|i| i % 2).collect());
        MultitaskDataset::new("toy", x_dict, y_dict)
            .expect("consistent lengths")
    }

    fn loader(n: usize, shuffle: bool) -> MultitaskDataLoader {
        let mut map = BTreeMap::new();
        map.insert("task".to_string(), "labels".to_string());
        MultitaskDataLoader::new(map, dataset(n), "train", 4, shuffle)
            .expect("valid loader")
    }

    #[test]
    fn test_dataset_rejects_ragged_labels() {
        let mut ds = dataset(3);
        assert!(ds.insert_labels("short", vec![0]).is_err());
        assert!(ds.insert_labels("labels", vec![0, 0, 0]).is_err());
        ds.insert_labels("extra", vec![1, 1, 1]).expect("new key");
        assert_eq!(ds.y_dict.len(), 2);
    }

    #[test]
    fn test_loader_rejects_unknown_label_key() {
        let mut map = BTreeMap::new();
        map.insert("task".to_string(), "nope".to_string());
        let result = MultitaskDataLoader::new(map, dataset(2), "train", 2, false);
        assert!(result.is_err());
    }

    #[test]
    fn test_ordered_batches_cover_dataset() {
        let loader = loader(10, false);
        let sizes: Vec<usize> = loader.batches(0).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let firsts: Vec<f32> = loader
            .ordered_batches()
            .map(|b| b.x_dict["data"].data()[0])
            .collect();
        assert_eq!(firsts, vec![0.0, 4.0, 8.0]);
    }

    #[test]
    fn test_shuffle_is_seeded_permutation() {
        let a = loader(20, true).with_seed(7);
        let b = loader(20, true).with_seed(7);

        let collect = |l: &MultitaskDataLoader, epoch| -> Vec<f32> {
            l.batches(epoch)
                .flat_map(|batch| batch.x_dict["data"].data().to_vec())
                .collect()
        };

        assert_eq!(collect(&a, 0), collect(&b, 0));
        assert_ne!(collect(&a, 0), collect(&a, 1));

        let mut seen = collect(&a, 3);
        seen.sort_by(|x, y| x.total_cmp(y));
        assert_eq!(seen, (0..20).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_labels_follow_features() {
        let loader = loader(9, true).with_seed(1);
        for batch in loader.batches(0) {
            let xs = batch.x_dict["data"].data();
            for (x, y) in xs.iter().zip(&batch.y_dict["labels"]) {
                assert_eq!(*x as i64 % 2, *y);
            }
        }
    }
}
