//! Training Data
//!
//! CSV loading into a [`Frame`] plus string labels, and the seeded
//! stratified train/validation split.

use crate::config::TestSize;
use crate::TrainingError;
use feature_engine::schema::{ID_COLUMN, TARGET_COLUMN};
use feature_engine::{FeatureError, Frame};
use inference_engine::LabelEncoder;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Feature frame with one label per row
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub frame: Frame,
    pub labels: Vec<String>,
}

/// Train and validation halves of a [`Dataset`]
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Dataset,
    pub validation: Dataset,
}

/// A [`Split`] with labels encoded by an encoder fitted on the train half
#[derive(Debug, Clone)]
pub struct EncodedSplit {
    pub train: Frame,
    pub y_train: Vec<usize>,
    pub validation: Frame,
    pub y_validation: Vec<usize>,
    pub encoder: LabelEncoder,
}

impl Split {
    pub fn encode(self) -> Result<EncodedSplit, TrainingError> {
        let encoder = LabelEncoder::fit(&self.train.labels);
        let y_train = encoder.encode_all(&self.train.labels)?;
        let y_validation = encoder.encode_all(&self.validation.labels)?;
        info!("Encoded {} classes: {:?}", encoder.n_classes(), encoder.classes());
        Ok(EncodedSplit {
            train: self.train.frame,
            y_train,
            validation: self.validation.frame,
            y_validation,
            encoder,
        })
    }
}

impl Dataset {
    /// Read a CSV file with a header row
    pub fn load_csv(path: &Path) -> Result<Self, TrainingError> {
        let file = File::open(path).map_err(|source| TrainingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::from_reader(file)?;
        info!(
            "Loaded {} rows x {} columns from {}",
            dataset.len(),
            dataset.frame.n_cols(),
            path.display()
        );
        Ok(dataset)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TrainingError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let target = headers
            .iter()
            .position(|h| h == TARGET_COLUMN)
            .ok_or(TrainingError::MissingTarget)?;
        let keep: Vec<usize> = (0..headers.len())
            .filter(|&i| i != target && &headers[i] != ID_COLUMN)
            .collect();
        let columns: Vec<String> = keep.iter().map(|&i| headers[i].to_string()).collect();

        let mut values = Vec::new();
        let mut labels = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            for &i in &keep {
                let cell = record.get(i).unwrap_or("");
                values.push(parse_cell(cell).ok_or_else(|| TrainingError::Data {
                    line,
                    column: headers[i].to_string(),
                    value: cell.to_string(),
                })?);
            }
            labels.push(record.get(target).unwrap_or("").to_string());
        }

        if labels.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }
        let values = Array2::from_shape_vec((labels.len(), columns.len()), values)
            .map_err(|e| FeatureError::InvalidFrame(e.to_string()))?;
        let frame = Frame::new(columns, values)?;
        Ok(Self { frame, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Rows at `indices`, in the given order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            frame: self.frame.select_rows(indices),
            labels: indices.iter().map(|&i| self.labels[i].clone()).collect(),
        }
    }

    /// Row count per distinct label, sorted by label
    pub fn class_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.labels {
            *counts.entry(label.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Seeded stratified split keeping class proportions
    pub fn stratified_split(&self, test_size: TestSize, seed: u64) -> Result<Split, TrainingError> {
        let (train, validation) = stratified_indices(&self.labels, test_size, seed)?;
        debug!(
            "Stratified split: {} train / {} validation rows",
            train.len(),
            validation.len()
        );
        Ok(Split {
            train: self.select(&train),
            validation: self.select(&validation),
        })
    }
}

/// Empty cells are missing; anything else must parse as a number
fn parse_cell(cell: &str) -> Option<f64> {
    if cell.is_empty() {
        return Some(f64::NAN);
    }
    cell.parse().ok()
}

/// Per-class validation counts by largest remainder, capped so each class
/// keeps a training row
fn allocate(counts: &[usize], n_test: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| n_test as f64 * c as f64 / n as f64)
        .collect();
    let mut alloc: Vec<usize> = exact
        .iter()
        .zip(counts)
        .map(|(&e, &c)| (e.floor() as usize).min(c - 1))
        .collect();

    // largest fractional part first, lower class on ties
    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });

    let mut remaining = n_test - alloc.iter().sum::<usize>();
    while remaining > 0 {
        let before = remaining;
        for &k in &order {
            if remaining == 0 {
                break;
            }
            if alloc[k] + 1 < counts[k] {
                alloc[k] += 1;
                remaining -= 1;
            }
        }
        if remaining == before {
            break;
        }
    }
    alloc
}

/// Sorted train and validation row indices
pub fn stratified_indices(
    labels: &[String],
    test_size: TestSize,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), TrainingError> {
    let n = labels.len();
    let n_test = test_size.resolve(n)?;

    let mut by_class: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(label.as_str()).or_default().push(i);
    }
    if let Some((class, rows)) = by_class.iter().find(|(_, rows)| rows.len() < 2) {
        return Err(TrainingError::InvalidSplit(format!(
            "class {} has {} row(s); at least 2 are required",
            class,
            rows.len()
        )));
    }
    let n_classes = by_class.len();
    if n_test < n_classes || n - n_test < n_classes {
        return Err(TrainingError::InvalidSplit(format!(
            "{} validation and {} training rows cannot hold {} classes",
            n_test,
            n - n_test,
            n_classes
        )));
    }

    let counts: Vec<usize> = by_class.values().map(Vec::len).collect();
    let alloc = allocate(&counts, n_test);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n - n_test);
    let mut validation = Vec::with_capacity(n_test);
    for (rows, take) in by_class.into_values().zip(alloc) {
        let mut rows = rows;
        rows.shuffle(&mut rng);
        validation.extend_from_slice(&rows[..take]);
        train.extend_from_slice(&rows[take..]);
    }
    train.sort_unstable();
    validation.sort_unstable();
    Ok((train, validation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CSV: &str = "\
id,Course,Admission grade,Target
0,33,127.3,Graduate
1,171, 142.5 ,Dropout
2,9254,,Enrolled
";

    #[test]
    fn test_load_drops_id_and_target() {
        let data = Dataset::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(data.frame.columns(), &["Course", "Admission grade"]);
        assert_eq!(data.labels, vec!["Graduate", "Dropout", "Enrolled"]);
        assert_eq!(data.frame.values()[[1, 1]], 142.5);
        assert!(data.frame.values()[[2, 1]].is_nan());
    }

    #[test]
    fn test_schema_columns_excluded_from_frame() {
        let text = format!("{},{},GDP\n7,Dropout,1.5\n", ID_COLUMN, TARGET_COLUMN);
        let data = Dataset::from_reader(text.as_bytes()).unwrap();
        assert_eq!(data.frame.columns(), &["GDP"]);
        assert_eq!(data.labels, vec!["Dropout"]);
    }

    #[test]
    fn test_missing_target() {
        let err = Dataset::from_reader("a,b\n1,2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TrainingError::MissingTarget));
    }

    #[test]
    fn test_bad_cell_names_line_and_column() {
        let err = Dataset::from_reader("Course,Target\n33,Graduate\nabc,Dropout\n".as_bytes())
            .unwrap_err();
        match err {
            TrainingError::Data { line, column, value } => {
                assert_eq!(line, 3);
                assert_eq!(column, "Course");
                assert_eq!(value, "abc");
            }
            other => panic!("expected Data, got {:?}", other),
        }
    }

    #[test]
    fn test_header_only_is_empty() {
        let err = Dataset::from_reader("Course,Target\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TrainingError::EmptyDataset));
    }

    fn labels(counts: &[(&str, usize)]) -> Vec<String> {
        counts
            .iter()
            .flat_map(|(name, n)| std::iter::repeat(name.to_string()).take(*n))
            .collect()
    }

    #[test]
    fn test_split_sizes_and_balance() {
        let y = labels(&[("Dropout", 30), ("Enrolled", 20), ("Graduate", 50)]);
        let (train, validation) = stratified_indices(&y, TestSize::Fraction(0.2), 42).unwrap();
        assert_eq!(validation.len(), 20);
        assert_eq!(train.len(), 80);

        let count = |idx: &[usize], class: &str| idx.iter().filter(|&&i| y[i] == class).count();
        assert_eq!(count(&validation, "Dropout"), 6);
        assert_eq!(count(&validation, "Enrolled"), 4);
        assert_eq!(count(&validation, "Graduate"), 10);
    }

    #[test]
    fn test_split_is_seeded() {
        let y = labels(&[("a", 13), ("b", 9)]);
        let first = stratified_indices(&y, TestSize::Fraction(0.3), 7).unwrap();
        let again = stratified_indices(&y, TestSize::Fraction(0.3), 7).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_singleton_class_rejected() {
        let y = labels(&[("a", 10), ("b", 1)]);
        assert!(matches!(
            stratified_indices(&y, TestSize::Fraction(0.2), 0),
            Err(TrainingError::InvalidSplit(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_split_partitions_rows(
            a in 2usize..40,
            b in 2usize..40,
            c in 2usize..40,
            fraction in 0.1f64..0.5,
            seed in any::<u64>(),
        ) {
            let y = labels(&[("a", a), ("b", b), ("c", c)]);
            let n = y.len();
            if let Ok((train, validation)) = stratified_indices(&y, TestSize::Fraction(fraction), seed) {
                prop_assert_eq!(validation.len(), (fraction * n as f64).ceil() as usize);
                let mut all: Vec<usize> = train.iter().chain(&validation).copied().collect();
                all.sort_unstable();
                prop_assert_eq!(all, (0..n).collect::<Vec<_>>());
                for class in ["a", "b", "c"] {
                    prop_assert!(train.iter().any(|&i| y[i] == class));
                }
            }
        }
    }
}
