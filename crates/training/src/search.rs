//! Hyperparameter Search
//!
//! Randomized search over a discrete grid, scored by stratified k-fold
//! cross-validation. Candidate x fold fits run on a rayon pool; scores are
//! collected in index order so the outcome never depends on scheduling.

use crate::config::{TrainingConfig, DEFAULT_SEARCH_SEED};
use crate::dataset::EncodedSplit;
use crate::evaluation::{evaluate, MetricsRecord, Scoring};
use crate::TrainingError;
use chrono::{DateTime, Utc};
use classifiers::{thread_pool, Estimator, ModelFamily};
use feature_engine::Frame;
use inference_engine::{ModelPipeline, Pipeline};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use storage::{ArtifactKind, ArtifactStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Search report file name
pub const REPORT_FILE: &str = "tuning_report.json";

/// One parameter assignment
pub type ParamSet = BTreeMap<String, Value>;

/// Draws distinct assignments from a grid.
///
/// Keys are visited in sorted order and every combination has a mixed-radix
/// index, the last key varying fastest.
#[derive(Debug, Clone)]
pub struct ParameterSampler<'a> {
    grid: &'a BTreeMap<String, Vec<Value>>,
    total: usize,
}

impl<'a> ParameterSampler<'a> {
    pub fn new(grid: &'a BTreeMap<String, Vec<Value>>) -> Result<Self, TrainingError> {
        if let Some((key, _)) = grid.iter().find(|(_, values)| values.is_empty()) {
            return Err(TrainingError::InvalidSearch(format!(
                "parameter {} has no candidate values",
                key
            )));
        }
        let total = grid
            .values()
            .try_fold(1usize, |acc, values| acc.checked_mul(values.len()))
            .ok_or_else(|| TrainingError::InvalidSearch("grid is too large".to_string()))?;
        Ok(Self { grid, total })
    }

    /// Number of distinct combinations
    pub fn grid_size(&self) -> usize {
        self.total
    }

    /// Combination at mixed-radix `index`
    pub fn combination(&self, mut index: usize) -> ParamSet {
        let mut set = ParamSet::new();
        for (key, values) in self.grid.iter().rev() {
            set.insert(key.clone(), values[index % values.len()].clone());
            index /= values.len();
        }
        set
    }

    /// `n_iter` distinct combinations; the whole grid in index order when
    /// `n_iter` covers it
    pub fn sample(&self, n_iter: usize, seed: u64) -> Vec<ParamSet> {
        if n_iter >= self.total {
            return (0..self.total).map(|i| self.combination(i)).collect();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        rand::seq::index::sample(&mut rng, self.total, n_iter)
            .into_iter()
            .map(|i| self.combination(i))
            .collect()
    }
}

/// Stratified k-fold without shuffling.
///
/// Rows of each class keep their order and are dealt to folds in
/// contiguous runs, so every fold holds a near-equal share of each class.
pub fn stratified_k_fold(
    y: &[usize],
    n_splits: usize,
) -> Result<Vec<(Vec<usize>, Vec<usize>)>, TrainingError> {
    if n_splits < 2 {
        return Err(TrainingError::InvalidSearch(format!(
            "cv must be at least 2, got {}",
            n_splits
        )));
    }
    let n_classes = y.iter().max().map_or(0, |&m| m + 1);
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        counts[label] += 1;
    }
    let largest = counts.iter().copied().max().unwrap_or(0);
    if n_splits > largest {
        return Err(TrainingError::InvalidSearch(format!(
            "cv={} exceeds the largest class size {}",
            n_splits, largest
        )));
    }
    if let Some(smallest) = counts.iter().copied().filter(|&c| c > 0).min() {
        if smallest < n_splits {
            warn!(
                "Smallest class has {} rows, fewer than cv={}",
                smallest, n_splits
            );
        }
    }

    // Dealing sorted labels round-robin fixes how many rows of each class
    // land in each fold.
    let mut sorted = y.to_vec();
    sorted.sort_unstable();
    let mut allocation = vec![vec![0usize; n_classes]; n_splits];
    for (i, &label) in sorted.iter().enumerate() {
        allocation[i % n_splits][label] += 1;
    }

    let mut fold_of = vec![0usize; y.len()];
    let mut cursor = vec![(0usize, 0usize); n_classes];
    for (row, &label) in y.iter().enumerate() {
        let (fold, used) = &mut cursor[label];
        while *used == allocation[*fold][label] {
            *fold += 1;
            *used = 0;
        }
        fold_of[row] = *fold;
        *used += 1;
    }

    Ok((0..n_splits)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..y.len()).partition(|&row| fold_of[row] == fold);
            (train, test)
        })
        .collect())
}

/// Cross-validated score of one assignment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    pub params: ParamSet,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    pub rank: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub candidates: Vec<CandidateScore>,
    pub best_index: usize,
}

impl SearchResult {
    pub fn best(&self) -> &CandidateScore {
        &self.candidates[self.best_index]
    }
}

/// Randomized search settings around a base estimator
#[derive(Debug, Clone)]
pub struct RandomizedSearch {
    pub base: Estimator,
    pub grid: BTreeMap<String, Vec<Value>>,
    pub n_iter: usize,
    pub cv: usize,
    pub scoring: Scoring,
    pub n_jobs: i32,
    pub random_state: u64,
}

fn score_fold(
    estimator: &Estimator,
    frame: &Frame,
    y: &[usize],
    n_classes: usize,
    (train, test): &(Vec<usize>, Vec<usize>),
    scoring: Scoring,
) -> Result<f64, TrainingError> {
    let y_train: Vec<usize> = train.iter().map(|&i| y[i]).collect();
    let y_test: Vec<usize> = test.iter().map(|&i| y[i]).collect();
    let pipeline =
        Pipeline::new(estimator.clone()).fit(&frame.select_rows(train), &y_train, n_classes)?;
    let predicted = pipeline.predict(&frame.select_rows(test))?;
    Ok(scoring.score(&y_test, &predicted, n_classes))
}

/// Mean and population standard deviation
fn mean_std(scores: &[f64]) -> (f64, f64) {
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Rank 1 is best; equal means share the lower rank; NaN ranks last
fn ranks(means: &[f64]) -> Vec<usize> {
    means
        .iter()
        .map(|&m| {
            if m.is_nan() {
                means.iter().filter(|v| !v.is_nan()).count() + 1
            } else {
                means.iter().filter(|&&v| !v.is_nan() && v > m).count() + 1
            }
        })
        .collect()
}

impl RandomizedSearch {
    pub fn fit(
        &self,
        frame: &Frame,
        y: &[usize],
        n_classes: usize,
    ) -> Result<SearchResult, TrainingError> {
        if self.n_iter == 0 {
            return Err(TrainingError::InvalidSearch("n_iter must be at least 1".to_string()));
        }
        let sampler = ParameterSampler::new(&self.grid)?;
        let param_sets = sampler.sample(self.n_iter, self.random_state);
        let folds = stratified_k_fold(y, self.cv)?;
        info!(
            "Fitting {} folds for each of {} candidates ({} fits, grid size {})",
            folds.len(),
            param_sets.len(),
            folds.len() * param_sets.len(),
            sampler.grid_size()
        );

        let estimators: Vec<Result<Estimator, String>> = param_sets
            .iter()
            .map(|params| self.base.with_overrides(params).map_err(|e| e.to_string()))
            .collect();

        let tasks: Vec<(usize, usize)> = (0..param_sets.len())
            .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
            .collect();
        let pool = thread_pool(self.n_jobs)?;
        let scores: Vec<f64> = pool.install(|| {
            tasks
                .par_iter()
                .map(|&(c, f)| match &estimators[c] {
                    Ok(estimator) => {
                        match score_fold(estimator, frame, y, n_classes, &folds[f], self.scoring) {
                            Ok(score) => score,
                            Err(e) => {
                                debug!("Candidate {} fold {} failed: {}", c, f, e);
                                f64::NAN
                            }
                        }
                    }
                    Err(_) => f64::NAN,
                })
                .collect()
        });

        let mut candidates: Vec<CandidateScore> = param_sets
            .into_iter()
            .zip(estimators)
            .zip(scores.chunks(folds.len()))
            .map(|((params, estimator), fold_scores)| {
                let (mean_score, std_score) = mean_std(fold_scores);
                let error = match estimator {
                    Err(e) => Some(e),
                    Ok(_) if mean_score.is_nan() => Some("one or more folds failed".to_string()),
                    Ok(_) => None,
                };
                CandidateScore {
                    params,
                    fold_scores: fold_scores.to_vec(),
                    mean_score,
                    std_score,
                    rank: 0,
                    error,
                }
            })
            .collect();

        let means: Vec<f64> = candidates.iter().map(|c| c.mean_score).collect();
        for (candidate, rank) in candidates.iter_mut().zip(ranks(&means)) {
            candidate.rank = rank;
        }

        let mut best: Option<usize> = None;
        for (i, &mean) in means.iter().enumerate() {
            if mean.is_nan() {
                continue;
            }
            if best.map_or(true, |b| mean > means[b]) {
                best = Some(i);
            }
        }
        let best_index = best.ok_or(TrainingError::NoSuccessfulCandidate)?;
        info!(
            "Best CV score {:.4} with {:?}",
            means[best_index], candidates[best_index].params
        );
        Ok(SearchResult {
            candidates,
            best_index,
        })
    }
}

/// Contents of `tuning_report.json`
#[derive(Debug, Clone, Serialize)]
pub struct TuningReport {
    pub run_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub family: ModelFamily,
    pub scoring: Scoring,
    pub n_iter: usize,
    pub cv: usize,
    pub best_params: ParamSet,
    pub best_score: f64,
    pub candidates: Vec<CandidateScore>,
}

/// Tuned pipeline, its validation metrics and the search report
#[derive(Debug, Clone)]
pub struct TuningOutcome {
    pub pipeline: ModelPipeline,
    pub metrics: MetricsRecord,
    pub report: TuningReport,
}

/// Search `family`, refit the best assignment on the whole training split,
/// evaluate it on validation and persist the result
pub fn tune(
    config: &TrainingConfig,
    family: ModelFamily,
    data: &EncodedSplit,
    store: &ArtifactStore,
) -> Result<TuningOutcome, TrainingError> {
    let grid = config
        .tuning
        .grid_for(family)
        .ok_or_else(|| TrainingError::MissingGrid(family.name().to_string()))?;
    let base = Estimator::from_value(family, &config.model_params(family))?
        .with_random_state(DEFAULT_SEARCH_SEED);

    let search = RandomizedSearch {
        base,
        grid: grid.param_grid.clone(),
        n_iter: config.tuning.n_iter,
        cv: config.tuning.cv,
        scoring: config.tuning.scoring,
        n_jobs: config.tuning.n_jobs,
        random_state: config.search_seed(),
    };
    info!(
        "Tuning {} ({} iterations, {}-fold, scoring {:?})",
        family, search.n_iter, search.cv, search.scoring
    );
    let result = search.fit(&data.train, &data.y_train, data.encoder.n_classes())?;
    let best = result.best();

    let estimator = search.base.with_overrides(&best.params)?;
    let pipeline = Pipeline::new(estimator).fit(&data.train, &data.y_train, data.encoder.n_classes())?;
    let name = format!("tuned_{}", family.name());
    let metrics = evaluate(
        &pipeline,
        &data.validation,
        &data.y_validation,
        &data.encoder,
        &name,
    )?;

    let report = TuningReport {
        run_id: Uuid::new_v4(),
        finished_at: Utc::now(),
        family,
        scoring: search.scoring,
        n_iter: search.n_iter,
        cv: search.cv,
        best_params: best.params.clone(),
        best_score: best.mean_score,
        candidates: result.candidates.clone(),
    };

    store.save(ArtifactKind::Pipeline, &pipeline)?;
    store.save(ArtifactKind::LabelEncoder, &data.encoder)?;
    store.write_json(&format!("metrics_{}.json", name), &metrics)?;
    store.write_json(REPORT_FILE, &report)?;
    info!("Tuned {} saved to {}", family, store.root().display());

    Ok(TuningOutcome {
        pipeline,
        metrics,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::encoded_split;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn grid() -> BTreeMap<String, Vec<Value>> {
        let mut grid = BTreeMap::new();
        grid.insert("model__max_depth".to_string(), vec![json!(2), json!(3), json!(null)]);
        grid.insert("model__min_samples_leaf".to_string(), vec![json!(1), json!(2)]);
        grid
    }

    #[test]
    fn test_sampler_covers_grid_when_n_iter_large() {
        let grid = grid();
        let sampler = ParameterSampler::new(&grid).unwrap();
        assert_eq!(sampler.grid_size(), 6);
        let all = sampler.sample(10, 1);
        assert_eq!(all.len(), 6);
        assert_eq!(all[0]["model__max_depth"], json!(2));
        assert_eq!(all[1]["model__min_samples_leaf"], json!(2));
    }

    #[test]
    fn test_empty_value_list_rejected() {
        let mut grid = grid();
        grid.insert("model__criterion".to_string(), vec![]);
        assert!(ParameterSampler::new(&grid).is_err());
    }

    proptest! {
        #[test]
        fn prop_sampling_without_replacement(n_iter in 1usize..6, seed in any::<u64>()) {
            let grid = grid();
            let sampler = ParameterSampler::new(&grid).unwrap();
            let drawn = sampler.sample(n_iter, seed);
            prop_assert_eq!(drawn.len(), n_iter);
            let distinct: BTreeSet<String> = drawn
                .iter()
                .map(|set| serde_json::to_string(set).unwrap())
                .collect();
            prop_assert_eq!(distinct.len(), n_iter);
            prop_assert_eq!(sampler.sample(n_iter, seed), drawn);
        }

        #[test]
        fn prop_k_fold_covers_every_row_once(
            labels in prop::collection::vec(0usize..3, 12..60),
            k in 2usize..5,
        ) {
            let folds = match stratified_k_fold(&labels, k) {
                Ok(folds) => folds,
                Err(_) => return Ok(()),
            };
            prop_assert_eq!(folds.len(), k);
            let mut seen = vec![0usize; labels.len()];
            for (train, test) in &folds {
                prop_assert_eq!(train.len() + test.len(), labels.len());
                for &row in test {
                    seen[row] += 1;
                }
            }
            prop_assert!(seen.iter().all(|&c| c == 1));
        }
    }

    #[test]
    fn test_k_fold_is_stratified() {
        let y: Vec<usize> = (0..30).map(|i| if i < 20 { 0 } else { 1 }).collect();
        let folds = stratified_k_fold(&y, 5).unwrap();
        for (_, test) in &folds {
            assert_eq!(test.iter().filter(|&&i| y[i] == 0).count(), 4);
            assert_eq!(test.iter().filter(|&&i| y[i] == 1).count(), 2);
        }
        assert!(stratified_k_fold(&y, 1).is_err());
        assert!(stratified_k_fold(&y, 21).is_err());
    }

    #[test]
    fn test_ranks_handle_ties_and_nan() {
        assert_eq!(ranks(&[0.5, 0.9, f64::NAN, 0.9]), vec![3, 1, 4, 1]);
    }

    #[test]
    fn test_failed_candidate_cannot_win() {
        let data = encoded_split();
        let mut grid = BTreeMap::new();
        grid.insert("model__n_neighbors".to_string(), vec![json!(0), json!(3)]);
        let search = RandomizedSearch {
            base: Estimator::default_for(ModelFamily::Knn),
            grid,
            n_iter: 2,
            cv: 3,
            scoring: Scoring::Accuracy,
            n_jobs: 2,
            random_state: 42,
        };
        let result = search.fit(&data.train, &data.y_train, data.encoder.n_classes()).unwrap();
        assert_eq!(result.candidates.len(), 2);
        assert!(result.candidates[0].mean_score.is_nan());
        assert!(result.candidates[0].error.is_some());
        assert_eq!(result.best_index, 1);
        assert_eq!(result.best().rank, 1);
    }

    #[test]
    fn test_tune_persists_report() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let config = TrainingConfig::from_yaml(
            r#"
tuning:
  n_iter: 2
  cv: 3
  n_jobs: 1
  DecisionTree:
    param_grid:
      model__max_depth: [1, 3, 5]
"#,
        )
        .unwrap();

        let outcome = tune(&config, ModelFamily::DecisionTree, &encoded_split(), &store).unwrap();
        assert_eq!(outcome.report.candidates.len(), 2);
        assert_eq!(outcome.pipeline.family(), ModelFamily::DecisionTree);
        assert!(store.exists(ArtifactKind::Pipeline));
        assert!(dir.path().join("metrics_tuned_DecisionTree.json").exists());
        let report: Value = store.read_json(REPORT_FILE).unwrap();
        assert_eq!(report["family"], json!("DecisionTree"));
    }

    #[test]
    fn test_tune_without_grid() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let err = tune(
            &TrainingConfig::default(),
            ModelFamily::GradientBoosting,
            &encoded_split(),
            &store,
        )
        .unwrap_err();
        assert!(matches!(err, TrainingError::MissingGrid(_)));
    }
}
