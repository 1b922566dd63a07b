//! Column Statistics
//!
//! Missing values (`NaN`) are skipped by every statistic here.

/// Summary statistics of one column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnStatistics {
    /// Number of observed (non-missing) values
    pub count: usize,
    /// Mean of observed values
    pub mean: f64,
    /// Population standard deviation of observed values
    pub std_dev: f64,
    /// Minimum observed value
    pub min: f64,
    /// Maximum observed value
    pub max: f64,
}

impl ColumnStatistics {
    /// Compute statistics over the observed values of a column
    pub fn compute<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a f64>,
    {
        let observed: Vec<f64> = values.into_iter().copied().filter(|v| !v.is_nan()).collect();
        if observed.is_empty() {
            return Self::default();
        }

        let n = observed.len() as f64;
        let mean = observed.iter().sum::<f64>() / n;
        let variance = observed.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let min = observed.iter().cloned().fold(f64::MAX, f64::min);
        let max = observed.iter().cloned().fold(f64::MIN, f64::max);

        Self {
            count: observed.len(),
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
        }
    }
}

/// Median of observed values; `None` when every value is missing
pub fn median<'a, I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut observed: Vec<f64> = values.into_iter().copied().filter(|v| !v.is_nan()).collect();
    if observed.is_empty() {
        return None;
    }
    observed.sort_by(f64::total_cmp);
    let mid = observed.len() / 2;
    if observed.len() % 2 == 0 {
        Some((observed[mid - 1] + observed[mid]) / 2.0)
    } else {
        Some(observed[mid])
    }
}

/// Most frequent observed value, smallest value on ties
pub fn most_frequent<'a, I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut observed: Vec<f64> = values.into_iter().copied().filter(|v| !v.is_nan()).collect();
    observed.sort_by(f64::total_cmp);

    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < observed.len() {
        let value = observed[i];
        let run = observed[i..].iter().take_while(|v| **v == value).count();
        // Ascending scan: strict comparison keeps the smallest tied value
        if best.map_or(true, |(_, count)| run > count) {
            best = Some((value, run));
        }
        i += run;
    }
    best.map(|(value, _)| value)
}

/// Sorted distinct observed values
pub fn distinct_sorted<'a, I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut observed: Vec<f64> = values.into_iter().copied().filter(|v| !v.is_nan()).collect();
    observed.sort_by(f64::total_cmp);
    observed.dedup();
    observed
}
