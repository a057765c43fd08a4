//! Metric evaluation over an extracted window
//!
//! A [`SampleSummary`] aggregates one [`WindowSample`] once (class weights,
//! couples, patches, raw-value moments) and then answers every selected
//! metric from those aggregates. Class maps are ordered so sums are
//! accumulated in the same order on every run.

use std::collections::{BTreeMap, HashMap};

use crate::class_of;
use crate::distance::friction::DistanceField;
use crate::landscape::metric::{BaseMetric, ClassMetric, CoupleMetric, Metric};
use crate::landscape::sample::WindowSample;

/// Which aggregates a metric selection needs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryNeeds {
    pub couples: bool,
    pub patches: bool,
    pub distance_classes: Vec<i64>,
}

impl SummaryNeeds {
    pub fn for_metrics(metrics: &[Metric]) -> Self {
        let mut distance_classes: Vec<i64> = metrics.iter().filter_map(Metric::distance_class).collect();
        distance_classes.sort_unstable();
        distance_classes.dedup();
        Self {
            couples: metrics.iter().any(Metric::needs_couples),
            patches: metrics.iter().any(Metric::is_patch),
            distance_classes,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    weight: f64,
    sum: f64,
    sum_sq: f64,
    min: Option<f64>,
    max: Option<f64>,
}

/// Aggregates of one window
#[derive(Debug, Clone, Default)]
pub struct SampleSummary {
    total_weight: f64,
    valid_weight: f64,
    class_weights: BTreeMap<i64, f64>,
    center_value: Option<f64>,
    couple_total: f64,
    couple_valid: f64,
    couple_hete: f64,
    couples: BTreeMap<(i64, i64), f64>,
    /// (class, weight) of every 4-connected patch
    patches: Vec<(i64, f64)>,
    moments: Moments,
    /// class -> (Σ w·d, Σ w) over cells with a finite distance
    distances: BTreeMap<i64, (f64, f64)>,
}

impl SampleSummary {
    /// Aggregate `sample`; `fields` holds the request-wide distance field of
    /// every class named in `needs.distance_classes`.
    pub fn compute(sample: &WindowSample, needs: &SummaryNeeds, fields: &HashMap<i64, DistanceField>) -> Self {
        let mut s = SampleSummary::default();

        for cell in sample.cells.iter().filter(|c| c.member) {
            s.total_weight += cell.weight;
            let Some(v) = cell.value else { continue };
            s.valid_weight += cell.weight;
            *s.class_weights.entry(class_of(v)).or_insert(0.0) += cell.weight;

            let m = &mut s.moments;
            m.weight += cell.weight;
            m.sum += cell.weight * v;
            m.sum_sq += cell.weight * v * v;
            m.min = Some(m.min.map_or(v, |x| x.min(v)));
            m.max = Some(m.max.map_or(v, |x| x.max(v)));
        }

        s.center_value = sample
            .center
            .and_then(|c| sample.cells.get(c))
            .filter(|c| c.member)
            .and_then(|c| c.value);

        if needs.couples {
            s.collect_couples(sample);
        }
        if needs.patches {
            s.collect_patches(sample);
        }
        for &class in &needs.distance_classes {
            if let Some(field) = fields.get(&class) {
                s.collect_distances(sample, class, field);
            }
        }
        s
    }

    fn collect_couples(&mut self, sample: &WindowSample) {
        let (rows, cols) = (sample.rows, sample.cols);
        let mut visit = |a: usize, b: usize| {
            let (ca, cb) = (&sample.cells[a], &sample.cells[b]);
            if !(ca.member && cb.member) {
                return;
            }
            let w = (ca.weight + cb.weight) / 2.0;
            self.couple_total += w;
            if let (Some(va), Some(vb)) = (ca.value, cb.value) {
                let (x, y) = (class_of(va), class_of(vb));
                self.couple_valid += w;
                if x != y {
                    self.couple_hete += w;
                }
                *self.couples.entry((x.min(y), x.max(y))).or_insert(0.0) += w;
            }
        };
        for r in 0..rows {
            for c in 0..cols {
                let i = r * cols + c;
                if c + 1 < cols {
                    visit(i, i + 1);
                }
                if r + 1 < rows {
                    visit(i, i + cols);
                }
            }
        }
    }

    fn collect_patches(&mut self, sample: &WindowSample) {
        let (rows, cols) = (sample.rows, sample.cols);
        let class_at = |i: usize| {
            let c = &sample.cells[i];
            if c.member { c.value.map(class_of) } else { None }
        };

        let mut visited = vec![false; sample.cells.len()];
        for start in 0..sample.cells.len() {
            if visited[start] {
                continue;
            }
            let Some(class) = class_at(start) else { continue };

            let mut weight = 0.0;
            let mut stack = vec![start];
            visited[start] = true;
            while let Some(i) = stack.pop() {
                weight += sample.cells[i].weight;
                let (r, c) = (i / cols, i % cols);
                let mut push = |j: usize| {
                    if !visited[j] && class_at(j) == Some(class) {
                        visited[j] = true;
                        stack.push(j);
                    }
                };
                if r > 0 { push(i - cols); }
                if r + 1 < rows { push(i + cols); }
                if c > 0 { push(i - 1); }
                if c + 1 < cols { push(i + 1); }
            }
            self.patches.push((class, weight));
        }
    }

    fn collect_distances(&mut self, sample: &WindowSample, class: i64, field: &DistanceField) {
        let mut acc = (0.0, 0.0);
        for (i, cell) in sample.cells.iter().enumerate() {
            if !cell.member || cell.value.is_none() {
                continue;
            }
            let (r, c) = sample.global(i);
            let d = field.get_signed(r, c);
            if d.is_finite() {
                acc.0 += cell.weight * d;
                acc.1 += cell.weight;
            }
        }
        self.distances.insert(class, acc);
    }

    fn class_weight(&self, class: i64) -> f64 {
        self.class_weights.get(&class).copied().unwrap_or(0.0)
    }

    fn ratio(num: f64, den: f64) -> Option<f64> {
        if den > 0.0 { Some(num / den) } else { None }
    }

    fn proportions(&self) -> impl Iterator<Item = f64> + '_ {
        self.class_weights
            .values()
            .filter(|w| **w > 0.0)
            .map(|w| w / self.valid_weight)
    }

    fn shdi(&self) -> f64 {
        -self.proportions().map(|p| p * p.ln()).sum::<f64>()
    }

    fn het(&self) -> f64 {
        1.0 - self.proportions().map(|p| p * p).sum::<f64>()
    }

    fn class_count(&self) -> usize {
        self.class_weights.values().filter(|w| **w > 0.0).count()
    }

    /// Value of `metric`, `None` when its precondition fails (nodata)
    pub fn evaluate(&self, metric: &Metric) -> Option<f64> {
        use BaseMetric::*;

        // basic metrics stay defined on windows without valid cells
        match metric {
            Metric::Base(NTotal) => return Some(self.total_weight),
            Metric::Base(NValid) => return Some(self.valid_weight),
            Metric::Base(PNValid) => return Self::ratio(self.valid_weight, self.total_weight),
            Metric::Base(NcValid) => return Some(self.couple_valid),
            Metric::Base(PNcValid) => return Self::ratio(self.couple_valid, self.couple_total),
            _ => {}
        }
        if self.valid_weight <= 0.0 {
            return None;
        }

        match *metric {
            Metric::Base(b) => self.evaluate_base(b),
            Metric::Class(m, x) => self.evaluate_class(m, x),
            Metric::Couple(m, x, y) => {
                let w = self.couples.get(&(x, y)).copied().unwrap_or(0.0);
                match m {
                    CoupleMetric::Nc => Some(w),
                    CoupleMetric::PNc => Self::ratio(w, self.couple_valid),
                }
            }
        }
    }

    fn evaluate_base(&self, metric: BaseMetric) -> Option<f64> {
        use BaseMetric::*;
        let center_class = self.center_value.map(class_of);
        match metric {
            NTotal | NValid | PNValid | NcValid | PNcValid => None,
            NClass => Some(self.class_count() as f64),
            Central => center_class.map(|c| c as f64),
            PCentral => center_class.map(|c| self.class_weight(c) / self.valid_weight),
            Majority => {
                // ascending classes with a strict comparison: ties go to the smallest class
                let mut best: Option<(i64, f64)> = None;
                for (&class, &w) in &self.class_weights {
                    if best.is_none_or(|(_, bw)| w > bw) {
                        best = Some((class, w));
                    }
                }
                best.map(|(c, _)| c as f64)
            }
            NcHete => Some(self.couple_hete),
            PNcHete => Self::ratio(self.couple_hete, self.couple_valid),
            Shdi => Some(self.shdi()),
            Shei => {
                let n = self.class_count();
                if n <= 1 { Some(0.0) } else { Some(self.shdi() / (n as f64).ln()) }
            }
            Het => Some(self.het()),
            HetFrag => {
                let frag = Self::ratio(self.couple_hete, self.couple_valid).unwrap_or(0.0);
                Some((self.het() + frag) / 2.0)
            }
            Np => Some(self.patches.len() as f64),
            Lpi => {
                let largest = self.patches.iter().map(|p| p.1).fold(0.0, f64::max);
                Some(largest / self.valid_weight)
            }
            Mps => Self::ratio(self.valid_weight, self.patches.len() as f64),
            Average => Self::ratio(self.moments.sum, self.moments.weight),
            Sum => Some(self.moments.sum),
            StandardDeviation => {
                let mean = Self::ratio(self.moments.sum, self.moments.weight)?;
                let var = (self.moments.sum_sq / self.moments.weight - mean * mean).max(0.0);
                Some(var.sqrt())
            }
            Minimum => self.moments.min,
            Maximum => self.moments.max,
            VCentral => self.center_value,
        }
    }

    fn evaluate_class(&self, metric: ClassMetric, class: i64) -> Option<f64> {
        let class_patches = || self.patches.iter().filter(move |p| p.0 == class);
        match metric {
            ClassMetric::Nv => Some(self.class_weight(class)),
            ClassMetric::PNv => Some(self.class_weight(class) / self.valid_weight),
            ClassMetric::NpClass => Some(class_patches().count() as f64),
            ClassMetric::LpiClass => {
                let largest = class_patches().map(|p| p.1).fold(0.0, f64::max);
                Some(largest / self.valid_weight)
            }
            ClassMetric::MpsClass => {
                let n = class_patches().count();
                if n == 0 { Some(0.0) } else { Some(self.class_weight(class) / n as f64) }
            }
            ClassMetric::MeanDistance => {
                let (sum, weight) = self.distances.get(&class).copied()?;
                Self::ratio(sum, weight)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use landgrid_core::raster::{Raster, Window, WindowShape};

    use crate::landscape::sample::Weighting;

    fn summarize(values: Vec<f64>, rows: usize, cols: usize, metrics: &[Metric]) -> SampleSummary {
        let mut grid = Raster::from_vec(values, rows, cols).unwrap();
        grid.set_nodata(Some(-1.0));
        let window = Window::new(WindowShape::Square, rows).unwrap();
        let c = (rows / 2) as isize;
        let sample = WindowSample::extract(&grid, (c, c), &window, Weighting::threshold(), None);
        SampleSummary::compute(&sample, &SummaryNeeds::for_metrics(metrics), &HashMap::new())
    }

    fn m(name: &str) -> Metric {
        name.parse().unwrap()
    }

    #[test]
    fn test_single_class_is_minimum_diversity() {
        let metrics = [m("SHDI"), m("SHEI"), m("HET"), m("HET-frag"), m("Nclass")];
        let s = summarize(vec![4.0; 9], 3, 3, &metrics);
        assert_relative_eq!(s.evaluate(&m("SHDI")).unwrap(), 0.0);
        assert_relative_eq!(s.evaluate(&m("SHEI")).unwrap(), 0.0);
        assert_relative_eq!(s.evaluate(&m("HET")).unwrap(), 0.0);
        assert_relative_eq!(s.evaluate(&m("HET-frag")).unwrap(), 0.0);
        assert_relative_eq!(s.evaluate(&m("Nclass")).unwrap(), 1.0);
    }

    #[test]
    fn test_two_class_window() {
        // 1 1 2
        // 1 2 2
        // 1 1 -1
        let values = vec![1.0, 1.0, 2.0, 1.0, 2.0, 2.0, 1.0, 1.0, -1.0];
        let metrics = [m("SHDI"), m("NP"), m("NC-hete"), m("NC_1-2")];
        let s = summarize(values, 3, 3, &metrics);

        let (p1, p2): (f64, f64) = (5.0 / 8.0, 3.0 / 8.0);
        assert_relative_eq!(s.evaluate(&m("N-total")).unwrap(), 9.0);
        assert_relative_eq!(s.evaluate(&m("N-valid")).unwrap(), 8.0);
        assert_relative_eq!(s.evaluate(&m("SHDI")).unwrap(), -(p1 * p1.ln() + p2 * p2.ln()), epsilon = 1e-12);
        assert_relative_eq!(s.evaluate(&m("HET")).unwrap(), 1.0 - (p1 * p1 + p2 * p2), epsilon = 1e-12);
        assert_relative_eq!(s.evaluate(&m("Majority")).unwrap(), 1.0);
        assert_relative_eq!(s.evaluate(&m("Central")).unwrap(), 2.0);
        assert_relative_eq!(s.evaluate(&m("pCentral")).unwrap(), p2);
        assert_relative_eq!(s.evaluate(&m("NP")).unwrap(), 2.0);
        assert_relative_eq!(s.evaluate(&m("LPI")).unwrap(), 5.0 / 8.0);
        assert_relative_eq!(s.evaluate(&m("MPS")).unwrap(), 4.0);

        // 12 couples in a 3x3 window, 2 touch the nodata corner
        assert_relative_eq!(s.evaluate(&m("NC-valid")).unwrap(), 10.0);
        assert_relative_eq!(s.evaluate(&m("pNC-valid")).unwrap(), 10.0 / 12.0);
        assert_relative_eq!(s.evaluate(&m("NC-hete")).unwrap(), 4.0);
        assert_relative_eq!(s.evaluate(&m("NC_1-2")).unwrap(), 4.0);
        assert_relative_eq!(s.evaluate(&m("pNC-hete")).unwrap(), 0.4);
        assert_relative_eq!(s.evaluate(&m("NV_2")).unwrap(), 3.0);
        assert_relative_eq!(s.evaluate(&m("NV_7")).unwrap(), 0.0);
    }

    #[test]
    fn test_majority_tie_goes_to_smallest_class() {
        let values = vec![3.0, 3.0, 5.0, 5.0, 9.0, 9.0, 1.0, 1.0, -1.0];
        let s = summarize(values, 3, 3, &[]);
        assert_relative_eq!(s.evaluate(&m("Majority")).unwrap(), 1.0);
    }

    #[test]
    fn test_quantitative_metrics() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.5, 6.0, 7.0, 8.0, 9.0];
        let s = summarize(values, 3, 3, &[]);
        assert_relative_eq!(s.evaluate(&m("sum")).unwrap(), 45.5);
        assert_relative_eq!(s.evaluate(&m("average")).unwrap(), 45.5 / 9.0);
        assert_relative_eq!(s.evaluate(&m("minimum")).unwrap(), 1.0);
        assert_relative_eq!(s.evaluate(&m("maximum")).unwrap(), 9.0);
        assert_relative_eq!(s.evaluate(&m("vCentral")).unwrap(), 5.5);
        assert!(s.evaluate(&m("standard_deviation")).unwrap() > 2.0);
    }

    #[test]
    fn test_empty_window_yields_nodata_except_basic() {
        let s = summarize(vec![-1.0; 9], 3, 3, &[m("NP")]);
        assert_relative_eq!(s.evaluate(&m("N-total")).unwrap(), 9.0);
        assert_relative_eq!(s.evaluate(&m("N-valid")).unwrap(), 0.0);
        assert_relative_eq!(s.evaluate(&m("pN-valid")).unwrap(), 0.0);
        assert!(s.evaluate(&m("SHDI")).is_none());
        assert!(s.evaluate(&m("NP")).is_none());
        assert!(s.evaluate(&m("average")).is_none());
    }

    #[test]
    fn test_mean_distance_uses_field() {
        let grid = Raster::filled(3, 3, 1.0);
        let window = Window::new(WindowShape::Square, 3).unwrap();
        let sample = WindowSample::extract(&grid, (1, 1), &window, Weighting::threshold(), None);

        let mut values = vec![2.0; 9];
        values[0] = f64::INFINITY;
        let field = DistanceField::new(crate::distance::friction::Extent::full(3, 3), values);
        let mut fields = HashMap::new();
        fields.insert(5, field);

        let metric = m("MD_5");
        let s = SampleSummary::compute(&sample, &SummaryNeeds::for_metrics(&[metric]), &fields);
        assert_relative_eq!(s.evaluate(&metric).unwrap(), 2.0);
    }
}
