// ============================================================
// Layer 3 — Step Metrics
// ============================================================
// Named scalars reported by one training or evaluation step,
// e.g. [("loss", 1.93), ("disrc_src_loss", 0.71), ...].
// Order is the graph's reporting order and is preserved when
// averaging over an evaluation pass.

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metrics {
    values: Vec<(String, f64)>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.push(name, value);
        self
    }

    /// Add or overwrite a named value.
    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None       => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Running element-wise mean over several Metrics.
#[derive(Debug, Default)]
pub struct MetricsMean {
    sums:  Metrics,
    count: usize,
}

impl MetricsMean {
    pub fn add(&mut self, m: &Metrics) {
        for (name, value) in m.iter() {
            let prev = self.sums.get(name).unwrap_or(0.0);
            self.sums.push(name, prev + value);
        }
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean of everything added so far; empty when nothing was added.
    pub fn mean(&self) -> Metrics {
        if self.count == 0 {
            return Metrics::new();
        }
        let n = self.count as f64;
        let mut out = Metrics::new();
        for (name, sum) in self.sums.iter() {
            out.push(name, sum / n);
        }
        out
    }
}
