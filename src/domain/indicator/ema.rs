//! Exponential moving average.
//!
//! α = 2/(n+1), seeded with the SMA of the first n closes, then
//! EMA[i] = α·C[i] + (1-α)·EMA[i-1]. The first n-1 updates yield nothing.

#[derive(Debug, Clone)]
pub struct ExponentialSmoother {
    period: usize,
    alpha: f64,
    seed_sum: f64,
    seen: usize,
    value: Option<f64>,
}

pub fn smoothing_factor(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

impl ExponentialSmoother {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            alpha: smoothing_factor(period),
            seed_sum: 0.0,
            seen: 0,
            value: None,
        }
    }

    pub fn push(&mut self, close: f64) -> Option<f64> {
        self.seen += 1;
        match self.value {
            Some(prev) => {
                self.value = Some(self.alpha * close + (1.0 - self.alpha) * prev);
            }
            None => {
                self.seed_sum += close;
                if self.seen == self.period {
                    self.value = Some(self.seed_sum / self.period as f64);
                }
            }
        }
        self.value
    }

    pub fn current(&self) -> Option<f64> {
        self.value
    }
}
