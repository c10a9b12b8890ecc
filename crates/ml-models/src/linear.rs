/// Ordinary least squares of y on a single regressor x.
#[derive(Debug, Clone, Copy)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl LinearFit {
    /// Fit y = intercept + slope * x. Returns None when there are fewer
    /// than 2 points or x has no variance.
    pub fn fit(x: &[f64], y: &[f64]) -> Option<Self> {
        let n = x.len().min(y.len());
        if n < 2 {
            return None;
        }
        let nf = n as f64;
        let x_mean = x[..n].iter().sum::<f64>() / nf;
        let y_mean = y[..n].iter().sum::<f64>() / nf;

        let mut ss_xy = 0.0;
        let mut ss_xx = 0.0;
        let mut ss_yy = 0.0;
        for i in 0..n {
            let dx = x[i] - x_mean;
            let dy = y[i] - y_mean;
            ss_xy += dx * dy;
            ss_xx += dx * dx;
            ss_yy += dy * dy;
        }

        if ss_xx < 1e-15 {
            return None;
        }

        let slope = ss_xy / ss_xx;
        let intercept = y_mean - slope * x_mean;
        let r_squared = if ss_yy > 1e-15 {
            (ss_xy * ss_xy) / (ss_xx * ss_yy)
        } else {
            0.0
        };

        Some(Self {
            slope,
            intercept,
            r_squared,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}
