// grid.rs

/// One (phi2, omega2) point of the effect-size prior.
///
/// `phi2` is the heterogeneity of the effect between subgroups, `oma2` the
/// prior variance of the average effect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridPoint {
    pub phi2: f64,
    pub oma2: f64,
}

impl GridPoint {
    pub fn new(phi2: f64, oma2: f64) -> Self {
        Self { phi2, oma2 }
    }

    /// No heterogeneity: the whole prior variance goes to the average effect.
    pub fn fixed_effect(&self) -> GridPoint {
        GridPoint::new(0.0, self.phi2 + self.oma2)
    }

    /// Maximal heterogeneity: the whole prior variance goes to the deviations.
    pub fn max_heterogeneity(&self) -> GridPoint {
        GridPoint::new(self.phi2 + self.oma2, 0.0)
    }
}

/// Ordered hyperparameter grid with its averaging weights.
#[derive(Clone, Debug)]
pub struct HyperGrid {
    points: Vec<GridPoint>,
    weights: Vec<f64>,
}

impl HyperGrid {
    /// Equally weighted grid.
    pub fn uniform(points: Vec<GridPoint>) -> Self {
        let w = 1.0 / points.len().max(1) as f64;
        let weights = vec![w; points.len()];
        Self { points, weights }
    }

    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
