use serde::{Deserialize, Serialize};

/// Heuristic for how many photos a single row may span during row-break search.
///
/// The estimate assumes photos average `assumed_aspect` (landscape 3:2), takes the
/// minimum photos-per-row that implies, and adds `slack` so rows of portraits or
/// panoramas are not cut short. These are empirical values; tune per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchWindowHeuristic {
    pub assumed_aspect: f64,
    pub slack: usize,
    /// Below this container width the estimate grows too slowly to be useful.
    pub min_width: f64,
    pub fallback: usize,
}

impl Default for SearchWindowHeuristic {
    fn default() -> Self {
        Self {
            assumed_aspect: 1.5,
            slack: 8,
            min_width: 450.0,
            fallback: 2,
        }
    }
}

impl SearchWindowHeuristic {
    /// Estimates the search window for a container. Always at least 1.
    pub fn estimate(&self, container_width: f64, target_row_height: f64) -> usize {
        if container_width < self.min_width
            || target_row_height <= 0.0
            || self.assumed_aspect <= 0.0
        {
            return self.fallback.max(1);
        }
        let row_aspect = container_width / target_row_height;
        let per_row = (row_aspect / self.assumed_aspect).round().max(0.0) as usize;
        (per_row + self.slack).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_typical_width() {
        let h = SearchWindowHeuristic::default();
        // 1200 / 240 = 5, 5 / 1.5 = 3.33 -> 3, + 8
        assert_eq!(h.estimate(1200.0, 240.0), 11);
        // 1920 / 240 = 8, 8 / 1.5 = 5.33 -> 5, + 8
        assert_eq!(h.estimate(1920.0, 240.0), 13);
    }

    #[test]
    fn test_small_width_fallback() {
        let h = SearchWindowHeuristic::default();
        assert_eq!(h.estimate(449.0, 240.0), 2);
        assert_eq!(h.estimate(0.0, 240.0), 2);
        assert_eq!(h.estimate(450.0, 240.0), 9);
    }

    #[test]
    fn test_never_zero() {
        let h = SearchWindowHeuristic {
            assumed_aspect: 1.5,
            slack: 0,
            min_width: 0.0,
            fallback: 0,
        };
        assert_eq!(h.estimate(10.0, 240.0), 1);
        assert_eq!(h.estimate(10.0, 0.0), 1);
    }
}
