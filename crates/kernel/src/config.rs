//! Run-time options of the Boolean engine.

use serde::{Deserialize, Serialize};

use crate::error::OptionsError;

/// Tunables for one Boolean run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BooleanOptions {
    /// Extra distance added to every tolerance comparison (fuzzy mode).
    pub fuzzy_value: f64,
    /// Run data-parallel stages on a thread pool.
    pub run_parallel: bool,
    /// Worker count; `0` uses the available hardware threads.
    pub workers: usize,
    /// Iteration cap of every Newton-type solver.
    pub newton_max_iterations: usize,
    /// Step cap of the surface/surface marcher.
    pub marching_max_steps: usize,
    /// Marching step as a fraction of the smaller face diagonal.
    pub marching_step_ratio: f64,
    /// Base number of samples per curve for seeding and bounding.
    pub curve_samples: usize,
    /// Ray directions tried before a point is declared UNKNOWN.
    pub classifier_max_rays: usize,
    /// Angle below which two directions are treated as parallel (radians).
    pub angular_tolerance: f64,
}

impl Default for BooleanOptions {
    fn default() -> Self {
        Self {
            fuzzy_value: 0.0,
            run_parallel: true,
            workers: 0,
            newton_max_iterations: 50,
            marching_max_steps: 2000,
            marching_step_ratio: 0.02,
            curve_samples: 16,
            classifier_max_rays: 7,
            angular_tolerance: 1e-9,
        }
    }
}

impl BooleanOptions {
    /// Single-threaded run with default tolerances.
    pub fn sequential() -> Self {
        Self {
            run_parallel: false,
            workers: 1,
            ..Self::default()
        }
    }

    /// Default options with an additional fuzzy distance.
    pub fn with_fuzzy(fuzzy_value: f64) -> Self {
        Self {
            fuzzy_value: fuzzy_value.max(0.0),
            ..Self::default()
        }
    }

    /// Parse options from JSON; missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, OptionsError> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if !self.fuzzy_value.is_finite() || self.fuzzy_value < 0.0 {
            return Err(OptionsError::Invalid {
                field: "fuzzy_value",
                reason: "must be a finite non-negative distance".into(),
            });
        }
        if !(self.marching_step_ratio > 0.0 && self.marching_step_ratio < 1.0) {
            return Err(OptionsError::Invalid {
                field: "marching_step_ratio",
                reason: "must lie in (0, 1)".into(),
            });
        }
        if self.classifier_max_rays == 0 {
            return Err(OptionsError::Invalid {
                field: "classifier_max_rays",
                reason: "at least one ray is required".into(),
            });
        }
        if self.newton_max_iterations == 0 || self.curve_samples < 2 {
            return Err(OptionsError::Invalid {
                field: "newton_max_iterations",
                reason: "solver caps must be positive and curves need two samples".into(),
            });
        }
        Ok(())
    }

    /// Resolved worker count.
    pub fn worker_count(&self) -> usize {
        if !self.run_parallel {
            return 1;
        }
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let seq = BooleanOptions::sequential();
        assert!(!seq.run_parallel);
        assert_eq!(seq.worker_count(), 1);
        let fuzzy = BooleanOptions::with_fuzzy(1e-3);
        assert_eq!(fuzzy.fuzzy_value, 1e-3);
        assert!(BooleanOptions::default().validate().is_ok());
    }

    #[test]
    fn test_from_json_keeps_defaults() {
        let opts = BooleanOptions::from_json(r#"{ "fuzzy_value": 0.01, "workers": 3 }"#).unwrap();
        assert_eq!(opts.fuzzy_value, 0.01);
        assert_eq!(opts.workers, 3);
        assert_eq!(opts.classifier_max_rays, BooleanOptions::default().classifier_max_rays);
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        assert!(matches!(
            BooleanOptions::from_json(r#"{ "fuzzy_value": -1.0 }"#),
            Err(OptionsError::Invalid { field: "fuzzy_value", .. })
        ));
        assert!(matches!(BooleanOptions::from_json("not json"), Err(OptionsError::Json(_))));
    }
}
