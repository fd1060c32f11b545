//! Pairwise intersection of sub-shapes.
//!
//! Every function here is pure: it reads geometry and returns hits. The pave
//! filler decides what to create from them.

pub mod edge_edge;
pub mod edge_face;
pub mod face_face;
pub mod marching;
pub mod vertex;

use thiserror::Error;

/// Why a pair could not be intersected at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntersectError {
    #[error("unsupported geometry: {0}")]
    Unsupported(String),
}

/// Hits of one pair. `converged` is false when at least one hit is a coarse
/// fallback taken after a solver ran out of iterations.
#[derive(Debug, Clone, PartialEq)]
pub struct Hits<T> {
    pub items: Vec<T>,
    pub converged: bool,
}

impl<T> Hits<T> {
    pub fn none() -> Self {
        Self {
            items: Vec::new(),
            converged: true,
        }
    }

    pub fn exact(items: Vec<T>) -> Self {
        Self { items, converged: true }
    }
}

/// Numeric settings shared by the intersectors.
#[derive(Debug, Clone, Copy)]
pub struct SolverSettings {
    pub samples: usize,
    pub max_iterations: usize,
    pub angular: f64,
    pub marching_step_ratio: f64,
    pub marching_max_steps: usize,
}

impl SolverSettings {
    pub fn from_options(options: &crate::config::BooleanOptions) -> Self {
        Self {
            samples: options.curve_samples,
            max_iterations: options.newton_max_iterations,
            angular: options.angular_tolerance,
            marching_step_ratio: options.marching_step_ratio,
            marching_max_steps: options.marching_max_steps,
        }
    }
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self::from_options(&crate::config::BooleanOptions::default())
    }
}

/// Split `[lo, hi]` into the maximal sub-intervals where `inside` holds,
/// sampling `n` steps and bisecting each transition.
pub(crate) fn runs_where(lo: f64, hi: f64, n: usize, inside: impl Fn(f64) -> bool, min_len: f64) -> Vec<(f64, f64)> {
    let n = n.max(2);
    let ts: Vec<f64> = (0..=n).map(|i| lo + (hi - lo) * i as f64 / n as f64).collect();
    let flags: Vec<bool> = ts.iter().map(|t| inside(*t)).collect();
    let refine = |a: f64, b: f64, a_inside: bool| -> f64 {
        let (mut a, mut b) = (a, b);
        for _ in 0..50 {
            let m = 0.5 * (a + b);
            if inside(m) == a_inside {
                a = m;
            } else {
                b = m;
            }
        }
        if a_inside { a } else { b }
    };
    let mut out = Vec::new();
    let mut start: Option<f64> = None;
    for i in 0..ts.len() {
        match (flags[i], start) {
            (true, None) => {
                start = Some(if i == 0 { ts[0] } else { refine(ts[i - 1], ts[i], false) });
            }
            (false, Some(s)) => {
                let end = refine(ts[i - 1], ts[i], true);
                if end - s > min_len {
                    out.push((s, end));
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        if hi - s > min_len {
            out.push((s, hi));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_where_refines_ends() {
        let runs = runs_where(0.0, 10.0, 20, |t| (2.3..=7.1).contains(&t), 1e-9);
        assert_eq!(runs.len(), 1);
        assert!((runs[0].0 - 2.3).abs() < 1e-9);
        assert!((runs[0].1 - 7.1).abs() < 1e-9);
    }

    #[test]
    fn test_runs_where_whole_range() {
        let runs = runs_where(-1.0, 1.0, 8, |_| true, 0.0);
        assert_eq!(runs, vec![(-1.0, 1.0)]);
    }
}
