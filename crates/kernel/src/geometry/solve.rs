//! Small numeric solvers shared by the intersection code.

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};

// ─── Polynomial roots ───────────────────────────────────────────────────────

/// Real roots of `a*x^2 + b*x + c = 0`. Degrades to the linear case.
pub fn solve_quadratic(a: f64, b: f64, c: f64) -> Vec<f64> {
    if a.abs() < 1e-15 {
        if b.abs() < 1e-15 {
            return vec![];
        }
        return vec![-c / b];
    }
    let disc = b * b - 4.0 * a * c;
    if disc < -1e-15 {
        return vec![];
    }
    let disc = disc.max(0.0).sqrt();
    // Citardauq form avoids cancellation for the smaller root.
    let q = -0.5 * (b + b.signum() * disc);
    if q.abs() < 1e-300 {
        return vec![0.0];
    }
    vec![q / a, c / q]
}

/// Real roots of a cubic (Cardano / trigonometric form).
pub fn solve_cubic(a: f64, b: f64, c: f64, d: f64) -> Vec<f64> {
    if a.abs() < 1e-15 {
        return solve_quadratic(b, c, d);
    }
    let p = b / a;
    let q = c / a;
    let r = d / a;

    let a_dep = q - p * p / 3.0;
    let b_dep = r - p * q / 3.0 + 2.0 * p * p * p / 27.0;
    let shift = -p / 3.0;

    let disc = -4.0 * a_dep * a_dep * a_dep - 27.0 * b_dep * b_dep;
    if disc > 1e-15 {
        let m = (-a_dep / 3.0).sqrt();
        let theta = (-b_dep / (2.0 * m * m * m)).clamp(-1.0, 1.0).acos() / 3.0;
        let third = 2.0 * std::f64::consts::PI / 3.0;
        vec![
            2.0 * m * theta.cos() + shift,
            2.0 * m * (theta - third).cos() + shift,
            2.0 * m * (theta + third).cos() + shift,
        ]
    } else {
        let half_b = b_dep / 2.0;
        let inner = half_b * half_b + a_dep * a_dep * a_dep / 27.0;
        let sqrt_inner = inner.max(0.0).sqrt();
        vec![(-half_b + sqrt_inner).cbrt() + (-half_b - sqrt_inner).cbrt() + shift]
    }
}

/// Real roots of a quartic via Ferrari's resolvent, each polished by Newton.
pub fn solve_quartic(a: f64, b: f64, c: f64, d: f64, e: f64) -> Vec<f64> {
    if a.abs() < 1e-15 {
        return solve_cubic(b, c, d, e);
    }
    let p = b / a;
    let q = c / a;
    let r = d / a;
    let s = e / a;

    let p2 = p * p;
    let alpha = q - 3.0 * p2 / 8.0;
    let beta = r - p * q / 2.0 + p2 * p / 8.0;
    let gamma = s - p * r / 4.0 + p2 * q / 16.0 - 3.0 * p2 * p2 / 256.0;
    let shift = -p / 4.0;

    let mut roots = Vec::new();
    if beta.abs() < 1e-15 {
        let disc = alpha * alpha - 4.0 * gamma;
        if disc < -1e-15 {
            return roots;
        }
        let disc = disc.max(0.0).sqrt();
        for u2 in [(-alpha + disc) / 2.0, (-alpha - disc) / 2.0] {
            if u2 >= -1e-15 {
                let u = u2.max(0.0).sqrt();
                roots.push(u + shift);
                if u > 1e-10 {
                    roots.push(-u + shift);
                }
            }
        }
    } else {
        // Resolvent of (u^2 + y)^2 = (2y - alpha) u^2 - beta u + y^2 - gamma.
        // Its largest root keeps 2y - alpha positive whenever beta != 0.
        let cubic = solve_cubic(1.0, -alpha / 2.0, -gamma, alpha * gamma / 2.0 - beta * beta / 8.0);
        let y = cubic.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let w2 = 2.0 * y - alpha;
        if w2 < -1e-12 {
            return roots;
        }
        let w = w2.max(0.0).sqrt();
        if w < 1e-12 {
            return roots;
        }
        let bw = beta / (2.0 * w);
        for (sign_w, offset) in [(1.0, y + bw), (-1.0, y - bw)] {
            let disc = w * w / 4.0 - offset;
            if disc >= -1e-12 {
                let sq = disc.max(0.0).sqrt();
                roots.push(sign_w * w / 2.0 + sq + shift);
                roots.push(sign_w * w / 2.0 - sq + shift);
            }
        }
    }

    let poly = |x: f64| (((a * x + b) * x + c) * x + d) * x + e;
    let dpoly = |x: f64| ((4.0 * a * x + 3.0 * b) * x + 2.0 * c) * x + d;
    for x in roots.iter_mut() {
        for _ in 0..8 {
            let dx = dpoly(*x);
            if dx.abs() < 1e-300 {
                break;
            }
            let step = poly(*x) / dx;
            *x -= step;
            if step.abs() < 1e-15 * x.abs().max(1.0) {
                break;
            }
        }
    }
    roots
}

// ─── Newton steps ───────────────────────────────────────────────────────────

/// Solve `J · δ = -f` for a 2×2 system. `None` when `J` is singular.
pub fn newton_step_2(jacobian: [[f64; 2]; 2], residual: [f64; 2]) -> Option<(f64, f64)> {
    let j = Matrix2::new(jacobian[0][0], jacobian[0][1], jacobian[1][0], jacobian[1][1]);
    let f = Vector2::new(residual[0], residual[1]);
    j.lu().solve(&(-f)).map(|d| (d.x, d.y))
}

/// Solve `J · δ = -f` for a 3×3 system. `None` when `J` is singular.
pub fn newton_step_3(jacobian: [[f64; 3]; 3], residual: [f64; 3]) -> Option<[f64; 3]> {
    let j = Matrix3::from_row_slice(&[
        jacobian[0][0],
        jacobian[0][1],
        jacobian[0][2],
        jacobian[1][0],
        jacobian[1][1],
        jacobian[1][2],
        jacobian[2][0],
        jacobian[2][1],
        jacobian[2][2],
    ]);
    let f = Vector3::new(residual[0], residual[1], residual[2]);
    j.lu().solve(&(-f)).map(|d| [d.x, d.y, d.z])
}

/// Bisection on a bracketed sign change of `f` in `[lo, hi]`.
pub fn bisect(mut lo: f64, mut hi: f64, f: impl Fn(f64) -> f64, iterations: usize) -> f64 {
    let mut f_lo = f(lo);
    for _ in 0..iterations {
        let mid = 0.5 * (lo + hi);
        let f_mid = f(mid);
        if f_mid == 0.0 {
            return mid;
        }
        if (f_mid < 0.0) == (f_lo < 0.0) {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}
