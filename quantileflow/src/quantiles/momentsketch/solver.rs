//! Maximum-entropy density reconstruction from Chebyshev moments
//!
//! Given the first `k` moments of an unknown distribution rescaled to
//! `[-1, 1]`, the solver finds the density `p(x) = exp(sum_j lambda_j *
//! T_j(x))` whose moments match, where `T_j` are Chebyshev polynomials of
//! the first kind. Matching in the Chebyshev basis instead of raw powers is
//! load-bearing: the raw-moment Hankel system becomes numerically singular
//! past roughly a dozen moments, while the rescaled basis keeps the Newton
//! iteration well conditioned.
//!
//! The Lagrange multipliers come from damped Newton on the dual objective
//! `F(lambda) = integral(p) - <lambda, d>`. The Hessian needs moments of `p`
//! up to order `2k - 2` only, via the product identity
//! `T_i * T_j = (T_{i+j} + T_{|i-j|}) / 2`, and is solved by Cholesky with
//! escalating diagonal regularization when near-singular.

use super::SolverConfig;

const MAX_BACKTRACKS: usize = 24;
const MAX_RIDGE_ATTEMPTS: usize = 8;

/// Evaluates `T_0(x) .. T_{n-1}(x)` into `out`
fn chebyshev_values(x: f64, out: &mut [f64]) {
    if let Some(first) = out.first_mut() {
        *first = 1.0;
    }
    if out.len() > 1 {
        out[1] = x;
        for j in 2..out.len() {
            out[j] = 2.0 * x * out[j - 1] - out[j - 2];
        }
    }
}

/// Converts raw power moments `E[v^j]` on `[a, b]` into power moments of the
/// affinely rescaled variable `x = (2v - (a + b)) / (b - a)` on `[-1, 1]`
pub(crate) fn rescale_power_moments(raw: &[f64], a: f64, b: f64) -> Vec<f64> {
    let center = 0.5 * (a + b);
    let half_width = 0.5 * (b - a);
    let mut scaled = vec![0.0; raw.len()];
    for (j, slot) in scaled.iter_mut().enumerate() {
        let mut acc = 0.0;
        let mut binom = 1.0;
        for i in 0..=j {
            acc += binom * raw[i] * (-center).powi((j - i) as i32);
            binom = binom * ((j - i) as f64) / ((i + 1) as f64);
        }
        *slot = acc / half_width.powi(j as i32);
    }
    scaled
}

/// Converts power moments on `[-1, 1]` into Chebyshev-basis moments
/// `d_j = E[T_j(x)]` using the monomial expansion of each `T_j`
pub(crate) fn chebyshev_moments(power: &[f64]) -> Vec<f64> {
    let k = power.len();
    let mut targets = vec![0.0; k];
    if k == 0 {
        return targets;
    }
    let mut prev = vec![0.0; k];
    prev[0] = 1.0;
    targets[0] = power[0];
    if k == 1 {
        return targets;
    }
    let mut curr = vec![0.0; k];
    curr[1] = 1.0;
    targets[1] = power[1];
    for j in 2..k {
        let mut next = vec![0.0; k];
        for i in 0..k - 1 {
            next[i + 1] += 2.0 * curr[i];
        }
        for (n, p) in next.iter_mut().zip(&prev) {
            *n -= p;
        }
        targets[j] = next.iter().zip(power).map(|(c, m)| c * m).sum();
        prev = curr;
        curr = next;
    }
    targets
}

/// The fitted density sampled on a midpoint grid over `[-1, 1]`
pub(crate) struct MaxEntDensity {
    xs: Vec<f64>,
    mass: Vec<f64>,
    /// Whether the moment residual reached the configured tolerance
    pub converged: bool,
    /// Final max absolute moment residual
    pub residual: f64,
    /// Newton iterations performed
    pub iterations: usize,
}

impl MaxEntDensity {
    /// Inverts the CDF of the fitted density at rank `q`, returning a
    /// position in `[-1, 1]`
    pub(crate) fn quantile(&self, q: f64) -> f64 {
        let total: f64 = self.mass.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return 0.0;
        }
        let target = q * total;
        let cell = 2.0 / self.xs.len() as f64;
        let mut cumulative = 0.0;
        for (x, m) in self.xs.iter().zip(&self.mass) {
            if cumulative + m >= target {
                let frac = if *m > 0.0 {
                    ((target - cumulative) / m).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                return (x - 0.5 * cell + frac * cell).clamp(-1.0, 1.0);
            }
            cumulative += m;
        }
        1.0
    }
}

fn density_moments(
    lambda: &[f64],
    tvals: &[Vec<f64>],
    weight: f64,
    orders: usize,
) -> (Vec<f64>, Vec<f64>) {
    let mut mass = Vec::with_capacity(tvals.len());
    let mut moments = vec![0.0; orders];
    for t in tvals {
        let mut exponent = 0.0;
        for (l, tv) in lambda.iter().zip(t.iter()) {
            exponent += l * tv;
        }
        let p = weight * exponent.clamp(-700.0, 700.0).exp();
        mass.push(p);
        for (m, slot) in moments.iter_mut().enumerate() {
            *slot += p * t[m];
        }
    }
    (mass, moments)
}

fn dual_potential(moments: &[f64], lambda: &[f64], targets: &[f64]) -> f64 {
    let dot: f64 = lambda.iter().zip(targets).map(|(l, d)| l * d).sum();
    moments[0] - dot
}

fn max_residual(moments: &[f64], targets: &[f64]) -> f64 {
    targets
        .iter()
        .enumerate()
        .map(|(j, d)| (moments[j] - d).abs())
        .fold(0.0, f64::max)
}

fn cholesky_solve(matrix: &[Vec<f64>], rhs: &[f64]) -> Option<Vec<f64>> {
    let k = rhs.len();
    let mut lower = vec![vec![0.0; k]; k];
    for i in 0..k {
        for j in 0..=i {
            let mut sum = matrix[i][j];
            for m in 0..j {
                sum -= lower[i][m] * lower[j][m];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                lower[i][j] = sum.sqrt();
            } else {
                lower[i][j] = sum / lower[j][j];
            }
        }
    }
    let mut y = vec![0.0; k];
    for i in 0..k {
        let mut sum = rhs[i];
        for m in 0..i {
            sum -= lower[i][m] * y[m];
        }
        y[i] = sum / lower[i][i];
    }
    let mut x = vec![0.0; k];
    for i in (0..k).rev() {
        let mut sum = y[i];
        for m in i + 1..k {
            sum -= lower[m][i] * x[m];
        }
        x[i] = sum / lower[i][i];
    }
    Some(x)
}

fn solve_regularized(matrix: &[Vec<f64>], rhs: &[f64]) -> Option<Vec<f64>> {
    let k = rhs.len();
    let scale = (0..k)
        .map(|i| matrix[i][i].abs())
        .fold(0.0f64, f64::max)
        .max(1e-300);
    let mut ridge = 0.0;
    for _ in 0..MAX_RIDGE_ATTEMPTS {
        let mut work = matrix.to_vec();
        for (i, row) in work.iter_mut().enumerate() {
            row[i] += ridge;
        }
        if let Some(solution) = cholesky_solve(&work, rhs) {
            return Some(solution);
        }
        ridge = if ridge == 0.0 { scale * 1e-12 } else { ridge * 100.0 };
    }
    None
}

/// Fits the maximum-entropy density whose Chebyshev moments match `targets`
///
/// Never fails: when the Newton iteration stalls or hits the iteration cap
/// the best multipliers seen so far are kept and `converged` is false.
pub(crate) fn solve_max_entropy(targets: &[f64], config: &SolverConfig) -> MaxEntDensity {
    let k = targets.len();
    let n = config.grid_size.max(64);
    let orders = 2 * k - 1;
    let xs: Vec<f64> = (0..n)
        .map(|i| -1.0 + (2 * i + 1) as f64 / n as f64)
        .collect();
    let weight = 2.0 / n as f64;
    let tvals: Vec<Vec<f64>> = xs
        .iter()
        .map(|&x| {
            let mut t = vec![0.0; orders];
            chebyshev_values(x, &mut t);
            t
        })
        .collect();

    // start from the uniform density on [-1, 1]
    let mut lambda = vec![0.0; k];
    lambda[0] = 0.5f64.ln();
    let (mut mass, mut moments) = density_moments(&lambda, &tvals, weight, orders);
    let mut potential = dual_potential(&moments, &lambda, targets);
    let mut residual = max_residual(&moments, targets);
    let mut iterations = 0;

    while iterations < config.max_iterations && residual > config.tolerance {
        iterations += 1;
        let grad: Vec<f64> = (0..k).map(|j| moments[j] - targets[j]).collect();
        let mut hessian = vec![vec![0.0; k]; k];
        for (j, row) in hessian.iter_mut().enumerate() {
            for (l, entry) in row.iter_mut().enumerate() {
                *entry = 0.5 * (moments[j + l] + moments[j.abs_diff(l)]);
            }
        }
        let Some(direction) = solve_regularized(&hessian, &grad) else {
            break;
        };

        let mut step = 1.0;
        let mut advanced = false;
        for _ in 0..MAX_BACKTRACKS {
            let candidate: Vec<f64> = lambda
                .iter()
                .zip(&direction)
                .map(|(l, d)| l - step * d)
                .collect();
            let (cand_mass, cand_moments) = density_moments(&candidate, &tvals, weight, orders);
            let cand_potential = dual_potential(&cand_moments, &candidate, targets);
            if cand_potential.is_finite() && cand_potential < potential {
                lambda = candidate;
                mass = cand_mass;
                moments = cand_moments;
                potential = cand_potential;
                residual = max_residual(&moments, targets);
                advanced = true;
                break;
            }
            step *= 0.5;
        }
        if !advanced {
            break;
        }
    }

    MaxEntDensity {
        xs,
        mass,
        converged: residual <= config.tolerance,
        residual,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> SolverConfig {
        SolverConfig::default()
    }

    #[test]
    fn test_chebyshev_values_match_closed_forms() {
        let mut t = [0.0; 5];
        chebyshev_values(0.5, &mut t);
        assert!((t[0] - 1.0).abs() < 1e-15);
        assert!((t[1] - 0.5).abs() < 1e-15);
        assert!((t[2] - (2.0 * 0.25 - 1.0)).abs() < 1e-15);
        assert!((t[3] - (4.0 * 0.125 - 3.0 * 0.5)).abs() < 1e-15);
    }

    #[test]
    fn test_chebyshev_moments_of_uniform() {
        // uniform on [-1, 1]: E[x^j] = 0 for odd j, 1/(j+1) for even j
        let power = [1.0, 0.0, 1.0 / 3.0, 0.0, 1.0 / 5.0];
        let cheb = chebyshev_moments(&power);
        assert!((cheb[0] - 1.0).abs() < 1e-12);
        assert!(cheb[1].abs() < 1e-12);
        assert!((cheb[2] - (-1.0 / 3.0)).abs() < 1e-12);
        assert!(cheb[3].abs() < 1e-12);
        assert!((cheb[4] - (-1.0 / 15.0)).abs() < 1e-12);
    }

    #[test]
    fn test_rescale_shifts_interval() {
        // point mass at v = 5 on [0, 10] lands at x = 0
        let raw = [1.0, 5.0, 25.0, 125.0];
        let scaled = rescale_power_moments(&raw, 0.0, 10.0);
        assert!((scaled[0] - 1.0).abs() < 1e-12);
        assert!(scaled[1].abs() < 1e-12);
        assert!(scaled[2].abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_solves_spd_system() {
        let matrix = vec![vec![4.0, 2.0], vec![2.0, 3.0]];
        let rhs = [2.0, 3.0];
        let x = cholesky_solve(&matrix, &rhs).unwrap();
        assert!((4.0 * x[0] + 2.0 * x[1] - 2.0).abs() < 1e-12);
        assert!((2.0 * x[0] + 3.0 * x[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let matrix = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        assert!(cholesky_solve(&matrix, &[1.0, 1.0]).is_none());
    }

    #[test]
    fn test_maxent_recovers_uniform() {
        let power = [1.0, 0.0, 1.0 / 3.0, 0.0, 1.0 / 5.0];
        let targets = chebyshev_moments(&power);
        let density = solve_max_entropy(&targets, &default_config());
        assert!(density.converged, "residual {}", density.residual);
        assert!(density.quantile(0.5).abs() < 0.01);
        assert!((density.quantile(0.25) - (-0.5)).abs() < 0.02);
        assert!((density.quantile(0.75) - 0.5).abs() < 0.02);
    }

    #[test]
    fn test_iteration_cap_still_returns_finite() {
        let power = [1.0, 0.2, 0.3, 0.1, 0.15];
        let targets = chebyshev_moments(&power);
        let config = SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        };
        let density = solve_max_entropy(&targets, &config);
        let x = density.quantile(0.9);
        assert!(x.is_finite());
        assert!((-1.0..=1.0).contains(&x));
    }
}
