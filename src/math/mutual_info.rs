//! Nearest-neighbour mutual information between two continuous variables.
//!
//! Kraskov–Stögbauer–Grassberger estimator (first variant), Chebyshev metric:
//!
//! ```text
//! I(X; Y) = ψ(n) + ψ(k) − ⟨ψ(n_x + 1)⟩ − ⟨ψ(n_y + 1)⟩
//! ```
//!
//! where, for each point, `n_x`/`n_y` count the other points strictly closer
//! in the marginal than the `k`-th neighbour is in the joint space. The
//! estimate is clipped at zero.
//!
//! Inputs are scaled by their standard deviation and receive a tiny seeded
//! Gaussian jitter first, so ties (discrete-looking data) do not collapse the
//! neighbour counts. Results are therefore deterministic for a given seed.

use rand::Rng;
use rand_distr::StandardNormal;
use statrs::function::gamma::digamma;

/// Scale `v` by its population std and add `1e-10 · max(1, mean|v|)` jitter.
pub fn scale_and_jitter<R: Rng>(v: &[f64], rng: &mut R) -> Vec<f64> {
    let n = v.len().max(1) as f64;
    let mean = v.iter().sum::<f64>() / n;
    let var = v.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    let std = var.sqrt();
    let scale = if std > 0.0 { std } else { 1.0 };
    let scaled: Vec<f64> = v.iter().map(|x| x / scale).collect();
    let amp = 1e-10 * (scaled.iter().map(|x| x.abs()).sum::<f64>() / n).max(1.0);
    scaled
        .into_iter()
        .map(|x| {
            let z: f64 = rng.sample(StandardNormal);
            x + amp * z
        })
        .collect()
}

/// KSG estimate of `I(X; Y)` in nats for complete, equally long vectors.
pub fn mutual_info_ksg(x: &[f64], y: &[f64], n_neighbors: usize) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let k = n_neighbors.clamp(1, n - 1);

    let mut dist = Vec::with_capacity(n - 1);
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    for i in 0..n {
        dist.clear();
        dist.extend(
            (0..n)
                .filter(|&j| j != i)
                .map(|j| (x[i] - x[j]).abs().max((y[i] - y[j]).abs())),
        );
        dist.select_nth_unstable_by(k - 1, |a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let radius = dist[k - 1];

        let nx = (0..n).filter(|&j| j != i && (x[i] - x[j]).abs() < radius).count();
        let ny = (0..n).filter(|&j| j != i && (y[i] - y[j]).abs() < radius).count();
        sum_x += digamma(nx as f64 + 1.0);
        sum_y += digamma(ny as f64 + 1.0);
    }

    let mi = digamma(n as f64) + digamma(k as f64) - sum_x / n as f64 - sum_y / n as f64;
    mi.max(0.0)
}
