//! Numerical helpers shared by steps whose closed-form inverse is only an
//! approximation.

/// Refine an approximate inverse `guess` so that `forward(guess) == target`.
///
/// Quasi-Newton iteration with a finite-difference Jacobian. Converges in a
/// couple of steps when the guess comes from a series inverse. Returns `None`
/// if the Jacobian degenerates or the iteration diverges.
pub(crate) fn refine_inverse<F>(
    forward: F,
    target: (f64, f64),
    guess: (f64, f64),
    step: f64,
    tolerance: f64,
) -> Option<(f64, f64)>
where
    F: Fn(f64, f64) -> (f64, f64),
{
    const MAX_ITERATIONS: usize = 8;

    let (mut u, mut v) = guess;
    for _ in 0..MAX_ITERATIONS {
        let (fx, fy) = forward(u, v);
        let rx = target.0 - fx;
        let ry = target.1 - fy;
        if !rx.is_finite() || !ry.is_finite() {
            return None;
        }
        if rx.abs() < tolerance && ry.abs() < tolerance {
            return Some((u, v));
        }

        let (fx_u, fy_u) = forward(u + step, v);
        let (fx_v, fy_v) = forward(u, v + step);
        let j11 = (fx_u - fx) / step;
        let j21 = (fy_u - fy) / step;
        let j12 = (fx_v - fx) / step;
        let j22 = (fy_v - fy) / step;

        let det = j11 * j22 - j12 * j21;
        if det.abs() < f64::EPSILON || !det.is_finite() {
            return None;
        }

        u += (j22 * rx - j12 * ry) / det;
        v += (j11 * ry - j21 * rx) / det;
    }

    let (fx, fy) = forward(u, v);
    if (target.0 - fx).abs() < tolerance * 1e3 && (target.1 - fy).abs() < tolerance * 1e3 {
        Some((u, v))
    } else {
        None
    }
}
