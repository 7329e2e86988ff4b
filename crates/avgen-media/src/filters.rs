//! FFmpeg filter graph construction.

/// Offsets at which each crossfade starts on the accumulated timeline.
///
/// The i-th offset (for the transition into clip `i + 1`) is
/// `sum_{j <= i} (d_j - crossfade)`.
pub fn xfade_offsets(durations: &[f64], crossfade: f64) -> Vec<f64> {
    durations
        .iter()
        .take(durations.len().saturating_sub(1))
        .scan(0.0, |acc, d| {
            *acc += d - crossfade;
            Some(*acc)
        })
        .collect()
}

/// Build an `xfade` chain joining every input's video stream.
///
/// Intermediate results are labelled `[v1]`, `[v2]`, ... and the final
/// stream `[vout]`. Requires at least two durations.
pub fn build_xfade_chain(durations: &[f64], crossfade: f64) -> String {
    let offsets = xfade_offsets(durations, crossfade);
    let last = offsets.len();
    let mut current = "[0:v]".to_string();
    let mut parts = Vec::with_capacity(last);

    for (i, offset) in offsets.iter().enumerate() {
        let n = i + 1;
        let out = if n == last {
            "[vout]".to_string()
        } else {
            format!("[v{}]", n)
        };
        parts.push(format!(
            "{}[{}:v]xfade=transition=fade:duration={}:offset={:.3}{}",
            current, n, crossfade, offset, out
        ));
        current = out;
    }

    parts.join(";")
}

/// Length of the crossfaded timeline.
pub fn crossfaded_duration(durations: &[f64], crossfade: f64) -> f64 {
    let sum: f64 = durations.iter().sum();
    sum - crossfade * durations.len().saturating_sub(1) as f64
}
