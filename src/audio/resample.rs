use anyhow::{ensure, Result};

/// Linearly resample `samples` from `source_rate` to `target_rate`.
///
/// Good enough for feature analysis; recordings are short spoken words,
/// not material where interpolation artifacts matter.
pub fn linear_resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    ensure!(source_rate > 0, "source sample rate must be positive");
    ensure!(target_rate > 0, "target sample rate must be positive");
    if samples.is_empty() || source_rate == target_rate {
        return Ok(samples.to_vec());
    }

    let step = source_rate as f64 / target_rate as f64;
    let output_len = ((samples.len() as f64 / step).ceil() as usize).max(1);
    let last = samples.len() - 1;

    let output = (0..output_len)
        .map(|i| {
            let position = i as f64 * step;
            let left = (position.floor() as usize).min(last);
            let right = (left + 1).min(last);
            let frac = (position - left as f64) as f32;
            samples[left] * (1.0 - frac) + samples[right] * frac
        })
        .collect();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::linear_resample;

    #[test]
    fn preserves_constant_signal() {
        let input = vec![0.25; 441];
        let resampled = linear_resample(&input, 44_100, 16_000).unwrap();
        let expected_len = ((input.len() as f64) * 16_000.0 / 44_100.0).ceil() as usize;
        assert_eq!(resampled.len(), expected_len);
        assert!(resampled.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn identity_when_rates_match() {
        let input = vec![0.1, -0.2, 0.3];
        let resampled = linear_resample(&input, 16_000, 16_000).unwrap();
        assert_eq!(resampled, input);
    }

    #[test]
    fn rejects_zero_rate() {
        assert!(linear_resample(&[0.0], 0, 16_000).is_err());
    }
}
