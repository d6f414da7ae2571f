//! Captured audio blocks

/// One capture cycle of mono audio.
///
/// Construction folds NaN/Inf to zero and peak-normalizes, so downstream
/// stages only ever see finite samples with max |x| <= 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Vec<f64>,
}

impl AudioBlock {
    /// Build a block from mono samples
    pub fn from_mono(samples: &[f32]) -> Self {
        let mut samples: Vec<f64> = samples
            .iter()
            .map(|&s| if s.is_finite() { s as f64 } else { 0.0 })
            .collect();

        let max_val = samples.iter().fold(0.0f64, |acc, s| acc.max(s.abs()));
        if max_val > 0.0 {
            for sample in &mut samples {
                *sample /= max_val;
            }
        }

        Self { samples }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Average interleaved frames down to one channel
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }

    data.chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().sum();
            sum / frame.len() as f32
        })
        .collect()
}

/// Root-mean-square level of raw samples
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_samples_fold_to_zero() {
        let block =
            AudioBlock::from_mono(&[0.5, f32::NAN, f32::INFINITY, -0.25, f32::NEG_INFINITY]);

        assert_eq!(block.samples(), &[1.0, 0.0, 0.0, -0.5, 0.0]);
    }

    #[test]
    fn quiet_block_is_peak_normalized() {
        let block = AudioBlock::from_mono(&[0.1, -0.2, 0.05]);

        let peak = block.samples().iter().fold(0.0f64, |a, s| a.max(s.abs()));
        assert!((peak - 1.0).abs() < 1e-9);
        assert!((block.samples()[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn silent_block_is_left_untouched() {
        let block = AudioBlock::from_mono(&[0.0; 16]);

        assert_eq!(block.len(), 16);
        assert!(block.samples().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let mono = downmix(&[1.0, 0.0, 0.5, 0.5, -1.0, 0.0], 2);
        let block = AudioBlock::from_mono(&mono);

        assert_eq!(block.len(), 3);
        assert_eq!(block.samples(), &[1.0, 1.0, -1.0]);
    }

    #[test]
    fn downmix_single_channel_is_passthrough() {
        let data = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix(&data, 1), data);
    }

    #[test]
    fn rms_of_constant_signal() {
        assert!((rms(&[0.5; 100]) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }
}
