//! Sample conversion between device formats and the wire format

/// Linear resampler from `source_rate` to `target_rate`.
///
/// Audio arrives in blocks (device callbacks, network chunks). The position
/// of the next output sample and the last input sample are carried from one
/// block to the next so the output has no seams at block edges.
#[derive(Debug, Clone)]
pub struct Resampler {
    /// Input samples consumed per output sample
    step: f64,
    /// Next output position, in input samples from `previous`
    position: f64,
    previous: Option<f32>,
}

impl Resampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        Self {
            step: source_rate as f64 / target_rate.max(1) as f64,
            position: 0.0,
            previous: None,
        }
    }

    fn is_identity(&self) -> bool {
        self.step == 1.0
    }

    pub fn process(&mut self, block: &[f32]) -> Vec<f32> {
        if self.is_identity() || block.is_empty() {
            return block.to_vec();
        }

        let mut input = Vec::with_capacity(block.len() + 1);
        input.extend(self.previous);
        input.extend_from_slice(block);

        let last = input.len() - 1;
        let mut output = Vec::with_capacity((block.len() as f64 / self.step) as usize + 1);

        while self.position < last as f64 {
            let idx = self.position.floor() as usize;
            let frac = (self.position - idx as f64) as f32;
            output.push(input[idx] * (1.0 - frac) + input[idx + 1] * frac);
            self.position += self.step;
        }

        // The last input sample opens the next block
        self.position -= last as f64;
        self.previous = Some(input[last]);
        output
    }
}

/// Average interleaved channels down to mono
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Repeat each mono sample on every channel
pub fn upmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .iter()
        .flat_map(|&s| std::iter::repeat(s).take(channels as usize))
        .collect()
}

pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Decode little-endian i16 PCM; a trailing odd byte is ignored
pub fn pcm_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
        .collect()
}

/// Encode samples as little-endian i16 PCM into `out`, returns bytes written
pub fn i16_to_pcm_bytes(samples: &[i16], out: &mut [u8]) -> usize {
    let mut written = 0;
    for (&sample, slot) in samples.iter().zip(out.chunks_exact_mut(2)) {
        slot.copy_from_slice(&sample.to_le_bytes());
        written += 2;
    }
    written
}

/// Root mean square level of little-endian i16 PCM, in 0.0..=1.0
pub fn rms_level(bytes: &[u8]) -> f32 {
    let samples = pcm_bytes_to_f32(bytes);
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt().clamp(0.0, 1.0)
}
