//! Band energy extraction around the ultrasonic carrier

use std::ops::RangeInclusive;
use std::sync::Arc;

use num_complex::Complex64;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::config::{BandEnergyMethod, DetectorConfig, PcmDecoding};
use crate::core::frame::AudioFrame;
use crate::error::{AnalysisError, ConfigError};

/// Reduces one captured frame to the largest magnitude found in the target
/// band. Holds only configuration and reusable scratch buffers, so the
/// per-frame path does not allocate.
pub struct SpectralFrameAnalyzer {
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Option<Arc<dyn ComplexToReal<f64>>>,
    method: BandEnergyMethod,
    decoding: PcmDecoding,
    frame_bytes: usize,
    bins: RangeInclusive<usize>,
    input: Vec<f64>,
    spectrum: Vec<Complex64>,
    envelope: Vec<f64>,
    forward_scratch: Vec<Complex64>,
    inverse_scratch: Vec<Complex64>,
}

impl SpectralFrameAnalyzer {
    pub fn new(config: &DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let n = config.frame_samples;
        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n);

        let (inverse, envelope, inverse_scratch) = match config.band_method {
            BandEnergyMethod::DirectMagnitude => (None, Vec::new(), Vec::new()),
            BandEnergyMethod::BandPassEnvelope => {
                let inverse = planner.plan_fft_inverse(n);
                let envelope = inverse.make_output_vec();
                let scratch = inverse.make_scratch_vec();
                (Some(inverse), envelope, scratch)
            }
        };

        Ok(Self {
            input: forward.make_input_vec(),
            spectrum: forward.make_output_vec(),
            forward_scratch: forward.make_scratch_vec(),
            inverse_scratch,
            forward,
            inverse,
            envelope,
            method: config.band_method,
            decoding: config.pcm_decoding,
            frame_bytes: config.frame_bytes(),
            bins: config.band_bins(),
        })
    }

    /// Spectrum bins inspected for each frame
    pub fn band_bins(&self) -> RangeInclusive<usize> {
        self.bins.clone()
    }

    /// Compute the band energy of one frame
    pub fn analyze(&mut self, frame: &AudioFrame) -> Result<f64, AnalysisError> {
        if frame.byte_len() != self.frame_bytes {
            return Err(AnalysisError::FrameLength {
                expected: self.frame_bytes,
                actual: frame.byte_len(),
            });
        }

        for (slot, sample) in self.input.iter_mut().zip(frame.samples(self.decoding)) {
            *slot = sample;
        }

        self.forward
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.forward_scratch)
            .map_err(|e| AnalysisError::Transform(e.to_string()))?;

        match self.method {
            BandEnergyMethod::DirectMagnitude => Ok(self.direct_magnitude()),
            BandEnergyMethod::BandPassEnvelope => self.band_pass_envelope(),
        }
    }

    fn direct_magnitude(&self) -> f64 {
        self.spectrum[self.bins.clone()]
            .iter()
            .map(|c| c.norm())
            .fold(0.0f64, f64::max)
    }

    fn band_pass_envelope(&mut self) -> Result<f64, AnalysisError> {
        let inverse = match &self.inverse {
            Some(inverse) => Arc::clone(inverse),
            None => return Ok(self.direct_magnitude()),
        };

        for (i, bin) in self.spectrum.iter_mut().enumerate() {
            if !self.bins.contains(&i) {
                *bin = Complex64::new(0.0, 0.0);
            }
        }

        inverse
            .process_with_scratch(
                &mut self.spectrum,
                &mut self.envelope,
                &mut self.inverse_scratch,
            )
            .map_err(|e| AnalysisError::Transform(e.to_string()))?;

        let scale = 1.0 / self.envelope.len() as f64;
        let peak = self
            .envelope
            .chunks_exact(2)
            .map(|pair| (pair[0] * scale).hypot(pair[1] * scale))
            .fold(0.0f64, f64::max);

        Ok(peak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfigBuilder;
    use crate::testgen;

    #[test]
    fn test_wrong_frame_length_is_an_error() {
        let config = DetectorConfig::default();
        let mut analyzer = SpectralFrameAnalyzer::new(&config).unwrap();

        let short = AudioFrame::from_samples(&vec![0i16; config.frame_samples - 2]);
        let err = analyzer.analyze(&short).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::FrameLength { expected, actual }
                if expected == config.frame_bytes() && actual == config.frame_bytes() - 4
        ));
    }

    #[test]
    fn test_silence_has_no_energy() {
        let config = DetectorConfig::default();
        let mut analyzer = SpectralFrameAnalyzer::new(&config).unwrap();
        let energy = analyzer.analyze(&testgen::silence_frame(&config)).unwrap();
        assert_eq!(energy, 0.0);
    }

    #[test]
    fn test_envelope_method_separates_carrier() {
        let config = DetectorConfigBuilder::new()
            .band_method(BandEnergyMethod::BandPassEnvelope)
            .build();
        let mut analyzer = SpectralFrameAnalyzer::new(&config).unwrap();

        let carrier = analyzer
            .analyze(&testgen::tone_frame(&config, 20_000.0, 8000.0))
            .unwrap();
        let voice = analyzer
            .analyze(&testgen::tone_frame(&config, 1_000.0, 8000.0))
            .unwrap();

        assert!(carrier > 10.0 * voice, "carrier {carrier} voice {voice}");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DetectorConfigBuilder::new().tolerance(5.0).build();
        assert!(SpectralFrameAnalyzer::new(&config).is_err());
    }
}
