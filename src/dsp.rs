//! DSP Primitives
//!
//! The stateful building blocks the node layer wraps: the ADSR envelope,
//! the two-pole lowpass filter, the shared delay line, and the stateless
//! waveshaping math (distortion and wavefolding).
//!
//! Everything here works in seconds and unit-range floats; voltage-style
//! scaling is the node layer's business.

use alloc::vec;
use alloc::vec::Vec;
use libm::Libm;

/// Longest supported delay, in seconds. Sizes every delay buffer.
pub const MAX_DELAY_SECONDS: f64 = 10.0;

/// Envelope stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvStage {
    Off,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR envelope generator.
///
/// A five-state machine keyed on elapsed wall-clock time since the current
/// stage was entered, not on per-sample increments, so the segment shapes
/// are exact regardless of how the caller's timing jitters. Attack and
/// release ramp linearly from the value the stage was entered with, which
/// is what makes retriggering out of a half-finished release click-free.
#[derive(Debug, Clone, Copy)]
pub struct AdsrEnv {
    stage: EnvStage,
    start_time: f64,
    start_val: f64,
}

impl AdsrEnv {
    pub fn new() -> Self {
        Self {
            stage: EnvStage::Off,
            start_time: 0.0,
            start_val: 0.0,
        }
    }

    /// Advance the envelope by one sample.
    ///
    /// `gate` is read as a binary signal: above zero is high. The four
    /// segment parameters are in seconds (sustain is a level).
    pub fn eval(
        &mut self,
        time: f64,
        gate: f64,
        attack: f64,
        decay: f64,
        sustain: f64,
        release: f64,
    ) -> f64 {
        match self.stage {
            EnvStage::Off => {
                if gate > 0.0 {
                    self.stage = EnvStage::Attack;
                    self.start_time = time;
                    self.start_val = 0.0;
                }
                0.0
            }

            EnvStage::Attack => {
                let elapsed = time - self.start_time;
                if elapsed >= attack {
                    self.stage = EnvStage::Decay;
                    self.start_time = time;
                    1.0
                } else {
                    ramp(self.start_val, 1.0, elapsed / attack)
                }
            }

            EnvStage::Decay => {
                let elapsed = time - self.start_time;
                let value = if elapsed >= decay {
                    sustain
                } else {
                    ramp(1.0, sustain, elapsed / decay)
                };

                if gate <= 0.0 {
                    self.stage = EnvStage::Release;
                    self.start_time = time;
                    self.start_val = value;
                } else if elapsed >= decay {
                    self.stage = EnvStage::Sustain;
                }
                value
            }

            EnvStage::Sustain => {
                if gate <= 0.0 {
                    self.stage = EnvStage::Release;
                    self.start_time = time;
                    self.start_val = sustain;
                }
                sustain
            }

            EnvStage::Release => {
                let elapsed = time - self.start_time;
                let value = if elapsed >= release {
                    0.0
                } else {
                    ramp(self.start_val, 0.0, elapsed / release)
                };

                if gate > 0.0 {
                    // Retrigger from wherever the release got to.
                    self.stage = EnvStage::Attack;
                    self.start_time = time;
                    self.start_val = value;
                } else if elapsed >= release {
                    self.stage = EnvStage::Off;
                }
                value
            }
        }
    }
}

impl Default for AdsrEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn ramp(from: f64, to: f64, frac: f64) -> f64 {
    from + (to - from) * frac
}

/// Two-pole resonant lowpass filter.
///
/// Two chained integrators with a resonance feedback term. Cutoff and
/// resonance are unitless controls: cutoff is clamped to at most 1,
/// resonance to at least 0. NaN input is an upstream bug and trips an
/// assertion rather than poisoning the integrator state.
#[derive(Debug, Clone, Copy, Default)]
pub struct TwoPoleFilter {
    s0: f64,
    s1: f64,
}

impl TwoPoleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, input: f64, cutoff: f64, reso: f64) -> f64 {
        assert!(!input.is_nan(), "NaN sample fed into filter");

        let cutoff = cutoff.min(1.0);
        let reso = reso.max(0.0);

        let c = Libm::<f64>::pow(0.5, (1.0 - cutoff) / 0.125);
        let r = Libm::<f64>::pow(0.5, (reso + 0.125) / 0.125);

        self.s0 = (1.0 - r * c) * self.s0 - c * self.s1 + c * input;
        self.s1 = (1.0 - r * c) * self.s1 + c * self.s0;
        self.s1
    }
}

/// Circular delay buffer with split write/read halves.
///
/// `write` stores a sample and re-derives the read tap from the requested
/// delay time; `read` returns whatever the tap points at. The two halves
/// are separate entry points because the compiler places the writer and
/// reader as distinct graph nodes sharing one buffer, potentially far
/// apart in evaluation order.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f64>,
    write_idx: usize,
    read_idx: usize,
    sample_rate: f64,
}

impl DelayLine {
    pub fn new(sample_rate: f64) -> Self {
        let len = (sample_rate * MAX_DELAY_SECONDS) as usize;
        Self {
            buffer: vec![0.0; len],
            write_idx: 0,
            read_idx: 0,
            sample_rate,
        }
    }

    /// Store one sample and point the read tap `delay_time` seconds back.
    ///
    /// A delay of zero reads back the sample just written; delays beyond
    /// the buffer are clamped to its length.
    pub fn write(&mut self, sample: f64, delay_time: f64) {
        let len = self.buffer.len();
        self.write_idx = (self.write_idx + 1) % len;
        self.buffer[self.write_idx] = sample;

        let offset =
            Libm::<f64>::floor(self.sample_rate * delay_time).clamp(0.0, (len - 1) as f64) as usize;
        self.read_idx = (self.write_idx + len - offset) % len;
    }

    pub fn read(&self) -> f64 {
        self.buffer[self.read_idx]
    }
}

/// Soft-clipping distortion.
///
/// `amount` is clamped to [0, 1] and backed off slightly so the drive
/// factor stays finite at full tilt.
pub fn distort(input: f64, amount: f64) -> f64 {
    let amount = amount.clamp(0.0, 1.0) - 0.01;
    let k = 2.0 * amount / (1.0 - amount);
    (1.0 + k) * input / (1.0 + k * Libm::<f64>::fabs(input))
}

/// Triangle wavefolder.
///
/// Scales the input by `rate + 1` and reflects it back into range; a rate
/// of zero passes the signal through unchanged.
pub fn fold(input: f64, rate: f64) -> f64 {
    let rate = rate.max(0.0) + 1.0;
    let v = 0.25 * (input * rate) + 0.25;
    4.0 * (Libm::<f64>::fabs(v - Libm::<f64>::round(v)) - 0.25)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Drive an envelope sample by sample at 1 kHz for easy arithmetic.
    fn run_env(env: &mut AdsrEnv, from: f64, to: f64, gate: f64) -> f64 {
        let dt = 0.001;
        let mut value = 0.0;
        let mut t = from;
        while t < to {
            t += dt;
            value = env.eval(t, gate, 0.1, 0.1, 0.5, 0.2);
        }
        value
    }

    #[test]
    fn test_adsr_full_cycle() {
        let mut env = AdsrEnv::new();

        // Attack: close to 1 at t = attack.
        let peak = run_env(&mut env, 0.0, 0.1, 1.0);
        assert!(peak > 0.95, "attack should approach 1, got {}", peak);

        // Decay: at sustain level by t = attack + decay.
        let settled = run_env(&mut env, 0.1, 0.25, 1.0);
        assert_relative_eq!(settled, 0.5, epsilon = 0.02);

        // Release: back at 0 within the release time of the gate falling.
        let done = run_env(&mut env, 0.25, 0.5, 0.0);
        assert!(done.abs() < 1e-9, "release should reach 0, got {}", done);
    }

    #[test]
    fn test_adsr_attack_is_linear() {
        let mut env = AdsrEnv::new();
        let halfway = run_env(&mut env, 0.0, 0.05, 1.0);
        assert_relative_eq!(halfway, 0.5, epsilon = 0.02);
    }

    #[test]
    fn test_adsr_retrigger_from_release() {
        let mut env = AdsrEnv::new();
        run_env(&mut env, 0.0, 0.25, 1.0);

        // Let the release get partway down, then re-raise the gate.
        let mid_release = run_env(&mut env, 0.25, 0.3, 0.0);
        assert!(mid_release > 0.0 && mid_release < 0.5);

        // The retriggered attack resumes from the released value, no snap.
        let first = env.eval(0.3005, 1.0, 0.1, 0.1, 0.5, 0.2);
        assert!(first >= mid_release - 0.02);
        let peak = run_env(&mut env, 0.3005, 0.4005, 1.0);
        assert!(peak > 0.95);
    }

    #[test]
    fn test_adsr_zero_attack_jumps_to_peak() {
        let mut env = AdsrEnv::new();
        env.eval(0.001, 1.0, 0.0, 0.1, 0.5, 0.2);
        let second = env.eval(0.002, 1.0, 0.0, 0.1, 0.5, 0.2);
        assert!((second - 1.0).abs() < 0.02 || second <= 1.0);
        assert!(second > 0.9);
    }

    #[test]
    fn test_filter_settles_on_dc_step() {
        let mut filt = TwoPoleFilter::new();
        let mut out = 0.0;
        for _ in 0..44_100 {
            out = filt.apply(1.0, 0.5, 0.0);
        }
        // At reso = 0 the feedback coefficient r is 0.5, giving a DC gain
        // of 1 / (1 + r^2) = 0.8.
        assert_relative_eq!(out, 0.8, epsilon = 0.01);
    }

    #[test]
    fn test_filter_clamps_wild_controls() {
        let mut filt = TwoPoleFilter::new();
        let mut rng = crate::rng::Rng::from_seed(99);
        for _ in 0..44_100 {
            let noise = rng.next_f64() * 2.0 - 1.0;
            let out = filt.apply(noise, 1.5, -0.5);
            assert!(out.is_finite());
        }
    }

    #[test]
    #[should_panic(expected = "NaN sample fed into filter")]
    fn test_filter_rejects_nan() {
        let mut filt = TwoPoleFilter::new();
        filt.apply(f64::NAN, 0.5, 0.0);
    }

    #[test]
    fn test_delay_round_trip() {
        let mut delay = DelayLine::new(44_100.0);
        let k = 25;
        let delay_time = k as f64 / 44_100.0;

        let mut written = Vec::new();
        for n in 0..200 {
            let x = (n as f64 * 0.37).sin();
            delay.write(x, delay_time);
            written.push(x);
            if n >= k {
                assert_relative_eq!(delay.read(), written[n - k], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_delay_zero_time_is_passthrough() {
        let mut delay = DelayLine::new(44_100.0);
        delay.write(1.0, 0.0);
        assert_eq!(delay.read(), 1.0);
    }

    #[test]
    fn test_delay_one_sample() {
        let mut delay = DelayLine::new(44_100.0);
        delay.write(1.0, 1.0 / 44_100.0);
        assert_eq!(delay.read(), 0.0);
        delay.write(0.0, 1.0 / 44_100.0);
        assert_eq!(delay.read(), 1.0);
    }

    #[test]
    fn test_delay_time_is_clamped() {
        let mut delay = DelayLine::new(44_100.0);
        // Negative and over-long delays must not wrap out of the buffer.
        delay.write(0.5, -3.0);
        assert_eq!(delay.read(), 0.5);
        delay.write(0.25, 1e9);
        assert!(delay.read().is_finite());
    }

    #[test]
    fn test_distort_stays_bounded() {
        for i in 0..100 {
            let x = (i as f64 / 50.0) - 1.0;
            let y = distort(x, 0.9);
            assert!(y.abs() <= 1.0 + 1e-9, "distort({}) = {}", x, y);
        }
    }

    #[test]
    fn test_distort_preserves_sign() {
        assert!(distort(0.5, 0.7) > 0.0);
        assert!(distort(-0.5, 0.7) < 0.0);
        assert_eq!(distort(0.0, 0.7), 0.0);
    }

    #[test]
    fn test_fold_identity_at_zero_rate() {
        for i in 0..=20 {
            let x = (i as f64 / 10.0) - 1.0;
            assert_relative_eq!(fold(x, 0.0), x, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_fold_reflects_overdrive() {
        // At rate 1 the input is doubled, so 0.75 folds back to 0.5.
        assert_relative_eq!(fold(0.75, 1.0), 0.5, epsilon = 1e-12);
        // Output never escapes [-1, 1].
        for i in 0..200 {
            let x = (i as f64 / 25.0) - 4.0;
            assert!(fold(x, 7.3).abs() <= 1.0 + 1e-9);
        }
    }
}
