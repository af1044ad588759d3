//! Schroeder reverberator.
//!
//! Four parallel feedback comb filters are evaluated and averaged; the
//! average runs through three allpass sections in series, and the result is
//! mixed with the dry input. The comb gains sum near 3.2, so the network
//! input is attenuated by a quarter to keep the feedback loops bounded.
//!
//! Delay-line lengths are fixed when the network is built: each line is
//! `round(time_scale · max_len)` samples (at least one). The wet mix may
//! change at any time; the lengths may not.

use libm::Libm;

/// Maximum comb delay lengths in samples.
pub const COMB_LENGTHS: [usize; 4] = [1730, 1494, 1941, 2156];

/// Feedback gain per comb.
pub const COMB_GAINS: [f32; 4] = [0.805, 0.827, 0.783, 0.764];

/// Maximum allpass delay lengths in samples.
pub const ALLPASS_LENGTHS: [usize; 3] = [240, 80, 23];

/// Gain shared by all allpass sections.
pub const ALLPASS_GAIN: f32 = 0.7;

const INPUT_ATTENUATION: f32 = 0.25;

/// Delay line with a single feedback tap.
#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    gain: f32,
}

impl Comb {
    fn new(len: usize, gain: f32) -> Self {
        Self {
            buffer: vec![0.0; len],
            pos: 0,
            gain,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let out = self.buffer[self.pos];
        self.buffer[self.pos] = input + self.gain * out;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// Flat-magnitude section that smears phase to build echo density.
#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f32>,
    pos: usize,
    gain: f32,
}

impl Allpass {
    fn new(len: usize, gain: f32) -> Self {
        Self {
            buffer: vec![0.0; len],
            pos: 0,
            gain,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let out = self.buffer[self.pos] - self.gain * input;
        self.buffer[self.pos] = input + self.gain * out;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// The full reverberation network.
#[derive(Debug, Clone)]
pub struct Reverb {
    combs: [Comb; 4],
    allpasses: [Allpass; 3],
    wet: f32,
}

impl Reverb {
    /// Build the network with every delay line scaled by `time_scale`.
    pub fn new(time_scale: f32) -> Self {
        Self {
            combs: core::array::from_fn(|i| {
                Comb::new(scaled_len(COMB_LENGTHS[i], time_scale), COMB_GAINS[i])
            }),
            allpasses: core::array::from_fn(|i| {
                Allpass::new(scaled_len(ALLPASS_LENGTHS[i], time_scale), ALLPASS_GAIN)
            }),
            wet: 0.0,
        }
    }

    /// Wet/dry mix in `[0, 1]`; 0 passes the input through untouched.
    pub fn set_wet(&mut self, wet: f32) {
        self.wet = wet.clamp(0.0, 1.0);
    }

    pub fn wet(&self) -> f32 {
        self.wet
    }

    /// Run one sample through the network and mix with the dry signal.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let attenuated = input * INPUT_ATTENUATION;
        let mut sum = 0.0;
        for comb in &mut self.combs {
            sum += comb.process(attenuated);
        }
        let mut network = sum * 0.25;
        for allpass in &mut self.allpasses {
            network = allpass.process(network);
        }
        (1.0 - self.wet) * input + self.wet * network
    }

    /// Clear all delay lines.
    pub fn reset(&mut self) {
        for comb in &mut self.combs {
            comb.reset();
        }
        for allpass in &mut self.allpasses {
            allpass.reset();
        }
    }
}

/// Effective delay length for a line, never shorter than one sample.
fn scaled_len(max_len: usize, time_scale: f32) -> usize {
    let scaled = Libm::<f32>::round(time_scale.clamp(0.0, 1.0) * max_len as f32) as usize;
    scaled.max(1)
}
