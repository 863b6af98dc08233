mod sine;
mod synth;

pub use sine::Sine;
pub use synth::SineSynth;
