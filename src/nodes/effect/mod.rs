mod gain;
mod latency_delay;
mod slew_limiter;

pub use gain::Gain;
pub use latency_delay::LatencyDelay;
pub use slew_limiter::SlewLimiter;
