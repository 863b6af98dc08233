//! Automation lanes: parameter values that follow the timeline.
//!
//! A lane is a list of breakpoints in beats. Between two points the value
//! follows the curve of the earlier point; before the first point and after
//! the last the nearest point's value holds.

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::node::PluginId;

/// Shape of the segment that starts at a point.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Curve {
    #[default]
    Linear,
    /// Bent power curve. Positive shapes start slow and finish fast,
    /// negative shapes the opposite. Clamped to [-1, 1].
    Exponential(f32),
    /// Keep this point's value until the next point
    Hold,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutomationPoint {
    pub beat: f64,
    pub value: f32,
    pub curve: Curve,
}

impl AutomationPoint {
    pub fn new(beat: f64, value: f32) -> Self {
        Self {
            beat,
            value,
            curve: Curve::Linear,
        }
    }

    pub fn with_curve(mut self, curve: Curve) -> Self {
        self.curve = curve;
        self
    }
}

/// What a lane drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AutomationTarget {
    /// Node level in dB
    Volume,
    /// Node level, linear
    Gain,
    Pan,
    /// Parameter `index` of a plugin in the node's chain
    Plugin { plugin: PluginId, index: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct AutomationLane {
    target: AutomationTarget,
    points: Vec<AutomationPoint>,
}

impl AutomationLane {
    /// Build a lane from `points` in any order. Points sharing a beat keep
    /// their given order, which makes an instant jump.
    pub fn new(target: AutomationTarget, mut points: Vec<AutomationPoint>) -> Result<Self> {
        if let Some(bad) = points
            .iter()
            .find(|p| !(p.beat.is_finite() && p.beat >= 0.0 && p.value.is_finite()))
        {
            return Err(Error::InvalidAutomationPoint {
                beat: bad.beat,
                value: bad.value,
            });
        }
        points.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        Ok(Self { target, points })
    }

    pub fn target(&self) -> AutomationTarget {
        self.target
    }

    pub fn points(&self) -> &[AutomationPoint] {
        &self.points
    }

    /// Value at `beat`, or `None` for an empty lane.
    pub fn value_at(&self, beat: f64) -> Option<f32> {
        let first = self.points.first()?;
        let next = self.points.partition_point(|p| p.beat <= beat);
        if next == 0 {
            return Some(first.value);
        }
        let from = self.points[next - 1];
        let Some(to) = self.points.get(next) else {
            return Some(from.value);
        };

        let t = (beat - from.beat) / (to.beat - from.beat);
        let t = match from.curve {
            Curve::Linear => t,
            Curve::Exponential(shape) => bend(t, shape.clamp(-1.0, 1.0) as f64),
            Curve::Hold => 0.0,
        };
        Some(from.value + (to.value - from.value) * t as f32)
    }

    /// Same lane with every value clamped to `[min, max]`.
    pub(crate) fn clamped(mut self, min: f32, max: f32) -> Self {
        self.points.iter_mut().for_each(|p| p.value = p.value.clamp(min, max));
        self
    }
}

fn bend(t: f64, shape: f64) -> f64 {
    if shape > 0.0 {
        t.powf(1.0 + shape * 2.0)
    } else {
        1.0 - (1.0 - t).powf(1.0 - shape * 2.0)
    }
}
