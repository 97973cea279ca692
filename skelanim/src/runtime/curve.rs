use crate::{Curve, CurvePoint, Interpolation};

const TIME_EPSILON: f32 = 1.0e-6;

impl Curve {
    /// Evaluates the curve for a clip playing the `[start, end]` window of its track.
    ///
    /// `percent` is the clip's own completion and may exceed `1` while a loop seam is being
    /// blended; `start`, `end` and `blend` are fractions of the full track duration. Past
    /// `end`, the value blends linearly from the value at `end` back to the value at `start`
    /// over `blend`.
    pub fn evaluate(&self, percent: f32, start: f32, end: f32, blend: f32, dst: &mut [f32]) {
        assert_eq!(
            dst.len(),
            self.components(),
            "curve evaluated into a buffer of the wrong size"
        );
        debug_assert!((0.0..=end).contains(&start) && end <= 1.0 + TIME_EPSILON);

        let local = start + (end - start) * percent;
        if blend > 0.0 && local > end {
            let t = ((local - end) / blend).clamp(0.0, 1.0);
            let points = self.points();
            for (c, out) in dst.iter_mut().enumerate() {
                let from = sample_component(points, end, c);
                let to = sample_component(points, start, c);
                *out = from + (to - from) * t;
            }
            return;
        }

        let local = local.clamp(start, end);
        let points = self.points();
        for (c, out) in dst.iter_mut().enumerate() {
            *out = sample_component(points, local, c);
        }
    }
}

fn sample_component(points: &[CurvePoint], time: f32, component: usize) -> f32 {
    let index = points.partition_point(|p| p.time <= time);
    if index == 0 {
        return points[0].value[component];
    }
    if index >= points.len() {
        return points[points.len() - 1].value[component];
    }
    let prev = &points[index - 1];
    let next = &points[index];
    let denom = next.time - prev.time;
    if denom.abs() <= 1.0e-12 {
        return next.value[component];
    }

    let value1 = prev.value[component];
    let value2 = next.value[component];
    let t = (time - prev.time) / denom;
    match prev.interpolation {
        Interpolation::Linear => value1 + (value2 - value1) * t,
        Interpolation::Stepped => value1,
        Interpolation::Bezier { cx1, cy1, cx2, cy2 } => {
            let eased = bezier_ease(t, cx1, cy1, cx2, cy2);
            value1 + (value2 - value1) * eased
        }
    }
}

/// Eased progress for the unit cubic through `(0, 0)`, `(cx1, cy1)`, `(cx2, cy2)`, `(1, 1)`.
///
/// Finds the curve parameter whose x equals `t` by bisection, then returns its y.
fn bezier_ease(t: f32, cx1: f32, cy1: f32, cx2: f32, cy2: f32) -> f32 {
    const STEPS: usize = 24;

    if t <= 0.0 {
        return 0.0;
    }
    if t >= 1.0 {
        return 1.0;
    }

    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    let mut s = t;
    for _ in 0..STEPS {
        s = (lo + hi) * 0.5;
        let x = unit_cubic(cx1, cx2, s);
        if (x - t).abs() <= 1.0e-6 {
            break;
        }
        if x < t {
            lo = s;
        } else {
            hi = s;
        }
    }
    unit_cubic(cy1, cy2, s)
}

/// One axis of a cubic bezier with end points fixed at 0 and 1.
fn unit_cubic(c1: f32, c2: f32, s: f32) -> f32 {
    let inv = 1.0 - s;
    3.0 * inv * inv * s * c1 + 3.0 * inv * s * s * c2 + s * s * s
}
