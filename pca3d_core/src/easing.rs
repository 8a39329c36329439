//! Easing functions - warps of a segment's local time in `[0, 1]`.

use std::f64::consts::PI;

/// Monotone time warp with `f(0) = 0` and `f(1) = 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Easing {
    Linear,
    /// `t^2 (3 - 2t)`
    Smoothstep,
    SineIn,
    SineOut,
    SineInOut,
    CircInOut,
    /// Holds at 0 for the first `amount` of the segment, at 1 for the last
    /// `amount`, and runs linearly in between.
    Squeeze { amount: f64 },
}

impl Easing {
    /// Applies the warp to `t`, clamped into `[0, 1]`.
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Easing::Linear => t,
            Easing::Smoothstep => t * t * (3.0 - 2.0 * t),
            Easing::SineIn => 1.0 - (t * PI / 2.0).cos(),
            Easing::SineOut => (t * PI / 2.0).sin(),
            Easing::SineInOut => -0.5 * ((PI * t).cos() - 1.0),
            Easing::CircInOut => {
                if t < 0.5 {
                    0.5 * (1.0 - (1.0 - 4.0 * t * t).max(0.0).sqrt())
                } else {
                    let u = 2.0 * t - 2.0;
                    0.5 * ((1.0 - u * u).max(0.0).sqrt() + 1.0)
                }
            }
            Easing::Squeeze { amount } => {
                let amount = amount.clamp(0.0, 0.5);
                if t <= amount {
                    0.0
                } else if t >= 1.0 - amount {
                    1.0
                } else {
                    (t - amount) / (1.0 - 2.0 * amount)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ALL: [Easing; 7] = [
        Easing::Linear,
        Easing::Smoothstep,
        Easing::SineIn,
        Easing::SineOut,
        Easing::SineInOut,
        Easing::CircInOut,
        Easing::Squeeze { amount: 0.1 },
    ];

    #[test]
    fn test_endpoints_fixed() {
        for easing in ALL {
            assert_relative_eq!(easing.apply(0.0), 0.0, epsilon = 1e-12);
            assert_relative_eq!(easing.apply(1.0), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_monotone() {
        for easing in ALL {
            let mut last = 0.0;
            for i in 0..=100 {
                let v = easing.apply(i as f64 / 100.0);
                assert!(v + 1e-12 >= last, "{:?} not monotone at {}", easing, i);
                last = v;
            }
        }
    }

    #[test]
    fn test_symmetric_midpoints() {
        assert_relative_eq!(Easing::Smoothstep.apply(0.5), 0.5);
        assert_relative_eq!(Easing::SineInOut.apply(0.5), 0.5, epsilon = 1e-12);
        assert_relative_eq!(Easing::CircInOut.apply(0.5), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_squeeze_holds_edges() {
        let squeeze = Easing::Squeeze { amount: 0.1 };
        assert_eq!(squeeze.apply(0.05), 0.0);
        assert_eq!(squeeze.apply(0.95), 1.0);
        assert_relative_eq!(squeeze.apply(0.5), 0.5);
    }
}
