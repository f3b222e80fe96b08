//! Observation and action layout shared by training, export and inference.
//!
//! Every collaborator (environment adapter, trainer, export bridge and the
//! external inference runtime) allocates its buffers from [`OBS_SIZE`] and
//! [`ACTION_SIZE`]. A mismatch is not detected at runtime, so these two
//! integers and the field layout below are only ever edited here.
//!
//! Observation layout:
//!
//! ```text
//! [0..3]   ball position        x, y, z
//! [3..6]   ball velocity        vx, vy, vz
//! [6..9]   car position         x, y, z
//! [9..12]  car velocity         vx, vy, vz
//! [12..15] car rotation         pitch, yaw, roll (radians)
//! [15..18] car angular velocity ax, ay, az
//! [18]     car boost            0..100
//! [19..25] reserved padding
//! ```
//!
//! Action layout: `[throttle, steer, pitch, yaw, roll, jump, boost]`.
//!
//! Bounds are normalization hints. Nothing in the crate rejects values
//! outside them.

use std::f32::consts::PI;
use std::ops::Range;
use std::sync::LazyLock;

use rand::Rng;

/// Ball position (3) + velocity (3)
pub const BALL_FEATURES: usize = 6;
/// Car position (3), velocity (3), rotation (3), angular velocity (3), boost (1)
pub const CAR_FEATURES: usize = 13;
/// Reserved for game time, ball touch, etc.
pub const OBS_PAD: usize = 6;

pub const OBS_SIZE: usize = BALL_FEATURES + CAR_FEATURES + OBS_PAD;
pub const ACTION_SIZE: usize = 7;

const _: () = assert!(OBS_SIZE == 25);
const _: () = assert!(ACTION_SIZE == 7);

pub type Observation = [f32; OBS_SIZE];
pub type Action = [f32; ACTION_SIZE];

pub const BALL_POSITION: Range<usize> = 0..3;
pub const BALL_VELOCITY: Range<usize> = 3..6;
pub const CAR_POSITION: Range<usize> = 6..9;
pub const CAR_VELOCITY: Range<usize> = 9..12;
pub const CAR_ROTATION: Range<usize> = 12..15;
pub const CAR_ANGULAR_VELOCITY: Range<usize> = 15..18;
pub const CAR_BOOST: usize = 18;
pub const PADDING: Range<usize> = 19..OBS_SIZE;

pub const THROTTLE: usize = 0;
pub const STEER: usize = 1;
pub const PITCH: usize = 2;
pub const YAW: usize = 3;
pub const ROLL: usize = 4;
pub const JUMP: usize = 5;
pub const BOOST: usize = 6;

pub const ACTION_NAMES: [&str; ACTION_SIZE] =
    ["throttle", "steer", "pitch", "yaw", "roll", "jump", "boost"];

/// Half extent of the playing surface
pub const FIELD_EXTENT: f32 = 4096.0;
/// Velocity cap for ball and car
pub const MAX_SPEED: f32 = 2300.0;
/// Angular velocity cap (rad/s)
pub const MAX_ANGULAR_SPEED: f32 = 5.5;
pub const MAX_BOOST: f32 = 100.0;

/// Lower and upper observation bounds in field order.
pub fn observation_bounds() -> (Observation, Observation) {
    let mut low = [0.0f32; OBS_SIZE];
    let mut high = [0.0f32; OBS_SIZE];

    let groups: [(Range<usize>, f32, f32); 8] = [
        (BALL_POSITION, -FIELD_EXTENT, FIELD_EXTENT),
        (BALL_VELOCITY, -MAX_SPEED, MAX_SPEED),
        (CAR_POSITION, -FIELD_EXTENT, FIELD_EXTENT),
        (CAR_VELOCITY, -MAX_SPEED, MAX_SPEED),
        (CAR_ROTATION, -PI, PI),
        (CAR_ANGULAR_VELOCITY, -MAX_ANGULAR_SPEED, MAX_ANGULAR_SPEED),
        (CAR_BOOST..CAR_BOOST + 1, 0.0, MAX_BOOST),
        (PADDING, -1.0, 1.0),
    ];

    for (range, lo, hi) in groups {
        low[range.clone()].fill(lo);
        high[range].fill(hi);
    }

    (low, high)
}

/// Lower and upper action bounds in field order.
pub fn action_bounds() -> (Action, Action) {
    let mut low = [-1.0f32; ACTION_SIZE];
    let high = [1.0f32; ACTION_SIZE];
    low[JUMP] = 0.0;
    low[BOOST] = 0.0;
    (low, high)
}

/// Axis-aligned box of `N` inclusive per-dimension bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxSpace<const N: usize> {
    pub low: [f32; N],
    pub high: [f32; N],
}

impl<const N: usize> BoxSpace<N> {
    pub fn new(low: [f32; N], high: [f32; N]) -> Self {
        Self { low, high }
    }

    pub const fn dim(&self) -> usize {
        N
    }

    /// Inclusive containment check.
    pub fn contains(&self, values: &[f32; N]) -> bool {
        values
            .iter()
            .zip(self.low.iter().zip(self.high.iter()))
            .all(|(v, (lo, hi))| *v >= *lo && *v <= *hi)
    }

    /// Draw a point uniformly within the box.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> [f32; N] {
        let mut out = [0.0f32; N];
        for (i, value) in out.iter_mut().enumerate() {
            *value = rng.random_range(self.low[i]..=self.high[i]);
        }
        out
    }

    pub fn clip(&self, values: &[f32; N]) -> [f32; N] {
        let mut out = *values;
        for (i, value) in out.iter_mut().enumerate() {
            *value = value.clamp(self.low[i], self.high[i]);
        }
        out
    }

    pub fn center(&self) -> [f32; N] {
        let mut out = [0.0f32; N];
        for (i, value) in out.iter_mut().enumerate() {
            *value = (self.low[i] + self.high[i]) * 0.5;
        }
        out
    }

    pub fn half_range(&self) -> [f32; N] {
        let mut out = [0.0f32; N];
        for (i, value) in out.iter_mut().enumerate() {
            *value = (self.high[i] - self.low[i]) * 0.5;
        }
        out
    }

    /// Map values from `[-1, 1]` onto the box.
    pub fn unscale(&self, normalized: &[f32; N]) -> [f32; N] {
        let center = self.center();
        let half = self.half_range();
        let mut out = [0.0f32; N];
        for i in 0..N {
            out[i] = center[i] + normalized[i] * half[i];
        }
        out
    }

    /// Map values from the box onto `[-1, 1]`.
    pub fn scale(&self, values: &[f32; N]) -> [f32; N] {
        let center = self.center();
        let half = self.half_range();
        let mut out = [0.0f32; N];
        for i in 0..N {
            out[i] = if half[i] > 0.0 {
                (values[i] - center[i]) / half[i]
            } else {
                0.0
            };
        }
        out
    }
}

static OBSERVATION_SPACE: LazyLock<BoxSpace<OBS_SIZE>> = LazyLock::new(|| {
    let (low, high) = observation_bounds();
    BoxSpace::new(low, high)
});

static ACTION_SPACE: LazyLock<BoxSpace<ACTION_SIZE>> = LazyLock::new(|| {
    let (low, high) = action_bounds();
    BoxSpace::new(low, high)
});

/// Process-wide observation space, built once from [`observation_bounds`].
pub fn observation_space() -> &'static BoxSpace<OBS_SIZE> {
    &OBSERVATION_SPACE
}

/// Process-wide action space, built once from [`action_bounds`].
pub fn action_space() -> &'static BoxSpace<ACTION_SIZE> {
    &ACTION_SPACE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_sizes() {
        assert_eq!(OBS_SIZE, 25);
        assert_eq!(ACTION_SIZE, 7);
        assert_eq!(PADDING.len(), OBS_PAD);
        assert_eq!(ACTION_NAMES.len(), ACTION_SIZE);
    }

    #[test]
    fn test_layout_is_contiguous() {
        let groups = [
            BALL_POSITION,
            BALL_VELOCITY,
            CAR_POSITION,
            CAR_VELOCITY,
            CAR_ROTATION,
            CAR_ANGULAR_VELOCITY,
            CAR_BOOST..CAR_BOOST + 1,
            PADDING,
        ];
        let mut next = 0;
        for group in groups {
            assert_eq!(group.start, next);
            next = group.end;
        }
        assert_eq!(next, OBS_SIZE);
    }

    #[test]
    fn test_observation_bounds() {
        let (low, high) = observation_bounds();
        assert_eq!(low.len(), OBS_SIZE);
        assert!(low.iter().zip(high.iter()).all(|(lo, hi)| lo <= hi));
        assert_eq!(low[0], -4096.0);
        assert_eq!(high[3], 2300.0);
        assert_eq!(high[12], PI);
        assert_eq!(high[15], 5.5);
        assert_eq!((low[CAR_BOOST], high[CAR_BOOST]), (0.0, 100.0));
        assert_eq!((low[24], high[24]), (-1.0, 1.0));
    }

    #[test]
    fn test_bounds_are_bit_identical() {
        let (a_low, a_high) = observation_bounds();
        let (b_low, b_high) = observation_bounds();
        assert!(a_low.iter().zip(b_low.iter()).all(|(a, b)| a.to_bits() == b.to_bits()));
        assert!(a_high.iter().zip(b_high.iter()).all(|(a, b)| a.to_bits() == b.to_bits()));
        assert_eq!(action_bounds(), action_bounds());
    }

    #[test]
    fn test_action_bounds() {
        let (low, high) = action_bounds();
        assert_eq!(low, [-1.0, -1.0, -1.0, -1.0, -1.0, 0.0, 0.0]);
        assert_eq!(high, [1.0; ACTION_SIZE]);
    }

    #[test]
    fn test_sample_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let space = observation_space();
        for _ in 0..100 {
            assert!(space.contains(&space.sample(&mut rng)));
        }
    }

    #[test]
    fn test_scale_round_trip_on_action_space() {
        let space = action_space();
        let action = [0.5, -0.25, 1.0, -1.0, 0.0, 0.75, 0.0];
        let back = space.unscale(&space.scale(&action));
        for (a, b) in action.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert_eq!(space.unscale(&[-1.0; ACTION_SIZE]), space.low);
    }

    #[test]
    fn test_clip_does_not_reject() {
        let space = action_space();
        let clipped = space.clip(&[3.0, -3.0, 0.0, 0.0, 0.0, 2.0, -1.0]);
        assert_eq!(clipped, [1.0, -1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert!(!space.contains(&[3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
    }
}
