//! Game tick → observation vector

use crate::schema::{
    BALL_POSITION, BALL_VELOCITY, CAR_ANGULAR_VELOCITY, CAR_BOOST, CAR_POSITION, CAR_ROTATION,
    CAR_VELOCITY, MAX_BOOST, OBS_SIZE, Observation,
};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Euler rotation in radians
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rotator {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Physics {
    pub location: Vec3,
    pub velocity: Vec3,
    pub rotation: Rotator,
    pub angular_velocity: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerInfo {
    pub physics: Physics,
    pub boost: i32,
}

/// Snapshot of one game tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameTick {
    pub ball: Physics,
    pub players: Vec<PlayerInfo>,
}

impl GameTick {
    /// Observation for `player_index`.
    ///
    /// An out-of-range player leaves every car field at zero. Boost is only
    /// copied when it lies in `[0, 100]`. Padding is always zero.
    pub fn observation(&self, player_index: usize) -> Observation {
        let mut obs = [0.0f32; OBS_SIZE];
        self.fill_observation(&mut obs, player_index);
        obs
    }

    /// Write the observation into `dst`. Does nothing if `dst` is shorter
    /// than `OBS_SIZE`.
    pub fn fill_observation(&self, dst: &mut [f32], player_index: usize) {
        if dst.len() < OBS_SIZE {
            return;
        }

        dst[BALL_POSITION].copy_from_slice(&self.ball.location.to_array());
        dst[BALL_VELOCITY].copy_from_slice(&self.ball.velocity.to_array());

        dst[CAR_POSITION.start..OBS_SIZE].fill(0.0);

        let Some(car) = self.players.get(player_index) else {
            return;
        };
        let p = &car.physics;
        dst[CAR_POSITION].copy_from_slice(&p.location.to_array());
        dst[CAR_VELOCITY].copy_from_slice(&p.velocity.to_array());
        dst[CAR_ROTATION].copy_from_slice(&[p.rotation.pitch, p.rotation.yaw, p.rotation.roll]);
        dst[CAR_ANGULAR_VELOCITY].copy_from_slice(&p.angular_velocity.to_array());
        if (0..=MAX_BOOST as i32).contains(&car.boost) {
            dst[CAR_BOOST] = car.boost as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PADDING;

    fn tick() -> GameTick {
        GameTick {
            ball: Physics {
                location: Vec3::new(1.0, 2.0, 3.0),
                velocity: Vec3::new(4.0, 5.0, 6.0),
                ..Default::default()
            },
            players: vec![PlayerInfo {
                physics: Physics {
                    location: Vec3::new(7.0, 8.0, 9.0),
                    velocity: Vec3::new(10.0, 11.0, 12.0),
                    rotation: Rotator {
                        pitch: 0.1,
                        yaw: 0.2,
                        roll: 0.3,
                    },
                    angular_velocity: Vec3::new(1.5, 2.5, 3.5),
                },
                boost: 42,
            }],
        }
    }

    #[test]
    fn test_observation_layout() {
        let obs = tick().observation(0);
        assert_eq!(&obs[0..6], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(&obs[6..12], &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        assert_eq!(&obs[12..15], &[0.1, 0.2, 0.3]);
        assert_eq!(&obs[15..18], &[1.5, 2.5, 3.5]);
        assert_eq!(obs[CAR_BOOST], 42.0);
        assert!(obs[PADDING].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_missing_player_zeroes_car_fields() {
        let mut dst = [9.0f32; OBS_SIZE];
        tick().fill_observation(&mut dst, 3);
        assert_eq!(dst[0], 1.0);
        assert!(dst[CAR_POSITION.start..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_invalid_boost_is_skipped() {
        let mut t = tick();
        t.players[0].boost = 255;
        assert_eq!(t.observation(0)[CAR_BOOST], 0.0);
    }

    #[test]
    fn test_short_buffer_is_untouched() {
        let mut dst = [9.0f32; 10];
        tick().fill_observation(&mut dst, 0);
        assert!(dst.iter().all(|v| *v == 9.0));
    }
}
