//! Action vector → controller state

use crate::schema::{ACTION_SIZE, BOOST, JUMP, PITCH, ROLL, STEER, THROTTLE, YAW};

/// Action value above this counts as pressed for jump and boost
pub const JUMP_BOOST_THRESHOLD: f32 = 0.5;

/// Controller input for one car, aligned with the game's controller state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerState {
    pub throttle: f32,
    pub steer: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub jump: bool,
    pub boost: bool,
    pub handbrake: bool,
}

impl ControllerState {
    /// Analog axes are clipped to `[-1, 1]`, jump and boost are thresholded.
    /// An action shorter than `ACTION_SIZE` yields the neutral controller.
    pub fn from_action(action: &[f32]) -> Self {
        if action.len() < ACTION_SIZE {
            return Self::default();
        }

        let clip = |v: f32| v.clamp(-1.0, 1.0);

        Self {
            throttle: clip(action[THROTTLE]),
            steer: clip(action[STEER]),
            pitch: clip(action[PITCH]),
            yaw: clip(action[YAW]),
            roll: clip(action[ROLL]),
            jump: action[JUMP] > JUMP_BOOST_THRESHOLD,
            boost: action[BOOST] > JUMP_BOOST_THRESHOLD,
            handbrake: false,
        }
    }
}
