//! Game-side halves of the vector contract: building an observation from a
//! game tick and turning a policy action into controller input.

pub mod control;
pub mod obs;

pub use control::{ControllerState, JUMP_BOOST_THRESHOLD};
pub use obs::{GameTick, Physics, PlayerInfo, Rotator, Vec3};
