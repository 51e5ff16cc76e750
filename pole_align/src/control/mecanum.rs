// THEORY:
// Mecanum mixing turns "drive this hard toward the target while turning this
// hard" into four independent wheel powers.
//
// The drive request is expressed relative to the turret, because that is where
// the camera looks. Before mixing it is rotated into the chassis frame using the
// turret's angle from chassis forward (0 = straight ahead, left negative). If the
// active camera faces backwards the reference is turned another 180 degrees so
// positive drive power still means "toward what the camera sees".
//
// Outputs are only ever scaled down as a group: if any wheel would exceed unit
// power, all four are divided by the largest magnitude, which keeps the commanded
// direction intact.

use serde::{Deserialize, Serialize};

/// One tick's motion request.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChassisCommand {
    pub forward_power: f64,
    pub turn_power: f64,
    /// Turret heading relative to chassis forward, degrees.
    pub reference_angle_deg: f64,
}

impl ChassisCommand {
    /// Builds a command with both powers in [-1, 1]. If either exceeds unit
    /// magnitude the pair is divided by the larger one, so their ratio holds.
    pub fn new(forward_power: f64, turn_power: f64, reference_angle_deg: f64) -> Self {
        let largest = forward_power.abs().max(turn_power.abs()).max(1.0);
        Self {
            forward_power: forward_power / largest,
            turn_power: turn_power / largest,
            reference_angle_deg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelPowers {
    pub front_left: f64,
    pub front_right: f64,
    pub rear_left: f64,
    pub rear_right: f64,
}

impl WheelPowers {
    pub const ZERO: WheelPowers = WheelPowers {
        front_left: 0.0,
        front_right: 0.0,
        rear_left: 0.0,
        rear_right: 0.0,
    };

    pub fn max_magnitude(&self) -> f64 {
        self.front_left
            .abs()
            .max(self.front_right.abs())
            .max(self.rear_left.abs())
            .max(self.rear_right.abs())
    }

    fn scaled(self, divisor: f64) -> Self {
        Self {
            front_left: self.front_left / divisor,
            front_right: self.front_right / divisor,
            rear_left: self.rear_left / divisor,
            rear_right: self.rear_right / divisor,
        }
    }
}

/// Wraps an angle into (-180, 180].
pub fn wrap_degrees(angle_deg: f64) -> f64 {
    let mut wrapped = angle_deg % 360.0;
    if wrapped <= -180.0 {
        wrapped += 360.0;
    } else if wrapped > 180.0 {
        wrapped -= 360.0;
    }
    wrapped
}

/// Raw mecanum mix before normalization.
pub fn mix_raw(command: &ChassisCommand, facing_front: bool) -> WheelPowers {
    let mut turret_angle = command.reference_angle_deg;
    if !facing_front {
        turret_angle = wrap_degrees(turret_angle + 180.0);
    }

    let heading = (turret_angle + 90.0).to_radians();
    let y = command.forward_power * heading.sin();
    let x = -command.forward_power * heading.cos();
    let turn = command.turn_power;

    WheelPowers {
        front_right: y - x + turn,
        front_left: y + x - turn,
        rear_right: y + x + turn,
        rear_left: y - x - turn,
    }
}

/// Mixes and normalizes so no wheel exceeds unit magnitude.
pub fn mix(command: &ChassisCommand, facing_front: bool) -> WheelPowers {
    let raw = mix_raw(command, facing_front);
    let max_power = raw.max_magnitude();
    if max_power > 1.0 { raw.scaled(max_power) } else { raw }
}
