//! Base pose parsing and validation.
//!
//! The supervisory API accepts the robot base pose either as a 6-component
//! `[x, y, z, roll, pitch, yaw]` vector or as a 7-component
//! `[x, y, z, qx, qy, qz, qw]` position + quaternion. Quaternions whose norm
//! deviates from 1 by more than [`QUATERNION_NORM_TOLERANCE`] are rejected.

use crate::consts::QUATERNION_NORM_TOLERANCE;
use crate::error::SupervisorError;

/// A validated robot base pose: position + roll/pitch/yaw orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasePose {
    /// Position [x, y, z].
    pub xyz: [f64; 3],
    /// Orientation [roll, pitch, yaw], ZYX convention.
    pub rpy: [f64; 3],
}

impl BasePose {
    /// Parse and validate a caller-supplied pose vector.
    ///
    /// Accepts 6 components (xyz + rpy) or 7 components (xyz + quaternion).
    ///
    /// # Errors
    /// `SupervisorError::Validation` if the length is neither 6 nor 7, or if
    /// the quaternion norm deviates from 1 by more than the tolerance.
    pub fn parse(values: &[f64]) -> Result<Self, SupervisorError> {
        match values.len() {
            6 => Ok(Self {
                xyz: [values[0], values[1], values[2]],
                rpy: [values[3], values[4], values[5]],
            }),
            7 => {
                let (qx, qy, qz, qw) = (values[3], values[4], values[5], values[6]);
                let norm = (qx * qx + qy * qy + qz * qz + qw * qw).sqrt();
                if (norm - 1.0).abs() > QUATERNION_NORM_TOLERANCE {
                    return Err(SupervisorError::Validation(format!(
                        "quaternion is not normalized (norm = {norm:.4})"
                    )));
                }
                Ok(Self {
                    xyz: [values[0], values[1], values[2]],
                    rpy: quaternion_to_rpy(qx / norm, qy / norm, qz / norm, qw / norm),
                })
            }
            n => Err(SupervisorError::Validation(format!(
                "base pose must have 6 or 7 components, got {n}"
            ))),
        }
    }

    /// Flatten to a 6-component `[x, y, z, roll, pitch, yaw]` vector.
    pub fn to_xyzrpy(self) -> [f64; 6] {
        [
            self.xyz[0], self.xyz[1], self.xyz[2], self.rpy[0], self.rpy[1], self.rpy[2],
        ]
    }
}

/// Convert a unit quaternion to roll/pitch/yaw (ZYX convention).
fn quaternion_to_rpy(qx: f64, qy: f64, qz: f64, qw: f64) -> [f64; 3] {
    let roll = (2.0 * (qw * qx + qy * qz)).atan2(1.0 - 2.0 * (qx * qx + qy * qy));
    // Clamp to guard asin against rounding just outside [-1, 1].
    let pitch = (2.0 * (qw * qy - qz * qx)).clamp(-1.0, 1.0).asin();
    let yaw = (2.0 * (qw * qz + qx * qy)).atan2(1.0 - 2.0 * (qy * qy + qz * qz));
    [roll, pitch, yaw]
}
