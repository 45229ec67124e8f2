//! Joint identifiers and fixed-length per-joint storage.
//!
//! The arm has six revolute joints plus one gripper joint.  Every per-joint
//! buffer in the stack is a [`JointArray`] indexed by [`JointId`], so a value
//! can never be read from or written to the wrong slot.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ArmError;

/// Number of joints on the arm, gripper included.
pub const JOINT_COUNT: usize = 7;

/// Number of revolute arm joints (everything except the gripper).
pub const ARM_JOINT_COUNT: usize = 6;

/// Stable identifier of a single joint.
///
/// The discriminant is the joint's slot in every [`JointArray`] and never
/// changes for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JointId {
    #[serde(rename = "joint_1")]
    Joint1,
    #[serde(rename = "joint_2")]
    Joint2,
    #[serde(rename = "joint_3")]
    Joint3,
    #[serde(rename = "joint_4")]
    Joint4,
    #[serde(rename = "joint_5")]
    Joint5,
    #[serde(rename = "joint_6")]
    Joint6,
    #[serde(rename = "gripper_joint")]
    Gripper,
}

impl JointId {
    /// Every joint in index order.
    pub const ALL: [JointId; JOINT_COUNT] = [
        JointId::Joint1,
        JointId::Joint2,
        JointId::Joint3,
        JointId::Joint4,
        JointId::Joint5,
        JointId::Joint6,
        JointId::Gripper,
    ];

    /// The six revolute joints driven through step channels.
    pub const ARM: [JointId; ARM_JOINT_COUNT] = [
        JointId::Joint1,
        JointId::Joint2,
        JointId::Joint3,
        JointId::Joint4,
        JointId::Joint5,
        JointId::Joint6,
    ];

    /// Slot of this joint in a [`JointArray`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Joint name as used in URDFs, config files, and log lines.
    pub const fn name(self) -> &'static str {
        match self {
            JointId::Joint1 => "joint_1",
            JointId::Joint2 => "joint_2",
            JointId::Joint3 => "joint_3",
            JointId::Joint4 => "joint_4",
            JointId::Joint5 => "joint_5",
            JointId::Joint6 => "joint_6",
            JointId::Gripper => "gripper_joint",
        }
    }

    /// `true` for the gripper, which uses open/close semantics instead of a
    /// step channel.
    pub const fn is_gripper(self) -> bool {
        matches!(self, JointId::Gripper)
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JointId {
    type Err = ArmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JointId::ALL
            .into_iter()
            .find(|j| j.name() == s)
            .ok_or_else(|| ArmError::Config(format!("unknown joint name '{s}'")))
    }
}

/// Fixed-length array holding one `T` per joint, indexed by [`JointId`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointArray<T>([T; JOINT_COUNT]);

impl<T> JointArray<T> {
    /// Wrap a raw array whose slots are already in [`JointId::ALL`] order.
    pub const fn new(values: [T; JOINT_COUNT]) -> Self {
        Self(values)
    }

    /// Build an array by evaluating `f` once per joint.
    pub fn from_fn(mut f: impl FnMut(JointId) -> T) -> Self {
        Self(std::array::from_fn(|i| f(JointId::ALL[i])))
    }

    /// Iterate `(joint, value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (JointId, &T)> {
        JointId::ALL.into_iter().zip(self.0.iter())
    }

    /// Iterate `(joint, value)` pairs mutably in index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (JointId, &mut T)> {
        JointId::ALL.into_iter().zip(self.0.iter_mut())
    }

    /// Apply `f` to every slot, keeping the joint association.
    pub fn map<U>(self, mut f: impl FnMut(JointId, T) -> U) -> JointArray<U> {
        let mut slot = 0;
        JointArray(self.0.map(|value| {
            let joint = JointId::ALL[slot];
            slot += 1;
            f(joint, value)
        }))
    }

    /// Borrow the raw slots.
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    /// Number of slots; always [`JOINT_COUNT`].
    pub const fn len(&self) -> usize {
        JOINT_COUNT
    }

    /// Always `false`; present for API symmetry with slices.
    pub const fn is_empty(&self) -> bool {
        false
    }
}

impl<T: Copy> JointArray<T> {
    /// An array with every slot set to `value`.
    pub const fn splat(value: T) -> Self {
        Self([value; JOINT_COUNT])
    }
}

impl<T: Default> Default for JointArray<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<JointId> for JointArray<T> {
    type Output = T;

    fn index(&self, joint: JointId) -> &T {
        &self.0[joint.index()]
    }
}

impl<T> IndexMut<JointId> for JointArray<T> {
    fn index_mut(&mut self, joint: JointId) -> &mut T {
        &mut self.0[joint.index()]
    }
}

impl<T> From<[T; JOINT_COUNT]> for JointArray<T> {
    fn from(values: [T; JOINT_COUNT]) -> Self {
        Self(values)
    }
}

/// Joint-space snapshot produced by one hardware read.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointState {
    /// Joint angles in radians.
    pub position: JointArray<f64>,
    /// Joint velocities in radians per second.
    pub velocity: JointArray<f64>,
    /// Joint efforts.  Zero wherever the hardware has no effort sensing.
    pub effort: JointArray<f64>,
}

/// Command on the gripper channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GripCommand {
    #[default]
    Open,
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_match_all_order() {
        for (i, joint) in JointId::ALL.iter().enumerate() {
            assert_eq!(joint.index(), i);
        }
        assert_eq!(JointId::Gripper.index(), JOINT_COUNT - 1);
    }

    #[test]
    fn arm_excludes_gripper() {
        assert!(JointId::ARM.iter().all(|j| !j.is_gripper()));
        assert_eq!(JointId::ARM.len(), ARM_JOINT_COUNT);
    }

    #[test]
    fn name_parse_roundtrip() {
        for joint in JointId::ALL {
            assert_eq!(joint.name().parse::<JointId>().unwrap(), joint);
        }
        assert!("joint_7".parse::<JointId>().is_err());
    }

    #[test]
    fn joint_array_indexing_by_id() {
        let mut arr = JointArray::splat(0.0_f64);
        arr[JointId::Joint3] = 1.5;
        arr[JointId::Gripper] = -0.2;
        assert_eq!(arr.as_slice()[2], 1.5);
        assert_eq!(arr.as_slice()[6], -0.2);
        assert_eq!(arr.len(), JOINT_COUNT);
    }

    #[test]
    fn map_keeps_joint_association() {
        let arr = JointArray::from_fn(|j| j.index() as i64);
        let doubled = arr.map(|j, v| (j, v * 2));
        for (joint, (mapped_joint, value)) in doubled.iter() {
            assert_eq!(joint, *mapped_joint);
            assert_eq!(*value, joint.index() as i64 * 2);
        }
    }

    #[test]
    fn joint_id_serializes_with_urdf_names() {
        let json = serde_json::to_string(&JointId::Gripper).unwrap();
        assert_eq!(json, "\"gripper_joint\"");
        let back: JointId = serde_json::from_str("\"joint_4\"").unwrap();
        assert_eq!(back, JointId::Joint4);
    }
}
