//! JSON wire codec for inbound motion messages.
//!
//! Frames follow the rosbridge `op`/`msg` layout:
//!
//! ```json
//! {"op":"pos_cmd","msg":{"position":{"x":0.3,"y":0.0,"z":0.5},"orientation":{"w":1.0,"x":0.0,"y":0.0,"z":0.0}}}
//! {"op":"get_state"}
//! ```
//!
//! `get_state` carries an empty payload; a `"msg": {}` field is tolerated.

use marsha_types::{ArmError, Pose};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Maximum byte length of a single inbound frame.
///
/// Frames longer than this are rejected before they are parsed.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024; // 64 KiB

/// Operation name for pose commands.
pub const OP_POSE_COMMAND: &str = "pos_cmd";
/// Operation name for current-pose queries.
pub const OP_POSE_QUERY: &str = "get_state";

/// A decoded inbound message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InboundMessage {
    /// Move the end effector to the given pose.
    PoseCommand(Pose),
    /// Report the current end-effector pose.
    PoseQuery,
}

#[derive(Deserialize, Serialize)]
struct Frame {
    op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    msg: Option<Value>,
}

/// Decode one frame.
///
/// # Errors
///
/// Returns [`ArmError::Parsing`] for oversized frames, malformed JSON,
/// unknown operations, or a `pos_cmd` whose payload is not a pose.
pub fn decode(frame: &str) -> Result<InboundMessage, ArmError> {
    if frame.len() > MAX_MESSAGE_BYTES {
        return Err(ArmError::Parsing(format!(
            "frame is {} bytes, exceeding the limit of {}",
            frame.len(),
            MAX_MESSAGE_BYTES,
        )));
    }
    let raw: Frame = serde_json::from_str(frame)
        .map_err(|e| ArmError::Parsing(format!("malformed frame: {e}")))?;

    match raw.op.as_str() {
        OP_POSE_COMMAND => {
            let msg = raw
                .msg
                .ok_or_else(|| ArmError::Parsing("pos_cmd frame has no msg".to_string()))?;
            let pose: Pose = serde_json::from_value(msg)
                .map_err(|e| ArmError::Parsing(format!("invalid pose payload: {e}")))?;
            Ok(InboundMessage::PoseCommand(pose))
        }
        OP_POSE_QUERY => Ok(InboundMessage::PoseQuery),
        other => Err(ArmError::Parsing(format!("unknown op '{other}'"))),
    }
}

/// Encode a message into its wire frame.
pub fn encode(message: &InboundMessage) -> String {
    let frame = match message {
        InboundMessage::PoseCommand(pose) => json!({ "op": OP_POSE_COMMAND, "msg": pose }),
        InboundMessage::PoseQuery => json!({ "op": OP_POSE_QUERY }),
    };
    frame.to_string()
}
