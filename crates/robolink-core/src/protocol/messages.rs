//! Robot message vocabulary.
//!
//! The link itself treats every line as an opaque payload.  This module is a
//! convenience for consumers that want to drive the robot or render what it
//! reports.
//!
//! # Outgoing commands
//!
//! | Command      | Wire text |
//! |--------------|-----------|
//! | Forward      | `f`       |
//! | Reverse      | `r`       |
//! | Turn left    | `lf`      |
//! | Turn right   | `lr`      |
//!
//! # Incoming lines
//!
//! ```text
//! TARGET, 3, Bullseye                 -> TargetUpdate { id: 3, value: "Bullseye" }
//! ROBOT, 4, 7, E                      -> RobotPosition { x: 4, y: 7, rotation: 90 }
//! {"status": "Moving"}                -> Status("Moving")
//! {"robot": {"x":1,"y":2,"r":180}}    -> RobotPosition { x: 1, y: 2, rotation: 180 }
//! {"obstacle": {"id":1,"x":8,"y":8}}  -> Obstacle { id: 1, x: 8, y: 8 }
//! {"clear": true}                     -> ClearMap
//! anything else                       -> Text(line)
//! ```
//!
//! A single JSON line may carry several keys, so parsing yields a `Vec`.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

const TARGET_PREFIX: &str = "TARGET,";
const ROBOT_PREFIX: &str = "ROBOT,";

/// Errors raised while interpreting a received line.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// A `TARGET` or `ROBOT` line did not have the expected fields.
    #[error("failed to parse {kind} update: {line}")]
    Malformed { kind: &'static str, line: String },

    /// The text does not name a known robot command.
    #[error("unknown robot command: {0}")]
    UnknownCommand(String),
}

/// Movement commands understood by the robot firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RobotCommand {
    Forward,
    Reverse,
    TurnLeft,
    TurnRight,
}

impl RobotCommand {
    /// The exact text sent over the link (before CRLF normalisation).
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Forward => "f",
            Self::Reverse => "r",
            Self::TurnLeft => "lf",
            Self::TurnRight => "lr",
        }
    }
}

impl fmt::Display for RobotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for RobotCommand {
    type Err = ProtocolError;

    /// Accepts either the wire text (`lf`) or a name (`left`, `turn-left`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f" | "forward" => Ok(Self::Forward),
            "r" | "reverse" | "back" => Ok(Self::Reverse),
            "lf" | "left" | "turn-left" => Ok(Self::TurnLeft),
            "lr" | "right" | "turn-right" => Ok(Self::TurnRight),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

/// Compass heading reported in `ROBOT` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heading {
    North,
    East,
    South,
    West,
}

impl Heading {
    /// Parses a single-letter heading.  Unknown letters map to `North`.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "E" => Self::East,
            "S" => Self::South,
            "W" => Self::West,
            _ => Self::North,
        }
    }

    /// Clockwise rotation from north in degrees.
    pub fn degrees(self) -> f32 {
        match self {
            Self::North => 0.0,
            Self::East => 90.0,
            Self::South => 180.0,
            Self::West => 270.0,
        }
    }
}

/// A decoded message from the robot.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    /// An obstacle's target face was identified.
    TargetUpdate { id: u32, value: String },
    /// The robot's position on the arena grid and its rotation in degrees.
    RobotPosition { x: f32, y: f32, rotation: f32 },
    /// Free-form status text.
    Status(String),
    /// An obstacle placed by the robot.
    Obstacle { id: u32, x: f32, y: f32 },
    /// The robot asked for the arena to be cleared.
    ClearMap,
    /// A line with no recognised structure.
    Text(String),
}

#[derive(Deserialize)]
struct PoseJson {
    x: f32,
    y: f32,
    r: f32,
}

#[derive(Deserialize)]
struct ObstacleJson {
    id: u32,
    x: f32,
    y: f32,
}

/// Interprets one decoded line from the robot.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] when a line starts with `TARGET,` or
/// `ROBOT,` but its fields cannot be parsed.  JSON that fails to parse is not
/// an error; the line is returned as [`DeviceMessage::Text`].
pub fn parse_device_line(line: &str) -> Result<Vec<DeviceMessage>, ProtocolError> {
    if line.starts_with(TARGET_PREFIX) {
        return parse_target(line).map(|m| vec![m]);
    }
    if line.starts_with(ROBOT_PREFIX) {
        return parse_robot(line).map(|m| vec![m]);
    }

    let messages = parse_json_payload(line);
    if messages.is_empty() {
        Ok(vec![DeviceMessage::Text(line.to_string())])
    } else {
        Ok(messages)
    }
}

fn parse_target(line: &str) -> Result<DeviceMessage, ProtocolError> {
    let malformed = || ProtocolError::Malformed {
        kind: "target",
        line: line.to_string(),
    };
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 3 {
        return Err(malformed());
    }
    let id = parts[1].trim().parse::<u32>().map_err(|_| malformed())?;
    Ok(DeviceMessage::TargetUpdate {
        id,
        value: parts[2].trim().to_string(),
    })
}

fn parse_robot(line: &str) -> Result<DeviceMessage, ProtocolError> {
    let malformed = || ProtocolError::Malformed {
        kind: "robot",
        line: line.to_string(),
    };
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 4 {
        return Err(malformed());
    }
    let x = parts[1].trim().parse::<f32>().map_err(|_| malformed())?;
    let y = parts[2].trim().parse::<f32>().map_err(|_| malformed())?;
    Ok(DeviceMessage::RobotPosition {
        x,
        y,
        rotation: Heading::from_code(parts[3]).degrees(),
    })
}

/// Extracts the JSON object spanning the first `{` to the last `}`.
fn parse_json_payload(line: &str) -> Vec<DeviceMessage> {
    let (Some(start), Some(end)) = (line.find('{'), line.rfind('}')) else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&line[start..=end]) else {
        return Vec::new();
    };

    let mut messages = Vec::new();
    if let Some(Value::String(status)) = map.get("status") {
        messages.push(DeviceMessage::Status(status.clone()));
    }
    if let Some(robot) = map.get("robot") {
        match PoseJson::deserialize(robot) {
            Ok(p) => messages.push(DeviceMessage::RobotPosition {
                x: p.x,
                y: p.y,
                rotation: p.r,
            }),
            Err(e) => tracing::debug!("ignoring robot payload: {e}"),
        }
    }
    if let Some(obstacle) = map.get("obstacle") {
        match ObstacleJson::deserialize(obstacle) {
            Ok(o) => messages.push(DeviceMessage::Obstacle {
                id: o.id,
                x: o.x,
                y: o.y,
            }),
            Err(e) => tracing::debug!("ignoring obstacle payload: {e}"),
        }
    }
    if let Some(Value::Bool(true)) = map.get("clear") {
        messages.push(DeviceMessage::ClearMap);
    }
    messages
}
