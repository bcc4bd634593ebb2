//! Wire protocol shared by the tally device app and tallyctl.
//!
//! The two processes talk over a Unix domain socket carrying
//! newline-delimited JSON. Receivers discriminate messages by shape,
//! so the envelope is an untagged enum: variant order matters.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Asks the publisher to republish every stored key unconditionally.
pub const HARD_RESYNC: &str = "hard_resync";
/// Asks the publisher to republish only if it has undelivered changes.
pub const SOFT_RESYNC: &str = "soft_resync";

pub const SOCKET_PATH: &str = "/tmp/tally.sock";

pub const INIT_PROJ_ID: u32 = 0;
pub const INIT_PROJ_NAME: &str = "My Project";
pub const INIT_REPEAT_LEN: u32 = 10;
pub const DEFAULT_IS_DARK_MODE: bool = true;

/// Colour tokens a project may carry. Opaque to the sync core; the
/// device UI maps them onto its theme.
pub const PALETTE: &[&str] = &[
    "cyan", "blue", "magenta", "red", "green", "yellow", "gray",
];
pub const DEFAULT_COLOUR: &str = "cyan";

/// One project's configuration, as edited on the companion side.
/// Runtime counters are deliberately absent: they live only on the
/// device and are never overwritten by a settings push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub id: u32,
    pub name: String,
    pub repeat_length: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_goal: Option<u32>,
    pub colour: String,
}

impl ProjectConfig {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            repeat_length: INIT_REPEAT_LEN,
            repeat_goal: None,
            colour: DEFAULT_COLOUR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeFormat {
    pub show_time: bool,
    pub show_seconds: bool,
    #[serde(rename = "is24hourTime")]
    pub is_24hour_time: bool,
}

impl Default for TimeFormat {
    fn default() -> Self {
        Self {
            show_time: true,
            show_seconds: false,
            is_24hour_time: false,
        }
    }
}

/// A single key/value settings push. Values are themselves serialized
/// strings, mirroring how the editor's store holds them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingMessage {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    ResetCounters,
}

/// An operation addressed to one project on the device. Sent
/// fire-and-forget; the editor has no authority over counters and
/// never waits for an acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectOperation {
    pub proj_id: u32,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<u32>,
}

impl ProjectOperation {
    pub fn reset(proj_id: u32) -> Self {
        Self {
            proj_id,
            operation: Operation::ResetCounters,
            data: None,
        }
    }

    /// The value counters are reset to. Absent `data` means zero.
    pub fn reset_value(&self) -> u32 {
        self.data.unwrap_or(0)
    }
}

/// Everything that can travel over the channel. Untagged: a settings
/// message is anything with `key` + `value`, a project operation has
/// `projId` + `operation`, and a bare string is a control token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Setting(SettingMessage),
    Operation(ProjectOperation),
    Control(String),
}

impl Envelope {
    pub fn setting(key: impl Into<String>, value: impl Into<String>) -> Self {
        Envelope::Setting(SettingMessage {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn soft_resync() -> Self {
        Envelope::Control(SOFT_RESYNC.to_string())
    }

    pub fn hard_resync() -> Self {
        Envelope::Control(HARD_RESYNC.to_string())
    }
}

/// The `projects` settings value: an ordered list of id/config pairs.
pub fn encode_projects(projects: &[(u32, ProjectConfig)]) -> Result<String, IpcError> {
    Ok(serde_json::to_string(projects)?)
}

pub fn decode_projects(s: &str) -> Result<Vec<(u32, ProjectConfig)>, IpcError> {
    Ok(serde_json::from_str(s)?)
}

pub fn decode_line(line: &str) -> Result<Envelope, IpcError> {
    Ok(serde_json::from_str(line)?)
}

pub async fn write_line<W>(writer: &mut W, envelope: &Envelope) -> Result<(), IpcError>
where
    W: AsyncWriteExt + Unpin,
{
    let mut buf = serde_json::to_vec(envelope)?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    Ok(())
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection refused - is tally running?")]
    ConnectionRefused,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_discriminates_by_shape() {
        let setting = decode_line(r#"{"key":"isDarkMode","value":"true"}"#).unwrap();
        assert_eq!(setting, Envelope::setting("isDarkMode", "true"));

        let op = decode_line(r#"{"projId":3,"operation":"ResetCounters"}"#).unwrap();
        match op {
            Envelope::Operation(op) => {
                assert_eq!(op.proj_id, 3);
                assert_eq!(op.operation, Operation::ResetCounters);
                assert_eq!(op.reset_value(), 0);
            }
            other => panic!("expected operation, got {other:?}"),
        }

        let control = decode_line(r#""soft_resync""#).unwrap();
        assert_eq!(control, Envelope::Control(SOFT_RESYNC.to_string()));
    }

    #[test]
    fn operation_data_overrides_reset_value() {
        let op = decode_line(r#"{"projId":1,"operation":"ResetCounters","data":5}"#).unwrap();
        match op {
            Envelope::Operation(op) => assert_eq!(op.reset_value(), 5),
            other => panic!("expected operation, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_line("not json at all").is_err());
        // An object matching no shape must not sneak in as anything.
        assert!(decode_line(r#"{"who":"knows"}"#).is_err());
    }

    #[test]
    fn project_config_uses_camel_case_on_the_wire() {
        let cfg = ProjectConfig {
            id: 1,
            name: "B".to_string(),
            repeat_length: 5,
            repeat_goal: Some(2),
            colour: "green".to_string(),
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"repeatLength\":5"));
        assert!(json.contains("\"repeatGoal\":2"));
    }

    #[test]
    fn projects_list_round_trips_as_pairs() {
        let list = vec![
            (0, ProjectConfig::new(0, "A")),
            (4, ProjectConfig::new(4, "B")),
        ];
        let encoded = encode_projects(&list).unwrap();
        assert!(encoded.starts_with("[[0,"));
        assert_eq!(decode_projects(&encoded).unwrap(), list);
    }

    #[test]
    fn absent_repeat_goal_stays_off_the_wire() {
        let cfg = ProjectConfig::new(0, "A");
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("repeatGoal"));
        let back: ProjectConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.repeat_goal, None);
    }
}
