//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Team assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    pub fn other(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Team::Red => "red",
            Team::Blue => "blue",
        }
    }
}

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Waiting,
    Playing,
    Ended,
}

/// Power-up variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerUpKind {
    Speed,
    Kick,
    Jump,
    Invisible,
    Giant,
}

impl PowerUpKind {
    pub const ALL: [PowerUpKind; 5] = [
        PowerUpKind::Speed,
        PowerUpKind::Kick,
        PowerUpKind::Jump,
        PowerUpKind::Invisible,
        PowerUpKind::Giant,
    ];
}

/// One input record from a client. `tick` is the client's predicted tick and
/// drives server-side dedup; `jump_request_id` is a monotonically increasing
/// counter identifying distinct jump intents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFrame {
    pub tick: u64,
    pub x: f32,
    pub z: f32,
    pub rot_y: f32,
    pub jump_request_id: u32,
}

impl Default for InputFrame {
    fn default() -> Self {
        Self {
            tick: 0,
            x: 0.0,
            z: 0.0,
            rot_y: 0.0,
            jump_request_id: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

/// The inline form of an `input` message: one record's fields sitting next
/// to the type tag. Every field is optional so the batch form (where none of
/// them are present) still deserializes; `as_frame` decides whether a record
/// is actually there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rot_y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jump_request_id: Option<u32>,
}

impl InlineInput {
    /// A record is present iff it carries a tick; missing components fall
    /// back to the neutral input
    pub fn as_frame(&self) -> Option<InputFrame> {
        let tick = self.tick?;
        Some(InputFrame {
            tick,
            x: self.x.unwrap_or(0.0),
            z: self.z.unwrap_or(0.0),
            rot_y: self.rot_y.unwrap_or(0.0),
            jump_request_id: self.jump_request_id.unwrap_or(0),
        })
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// First message on a fresh connection; resolves which match the
    /// session lands in
    Join {
        name: Option<String>,
        team: Option<Team>,
        character: Option<String>,
        map: Option<String>,
        #[serde(default = "default_true")]
        is_public: bool,
        code: Option<String>,
        mode: Option<String>,
    },

    /// Player input; either a batch under `inputs` or a single record inline
    Input {
        #[serde(default)]
        inputs: Vec<InputFrame>,
        #[serde(flatten)]
        single: InlineInput,
    },

    /// Explicit kick; the impulse is client-scaled by kickMult
    Kick {
        impulse_x: f32,
        impulse_y: f32,
        impulse_z: f32,
    },

    /// Change name/team/character
    JoinTeam {
        name: Option<String>,
        team: Option<Team>,
        character: Option<String>,
    },

    /// Chat message (length-capped, throttled)
    Chat { message: String },

    /// Host only; ignored from anyone else
    StartGame,

    /// Host only; ignored from anyone else
    EndGame,

    /// Client-settable visual flags; key must be whitelisted
    UpdateState {
        key: String,
        value: serde_json::Value,
    },

    /// Latency probe; `t` is an optional client timestamp echoed back in
    /// the pong
    Ping {
        #[serde(default)]
        t: Option<u64>,
    },

    /// Leave the match
    Leave,
}

impl ClientMsg {
    /// Collect the input records carried by an `input` message, batch or single
    pub fn input_frames(&self) -> Vec<InputFrame> {
        match self {
            ClientMsg::Input { inputs, single } => {
                if inputs.is_empty() {
                    single.as_frame().into_iter().collect()
                } else {
                    inputs.clone()
                }
            }
            _ => Vec::new(),
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Sent immediately after the socket opens
    Welcome { session_id: Uuid, server_time: u64 },

    /// Private-match code for friend invites (None on public matches)
    RoomCode { code: Option<String> },

    /// A player joined; carries the resolved team so clients observe the
    /// outcome of auto-balance
    PlayerJoined {
        player: PlayerInfo,
        red_count: usize,
        blue_count: usize,
    },

    PlayerLeft { session_id: Uuid, reason: String },

    /// Authoritative state snapshot, sent at the patch rate
    Snapshot {
        tick: u64,
        phase: GamePhase,
        timer: f32,
        red_score: u32,
        blue_score: u32,
        selected_map: String,
        players: Vec<PlayerSnapshot>,
        power_ups: Vec<PowerUpSnapshot>,
        ball: BallSnapshot,
    },

    BallKicked { session_id: Uuid, impulse: WireVec3 },

    BallTouched {
        session_id: Uuid,
        position: WireVec3,
        velocity: WireVec3,
    },

    PowerupCollected {
        session_id: Uuid,
        id: Uuid,
        kind: PowerUpKind,
    },

    GoalScored {
        team: Team,
        scorer: Option<Uuid>,
        assist: Option<Uuid>,
        red_score: u32,
        blue_score: u32,
    },

    GameStarted { tick: u64 },

    /// winner is "red", "blue" or "draw"
    GameOver { winner: String },

    GameReset,

    ChatMessage {
        session_id: Uuid,
        name: String,
        message: String,
    },

    /// Reply to one session's ping; `t` echoes the client timestamp so the
    /// requester can compute RTT without latching onto someone else's pong
    Pong {
        session_id: Uuid,
        server_time: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        t: Option<u64>,
    },

    Error {
        /// The session the error is for; None means match-wide
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<Uuid>,
        code: String,
        message: String,
    },
}

impl ServerMsg {
    /// The single session a message is addressed to, if any. Everything all
    /// players should see returns None; per-session writers drop messages
    /// targeted at somebody else.
    pub fn target_session(&self) -> Option<Uuid> {
        match self {
            ServerMsg::Pong { session_id, .. } => Some(*session_id),
            ServerMsg::Error { session_id, .. } => *session_id,
            _ => None,
        }
    }
}

/// A 3-component vector on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl WireVec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Player identity shared on join
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub session_id: Uuid,
    pub name: String,
    pub team: Team,
    pub character: String,
    pub is_host: bool,
}

/// Per-player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub session_id: Uuid,
    pub name: String,
    pub team: Team,
    pub character: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rot_y: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub jump_count: u8,
    pub invisible: bool,
    pub giant: bool,
    pub speed_mult: f32,
    pub jump_mult: f32,
    pub kick_mult: f32,
    pub goals: u32,
    pub assists: u32,
    pub shots: u32,
    /// Echo of the newest accepted input tick, for client reconciliation
    pub last_received_tick: u64,
}

/// Ball state in a snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallSnapshot {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub qx: f32,
    pub qy: f32,
    pub qz: f32,
    pub qw: f32,
    pub tick: u64,
    pub owner_session_id: Option<Uuid>,
}

/// Power-up on the pitch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerUpSnapshot {
    pub id: Uuid,
    pub kind: PowerUpKind,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_tags_are_kebab_case() {
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"join-team","name":"ada","team":"red","character":"fox"}"#,
        )
        .unwrap();
        match msg {
            ClientMsg::JoinTeam { name, team, .. } => {
                assert_eq!(name.as_deref(), Some("ada"));
                assert_eq!(team, Some(Team::Red));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn input_batch_parses() {
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"input","inputs":[
                {"tick":5,"x":1.0,"z":0.0,"rotY":0.5,"jumpRequestId":2},
                {"tick":6,"x":0.0,"z":-1.0,"rotY":0.5,"jumpRequestId":2}
            ]}"#,
        )
        .unwrap();
        let frames = msg.input_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].tick, 5);
        assert_eq!(frames[1].z, -1.0);
    }

    #[test]
    fn single_input_record_parses_inline() {
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"input","tick":42,"x":0.5,"z":0.5,"rotY":1.0,"jumpRequestId":7}"#,
        )
        .unwrap();
        let frames = msg.input_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].tick, 42);
        assert_eq!(frames[0].jump_request_id, 7);
    }

    #[test]
    fn batch_input_carries_no_inline_record() {
        // the batch form leaves the flattened fields empty; that must not
        // fail deserialization or fabricate a phantom record
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"input","inputs":[{"tick":9,"x":0.0,"z":1.0,"rotY":0.0,"jumpRequestId":0}]}"#,
        )
        .unwrap();
        match &msg {
            ClientMsg::Input { single, .. } => assert_eq!(single.as_frame(), None),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(msg.input_frames().len(), 1);
    }

    #[test]
    fn inline_record_tolerates_missing_components() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"input","tick":3,"x":1.0}"#).unwrap();
        let frames = msg.input_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].x, 1.0);
        assert_eq!(frames[0].z, 0.0);
        assert_eq!(frames[0].jump_request_id, 0);
    }

    #[test]
    fn pong_and_errors_are_session_targeted() {
        let me = Uuid::new_v4();
        let pong = ServerMsg::Pong {
            session_id: me,
            server_time: 123,
            t: Some(99),
        };
        assert_eq!(pong.target_session(), Some(me));

        let private_error = ServerMsg::Error {
            session_id: Some(me),
            code: "match-full".to_string(),
            message: "Match is full".to_string(),
        };
        assert_eq!(private_error.target_session(), Some(me));

        let broadcast = ServerMsg::GameReset;
        assert_eq!(broadcast.target_session(), None);
    }

    #[test]
    fn ping_parses_with_and_without_timestamp() {
        let bare: ClientMsg = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(bare, ClientMsg::Ping { t: None }));

        let stamped: ClientMsg = serde_json::from_str(r#"{"type":"ping","t":456}"#).unwrap();
        assert!(matches!(stamped, ClientMsg::Ping { t: Some(456) }));
    }

    #[test]
    fn join_defaults_to_public() {
        let msg: ClientMsg = serde_json::from_str(r#"{"type":"join","name":"bob"}"#).unwrap();
        match msg {
            ClientMsg::Join { is_public, code, .. } => {
                assert!(is_public);
                assert!(code.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn server_msg_fields_are_camel_case() {
        let json = serde_json::to_string(&ServerMsg::GoalScored {
            team: Team::Blue,
            scorer: None,
            assist: None,
            red_score: 1,
            blue_score: 2,
        })
        .unwrap();
        assert!(json.contains(r#""type":"goal-scored""#));
        assert!(json.contains(r#""redScore":1"#));
        assert!(json.contains(r#""team":"blue""#));
    }

    #[test]
    fn unit_messages_roundtrip() {
        for raw in [r#"{"type":"ping"}"#, r#"{"type":"start-game"}"#, r#"{"type":"leave"}"#] {
            let parsed: Result<ClientMsg, _> = serde_json::from_str(raw);
            assert!(parsed.is_ok(), "failed to parse {raw}");
        }
    }
}
