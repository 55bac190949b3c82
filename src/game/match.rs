//! Match state, the authoritative tick loop, and the process-wide registry

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rapier3d::prelude::{vector, RigidBodyHandle};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::util::codes::{
    generate_code, JOIN_CODE_FALLBACK_LEN, JOIN_CODE_LEN, JOIN_CODE_MAX_ATTEMPTS,
};
use crate::util::time::{
    tick_delta, unix_millis, SIMULATION_TPS, SNAPSHOT_TPS, TICK_DURATION_MICROS,
};
use crate::ws::protocol::{
    BallSnapshot, ClientMsg, GamePhase, PlayerInfo, PowerUpKind, ServerMsg, Team, WireVec3,
};

use super::boundary;
use super::contact::{self, ContactResponse};
use super::goal::{self, TouchHistory};
use super::input;
use super::player::{spawn_for, PlayerState};
use super::powerup::{PowerUp, PowerUpService};
use super::snapshot::SnapshotBuilder;
use super::tuning::{
    BALL_SPAWN, CHAT_MAX_LEN, EMPTY_DISPOSE_DELAY_MS, END_GAME_GRACE_MS, GIANT_BALL_CLEARANCE,
    GIANT_BALL_TELEPORT_DIST, GIANT_RADIUS, GOAL_RESET_DELAY_MS, JUMP_MULT_ACTIVE,
    KICK_MULT_ACTIVE, MATCH_TIMER_START, MAX_ANG_VEL, MAX_CLIENTS, PLAYER_RADIUS, TEAM_CAP,
};
use super::world::ArenaWorld;
use super::PlayerInput;

/// Cached ball state mirrored out of the physics world once per tick
#[derive(Debug, Clone, Copy)]
pub struct BallState {
    pub body: RigidBodyHandle,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub quat: [f32; 4],
    pub tick: u64,
    pub owner_session_id: Option<Uuid>,
}

impl BallState {
    fn new(body: RigidBodyHandle) -> Self {
        Self {
            body,
            x: BALL_SPAWN[0],
            y: BALL_SPAWN[1],
            z: BALL_SPAWN[2],
            vx: 0.0,
            vy: 0.0,
            vz: 0.0,
            quat: [0.0, 0.0, 0.0, 1.0],
            tick: 0,
            owner_session_id: None,
        }
    }

    fn snapshot(&self) -> BallSnapshot {
        BallSnapshot {
            x: self.x,
            y: self.y,
            z: self.z,
            vx: self.vx,
            vy: self.vy,
            vz: self.vz,
            qx: self.quat[0],
            qy: self.quat[1],
            qz: self.quat[2],
            qw: self.quat[3],
            tick: self.tick,
            owner_session_id: self.owner_session_id,
        }
    }
}

/// Pick a team for a joiner: the desired team while it has room, the other
/// team if not, first-available otherwise.
pub fn choose_team(desired: Option<Team>, red_count: usize, blue_count: usize) -> Option<Team> {
    let count = |team: Team| match team {
        Team::Red => red_count,
        Team::Blue => blue_count,
    };
    match desired {
        Some(team) if count(team) < TEAM_CAP => Some(team),
        Some(team) if count(team.other()) < TEAM_CAP => Some(team.other()),
        Some(_) => None,
        None => {
            if red_count <= blue_count && red_count < TEAM_CAP {
                Some(Team::Red)
            } else if blue_count < TEAM_CAP {
                Some(Team::Blue)
            } else {
                None
            }
        }
    }
}

/// Match state (owned by the match task)
pub struct MatchState {
    pub id: Uuid,
    pub join_code: Option<String>,
    pub is_public: bool,
    pub map: String,

    pub phase: GamePhase,
    pub tick: u64,
    pub timer: f32,
    pub red_score: u32,
    pub blue_score: u32,

    pub world: ArenaWorld,
    pub players: HashMap<Uuid, PlayerState>,
    /// Session ids in join order; the first entry is the host
    pub join_order: Vec<Uuid>,
    pub ball: BallState,
    pub power_ups: PowerUpService,
    pub touch: TouchHistory,

    pub last_goal_ms: u64,
    pub pending_reset_ms: Option<u64>,
    pub empty_since_ms: Option<u64>,
    pub host_ended_ms: Option<u64>,

    pub rng: ChaCha8Rng,
    pub created_at: u64,
}

impl MatchState {
    fn new(id: Uuid, join_code: Option<String>, is_public: bool, map: String, seed: u64) -> Self {
        let mut world = ArenaWorld::new();
        let ball_body = world.spawn_ball();
        Self {
            id,
            join_code,
            is_public,
            map,
            phase: GamePhase::Waiting,
            tick: 0,
            timer: MATCH_TIMER_START,
            red_score: 0,
            blue_score: 0,
            world,
            players: HashMap::new(),
            join_order: Vec::new(),
            ball: BallState::new(ball_body),
            power_ups: PowerUpService::new(),
            touch: TouchHistory::default(),
            last_goal_ms: 0,
            pending_reset_ms: None,
            empty_since_ms: None,
            host_ended_ms: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            created_at: unix_millis(),
        }
    }

    fn host(&self) -> Option<Uuid> {
        self.join_order.first().copied()
    }

    fn team_counts(&self) -> (usize, usize) {
        let red = self.players.values().filter(|p| p.team == Team::Red).count();
        (red, self.players.len() - red)
    }
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub join_code: Option<String>,
    pub is_public: bool,
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub event_tx: broadcast::Sender<ServerMsg>,
    pub player_count: Arc<std::sync::atomic::AtomicUsize>,
}

impl MatchHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// The authoritative soccer match
pub struct SoccerMatch {
    state: MatchState,
    input_rx: mpsc::Receiver<PlayerInput>,
    event_tx: broadcast::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
    player_count: Arc<std::sync::atomic::AtomicUsize>,
}

impl SoccerMatch {
    pub fn new(
        id: Uuid,
        join_code: Option<String>,
        is_public: bool,
        map: String,
        seed: u64,
    ) -> (Self, MatchHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(256);
        let player_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let handle = MatchHandle {
            id,
            join_code: join_code.clone(),
            is_public,
            input_tx,
            event_tx: event_tx.clone(),
            player_count: player_count.clone(),
        };

        let soccer_match = Self {
            state: MatchState::new(id, join_code, is_public, map, seed),
            input_rx,
            event_tx,
            snapshot_builder: SnapshotBuilder::new(SIMULATION_TPS / SNAPSHOT_TPS),
            player_count,
        };

        (soccer_match, handle)
    }

    /// Run the authoritative tick loop until the match disposes itself
    pub async fn run(mut self) {
        info!(match_id = %self.state.id, public = self.state.is_public, "Match started");

        let tick_duration = Duration::from_micros(TICK_DURATION_MICROS);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            self.process_inputs();

            // A panicking step corrupts only this match: log, tell the
            // clients, and dispose
            let stepped = catch_unwind(AssertUnwindSafe(|| self.step()));
            if stepped.is_err() {
                error!(match_id = %self.state.id, "Sim step panicked, disposing match");
                let _ = self.event_tx.send(ServerMsg::GameOver {
                    winner: "draw".to_string(),
                });
                break;
            }

            if self.snapshot_builder.should_send() {
                let snapshot = self.snapshot_builder.build(
                    self.state.tick,
                    self.state.phase,
                    self.state.timer,
                    self.state.red_score,
                    self.state.blue_score,
                    &self.state.map,
                    self.state.players.values(),
                    self.state.power_ups.items(),
                    self.state.ball.snapshot(),
                );
                let _ = self.event_tx.send(snapshot);
            }

            if self.should_dispose() {
                break;
            }
        }

        let lifetime_secs = unix_millis().saturating_sub(self.state.created_at) / 1000;
        info!(match_id = %self.state.id, lifetime_secs, "Match disposed");
    }

    /// Empty-match and host-ended dispose deadlines
    fn should_dispose(&mut self) -> bool {
        let now = unix_millis();

        if self.state.players.is_empty() {
            match self.state.empty_since_ms {
                None => self.state.empty_since_ms = Some(now),
                Some(since) if now.saturating_sub(since) >= EMPTY_DISPOSE_DELAY_MS => {
                    info!(match_id = %self.state.id, "Empty match timed out");
                    return true;
                }
                Some(_) => {}
            }
        } else {
            self.state.empty_since_ms = None;
        }

        if let Some(ended) = self.state.host_ended_ms {
            if now.saturating_sub(ended) >= END_GAME_GRACE_MS {
                info!(match_id = %self.state.id, "Host ended match");
                return true;
            }
        }

        false
    }

    /// Drain and dispatch everything queued on the input channel
    fn process_inputs(&mut self) {
        while let Ok(input) = self.input_rx.try_recv() {
            self.handle_message(input.session_id, input.msg);
        }
    }

    /// Per-message handlers recover locally; nothing here can take the
    /// match down
    pub fn handle_message(&mut self, session_id: Uuid, msg: ClientMsg) {
        match msg {
            ClientMsg::Join {
                name,
                team,
                character,
                ..
            } => self.handle_join(session_id, name, team, character),
            msg @ ClientMsg::Input { .. } => {
                let frames = msg.input_frames();
                if let Some(player) = self.state.players.get_mut(&session_id) {
                    input::enqueue(player, frames);
                }
            }
            ClientMsg::Kick {
                impulse_x,
                impulse_y,
                impulse_z,
            } => self.handle_kick(session_id, impulse_x, impulse_y, impulse_z),
            ClientMsg::JoinTeam {
                name,
                team,
                character,
            } => self.handle_join_team(session_id, name, team, character),
            ClientMsg::Chat { message } => self.handle_chat(session_id, message),
            ClientMsg::StartGame => self.handle_start_game(session_id),
            ClientMsg::EndGame => self.handle_end_game(session_id),
            ClientMsg::UpdateState { key, value } => {
                self.handle_update_state(session_id, key, value)
            }
            ClientMsg::Ping { t } => {
                let _ = self.event_tx.send(ServerMsg::Pong {
                    session_id,
                    server_time: unix_millis(),
                    t,
                });
            }
            ClientMsg::Leave => self.handle_leave(session_id, "left"),
        }
    }

    fn handle_join(
        &mut self,
        session_id: Uuid,
        name: Option<String>,
        desired_team: Option<Team>,
        character: Option<String>,
    ) {
        if self.state.players.contains_key(&session_id) {
            warn!(session_id = %session_id, "Session already in match");
            return;
        }
        if self.state.players.len() >= MAX_CLIENTS {
            let _ = self.event_tx.send(ServerMsg::Error {
                session_id: Some(session_id),
                code: "match-full".to_string(),
                message: "Match is full".to_string(),
            });
            return;
        }

        let (red_count, blue_count) = self.state.team_counts();
        let Some(team) = choose_team(desired_team, red_count, blue_count) else {
            let _ = self.event_tx.send(ServerMsg::Error {
                session_id: Some(session_id),
                code: "match-full".to_string(),
                message: "No team slot available".to_string(),
            });
            return;
        };

        let name =
            name.unwrap_or_else(|| format!("Player_{}", &session_id.to_string()[..8]));
        let character = character.unwrap_or_else(|| "default".to_string());

        let (body, collider) = self.state.world.spawn_player(spawn_for(team));
        let player = PlayerState::new(
            session_id,
            name,
            team,
            character,
            body,
            collider,
            unix_millis(),
        );

        self.state.players.insert(session_id, player);
        self.state.join_order.push(session_id);
        self.state.empty_since_ms = None;
        self.player_count
            .store(self.state.players.len(), std::sync::atomic::Ordering::Relaxed);

        let _ = self.event_tx.send(ServerMsg::RoomCode {
            code: self.state.join_code.clone(),
        });

        let (red_count, blue_count) = self.state.team_counts();
        let player = &self.state.players[&session_id];
        let _ = self.event_tx.send(ServerMsg::PlayerJoined {
            player: PlayerInfo {
                session_id,
                name: player.name.clone(),
                team: player.team,
                character: player.character.clone(),
                is_host: self.state.host() == Some(session_id),
            },
            red_count,
            blue_count,
        });

        info!(
            match_id = %self.state.id,
            session_id = %session_id,
            team = player.team.as_str(),
            player_count = self.state.players.len(),
            "Player joined match"
        );
    }

    fn handle_join_team(
        &mut self,
        session_id: Uuid,
        name: Option<String>,
        team: Option<Team>,
        character: Option<String>,
    ) {
        let (red_count, blue_count) = self.state.team_counts();
        let Some(player) = self.state.players.get_mut(&session_id) else {
            return;
        };
        if let Some(name) = name {
            if !name.is_empty() {
                player.name = name;
            }
        }
        if let Some(character) = character {
            player.character = character;
        }
        if let Some(target) = team {
            if target != player.team {
                let target_count = match target {
                    Team::Red => red_count,
                    Team::Blue => blue_count,
                };
                if target_count < TEAM_CAP {
                    player.team = target;
                    player.reset_to_spawn();
                    let pos = vector![player.x, player.y, player.z];
                    let body = player.body;
                    self.state.world.set_translation(body, pos);
                }
            }
        }
    }

    fn handle_leave(&mut self, session_id: Uuid, reason: &str) {
        let Some(player) = self.state.players.remove(&session_id) else {
            return;
        };
        self.state.world.remove_body(player.body);
        self.state.join_order.retain(|id| *id != session_id);
        self.player_count
            .store(self.state.players.len(), std::sync::atomic::Ordering::Relaxed);

        if self.state.ball.owner_session_id == Some(session_id) {
            self.state.ball.owner_session_id = None;
        }

        let _ = self.event_tx.send(ServerMsg::PlayerLeft {
            session_id,
            reason: reason.to_string(),
        });

        info!(
            match_id = %self.state.id,
            session_id = %session_id,
            reason = reason,
            "Player left match"
        );
    }

    fn handle_kick(&mut self, session_id: Uuid, ix: f32, iy: f32, iz: f32) {
        let ball_body = self.state.ball.body;
        let Some(ball_pos) = self.state.world.translation(ball_body) else {
            return;
        };
        let Some(player) = self.state.players.get_mut(&session_id) else {
            return;
        };
        if !contact::in_kick_range(player, ball_pos) {
            return;
        }
        let Some(impulse) = contact::shape_kick_impulse(ix, iy, iz) else {
            return;
        };

        player.shots += 1;
        self.state.world.apply_impulse(ball_body, impulse);
        self.state.touch.record(session_id);
        self.state.ball.owner_session_id = Some(session_id);

        let _ = self.event_tx.send(ServerMsg::BallKicked {
            session_id,
            impulse: WireVec3::new(impulse.x, impulse.y, impulse.z),
        });
    }

    fn handle_chat(&mut self, session_id: Uuid, message: String) {
        if message.is_empty() || message.len() > CHAT_MAX_LEN {
            return;
        }
        let Some(player) = self.state.players.get(&session_id) else {
            return;
        };
        let _ = self.event_tx.send(ServerMsg::ChatMessage {
            session_id,
            name: player.name.clone(),
            message,
        });
    }

    fn handle_start_game(&mut self, session_id: Uuid) {
        if self.state.host() != Some(session_id) {
            debug!(session_id = %session_id, "start-game from non-host ignored");
            return;
        }
        if self.state.phase == GamePhase::Playing {
            return;
        }

        self.state.phase = GamePhase::Playing;
        self.state.timer = MATCH_TIMER_START;
        self.state.red_score = 0;
        self.state.blue_score = 0;
        self.state.last_goal_ms = 0;
        self.state.pending_reset_ms = None;
        self.state.host_ended_ms = None;
        for player in self.state.players.values_mut() {
            player.goals = 0;
            player.assists = 0;
            player.shots = 0;
        }
        self.reset_positions();

        let _ = self.event_tx.send(ServerMsg::GameStarted {
            tick: self.state.tick,
        });
        self.snapshot_builder.force_next();
        info!(match_id = %self.state.id, "Game started");
    }

    fn handle_end_game(&mut self, session_id: Uuid) {
        if self.state.host() != Some(session_id) {
            debug!(session_id = %session_id, "end-game from non-host ignored");
            return;
        }
        if self.state.phase != GamePhase::Playing {
            return;
        }
        self.finish_game();
        // host-ended matches linger briefly so clients see the final board,
        // then dispose
        self.state.host_ended_ms = Some(unix_millis());
    }

    fn handle_update_state(&mut self, session_id: Uuid, key: String, value: serde_json::Value) {
        let Some(player) = self.state.players.get_mut(&session_id) else {
            return;
        };
        let Some(flag) = value.as_bool() else {
            debug!(session_id = %session_id, key = %key, "update-state with non-bool value dropped");
            return;
        };
        match key.as_str() {
            "invisible" => player.invisible = flag,
            "giant" => player.giant = flag,
            _ => {
                debug!(session_id = %session_id, key = %key, "update-state key not whitelisted");
            }
        }
    }

    /// Broadcast game-over with the winner by score and freeze the phase
    fn finish_game(&mut self) {
        let winner = match self.state.red_score.cmp(&self.state.blue_score) {
            std::cmp::Ordering::Greater => "red",
            std::cmp::Ordering::Less => "blue",
            std::cmp::Ordering::Equal => "draw",
        };
        self.state.phase = GamePhase::Ended;
        let _ = self.event_tx.send(ServerMsg::GameOver {
            winner: winner.to_string(),
        });
        self.snapshot_builder.force_next();
        info!(match_id = %self.state.id, winner = winner, "Game over");
    }

    /// Canonical reset: ball at center, teams on their spawn marks
    fn reset_positions(&mut self) {
        let ball_body = self.state.ball.body;
        self.state.world.reset_ball(ball_body);
        self.state.ball = BallState::new(ball_body);
        self.state.touch.clear();

        let ids: Vec<Uuid> = self.state.join_order.clone();
        for id in ids {
            let Some(player) = self.state.players.get_mut(&id) else {
                continue;
            };
            player.reset_to_spawn();
            player.input_queue.clear();
            let body = player.body;
            let pos = vector![player.x, player.y, player.z];
            self.state.world.set_translation(body, pos);
            self.state.world.set_next_kinematic_translation(body, pos);
        }
    }

    /// One fixed-timestep simulation step. The component order is load-
    /// bearing: inputs → player integration → physics → contacts →
    /// boundary → goal → ball copy.
    pub fn step(&mut self) {
        self.state.tick += 1;
        let tick = self.state.tick;
        let dt = tick_delta();
        let now = unix_millis();

        // countdown only runs while playing
        if self.state.phase == GamePhase::Playing {
            self.state.timer = (self.state.timer - dt).max(0.0);
            if self.state.timer == 0.0 {
                self.finish_game();
            }
        }

        // post-goal reset grace
        if let Some(reset_at) = self.state.pending_reset_ms {
            if now >= reset_at {
                self.state.pending_reset_ms = None;
                self.reset_positions();
                let _ = self.event_tx.send(ServerMsg::GameReset);
                self.snapshot_builder.force_next();
            }
        }

        let ids: Vec<Uuid> = self.state.join_order.clone();

        // input consumption + kinematic integration + pickups
        for id in &ids {
            self.step_player(*id, tick, dt);
        }

        // power-up spawn/despawn cadence
        let (spawned, expired) = self.state.power_ups.tick(tick, &mut self.state.rng);
        if let Some(item) = &spawned {
            debug!(match_id = %self.state.id, kind = ?item.kind, "Power-up spawned");
        }
        for id in expired {
            debug!(match_id = %self.state.id, powerup_id = %id, "Power-up despawned");
        }

        self.state.world.step();

        // custom player↔ball contact model
        for id in &ids {
            self.resolve_contact(*id);
        }

        self.enforce_ball_boundary();

        if self.state.phase == GamePhase::Playing && self.state.pending_reset_ms.is_none() {
            let ball_pos = vector![self.state.ball.x, self.state.ball.y, self.state.ball.z];
            let ball_body = self.state.ball.body;
            let live_pos = self.state.world.translation(ball_body).unwrap_or(ball_pos);
            if let Some(team) = goal::detect_goal(live_pos, self.state.last_goal_ms, now) {
                self.award_goal(team, now);
            }
        }

        self.copy_ball_state(tick);
    }

    /// Steps 2–3 of the tick for one player: consume one input record,
    /// integrate, commit the kinematic pose, check power-up pickup
    fn step_player(&mut self, id: Uuid, tick: u64, dt: f32) {
        let Some(player) = self.state.players.get_mut(&id) else {
            return;
        };

        // effect bookkeeping first so multipliers apply to this tick
        let expired = player.effects.advance(tick);
        player.speed_mult = player.effects.speed_mult(tick);
        player.jump_mult = if player.effects.jump_active() {
            JUMP_MULT_ACTIVE
        } else {
            1.0
        };
        player.kick_mult = if player.effects.kick_active() {
            KICK_MULT_ACTIVE
        } else {
            1.0
        };
        if expired.invisible {
            player.invisible = false;
        }
        if expired.giant {
            player.giant = false;
            let body = player.body;
            let old = player.collider;
            let new = self
                .state
                .world
                .swap_player_collider(body, old, PLAYER_RADIUS);
            if let Some(player) = self.state.players.get_mut(&id) {
                player.collider = new;
            }
        }

        let Some(player) = self.state.players.get_mut(&id) else {
            return;
        };
        let frame = input::next_frame(player);
        player.integrate(&frame, dt);

        let body = player.body;
        let pos = vector![player.x, player.y, player.z];
        let (px, pz) = (player.x, player.z);
        self.state.world.set_next_kinematic_translation(body, pos);

        if let Some(item) = self.state.power_ups.try_collect(px, pz) {
            self.apply_powerup(id, item, tick);
        }
    }

    fn apply_powerup(&mut self, session_id: Uuid, item: PowerUp, tick: u64) {
        let Some(player) = self.state.players.get_mut(&session_id) else {
            return;
        };
        let was_giant = player.effects.giant_active();
        player.effects.apply(item.kind, tick);

        match item.kind {
            PowerUpKind::Invisible => player.invisible = true,
            PowerUpKind::Giant => {
                player.giant = true;
                if !was_giant {
                    let body = player.body;
                    let old = player.collider;
                    let (px, py, pz) = (player.x, player.y, player.z);
                    let new = self
                        .state
                        .world
                        .swap_player_collider(body, old, GIANT_RADIUS);
                    if let Some(player) = self.state.players.get_mut(&session_id) {
                        player.collider = new;
                    }
                    self.clear_ball_from_giant(px, py, pz);
                }
            }
            _ => {}
        }

        let _ = self.event_tx.send(ServerMsg::PowerupCollected {
            session_id,
            id: item.id,
            kind: item.kind,
        });
        debug!(
            match_id = %self.state.id,
            session_id = %session_id,
            kind = ?item.kind,
            "Power-up collected"
        );
    }

    /// A freshly enlarged collider must not crush or swallow the ball:
    /// relocate it just outside the giant radius with a nudge
    fn clear_ball_from_giant(&mut self, px: f32, py: f32, pz: f32) {
        let ball_body = self.state.ball.body;
        let Some(ball_pos) = self.state.world.translation(ball_body) else {
            return;
        };
        let d = ball_pos - vector![px, py, pz];
        if d.norm() >= GIANT_BALL_CLEARANCE {
            return;
        }
        let dir = {
            let horiz = vector![d.x, 0.0, d.z];
            if horiz.norm() > 1e-3 {
                horiz.normalize()
            } else {
                vector![1.0, 0.0, 0.0]
            }
        };
        let new_pos = vector![
            px + dir.x * GIANT_BALL_TELEPORT_DIST,
            ball_pos.y.max(1.0),
            pz + dir.z * GIANT_BALL_TELEPORT_DIST
        ];
        self.state.world.set_translation(ball_body, new_pos);
        self.state.world.apply_impulse(ball_body, dir * 2.0);
    }

    /// Step 5: the custom contact model for one player
    fn resolve_contact(&mut self, id: Uuid) {
        let ball_body = self.state.ball.body;
        let (Some(ball_pos), Some(ball_vel)) = (
            self.state.world.translation(ball_body),
            self.state.world.linvel(ball_body),
        ) else {
            return;
        };
        let Some(player) = self.state.players.get(&id) else {
            return;
        };

        match contact::resolve_player_ball(player, ball_pos, ball_vel) {
            Some(ContactResponse::Stabilize { velocity, position }) => {
                self.state.world.set_linvel(ball_body, velocity);
                self.state.world.set_translation(ball_body, position);
                self.state.ball.owner_session_id = Some(id);
            }
            Some(ContactResponse::Impulse { impulse }) => {
                self.state.world.apply_impulse(ball_body, impulse);
                self.state.touch.record(id);
                self.state.ball.owner_session_id = Some(id);

                let vel = self.state.world.linvel(ball_body).unwrap_or(ball_vel);
                let _ = self.event_tx.send(ServerMsg::BallTouched {
                    session_id: id,
                    position: WireVec3::new(ball_pos.x, ball_pos.y, ball_pos.z),
                    velocity: WireVec3::new(vel.x, vel.y, vel.z),
                });
            }
            None => {}
        }
    }

    /// Step 6: clamp the ball into the legal envelope
    fn enforce_ball_boundary(&mut self) {
        let ball_body = self.state.ball.body;
        let (Some(mut pos), Some(mut vel)) = (
            self.state.world.translation(ball_body),
            self.state.world.linvel(ball_body),
        ) else {
            return;
        };
        if boundary::enforce(&mut pos, &mut vel) {
            self.state.world.set_translation(ball_body, pos);
            self.state.world.set_linvel(ball_body, vel);
        }
    }

    /// Step 7 follow-through: scores, attribution, events, reset grace
    fn award_goal(&mut self, team: Team, now: u64) {
        self.state.last_goal_ms = now;
        match team {
            Team::Red => self.state.red_score += 1,
            Team::Blue => self.state.blue_score += 1,
        }

        let scorer = self.state.touch.last.and_then(|id| {
            self.state.players.get(&id).map(|p| (id, p.team))
        });
        let second = self.state.touch.second_last.and_then(|id| {
            self.state.players.get(&id).map(|p| (id, p.team))
        });
        let assist = goal::assist_for(scorer, second);

        if let Some((scorer_id, _)) = scorer {
            if let Some(player) = self.state.players.get_mut(&scorer_id) {
                player.goals += 1;
            }
        }
        if let Some(assist_id) = assist {
            if let Some(player) = self.state.players.get_mut(&assist_id) {
                player.assists += 1;
            }
        }

        let _ = self.event_tx.send(ServerMsg::GoalScored {
            team,
            scorer: scorer.map(|(id, _)| id),
            assist,
            red_score: self.state.red_score,
            blue_score: self.state.blue_score,
        });
        self.snapshot_builder.force_next();
        self.state.pending_reset_ms = Some(now + GOAL_RESET_DELAY_MS);

        info!(
            match_id = %self.state.id,
            team = team.as_str(),
            red = self.state.red_score,
            blue = self.state.blue_score,
            "Goal scored"
        );
    }

    /// Step 8: mirror ball pose into the snapshot cache and clamp spin
    fn copy_ball_state(&mut self, tick: u64) {
        let ball_body = self.state.ball.body;
        if let Some(ang) = self.state.world.angvel(ball_body) {
            let speed = ang.norm();
            if speed > MAX_ANG_VEL {
                self.state
                    .world
                    .set_angvel(ball_body, ang * (MAX_ANG_VEL / speed));
            }
        }
        if let (Some(pos), Some(vel), Some(quat)) = (
            self.state.world.translation(ball_body),
            self.state.world.linvel(ball_body),
            self.state.world.rotation(ball_body),
        ) {
            self.state.ball.x = pos.x;
            self.state.ball.y = pos.y;
            self.state.ball.z = pos.z;
            self.state.ball.vx = vel.x;
            self.state.ball.vy = vel.y;
            self.state.ball.vz = vel.z;
            self.state.ball.quat = quat;
            self.state.ball.tick = tick;
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    #[cfg(test)]
    pub fn state_mut(&mut self) -> &mut MatchState {
        &mut self.state
    }
}

/// Registry of all active matches plus the private-code table
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
    codes: DashMap<String, Uuid>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
            codes: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|entry| entry.value().clone())
    }

    pub fn resolve_code(&self, code: &str) -> Option<MatchHandle> {
        let id = *self.codes.get(code)?;
        self.get(&id)
    }

    /// Find a public match with a free slot
    pub fn find_public(&self) -> Option<MatchHandle> {
        self.matches
            .iter()
            .map(|entry| entry.value().clone())
            .find(|handle| handle.is_public && handle.player_count() < MAX_CLIENTS)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches
            .iter()
            .map(|entry| entry.value().player_count())
            .sum()
    }

    /// Pick a join code: a sanitized client-requested one if free, otherwise
    /// a fresh unique one (with a longer fallback if the short space is
    /// saturated)
    fn allocate_code(&self, requested: Option<String>) -> String {
        if let Some(code) = requested {
            if !self.codes.contains_key(&code) {
                return code;
            }
        }
        let mut rng = rand::thread_rng();
        for _ in 0..JOIN_CODE_MAX_ATTEMPTS {
            let code = generate_code(&mut rng, JOIN_CODE_LEN);
            if !self.codes.contains_key(&code) {
                return code;
            }
        }
        generate_code(&mut rng, JOIN_CODE_FALLBACK_LEN)
    }

    /// Create a match, register it, and spawn its task. The task unregisters
    /// the match (and its code) when it ends.
    pub fn create_match(
        self: &Arc<Self>,
        requested_code: Option<String>,
        is_public: bool,
        map: String,
    ) -> MatchHandle {
        let id = Uuid::new_v4();
        let join_code = if is_public {
            None
        } else {
            Some(self.allocate_code(requested_code))
        };
        let seed = rand::thread_rng().gen::<u64>();

        let (soccer_match, handle) = SoccerMatch::new(id, join_code.clone(), is_public, map, seed);

        self.matches.insert(id, handle.clone());
        if let Some(code) = &join_code {
            self.codes.insert(code.clone(), id);
        }

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            soccer_match.run().await;
            registry.matches.remove(&id);
            if let Some(code) = join_code {
                registry.codes.remove(&code);
            }
            info!(match_id = %id, "Match removed from registry");
        });

        handle
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::tuning::{
        GOAL_COOLDOWN_MS, GOAL_LINE_X, GROUND_Y, JUMP_FORCE, BALL_RADIUS,
    };
    use crate::ws::protocol::{InlineInput, InputFrame};

    fn test_match() -> SoccerMatch {
        let (soccer_match, _handle) =
            SoccerMatch::new(Uuid::new_v4(), None, true, "stadium".to_string(), 42);
        soccer_match
    }

    fn join(m: &mut SoccerMatch, team: Option<Team>) -> Uuid {
        let session_id = Uuid::new_v4();
        m.handle_message(
            session_id,
            ClientMsg::Join {
                name: None,
                team,
                character: None,
                map: None,
                is_public: true,
                code: None,
                mode: None,
            },
        );
        session_id
    }

    #[test]
    fn choose_team_prefers_desired_then_balances() {
        // lone join gets the desired team
        assert_eq!(choose_team(Some(Team::Red), 0, 0), Some(Team::Red));
        // desired full, other open: auto-balance flips the choice
        assert_eq!(choose_team(Some(Team::Red), 2, 0), Some(Team::Blue));
        // both full
        assert_eq!(choose_team(Some(Team::Red), 2, 2), None);
        // no preference fills the smaller team
        assert_eq!(choose_team(None, 1, 0), Some(Team::Blue));
        assert_eq!(choose_team(None, 0, 0), Some(Team::Red));
    }

    #[test]
    fn lone_join_spawns_on_red_mark() {
        let mut m = test_match();
        let id = join(&mut m, Some(Team::Red));

        let player = &m.state().players[&id];
        assert_eq!(player.team, Team::Red);
        assert_eq!((player.x, player.y, player.z), (-6.0, GROUND_Y, 0.0));
        let (red, blue) = m.state().team_counts();
        assert_eq!((red, blue), (1, 0));
    }

    #[test]
    fn join_auto_balances_when_desired_is_full() {
        let mut m = test_match();
        join(&mut m, Some(Team::Red));
        join(&mut m, Some(Team::Red));
        let c = join(&mut m, Some(Team::Red));

        assert_eq!(m.state().players[&c].team, Team::Blue);
    }

    #[test]
    fn fifth_join_is_rejected() {
        let mut m = test_match();
        for _ in 0..4 {
            join(&mut m, None);
        }
        assert_eq!(m.state().players.len(), 4);
        let (red, blue) = m.state().team_counts();
        assert_eq!((red, blue), (2, 2));

        let extra = join(&mut m, None);
        assert!(!m.state().players.contains_key(&extra));
    }

    #[test]
    fn host_is_first_joiner_and_succession_works() {
        let mut m = test_match();
        let a = join(&mut m, None);
        let b = join(&mut m, None);
        assert_eq!(m.state().host(), Some(a));

        m.handle_message(a, ClientMsg::Leave);
        assert_eq!(m.state().host(), Some(b));
    }

    #[test]
    fn only_host_can_start_the_game() {
        let mut m = test_match();
        let host = join(&mut m, None);
        let other = join(&mut m, None);

        m.handle_message(other, ClientMsg::StartGame);
        assert_eq!(m.state().phase, GamePhase::Waiting);

        m.handle_message(host, ClientMsg::StartGame);
        assert_eq!(m.state().phase, GamePhase::Playing);
        assert_eq!(m.state().timer, MATCH_TIMER_START);
    }

    #[test]
    fn queued_jump_input_fires_through_a_full_step() {
        let mut m = test_match();
        let id = join(&mut m, None);
        m.handle_message(
            id,
            ClientMsg::Input {
                inputs: vec![InputFrame {
                    tick: 1,
                    x: 0.0,
                    z: 0.0,
                    rot_y: 0.0,
                    jump_request_id: 1,
                }],
                single: InlineInput::default(),
            },
        );
        m.step();
        let player = &m.state().players[&id];
        assert_eq!(player.jump_count, 1);
        // one gravity tick has already been consumed after the jump set vy
        assert!(player.vy > JUMP_FORCE * 0.9);
    }

    #[test]
    fn goal_scores_with_assist_attribution() {
        let mut m = test_match();
        let a = join(&mut m, Some(Team::Red));
        let b = join(&mut m, Some(Team::Red));
        m.handle_message(a, ClientMsg::StartGame);

        // A then B touch the ball on the way in
        m.state_mut().touch.record(a);
        m.state_mut().touch.record(b);

        // park the ball inside the +x goal mouth
        let ball_body = m.state().ball.body;
        m.state_mut()
            .world
            .set_translation(ball_body, vector![GOAL_LINE_X + BALL_RADIUS + 0.2, 1.0, 0.0]);
        m.state_mut()
            .world
            .set_linvel(ball_body, vector![0.0, 0.0, 0.0]);
        m.step();

        assert_eq!(m.state().red_score, 1);
        assert_eq!(m.state().blue_score, 0);
        assert_eq!(m.state().players[&b].goals, 1);
        assert_eq!(m.state().players[&a].assists, 1);
        assert!(m.state().pending_reset_ms.is_some());
    }

    #[test]
    fn cooldown_blocks_back_to_back_goals() {
        let mut m = test_match();
        let a = join(&mut m, Some(Team::Red));
        m.handle_message(a, ClientMsg::StartGame);

        let ball_body = m.state().ball.body;
        m.state_mut()
            .world
            .set_translation(ball_body, vector![GOAL_LINE_X + BALL_RADIUS + 0.2, 1.0, 0.0]);
        m.state_mut()
            .world
            .set_linvel(ball_body, vector![0.0, 0.0, 0.0]);
        m.step();
        assert_eq!(m.state().red_score, 1);

        // goal again within the cooldown window: parked past the line, but
        // no award
        m.state_mut().pending_reset_ms = None;
        m.state_mut()
            .world
            .set_translation(ball_body, vector![GOAL_LINE_X + BALL_RADIUS + 0.2, 1.0, 0.0]);
        m.step();
        assert_eq!(m.state().red_score, 1);

        // after the cooldown passes it counts again
        m.state_mut().last_goal_ms = unix_millis() - GOAL_COOLDOWN_MS;
        m.state_mut().pending_reset_ms = None;
        m.state_mut()
            .world
            .set_translation(ball_body, vector![GOAL_LINE_X + BALL_RADIUS + 0.2, 1.0, 0.0]);
        m.step();
        assert_eq!(m.state().red_score, 2);
    }

    #[test]
    fn reset_positions_is_canonical() {
        let mut m = test_match();
        let red = join(&mut m, Some(Team::Red));
        let blue = join(&mut m, Some(Team::Blue));

        // scramble everything
        let ball_body = m.state().ball.body;
        m.state_mut()
            .world
            .set_translation(ball_body, vector![12.0, 3.0, 1.0]);
        m.state_mut()
            .world
            .set_linvel(ball_body, vector![5.0, 2.0, 1.0]);
        for player in m.state_mut().players.values_mut() {
            player.x = 1.0;
            player.vx = 7.0;
        }

        m.reset_positions();

        let ball_pos = m.state().world.translation(ball_body).unwrap();
        assert_eq!((ball_pos.x, ball_pos.y, ball_pos.z), (0.0, 2.0, 0.0));
        let ball_vel = m.state().world.linvel(ball_body).unwrap();
        assert_eq!(ball_vel.norm(), 0.0);

        let red_player = &m.state().players[&red];
        assert_eq!((red_player.x, red_player.y, red_player.z), (-6.0, GROUND_Y, 0.0));
        let blue_player = &m.state().players[&blue];
        assert_eq!((blue_player.x, blue_player.y, blue_player.z), (6.0, GROUND_Y, 0.0));
    }

    #[test]
    fn no_goals_while_waiting() {
        let mut m = test_match();
        join(&mut m, Some(Team::Red));

        let ball_body = m.state().ball.body;
        m.state_mut()
            .world
            .set_translation(ball_body, vector![GOAL_LINE_X + BALL_RADIUS + 0.2, 1.0, 0.0]);
        m.step();
        assert_eq!(m.state().red_score, 0);
    }

    #[test]
    fn leave_releases_player_and_slot() {
        let mut m = test_match();
        let a = join(&mut m, None);
        let b = join(&mut m, None);
        assert_eq!(m.state().players.len(), 2);

        m.handle_message(a, ClientMsg::Leave);
        assert_eq!(m.state().players.len(), 1);
        assert!(m.state().players.contains_key(&b));

        // freed slot is joinable again
        let c = join(&mut m, None);
        assert!(m.state().players.contains_key(&c));
    }

    #[test]
    fn update_state_respects_whitelist() {
        let mut m = test_match();
        let id = join(&mut m, None);

        m.handle_message(
            id,
            ClientMsg::UpdateState {
                key: "invisible".to_string(),
                value: serde_json::Value::Bool(true),
            },
        );
        assert!(m.state().players[&id].invisible);

        m.handle_message(
            id,
            ClientMsg::UpdateState {
                key: "speedMult".to_string(),
                value: serde_json::Value::Bool(true),
            },
        );
        // non-whitelisted key silently dropped
        assert_eq!(m.state().players[&id].speed_mult, 1.0);
    }

    #[test]
    fn kick_requires_range_and_updates_touch() {
        let mut m = test_match();
        let id = join(&mut m, Some(Team::Red));

        // ball spawns at center, player is at (-6, _, 0): out of range
        m.handle_message(
            id,
            ClientMsg::Kick {
                impulse_x: 10.0,
                impulse_y: 0.0,
                impulse_z: 0.0,
            },
        );
        assert_eq!(m.state().players[&id].shots, 0);
        assert!(m.state().touch.last.is_none());

        // walk the player to the ball
        if let Some(player) = m.state_mut().players.get_mut(&id) {
            player.x = 0.0;
            player.z = 0.5;
        }
        m.handle_message(
            id,
            ClientMsg::Kick {
                impulse_x: 10.0,
                impulse_y: 0.0,
                impulse_z: 0.0,
            },
        );
        assert_eq!(m.state().players[&id].shots, 1);
        assert_eq!(m.state().touch.last, Some(id));
        assert_eq!(m.state().ball.owner_session_id, Some(id));
    }
}
