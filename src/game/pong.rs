//! Pong: two paddles, one ball, fixed court

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{Action, EngineResult, GameEngine, GameKind, Outbox, Phase, PlayerId};
use crate::error::{CoreError, CoreResult};
use crate::ws::protocol::{PongSnapshot, RoomEnd, ServerMsg, Vec2};

pub const COURT_WIDTH: f32 = 800.0;
pub const COURT_HEIGHT: f32 = 450.0;
pub const PADDLE_HEIGHT: f32 = 90.0;
pub const PADDLE_SPEED: f32 = 330.0;
/// Distance of each paddle face from its goal line
pub const PADDLE_INSET: f32 = 30.0;
const WALL_MARGIN: f32 = 8.0;
const SPEEDUP: f32 = 1.03;
const MAX_BALL_VX: f32 = 900.0;
const SPIN: f32 = 2.4;
const TARGET_SCORE: u32 = 5;
const MATCH_SECONDS: f32 = 60.0;

#[derive(Debug, Clone, Copy, Default)]
struct PaddleInput {
    up: bool,
    down: bool,
}

pub struct PongEngine {
    room_id: String,
    phase: Phase,
    tick: u64,
    rng: ChaCha8Rng,
    /// Left seat first. Seats survive a mid-game leave so standings stay complete.
    seats: Vec<PlayerId>,
    inputs: [PaddleInput; 2],
    score: [u32; 2],
    ball: Vec2,
    ball_v: Vec2,
    left_y: f32,
    right_y: f32,
    time_left: f32,
    result: Option<EngineResult>,
}

impl PongEngine {
    pub fn new(room_id: &str, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let dir = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let vy = rng.gen_range(-160.0..=160.0);
        Self {
            room_id: room_id.to_string(),
            phase: Phase::Waiting,
            tick: 0,
            rng,
            seats: Vec::with_capacity(2),
            inputs: [PaddleInput::default(); 2],
            score: [0, 0],
            ball: Vec2 {
                x: COURT_WIDTH / 2.0,
                y: COURT_HEIGHT / 2.0,
            },
            ball_v: Vec2 { x: dir * 260.0, y: vy },
            left_y: COURT_HEIGHT / 2.0,
            right_y: COURT_HEIGHT / 2.0,
            time_left: MATCH_SECONDS,
            result: None,
        }
    }

    pub fn score(&self) -> [u32; 2] {
        self.score
    }

    pub fn ball(&self) -> Vec2 {
        self.ball
    }

    fn seat_index(&self, player: PlayerId) -> Option<usize> {
        self.seats.iter().position(|&p| p == player)
    }

    fn move_paddle(y: f32, input: PaddleInput, dt: f32) -> f32 {
        let mut dy = 0.0;
        if input.up {
            dy -= PADDLE_SPEED * dt;
        }
        if input.down {
            dy += PADDLE_SPEED * dt;
        }
        (y + dy).clamp(PADDLE_HEIGHT / 2.0, COURT_HEIGHT - PADDLE_HEIGHT / 2.0)
    }

    /// Ball height where its path meets the paddle face at `face_x`.
    /// A ball already past the face is tested where it is now.
    fn y_at_face(prev: Vec2, now: Vec2, face_x: f32) -> f32 {
        let crossed = (prev.x - face_x) * (now.x - face_x) < 0.0;
        if !crossed {
            return now.y;
        }
        let t = (prev.x - face_x) / (prev.x - now.x);
        (prev.y + (now.y - prev.y) * t).clamp(WALL_MARGIN, COURT_HEIGHT - WALL_MARGIN)
    }

    fn reset_ball(&mut self, direction: f32) {
        self.ball = Vec2 {
            x: COURT_WIDTH / 2.0,
            y: COURT_HEIGHT / 2.0,
        };
        self.ball_v = Vec2 {
            x: direction * self.rng.gen_range(240.0..=320.0),
            y: self.rng.gen_range(-180.0..=180.0),
        };
    }

    fn winner(&self) -> Option<PlayerId> {
        match self.score[0].cmp(&self.score[1]) {
            std::cmp::Ordering::Greater => self.seats.first().copied(),
            std::cmp::Ordering::Less => self.seats.get(1).copied(),
            std::cmp::Ordering::Equal => None,
        }
    }

    fn finish(&mut self, reason: &str, winner: Option<PlayerId>, out: &mut Outbox) {
        if self.phase == Phase::Ended {
            return;
        }
        self.phase = Phase::Ended;
        let result = EngineResult::duel(reason, &self.seats, winner);
        out.room(ServerMsg::PongEnd(RoomEnd {
            room_id: self.room_id.clone(),
            reason: reason.to_string(),
            status: None,
            winners: result.winners(),
            standings: result.standings.clone(),
        }));
        self.result = Some(result);
    }
}

impl GameEngine for PongEngine {
    fn kind(&self) -> GameKind {
        GameKind::Pong
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn max_players(&self) -> usize {
        2
    }

    fn tick(&self) -> u64 {
        self.tick
    }

    fn seat(&mut self, player: PlayerId, _display_name: &str, _out: &mut Outbox) -> Option<String> {
        if self.phase != Phase::Waiting || self.seats.len() >= 2 || self.seats.contains(&player) {
            return None;
        }
        self.seats.push(player);
        if self.seats.len() == 2 {
            self.phase = Phase::Running;
        }
        Some(if self.seats.len() == 1 { "left" } else { "right" }.to_string())
    }

    fn unseat(&mut self, player: PlayerId, out: &mut Outbox) {
        let Some(idx) = self.seat_index(player) else {
            return;
        };
        match self.phase {
            Phase::Waiting => {
                self.seats.remove(idx);
            }
            Phase::Running => {
                // leaver concedes
                let other = self.seats.get(1 - idx).copied();
                self.score[1 - idx] = self.score[1 - idx].max(TARGET_SCORE);
                self.finish("player_left", other, out);
            }
            Phase::Ended => {}
        }
    }

    fn apply_input(&mut self, player: PlayerId, action: Action, _out: &mut Outbox) -> CoreResult<()> {
        let Action::PongInput { up, down } = action else {
            return Err(CoreError::Validation("unsupported_action"));
        };
        let idx = self
            .seat_index(player)
            .ok_or(CoreError::Validation("not_a_player"))?;
        if self.phase == Phase::Ended {
            return Err(CoreError::State("game_over"));
        }
        self.inputs[idx] = PaddleInput { up, down };
        Ok(())
    }

    fn step(&mut self, dt: f32, out: &mut Outbox) -> CoreResult<()> {
        if self.phase != Phase::Running {
            return Ok(());
        }
        self.tick += 1;
        self.time_left = (self.time_left - dt).max(0.0);
        self.left_y = Self::move_paddle(self.left_y, self.inputs[0], dt);
        self.right_y = Self::move_paddle(self.right_y, self.inputs[1], dt);

        let prev = self.ball;
        self.ball.x += self.ball_v.x * dt;
        self.ball.y += self.ball_v.y * dt;
        if self.ball.y <= WALL_MARGIN || self.ball.y >= COURT_HEIGHT - WALL_MARGIN {
            self.ball_v.y = -self.ball_v.y;
            self.ball.y = self.ball.y.clamp(WALL_MARGIN, COURT_HEIGHT - WALL_MARGIN);
        }

        let left_face = PADDLE_INSET;
        let right_face = COURT_WIDTH - PADDLE_INSET;
        if self.ball_v.x < 0.0 && self.ball.x <= left_face && prev.x >= 0.0 {
            let y = Self::y_at_face(prev, self.ball, left_face);
            if (y - self.left_y).abs() <= PADDLE_HEIGHT / 2.0 {
                self.ball = Vec2 { x: left_face, y };
                self.ball_v.x = (self.ball_v.x.abs() * SPEEDUP).min(MAX_BALL_VX);
                self.ball_v.y += (y - self.left_y) * SPIN;
            }
        } else if self.ball_v.x > 0.0 && self.ball.x >= right_face && prev.x <= COURT_WIDTH {
            let y = Self::y_at_face(prev, self.ball, right_face);
            if (y - self.right_y).abs() <= PADDLE_HEIGHT / 2.0 {
                self.ball = Vec2 { x: right_face, y };
                self.ball_v.x = -(self.ball_v.x.abs() * SPEEDUP).min(MAX_BALL_VX);
                self.ball_v.y += (y - self.right_y) * SPIN;
            }
        }

        if self.ball.x < 0.0 {
            self.score[1] += 1;
            self.reset_ball(1.0);
        } else if self.ball.x > COURT_WIDTH {
            self.score[0] += 1;
            self.reset_ball(-1.0);
        }

        if self.score[0] >= TARGET_SCORE || self.score[1] >= TARGET_SCORE {
            let winner = self.winner();
            self.finish("score", winner, out);
        } else if self.time_left <= 0.0 {
            let winner = self.winner();
            self.finish("time_limit", winner, out);
        }
        Ok(())
    }

    fn serialize_state(&self) -> ServerMsg {
        ServerMsg::PongState(PongSnapshot {
            room_id: self.room_id.clone(),
            state: self.phase,
            tick: self.tick,
            players: self.seats.clone(),
            score: self.score,
            ball: self.ball,
            left_y: self.left_y,
            right_y: self.right_y,
            paddle_h: PADDLE_HEIGHT,
            time_left: self.time_left,
            width: COURT_WIDTH,
            height: COURT_HEIGHT,
        })
    }

    fn result(&self) -> Option<EngineResult> {
        self.result.clone()
    }

    fn force_end(&mut self, reason: &str, out: &mut Outbox) {
        let winner = self.winner();
        self.finish(reason, winner, out);
    }

    fn snapshot_hz(&self) -> f32 {
        20.0
    }
}
