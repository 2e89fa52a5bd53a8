//! Game Loop Controller
//!
//! Owns the [`Session`] and turns ticks, user controls and advisory
//! resolutions into state changes plus a list of [`Command`]s for the runtime
//! to execute. Nothing in here awaits or touches I/O, so each entry point is a
//! single synchronous step with respect to the session.

use crate::Command;
use crate::advisory::{AdvisoryCategory, AdvisoryMessage, AdvisoryRequest, AdvisoryTopic};
use crate::coaching::CoachingGate;
use crate::config::GameConfig;
use crate::error::GameError;
use crate::events::GameEvent;
use crate::sequencer::Resolution;
use crate::session::{GameStatus, Mode, Session};
use crate::snapshot::DetectionSnapshot;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tokio::time::Instant;
use tracing::{debug, error, info};

pub struct GameLoopController {
    config: GameConfig,
    session: Session,
    coaching: CoachingGate,
    rng: StdRng,
    last_match_percent: f64,
}

impl GameLoopController {
    /// Creates a controller for a new session.
    ///
    /// Fails if the configuration could run out of targets before the
    /// required number of challenges is completed.
    pub fn new(config: GameConfig, player_name: impl Into<String>) -> Result<Self, GameError> {
        Self::with_rng(config, player_name, StdRng::from_os_rng())
    }

    pub fn with_rng(
        config: GameConfig,
        player_name: impl Into<String>,
        rng: StdRng,
    ) -> Result<Self, GameError> {
        config.validate()?;
        Ok(Self {
            coaching: CoachingGate::new(config.coaching_interval),
            config,
            session: Session::new(player_name),
            rng,
            last_match_percent: 0.0,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn status(&self) -> GameStatus {
        GameStatus {
            mode: self.session.mode,
            target_label: self.session.target_label.clone(),
            completed_count: self.session.completed_count,
            required_count: self.config.required_count,
            match_percent: self.last_match_percent.round().clamp(0.0, 100.0) as u32,
            debug: self.session.debug,
        }
    }

    /// Opens the session with the tutorial greeting.
    pub fn start(&mut self) -> Vec<Command> {
        self.session.mode = Mode::Tutorial;
        info!(player = %self.session.player_name, "session started");
        let topic = AdvisoryTopic::Greeting {
            player: self.session.player_name.clone(),
        };
        vec![self.request(topic)]
    }

    /// Leaves the tutorial and announces the first target.
    pub fn begin_game(&mut self, now: Instant) -> Vec<Command> {
        if self.session.mode != Mode::Tutorial {
            return Vec::new();
        }
        self.session.mode = Mode::Game;
        match self.select_target(now) {
            Some(label) => {
                info!(target_label = %label, "game started");
                vec![self.request(AdvisoryTopic::Target { label })]
            }
            None => self.finish(None),
        }
    }

    /// Evaluates the latest snapshot against the current target.
    pub fn on_tick(&mut self, snapshot: &DetectionSnapshot, now: Instant) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.session.mode != Mode::Game || self.session.target_satisfied {
            return commands;
        }
        let Some(target) = self.session.target_label.clone() else {
            return commands;
        };

        let match_percent = snapshot.score(&target) * 100.0;
        self.last_match_percent = match_percent;

        if match_percent >= self.config.match_threshold {
            match self.session.hold_start {
                None => self.session.hold_start = Some(now),
                Some(started) => {
                    let held = now.saturating_duration_since(started);
                    if self.session.debug {
                        debug!(target_label = %target, match_percent, held_ms = held.as_millis() as u64, "holding target");
                    }
                    if held >= self.config.hold_time {
                        self.succeed(target, match_percent, snapshot, now, &mut commands);
                    }
                }
            }
        } else {
            if self.session.debug {
                debug!(target_label = %target, match_percent, subject = snapshot.subject_present(), "below threshold");
            }
            self.session.hold_start = None;
            if let Some(topic) = self.coaching.maybe_coach(snapshot, &mut self.session, now) {
                commands.push(self.request(topic));
            }
        }
        commands
    }

    fn succeed(
        &mut self,
        target: String,
        match_percent: f64,
        snapshot: &DetectionSnapshot,
        now: Instant,
        commands: &mut Vec<Command>,
    ) {
        if self.session.target_satisfied {
            return;
        }
        self.session.target_satisfied = true;
        self.session.hold_start = None;
        commands.push(Command::StopPlayback);
        commands.push(Command::Capture {
            label: target.clone(),
            region: snapshot.region,
        });

        let attempt_ms = self.session.attempt_duration_ms(now);
        self.session.used_labels.insert(target.clone());
        self.session.completed_count += 1;
        self.session.record_attempt(match_percent);
        info!(
            target_label = %target,
            match_percent,
            completed = self.session.completed_count,
            required = self.config.required_count,
            "target matched"
        );
        commands.push(Command::Record(GameEvent::attempt(
            target.clone(),
            target.clone(),
            match_percent,
            attempt_ms,
        )));

        if self.session.completed_count < self.config.required_count {
            match self.select_target(now) {
                Some(next) => {
                    let topic = AdvisoryTopic::Success {
                        completed: target,
                        next: Some(next),
                    };
                    commands.push(self.request(topic));
                }
                None => commands.extend(self.finish(Some(target))),
            }
        } else {
            commands.extend(self.finish(Some(target)));
        }
    }

    /// Picks a random unused, non-reserved label and makes it the target.
    ///
    /// The coaching clock restarts with every new target.
    fn select_target(&mut self, now: Instant) -> Option<String> {
        let available: Vec<&str> = self
            .config
            .playable_labels()
            .into_iter()
            .filter(|label| !self.session.used_labels.contains(*label))
            .collect();
        let Some(label) = available.choose(&mut self.rng).map(|l| l.to_string()) else {
            error!(
                used = self.session.used_labels.len(),
                "no playable labels left to select"
            );
            return None;
        };
        self.session.target_label = Some(label.clone());
        self.session.target_satisfied = false;
        self.session.hold_start = None;
        self.session.target_started_at = Some(now);
        self.session.last_coaching_time = Some(now);
        self.last_match_percent = 0.0;
        Some(label)
    }

    /// Ends the game. `last` is the label matched on the final success; the
    /// end message congratulates it, so no separate success message is sent.
    fn finish(&mut self, last: Option<String>) -> Vec<Command> {
        self.session.mode = Mode::End;
        self.session.target_label = None;
        self.session.hold_start = None;
        info!(completed = self.session.completed_count, "game over");
        let topic = AdvisoryTopic::Finale {
            completed: self.session.completed_count,
            last,
        };
        vec![self.request(topic)]
    }

    fn request(&mut self, topic: AdvisoryTopic) -> Command {
        let sequence = self.session.sequencer.stamp(topic.category());
        Command::RequestAdvisory(AdvisoryRequest { sequence, topic })
    }

    /// Arbitrates a returned advisory request.
    ///
    /// A coaching request clears the in-flight flag no matter how it resolved,
    /// and records the failing attempt together with the hint, if one is
    /// delivered.
    pub fn resolve_advisory(
        &mut self,
        request: &AdvisoryRequest,
        outcome: anyhow::Result<String>,
    ) -> (Option<AdvisoryMessage>, Vec<Command>) {
        let resolution = self.session.sequencer.resolve(request, outcome);
        if let Resolution::Substituted(_) = &resolution {
            debug!(sequence = request.sequence, "playing fallback advisory text");
        }
        let message = resolution.into_message();

        let mut commands = Vec::new();
        if let AdvisoryTopic::Coaching {
            target,
            detected,
            confidence,
            attempt_ms,
            ..
        } = &request.topic
        {
            self.session.coaching_in_flight = false;
            let event = GameEvent::attempt(target.clone(), detected.clone(), *confidence, *attempt_ms)
                .with_coaching_text(message.as_ref().map(|m| m.text.clone()));
            commands.push(Command::Record(event));
        }
        (message, commands)
    }

    /// Reacts to a playback session ending.
    ///
    /// A greeting that plays to the end moves the tutorial into the game.
    pub fn on_playback_finished(
        &mut self,
        message: &AdvisoryMessage,
        completed: bool,
        now: Instant,
    ) -> Vec<Command> {
        if completed
            && message.category == AdvisoryCategory::Announcement
            && self.session.mode == Mode::Tutorial
            && !self.session.sequencer.is_stale(message.issued_sequence)
        {
            return self.begin_game(now);
        }
        Vec::new()
    }

    /// Interrupts whatever is playing and moves the session forward.
    ///
    /// The tutorial jumps to the game; a running game ends early.
    pub fn skip(&mut self, now: Instant) -> Vec<Command> {
        self.session.sequencer.invalidate();
        info!(mode = %self.session.mode, "skip requested");
        let mut commands = vec![Command::StopPlayback];
        match self.session.mode {
            Mode::Tutorial => commands.extend(self.begin_game(now)),
            Mode::Game => commands.extend(self.finish(None)),
            Mode::End => {}
        }
        commands
    }

    /// Forgets any partial hold on the current target.
    pub fn reset(&mut self) {
        self.session.hold_start = None;
        debug!("hold state reset");
    }

    pub fn toggle_debug(&mut self) -> bool {
        self.session.debug = !self.session.debug;
        info!(debug = self.session.debug, "debug mode toggled");
        self.session.debug
    }

    pub fn is_over(&self) -> bool {
        self.session.mode == Mode::End
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Region;
    use std::time::Duration;

    fn controller(required: usize) -> GameLoopController {
        let config = GameConfig {
            required_count: required,
            ..Default::default()
        };
        GameLoopController::with_rng(config, "Ada", StdRng::seed_from_u64(7)).unwrap()
    }

    fn in_game(required: usize, start: Instant) -> GameLoopController {
        let mut c = controller(required);
        c.start();
        c.begin_game(start);
        c
    }

    fn scores(label: &str, score: f64) -> DetectionSnapshot {
        DetectionSnapshot::new(
            [(label.to_string(), score)].into_iter().collect(),
            Some(Region {
                x: 0.0,
                y: 0.0,
                width: 50.0,
                height: 50.0,
            }),
        )
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn target(c: &GameLoopController) -> String {
        c.session().target_label.clone().unwrap()
    }

    fn requests(commands: &[Command]) -> Vec<&AdvisoryRequest> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::RequestAdvisory(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_invalid_config_rejected_at_session_start() {
        let config = GameConfig {
            required_count: 7,
            ..Default::default()
        };
        assert!(matches!(
            GameLoopController::new(config, "Ada"),
            Err(GameError::NotEnoughLabels { .. })
        ));
    }

    #[test]
    fn test_start_requests_greeting() {
        let mut c = controller(3);
        let commands = c.start();
        let reqs = requests(&commands);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].category(), AdvisoryCategory::Announcement);
        assert_eq!(c.session().mode, Mode::Tutorial);
    }

    #[test]
    fn test_ticks_ignored_outside_game_mode() {
        let mut c = controller(3);
        c.start();
        let now = Instant::now();
        assert!(c.on_tick(&scores("happy", 1.0), now).is_empty());
        assert!(c.session().hold_start.is_none());
    }

    #[test]
    fn test_begin_game_selects_playable_target() {
        let start = Instant::now();
        let c = in_game(3, start);
        let label = target(&c);
        assert_ne!(label, "neutral");
        assert!(c.config().playable_labels().contains(&label.as_str()));
        assert_eq!(c.session().last_coaching_time, Some(start));
    }

    #[test]
    fn test_hold_scenario_succeeds_at_one_second() {
        let t0 = Instant::now();
        let mut c = in_game(3, t0);
        let label = target(&c);

        let readings = [(0, 0.50), (200, 0.72), (400, 0.75), (600, 0.76), (800, 0.78)];
        for (at, score) in readings {
            let commands = c.on_tick(&scores(&label, score), t0 + ms(at));
            assert!(!commands.contains(&Command::StopPlayback), "no success at {at}ms");
            if at == 0 {
                assert!(c.session().hold_start.is_none());
            } else {
                assert_eq!(c.session().hold_start, Some(t0 + ms(200)));
            }
        }
        assert_eq!(c.session().completed_count, 0);

        let commands = c.on_tick(&scores(&label, 0.79), t0 + ms(1000));
        assert_eq!(commands.first(), Some(&Command::StopPlayback));
        assert_eq!(c.session().completed_count, 1);
        assert!(c.session().used_labels.contains(&label));
        assert!(commands.iter().any(|cmd| matches!(
            cmd,
            Command::Capture { label: l, region: Some(_) } if *l == label
        )));
        let reqs = requests(&commands);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].category(), AdvisoryCategory::Success);
    }

    #[test]
    fn test_dip_below_threshold_restarts_hold() {
        let t0 = Instant::now();
        let mut c = in_game(3, t0);
        let label = target(&c);

        c.on_tick(&scores(&label, 0.9), t0);
        c.on_tick(&scores(&label, 0.9), t0 + ms(600));
        c.on_tick(&scores(&label, 0.4), t0 + ms(700));
        assert!(c.session().hold_start.is_none());
        c.on_tick(&scores(&label, 0.9), t0 + ms(800));
        let commands = c.on_tick(&scores(&label, 0.9), t0 + ms(1200));
        assert!(commands.is_empty());
        assert_eq!(c.session().completed_count, 0);
        c.on_tick(&scores(&label, 0.9), t0 + ms(1600));
        assert_eq!(c.session().completed_count, 1);
    }

    #[test]
    fn test_lost_detection_resets_hold() {
        let t0 = Instant::now();
        let mut c = in_game(3, t0);
        let label = target(&c);

        c.on_tick(&scores(&label, 0.9), t0);
        c.on_tick(&DetectionSnapshot::default(), t0 + ms(400));
        assert!(c.session().hold_start.is_none());
        assert!(!c.session().coaching_in_flight);
    }

    #[test]
    fn test_hold_start_tracks_contiguous_matches() {
        let t0 = Instant::now();
        let mut c = in_game(5, t0);
        let label = target(&c);
        let pattern = [0.9, 0.9, 0.1, 0.8, 0.0, 0.95, 0.95, 0.3];
        let mut run_start: Option<Instant> = None;
        for (i, score) in pattern.iter().enumerate() {
            let now = t0 + ms(i as u64 * 100);
            c.on_tick(&scores(&label, *score), now);
            if *score * 100.0 >= 70.0 {
                run_start.get_or_insert(now);
            } else {
                run_start = None;
            }
            assert_eq!(c.session().hold_start, run_start, "tick {i}");
        }
    }

    #[test]
    fn test_success_fires_once_per_target() {
        let t0 = Instant::now();
        let mut c = in_game(3, t0);
        let first = target(&c);

        c.on_tick(&scores(&first, 0.9), t0);
        c.on_tick(&scores(&first, 0.9), t0 + ms(800));
        assert_eq!(c.session().completed_count, 1);
        let second = target(&c);
        assert_ne!(first, second);

        // Holding the old expression keeps scoring zero on the new target.
        for step in 1..10 {
            c.on_tick(&scores(&first, 0.95), t0 + ms(800 + step * 200));
        }
        assert_eq!(c.session().completed_count, 1);
    }

    #[test]
    fn test_last_success_ends_game_with_finale() {
        let t0 = Instant::now();
        let mut c = in_game(2, t0);
        let mut now = t0;
        let mut last = Vec::new();
        for _ in 0..2 {
            let label = target(&c);
            c.on_tick(&scores(&label, 0.9), now);
            now += ms(900);
            last = c.on_tick(&scores(&label, 0.9), now);
            now += ms(100);
        }
        assert_eq!(c.session().completed_count, 2);
        assert!(c.is_over());
        assert!(c.session().target_label.is_none());
        let reqs = requests(&last);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].category(), AdvisoryCategory::End);
        match &reqs[0].topic {
            AdvisoryTopic::Finale { completed, last } => {
                assert_eq!(*completed, 2);
                assert!(last.is_some());
                assert!(c.session().used_labels.contains(last.as_deref().unwrap()));
            }
            other => panic!("expected finale, got {other:?}"),
        }
    }

    #[test]
    fn test_late_success_message_survives_newer_coaching() {
        let t0 = Instant::now();
        let mut c = in_game(3, t0);
        let first = target(&c);

        c.on_tick(&scores(&first, 0.9), t0);
        let commands = c.on_tick(&scores(&first, 0.9), t0 + ms(800));
        let success = requests(&commands)[0].clone();
        assert_eq!(success.category(), AdvisoryCategory::Success);
        let second = target(&c);

        // The coaching clock restarted with the new target.
        let commands = c.on_tick(&scores(&first, 0.9), t0 + ms(1000));
        assert!(requests(&commands).is_empty());

        // The success text is still being generated when coaching fires.
        let commands = c.on_tick(&scores(&first, 0.9), t0 + ms(8900));
        let coaching = requests(&commands)[0].clone();
        assert_eq!(coaching.category(), AdvisoryCategory::Coaching);

        let (message, _) = c.resolve_advisory(&success, Ok("Great smile!".into()));
        let message = message.expect("success message must still be delivered");
        assert_eq!(message.category, AdvisoryCategory::Success);
        assert!(message.text.ends_with(&format!("Now show me {second}.")));

        let (hint, _) = c.resolve_advisory(&coaching, Ok("Try the other one.".into()));
        assert_eq!(hint.map(|m| m.text), Some("Try the other one.".to_string()));
    }

    #[test]
    fn test_coaching_resolution_records_attempt_with_hint() {
        let t0 = Instant::now();
        let mut c = in_game(3, t0);
        let label = target(&c);
        let other = if label == "sad" { "angry" } else { "sad" };

        let commands = c.on_tick(&scores(other, 0.8), t0 + ms(8100));
        assert!(!commands.iter().any(|cmd| matches!(cmd, Command::Record(_))));
        assert_eq!(c.session().attempt_history, vec![0.0]);
        let request = requests(&commands)[0].clone();

        let (message, commands) = c.resolve_advisory(&request, Ok(" Frown a little. ".into()));
        assert_eq!(message.map(|m| m.text), Some("Frown a little.".to_string()));
        match commands.as_slice() {
            [Command::Record(event)] => {
                assert_eq!(event.target_label.as_deref(), Some(label.as_str()));
                assert_eq!(event.detected_label.as_deref(), Some(other));
                assert_eq!(event.confidence_score, Some(0.0));
                assert_eq!(event.duration_ms, 8100);
                assert_eq!(event.coaching_text.as_deref(), Some("Frown a little."));
            }
            other => panic!("expected one attempt record, got {other:?}"),
        }
    }

    #[test]
    fn test_targets_never_repeat() {
        let t0 = Instant::now();
        let mut c = in_game(6, t0);
        let mut seen = std::collections::HashSet::new();
        let mut now = t0;
        while !c.is_over() {
            let label = target(&c);
            assert!(seen.insert(label.clone()), "{label} offered twice");
            c.on_tick(&scores(&label, 1.0), now);
            now += ms(800);
            c.on_tick(&scores(&label, 1.0), now);
            now += ms(50);
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_coaching_flag_cleared_on_any_resolution() {
        let t0 = Instant::now();
        let mut c = in_game(3, t0);
        let label = target(&c);
        let other = if label == "sad" { "angry" } else { "sad" };

        let commands = c.on_tick(&scores(other, 0.8), t0 + ms(8100));
        let request = requests(&commands)[0].clone();
        assert_eq!(request.category(), AdvisoryCategory::Coaching);
        assert!(c.session().coaching_in_flight);

        c.skip(t0 + ms(8200));
        let (message, commands) = c.resolve_advisory(&request, Ok("hint".into()));
        assert!(message.is_none());
        assert!(!c.session().coaching_in_flight);
        // The attempt is still recorded, without a hint.
        assert!(matches!(
            commands.as_slice(),
            [Command::Record(event)] if event.coaching_text.is_none()
        ));
    }

    #[test]
    fn test_skip_in_tutorial_starts_game_and_stales_greeting() {
        let mut c = controller(3);
        let greeting = requests(&c.start())[0].clone();
        let commands = c.skip(Instant::now());

        assert_eq!(commands.first(), Some(&Command::StopPlayback));
        assert_eq!(c.session().mode, Mode::Game);
        let announce = requests(&commands)[0].clone();
        assert!(matches!(announce.topic, AdvisoryTopic::Target { .. }));

        assert!(c.resolve_advisory(&greeting, Ok("Hello!".into())).0.is_none());
        let (message, commands) = c.resolve_advisory(&announce, Ok("Show me joy.".into()));
        assert_eq!(message.map(|m| m.text), Some("Show me joy.".to_string()));
        assert!(commands.is_empty());
    }

    #[test]
    fn test_skip_always_advances_sequence() {
        let mut c = controller(3);
        c.start();
        for _ in 0..4 {
            let before = c.session().sequencer.current();
            c.skip(Instant::now());
            assert!(c.session().sequencer.current() > before);
        }
        assert!(c.is_over());
    }

    #[test]
    fn test_greeting_completion_begins_game() {
        let mut c = controller(3);
        let greeting = requests(&c.start())[0].clone();
        let message = c.resolve_advisory(&greeting, Ok("Welcome!".into())).0.unwrap();

        let commands = c.on_playback_finished(&message, false, Instant::now());
        assert!(commands.is_empty());
        assert_eq!(c.session().mode, Mode::Tutorial);

        let commands = c.on_playback_finished(&message, true, Instant::now());
        assert_eq!(c.session().mode, Mode::Game);
        assert_eq!(requests(&commands).len(), 1);
    }

    #[test]
    fn test_reset_clears_hold() {
        let t0 = Instant::now();
        let mut c = in_game(3, t0);
        let label = target(&c);
        c.on_tick(&scores(&label, 0.9), t0);
        assert!(c.session().hold_start.is_some());
        c.reset();
        assert!(c.session().hold_start.is_none());
        c.on_tick(&scores(&label, 0.9), t0 + ms(900));
        assert_eq!(c.session().completed_count, 0);
    }

    #[test]
    fn test_toggle_debug() {
        let mut c = controller(3);
        assert!(c.toggle_debug());
        assert!(c.status().debug);
        assert!(!c.toggle_debug());
    }
}
