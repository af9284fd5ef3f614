use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::history::CycleLedger;
use crate::agent_engine::loop_control::{StopCoordinator, StopReason};
use crate::agent_engine::modes;
use crate::agent_engine::state::{Mode, ModeOutcome, SessionState};
use crate::config::{self, AppConfig};
use crate::executor::coordinator::ChatLayout;
use crate::executor::dispatcher::Dispatcher;
use crate::executor::input::InputDriver;
use crate::executor::safety::Hotkey;
use crate::executor::text_input::Clipboard;
use crate::game::data::GameDataStore;
use crate::game::parser;
use crate::game::types::{format_gold, Profile};
use crate::perception::chat_reader::ChatReader;
use crate::perception::correlation::{Correlator, SavePoint};
use crate::stats::{CycleRecord, SessionStats};
use crate::telemetry::TelemetryBridge;
use crate::ui::console::{parse_or, Console};
use crate::ui::overlay::Overlay;

/// Platform capabilities injected into the core.
#[derive(Clone)]
pub struct Capabilities {
    pub input: Arc<dyn InputDriver>,
    pub clipboard: Arc<dyn Clipboard>,
    pub hotkey: Arc<dyn Hotkey>,
    pub overlay: Arc<dyn Overlay>,
    pub console: Arc<dyn Console>,
}

/// Result of one command/response round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    Reply(String),
    /// Nothing attributable arrived, even after the extra waits.
    Empty,
    Stopped,
}

/// Everything a mode loop works with during one run.
pub struct ModeContext {
    pub config: AppConfig,
    pub session: SessionState,
    pub dispatcher: Dispatcher,
    pub correlator: Correlator,
    pub stats: SessionStats,
    pub telemetry: Arc<TelemetryBridge>,
    pub game_data: Arc<GameDataStore>,
    pub stop: StopCoordinator,
    pub overlay: Arc<dyn Overlay>,
    pub console: Arc<dyn Console>,
    pub ledger: Option<CycleLedger>,
}

impl ModeContext {
    pub fn new(
        config: AppConfig,
        caps: &Capabilities,
        telemetry: Arc<TelemetryBridge>,
        game_data: Arc<GameDataStore>,
    ) -> Self {
        let layout = ChatLayout::from_coords(&config.coords);
        let stop = StopCoordinator::new(
            caps.hotkey.clone(),
            Duration::from_millis(config.stop.poll_chunk_ms),
        );
        let reader = ChatReader::new(caps.input.clone(), caps.clipboard.clone(), layout);
        let correlator = Correlator::new(
            reader,
            config.correlation.clone(),
            stop.clone(),
            caps.overlay.clone(),
        );
        Self {
            session: SessionState::new(0),
            dispatcher: Dispatcher::new(caps.input.clone(), caps.clipboard.clone(), layout),
            correlator,
            stats: SessionStats::new(None),
            telemetry,
            game_data,
            stop,
            overlay: caps.overlay.clone(),
            console: caps.console.clone(),
            ledger: None,
            config,
        }
    }

    pub fn with_ledger(mut self, ledger: CycleLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn status(&self, text: &str) {
        self.overlay.show_status(text);
    }

    /// Sends `cmd`, sleeps `pacing`, and waits for our own reply.
    pub async fn exchange(&mut self, cmd: &str, pacing: Duration) -> Exchange {
        self.round_trip(cmd, pacing, false).await
    }

    /// Like [`Self::exchange`] but keeps other participants' lines.
    pub async fn exchange_raw(&mut self, cmd: &str, pacing: Duration) -> Exchange {
        self.round_trip(cmd, pacing, true).await
    }

    async fn round_trip(&mut self, cmd: &str, pacing: Duration, raw: bool) -> Exchange {
        if !self.stop.is_running() {
            return Exchange::Stopped;
        }
        let point = self.correlator.save_point().await.with_echo(cmd);
        if !self.stop.is_running() {
            return Exchange::Stopped;
        }
        if let Err(e) = self.dispatcher.send(cmd).await {
            tracing::warn!(cmd, error = %e, "command dispatch failed");
            return Exchange::Empty;
        }
        if !self.stop.sleep(pacing).await {
            return Exchange::Stopped;
        }
        self.await_reply(&point, raw).await
    }

    /// `/배틀` on its own line, then the opponent mention.
    pub async fn challenge(&mut self, opponent: &str) -> Exchange {
        if !self.stop.is_running() {
            return Exchange::Stopped;
        }
        let point = self
            .correlator
            .save_point()
            .await
            .with_echo(&format!("/배틀\n{opponent}"));
        if !self.stop.is_running() {
            return Exchange::Stopped;
        }
        if let Err(e) = self.dispatcher.send_once("/배틀").await {
            tracing::warn!(error = %e, "battle command dispatch failed");
            return Exchange::Empty;
        }
        if !self.stop.sleep(Duration::from_millis(self.config.battle.mention_delay_ms)).await {
            return Exchange::Stopped;
        }
        if let Err(e) = self.dispatcher.append_and_send(opponent).await {
            tracing::warn!(opponent, error = %e, "mention dispatch failed");
            return Exchange::Empty;
        }
        self.await_reply(&point, true).await
    }

    /// Waits for more text from anyone without sending a command.
    pub async fn listen_raw(&mut self) -> Exchange {
        if !self.stop.is_running() {
            return Exchange::Stopped;
        }
        let point = self.correlator.save_point().await;
        self.await_reply(&point, true).await
    }

    async fn await_reply(&mut self, point: &SavePoint, raw: bool) -> Exchange {
        let timeout = self.config.correlation.response_timeout();
        for attempt in 0..=self.config.correlation.empty_retries {
            let text = if raw {
                self.correlator.wait_for_change_raw(point, timeout).await
            } else {
                self.correlator.wait_for_change(point, timeout).await
            };
            if !text.is_empty() {
                return Exchange::Reply(text);
            }
            if !self.stop.is_running() {
                return Exchange::Stopped;
            }
            tracing::debug!(attempt, "empty response");
        }
        Exchange::Empty
    }

    /// Picks up a gold balance printed in `text`.
    pub fn observe_gold(&mut self, text: &str) {
        let gold = parser::extract_current_gold(text);
        if gold.is_some() && gold != self.session.gold {
            self.session.observe_gold(gold);
            self.stats.observe_gold(gold);
            if let Some(g) = gold {
                self.telemetry.record_gold(g);
            }
        }
    }

    pub fn close_cycle(&mut self, record: CycleRecord) {
        self.session.cycles += 1;
        self.telemetry.record_cycle(&record);
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.append(&record) {
                tracing::warn!(error = %e, "cycle ledger write failed");
            }
        }
        self.stats.close_cycle(record);
    }

    /// Reads our profile and binds it as the session identity.
    pub async fn load_profile(&mut self) -> Option<Profile> {
        let hint = self.config.account.handle.clone().filter(|h| !h.is_empty());
        if let Some(handle) = &hint {
            self.correlator.bind_handle(handle);
        }
        let profile = match self.exchange("/프로필", Duration::from_millis(500)).await {
            Exchange::Reply(text) => {
                self.observe_gold(&text);
                match &hint {
                    Some(handle) => parser::parse_profile_for_user(&text, handle),
                    None => parser::parse_profile(&text),
                }
            }
            Exchange::Empty | Exchange::Stopped => None,
        };
        profile.or_else(|| {
            hint.map(|name| Profile {
                name,
                ..Profile::default()
            })
        })
    }

    async fn begin_session(&mut self) {
        self.status("📋 프로필 확인 중...");
        match self.load_profile().await {
            Some(profile) => {
                tracing::info!(
                    name = %profile.name,
                    level = ?profile.level,
                    sword = %profile.sword_name,
                    "session profile bound"
                );
                self.session.bind_profile(profile);
                let handle = self.session.handle().to_string();
                self.correlator.bind_handle(&handle);
            }
            None => {
                tracing::warn!("profile unavailable; replies are not filtered by author");
                self.console
                    .print("⚠️ 프로필을 읽지 못했습니다. 채팅 필터 없이 진행합니다.")
                    .await;
            }
        }
        self.stats = SessionStats::new(self.session.gold);
        self.telemetry.init_session(self.session.gold);
    }
}

/// Hides the overlay and flushes telemetry however the mode body exits.
struct CleanupGuard {
    overlay: Arc<dyn Overlay>,
    telemetry: Arc<TelemetryBridge>,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.overlay.hide_all();
        self.telemetry.flush_if_pending();
    }
}

/// Runs one mode to completion, then prints the session report.
pub async fn run_mode(ctx: &mut ModeContext, mode: Mode, limit: Option<Duration>) -> ModeOutcome {
    ctx.stop.start();
    let timer = ctx.stop.arm_timer(limit);
    let guard = CleanupGuard {
        overlay: ctx.overlay.clone(),
        telemetry: ctx.telemetry.clone(),
    };
    tracing::info!(?mode, limit_secs = ?limit.map(|l| l.as_secs()), "mode started");

    ctx.game_data.refresh().await;
    ctx.begin_session().await;
    let outcome = if ctx.stop.is_running() {
        match mode {
            Mode::Enhance => modes::enhance::run(ctx).await,
            Mode::Special => modes::special::run(ctx).await,
            Mode::GoldMine => modes::goldmine::run(ctx).await,
            Mode::Battle => modes::battle::run(ctx).await,
        }
    } else {
        ModeOutcome::Stopped
    };

    ctx.stop.stop(StopReason::Finished);
    drop(timer);
    drop(guard);
    ctx.stats.observe_gold(ctx.session.gold);
    tracing::info!(?mode, ?outcome, reason = ?ctx.stop.reason(), "mode finished");

    ctx.console.print(&describe_outcome(&outcome)).await;
    ctx.console.print(&ctx.stats.report()).await;
    outcome
}

fn describe_outcome(outcome: &ModeOutcome) -> String {
    match outcome {
        ModeOutcome::TargetReached { level } => format!("🎉 목표 달성! +{level}"),
        ModeOutcome::SpecialKept { item } => format!("⭐ 특수 아이템 보관: {item}"),
        ModeOutcome::InsufficientGold(s) => format!(
            "💸 골드 부족: 필요 {}G / 보유 {}G (부족 {}G)",
            format_gold(s.required as i64),
            format_gold(s.remaining as i64),
            format_gold(s.shortage() as i64)
        ),
        ModeOutcome::DailyLimit => "📅 오늘 배틀 횟수를 모두 사용했습니다.".into(),
        ModeOutcome::GoldFloor { gold } => {
            format!("⚠️ 골드가 최소 기준 아래입니다 ({}G). 배틀 중단", format_gold(*gold as i64))
        }
        ModeOutcome::Stopped => "⏹️ 중지되었습니다.".into(),
    }
}

/// Interactive front end: menu, per-mode parameters and settings.
pub struct AgentEngine {
    config: AppConfig,
    caps: Capabilities,
    telemetry: Arc<TelemetryBridge>,
    game_data: Arc<GameDataStore>,
    persist: bool,
}

impl AgentEngine {
    pub fn new(
        config: AppConfig,
        caps: Capabilities,
        telemetry: Arc<TelemetryBridge>,
        game_data: Arc<GameDataStore>,
    ) -> Self {
        Self {
            config,
            caps,
            telemetry,
            game_data,
            persist: true,
        }
    }

    /// Keeps settings changes in memory only.
    pub fn without_persistence(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn save(&self) {
        if !self.persist {
            return;
        }
        if let Err(e) = config::save_config(&self.config) {
            tracing::error!(error = %e, "failed to save config");
        }
    }

    async fn print(&self, text: &str) {
        self.caps.console.print(text).await;
    }

    async fn ask(&self, question: &str) -> Option<String> {
        match self.caps.console.prompt(question).await {
            Ok(answer) => Some(answer),
            Err(e) => {
                tracing::error!(error = %e, "console read failed");
                None
            }
        }
    }

    pub async fn run_menu(&mut self) {
        if let Err(e) = self.caps.hotkey.start() {
            tracing::warn!(error = %e, "stop hotkey unavailable");
        }
        loop {
            self.print(
                "\n=== 카카오톡 검키우기 ===\n\
                 1. 강화 목표 달성\n\
                 2. 특수 검 뽑기\n\
                 3. 골드 채굴 (돈벌기)\n\
                 4. 자동 배틀 (역배)\n\
                 5. 내 프로필 분석\n\
                 6. 옵션 설정\n\
                 0. 종료\n",
            )
            .await;
            let Some(choice) = self.ask("선택: ").await else {
                return;
            };
            match choice.as_str() {
                "1" => self.start_enhance().await,
                "2" => self.start_mode(Mode::Special, self.config.special.target_level).await,
                "3" => self.start_mode(Mode::GoldMine, self.config.goldmine.target_level).await,
                "4" => self.start_battle().await,
                "5" => self.inspect_profile().await,
                "6" => self.settings().await,
                "0" | "" => {
                    self.print("프로그램을 종료합니다.").await;
                    return;
                }
                _ => self.print("잘못된 입력입니다.").await,
            }
        }
    }

    async fn start_enhance(&mut self) {
        let answer = self.ask("목표 강화 레벨 (+숫자): ").await.unwrap_or_default();
        let target: u8 = parse_or(answer.trim_start_matches('+'), 0);
        if !(1..=20).contains(&target) {
            self.print("잘못된 레벨입니다. (1-20)").await;
            return;
        }
        self.start_mode(Mode::Enhance, target).await;
    }

    async fn start_battle(&mut self) {
        let diff = self.config.battle.level_diff;
        self.print(&format!(
            "\n=== 자동 배틀 설정 ===\n현재 역배 레벨 차이: {diff} (내 레벨 +1 ~ +{diff} 상대와 대결)"
        ))
        .await;
        let answer = self.ask("역배 레벨 차이 (1-3, 엔터=유지): ").await.unwrap_or_default();
        let new_diff: u8 = parse_or(&answer, diff);
        if (1..=3).contains(&new_diff) && new_diff != diff {
            self.config.battle.level_diff = new_diff;
            self.save();
        }
        self.start_mode(Mode::Battle, 0).await;
    }

    /// Coordinate capture and start countdown. False when stopped.
    async fn prepare_window(&mut self) -> bool {
        let stop = StopCoordinator::new(
            self.caps.hotkey.clone(),
            Duration::from_millis(self.config.stop.poll_chunk_ms),
        );
        stop.start();
        let ready = self.countdown(&stop).await;
        let interrupted = !stop.is_running();
        stop.stop(StopReason::Finished);
        if interrupted {
            self.caps.overlay.hide_all();
            self.print("⏹️ 중지되었습니다.").await;
        }
        ready
    }

    async fn countdown(&mut self, stop: &StopCoordinator) -> bool {
        if !self.config.coords.lock_xy || !ChatLayout::from_coords(&self.config.coords).is_configured() {
            self.print("\n카카오톡 메시지 입력창에 마우스를 올려놓으세요...\n3초 후 자동으로 좌표를 저장합니다.")
                .await;
            if !stop.sleep(Duration::from_secs(3)).await {
                return false;
            }
            match self.caps.input.cursor_position() {
                Ok((x, y)) => {
                    self.config.coords.click_x = x;
                    self.config.coords.click_y = y;
                    self.save();
                    self.print(&format!("좌표 저장됨: ({x}, {y})")).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "cursor position unavailable");
                    self.print("❌ 마우스 좌표를 읽을 수 없습니다.").await;
                    return false;
                }
            }
        } else {
            let c = &self.config.coords;
            self.print(&format!("📍 저장된 좌표 사용: ({}, {})", c.click_x, c.click_y)).await;
        }

        self.print("⚠️  카카오톡 채팅창이 보이도록 배치하세요! (Ctrl+C 또는 마우스 좌상단: 중지)")
            .await;
        for remaining in (1..=5).rev() {
            self.caps
                .overlay
                .show_status(&format!("🎮 준비 중... {remaining}초"));
            if !stop.sleep(Duration::from_secs(1)).await {
                return false;
            }
        }
        self.caps.overlay.show_status("🚀 시작!");
        true
    }

    async fn ask_duration(&self) -> Option<Duration> {
        let answer = self.ask("몇 분간 진행할까요? (0 = 무제한): ").await.unwrap_or_default();
        let minutes: u64 = parse_or(&answer, 0);
        if minutes > 0 {
            self.print(&format!("⏱️ {minutes}분 후 자동 종료됩니다.")).await;
            Some(Duration::from_secs(minutes * 60))
        } else {
            self.print("⏱️ 무제한 모드 (수동 종료)").await;
            None
        }
    }

    fn context(&self, target: u8) -> ModeContext {
        let mut ctx = ModeContext::new(
            self.config.clone(),
            &self.caps,
            self.telemetry.clone(),
            self.game_data.clone(),
        )
        .with_ledger(CycleLedger::new());
        ctx.session.target_level = target;
        ctx
    }

    async fn start_mode(&mut self, mode: Mode, target: u8) {
        let limit = self.ask_duration().await;
        if !self.prepare_window().await {
            return;
        }
        self.print(&format!("\n=== {} 시작 ===", mode.label())).await;
        let mut ctx = self.context(target);
        run_mode(&mut ctx, mode, limit).await;
    }

    async fn inspect_profile(&mut self) {
        self.print("\n=== 내 프로필 분석 ===").await;
        if !self.prepare_window().await {
            return;
        }
        let mut ctx = self.context(0);
        ctx.stop.start();
        ctx.game_data.refresh().await;
        let report = modes::profile::inspect(&mut ctx).await;
        ctx.stop.stop(StopReason::Finished);
        self.caps.overlay.hide_all();
        self.print(&report).await;
    }

    async fn settings(&mut self) {
        loop {
            let c = &self.config;
            self.print(&format!(
                "\n=== 옵션 설정 ===\n\
                 1. 감속 시작 레벨: +{}\n\
                 2. 중간 속도: {:.1}초\n\
                 3. 고강 속도: {:.1}초\n\
                 4. 좌표 고정: {}\n\
                 5. 골드 채굴 목표: +{}\n\
                 6. 배틀 역배 레벨차: {}\n\
                 7. 배틀 쿨다운: {:.1}초\n\
                 8. 배틀 최소 골드: {}G\n\
                 9. 특수 검 목표: +{}\n\
                 0. 돌아가기",
                c.pacing.slowdown_level,
                c.pacing.mid_delay,
                c.pacing.high_delay,
                c.coords.lock_xy,
                c.goldmine.target_level,
                c.battle.level_diff,
                c.battle.cooldown,
                format_gold(c.battle.min_gold as i64),
                c.special.target_level,
            ))
            .await;
            let Some(choice) = self.ask("선택: ").await else {
                return;
            };
            match choice.as_str() {
                "1" => {
                    let v: u8 = parse_or(&self.ask("감속 시작 레벨 (1-20): ").await.unwrap_or_default(), 0);
                    if (1..=20).contains(&v) {
                        self.config.pacing.slowdown_level = v;
                    }
                }
                "2" => {
                    let v: f64 = parse_or(&self.ask("중간 속도 (초): ").await.unwrap_or_default(), 0.0);
                    if v > 0.0 {
                        self.config.pacing.mid_delay = v;
                    }
                }
                "3" => {
                    let v: f64 = parse_or(&self.ask("고강 속도 (초): ").await.unwrap_or_default(), 0.0);
                    if v > 0.0 {
                        self.config.pacing.high_delay = v;
                    }
                }
                "4" => {
                    self.config.coords.lock_xy = !self.config.coords.lock_xy;
                    self.print(&format!("좌표 고정: {}", self.config.coords.lock_xy)).await;
                }
                "5" => {
                    let v: u8 = parse_or(&self.ask("골드 채굴 목표 레벨 (1-20): ").await.unwrap_or_default(), 0);
                    if (1..=20).contains(&v) {
                        self.config.goldmine.target_level = v;
                    }
                }
                "6" => {
                    let v: u8 = parse_or(&self.ask("배틀 역배 레벨차 (1-3): ").await.unwrap_or_default(), 0);
                    if (1..=3).contains(&v) {
                        self.config.battle.level_diff = v;
                    }
                }
                "7" => {
                    let v: f64 = parse_or(&self.ask("배틀 쿨다운 (초): ").await.unwrap_or_default(), 0.0);
                    if v > 0.0 {
                        self.config.battle.cooldown = v;
                    }
                }
                "8" => {
                    let answer = self.ask("배틀 최소 골드: ").await.unwrap_or_default();
                    if let Ok(v) = answer.trim().replace(',', "").parse::<u64>() {
                        self.config.battle.min_gold = v;
                    }
                }
                "9" => {
                    let v: u8 = parse_or(&self.ask("특수 검 목표 레벨 (0=보관, 0-20): ").await.unwrap_or_default(), 255);
                    if v <= 20 {
                        self.config.special.target_level = v;
                    }
                }
                "0" | "" => {
                    self.save();
                    return;
                }
                _ => self.print("잘못된 입력입니다.").await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Harness, ScriptedConsole};

    #[tokio::test(start_paused = true)]
    async fn settings_change_is_kept_in_memory() {
        let harness = Harness::new("@A");
        let console = Arc::new(ScriptedConsole::new(&["6", "6", "3", "4", "0", "0"]));
        let mut caps = harness.capabilities();
        caps.console = console.clone();
        let mut engine = AgentEngine::new(
            AppConfig::default(),
            caps,
            harness.telemetry.clone(),
            harness.game_data.clone(),
        )
        .without_persistence();
        engine.run_menu().await;
        assert_eq!(engine.config().battle.level_diff, 3);
        assert!(engine.config().coords.lock_xy);
        assert!(console.output().contains("프로그램을 종료합니다."));
    }

    #[tokio::test(start_paused = true)]
    async fn profile_binds_handle_for_filtering() {
        let harness = Harness::new("@A");
        harness.fake.reply("/프로필", "● 이름: @A\n● 전적: 1승 2패\n● 보유 골드: 9,000 G\n● 보유 검: [+4] 목검");
        let mut ctx = harness.context(0);
        ctx.stop.start();
        ctx.begin_session().await;
        assert_eq!(ctx.session.handle(), "@A");
        assert_eq!(ctx.correlator.handle(), "@A");
        assert_eq!(ctx.session.item.level, 4);
        assert_eq!(ctx.session.gold, Some(9_000));
        assert_eq!(ctx.stats.start_gold, Some(9_000));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_save_point_sends_nothing() {
        let harness = Harness::new("@A");
        let mut ctx = harness.context(0);
        ctx.stop.start();
        harness.hotkey.press_after(Duration::from_millis(100));
        assert_eq!(ctx.exchange("/강화", Duration::ZERO).await, Exchange::Stopped);
        assert_eq!(harness.fake.count("/강화"), 0);
        assert_eq!(ctx.stop.reason(), Some(StopReason::Hotkey));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_honors_stop_hotkey() {
        let harness = Harness::new("@A");
        let mut engine = AgentEngine::new(
            Harness::config(),
            harness.capabilities(),
            harness.telemetry.clone(),
            harness.game_data.clone(),
        )
        .without_persistence();
        harness.hotkey.press_after(Duration::from_millis(1500));
        let begin = tokio::time::Instant::now();
        assert!(!engine.prepare_window().await);
        assert!(begin.elapsed() < Duration::from_secs(2));
        assert!(harness.console.output().contains("중지되었습니다"));
    }

    #[tokio::test(start_paused = true)]
    async fn configured_handle_survives_missing_profile() {
        let harness = Harness::new("@A");
        let mut ctx = harness.context(0);
        ctx.config.account.handle = Some("@A".into());
        ctx.config.correlation.empty_retries = 0;
        ctx.stop.start();
        ctx.begin_session().await;
        assert_eq!(ctx.session.handle(), "@A");
    }
}
