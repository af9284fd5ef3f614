//! In-memory messenger, hotkey, console and telemetry sink for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::agent_engine::engine::{Capabilities, ModeContext};
use crate::agent_engine::loop_control::StopCoordinator;
use crate::config::AppConfig;
use crate::errors::{AgentError, AgentResult};
use crate::executor::input::InputDriver;
use crate::executor::safety::Hotkey;
use crate::executor::text_input::Clipboard;
use crate::game::data::{GameData, GameDataSource, GameDataStore};
use crate::telemetry::{TelemetryBridge, TelemetryEvent, TelemetrySink};
use crate::ui::console::Console;
use crate::ui::overlay::NoOverlay;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InputEvent {
    Click(i32, i32),
    SelectAll,
    Copy,
    Paste(String),
    Clear,
    Enter,
}

#[derive(Default)]
struct Chat {
    lines: Vec<(Instant, String)>,
    input: String,
    clipboard: String,
    events: Vec<InputEvent>,
    submitted: Vec<String>,
    replies: HashMap<String, VecDeque<String>>,
    followups: HashMap<String, VecDeque<(Duration, String)>>,
    speaker: Option<String>,
    cursor: (i32, i32),
    clipboard_fails: bool,
}

impl Chat {
    fn push_now(&mut self, line: String) {
        self.lines.push((Instant::now(), line));
    }

    fn visible(&self) -> String {
        let now = Instant::now();
        let mut shown: Vec<&(Instant, String)> = self.lines.iter().filter(|(at, _)| *at <= now).collect();
        shown.sort_by_key(|(at, _)| *at);
        shown.iter().map(|(_, l)| l.as_str()).collect::<Vec<_>>().join("\n")
    }

    fn submit(&mut self) {
        let text = std::mem::take(&mut self.input).trim().to_string();
        if text.is_empty() {
            return;
        }
        for line in text.lines() {
            let echo = match &self.speaker {
                Some(name) => format!("[{name}] {line}"),
                None => line.to_string(),
            };
            self.push_now(echo);
        }
        let key = text.lines().next().unwrap_or_default().to_string();
        if let Some(reply) = self.replies.get_mut(&key).and_then(VecDeque::pop_front) {
            for line in reply.lines() {
                self.push_now(line.to_string());
            }
        }
        if let Some((delay, later)) = self.followups.get_mut(&key).and_then(VecDeque::pop_front) {
            let at = Instant::now() + delay;
            for line in later.lines() {
                self.lines.push((at, line.to_string()));
            }
        }
        self.submitted.push(text);
    }
}

/// A chat window driven through the same primitives as the desktop backend.
/// Scripted replies are keyed by the first line of the submitted message.
pub(crate) struct FakeMessenger {
    chat: Mutex<Chat>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self {
            chat: Mutex::new(Chat {
                cursor: (400, 300),
                ..Chat::default()
            }),
        }
    }

    /// Echo lines get a "[name] " prefix the way the desktop client shows them.
    pub fn with_speaker(self, name: &str) -> Self {
        self.chat.lock().unwrap().speaker = Some(name.to_string());
        self
    }

    pub fn inject(&self, text: &str) {
        let mut chat = self.chat.lock().unwrap();
        for line in text.lines() {
            chat.push_now(line.to_string());
        }
    }

    pub fn inject_after(&self, delay: Duration, text: &str) {
        let at = Instant::now() + delay;
        let mut chat = self.chat.lock().unwrap();
        for line in text.lines() {
            chat.lines.push((at, line.to_string()));
        }
    }

    pub fn reply(&self, cmd: &str, text: &str) {
        self.chat
            .lock()
            .unwrap()
            .replies
            .entry(cmd.to_string())
            .or_default()
            .push_back(text.to_string());
    }

    /// Text shown `delay` after the next submission of `cmd`.
    pub fn reply_later(&self, cmd: &str, delay: Duration, text: &str) {
        self.chat
            .lock()
            .unwrap()
            .followups
            .entry(cmd.to_string())
            .or_default()
            .push_back((delay, text.to_string()));
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.chat.lock().unwrap().events.clone()
    }

    pub fn submitted(&self) -> Vec<String> {
        self.chat.lock().unwrap().submitted.clone()
    }

    /// Submitted messages whose first line is `cmd`.
    pub fn count(&self, cmd: &str) -> usize {
        self.submitted()
            .iter()
            .filter(|s| s.lines().next() == Some(cmd))
            .count()
    }

    pub fn set_cursor(&self, x: i32, y: i32) {
        self.chat.lock().unwrap().cursor = (x, y);
    }

    pub fn fail_clipboard(&self, fail: bool) {
        self.chat.lock().unwrap().clipboard_fails = fail;
    }

    fn record(&self, event: InputEvent) -> std::sync::MutexGuard<'_, Chat> {
        let mut chat = self.chat.lock().unwrap();
        chat.events.push(event);
        chat
    }
}

impl InputDriver for FakeMessenger {
    fn click(&self, x: i32, y: i32) -> AgentResult<()> {
        drop(self.record(InputEvent::Click(x, y)));
        Ok(())
    }

    fn select_all(&self) -> AgentResult<()> {
        drop(self.record(InputEvent::SelectAll));
        Ok(())
    }

    fn copy_selection(&self) -> AgentResult<()> {
        let mut chat = self.record(InputEvent::Copy);
        chat.clipboard = chat.visible();
        Ok(())
    }

    fn paste(&self) -> AgentResult<()> {
        let mut chat = self.chat.lock().unwrap();
        let text = chat.clipboard.clone();
        chat.events.push(InputEvent::Paste(text.clone()));
        chat.input.push_str(&text);
        Ok(())
    }

    fn clear_input(&self) -> AgentResult<()> {
        self.record(InputEvent::Clear).input.clear();
        Ok(())
    }

    fn press_enter(&self) -> AgentResult<()> {
        let mut chat = self.record(InputEvent::Enter);
        if chat.input.ends_with('\n') {
            chat.submit();
        } else {
            chat.input.push('\n');
        }
        Ok(())
    }

    fn cursor_position(&self) -> AgentResult<(i32, i32)> {
        Ok(self.chat.lock().unwrap().cursor)
    }
}

impl Clipboard for FakeMessenger {
    fn read(&self) -> AgentResult<String> {
        let chat = self.chat.lock().unwrap();
        if chat.clipboard_fails {
            return Err(AgentError::Clipboard("clipboard busy".into()));
        }
        Ok(chat.clipboard.clone())
    }

    fn write(&self, text: &str) -> AgentResult<()> {
        self.chat.lock().unwrap().clipboard = text.to_string();
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct ManualHotkey {
    pressed: Arc<AtomicBool>,
}

impl ManualHotkey {
    pub fn press(&self) {
        self.pressed.store(true, Ordering::SeqCst);
    }

    pub fn press_after(&self, delay: Duration) {
        let pressed = self.pressed.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pressed.store(true, Ordering::SeqCst);
        });
    }
}

impl Hotkey for ManualHotkey {
    fn start(&self) -> AgentResult<()> {
        Ok(())
    }

    fn poll_stop(&self) -> bool {
        self.pressed.swap(false, Ordering::SeqCst)
    }
}

pub(crate) fn stop_coordinator(hotkey: Arc<ManualHotkey>) -> StopCoordinator {
    StopCoordinator::new(hotkey, Duration::from_millis(200))
}

#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
    flushes: Arc<AtomicUsize>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn record(&mut self, event: TelemetryEvent) -> AgentResult<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn flush(&mut self) -> AgentResult<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Answers prompts from a script; an exhausted script reads as end of input.
#[derive(Default)]
pub(crate) struct ScriptedConsole {
    answers: Mutex<VecDeque<String>>,
    output: Mutex<String>,
}

impl ScriptedConsole {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            output: Mutex::new(String::new()),
        }
    }

    pub fn output(&self) -> String {
        self.output.lock().unwrap().clone()
    }
}

#[async_trait]
impl Console for ScriptedConsole {
    async fn prompt(&self, question: &str) -> AgentResult<String> {
        self.output.lock().unwrap().push_str(question);
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn print(&self, text: &str) {
        let mut out = self.output.lock().unwrap();
        out.push_str(text);
        out.push('\n');
    }
}

struct OfflineSource;

#[async_trait]
impl GameDataSource for OfflineSource {
    async fn fetch(&self) -> AgentResult<GameData> {
        Err(AgentError::GameData("offline".into()))
    }
}

/// Everything a mode run needs, wired to in-memory fakes.
pub(crate) struct Harness {
    pub handle: String,
    pub fake: Arc<FakeMessenger>,
    pub hotkey: Arc<ManualHotkey>,
    pub console: Arc<ScriptedConsole>,
    pub sink: RecordingSink,
    pub telemetry: Arc<TelemetryBridge>,
    pub game_data: Arc<GameDataStore>,
}

impl Harness {
    /// Must be called inside a tokio runtime.
    pub fn new(handle: &str) -> Self {
        let sink = RecordingSink::default();
        Self {
            handle: handle.to_string(),
            fake: Arc::new(FakeMessenger::new()),
            hotkey: Arc::new(ManualHotkey::default()),
            console: Arc::new(ScriptedConsole::default()),
            telemetry: Arc::new(TelemetryBridge::spawn(Box::new(sink.clone()))),
            sink,
            game_data: Arc::new(GameDataStore::new(Arc::new(OfflineSource), Duration::from_secs(300))),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            input: self.fake.clone(),
            clipboard: self.fake.clone(),
            hotkey: self.hotkey.clone(),
            overlay: Arc::new(NoOverlay),
            console: self.console.clone(),
        }
    }

    pub fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.coords.click_x = 100;
        config.coords.click_y = 500;
        config.coords.lock_xy = true;
        config
    }

    pub fn context(&self, target: u8) -> ModeContext {
        let mut ctx = ModeContext::new(
            Self::config(),
            &self.capabilities(),
            self.telemetry.clone(),
            self.game_data.clone(),
        );
        ctx.session.target_level = target;
        ctx
    }

    /// Scripts the next `/프로필` answer for our handle.
    pub fn profile(&self, level: u8, sword: &str, gold: u64) {
        self.fake.reply(
            "/프로필",
            &format!(
                "● 이름: {}\n● 전적: 0승 0패\n● 보유 골드: {} G\n● 보유 검: [+{level}] {sword}",
                self.handle,
                crate::game::types::format_gold(gold as i64)
            ),
        );
    }

    /// Drains the telemetry worker. Every context must be dropped first.
    pub async fn shutdown(self) -> RecordingSink {
        if let Ok(bridge) = Arc::try_unwrap(self.telemetry) {
            bridge.shutdown().await;
        }
        self.sink
    }

    /// Scripts a reply addressed to us.
    pub fn says(&self, cmd: &str, body: &str) {
        self.fake.reply(cmd, &format!("{} {body}", self.handle));
    }
}
