//! Interactive terminal front-end.
//!
//! Plain lines are submitted in the current mode; lines starting with `:`
//! are commands:
//!
//! | Command        | Effect                                            |
//! |----------------|---------------------------------------------------|
//! | `:mode [name]` | switch to `safety` / `dream` (toggle without arg) |
//! | `:listen`      | dictate one Korean utterance and submit it        |
//! | `:say <n>`     | read translation `n` aloud                        |
//! | `:share`       | print the share text of a dream result            |
//! | `:reset`       | back to Idle, stop speech                         |
//! | `:key [value]` | store a new API key (next line when omitted)      |
//! | `:status`      | show mode and request state                       |
//! | `:help`        | list commands                                     |
//! | `:quit`        | exit                                              |
//!
//! When a request fails because the key is missing or was rejected, the
//! next plain line is taken as the new key.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::llm::{DreamResult, GenerationMode, GenerationResult, SafetyOrderResult};
use crate::pipeline::{PipelineOrchestrator, RequestState, SubmitOutcome};
use crate::speech::SpeechOutcome;

const HELP_LISTEN: &str = "  :listen               음성으로 입력";
const HELP_SAY: &str = "  :say <번호>            번역 문장 읽어주기";

/// Command list.  Speech commands are listed only when the engine exists.
pub fn help_text(can_listen: bool, can_speak: bool) -> String {
    let mut lines = vec!["명령어:", "  :mode [safety|dream]  모드 전환"];
    if can_listen {
        lines.push(HELP_LISTEN);
    }
    if can_speak {
        lines.push(HELP_SAY);
    }
    lines.extend([
        "  :share                해몽 결과 공유 문구",
        "  :reset                초기화",
        "  :key [값]             API 키 입력",
        "  :status               현재 상태",
        "  :quit                 종료",
    ]);
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Command parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(String),
    /// `None` toggles between the two modes.
    Mode(Option<GenerationMode>),
    Listen,
    /// 1-based translation index.
    Say(usize),
    Share,
    Reset,
    /// `None` means "read the key from the next line".
    Key(Option<String>),
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

/// Parse one input line.
///
/// ```
/// use global_foreman::app::{parse_command, Command};
/// use global_foreman::llm::GenerationMode;
///
/// assert_eq!(parse_command(":mode dream"), Command::Mode(Some(GenerationMode::DreamInterpretation)));
/// assert_eq!(parse_command(":say 2"), Command::Say(2));
/// assert_eq!(parse_command("  철근 올려  "), Command::Submit("철근 올려".into()));
/// ```
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Command::Submit(line.to_string());
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default().to_ascii_lowercase();
    let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());

    match (name.as_str(), arg) {
        ("mode" | "m", None) => Command::Mode(None),
        ("mode" | "m", Some(a)) => match GenerationMode::from_name(a) {
            Some(mode) => Command::Mode(Some(mode)),
            None => Command::Unknown(line.to_string()),
        },
        ("listen" | "l", None) => Command::Listen,
        ("say" | "s", Some(a)) => match a.parse::<usize>() {
            Ok(n) if n >= 1 => Command::Say(n),
            _ => Command::Unknown(line.to_string()),
        },
        ("share", None) => Command::Share,
        ("reset" | "r", None) => Command::Reset,
        ("key", a) => Command::Key(a.map(str::to_string)),
        ("status", None) => Command::Status,
        ("help" | "h" | "?", None) => Command::Help,
        ("quit" | "q" | "exit", None) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

pub fn render_safety(r: &SafetyOrderResult) -> String {
    let mut out = format!("{} {}\n{}\n", r.safety_icon, r.title, r.refined_text);
    for (i, t) in r.translations.iter().enumerate() {
        out.push_str(&format!("\n{}. {} ({})\n   {}\n", i + 1, t.lang_name, t.lang, t.text));
        if !t.pronunciation.is_empty() {
            out.push_str(&format!("   [{}]\n", t.pronunciation));
        }
    }
    out
}

pub fn render_dream(r: &DreamResult) -> String {
    let numbers: Vec<String> = r.lucky_numbers.iter().map(|n| format!("{n:>2}")).collect();
    let mut out = format!(
        "🔮 {}\n{}\n\n행운의 번호: {}\n",
        r.display_title(),
        r.interpretation,
        numbers.join("  ")
    );
    if !r.image_prompt.is_empty() {
        out.push_str(&format!("이미지: {}\n", r.image_prompt));
    }
    out
}

pub fn render_result(result: &GenerationResult) -> String {
    match result {
        GenerationResult::SafetyOrder(r) => render_safety(r),
        GenerationResult::DreamInterpretation(r) => render_dream(r),
    }
}

/// Text for the current request state.
pub fn render_state(state: &RequestState) -> String {
    match state {
        RequestState::Idle => "대기 중\n".into(),
        RequestState::Loading => "처리 중…\n".into(),
        RequestState::Succeeded(result) => render_result(result),
        RequestState::Failed(detail) if detail.credential_required => {
            format!("{}\nAPI 키를 입력하세요:\n", detail.message)
        }
        RequestState::Failed(detail) => format!("{}\n", detail.message),
    }
}

// ---------------------------------------------------------------------------
// TerminalApp
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct TerminalApp {
    orchestrator: PipelineOrchestrator,
    awaiting_key: bool,
}

impl TerminalApp {
    pub fn new(orchestrator: PipelineOrchestrator) -> Self {
        Self {
            orchestrator,
            awaiting_key: false,
        }
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.orchestrator
    }

    /// Read stdin line by line until `:quit` or end of input.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut out = std::io::stdout();
        writeln!(out, "[{}] 입력하세요 (:help)", self.orchestrator.mode().label())?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            write!(out, "> ")?;
            out.flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            if self.handle_line(&line, &mut out).await? == Flow::Quit {
                break;
            }
        }
        self.orchestrator.reset();
        Ok(())
    }

    /// Handle one input line, writing any output to `out`.
    pub async fn handle_line(&mut self, line: &str, out: &mut impl Write) -> std::io::Result<Flow> {
        let command = parse_command(line);

        if self.awaiting_key {
            match command {
                Command::Submit(value) => {
                    self.store_key(&value, out)?;
                    return Ok(Flow::Continue);
                }
                Command::Empty => return Ok(Flow::Continue),
                _ => self.awaiting_key = false,
            }
        }

        match command {
            Command::Empty => {}
            Command::Submit(text) => {
                let outcome = self.orchestrator.submit(&text).await;
                self.report(outcome, out)?;
            }
            Command::Mode(mode) => {
                let next = mode.unwrap_or(match self.orchestrator.mode() {
                    GenerationMode::SafetyOrder => GenerationMode::DreamInterpretation,
                    GenerationMode::DreamInterpretation => GenerationMode::SafetyOrder,
                });
                self.orchestrator.reset();
                self.orchestrator.set_mode(next);
                writeln!(out, "[{}] 모드", next.label())?;
            }
            Command::Listen => {
                writeln!(out, "듣는 중…")?;
                match self.orchestrator.dictate().await {
                    Some(outcome) => {
                        writeln!(out, "» {}", self.orchestrator.transcript())?;
                        self.report(outcome, out)?;
                    }
                    None => self.write_warning(out, "인식된 음성이 없습니다.")?,
                }
            }
            Command::Say(_) if !self.orchestrator.can_speak() => {
                writeln!(out, "⚠ 이 환경은 음성 출력을 지원하지 않습니다.")?;
            }
            Command::Say(n) => {
                let available = matches!(
                    self.orchestrator.request_state(),
                    RequestState::Succeeded(GenerationResult::SafetyOrder(r)) if r.translations.len() >= n
                );
                if !available {
                    writeln!(out, "⚠ 읽을 번역이 없습니다.")?;
                } else {
                    match self.orchestrator.speak_translation(n - 1).await {
                        Some(SpeechOutcome::Completed) => {}
                        Some(SpeechOutcome::Interrupted) => writeln!(out, "(중단됨)")?,
                        None => self.write_warning(out, "음성 출력에 실패했습니다.")?,
                    }
                }
            }
            Command::Share => match self.orchestrator.request_state() {
                RequestState::Succeeded(GenerationResult::DreamInterpretation(r)) => {
                    writeln!(out, "{}", r.share_text())?;
                }
                _ => writeln!(out, "공유할 해몽 결과가 없습니다.")?,
            },
            Command::Reset => {
                self.orchestrator.reset();
                writeln!(out, "초기화되었습니다.")?;
            }
            Command::Key(Some(value)) => self.store_key(&value, out)?,
            Command::Key(None) => {
                self.awaiting_key = true;
                writeln!(out, "API 키를 입력하세요:")?;
            }
            Command::Status => {
                let state = self.orchestrator.request_state();
                let key = match self.orchestrator.credentials().current() {
                    Some(k) => k.masked(),
                    None => "없음".into(),
                };
                writeln!(
                    out,
                    "[{}] {} (API 키: {key})",
                    self.orchestrator.mode().label(),
                    state.label()
                )?;
            }
            Command::Help => writeln!(
                out,
                "{}",
                help_text(self.orchestrator.can_listen(), self.orchestrator.can_speak())
            )?,
            Command::Quit => return Ok(Flow::Quit),
            Command::Unknown(raw) => writeln!(out, "알 수 없는 명령: {raw} (:help)")?,
        }
        Ok(Flow::Continue)
    }

    fn report(&mut self, outcome: SubmitOutcome, out: &mut impl Write) -> std::io::Result<()> {
        match outcome {
            SubmitOutcome::Ignored => {}
            SubmitOutcome::Rejected => writeln!(out, "이전 요청을 처리 중입니다.")?,
            SubmitOutcome::Discarded => writeln!(out, "요청이 취소되었습니다.")?,
            SubmitOutcome::Applied => {
                let state = self.orchestrator.request_state();
                if state.error().is_some_and(|e| e.credential_required) {
                    self.awaiting_key = true;
                }
                write!(out, "{}", render_state(&state))?;
            }
        }
        Ok(())
    }

    fn store_key(&mut self, value: &str, out: &mut impl Write) -> std::io::Result<()> {
        match self.orchestrator.set_credential(value) {
            Ok(()) => {
                self.awaiting_key = false;
                writeln!(out, "API 키가 저장되었습니다. 다시 입력해 주세요.")
            }
            Err(e) => writeln!(out, "API 키 저장 실패: {e}"),
        }
    }

    /// Prefer the orchestrator's speech warning over the generic fallback.
    fn write_warning(&self, out: &mut impl Write, fallback: &str) -> std::io::Result<()> {
        let warning = self
            .orchestrator
            .speech_warning()
            .unwrap_or_else(|| fallback.to_string());
        writeln!(out, "⚠ {warning}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKey, CredentialVault, MemoryCredentialStore};
    use crate::llm::{CompletionClient, CompletionError, TranslationEntry};
    use crate::pipeline::new_shared_state;
    use crate::speech::{MockSynthesizer, SpeechOutput, SpeechSynthesizer, VoiceSettings};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Rejects any key except `good-key`.
    struct KeyCheckingClient;

    #[async_trait]
    impl CompletionClient for KeyCheckingClient {
        async fn complete(&self, _prompt: &str, key: &ApiKey) -> Result<String, CompletionError> {
            if key.expose() == "good-key" {
                Ok(r#"{"title":"돼지꿈","interpretation":"재물운","lucky_numbers":[1,2,3,4,5,6],"image_prompt":""}"#.into())
            } else {
                Err(CompletionError::InvalidCredentials {
                    status: 400,
                    message: "API key not valid".into(),
                })
            }
        }
    }

    fn make_app(key: Option<&str>) -> TerminalApp {
        let store = match key {
            Some(k) => MemoryCredentialStore::with_key(k),
            None => MemoryCredentialStore::default(),
        };
        let orc = PipelineOrchestrator::new(
            new_shared_state(GenerationMode::DreamInterpretation),
            Arc::new(KeyCheckingClient),
            CredentialVault::open(Box::new(store)),
        );
        TerminalApp::new(orc)
    }

    async fn feed(app: &mut TerminalApp, line: &str) -> String {
        let mut buf = Vec::new();
        app.handle_line(line, &mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command(""), Command::Empty);
        assert_eq!(parse_command(":mode"), Command::Mode(None));
        assert_eq!(parse_command(":MODE safety"), Command::Mode(Some(GenerationMode::SafetyOrder)));
        assert_eq!(parse_command(":listen"), Command::Listen);
        assert_eq!(parse_command(":key abc "), Command::Key(Some("abc".into())));
        assert_eq!(parse_command(":key"), Command::Key(None));
        assert_eq!(parse_command(":q"), Command::Quit);
        assert_eq!(parse_command(":say 0"), Command::Unknown(":say 0".into()));
        assert_eq!(parse_command(":mode poker"), Command::Unknown(":mode poker".into()));
    }

    #[test]
    fn renders_safety_result() {
        let text = render_safety(&SafetyOrderResult {
            title: "양중 작업".into(),
            safety_icon: "⚠️".into(),
            refined_text: "철근을 올리세요.".into(),
            translations: vec![TranslationEntry {
                lang: "en-US".into(),
                lang_name: "영어".into(),
                text: "Lift the rebar.".into(),
                pronunciation: String::new(),
            }],
        });
        assert!(text.starts_with("⚠️ 양중 작업\n철근을 올리세요.\n"));
        assert!(text.contains("1. 영어 (en-US)\n   Lift the rebar.\n"));
        assert!(!text.contains('['));
    }

    #[test]
    fn renders_dream_with_default_title() {
        let text = render_dream(&DreamResult {
            title: String::new(),
            interpretation: "길몽".into(),
            lucky_numbers: vec![3, 17],
            image_prompt: String::new(),
        });
        assert!(text.starts_with("🔮 운명의 계시\n길몽\n"));
        assert!(text.contains("행운의 번호:  3  17"));
        assert!(!text.contains("이미지"));
    }

    #[tokio::test]
    async fn rejected_key_prompts_for_new_one_and_recovers() {
        let mut app = make_app(Some("bad-key"));

        let out = feed(&mut app, "꿈에 돼지").await;
        assert!(out.contains("해몽 실패: API Error 400: API key not valid"));
        assert!(out.contains("API 키를 입력하세요"));

        let out = feed(&mut app, "good-key").await;
        assert!(out.contains("API 키가 저장되었습니다"));

        let out = feed(&mut app, "꿈에 돼지").await;
        assert!(out.contains("🔮 돼지꿈"));

        let out = feed(&mut app, ":share").await;
        assert!(out.contains("행운의 번호: 1, 2, 3, 4, 5, 6"));
    }

    #[tokio::test]
    async fn mode_toggle_and_status() {
        let mut app = make_app(None);
        assert_eq!(feed(&mut app, ":mode").await, "[통역] 모드\n");
        assert_eq!(feed(&mut app, ":status").await, "[통역] Idle (API 키: 없음)\n");
    }

    #[tokio::test]
    async fn speech_commands_degrade_to_warnings() {
        let mut app = make_app(Some("good-key"));
        assert!(feed(&mut app, ":listen").await.contains("⚠ 이 환경은 음성 인식을 지원하지 않습니다."));
        assert!(feed(&mut app, ":say 1").await.contains("⚠ 이 환경은 음성 출력을 지원하지 않습니다."));
    }

    #[tokio::test]
    async fn speech_commands_are_listed_only_with_an_engine() {
        let mut app = make_app(None);
        let help = feed(&mut app, ":help").await;
        assert!(help.contains(":mode"));
        assert!(!help.contains(":listen"));
        assert!(!help.contains(":say"));

        let synth = Arc::new(MockSynthesizer::new(vec![]));
        let orc = PipelineOrchestrator::new(
            new_shared_state(GenerationMode::SafetyOrder),
            Arc::new(KeyCheckingClient),
            CredentialVault::open(Box::new(MemoryCredentialStore::default())),
        )
        .with_speech_output(SpeechOutput::new(
            Some(synth as Arc<dyn SpeechSynthesizer>),
            VoiceSettings::default(),
        ));
        let mut app = TerminalApp::new(orc);
        let help = feed(&mut app, ":help").await;
        assert!(help.contains(":say"));
        assert!(!help.contains(":listen"));
        assert!(feed(&mut app, ":say 1").await.contains("⚠ 읽을 번역이 없습니다."));
    }

    #[tokio::test]
    async fn quit_ends_the_loop() {
        let mut app = make_app(None);
        let mut buf = Vec::new();
        assert_eq!(app.handle_line(":quit", &mut buf).await.unwrap(), Flow::Quit);
    }
}
