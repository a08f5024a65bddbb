//! Interactive menu: one key press selects a scenario.

use std::collections::VecDeque;

use anyhow::Result;
use colored::Colorize;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;

use crate::scenarios::{ScenarioKey, ScenarioRunner};

const RULE: &str = "--------------------------------------------------------------------- ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
    Other,
}

/// What a key press asks the shell to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuAction {
    Run(ScenarioKey),
    Exit,
    Redisplay,
}

impl MenuAction {
    pub fn from_key(key: Key) -> Self {
        match key {
            Key::Escape | Key::Char('q') | Key::Char('Q') => MenuAction::Exit,
            Key::Char(c) => ScenarioKey::from_char(c)
                .map(MenuAction::Run)
                .unwrap_or(MenuAction::Redisplay),
            Key::Other => MenuAction::Redisplay,
        }
    }
}

#[async_trait::async_trait]
pub trait KeySource: Send {
    /// Next key press; `None` once input is exhausted.
    async fn next_key(&mut self) -> Result<Option<Key>>;
}

/// Reads single key presses from the terminal in raw mode.
pub struct TerminalKeys;

fn read_key_blocking() -> Result<Key> {
    terminal::enable_raw_mode()?;
    let key = loop {
        match event::read() {
            Ok(Event::Key(k)) if k.kind == KeyEventKind::Press => {
                break Ok(match k.code {
                    KeyCode::Char('c') if k.modifiers.contains(KeyModifiers::CONTROL) => Key::Escape,
                    KeyCode::Char(c) => Key::Char(c),
                    KeyCode::Esc => Key::Escape,
                    _ => Key::Other,
                });
            }
            Ok(_) => continue,
            Err(e) => break Err(e),
        }
    };
    terminal::disable_raw_mode()?;
    Ok(key?)
}

#[async_trait::async_trait]
impl KeySource for TerminalKeys {
    async fn next_key(&mut self) -> Result<Option<Key>> {
        let key = tokio::task::spawn_blocking(read_key_blocking).await??;
        Ok(Some(key))
    }
}

/// Keys from piped stdin, one line at a time; whitespace is skipped.
pub struct LineKeys {
    lines: tokio::io::Lines<tokio::io::BufReader<tokio::io::Stdin>>,
    pending: VecDeque<Key>,
}

impl LineKeys {
    pub fn stdin() -> Self {
        use tokio::io::AsyncBufReadExt;
        Self {
            lines: tokio::io::BufReader::new(tokio::io::stdin()).lines(),
            pending: VecDeque::new(),
        }
    }
}

#[async_trait::async_trait]
impl KeySource for LineKeys {
    async fn next_key(&mut self) -> Result<Option<Key>> {
        while self.pending.is_empty() {
            match self.lines.next_line().await? {
                Some(line) => {
                    let keys = ScriptedKeys::from_script(line.trim()).keys;
                    self.pending
                        .extend(keys.into_iter().filter(|k| *k != Key::Char(' ')));
                }
                None => return Ok(None),
            }
        }
        Ok(self.pending.pop_front())
    }
}

/// Replays a fixed key sequence.
pub struct ScriptedKeys {
    keys: VecDeque<Key>,
}

impl ScriptedKeys {
    pub fn new(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    pub fn from_script(script: &str) -> Self {
        Self::new(script.chars().map(|c| match c {
            '\u{1b}' => Key::Escape,
            c if c.is_control() => Key::Other,
            c => Key::Char(c),
        }))
    }
}

#[async_trait::async_trait]
impl KeySource for ScriptedKeys {
    async fn next_key(&mut self) -> Result<Option<Key>> {
        Ok(self.keys.pop_front())
    }
}

pub fn menu_lines(runner: &ScenarioRunner) -> Vec<String> {
    let mut lines = vec![
        RULE.to_string(),
        format!("Endpoint: {}", runner.endpoint()),
        RULE.to_string(),
        String::new(),
        "Press for demo scenario:\n".to_string(),
    ];
    lines.extend(runner.catalog().iter().map(|d| d.menu_line()));
    lines.push(RULE.to_string());
    lines.push("Press Esc or q to exit".to_string());
    lines
}

fn print_menu(runner: &ScenarioRunner) {
    for line in menu_lines(runner) {
        println!("{}", line);
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ShellSummary {
    pub scenarios_run: Vec<ScenarioKey>,
    pub scenarios_failed: usize,
}

/// Runs the menu loop until exit or until the key source is exhausted.
/// A failing scenario is reported and the menu is shown again.
pub async fn run_shell(runner: &mut ScenarioRunner, keys: &mut dyn KeySource) -> Result<ShellSummary> {
    let mut summary = ShellSummary::default();
    print_menu(runner);
    while let Some(key) = keys.next_key().await? {
        match MenuAction::from_key(key) {
            MenuAction::Exit => {
                println!("Exiting...");
                break;
            }
            MenuAction::Redisplay => {
                println!("Select choice");
            }
            MenuAction::Run(scenario) => {
                summary.scenarios_run.push(scenario);
                if let Err(e) = runner.run(scenario).await {
                    summary.scenarios_failed += 1;
                    tracing::error!(scenario = scenario.number(), error = %e, "scenario failed");
                    println!("{}", format!("Error: {:#}", e).red());
                }
            }
        }
        print_menu(runner);
    }
    Ok(summary)
}
