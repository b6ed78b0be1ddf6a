// パス: src/repl/console.rs
// 役割: 対話入力の読み取りループと行編集・入力履歴
// 意図: 入力元をトレイトで抽象化し、端末なしでもループを検証できるようにする
// 関連ファイル: src/repl/mod.rs, src/testbench.rs, src/bin/cltb.rs

use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tracing::warn;

use crate::testbench::{Outcome, Testbench, PROMPT};

/// 履歴ファイルの場所を上書きする環境変数。
pub const HISTORY_ENV: &str = "CLTB_HISTORY_FILE";

/// 1 回の読み取り結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    Line(String),
    Eof,
    Interrupted,
}

/// 対話入力の供給元。
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadResult>;
    fn add_history(&mut self, entry: &str);
    fn save_history(&mut self) -> io::Result<()>;
}

fn to_io(err: ReadlineError) -> io::Error {
    match err {
        ReadlineError::Io(err) => err,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}

/// 行編集と履歴の呼び出しができる端末の供給元。
pub struct EditorLines {
    editor: Editor<(), DefaultHistory>,
    path: Option<PathBuf>,
}

impl EditorLines {
    /// 既定の履歴ファイルを読み込んで作る。
    pub fn new() -> io::Result<Self> {
        Self::with_history(history_path())
    }

    /// 指定した履歴ファイルを使う。まだ無いファイルは空の履歴として扱う。
    pub fn with_history(path: Option<PathBuf>) -> io::Result<Self> {
        let mut editor = Editor::new().map_err(to_io)?;
        if let Some(path) = &path {
            if let Err(err) = editor.load_history(path) {
                let not_found = matches!(&err, ReadlineError::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound);
                if !not_found {
                    warn!(error = %err, path = %path.display(), "failed to load history");
                }
            }
        }
        Ok(Self { editor, path })
    }

    /// 現在の履歴（古い順）。
    pub fn history(&self) -> Vec<String> {
        self.editor.history().iter().cloned().collect()
    }
}

impl LineSource for EditorLines {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadResult> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(ReadResult::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(ReadResult::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadResult::Eof),
            Err(err) => Err(to_io(err)),
        }
    }

    fn add_history(&mut self, entry: &str) {
        if let Err(err) = self.editor.add_history_entry(entry.trim()) {
            warn!(error = %err, "failed to add history entry");
        }
    }

    fn save_history(&mut self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.editor.save_history(path).map_err(to_io)
    }
}

/// 入力が尽きるか `quit` まで 1 行ずつ実行する。
pub fn run_interactive_with<S: LineSource>(bench: &mut Testbench, source: &mut S) -> Outcome {
    let outcome = loop {
        match source.read_line(PROMPT) {
            Ok(ReadResult::Line(line)) => {
                source.add_history(&line);
                if bench.run_line(&line) == Outcome::Quit {
                    break Outcome::Quit;
                }
            }
            Ok(ReadResult::Eof) => break Outcome::Good,
            Ok(ReadResult::Interrupted) => continue,
            Err(err) => {
                warn!(error = %err, "input failed");
                break Outcome::Fail;
            }
        }
    };
    if let Err(err) = source.save_history() {
        warn!(error = %err, "failed to save history");
    }
    outcome
}

/// 端末で対話ループを動かす。
pub fn run_interactive(bench: &mut Testbench) -> Outcome {
    match EditorLines::new() {
        Ok(mut source) => run_interactive_with(bench, &mut source),
        Err(err) => {
            warn!(error = %err, "failed to start line editor");
            Outcome::Fail
        }
    }
}

/// 履歴ファイルの場所。環境変数が最優先で、なければホームの `.cltb_history`。
fn history_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(HISTORY_ENV) {
        return Some(PathBuf::from(path));
    }
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".cltb_history"))
}
