// パス: src/testbench.rs
// 役割: 1 つの対話セッションの状態（環境・ドライバ・オプション・出力先）を束ねる
// 意図: グローバル状態を持たず、複数セッションを同一プロセスで独立に動かせるようにする
// 関連ファイル: src/repl/cmd.rs, src/evaluator/mod.rs, src/diagnostics.rs
//! テストベンチセッション
//!
//! `Testbench::run_line` が 1 行の実行に対する唯一の捕捉点となり、
//! どの種類のエラーも 1 行の診断（と任意のキャレット行）に変換して `Outcome::Fail` を返す。

use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

use tracing::info;

use crate::diagnostics::caret_line;
use crate::driver::{BuiltinLoader, Driver, DriverLoader};
use crate::env::Environment;
use crate::errors::{CommandError, CommandResult, ErrorKind, Span};
use crate::fileio::{FileIo, ImageCodec, RasterCodec, StdFileIo};
use crate::object::ObjectRef;

/// 対話プロンプト。キャレット位置の補正にも使う。
pub const PROMPT: &str = "cltb  > ";

/// 1 行の実行結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 続行。
    Good,
    /// エラーを報告済み。続行する。
    Fail,
    /// 読み込みループを終了する。
    Quit,
}

/// `set` で切り替えるセッションオプション。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// 補足メッセージを表示する。
    pub verbose: bool,
    /// エラー位置にキャレットを表示する。
    pub caret: bool,
    /// スクリプト実行時に各行を表示する。
    pub echo: bool,
    /// ドライバ操作の完了を待つ。
    pub block: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            verbose: true,
            caret: true,
            echo: false,
            block: true,
        }
    }
}

/// 1 つのセッション。
///
/// フィールドは宣言順に破棄されるため、環境内のオブジェクトはドライバより先に解放される。
pub struct Testbench {
    pub(crate) env: Environment,
    /// 非同期書き込みの完了まで生かしておく一時オブジェクト。
    pub(crate) in_flight: Vec<ObjectRef>,
    pub(crate) driver: Option<Box<dyn Driver>>,
    pub(crate) options: Options,
    pub(crate) script_depth: usize,
    pub(crate) out: Box<dyn Write>,
    pub(crate) err: Box<dyn Write>,
    pub(crate) files: Box<dyn FileIo>,
    pub(crate) codec: Box<dyn ImageCodec>,
    pub(crate) loader: Box<dyn DriverLoader>,
}

impl Default for Testbench {
    fn default() -> Self {
        Self::new()
    }
}

impl Testbench {
    /// 標準出力・標準エラー・実ファイルシステムを使うセッション。ドライバは未読み込み。
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
            in_flight: Vec::new(),
            driver: None,
            options: Options::default(),
            script_depth: 0,
            out: Box::new(io::stdout()),
            err: Box::new(io::stderr()),
            files: Box::new(StdFileIo),
            codec: Box::new(RasterCodec),
            loader: Box::new(BuiltinLoader),
        }
    }

    pub fn with_output(mut self, out: impl Write + 'static, err: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self.err = Box::new(err);
        self
    }

    pub fn with_file_io(mut self, files: impl FileIo + 'static) -> Self {
        self.files = Box::new(files);
        self
    }

    pub fn with_codec(mut self, codec: impl ImageCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    pub fn with_loader(mut self, loader: impl DriverLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// ドライバを差し替える。無効になるドライバ所有オブジェクトを外し、その数を返す。
    pub fn set_driver(&mut self, mut driver: Box<dyn Driver>) -> usize {
        let cleared = self.invalidate_driver_objects();
        driver.set_blocking(self.options.block);
        info!(library = driver.library_name(), cleared, "driver loaded");
        self.driver = Some(driver);
        cleared
    }

    /// ドライバ所有のオブジェクトを環境と保留中リストから外す。
    pub(crate) fn invalidate_driver_objects(&mut self) -> usize {
        self.in_flight.retain(|object| !object.is_driver_owned());
        self.env.clear_driver_objects()
    }

    pub fn driver(&self) -> Option<&dyn Driver> {
        self.driver.as_deref()
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn options(&self) -> Options {
        self.options
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    /// 実行中のスクリプトの入れ子の深さ。
    pub fn script_depth(&self) -> usize {
        self.script_depth
    }

    /// 1 行を実行する。エラーはここで報告し、`Outcome::Fail` に変換する。
    pub fn run_line(&mut self, line: &str) -> Outcome {
        match self.execute(line) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.report(line, &err);
                Outcome::Fail
            }
        }
    }

    /// エラーを診断として書き出す。書き込みの失敗は無視する。
    pub(crate) fn report(&mut self, line: &str, error: &CommandError) {
        let caret = error
            .span()
            .filter(|_| self.options.caret)
            .and_then(|span| caret_line(line, span));
        if let Some(caret) = caret {
            let pad = if self.script_depth == 0 {
                PROMPT.chars().count()
            } else {
                if !self.options.echo {
                    let _ = writeln!(self.err, "{}", line);
                }
                0
            };
            let _ = writeln!(self.err, "{}{}", " ".repeat(pad), caret);
        }
        let _ = writeln!(self.err, "{}", error);
        let _ = self.err.flush();
    }

    /// 使用中のドライバ。読み込まれていなければエラー。
    pub(crate) fn active_driver(&mut self) -> CommandResult<&mut dyn Driver> {
        match self.driver.as_deref_mut() {
            Some(driver) => Ok(driver),
            None => Err(CommandError::semantic(
                "SEM020",
                "ドライバが読み込まれていません。'load' を実行してください",
            )),
        }
    }

    /// `keyword` の式にドライバが必要なことを確認する。
    pub(crate) fn require_driver(&self, keyword: &'static str, span: Span) -> CommandResult<()> {
        if self.driver.is_some() {
            return Ok(());
        }
        Err(CommandError::with(ErrorKind::Semantic, "SEM021", move |f| {
            write!(f, "'{}' 式にはドライバが必要です", keyword)
        })
        .at(span))
    }

    /// 通常出力へ 1 行書く。
    pub(crate) fn say(&mut self, args: fmt::Arguments<'_>) -> CommandResult<()> {
        self.out.write_fmt(args)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    /// `verbose` が有効なときだけ通常出力へ書く。
    pub(crate) fn note(&mut self, args: fmt::Arguments<'_>) -> CommandResult<()> {
        if self.options.verbose {
            self.say(args)?;
        }
        Ok(())
    }

    /// 警告をエラー出力へ書く。
    pub(crate) fn warn(&mut self, args: fmt::Arguments<'_>) -> CommandResult<()> {
        self.err.write_all("警告: ".as_bytes())?;
        self.err.write_fmt(args)?;
        self.err.write_all(b"\n")?;
        Ok(())
    }
}

/// 複製しても同じバッファへ書き込む出力先。テストや埋め込み時の出力捕捉に使う。
#[derive(Debug, Clone, Default)]
pub struct Capture {
    buffer: Rc<RefCell<Vec<u8>>>,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    /// これまでに書き込まれた内容（UTF-8 として解釈できない部分は置換）。
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.borrow()).into_owned()
    }

    /// 内容を取り出して空にする。
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.buffer.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SimDriver;

    fn bench() -> (Testbench, Capture, Capture) {
        let out = Capture::new();
        let err = Capture::new();
        let tb = Testbench::new().with_output(out.clone(), err.clone());
        (tb, out, err)
    }

    #[test]
    /// 対話時のキャレットはプロンプト幅だけずらして表示する。
    fn interactive_caret_is_offset_by_prompt() {
        let (mut tb, _out, err) = bench();
        assert_eq!(tb.run_line("a = nothing"), Outcome::Fail);
        let text = err.contents();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(format!("{}    ^^^^^^^", " ".repeat(PROMPT.len())).as_str()));
        assert!(lines.next().unwrap().contains("nothing"));
    }

    #[test]
    /// `set caret` が無効ならメッセージだけを表示する。
    fn caret_can_be_disabled() {
        let (mut tb, _out, err) = bench();
        tb.options_mut().caret = false;
        tb.run_line("a = nothing");
        assert_eq!(err.contents().lines().count(), 1);
    }

    #[test]
    /// ドライバを差し替えるとドライバ所有のオブジェクトだけが消える。
    fn set_driver_invalidates_driver_objects() {
        let (mut tb, _out, _err) = bench();
        tb.set_driver(Box::new(SimDriver::new()));
        assert_eq!(tb.run_line("b = buffer(16)"), Outcome::Good);
        assert_eq!(tb.run_line("d = int(1)"), Outcome::Good);
        assert_eq!(tb.set_driver(Box::new(SimDriver::new())), 1);
        assert!(tb.env().contains("d"));
        assert!(!tb.env().contains("b"));
    }

    #[test]
    fn capture_take_empties_buffer() {
        let mut capture = Capture::new();
        write!(capture, "abc").unwrap();
        assert_eq!(capture.take(), "abc");
        assert_eq!(capture.contents(), "");
    }
}
