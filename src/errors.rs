// パス: src/errors.rs
// 役割: コマンド実行全体で共有する診断値とスパンを定義する
// 意図: 字句・意味・外部協調者のエラーを 1 つの型へ集約し、行単位で捕捉できるようにする
// 関連ファイル: src/diagnostics.rs, src/testbench.rs, src/driver/mod.rs
//! エラー型の定義（共通フォーマット: \[CODE\] メッセージ、任意で `[begin, end)` スパン）。
//!
//! - 評価器・ディスパッチャはすべて `Result<_, CommandError>` を返す。
//! - 捕捉点は 1 行の実行につき 1 箇所 (`Testbench::run_line`) のみ。
//! - メッセージは固定文字列か遅延フォーマッタで保持し、失敗時にのみ整形する。

use std::collections::TryReserveError;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::io;

use crate::driver::{DriverError, LibraryError};
use crate::env::BindingError;
use crate::fileio::{CodecError, FileError};
use crate::parser::ConstantError;

/// 入力行に対する半開区間 `[begin, end)`（バイト単位）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub begin: usize,
    pub end: usize,
}

impl Span {
    pub fn new(begin: usize, end: usize) -> Self {
        debug_assert!(begin <= end, "span の始点が終点を越えています");
        Self { begin, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// 2 つのスパンを覆う最小のスパンを返す。
    pub fn cover(self, other: Span) -> Span {
        Span::new(self.begin.min(other.begin), self.end.max(other.end))
    }
}

/// 診断の分類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 字句の異常（閉じていない引用符など）。常にスパンを持つ。
    Lex,
    /// 構文的には正しいが意味的に不正な入力。
    Semantic,
    /// ドライバ呼び出しの失敗。
    Driver,
    /// ドライバライブラリの読み込み失敗。
    Library,
    /// ファイル入出力の失敗。
    Io,
    /// 画像コーデックの失敗。
    Codec,
    /// 資源枯渇。
    Alloc,
}

type RenderFn = dyn Fn(&mut Formatter<'_>) -> fmt::Result;

/// 固定メッセージ、所有文字列、または遅延フォーマッタ。
pub enum Message {
    Static(&'static str),
    Owned(String),
    Deferred(Box<RenderFn>),
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Message::Static(s) => f.write_str(s),
            Message::Owned(s) => f.write_str(s),
            Message::Deferred(render) => render(f),
        }
    }
}

impl Debug for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string())
    }
}

impl From<&'static str> for Message {
    fn from(s: &'static str) -> Self {
        Message::Static(s)
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Owned(s)
    }
}

/// 1 行の実行中に発生したエラー。
#[derive(Debug)]
pub struct CommandError {
    kind: ErrorKind,
    code: &'static str,
    message: Message,
    span: Option<Span>,
}

impl CommandError {
    pub fn new(kind: ErrorKind, code: &'static str, message: impl Into<Message>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            span: None,
        }
    }

    /// 字句エラー。スパンは必須。
    pub fn lex(code: &'static str, message: impl Into<Message>, span: Span) -> Self {
        Self::new(ErrorKind::Lex, code, message).at(span)
    }

    pub fn semantic(code: &'static str, message: impl Into<Message>) -> Self {
        Self::new(ErrorKind::Semantic, code, message)
    }

    /// エラー経路に入ったときだけ整形される遅延メッセージを持つエラーを作る。
    pub fn with<F>(kind: ErrorKind, code: &'static str, render: F) -> Self
    where
        F: Fn(&mut Formatter<'_>) -> fmt::Result + 'static,
    {
        Self::new(kind, code, Message::Deferred(Box::new(render)))
    }

    /// スパンを付与する。既に付与済みなら内側のスパンを優先して保持する。
    pub fn at(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn span(&self) -> Option<Span> {
        self.span
    }
}

impl Display for CommandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl StdError for CommandError {}

impl From<DriverError> for CommandError {
    fn from(err: DriverError) -> Self {
        let code = err.code();
        CommandError::with(ErrorKind::Driver, code, move |f| write!(f, "{}", err))
    }
}

impl From<LibraryError> for CommandError {
    fn from(err: LibraryError) -> Self {
        CommandError::with(ErrorKind::Library, "LIB001", move |f| write!(f, "{}", err))
    }
}

impl From<FileError> for CommandError {
    fn from(err: FileError) -> Self {
        CommandError::with(ErrorKind::Io, "IO001", move |f| write!(f, "{}", err))
    }
}

impl From<CodecError> for CommandError {
    fn from(err: CodecError) -> Self {
        CommandError::with(ErrorKind::Codec, "IMG001", move |f| write!(f, "{}", err))
    }
}

impl From<BindingError> for CommandError {
    fn from(err: BindingError) -> Self {
        CommandError::with(ErrorKind::Semantic, "SEM010", move |f| write!(f, "{}", err))
    }
}

impl From<ConstantError> for CommandError {
    fn from(err: ConstantError) -> Self {
        CommandError::with(ErrorKind::Semantic, "SEM001", move |f| write!(f, "{}", err))
    }
}

impl From<io::Error> for CommandError {
    fn from(err: io::Error) -> Self {
        CommandError::with(ErrorKind::Io, "IO002", move |f| {
            write!(f, "出力に失敗しました: {}", err)
        })
    }
}

impl From<TryReserveError> for CommandError {
    fn from(err: TryReserveError) -> Self {
        CommandError::with(ErrorKind::Alloc, "ALLOC001", move |f| {
            write!(f, "メモリを確保できませんでした: {}", err)
        })
    }
}

/// コマンド処理の結果型。
pub type CommandResult<T> = Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    /// コード付きの 1 行表示になることを確認する。
    fn display_prefixes_code() {
        let err = CommandError::semantic("SEM099", "問題があります");
        assert_eq!(err.to_string(), "[SEM099] 問題があります");
        assert_eq!(err.span(), None);
    }

    #[test]
    /// 遅延フォーマッタは表示されるまで呼ばれない。
    fn deferred_message_renders_lazily() {
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        let err = CommandError::with(ErrorKind::Semantic, "SEM098", move |f| {
            seen.set(seen.get() + 1);
            write!(f, "値 {} は不正です", 42)
        });
        assert_eq!(calls.get(), 0);
        assert_eq!(err.to_string(), "[SEM098] 値 42 は不正です");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    /// 最初に付けたスパンが保持される。
    fn innermost_span_wins() {
        let err = CommandError::lex("LEX001", "x", Span::new(2, 4)).at(Span::new(0, 9));
        assert_eq!(err.span(), Some(Span::new(2, 4)));
        assert_eq!(err.kind(), ErrorKind::Lex);
    }

    #[test]
    fn span_cover_and_len() {
        let s = Span::new(3, 5).cover(Span::new(1, 4));
        assert_eq!(s, Span::new(1, 5));
        assert_eq!(s.len(), 4);
        assert!(Span::new(7, 7).is_empty());
    }
}
