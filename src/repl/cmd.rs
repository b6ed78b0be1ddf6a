// パス: src/repl/cmd.rs
// 役割: 1 行を代入かコマンドに振り分けるディスパッチャ
// 意図: コマンド名は省略形を補完し、曖昧・不明な名前は位置付きで報告する
// 関連ファイル: src/repl/commands.rs, src/evaluator/mod.rs, src/autocomplete.rs
//! コマンドディスパッチ
//!
//! - 空行は何もしない。
//! - `NAME = EXPR` は式を評価して環境へ束縛する（既存の名前は拒否）。
//! - それ以外は先頭の語をコマンド名として補完し、対応する処理へ渡す。

use tracing::debug;

use crate::autocomplete::{autocomplete, Match};
use crate::errors::{CommandError, CommandResult, ErrorKind, Span};
use crate::evaluator::invalid_token_error;
use crate::env::BindingError;
use crate::lexer::TokenKind;
use crate::parser::TokenStream;
use crate::testbench::{Outcome, Testbench};

/// コマンド名。`Command` の並びと一致させる。
pub const COMMAND_NAMES: [&str; 14] = [
    "load", "select", "info", "list", "set", "release", "save", "run", "script", "wait", "flush",
    "bind", "help", "quit",
];

/// トップレベルのコマンド。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Load,
    Select,
    Info,
    List,
    Set,
    Release,
    Save,
    Run,
    Script,
    Wait,
    Flush,
    Bind,
    Help,
    Quit,
}

impl Command {
    pub const ALL: [Command; 14] = [
        Command::Load,
        Command::Select,
        Command::Info,
        Command::List,
        Command::Set,
        Command::Release,
        Command::Save,
        Command::Run,
        Command::Script,
        Command::Wait,
        Command::Flush,
        Command::Bind,
        Command::Help,
        Command::Quit,
    ];

    pub fn name(self) -> &'static str {
        COMMAND_NAMES[self as usize]
    }

    /// 省略形を含むコマンド名を解決する。
    pub fn resolve(text: &str) -> Match {
        autocomplete(text, &COMMAND_NAMES)
    }
}

/// `text` を接頭辞に持つコマンド名の一覧。
fn candidates(text: &str) -> Vec<&'static str> {
    let folded = text.to_ascii_lowercase();
    COMMAND_NAMES
        .iter()
        .copied()
        .filter(|name| name.starts_with(&folded))
        .collect()
}

impl Testbench {
    /// 1 行を実行する。エラーは呼び出し側へ返す。
    pub fn execute(&mut self, line: &str) -> CommandResult<Outcome> {
        let mut ts = TokenStream::new(line);
        self.dispatch(&mut ts)
    }

    fn dispatch(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        let head = ts.current();
        match head.kind {
            TokenKind::End => return Ok(Outcome::Good),
            TokenKind::Invalid => return Err(invalid_token_error(ts, head)),
            _ => {}
        }
        if ts.next().is(TokenKind::Equal) {
            self.assign(ts)?;
            return Ok(Outcome::Good);
        }
        self.command(ts)
    }

    /// `NAME = EXPR`
    fn assign(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<()> {
        let name_token = ts.consume();
        if !name_token.is(TokenKind::String) {
            return Err(
                CommandError::semantic("SYN040", "代入先には識別子が必要です").at(name_token.span()),
            );
        }
        let name = ts.text(name_token);
        if self.env.contains(name) {
            return Err(CommandError::from(BindingError::AlreadyBound(name.to_string()))
                .at(name_token.span()));
        }
        ts.advance();
        let object = self.evaluate(ts)?;
        if ts.has_more() || ts.current().is(TokenKind::Invalid) {
            let rest = ts.current();
            let span = Span::new(rest.begin, rest.begin + ts.remaining_text().len());
            return Err(CommandError::semantic("SYN041", "式の後に余分な入力があります").at(span));
        }
        debug!(name, tag = %object, "bind");
        self.env.insert(name, object)?;
        Ok(())
    }

    fn command(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        let head = ts.consume();
        let text = ts.text(head).to_string();
        let command = match Command::resolve(&text) {
            Match::Found(index) => Command::ALL[index],
            Match::Ambiguous => {
                return Err(CommandError::with(ErrorKind::Semantic, "SEM050", move |f| {
                    write!(
                        f,
                        "コマンド '{}' は曖昧です（候補: {}）",
                        text,
                        candidates(&text).join(", ")
                    )
                })
                .at(head.span()))
            }
            Match::NotFound => {
                return Err(CommandError::with(ErrorKind::Semantic, "SEM051", move |f| {
                    write!(f, "不明なコマンド '{}' です。'help' で一覧を表示します", text)
                })
                .at(head.span()))
            }
        };
        debug!(command = command.name(), "dispatch");
        match command {
            Command::Load => self.cmd_load(ts),
            Command::Select => self.cmd_select(ts),
            Command::Info => self.cmd_info(ts),
            Command::List => self.cmd_list(ts),
            Command::Set => self.cmd_set(ts),
            Command::Release => self.cmd_release(ts),
            Command::Save => self.cmd_save(ts),
            Command::Run => self.cmd_run(ts),
            Command::Script => self.cmd_script(ts),
            Command::Wait => self.cmd_wait(ts),
            Command::Flush => self.cmd_flush(ts),
            Command::Bind => self.cmd_bind(ts),
            Command::Help => self.cmd_help(ts),
            Command::Quit => self.cmd_quit(ts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testbench::Capture;

    fn bench() -> (Testbench, Capture) {
        let err = Capture::new();
        let tb = Testbench::new().with_output(Capture::new(), err.clone());
        (tb, err)
    }

    #[test]
    fn command_names_match_enum_order() {
        for command in Command::ALL {
            assert_eq!(Command::resolve(command.name()), Match::Found(command as usize));
        }
    }

    #[test]
    /// 空行と空白だけの行は何もしない。
    fn blank_lines_are_good() {
        let (mut tb, err) = bench();
        assert_eq!(tb.run_line(""), Outcome::Good);
        assert_eq!(tb.run_line("   \t"), Outcome::Good);
        assert!(err.contents().is_empty());
    }

    #[test]
    /// 既存の名前への代入は解放するまで拒否される。
    fn assignment_rejects_existing_names() {
        let (mut tb, err) = bench();
        assert_eq!(tb.run_line("x = int(1)"), Outcome::Good);
        assert_eq!(tb.run_line("x = int(2)"), Outcome::Fail);
        assert!(err.contents().contains("SEM010"));
        assert_eq!(tb.run_line("release x"), Outcome::Good);
        assert_eq!(tb.run_line("x = int(2)"), Outcome::Good);
    }

    #[test]
    /// 式の後ろに残った入力は失敗になり、束縛もされない。
    fn assignment_rejects_trailing_input() {
        let (mut tb, _err) = bench();
        let err = tb.execute("x = int(1) extra").unwrap_err();
        assert_eq!(err.code(), "SYN041");
        assert_eq!(err.span(), Some(Span::new(11, 16)));
        assert!(!tb.env().contains("x"));
    }

    #[test]
    /// 曖昧なコマンドは候補を示し、不明なコマンドは先頭語の位置で失敗する。
    fn ambiguous_and_unknown_commands() {
        let (mut tb, _err) = bench();
        let err = tb.execute("s").unwrap_err();
        assert_eq!(err.code(), "SEM050");
        let message = err.to_string();
        assert!(message.contains("select") && message.contains("save") && message.contains("script"));
        let err = tb.execute("frobnicate now").unwrap_err();
        assert_eq!(err.code(), "SEM051");
        assert_eq!(err.span(), Some(Span::new(0, 10)));
    }

    #[test]
    /// 数値を代入先にはできない。
    fn assignment_target_must_be_identifier() {
        let (mut tb, _err) = bench();
        let err = tb.execute("1 = int(1)").unwrap_err();
        assert_eq!(err.code(), "SYN040");
    }

    #[test]
    /// 省略形のコマンドも実行できる。
    fn abbreviated_commands_run() {
        let (mut tb, _err) = bench();
        assert_eq!(tb.run_line("q"), Outcome::Quit);
        assert_eq!(tb.run_line("QUIT"), Outcome::Quit);
    }
}
