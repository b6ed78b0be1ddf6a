// パス: src/evaluator/program.rs
// 役割: `program` `binary` `kernel` 構築子
// 意図: ビルド失敗時はドライバのビルドログを表示してから失敗を返す
// 関連ファイル: src/driver/mod.rs, src/driver/sim.rs, src/evaluator/mod.rs

use std::io::Write;

use super::{close_arguments, open_arguments};
use crate::driver::DriverError;
use crate::errors::{CommandError, CommandResult};
use crate::lexer::{Token, TokenKind};
use crate::object::{Object, ProgramObject};
use crate::parser::TokenStream;
use crate::testbench::Testbench;

impl Testbench {
    /// `program(SOURCE[, OPTIONS])`。SOURCE は引用テキストかデータオブジェクト。
    pub(super) fn eval_program(&mut self, ts: &mut TokenStream<'_>, keyword: Token) -> CommandResult<Object> {
        self.require_driver("program", keyword.span())?;
        open_arguments(ts, "program")?;
        let source_token = ts.current();
        let source = if source_token.is(TokenKind::Text) {
            ts.advance();
            ts.unquoted(source_token)?
        } else {
            let object = self.evaluate(ts)?;
            let data = object.as_data().ok_or_else(|| {
                CommandError::semantic(
                    "SEM041",
                    "プログラムのソースには引用テキストかデータオブジェクトが必要です",
                )
                .at(source_token.span())
            })?;
            String::from_utf8_lossy(data.bytes()).into_owned()
        };
        let options = build_options(ts)?;
        close_arguments(ts)?;

        let program = self.active_driver()?.create_program(&source)?;
        self.build(program, &options)
    }

    /// `binary(DATA[, OPTIONS])`
    pub(super) fn eval_binary(&mut self, ts: &mut TokenStream<'_>, keyword: Token) -> CommandResult<Object> {
        self.require_driver("binary", keyword.span())?;
        open_arguments(ts, "binary")?;
        let data_token = ts.current();
        let object = self.evaluate(ts)?;
        let data = object.as_data().ok_or_else(|| {
            CommandError::semantic("SEM042", "'binary' にはデータオブジェクトが必要です").at(data_token.span())
        })?;
        let options = build_options(ts)?;
        close_arguments(ts)?;

        let program = self
            .active_driver()?
            .create_program_binary(data.bytes())
            .map_err(|err| CommandError::from(err).at(data_token.span()))?;
        self.build(program, &options)
    }

    /// `kernel(PROGRAM, NAME)`
    pub(super) fn eval_kernel(&mut self, ts: &mut TokenStream<'_>, keyword: Token) -> CommandResult<Object> {
        self.require_driver("kernel", keyword.span())?;
        open_arguments(ts, "kernel")?;
        let program_token = ts.current();
        let object = self.evaluate(ts)?;
        let program = object.as_program().ok_or_else(|| {
            CommandError::semantic("SEM043", "'kernel' の第 1 引数にはプログラムが必要です")
                .at(program_token.span())
        })?;
        ts.require(TokenKind::Comma, "SYN014", "',' が必要です")?;
        let name_token = ts.consume();
        let name = match name_token.kind {
            TokenKind::String | TokenKind::Text => ts.word_or_text(name_token)?,
            _ => {
                return Err(CommandError::semantic("SYN031", "カーネル名が必要です").at(name_token.span()))
            }
        };
        close_arguments(ts)?;

        let kernel = self
            .active_driver()?
            .create_kernel(program, &name)
            .map_err(|err| CommandError::from(err).at(name_token.span()))?;
        Ok(Object::from(kernel))
    }

    /// ビルドし、失敗ならログをエラー出力へ書く。
    fn build(&mut self, program: ProgramObject, options: &str) -> CommandResult<Object> {
        match self.active_driver()?.build_program(&program, options) {
            Ok(()) => Ok(Object::from(program)),
            Err(DriverError::BuildFailure { log }) => {
                self.err.write_all(log.as_bytes())?;
                if !log.ends_with('\n') {
                    self.err.write_all(b"\n")?;
                }
                Err(DriverError::BuildFailure { log }.into())
            }
            Err(other) => Err(other.into()),
        }
    }
}

/// `, "OPTIONS"` があれば読む。
fn build_options(ts: &mut TokenStream<'_>) -> CommandResult<String> {
    if ts.accept(TokenKind::Comma).is_none() {
        return Ok(String::new());
    }
    let token = ts.consume();
    ts.unquoted(token)
}
