// パス: src/evaluator/file.rs
// 役割: `file(NAME[, start[, length]])` 構築子
// 意図: ファイルの一部または全体をデータオブジェクトとして読み、画像形式なら復号する
// 関連ファイル: src/fileio/mod.rs, src/fileio/raster.rs, src/evaluator/mod.rs

use std::path::PathBuf;

use super::{close_arguments, constant_argument, open_arguments};
use crate::errors::{CommandError, CommandResult};
use crate::fileio::FileError;
use crate::lexer::{Token, TokenKind};
use crate::object::{DataObject, Object};
use crate::parser::TokenStream;
use crate::testbench::Testbench;

impl Testbench {
    pub(super) fn eval_file(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Object> {
        open_arguments(ts, "file")?;
        let name_token = ts.consume();
        let name = match name_token.kind {
            TokenKind::Text | TokenKind::String | TokenKind::Constant => ts.word_or_text(name_token)?,
            _ => {
                return Err(CommandError::semantic("SYN030", "ファイル名が必要です").at(name_token.span()))
            }
        };

        let mut offset = 0u64;
        let mut offset_token: Option<Token> = None;
        let mut length: Option<u64> = None;
        if ts.accept(TokenKind::Comma).is_some() {
            let token = constant_argument(ts, "開始位置")?;
            offset = ts.parse_constant(token)?;
            offset_token = Some(token);
            if ts.accept(TokenKind::Comma).is_some() {
                let token = constant_argument(ts, "長さ")?;
                let requested: u64 = ts.parse_constant(token)?;
                if requested == 0 {
                    return Err(CommandError::semantic("SEM031", "長さは 1 以上です").at(token.span()));
                }
                length = Some(requested);
            }
        }
        close_arguments(ts)?;

        let path = PathBuf::from(&name);
        let bytes = self.files.load_file(&path, offset, length).map_err(|err| {
            let span = match (&err, offset_token) {
                (FileError::OffsetBeyondEnd { .. }, Some(token)) => token.span(),
                _ => name_token.span(),
            };
            CommandError::from(err).at(span)
        })?;

        if let Some(requested) = length {
            if (bytes.len() as u64) < requested {
                self.note(format_args!(
                    "長さ {} をファイル末尾に合わせて {} に切り詰めました",
                    requested,
                    bytes.len()
                ))?;
            }
        }

        if offset_token.is_none() {
            let decoded = self
                .codec
                .decode_if_recognized(&path, &bytes)
                .map_err(|err| CommandError::from(err).at(name_token.span()))?;
            if let Some(image) = decoded {
                return Ok(Object::from(image));
            }
        }
        Ok(Object::from(DataObject::new(bytes, name)))
    }
}
