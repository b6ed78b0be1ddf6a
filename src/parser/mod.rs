// パス: src/parser/mod.rs
// 役割: 1 行分のトークン列を辿るカーソルと、テキスト・数値の取り出しを提供する
// 意図: 評価器とディスパッチャが同じ先読みモデルで行を読めるようにする
// 関連ファイル: src/lexer.rs, src/parser/constant.rs, src/evaluator/mod.rs
//! トークンストリーム
//!
//! - 行は先にすべてトークン化し、添字で現在位置を表す（隠れた先読み状態を持たない）。
//! - `End` は粘着的で、進めても `End` のまま。
//! - 引用テキストの復号と定数の解析はトークンのスパンを伴うエラーを返す。

mod constant;

pub use constant::{Constant, ConstantError, MAX_CONSTANT_LEN};

use crate::errors::{CommandError, CommandResult, Span};
use crate::lexer::{tokenize, trim_whitespace, Token, TokenKind};

/// 1 行を借用するトークンカーソル。行をまたいで再利用しない。
#[derive(Debug, Clone)]
pub struct TokenStream<'a> {
    line: &'a str,
    tokens: Vec<Token>,
    index: usize,
}

impl<'a> TokenStream<'a> {
    /// 行をトークン化し、先頭トークンを現在位置とするストリームを作る。
    pub fn new(line: &'a str) -> Self {
        Self {
            line,
            tokens: tokenize(line),
            index: 0,
        }
    }

    pub fn line(&self) -> &'a str {
        self.line
    }

    pub fn current(&self) -> Token {
        self.tokens[self.index]
    }

    /// 1 トークン先を返す。現在が `End` か `Invalid` なら不正トークン。
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> Token {
        let current = self.current();
        if !self.has_more() {
            return Token::new(TokenKind::Invalid, current.begin, current.end);
        }
        self.tokens
            .get(self.index + 1)
            .copied()
            .unwrap_or_else(|| Token::end_at(self.line.len()))
    }

    /// 現在位置を 1 つ進める。`End` では止まる。
    pub fn advance(&mut self) {
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
    }

    /// 現在のトークンを返してから進める。
    pub fn consume(&mut self) -> Token {
        let token = self.current();
        self.advance();
        token
    }

    /// 種別が一致すれば消費して返し、一致しなければ現在位置の不正トークンを返す。
    pub fn expect(&mut self, kind: TokenKind) -> Token {
        let token = self.current();
        if token.kind == kind {
            self.advance();
            token
        } else {
            Token::new(TokenKind::Invalid, token.begin, token.end)
        }
    }

    /// `expect` の結果をエラーへ変換する版。
    pub fn require(
        &mut self,
        kind: TokenKind,
        code: &'static str,
        message: &'static str,
    ) -> CommandResult<Token> {
        let token = self.expect(kind);
        if token.is(TokenKind::Invalid) {
            return Err(CommandError::semantic(code, message).at(self.current_span()));
        }
        Ok(token)
    }

    /// 種別が一致したときだけ消費する。
    pub fn accept(&mut self, kind: TokenKind) -> Option<Token> {
        if self.current().is(kind) {
            Some(self.consume())
        } else {
            None
        }
    }

    /// 現在が `End` でも `Invalid` でもなければ真。
    pub fn has_more(&self) -> bool {
        !matches!(self.current().kind, TokenKind::End | TokenKind::Invalid)
    }

    /// 診断用の現在スパン。`End` の場合は行末の空スパン。
    pub fn current_span(&self) -> Span {
        self.current().span()
    }

    pub fn text(&self, token: Token) -> &'a str {
        &self.line[token.begin..token.end]
    }

    pub fn current_text(&self) -> &'a str {
        self.text(self.current())
    }

    /// 現在のトークン以降の残り全体（前後の空白は除く）。
    pub fn remaining_text(&self) -> &'a str {
        trim_whitespace(&self.line[self.current().begin..])
    }

    /// 引用テキストの中身を復号する。`\n \t \\ \"` 以外のエスケープ文字は捨てる。
    pub fn unquoted(&self, token: Token) -> CommandResult<String> {
        if !token.is(TokenKind::Text) {
            return Err(
                CommandError::semantic("SYN001", "引用符で囲んだテキストが必要です").at(token.span()),
            );
        }
        Ok(unquote(self.text(token)))
    }

    /// 語・引用テキストどちらでも受け付け、その文字列値を返す。
    pub fn word_or_text(&self, token: Token) -> CommandResult<String> {
        match token.kind {
            TokenKind::Text => self.unquoted(token),
            TokenKind::String | TokenKind::Constant => Ok(self.text(token).to_string()),
            _ => Err(CommandError::semantic("SYN002", "名前またはテキストが必要です").at(token.span())),
        }
    }

    /// トークンのテキストを `T` として解釈する。失敗時はトークンのスパンを持つ。
    pub fn parse_constant<T: Constant>(&self, token: Token) -> CommandResult<T> {
        T::parse_text(self.text(token)).map_err(|err| CommandError::from(err).at(token.span()))
    }
}

/// 両端の引用符を外し、既知のエスケープを復号する。
pub fn unquote(quoted: &str) -> String {
    let inner = quoted
        .strip_prefix('"')
        .map(|s| s.strip_suffix('"').unwrap_or(s))
        .unwrap_or(quoted);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            // 未知のエスケープは黙って捨てる
            Some(_) | None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 空行では `End` のまま進まず、先読みは不正トークンになる。
    fn end_is_sticky_and_next_is_invalid() {
        let mut ts = TokenStream::new("   ");
        assert!(ts.current().is(TokenKind::End));
        assert!(ts.next().is(TokenKind::Invalid));
        ts.advance();
        ts.advance();
        assert!(ts.current().is(TokenKind::End));
        assert!(!ts.has_more());
    }

    #[test]
    /// `consume` と `expect` の挙動を確認する。
    fn consume_and_expect() {
        let mut ts = TokenStream::new("a = (b)");
        assert!(ts.next().is(TokenKind::Equal));
        let a = ts.consume();
        assert_eq!(ts.text(a), "a");
        assert!(ts.expect(TokenKind::OpenParen).is(TokenKind::Invalid));
        assert!(ts.current().is(TokenKind::Equal));
        assert!(ts.expect(TokenKind::Equal).is(TokenKind::Equal));
        assert!(ts.accept(TokenKind::OpenParen).is_some());
        assert_eq!(ts.current_text(), "b");
        assert_eq!(ts.remaining_text(), "b)");
    }

    #[test]
    /// 既知のエスケープは復号し、未知のものは捨てる。
    fn unquote_decodes_known_escapes() {
        assert_eq!(unquote(r#""a\nb\tc""#), "a\nb\tc");
        assert_eq!(unquote(r#""q\"x\\y""#), "q\"x\\y");
        assert_eq!(unquote(r#""a\qb""#), "ab");
        assert_eq!(unquote(r#""""#), "");
    }

    #[test]
    /// テキスト以外の復号要求はトークン位置のエラーになる。
    fn unquoted_rejects_non_text() {
        let ts = TokenStream::new("word");
        let err = ts.unquoted(ts.current()).unwrap_err();
        assert_eq!(err.span(), Some(Span::new(0, 4)));
    }

    #[test]
    /// 定数解析の失敗はそのトークンのスパンを持つ。
    fn parse_constant_error_carries_span() {
        let ts = TokenStream::new("x 1b");
        let token = ts.tokens[1];
        let err = ts.parse_constant::<i32>(token).unwrap_err();
        assert_eq!(err.span(), Some(Span::new(2, 4)));
        assert!(ts.parse_constant::<u8>(ts.tokens[0]).is_err());
    }

    #[test]
    fn word_or_text_accepts_both_forms() {
        let ts = TokenStream::new("name \"with space\" ,");
        assert_eq!(ts.word_or_text(ts.tokens[0]).unwrap(), "name");
        assert_eq!(ts.word_or_text(ts.tokens[1]).unwrap(), "with space");
        assert!(ts.word_or_text(ts.tokens[2]).is_err());
    }
}
