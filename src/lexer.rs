// パス: src/lexer.rs
// 役割: 1 行の入力から位置付きトークンを切り出す字句解析器
// 意図: トークンは種別とバイト区間だけを持ち、テキストは元の行から都度切り出す
// 関連ファイル: src/parser/mod.rs, src/errors.rs, tests/lexer_tokens.rs
//! 字句解析モジュール
//!
//! - 空白（空白・タブ・CR・LF）を読み飛ばした位置から次のトークンを分類する。
//! - `=` `(` `)` `,` は 1 文字トークン、`"` から始まる列は引用テキスト。
//! - それ以外は英数字と `_ - + ~ . / '` の連なりを 1 語として読み、
//!   符号の後に数字が続けば `Constant`、そうでなければ `String` とする。

use crate::errors::Span;

/// 字句解析で識別されるトークンの分類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Invalid,
    Constant,
    String,
    Text,
    Comma,
    Equal,
    OpenParen,
    CloseParen,
    End,
}

/// 種別と `[begin, end)` のバイト区間だけを持つトークン。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub begin: usize,
    pub end: usize,
}

impl Token {
    pub fn new(kind: TokenKind, begin: usize, end: usize) -> Self {
        Self { kind, begin, end }
    }

    /// `pos` の位置に長さ 0 の `End` トークンを作る。
    pub fn end_at(pos: usize) -> Self {
        Self::new(TokenKind::End, pos, pos)
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn span(&self) -> Span {
        Span::new(self.begin, self.end)
    }
}

/// 空白文字かどうかを判定するユーティリティ。
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n')
}

/// 語を区切る文字かどうか。英数字と `_ - + ~ . / '` 以外はすべて区切り。
pub fn is_separator(c: u8) -> bool {
    !(c.is_ascii_alphanumeric() || matches!(c, b'_' | b'-' | b'+' | b'~' | b'.' | b'/' | b'\''))
}

/// 任意の符号に続いて数字が現れるなら数値とみなす。
pub fn looks_like_number(text: &str) -> bool {
    let bytes = text.as_bytes();
    let digits = match bytes.first() {
        Some(b'+') | Some(b'-') => &bytes[1..],
        _ => bytes,
    };
    digits.first().map_or(false, u8::is_ascii_digit)
}

/// 前後の空白を取り除いた部分文字列を返す。
pub fn trim_whitespace(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_ascii() && is_whitespace(c as u8))
}

/// `index` から始まる次のトークンを返す。
pub fn next_token(line: &str, index: usize) -> Token {
    let bytes = line.as_bytes();
    let mut pos = index.min(bytes.len());
    while pos < bytes.len() && is_whitespace(bytes[pos]) {
        pos += 1;
    }
    if pos == bytes.len() {
        return Token::end_at(pos);
    }

    let single = match bytes[pos] {
        b'=' => Some(TokenKind::Equal),
        b',' => Some(TokenKind::Comma),
        b'(' => Some(TokenKind::OpenParen),
        b')' => Some(TokenKind::CloseParen),
        _ => None,
    };
    if let Some(kind) = single {
        return Token::new(kind, pos, pos + 1);
    }

    if bytes[pos] == b'"' {
        return scan_text(bytes, pos);
    }

    let start = pos;
    while pos < bytes.len() && !is_separator(bytes[pos]) {
        pos += 1;
    }
    if pos == start {
        // 語にもならない記号は 1 文字分（UTF-8 の 1 文字）を不正トークンにする。
        let width = line[start..].chars().next().map_or(1, char::len_utf8);
        return Token::new(TokenKind::Invalid, start, start + width);
    }
    let kind = if looks_like_number(&line[start..pos]) {
        TokenKind::Constant
    } else {
        TokenKind::String
    };
    Token::new(kind, start, pos)
}

/// 開き引用符から対応する閉じ引用符までを読む。見つからなければ行末までを不正とする。
fn scan_text(bytes: &[u8], start: usize) -> Token {
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'"' => return Token::new(TokenKind::Text, start, pos + 1),
            _ => pos += 1,
        }
    }
    Token::new(TokenKind::Invalid, start, bytes.len())
}

/// 行全体を `End` までトークン化する。結果は必ず `End` で終わる。
pub fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    loop {
        let token = next_token(line, pos);
        tokens.push(token);
        if token.is(TokenKind::End) {
            return tokens;
        }
        pos = token.end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<TokenKind> {
        tokenize(line).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    /// 記号・引用テキスト・数値・語が順に分類されることを確認する。
    fn classifies_mixed_line() {
        let line = "\t( ), text \"quoted text\" 123.5\n-99";
        let tokens = tokenize(line);
        let expected = [
            (TokenKind::OpenParen, "("),
            (TokenKind::CloseParen, ")"),
            (TokenKind::Comma, ","),
            (TokenKind::String, "text"),
            (TokenKind::Text, "\"quoted text\""),
            (TokenKind::Constant, "123.5"),
            (TokenKind::Constant, "-99"),
            (TokenKind::End, ""),
        ];
        assert_eq!(tokens.len(), expected.len());
        for (token, (kind, text)) in tokens.iter().zip(expected.iter()) {
            assert_eq!(token.kind, *kind);
            assert_eq!(&line[token.begin..token.end], *text);
        }
    }

    #[test]
    /// 空白だけの行は位置付きの `End` になる。
    fn whitespace_only_line_is_end() {
        let tokens = tokenize(" \t \r\n");
        assert_eq!(tokens, vec![Token::end_at(5)]);
        assert_eq!(tokenize(""), vec![Token::end_at(0)]);
    }

    #[test]
    /// 閉じていない引用符は行末までの不正トークンになる。
    fn unterminated_quote_spans_rest_of_line() {
        let tokens = tokenize("x = \"abc");
        assert_eq!(tokens[2], Token::new(TokenKind::Invalid, 4, 8));
        assert_eq!(tokens[3], Token::end_at(8));
    }

    #[test]
    /// エスケープされた引用符ではテキストが閉じない。
    fn escaped_quote_does_not_terminate() {
        let line = r#""a\"b" c"#;
        let tokens = tokenize(line);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(&line[tokens[0].begin..tokens[0].end], r#""a\"b""#);
        assert_eq!(tokens[1].kind, TokenKind::String);
    }

    #[test]
    fn sign_and_digit_make_constants() {
        assert_eq!(
            kinds("+1 -x 0x1F a1 .5 -.5"),
            vec![
                TokenKind::Constant,
                TokenKind::String,
                TokenKind::Constant,
                TokenKind::String,
                TokenKind::String,
                TokenKind::String,
                TokenKind::End,
            ]
        );
    }

    #[test]
    /// パス風の語は 1 トークンとして読まれる。
    fn path_like_words_stay_together() {
        let line = "load ./lib/libOpenCL.so.1 ~/x'y";
        let tokens = tokenize(line);
        assert_eq!(&line[tokens[1].begin..tokens[1].end], "./lib/libOpenCL.so.1");
        assert_eq!(&line[tokens[2].begin..tokens[2].end], "~/x'y");
    }

    #[test]
    /// 区切りにしかならない記号は 1 文字の不正トークンになる。
    fn stray_punctuation_is_invalid() {
        let tokens = tokenize("a ; b");
        assert_eq!(tokens[1], Token::new(TokenKind::Invalid, 2, 3));
        assert_eq!(tokens[2].kind, TokenKind::String);
        let multibyte = tokenize("é");
        assert_eq!(multibyte[0], Token::new(TokenKind::Invalid, 0, 2));
    }

    #[test]
    fn trim_strips_ascii_whitespace_only() {
        assert_eq!(trim_whitespace("  \tabc \r\n"), "abc");
        assert_eq!(trim_whitespace(""), "");
    }
}
