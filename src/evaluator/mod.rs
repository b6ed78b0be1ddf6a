// パス: src/evaluator/mod.rs
// 役割: 式を評価してオブジェクトを得る再帰下降評価器と、型付き配列の構築
// 意図: 名前の参照を構築子より優先し、構築子ごとの処理は下位モジュールへ分ける
// 関連ファイル: src/evaluator/file.rs, src/evaluator/memory.rs, src/evaluator/program.rs
//! 式の評価
//!
//! 文法:
//! ```text
//! expr := '(' expr ')' | NAME | CONSTRUCTOR '(' args ')'
//! ```
//! - `NAME` が環境にあればそのオブジェクトを返す（構築子名より優先）。
//! - 型付き配列 `int(1, 2, 3)` は数値定数を要素型のネイティブバイト順で詰める。
//! - `program` `binary` `kernel` `buffer` `image` はドライバを必要とする。

mod file;
mod memory;
mod program;

use tracing::debug;

use crate::errors::{CommandError, CommandResult, ErrorKind};
use crate::half::Half;
use crate::lexer::{Token, TokenKind};
use crate::object::{DataObject, Object, ObjectRef};
use crate::parser::TokenStream;
use crate::testbench::Testbench;

/// 型付き配列の要素型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Half,
    Float,
    Double,
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
}

impl ElementType {
    pub const ALL: [ElementType; 11] = [
        ElementType::Half,
        ElementType::Float,
        ElementType::Double,
        ElementType::Char,
        ElementType::UChar,
        ElementType::Short,
        ElementType::UShort,
        ElementType::Int,
        ElementType::UInt,
        ElementType::Long,
        ElementType::ULong,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            ElementType::Half => "half",
            ElementType::Float => "float",
            ElementType::Double => "double",
            ElementType::Char => "char",
            ElementType::UChar => "uchar",
            ElementType::Short => "short",
            ElementType::UShort => "ushort",
            ElementType::Int => "int",
            ElementType::UInt => "uint",
            ElementType::Long => "long",
            ElementType::ULong => "ulong",
        }
    }

    /// キーワードと完全一致する要素型。
    pub fn from_keyword(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.keyword() == text)
    }

    /// 1 要素のバイト数。
    pub fn size(self) -> usize {
        match self {
            ElementType::Char | ElementType::UChar => 1,
            ElementType::Half | ElementType::Short | ElementType::UShort => 2,
            ElementType::Float | ElementType::Int | ElementType::UInt => 4,
            ElementType::Double | ElementType::Long | ElementType::ULong => 8,
        }
    }

    /// `list` に表示する種別名（例: `int data`）。
    pub fn type_tag(self) -> String {
        format!("{} data", self.keyword())
    }
}

/// 字句エラーのトークンを診断に変える。
pub(crate) fn invalid_token_error(ts: &TokenStream<'_>, token: Token) -> CommandError {
    if ts.text(token).starts_with('"') {
        CommandError::lex("LEX001", "引用符が閉じられていません", token.span())
    } else {
        CommandError::lex("LEX002", "解釈できない文字があります", token.span())
    }
}

/// `keyword` の直後の `(` を読む。
fn open_arguments(ts: &mut TokenStream<'_>, keyword: &'static str) -> CommandResult<()> {
    if ts.accept(TokenKind::OpenParen).is_some() {
        return Ok(());
    }
    Err(CommandError::with(ErrorKind::Semantic, "SYN010", move |f| {
        write!(f, "'{}' の後には '(' が必要です", keyword)
    })
    .at(ts.current_span()))
}

fn close_arguments(ts: &mut TokenStream<'_>) -> CommandResult<()> {
    ts.require(TokenKind::CloseParen, "SYN011", "')' が必要です")
        .map(|_| ())
}

/// 数値定数トークンを 1 つ読む。
fn constant_argument(ts: &mut TokenStream<'_>, what: &'static str) -> CommandResult<Token> {
    let token = ts.current();
    if !token.is(TokenKind::Constant) {
        return Err(CommandError::with(ErrorKind::Semantic, "SYN012", move |f| {
            write!(f, "{} には数値定数が必要です", what)
        })
        .at(token.span()));
    }
    ts.advance();
    Ok(token)
}

impl Testbench {
    /// 現在位置から式を 1 つ評価する。
    pub fn evaluate(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<ObjectRef> {
        let token = ts.current();
        match token.kind {
            TokenKind::End => {
                Err(CommandError::semantic("SYN020", "式が必要ですが入力が終わりました").at(token.span()))
            }
            TokenKind::Invalid => Err(invalid_token_error(ts, token)),
            TokenKind::OpenParen => {
                ts.advance();
                let object = self.evaluate(ts)?;
                if ts.expect(TokenKind::CloseParen).is(TokenKind::Invalid) {
                    return Err(
                        CommandError::semantic("SYN021", "対応する ')' がありません").at(token.span()),
                    );
                }
                Ok(object)
            }
            TokenKind::String => {
                ts.advance();
                let name = ts.text(token);
                if let Some(object) = self.env.lookup(name) {
                    return Ok(object);
                }
                self.construct(ts, token)
            }
            _ => Err(CommandError::semantic("SYN022", "名前または構築子が必要です").at(token.span())),
        }
    }

    /// 構築子を評価する。`keyword` は消費済みの名前トークン。
    fn construct(&mut self, ts: &mut TokenStream<'_>, keyword: Token) -> CommandResult<ObjectRef> {
        let name = ts.text(keyword);
        let object = match name {
            "file" => self.eval_file(ts)?,
            "clone" => self.eval_clone(ts)?,
            "buffer" => self.eval_buffer(ts, keyword)?,
            "image" => self.eval_image(ts, keyword)?,
            "program" => self.eval_program(ts, keyword)?,
            "binary" => self.eval_binary(ts, keyword)?,
            "kernel" => self.eval_kernel(ts, keyword)?,
            _ => match ElementType::from_keyword(name) {
                Some(ty) => Object::from(self.eval_typed_array(ts, ty)?),
                None => {
                    let name = name.to_string();
                    return Err(CommandError::with(ErrorKind::Semantic, "SEM002", move |f| {
                        write!(f, "'{}' は未定義の名前です", name)
                    })
                    .at(keyword.span()));
                }
            },
        };
        debug!(constructor = name, tag = %object, "constructed");
        Ok(object.into_ref())
    }

    /// `TYPE '(' CONST {',' CONST} ')'`
    fn eval_typed_array(&mut self, ts: &mut TokenStream<'_>, ty: ElementType) -> CommandResult<DataObject> {
        open_arguments(ts, ty.keyword())?;
        let mut bytes = Vec::new();
        loop {
            let token = constant_argument(ts, "配列の要素")?;
            push_element(ts, token, ty, &mut bytes)?;
            match ts.current().kind {
                TokenKind::Comma => ts.advance(),
                TokenKind::CloseParen => {
                    ts.advance();
                    break;
                }
                _ => {
                    return Err(
                        CommandError::semantic("SYN013", "',' か ')' が必要です").at(ts.current_span()),
                    )
                }
            }
        }
        Ok(DataObject::new(bytes, ty.type_tag()))
    }
}

/// 定数を要素型で解析し、ネイティブバイト順で追記する。
fn push_element(ts: &TokenStream<'_>, token: Token, ty: ElementType, out: &mut Vec<u8>) -> CommandResult<()> {
    match ty {
        ElementType::Half => out.extend_from_slice(&ts.parse_constant::<Half>(token)?.to_ne_bytes()),
        ElementType::Float => out.extend_from_slice(&ts.parse_constant::<f32>(token)?.to_ne_bytes()),
        ElementType::Double => out.extend_from_slice(&ts.parse_constant::<f64>(token)?.to_ne_bytes()),
        ElementType::Char => out.extend_from_slice(&ts.parse_constant::<i8>(token)?.to_ne_bytes()),
        ElementType::UChar => out.extend_from_slice(&ts.parse_constant::<u8>(token)?.to_ne_bytes()),
        ElementType::Short => out.extend_from_slice(&ts.parse_constant::<i16>(token)?.to_ne_bytes()),
        ElementType::UShort => out.extend_from_slice(&ts.parse_constant::<u16>(token)?.to_ne_bytes()),
        ElementType::Int => out.extend_from_slice(&ts.parse_constant::<i32>(token)?.to_ne_bytes()),
        ElementType::UInt => out.extend_from_slice(&ts.parse_constant::<u32>(token)?.to_ne_bytes()),
        ElementType::Long => out.extend_from_slice(&ts.parse_constant::<i64>(token)?.to_ne_bytes()),
        ElementType::ULong => out.extend_from_slice(&ts.parse_constant::<u64>(token)?.to_ne_bytes()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Span;

    fn eval(tb: &mut Testbench, line: &str) -> CommandResult<ObjectRef> {
        let mut ts = TokenStream::new(line);
        tb.evaluate(&mut ts)
    }

    #[test]
    /// 要素型の大きさで詰め、種別名に型名を使う。
    fn typed_arrays_pack_native_bytes() {
        let mut tb = Testbench::new();
        let object = eval(&mut tb, "int(1, 2, 3, 4, 5, 6)").unwrap();
        let data = object.as_data().unwrap();
        assert_eq!(data.len(), 24);
        assert_eq!(&data.bytes()[4..8], &2i32.to_ne_bytes());
        assert_eq!(object.type_tag(), "int data");

        let object = eval(&mut tb, "int(0, 256, -512, 1024, 65535, 2147483647)").unwrap();
        let data = object.as_data().unwrap();
        assert_eq!(data.len(), 24);
        let values: Vec<i32> = data
            .bytes()
            .chunks_exact(4)
            .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(values, vec![0, 256, -512, 1024, 65535, 2147483647]);

        let object = eval(&mut tb, "half(0.5, 1)").unwrap();
        let data = object.as_data().unwrap();
        assert_eq!(data.bytes(), [0x3800u16.to_ne_bytes(), 0x3C00u16.to_ne_bytes()].concat());
    }

    #[test]
    /// 範囲外の要素はその要素の位置で失敗する。
    fn element_out_of_range_points_at_element() {
        let mut tb = Testbench::new();
        let err = eval(&mut tb, "uchar(1, 256)").unwrap_err();
        assert_eq!(err.span(), Some(Span::new(9, 12)));
    }

    #[test]
    /// 括弧で包んだ式と名前の参照を評価する。
    fn parentheses_and_names() {
        let mut tb = Testbench::new();
        let object = eval(&mut tb, "((short(7)))").unwrap();
        assert_eq!(object.as_data().unwrap().len(), 2);
        tb.env_mut().insert("s", object).unwrap();
        let found = eval(&mut tb, "s").unwrap();
        assert_eq!(found.type_tag(), "short data");
    }

    #[test]
    /// 閉じていない括弧は開き括弧の位置で報告する。
    fn unmatched_parenthesis_points_at_open() {
        let mut tb = Testbench::new();
        let err = eval(&mut tb, "(int(1)").unwrap_err();
        assert_eq!(err.code(), "SYN021");
        assert_eq!(err.span(), Some(Span::new(0, 1)));
    }

    #[test]
    /// 閉じていない引用符は字句エラーになる。
    fn unterminated_quote_is_lex_error() {
        let mut tb = Testbench::new();
        let err = eval(&mut tb, "\"abc").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lex);
        assert_eq!(err.span(), Some(Span::new(0, 4)));
    }

    #[test]
    /// ドライバが必要な構築子はドライバなしで失敗する。
    fn driver_constructors_require_driver() {
        let mut tb = Testbench::new();
        for line in ["buffer(4)", "program(\"x\")", "kernel(p, k)", "image(d)", "binary(d)"] {
            let err = eval(&mut tb, line).unwrap_err();
            assert_eq!(err.code(), "SEM021", "{line}");
            assert!(err.to_string().contains(line.split('(').next().unwrap()));
        }
    }

    #[test]
    fn element_type_keywords_round_trip() {
        for ty in ElementType::ALL {
            assert_eq!(ElementType::from_keyword(ty.keyword()), Some(ty));
        }
        assert_eq!(ElementType::from_keyword("Int"), None);
        assert_eq!(ElementType::ULong.size(), 8);
    }
}
