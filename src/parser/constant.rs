// パス: src/parser/constant.rs
// 役割: トークンのテキストを真偽値・整数・浮動小数点・半精度値へ厳密に変換する
// 意図: 部分一致や範囲外を黙って受け入れず、型ごとの失敗理由を返す
// 関連ファイル: src/parser/mod.rs, src/half.rs, src/evaluator/mod.rs
//! 定数の解析
//!
//! 整数は `0x`（16 進）、先頭 `0`（8 進）、それ以外（10 進）の接頭辞を解釈し、
//! テキスト全体を消費できなければ失敗する。浮動小数点は範囲外を無限大へ飽和させる。

use thiserror::Error;

use crate::half::Half;

/// これ以上長い定数テキストは受け付けない。
pub const MAX_CONSTANT_LEN: usize = 64;

/// 定数解析の失敗理由。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstantError {
    #[error("定数テキストが長すぎます（{MAX_CONSTANT_LEN} バイト未満にしてください）")]
    TooLong,
    #[error("'{text}' を {type_name} として解釈できません")]
    Malformed {
        text: String,
        type_name: &'static str,
    },
    #[error("'{text}' は {type_name} の範囲外です")]
    OutOfRange {
        text: String,
        type_name: &'static str,
    },
}

/// トークンのテキストから解析できる値。
pub trait Constant: Sized {
    /// 診断に使う型名。
    const TYPE_NAME: &'static str;

    fn parse_text(text: &str) -> Result<Self, ConstantError>;
}

fn malformed(text: &str, type_name: &'static str) -> ConstantError {
    ConstantError::Malformed {
        text: text.to_string(),
        type_name,
    }
}

fn out_of_range(text: &str, type_name: &'static str) -> ConstantError {
    ConstantError::OutOfRange {
        text: text.to_string(),
        type_name,
    }
}

fn check_length(text: &str) -> Result<(), ConstantError> {
    if text.len() >= MAX_CONSTANT_LEN {
        return Err(ConstantError::TooLong);
    }
    Ok(())
}

impl Constant for bool {
    const TYPE_NAME: &'static str = "bool";

    fn parse_text(text: &str) -> Result<Self, ConstantError> {
        check_length(text)?;
        match text.to_ascii_lowercase().as_str() {
            "1" | "y" | "t" | "yes" | "true" => Ok(true),
            "0" | "n" | "f" | "no" | "false" => Ok(false),
            _ => Err(malformed(text, Self::TYPE_NAME)),
        }
    }
}

/// 符号と基数接頭辞を解釈し、(負か, 絶対値) を返す。
fn parse_magnitude(text: &str, type_name: &'static str) -> Result<(bool, u128), ConstantError> {
    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = if let Some(hex) = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
    {
        (16, hex)
    } else if body.len() > 1 && body.starts_with('0') {
        (8, &body[1..])
    } else {
        (10, body)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(malformed(text, type_name));
    }
    let magnitude =
        u128::from_str_radix(digits, radix).map_err(|_| out_of_range(text, type_name))?;
    Ok((negative, magnitude))
}

macro_rules! signed_constant {
    ($($ty:ty => $name:literal),* $(,)?) => {$(
        impl Constant for $ty {
            const TYPE_NAME: &'static str = $name;

            fn parse_text(text: &str) -> Result<Self, ConstantError> {
                check_length(text)?;
                let (negative, magnitude) = parse_magnitude(text, Self::TYPE_NAME)?;
                let wide = i128::try_from(magnitude)
                    .map_err(|_| out_of_range(text, Self::TYPE_NAME))?;
                let value = if negative { -wide } else { wide };
                <$ty>::try_from(value).map_err(|_| out_of_range(text, Self::TYPE_NAME))
            }
        }
    )*};
}

macro_rules! unsigned_constant {
    ($($ty:ty => $name:literal),* $(,)?) => {$(
        impl Constant for $ty {
            const TYPE_NAME: &'static str = $name;

            fn parse_text(text: &str) -> Result<Self, ConstantError> {
                check_length(text)?;
                let (negative, magnitude) = parse_magnitude(text, Self::TYPE_NAME)?;
                if negative && magnitude != 0 {
                    return Err(out_of_range(text, Self::TYPE_NAME));
                }
                <$ty>::try_from(magnitude).map_err(|_| out_of_range(text, Self::TYPE_NAME))
            }
        }
    )*};
}

signed_constant!(i8 => "char", i16 => "short", i32 => "int", i64 => "long");
unsigned_constant!(u8 => "uchar", u16 => "ushort", u32 => "uint", u64 => "ulong", usize => "size");

impl Constant for f64 {
    const TYPE_NAME: &'static str = "double";

    fn parse_text(text: &str) -> Result<Self, ConstantError> {
        check_length(text)?;
        text.parse::<f64>()
            .map_err(|_| malformed(text, Self::TYPE_NAME))
    }
}

impl Constant for f32 {
    const TYPE_NAME: &'static str = "float";

    fn parse_text(text: &str) -> Result<Self, ConstantError> {
        check_length(text)?;
        text.parse::<f32>()
            .map_err(|_| malformed(text, Self::TYPE_NAME))
    }
}

impl Constant for Half {
    const TYPE_NAME: &'static str = "half";

    fn parse_text(text: &str) -> Result<Self, ConstantError> {
        check_length(text)?;
        text.parse::<f64>()
            .map(Half::from_f64)
            .map_err(|_| malformed(text, Self::TYPE_NAME))
    }
}
