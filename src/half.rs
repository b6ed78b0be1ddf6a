// パス: src/half.rs
// 役割: 倍精度値から 16 ビット半精度ビット列への変換
// 意図: 既存のテストデータと一致させるため、仮数部は丸めずに切り捨てる
// 関連ファイル: src/parser/constant.rs, src/evaluator/mod.rs
//! 半精度エンコーダ
//!
//! - 符号ビットはそのまま写す。
//! - 指数部はバイアス 1023 の 11 ビットからバイアス 15 の 5 ビットへ付け替える。
//! - 仮数部は上位 10 ビットだけを残す（切り捨て。最近接丸めにはしない）。
//! - 最大有限値 65504 を超える大きさは符号付き無限大、最小正規数 2^-14 未満は符号付きゼロ。

/// 半精度で表せる最大の有限値。
pub const HALF_MAX: f64 = 65504.0;
/// 半精度の最小正規数 (2^-14)。
pub const HALF_MIN_NORMAL: f64 = 0.000_061_035_156_25;

/// 半精度値のビット列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Half(pub u16);

impl Half {
    pub const INFINITY: Half = Half(0x7C00);
    pub const NEG_INFINITY: Half = Half(0xFC00);
    pub const NAN: Half = Half(0x7E00);

    pub fn from_f64(value: f64) -> Self {
        Half(encode_half(value))
    }

    pub fn to_ne_bytes(self) -> [u8; 2] {
        self.0.to_ne_bytes()
    }
}

/// `value` を切り捨て方式で半精度ビット列へ変換する。
pub fn encode_half(value: f64) -> u16 {
    if value.is_nan() {
        return Half::NAN.0;
    }
    let bits = value.to_bits();
    let sign = ((bits >> 63) as u16) << 15;
    let magnitude = value.abs();
    if magnitude > HALF_MAX {
        return sign | Half::INFINITY.0;
    }
    if magnitude < HALF_MIN_NORMAL {
        return sign;
    }
    let exponent = ((bits >> 52) & 0x7FF) as i64 - 1023 + 15;
    let mantissa = ((bits >> 42) & 0x3FF) as u16;
    sign | ((exponent as u16) << 10) | mantissa
}
