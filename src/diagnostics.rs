// パス: src/diagnostics.rs
// 役割: エラーのスパンを入力行の下に `^` で示すキャレット行を作る
// 意図: メッセージ本体とは独立に、表示できるときだけ位置を示す
// 関連ファイル: src/errors.rs, src/testbench.rs

use crate::errors::Span;

/// これ以上長い行にはキャレットを付けない（端末 1 行に収まらないため）。
pub const CARET_LINE_LIMIT: usize = 120;

/// `span` の位置に `^` を並べた行を返す。付けられない場合は `None`。
///
/// 行頭側のタブはタブのまま写し、元の行と桁がずれないようにする。
/// 長さ 0 のスパン（行末など）には `^` を 1 つ置く。
pub fn caret_line(line: &str, span: Span) -> Option<String> {
    if line.len() >= CARET_LINE_LIMIT || span.end > line.len() {
        return None;
    }
    if !line.is_char_boundary(span.begin) || !line.is_char_boundary(span.end) {
        return None;
    }
    let pad: String = line[..span.begin]
        .chars()
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .collect();
    let width = line[span.begin..span.end].chars().count().max(1);
    Some(format!("{}{}", pad, "^".repeat(width)))
}
