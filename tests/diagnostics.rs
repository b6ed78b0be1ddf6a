// パス: tests/diagnostics.rs
// 役割: エラー報告（キャレット行とメッセージ）の統合テスト
// 意図: 対話入力でのキャレット位置と表示の抑止条件を利用者の見え方のまま確認する
// 関連ファイル: src/diagnostics.rs, src/testbench.rs, src/errors.rs
#[path = "test_support.rs"]
mod support;

use cltb::diagnostics::CARET_LINE_LIMIT;
use cltb::{Outcome, PROMPT};
use support::{session, session_without_driver};

fn report_lines(line: &str) -> Vec<String> {
    let mut s = session();
    s.run(line, Outcome::Fail);
    s.err.take().lines().map(str::to_string).collect()
}

#[test]
/// キャレットはプロンプトの幅だけずらして問題の語の下に置く。
fn caret_points_at_offending_token() {
    let lines = report_lines("m = buffer(4, 8)");
    let pad = " ".repeat(PROMPT.len());
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], format!("{pad}            ^"));
    assert!(lines[1].starts_with("[SYN011]"));
}

#[test]
/// 閉じていない引用符は開き引用符から行末までを示す。
fn unterminated_text_spans_to_end() {
    let lines = report_lines("p = program(\"kernel");
    assert_eq!(lines[0].trim_start(), "^^^^^^^");
    assert!(lines[1].starts_with("[LEX001]"));
}

#[test]
/// 行末で入力が足りないときは行末に 1 つだけ示す。
fn missing_input_marks_end_of_line() {
    let lines = report_lines("a = int(");
    let pad = " ".repeat(PROMPT.len());
    assert_eq!(lines[0], format!("{pad}        ^"));
}

#[test]
/// 余分な入力は残り全体を示す。
fn trailing_input_is_underlined() {
    let lines = report_lines("a = int(1) extra words");
    assert_eq!(lines[0].trim_start(), "^^^^^^^^^^^");
    assert!(lines[1].starts_with("[SYN041]"));
}

#[test]
/// 長い行と位置を持たないエラーにはキャレットを付けない。
fn caret_is_suppressed_when_unhelpful() {
    let mut s = session_without_driver();
    let long = format!("a = {}", "b".repeat(CARET_LINE_LIMIT));
    s.run(&long, Outcome::Fail);
    assert_eq!(s.err.take().lines().count(), 1);

    s.run("wait", Outcome::Fail);
    let err = s.err.take();
    assert_eq!(err.lines().count(), 1);
    assert!(err.starts_with("[SEM020]"));
}

#[test]
/// ドライバのエラーは呼び出し名と状態コード名を含む。
fn driver_errors_name_the_status() {
    let lines = report_lines("m = buffer(0)");
    let message = lines.last().unwrap();
    assert!(message.starts_with("[DRV001]"));
    assert!(message.contains("clCreateBuffer"));
    assert!(message.contains("CL_INVALID_BUFFER_SIZE"));
}
