// パス: tests/scripts.rs
// 役割: スクリプト実行の統合テスト
// 意図: ファイルからの実行・エコー・停止条件・入れ子の上限を確認する
// 関連ファイル: src/repl/script.rs, src/repl/commands.rs, tests/test_support.rs
#[path = "test_support.rs"]
mod support;

use cltb::repl::MAX_SCRIPT_DEPTH;
use cltb::Outcome;
use support::{quoted, session, session_without_driver, write_temp};

#[test]
/// コメントと空行を飛ばし、束縛はセッションに残る。
fn script_command_runs_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(
        dir.path(),
        "setup.cltb",
        b"# buffers\n\nd = uchar(1, 2)\n  m = buffer(d)\n",
    );
    let mut s = session();
    s.run(&format!("script {}", quoted(&path)), Outcome::Good);
    assert!(s.bench.env().contains("d"));
    assert!(s.bench.env().contains("m"));
    assert_eq!(s.bench.script_depth(), 0);
}

#[test]
/// echo が有効なら各行を表示し、`@` 行は表示しない。
fn echo_skips_silent_lines() {
    let mut s = session_without_driver();
    s.bench.options_mut().echo = true;
    s.bench.options_mut().verbose = false;
    let outcome = s.bench.run_script("a = int(1)\n@b = int(2)\n").unwrap();
    assert_eq!(outcome, Outcome::Good);
    assert_eq!(s.out.take(), "a = int(1)\n");
    assert!(s.bench.env().contains("b"));
}

#[test]
/// 失敗した行で止まり、その行と位置を示す。
fn failure_stops_and_shows_line() {
    let mut s = session_without_driver();
    let outcome = s.bench.run_script("a = int(1)\nb = nope\nc = int(3)\n").unwrap();
    assert_eq!(outcome, Outcome::Fail);
    assert!(!s.bench.env().contains("c"));

    let err = s.err.take();
    let lines: Vec<&str> = err.lines().collect();
    assert_eq!(lines[0], "b = nope");
    assert_eq!(lines[1], "    ^^^^");
    assert!(lines[2].starts_with("[SEM002]"));
}

#[test]
/// スクリプト内の quit は呼び出し元まで伝わる。
fn quit_propagates_out_of_scripts() {
    let dir = tempfile::tempdir().unwrap();
    let inner = write_temp(dir.path(), "inner.cltb", b"a = int(1)\nquit\nb = int(2)\n");
    let mut s = session_without_driver();
    let outer = format!("script {}\nc = int(3)\n", quoted(&inner));
    assert_eq!(s.bench.run_script(&outer).unwrap(), Outcome::Quit);
    assert!(s.bench.env().contains("a"));
    assert!(!s.bench.env().contains("b"));
    assert!(!s.bench.env().contains("c"));
}

#[test]
/// 自分自身を呼ぶスクリプトは上限の深さで止まる。
fn self_recursive_script_hits_depth_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loop.cltb");
    let body = format!("script {}\n", quoted(&path));
    std::fs::write(&path, body).unwrap();

    let mut s = session_without_driver();
    s.bench.options_mut().caret = false;
    s.run(&format!("script {}", quoted(&path)), Outcome::Fail);
    let err = s.err.take();
    assert_eq!(err.matches("[SEM070]").count(), 1);
    assert_eq!(s.bench.script_depth(), 0);
    assert!(MAX_SCRIPT_DEPTH >= 2);
}

#[test]
/// 読めないスクリプトは失敗として報告する。
fn missing_script_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session_without_driver();
    let outcome = s.bench.run_script_file(&dir.path().join("absent.cltb"));
    assert_eq!(outcome, Outcome::Fail);
    assert!(s.err.take().contains("[IO001]"));

    s.run(&format!("script {}", quoted(&dir.path().join("absent.cltb"))), Outcome::Fail);
    assert!(s.err.take().contains("[IO001]"));
}
