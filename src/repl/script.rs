// パス: src/repl/script.rs
// 役割: スクリプトの各行を順に実行する
// 意図: 入れ子の深さはスコープで管理し、どの経路で抜けても元に戻す
// 関連ファイル: src/repl/commands.rs, src/testbench.rs, src/diagnostics.rs
//! スクリプト実行
//!
//! - 空行と `#` で始まる行は読み飛ばす。
//! - `@` で始まる行は `echo` が有効でも表示しない。
//! - 最初に `Good` 以外となった行の結果をそのまま返す。

use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use tracing::debug;

use crate::errors::{CommandError, CommandResult};
use crate::lexer::trim_whitespace;
use crate::testbench::{Outcome, Testbench};

/// スクリプトの入れ子の上限。自分自身を呼ぶスクリプトで止まるようにする。
pub const MAX_SCRIPT_DEPTH: usize = 32;

/// 生存中はスクリプトの深さを 1 つ増やしておくガード。
struct ScriptScope<'t> {
    bench: &'t mut Testbench,
}

impl<'t> ScriptScope<'t> {
    fn enter(bench: &'t mut Testbench) -> Self {
        bench.script_depth += 1;
        Self { bench }
    }
}

impl Deref for ScriptScope<'_> {
    type Target = Testbench;

    fn deref(&self) -> &Testbench {
        self.bench
    }
}

impl DerefMut for ScriptScope<'_> {
    fn deref_mut(&mut self) -> &mut Testbench {
        self.bench
    }
}

impl Drop for ScriptScope<'_> {
    fn drop(&mut self) {
        self.bench.script_depth -= 1;
    }
}

impl Testbench {
    /// スクリプト本文を実行する。各行のエラーはその場で報告済み。
    pub fn run_script(&mut self, source: &str) -> CommandResult<Outcome> {
        if self.script_depth >= MAX_SCRIPT_DEPTH {
            return Err(CommandError::semantic(
                "SEM070",
                "スクリプトの入れ子が深すぎます",
            ));
        }
        let mut scope = ScriptScope::enter(self);
        debug!(depth = scope.script_depth, "script start");
        for raw in source.lines() {
            let line = trim_whitespace(raw);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (line, silent) = match line.strip_prefix('@') {
                Some(rest) => (trim_whitespace(rest), true),
                None => (line, false),
            };
            if !silent && scope.options.echo {
                writeln!(scope.out, "{}", line)?;
            }
            let outcome = scope.run_line(line);
            if outcome != Outcome::Good {
                return Ok(outcome);
            }
        }
        Ok(Outcome::Good)
    }

    /// ファイルからスクリプトを読み込んで実行する。失敗は報告して `Fail` を返す。
    pub fn run_script_file(&mut self, path: &Path) -> Outcome {
        let result = self
            .files
            .read_to_string(path)
            .map_err(CommandError::from)
            .and_then(|source| self.run_script(&source));
        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.report("", &err);
                Outcome::Fail
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testbench::Capture;

    fn bench() -> (Testbench, Capture, Capture) {
        let out = Capture::new();
        let err = Capture::new();
        let tb = Testbench::new().with_output(out.clone(), err.clone());
        (tb, out, err)
    }

    #[test]
    /// コメントと空行を飛ばし、深さは終了後に元へ戻る。
    fn skips_comments_and_restores_depth() {
        let (mut tb, _out, _err) = bench();
        let outcome = tb.run_script("# comment\n\n  a = int(1)\n\tb = a\n").unwrap();
        assert_eq!(outcome, Outcome::Good);
        assert_eq!(tb.script_depth(), 0);
        assert!(tb.env().contains("b"));
    }

    #[test]
    /// 最初の失敗で止まり、以降の行は実行しない。
    fn stops_at_first_failure() {
        let (mut tb, _out, err) = bench();
        let outcome = tb.run_script("a = int(1)\nbogus\nc = int(3)\n").unwrap();
        assert_eq!(outcome, Outcome::Fail);
        assert!(!tb.env().contains("c"));
        assert_eq!(tb.script_depth(), 0);
        let text = err.contents();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "bogus");
        assert_eq!(lines[1], "^^^^^");
    }

    #[test]
    /// echo 有効時も @ 付きの行は表示しない。
    fn echo_skips_silent_lines() {
        let (mut tb, out, _err) = bench();
        tb.options_mut().echo = true;
        tb.options_mut().verbose = false;
        tb.run_script("a = int(1)\n@ b = int(2)\n").unwrap();
        assert_eq!(out.contents(), "a = int(1)\n");
        assert!(tb.env().contains("b"));
    }

    #[test]
    /// quit はスクリプトの外へ伝わる。
    fn quit_propagates() {
        let (mut tb, _out, _err) = bench();
        let outcome = tb.run_script("quit\na = int(1)\n").unwrap();
        assert_eq!(outcome, Outcome::Quit);
        assert!(!tb.env().contains("a"));
    }

    #[test]
    /// 自分自身を呼ぶスクリプトは深さの上限で止まる。
    fn recursive_script_hits_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("self.cltb");
        std::fs::write(&path, format!("script \"{}\"\n", path.display())).unwrap();
        let (mut tb, _out, err) = bench();
        assert_eq!(tb.run_script_file(&path), Outcome::Fail);
        assert_eq!(tb.script_depth(), 0);
        assert!(err.contents().contains("SEM070"));
    }
}
