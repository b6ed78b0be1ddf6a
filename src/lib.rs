// パス: src/lib.rs
// 役割: クレートのルート。モジュールの配線と公開 API の再エクスポート
// 意図: 対話セッション `Testbench` を中心に最小限の入口だけを外へ見せる
// 関連ファイル: src/testbench.rs, src/repl/mod.rs, src/bin/cltb.rs
//! cltb: 計算 API ドライバを対話的に試すコマンド・式言語
//!
//! 構成:
//! - `lexer` / `parser`: 1 行を位置付きトークンにし、カーソルで読む。
//! - `evaluator`: 式からオブジェクト（ホストデータ・デバイスメモリ・プログラム・カーネル）を作る。
//! - `repl`: コマンドのディスパッチ、スクリプト実行、対話ループ。
//! - `driver`: ドライバの抽象とシミュレータ実装。
//! - `fileio`: ファイル読み書きと画像コーデック。
//!
//! 方針:
//! - コメント/ドキュメントは日本語、識別子は英語。
//! - エラーは `Testbench::run_line` の 1 箇所で捕捉して診断に変える。

pub mod autocomplete;
pub mod diagnostics;
pub mod driver;
pub mod env;
pub mod errors;
pub mod evaluator;
pub mod fileio;
pub mod half;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod repl;
pub mod testbench;

pub use crate::errors::{CommandError, CommandResult, ErrorKind, Span};
pub use crate::object::{Object, ObjectRef};
pub use crate::testbench::{Capture, Options, Outcome, Testbench, PROMPT};
