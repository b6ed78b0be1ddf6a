// パス: src/repl/mod.rs
// 役割: コマンド層のファサードと再公開
// 意図: ディスパッチ・コマンド・スクリプト・対話ループを役割ごとに分け、入口だけを公開する
// 関連ファイル: src/repl/cmd.rs, src/repl/console.rs, src/bin/cltb.rs
//! コマンド層
//!
//! - `cmd`: 1 行の代入・コマンドへの振り分け
//! - `commands`: 各コマンドの処理
//! - `script`: スクリプトの逐次実行
//! - `printer`: ヘルプと表の描画
//! - `console`: 対話入力ループと履歴

pub mod cmd;
mod commands;
pub mod console;
mod printer;
pub mod script;

pub use cmd::{Command, COMMAND_NAMES};
pub use console::{run_interactive, run_interactive_with, EditorLines, LineSource, ReadResult};
pub use script::MAX_SCRIPT_DEPTH;
