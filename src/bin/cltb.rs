// パス: src/bin/cltb.rs
// 役割: コマンドライン引数を解釈してセッションを起動する実行ファイル
// 意図: 起動時のドライバ読み込み・一括実行・対話ループを 1 つの入口にまとめる
// 関連ファイル: src/testbench.rs, src/repl/console.rs, src/lib.rs
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cltb::repl::run_interactive;
use cltb::{Outcome, Testbench};

/// 計算 API ドライバを対話的に試すコマンド・式言語
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// 起動時に読み込むドライバライブラリ
    library: Option<String>,
    /// 起動時にドライバを読み込まない
    #[arg(long)]
    no_auto_load: bool,
    /// 実行するスクリプト（複数可、指定順）
    #[arg(short, long = "script", value_name = "FILE")]
    scripts: Vec<PathBuf>,
    /// 実行するコマンド行（複数可、スクリプトの後に指定順）
    #[arg(short, long = "command", value_name = "LINE")]
    commands: Vec<String>,
    /// 一括実行の後も対話ループに入る
    #[arg(short, long)]
    interactive: bool,
    /// 補足メッセージを表示しない
    #[arg(short, long)]
    quiet: bool,
    /// エラー位置のキャレットを表示しない
    #[arg(long)]
    no_caret: bool,
    /// スクリプトの各行を表示する
    #[arg(long)]
    echo: bool,
    /// ドライバ操作の完了を待たない
    #[arg(long)]
    no_block: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut bench = Testbench::new();
    {
        let options = bench.options_mut();
        options.verbose = !args.quiet;
        options.caret = !args.no_caret;
        options.echo = args.echo;
        options.block = !args.no_block;
    }

    if !args.no_auto_load || args.library.is_some() {
        let line = match &args.library {
            Some(library) => format!("load \"{}\"", library.replace('\\', "\\\\").replace('"', "\\\"")),
            None => "load".to_string(),
        };
        if bench.run_line(&line) != Outcome::Good && args.library.is_some() {
            return ExitCode::FAILURE;
        }
    }

    let batch = !args.scripts.is_empty() || !args.commands.is_empty();
    let mut last = Outcome::Good;
    for script in &args.scripts {
        last = bench.run_script_file(script);
        if last != Outcome::Good {
            break;
        }
    }
    if last == Outcome::Good {
        for line in &args.commands {
            last = bench.run_line(line);
            if last != Outcome::Good {
                break;
            }
        }
    }

    if last != Outcome::Quit && (!batch || args.interactive) {
        last = run_interactive(&mut bench);
    }

    match last {
        Outcome::Fail => ExitCode::FAILURE,
        Outcome::Good | Outcome::Quit => ExitCode::SUCCESS,
    }
}
