// パス: src/repl/printer.rs
// 役割: ヘルプ文と一覧表の描画
// 意図: 表示形式を 1 箇所にまとめ、任意のライターへ書けるようにする
// 関連ファイル: src/repl/commands.rs, src/repl/cmd.rs
//! 対話出力の整形。

use std::io::{self, Write};

use crate::driver::{DeviceInfo, PlatformInfo};

const OVERVIEW: &str = concat!(
    "コマンド（省略形可）:\n",
    "  load [LIB]                  ドライバを読み込む（既定: sim）\n",
    "  select [platform|device N]  プラットフォーム・デバイスを選ぶ\n",
    "  info [library|platforms|devices]\n",
    "                              ドライバの情報を表示\n",
    "  list                        束縛済みオブジェクトの一覧\n",
    "  set [OPTION BOOL]           オプションの表示・変更\n",
    "  release NAME...             束縛を解放\n",
    "  save OBJ FILE               オブジェクトをファイルへ保存\n",
    "  run KERNEL((G..)[, (L..)][, ARG..])\n",
    "                              カーネルを実行\n",
    "  bind KERNEL INDEX OBJ...    カーネル引数を設定\n",
    "  script FILE                 スクリプトを実行\n",
    "  wait | flush                キューの完了待ち・送出\n",
    "  help [TOPIC]                ヘルプ（TOPIC: コマンド名か expressions）\n",
    "  quit                        終了\n",
    "\n",
    "代入: NAME = EXPR\n",
);

const EXPRESSIONS: &str = concat!(
    "式:\n",
    "  NAME                               束縛済みオブジェクト\n",
    "  (EXPR)                             括弧\n",
    "  TYPE(C, ...)                       型付き配列。TYPE は half float double\n",
    "                                     char uchar short ushort int uint long ulong\n",
    "  file(NAME|\"PATH\"[, start[, len]])  ファイルの内容（.png/.pgm/.ppm は画像）\n",
    "  buffer(SIZE) | buffer(DATA[, start[, len]])\n",
    "  image(IMAGE) | image(DATA, w, h, ORDER, TYPE)\n",
    "                                     ORDER: cl_r cl_ra cl_rgb cl_rgba\n",
    "  program(\"SRC\"|DATA[, \"OPTS\"])\n",
    "  binary(DATA[, \"OPTS\"])\n",
    "  kernel(PROGRAM, NAME)\n",
    "  clone(OBJ)\n",
);

/// ヘルプの話題。先頭からコマンド名と同じ並び。
pub(crate) const HELP_TOPICS: [&str; 15] = [
    "load",
    "select",
    "info",
    "list",
    "set",
    "release",
    "save",
    "run",
    "script",
    "wait",
    "flush",
    "bind",
    "help",
    "quit",
    "expressions",
];

const TOPIC_TEXT: [&str; 15] = [
    "load [LIB]\n  ドライバライブラリを読み込む。既存のドライバオブジェクトは解放される。\n",
    "select\n  現在の選択を表示する。\nselect platform N | select device N\n  選択を切り替える。ドライバオブジェクトは解放される。\n",
    "info library | info platforms | info devices\n  ドライバの情報を表示する。省略時はすべて。\n",
    "list\n  束縛済みオブジェクトの名前と種別を表示する。\n",
    "set\n  オプションの現在値を表示する。\nset OPTION BOOL\n  OPTION: verbose caret echo block。BOOL: 1 0 y n yes no t f true false\n",
    "release NAME...\n  名前の束縛を解放する。1 つでも未定義なら何もしない。\n",
    "save OBJ FILE\n  データ・メモリ・プログラムの内容を保存する。.png/.pgm/.ppm は画像として書く。\n",
    "run KERNEL((G...)[, (L...)][, ARG...])\n  グローバル・ローカルサイズ（最大 3 次元）でカーネルを実行する。\n  ARG は引数 0 から順に設定される。定数は型付きで書く（例: ulong(16)）。\n",
    "script FILE\n  各行を実行する。空行と # で始まる行は無視、@ で始まる行は表示しない。\n  最初の失敗で止まる。\n",
    "wait\n  投入済みの操作が終わるのを待つ。\n",
    "flush\n  投入済みの操作をデバイスへ送る。\n",
    "bind KERNEL INDEX OBJ...\n  INDEX から順にカーネル引数を設定する。\n",
    "help [TOPIC]\n  ヘルプを表示する。\n",
    "quit\n  終了する。\n",
    EXPRESSIONS,
];

/// 概要を描画する。
pub(crate) fn render_help<W: Write>(out: &mut W) -> io::Result<()> {
    out.write_all(OVERVIEW.as_bytes())
}

pub(crate) fn render_topic<W: Write>(out: &mut W, topic: usize) -> io::Result<()> {
    match TOPIC_TEXT.get(topic) {
        Some(text) => out.write_all(text.as_bytes()),
        None => render_help(out),
    }
}

/// 2 列の表を描画する。1 列目は最長の項目に合わせて揃える。
pub(crate) fn render_table<W: Write>(
    out: &mut W,
    header: (&str, &str),
    rows: &[(String, String)],
) -> io::Result<()> {
    let width = rows
        .iter()
        .map(|(name, _)| name.chars().count())
        .chain(std::iter::once(header.0.chars().count()))
        .max()
        .unwrap_or(0);
    writeln!(out, "{:<width$}  {}", header.0, header.1, width = width)?;
    writeln!(out, "{}  {}", "-".repeat(width), "-".repeat(header.1.chars().count().max(4)))?;
    for (name, tag) in rows {
        writeln!(out, "{:<width$}  {}", name, tag, width = width)?;
    }
    Ok(())
}

pub(crate) fn render_platforms<W: Write>(
    out: &mut W,
    platforms: &[PlatformInfo],
    selected: usize,
) -> io::Result<()> {
    writeln!(out, "プラットフォーム:")?;
    for (index, platform) in platforms.iter().enumerate() {
        let mark = if index == selected { '*' } else { ' ' };
        writeln!(
            out,
            " {}{} {} ({}, {})",
            mark, index, platform.name, platform.vendor, platform.version
        )?;
    }
    Ok(())
}

pub(crate) fn render_devices<W: Write>(
    out: &mut W,
    devices: &[DeviceInfo],
    selected: usize,
) -> io::Result<()> {
    writeln!(out, "デバイス:")?;
    for (index, device) in devices.iter().enumerate() {
        let mark = if index == selected { '*' } else { ' ' };
        writeln!(
            out,
            " {}{} {} ({}, {}) 計算ユニット {}、メモリ {} MiB",
            mark,
            index,
            device.name,
            device.vendor,
            device.version,
            device.compute_units,
            device.global_memory / (1024 * 1024)
        )?;
    }
    Ok(())
}
