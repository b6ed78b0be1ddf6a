// パス: src/repl/commands.rs
// 役割: 各トップレベルコマンドの処理
// 意図: 引数の読み取りと検査をコマンドごとに閉じ込め、結果は `Outcome` で返す
// 関連ファイル: src/repl/cmd.rs, src/repl/printer.rs, src/repl/script.rs

use std::path::{Path, PathBuf};

use crate::autocomplete::{autocomplete, Match};
use crate::driver::KernelArg;
use crate::env::BindingError;
use crate::errors::{CommandError, CommandResult, ErrorKind, Span};
use crate::evaluator::invalid_token_error;
use crate::fileio::ImageView;
use crate::lexer::{Token, TokenKind};
use crate::object::{Object, ObjectRef};
use crate::parser::TokenStream;
use crate::testbench::{Outcome, Testbench};

use super::printer::{render_devices, render_help, render_platforms, render_table, render_topic, HELP_TOPICS};

const SELECT_TARGETS: [&str; 2] = ["platform", "device"];
const INFO_TOPICS: [&str; 3] = ["library", "platforms", "devices"];
const OPTION_NAMES: [&str; 4] = ["verbose", "caret", "echo", "block"];

/// 作業サイズの最大次元数。
const MAX_DIMENSIONS: usize = 3;

/// 候補から 1 つを選ぶ。曖昧・不明ならトークン位置のエラー。
fn choose(ts: &TokenStream<'_>, token: Token, candidates: &'static [&'static str], what: &'static str) -> CommandResult<usize> {
    let text = ts.text(token).to_string();
    match autocomplete(&text, candidates) {
        Match::Found(index) => Ok(index),
        Match::Ambiguous => Err(CommandError::with(ErrorKind::Semantic, "SEM052", move |f| {
            write!(f, "{} '{}' は曖昧です", what, text)
        })
        .at(token.span())),
        Match::NotFound => Err(CommandError::with(ErrorKind::Semantic, "SEM053", move |f| {
            write!(f, "{} '{}' は不明です（{} のいずれか）", what, text, candidates.join(", "))
        })
        .at(token.span())),
    }
}

/// 数値定数の引数を 1 つ読む。
fn numeric<T: crate::parser::Constant>(ts: &mut TokenStream<'_>, what: &'static str) -> CommandResult<(T, Token)> {
    let token = ts.current();
    if !token.is(TokenKind::Constant) {
        return Err(CommandError::with(ErrorKind::Semantic, "SYN012", move |f| {
            write!(f, "{} には数値定数が必要です", what)
        })
        .at(token.span()));
    }
    ts.advance();
    Ok((ts.parse_constant(token)?, token))
}

/// ファイル名を読む。引用テキストでなければ残りの入力全体をファイル名とする。
fn path_argument(ts: &mut TokenStream<'_>) -> CommandResult<(String, Span)> {
    let token = ts.current();
    match token.kind {
        TokenKind::Text => {
            ts.advance();
            Ok((ts.unquoted(token)?, token.span()))
        }
        TokenKind::End => Err(CommandError::semantic("SYN030", "ファイル名が必要です").at(token.span())),
        TokenKind::Invalid => Err(invalid_token_error(ts, token)),
        _ => {
            let rest = ts.remaining_text();
            let span = Span::new(token.begin, token.begin + rest.len());
            while ts.has_more() {
                ts.advance();
            }
            Ok((rest.to_string(), span))
        }
    }
}

/// `(N[, N[, N]])` の作業サイズ。
fn work_size(ts: &mut TokenStream<'_>) -> CommandResult<Vec<usize>> {
    let open = ts.require(TokenKind::OpenParen, "SYN051", "'(' で始まる作業サイズが必要です")?;
    let mut dims = Vec::new();
    let close = loop {
        let (dim, _) = numeric::<usize>(ts, "作業サイズ")?;
        dims.push(dim);
        if ts.accept(TokenKind::Comma).is_none() {
            break ts.require(TokenKind::CloseParen, "SYN011", "')' が必要です")?;
        }
    };
    if dims.len() > MAX_DIMENSIONS {
        return Err(CommandError::semantic("SEM061", "作業サイズは 3 次元までです")
            .at(open.span().cover(close.span())));
    }
    Ok(dims)
}

/// カーネル引数として渡せる形に変える。
fn kernel_arg(object: &Object) -> Option<KernelArg<'_>> {
    match object {
        Object::Memory(mem) => Some(KernelArg::Memory(mem)),
        other => other.as_data().map(|data| KernelArg::Bytes(data.bytes())),
    }
}

fn untyped_constant(ts: &TokenStream<'_>, token: Token) -> CommandError {
    let text = ts.text(token).to_string();
    CommandError::with(ErrorKind::Semantic, "SEM060", move |f| {
        write!(f, "定数の引数には型が必要です（例: ulong({})）", text)
    })
    .at(token.span())
}

fn kernel_required(token: Token) -> CommandError {
    CommandError::semantic("SEM062", "カーネルが必要です").at(token.span())
}

fn argument_required(token: Token) -> CommandError {
    CommandError::semantic("SEM063", "カーネル引数にはメモリかデータが必要です").at(token.span())
}

impl Testbench {
    /// 残りの入力があれば無視する旨を警告する。
    fn warn_trailing(&mut self, ts: &TokenStream<'_>, command: &str) -> CommandResult<()> {
        if ts.current().is(TokenKind::End) {
            return Ok(());
        }
        self.warn(format_args!(
            "'{}' の後の '{}' は無視します",
            command,
            ts.remaining_text()
        ))
    }

    fn note_cleared(&mut self, cleared: usize) -> CommandResult<()> {
        if cleared > 0 {
            self.note(format_args!("ドライバオブジェクト {} 個を解放しました", cleared))?;
        }
        Ok(())
    }

    /// `load [LIB]`
    pub(super) fn cmd_load(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        let token = ts.current();
        let name = if ts.has_more() {
            ts.advance();
            ts.word_or_text(token)?
        } else {
            self.loader.default_library().to_string()
        };
        self.warn_trailing(ts, "load")?;
        let driver = self.loader.load(&name).map_err(|err| {
            let err = CommandError::from(err);
            if token.is(TokenKind::End) {
                err
            } else {
                err.at(token.span())
            }
        })?;
        let cleared = self.set_driver(driver);
        self.note(format_args!("ドライバ '{}' を読み込みました", name))?;
        self.note_cleared(cleared)?;
        Ok(Outcome::Good)
    }

    /// `select` / `select platform N` / `select device N`
    pub(super) fn cmd_select(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        if !ts.has_more() {
            let driver = self.active_driver()?;
            let selection = driver.selection();
            let platform = driver
                .platforms()?
                .into_iter()
                .nth(selection.platform)
                .map(|p| p.name)
                .unwrap_or_default();
            let device = driver
                .devices()?
                .into_iter()
                .nth(selection.device)
                .map(|d| d.name)
                .unwrap_or_default();
            self.say(format_args!("プラットフォーム {}: {}", selection.platform, platform))?;
            self.say(format_args!("デバイス {}: {}", selection.device, device))?;
            return Ok(Outcome::Good);
        }
        let target_token = ts.consume();
        let target = choose(ts, target_token, &SELECT_TARGETS, "選択対象")?;
        let (index, index_token) = numeric::<usize>(ts, "番号")?;
        self.warn_trailing(ts, "select")?;
        let driver = self.active_driver()?;
        let selected = if target == 0 {
            driver.select_platform(index)
        } else {
            driver.select_device(index)
        };
        selected.map_err(|err| CommandError::from(err).at(index_token.span()))?;
        let cleared = self.invalidate_driver_objects();
        self.note(format_args!("{} {} を選択しました", SELECT_TARGETS[target], index))?;
        self.note_cleared(cleared)?;
        Ok(Outcome::Good)
    }

    /// `info [library|platforms|devices]`
    pub(super) fn cmd_info(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        let topics: Vec<usize> = if ts.has_more() {
            let token = ts.consume();
            vec![choose(ts, token, &INFO_TOPICS, "情報の種類")?]
        } else {
            (0..INFO_TOPICS.len()).collect()
        };
        self.warn_trailing(ts, "info")?;
        let driver = self.active_driver()?;
        let library = driver.library_name().to_string();
        let selection = driver.selection();
        let platforms = driver.platforms()?;
        let devices = driver.devices()?;
        for topic in topics {
            match topic {
                0 => self.say(format_args!("ライブラリ: {}", library))?,
                1 => render_platforms(&mut self.out, &platforms, selection.platform)?,
                _ => render_devices(&mut self.out, &devices, selection.device)?,
            }
        }
        Ok(Outcome::Good)
    }

    /// `list`
    pub(super) fn cmd_list(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        self.warn_trailing(ts, "list")?;
        if self.env.is_empty() {
            self.say(format_args!("束縛されたオブジェクトはありません"))?;
            return Ok(Outcome::Good);
        }
        let rows: Vec<(String, String)> = self
            .env
            .iter()
            .map(|(name, object)| (name.to_string(), object.type_tag()))
            .collect();
        render_table(&mut self.out, ("Identifier", "Type"), &rows)?;
        Ok(Outcome::Good)
    }

    /// `set` / `set OPTION BOOL`
    pub(super) fn cmd_set(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        if !ts.has_more() {
            let options = self.options;
            let values = [options.verbose, options.caret, options.echo, options.block];
            for (name, value) in OPTION_NAMES.iter().zip(values) {
                self.say(format_args!("{:<8} {}", name, value))?;
            }
            return Ok(Outcome::Good);
        }
        let name_token = ts.consume();
        let option = choose(ts, name_token, &OPTION_NAMES, "オプション")?;
        let value_token = ts.current();
        if !ts.has_more() {
            return Err(CommandError::semantic("SYN052", "真偽値が必要です").at(value_token.span()));
        }
        ts.advance();
        let value: bool = ts.parse_constant(value_token)?;
        self.warn_trailing(ts, "set")?;
        match option {
            0 => self.options.verbose = value,
            1 => self.options.caret = value,
            2 => self.options.echo = value,
            _ => {
                self.options.block = value;
                if let Some(driver) = self.driver.as_deref_mut() {
                    driver.set_blocking(value);
                }
            }
        }
        Ok(Outcome::Good)
    }

    /// `release NAME...`。未定義の名前が 1 つでもあれば何も解放しない。
    pub(super) fn cmd_release(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        if !ts.has_more() {
            return Err(CommandError::semantic("SYN053", "解放する名前が必要です").at(ts.current_span()));
        }
        let mut names = Vec::new();
        while ts.has_more() {
            let token = ts.consume();
            if token.is(TokenKind::Comma) {
                continue;
            }
            if !token.is(TokenKind::String) {
                return Err(CommandError::semantic("SYN054", "識別子が必要です").at(token.span()));
            }
            let name = ts.text(token);
            if !self.env.contains(name) {
                return Err(CommandError::from(BindingError::NotFound(name.to_string())).at(token.span()));
            }
            names.push(name);
        }
        if ts.current().is(TokenKind::Invalid) {
            return Err(invalid_token_error(ts, ts.current()));
        }
        let released = self.env.release(names.iter().copied())?;
        self.note(format_args!("{} 個の束縛を解放しました", released))?;
        Ok(Outcome::Good)
    }

    /// `save OBJ FILE`
    pub(super) fn cmd_save(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        let object_token = ts.current();
        let object = self.evaluate(ts)?;
        let (name, path_span) = path_argument(ts)?;
        self.warn_trailing(ts, "save")?;
        let path = PathBuf::from(&name);
        let bytes = self
            .serialize(&object, &path)
            .map_err(|err| err.at(object_token.span()))?;
        self.files
            .write_file(&path, &bytes)
            .map_err(|err| CommandError::from(err).at(path_span))?;
        self.note(format_args!("{} バイトを '{}' に保存しました", bytes.len(), name))?;
        Ok(Outcome::Good)
    }

    /// 保存用のバイト列を作る。画像はコーデックが扱える拡張子なら符号化する。
    fn serialize(&mut self, object: &Object, path: &Path) -> CommandResult<Vec<u8>> {
        match object {
            Object::Data(data) => Ok(data.bytes().to_vec()),
            Object::Image(image) => {
                let view = ImageView {
                    format: image.format(),
                    desc: image.desc(),
                    bytes: image.data().bytes(),
                };
                Ok(self
                    .codec
                    .encode_if_recognized(path, view)?
                    .unwrap_or_else(|| image.data().bytes().to_vec()))
            }
            Object::Memory(mem) => {
                let mut bytes = Vec::new();
                bytes.try_reserve_exact(mem.size())?;
                bytes.resize(mem.size(), 0);
                let driver = self.active_driver()?;
                match (mem.image_format(), mem.image_desc()) {
                    (Some(format), Some(desc)) => {
                        driver.read_image(mem, [0; 3], desc.region(), &mut bytes)?;
                        let view = ImageView {
                            format,
                            desc,
                            bytes: &bytes,
                        };
                        match self.codec.encode_if_recognized(path, view)? {
                            Some(encoded) => Ok(encoded),
                            None => Ok(bytes),
                        }
                    }
                    _ => {
                        driver.read_buffer(mem, 0, &mut bytes)?;
                        Ok(bytes)
                    }
                }
            }
            Object::Program(program) => Ok(self.active_driver()?.program_binary(program)?),
            Object::Kernel(_) => Err(CommandError::semantic("SEM064", "カーネルは保存できません")),
        }
    }

    /// `run KERNEL((G...)[, (L...)][, ARG...])`
    pub(super) fn cmd_run(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        let kernel_token = ts.current();
        let kernel_object = self.evaluate(ts)?;
        let kernel = kernel_object
            .as_kernel()
            .ok_or_else(|| kernel_required(kernel_token))?;
        ts.require(TokenKind::OpenParen, "SYN050", "カーネルの後には '(' が必要です")?;
        let global = work_size(ts)?;
        let mut local: Option<Vec<usize>> = None;
        let mut args: Vec<(Token, ObjectRef)> = Vec::new();
        loop {
            if ts.accept(TokenKind::CloseParen).is_some() {
                break;
            }
            ts.require(TokenKind::Comma, "SYN013", "',' か ')' が必要です")?;
            if local.is_none()
                && args.is_empty()
                && ts.current().is(TokenKind::OpenParen)
                && ts.next().is(TokenKind::Constant)
            {
                let local_token = ts.current();
                let dims = work_size(ts)?;
                if dims.len() != global.len() {
                    return Err(CommandError::semantic(
                        "SEM065",
                        "ローカルサイズの次元数がグローバルサイズと一致しません",
                    )
                    .at(local_token.span()));
                }
                local = Some(dims);
                continue;
            }
            let token = ts.current();
            if token.is(TokenKind::Constant) {
                return Err(untyped_constant(ts, token));
            }
            let object = self.evaluate(ts)?;
            args.push((token, object));
        }
        self.warn_trailing(ts, "run")?;

        let driver = self.active_driver()?;
        for (index, (token, object)) in args.iter().enumerate() {
            let arg = kernel_arg(object).ok_or_else(|| argument_required(*token))?;
            driver
                .set_kernel_arg(kernel, index as u32, arg)
                .map_err(|err| CommandError::from(err).at(token.span()))?;
        }
        driver
            .enqueue_kernel(kernel, &global, local.as_deref())
            .map_err(|err| CommandError::from(err).at(kernel_token.span()))?;
        if driver.blocking() {
            driver.finish()?;
        } else {
            self.in_flight.extend(args.into_iter().map(|(_, object)| object));
        }
        Ok(Outcome::Good)
    }

    /// `bind KERNEL INDEX OBJ...`
    pub(super) fn cmd_bind(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        let kernel_token = ts.current();
        let kernel_object = self.evaluate(ts)?;
        let kernel = kernel_object
            .as_kernel()
            .ok_or_else(|| kernel_required(kernel_token))?;
        ts.accept(TokenKind::Comma);
        let (first, _) = numeric::<u32>(ts, "引数番号")?;
        let mut args: Vec<(Token, ObjectRef)> = Vec::new();
        loop {
            ts.accept(TokenKind::Comma);
            if !ts.has_more() {
                break;
            }
            let token = ts.current();
            if token.is(TokenKind::Constant) {
                return Err(untyped_constant(ts, token));
            }
            let object = self.evaluate(ts)?;
            args.push((token, object));
        }
        if ts.current().is(TokenKind::Invalid) {
            return Err(invalid_token_error(ts, ts.current()));
        }
        if args.is_empty() {
            return Err(CommandError::semantic("SYN055", "設定するオブジェクトが必要です").at(ts.current_span()));
        }

        let driver = self.active_driver()?;
        for (offset, (token, object)) in args.iter().enumerate() {
            let arg = kernel_arg(object).ok_or_else(|| argument_required(*token))?;
            driver
                .set_kernel_arg(kernel, first + offset as u32, arg)
                .map_err(|err| CommandError::from(err).at(token.span()))?;
        }
        Ok(Outcome::Good)
    }

    /// `script FILE`
    pub(super) fn cmd_script(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        let (name, span) = path_argument(ts)?;
        self.warn_trailing(ts, "script")?;
        let source = self
            .files
            .read_to_string(Path::new(&name))
            .map_err(|err| CommandError::from(err).at(span))?;
        self.run_script(&source).map_err(|err| err.at(span))
    }

    /// `wait`
    pub(super) fn cmd_wait(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        self.warn_trailing(ts, "wait")?;
        self.active_driver()?.finish()?;
        self.in_flight.clear();
        Ok(Outcome::Good)
    }

    /// `flush`
    pub(super) fn cmd_flush(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        self.warn_trailing(ts, "flush")?;
        self.active_driver()?.flush()?;
        Ok(Outcome::Good)
    }

    /// `help [TOPIC]`
    pub(super) fn cmd_help(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        if !ts.has_more() {
            render_help(&mut self.out)?;
            return Ok(Outcome::Good);
        }
        let token = ts.consume();
        let topic = choose(ts, token, &HELP_TOPICS, "ヘルプの話題")?;
        self.warn_trailing(ts, "help")?;
        render_topic(&mut self.out, topic)?;
        Ok(Outcome::Good)
    }

    /// `quit`
    pub(super) fn cmd_quit(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Outcome> {
        self.warn_trailing(ts, "quit")?;
        Ok(Outcome::Quit)
    }
}
