// パス: src/evaluator/memory.rs
// 役割: デバイスメモリを作る `buffer` `image` と、複製する `clone` 構築子
// 意図: ホストデータの切り出し範囲と画像形式をドライバ呼び出し前に検査する
// 関連ファイル: src/driver/mod.rs, src/object.rs, src/evaluator/mod.rs

use std::rc::Rc;

use super::{close_arguments, constant_argument, open_arguments};
use crate::autocomplete::{autocomplete, Match};
use crate::driver::{ChannelOrder, ChannelType, ImageDesc, ImageFormat};
use crate::errors::{CommandError, CommandResult, ErrorKind};
use crate::lexer::{Token, TokenKind};
use crate::object::Object;
use crate::parser::TokenStream;
use crate::testbench::Testbench;

fn data_required(token: Token, keyword: &'static str) -> CommandError {
    CommandError::with(ErrorKind::Semantic, "SEM032", move |f| {
        write!(f, "'{}' の初期値にはデータオブジェクトが必要です", keyword)
    })
    .at(token.span())
}

/// `,` を 1 つ要求する。
fn comma(ts: &mut TokenStream<'_>) -> CommandResult<()> {
    ts.require(TokenKind::Comma, "SYN014", "',' が必要です").map(|_| ())
}

fn channel_order(ts: &mut TokenStream<'_>) -> CommandResult<ChannelOrder> {
    let token = ts.consume();
    ChannelOrder::from_name(ts.text(token)).ok_or_else(|| {
        CommandError::semantic(
            "SEM033",
            "チャネル並びは cl_r, cl_ra, cl_rgb, cl_rgba のいずれかです",
        )
        .at(token.span())
    })
}

fn channel_type(ts: &mut TokenStream<'_>) -> CommandResult<ChannelType> {
    let token = ts.consume();
    let text = ts.text(token).to_string();
    match autocomplete(&text, &ChannelType::NAMES) {
        Match::Found(index) => Ok(ChannelType::ALL[index]),
        Match::Ambiguous => Err(CommandError::with(ErrorKind::Semantic, "SEM034", move |f| {
            write!(f, "チャネル型 '{}' は曖昧です", text)
        })
        .at(token.span())),
        Match::NotFound => Err(CommandError::with(ErrorKind::Semantic, "SEM035", move |f| {
            write!(
                f,
                "チャネル型 '{}' は不明です（{} のいずれか）",
                text,
                ChannelType::NAMES.join(", ")
            )
        })
        .at(token.span())),
    }
}

impl Testbench {
    /// `buffer(SIZE)` または `buffer(DATA[, start[, length]])`
    pub(super) fn eval_buffer(&mut self, ts: &mut TokenStream<'_>, keyword: Token) -> CommandResult<Object> {
        self.require_driver("buffer", keyword.span())?;
        open_arguments(ts, "buffer")?;

        if let Some(size_token) = ts.accept(TokenKind::Constant) {
            let size: usize = ts.parse_constant(size_token)?;
            close_arguments(ts)?;
            let mem = self
                .active_driver()?
                .create_buffer(size)
                .map_err(|err| CommandError::from(err).at(size_token.span()))?;
            return Ok(Object::from(mem));
        }

        let data_token = ts.current();
        let source = self.evaluate(ts)?;
        let data = source.as_data().ok_or_else(|| data_required(data_token, "buffer"))?;
        let mut start = 0usize;
        let mut length = data.len();
        if ts.accept(TokenKind::Comma).is_some() {
            let start_token = constant_argument(ts, "開始位置")?;
            start = ts.parse_constant(start_token)?;
            if start >= data.len() {
                let size = data.len();
                return Err(CommandError::with(ErrorKind::Semantic, "SEM036", move |f| {
                    write!(f, "開始位置 {} がデータサイズ {} を超えています", start, size)
                })
                .at(start_token.span()));
            }
            length = data.len() - start;
            if ts.accept(TokenKind::Comma).is_some() {
                let length_token = constant_argument(ts, "長さ")?;
                let requested: usize = ts.parse_constant(length_token)?;
                if requested == 0 {
                    return Err(CommandError::semantic("SEM031", "長さは 1 以上です").at(length_token.span()));
                }
                if requested > length {
                    self.note(format_args!(
                        "長さ {} をデータ末尾に合わせて {} に切り詰めました",
                        requested, length
                    ))?;
                } else {
                    length = requested;
                }
            }
        }
        close_arguments(ts)?;

        let driver = self.active_driver()?;
        let mem = driver.create_buffer(length)?;
        driver.write_buffer(&mem, 0, &data.bytes()[start..start + length])?;
        if !driver.blocking() {
            self.in_flight.push(Rc::clone(&source));
        }
        Ok(Object::from(mem))
    }

    /// `image(IMAGE)` または `image(DATA, width, height, ORDER, TYPE)`
    pub(super) fn eval_image(&mut self, ts: &mut TokenStream<'_>, keyword: Token) -> CommandResult<Object> {
        self.require_driver("image", keyword.span())?;
        open_arguments(ts, "image")?;

        let data_token = ts.current();
        let source = self.evaluate(ts)?;
        let (format, desc, bytes) = if ts.accept(TokenKind::Comma).is_some() {
            let data = source.as_data().ok_or_else(|| data_required(data_token, "image"))?;
            let width_token = constant_argument(ts, "幅")?;
            let width: usize = ts.parse_constant(width_token)?;
            if width == 0 {
                return Err(CommandError::semantic("SEM037", "幅は 1 以上です").at(width_token.span()));
            }
            comma(ts)?;
            let height_token = constant_argument(ts, "高さ")?;
            let height: usize = ts.parse_constant(height_token)?;
            comma(ts)?;
            let order = channel_order(ts)?;
            comma(ts)?;
            let data_type = channel_type(ts)?;

            let format = ImageFormat::new(order, data_type);
            let desc = ImageDesc::new(width, height);
            let size = desc.byte_size(&format);
            if size > data.len() {
                let available = data.len();
                return Err(CommandError::with(ErrorKind::Semantic, "SEM038", move |f| {
                    write!(
                        f,
                        "画像サイズ {} バイトがデータサイズ {} バイトを超えています",
                        size, available
                    )
                })
                .at(data_token.span()));
            }
            (format, desc, &data.bytes()[..size])
        } else {
            let image = source.as_image().ok_or_else(|| {
                CommandError::semantic(
                    "SEM039",
                    "形式を指定しない 'image' には画像データが必要です",
                )
                .at(data_token.span())
            })?;
            (image.format(), image.desc(), image.data().bytes())
        };
        close_arguments(ts)?;

        let mem = self.active_driver()?.create_image(format, desc, Some(bytes))?;
        Ok(Object::from(mem))
    }

    /// `clone(OBJ)`: バッファ・画像・カーネルを複製する。
    pub(super) fn eval_clone(&mut self, ts: &mut TokenStream<'_>) -> CommandResult<Object> {
        open_arguments(ts, "clone")?;
        let token = ts.current();
        let source = self.evaluate(ts)?;
        close_arguments(ts)?;

        match source.as_ref() {
            Object::Memory(mem) => {
                let driver = self.active_driver()?;
                let copy = match (mem.image_format(), mem.image_desc()) {
                    (Some(format), Some(desc)) => {
                        let copy = driver.create_image(format, desc, None)?;
                        driver.copy_image(mem, &copy, [0; 3], [0; 3], desc.region())?;
                        copy
                    }
                    _ => {
                        let copy = driver.create_buffer(mem.size())?;
                        driver.copy_buffer(mem, &copy, 0, 0, mem.size())?;
                        copy
                    }
                };
                Ok(Object::from(copy))
            }
            Object::Kernel(kernel) => {
                let copy = self.active_driver()?.clone_kernel(kernel)?;
                Ok(Object::from(copy))
            }
            _ => Err(CommandError::semantic(
                "SEM040",
                "複製できるのはバッファ・画像・カーネルだけです",
            )
            .at(token.span())),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::{ChannelOrder, ChannelType, SimDriver};
    use crate::errors::Span;
    use crate::parser::TokenStream;
    use crate::testbench::{Capture, Outcome, Testbench};

    fn bench_with_sim() -> (Testbench, Capture) {
        let out = Capture::new();
        let mut tb = Testbench::new().with_output(out.clone(), Capture::new());
        tb.set_driver(Box::new(SimDriver::new()));
        (tb, out)
    }

    #[test]
    /// 長さを指定しなければ開始位置から末尾までを書き込む。
    fn buffer_from_data_slice() {
        let (mut tb, _out) = bench_with_sim();
        let object = tb
            .evaluate(&mut TokenStream::new("buffer(uchar(1,2,3,4,5), 2)"))
            .unwrap();
        assert_eq!(object.as_memory().unwrap().size(), 3);
    }

    #[test]
    /// 長すぎる長さは切り詰め、verbose なら通知する。
    fn buffer_length_is_clamped() {
        let (mut tb, out) = bench_with_sim();
        let object = tb
            .evaluate(&mut TokenStream::new("buffer(uchar(1,2,3,4), 1, 9)"))
            .unwrap();
        assert_eq!(object.as_memory().unwrap().size(), 3);
        assert!(out.contents().contains('9'));
    }

    #[test]
    /// データ末尾以降の開始位置は開始位置の引数で失敗する。
    fn buffer_start_past_end_fails() {
        let (mut tb, _out) = bench_with_sim();
        let err = tb
            .evaluate(&mut TokenStream::new("buffer(uchar(1,2), 2)"))
            .unwrap_err();
        assert_eq!(err.span(), Some(Span::new(19, 20)));
    }

    #[test]
    /// 高さ 1 以下は 1 次元画像になり、型名は補完される。
    fn image_from_data_with_format() {
        let (mut tb, _out) = bench_with_sim();
        let object = tb
            .evaluate(&mut TokenStream::new("image(uchar(1,2,3,4,5,6,7,8), 2, 1, CL_RGBA, uc)"))
            .unwrap();
        let mem = object.as_memory().unwrap();
        let format = mem.image_format().unwrap();
        assert_eq!(format.order, ChannelOrder::Rgba);
        assert_eq!(format.data_type, ChannelType::UChar);
        assert_eq!(mem.image_desc().unwrap().height, 1);
        assert_eq!(object.type_tag(), "Image");
    }

    #[test]
    /// データが足りない画像と曖昧な型名は拒否する。
    fn image_rejects_small_data_and_ambiguous_type() {
        let (mut tb, _out) = bench_with_sim();
        assert!(tb
            .evaluate(&mut TokenStream::new("image(uchar(1,2,3), 2, 2, cl_r, uchar)"))
            .is_err());
        let err = tb
            .evaluate(&mut TokenStream::new("image(uchar(1,2,3,4), 2, 2, cl_r, u)"))
            .unwrap_err();
        assert_eq!(err.code(), "SEM034");
        let err = tb
            .evaluate(&mut TokenStream::new("image(uchar(1,2,3,4), 2, 2, cl_bgra, uchar)"))
            .unwrap_err();
        assert_eq!(err.code(), "SEM033");
    }

    #[test]
    /// 形式を省略できるのは画像データだけ。
    fn image_without_format_needs_image_data() {
        let (mut tb, _out) = bench_with_sim();
        let err = tb.evaluate(&mut TokenStream::new("image(int(1))")).unwrap_err();
        assert_eq!(err.code(), "SEM039");
    }

    #[test]
    /// バッファの複製は同じ大きさの新しいメモリになる。
    fn clone_copies_buffers_and_rejects_data() {
        let (mut tb, _out) = bench_with_sim();
        assert_eq!(tb.run_line("b = buffer(int(1, 2))"), Outcome::Good);
        let copy = tb.evaluate(&mut TokenStream::new("clone(b)")).unwrap();
        let original = tb.env().lookup("b").unwrap();
        assert_eq!(copy.as_memory().unwrap().size(), 8);
        assert_ne!(
            copy.as_memory().unwrap().handle().id(),
            original.as_memory().unwrap().handle().id()
        );
        let err = tb.evaluate(&mut TokenStream::new("clone(int(1))")).unwrap_err();
        assert_eq!(err.code(), "SEM040");
    }
}
