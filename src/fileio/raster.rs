// パス: src/fileio/raster.rs
// 役割: `image` クレートによる PNG / Netpbm 画像コーデック
// 意図: ファイルの拡張子で形式を決め、画素並びを CL の画像形式へ写す
// 関連ファイル: src/fileio/mod.rs, src/evaluator/file.rs, src/repl/commands.rs

use std::io::Cursor;
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat as FileFormat, ImageReader, Limits};

use super::{CodecError, ImageCodec, ImageView};
use crate::driver::{ChannelOrder, ChannelType, ImageDesc, ImageFormat};
use crate::object::{DataObject, ImageObject};

/// 復号で確保してよい画素バッファの上限（バイト）。
pub const MAX_DECODE_BYTES: u64 = 1 << 30;

/// PNG と Netpbm (PGM/PPM/PNM) を扱うコーデック。
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterCodec;

fn file_format(path: &Path) -> Option<FileFormat> {
    match FileFormat::from_path(path) {
        Ok(format @ (FileFormat::Png | FileFormat::Pnm)) => Some(format),
        _ => None,
    }
}

fn u16_bytes(samples: Vec<u16>) -> Vec<u8> {
    samples.into_iter().flat_map(u16::to_ne_bytes).collect()
}

/// 復号結果を (チャネル並び, チャネル型, 画素バイト列) に写す。
/// 3 チャネルの画像は 4 チャネルへ広げ、アルファは最大値で埋める。
fn channels_of(image: DynamicImage) -> (ChannelOrder, ChannelType, Vec<u8>) {
    match image {
        DynamicImage::ImageLuma8(buf) => (ChannelOrder::R, ChannelType::UChar, buf.into_raw()),
        DynamicImage::ImageLumaA8(buf) => (ChannelOrder::Ra, ChannelType::UChar, buf.into_raw()),
        DynamicImage::ImageLuma16(buf) => (ChannelOrder::R, ChannelType::UShort, u16_bytes(buf.into_raw())),
        DynamicImage::ImageLumaA16(buf) => (ChannelOrder::Ra, ChannelType::UShort, u16_bytes(buf.into_raw())),
        image @ (DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgba16(_)) => (
            ChannelOrder::Rgba,
            ChannelType::UShort,
            u16_bytes(image.to_rgba16().into_raw()),
        ),
        image => (ChannelOrder::Rgba, ChannelType::UChar, image.to_rgba8().into_raw()),
    }
}

fn color_type(format: ImageFormat) -> Result<ExtendedColorType, CodecError> {
    let color = match (format.order, format.data_type) {
        (ChannelOrder::R, ChannelType::UChar) => ExtendedColorType::L8,
        (ChannelOrder::Ra, ChannelType::UChar) => ExtendedColorType::La8,
        (ChannelOrder::Rgb, ChannelType::UChar) => ExtendedColorType::Rgb8,
        (ChannelOrder::Rgba, ChannelType::UChar) => ExtendedColorType::Rgba8,
        (ChannelOrder::R, ChannelType::UShort) => ExtendedColorType::L16,
        (ChannelOrder::Ra, ChannelType::UShort) => ExtendedColorType::La16,
        (ChannelOrder::Rgb, ChannelType::UShort) => ExtendedColorType::Rgb16,
        (ChannelOrder::Rgba, ChannelType::UShort) => ExtendedColorType::Rgba16,
        _ => return Err(CodecError::UnsupportedFormat(format.to_string())),
    };
    Ok(color)
}

/// Netpbm は 8 ビットの濃淡か RGB だけを書く。アルファは落とす。
fn encode_pnm(format: ImageFormat, width: u32, height: u32, pixels: &[u8]) -> Result<Vec<u8>, CodecError> {
    if format.data_type != ChannelType::UChar {
        return Err(CodecError::UnsupportedFormat(format.to_string()));
    }
    let stride = format.order.channels();
    let (subtype, keep, color) = match format.order {
        ChannelOrder::R | ChannelOrder::Ra => (PnmSubtype::Graymap(SampleEncoding::Binary), 1, ExtendedColorType::L8),
        ChannelOrder::Rgb | ChannelOrder::Rgba => (PnmSubtype::Pixmap(SampleEncoding::Binary), 3, ExtendedColorType::Rgb8),
    };
    let packed: Vec<u8> = pixels
        .chunks_exact(stride)
        .flat_map(|pixel| pixel[..keep].iter().copied())
        .collect();
    let mut out = Vec::new();
    PnmEncoder::new(&mut out)
        .with_subtype(subtype)
        .write_image(&packed, width, height, color)
        .map_err(|err| CodecError::Encode(err.to_string()))?;
    Ok(out)
}

impl ImageCodec for RasterCodec {
    fn recognizes(&self, path: &Path) -> bool {
        file_format(path).is_some()
    }

    fn decode_if_recognized(&self, path: &Path, bytes: &[u8]) -> Result<Option<ImageObject>, CodecError> {
        let Some(format) = file_format(path) else {
            return Ok(None);
        };
        let mut limits = Limits::default();
        limits.max_alloc = Some(MAX_DECODE_BYTES);
        let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
        reader.limits(limits);
        let image = reader.decode().map_err(|err| CodecError::Decode(err.to_string()))?;

        let desc = ImageDesc::new(image.width() as usize, image.height() as usize);
        let (order, data_type, pixels) = channels_of(image);
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Some(ImageObject::new(
            DataObject::new(pixels, label),
            ImageFormat::new(order, data_type),
            desc,
        )))
    }

    fn encode_if_recognized(&self, path: &Path, image: ImageView<'_>) -> Result<Option<Vec<u8>>, CodecError> {
        let Some(file) = file_format(path) else {
            return Ok(None);
        };
        let height = image.desc.height.max(1);
        let too_large = || CodecError::TooLarge {
            width: image.desc.width,
            height,
        };
        let width_px = u32::try_from(image.desc.width).map_err(|_| too_large())?;
        let height_px = u32::try_from(height).map_err(|_| too_large())?;
        let expected = image
            .desc
            .width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(image.format.pixel_size()))
            .ok_or_else(too_large)?;
        if image.bytes.len() < expected {
            return Err(CodecError::Truncated {
                expected,
                actual: image.bytes.len(),
            });
        }
        let pixels = &image.bytes[..expected];

        if file == FileFormat::Pnm {
            return encode_pnm(image.format, width_px, height_px, pixels).map(Some);
        }
        let color = color_type(image.format)?;
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(pixels, width_px, height_px, color)
            .map_err(|err| CodecError::Encode(err.to_string()))?;
        Ok(Some(out))
    }
}
