// パス: src/fileio/mod.rs
// 役割: ファイル読み書きと画像コーデックの協調者インターフェース
// 意図: 評価器とコマンドを実ファイルシステムから切り離し、テストで差し替え可能にする
// 関連ファイル: src/fileio/raster.rs, src/evaluator/file.rs, src/repl/commands.rs
//! ファイル I/O 協調者
//!
//! - `FileIo::load_file` は開始位置と長さを受け取り、長さはファイル末尾で切り詰める。
//! - `ImageCodec` は拡張子で扱える形式かを判断し、画像の復号・符号化を行う。

mod raster;

pub use raster::{RasterCodec, MAX_DECODE_BYTES};

use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::driver::{ImageDesc, ImageFormat};
use crate::object::ImageObject;

/// ファイル操作の失敗。
#[derive(Debug, Error)]
pub enum FileError {
    #[error("ファイル '{}' が見つかりません", .0.display())]
    NotFound(PathBuf),
    #[error("ファイル '{}' は空です", .0.display())]
    Empty(PathBuf),
    #[error("開始位置 {offset} がファイルサイズ {size} を超えています")]
    OffsetBeyondEnd { offset: u64, size: u64 },
    #[error("ファイル '{}' の入出力に失敗しました: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return FileError::NotFound(path.to_path_buf());
        }
        FileError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// 画像コーデックの失敗。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("画像を復号できません: {0}")]
    Decode(String),
    #[error("画像を符号化できません: {0}")]
    Encode(String),
    #[error("画像 {width}x{height} はファイルに書ける大きさを超えています")]
    TooLarge { width: usize, height: usize },
    #[error("画像データが途中で終わっています（必要 {expected} バイト、実際 {actual} バイト）")]
    Truncated { expected: usize, actual: usize },
    #[error("形式 {0} はこの画像ファイルとして保存できません")]
    UnsupportedFormat(String),
}

/// ファイルシステムへの窓口。
pub trait FileIo {
    /// `offset` から最大 `length` バイトを読む。長さは末尾で切り詰める。
    fn load_file(&self, path: &Path, offset: u64, length: Option<u64>) -> Result<Vec<u8>, FileError>;
    fn read_to_string(&self, path: &Path) -> Result<String, FileError>;
    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), FileError>;
}

/// `std::fs` を使う既定の実装。
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileIo;

impl FileIo for StdFileIo {
    fn load_file(&self, path: &Path, offset: u64, length: Option<u64>) -> Result<Vec<u8>, FileError> {
        let mut file = fs::File::open(path).map_err(|e| FileError::io(path, e))?;
        let size = file.metadata().map_err(|e| FileError::io(path, e))?.len();
        if size == 0 {
            return Err(FileError::Empty(path.to_path_buf()));
        }
        if offset >= size {
            return Err(FileError::OffsetBeyondEnd { offset, size });
        }
        let available = size - offset;
        let length = length.map_or(available, |len| len.min(available));
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| FileError::io(path, e))?;
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(length as usize)
            .map_err(|e| FileError::io(path, io::Error::new(io::ErrorKind::OutOfMemory, e)))?;
        file.take(length)
            .read_to_end(&mut bytes)
            .map_err(|e| FileError::io(path, e))?;
        Ok(bytes)
    }

    fn read_to_string(&self, path: &Path) -> Result<String, FileError> {
        fs::read_to_string(path).map_err(|e| FileError::io(path, e))
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<(), FileError> {
        fs::write(path, bytes).map_err(|e| FileError::io(path, e))
    }
}

/// 保存対象の画像の参照。
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    pub format: ImageFormat,
    pub desc: ImageDesc,
    pub bytes: &'a [u8],
}

/// 画像ファイル形式の復号・符号化。
pub trait ImageCodec {
    /// 拡張子から扱える形式かを判断する。
    fn recognizes(&self, path: &Path) -> bool;
    /// 扱える形式なら復号して画像を返す。扱えない形式なら `None`。
    fn decode_if_recognized(&self, path: &Path, bytes: &[u8]) -> Result<Option<ImageObject>, CodecError>;
    /// 扱える形式なら符号化したバイト列を返す。扱えない形式なら `None`。
    fn encode_if_recognized(&self, path: &Path, image: ImageView<'_>) -> Result<Option<Vec<u8>>, CodecError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    /// 開始位置と長さで切り出し、長さは末尾で切り詰める。
    fn load_file_slices_and_clamps() {
        let file = temp_file(b"0123456789");
        let io = StdFileIo;
        assert_eq!(io.load_file(file.path(), 0, None).unwrap(), b"0123456789");
        assert_eq!(io.load_file(file.path(), 3, Some(4)).unwrap(), b"3456");
        assert_eq!(io.load_file(file.path(), 8, Some(100)).unwrap(), b"89");
    }

    #[test]
    /// 空ファイル・範囲外の開始位置・存在しないファイルを区別する。
    fn load_file_reports_each_failure() {
        let io = StdFileIo;
        let empty = temp_file(b"");
        assert!(matches!(io.load_file(empty.path(), 0, None), Err(FileError::Empty(_))));
        let file = temp_file(b"abc");
        assert!(matches!(
            io.load_file(file.path(), 3, None),
            Err(FileError::OffsetBeyondEnd { offset: 3, size: 3 })
        ));
        let missing = file.path().with_extension("missing");
        assert!(matches!(io.load_file(&missing, 0, None), Err(FileError::NotFound(_))));
    }

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let io = StdFileIo;
        io.write_file(&path, b"hello").unwrap();
        assert_eq!(io.read_to_string(&path).unwrap(), "hello");
    }
}
