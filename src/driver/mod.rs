// パス: src/driver/mod.rs
// 役割: 計算 API ドライバとの境界（トレイト・ハンドル・画像形式・エラー）を定義する
// 意図: 評価器とコマンドが具体的なドライバ実装に依存せずにオブジェクトを作れるようにする
// 関連ファイル: src/driver/sim.rs, src/object.rs, src/evaluator/mod.rs
//! ドライバ協調者
//!
//! - `Driver` はバッファ・画像・プログラム・カーネルの生成と操作を提供する。
//! - 生成されたネイティブハンドルは `NativeHandle` が保持し、破棄時に自動で解放する。
//! - `DriverLoader` はライブラリ名から `Driver` を構築する。

pub mod sim;

use std::fmt;

use thiserror::Error;

use crate::object::{KernelObject, MemoryObject, ProgramObject};

pub use sim::{SimDriver, SimProbe};

/// ドライバ API の状態コード。
pub mod status {
    pub const OUT_OF_HOST_MEMORY: i32 = -6;
    pub const BUILD_PROGRAM_FAILURE: i32 = -11;
    pub const INVALID_VALUE: i32 = -30;
    pub const INVALID_DEVICE: i32 = -33;
    pub const INVALID_PLATFORM: i32 = -32;
    pub const INVALID_MEM_OBJECT: i32 = -38;
    pub const INVALID_IMAGE_FORMAT_DESCRIPTOR: i32 = -39;
    pub const INVALID_IMAGE_SIZE: i32 = -40;
    pub const INVALID_BINARY: i32 = -42;
    pub const INVALID_PROGRAM: i32 = -44;
    pub const INVALID_PROGRAM_EXECUTABLE: i32 = -45;
    pub const INVALID_KERNEL_NAME: i32 = -46;
    pub const INVALID_KERNEL: i32 = -48;
    pub const INVALID_ARG_INDEX: i32 = -49;
    pub const INVALID_KERNEL_ARGS: i32 = -52;
    pub const INVALID_WORK_DIMENSION: i32 = -53;
    pub const INVALID_WORK_GROUP_SIZE: i32 = -54;
    pub const INVALID_BUFFER_SIZE: i32 = -61;
    pub const INVALID_GLOBAL_WORK_SIZE: i32 = -63;

    /// 状態コードの記号名を返す。
    pub fn name(code: i32) -> &'static str {
        match code {
            OUT_OF_HOST_MEMORY => "CL_OUT_OF_HOST_MEMORY",
            BUILD_PROGRAM_FAILURE => "CL_BUILD_PROGRAM_FAILURE",
            INVALID_VALUE => "CL_INVALID_VALUE",
            INVALID_DEVICE => "CL_INVALID_DEVICE",
            INVALID_PLATFORM => "CL_INVALID_PLATFORM",
            INVALID_MEM_OBJECT => "CL_INVALID_MEM_OBJECT",
            INVALID_IMAGE_FORMAT_DESCRIPTOR => "CL_INVALID_IMAGE_FORMAT_DESCRIPTOR",
            INVALID_IMAGE_SIZE => "CL_INVALID_IMAGE_SIZE",
            INVALID_BINARY => "CL_INVALID_BINARY",
            INVALID_PROGRAM => "CL_INVALID_PROGRAM",
            INVALID_PROGRAM_EXECUTABLE => "CL_INVALID_PROGRAM_EXECUTABLE",
            INVALID_KERNEL_NAME => "CL_INVALID_KERNEL_NAME",
            INVALID_KERNEL => "CL_INVALID_KERNEL",
            INVALID_ARG_INDEX => "CL_INVALID_ARG_INDEX",
            INVALID_KERNEL_ARGS => "CL_INVALID_KERNEL_ARGS",
            INVALID_WORK_DIMENSION => "CL_INVALID_WORK_DIMENSION",
            INVALID_WORK_GROUP_SIZE => "CL_INVALID_WORK_GROUP_SIZE",
            INVALID_BUFFER_SIZE => "CL_INVALID_BUFFER_SIZE",
            INVALID_GLOBAL_WORK_SIZE => "CL_INVALID_GLOBAL_WORK_SIZE",
            _ => "CL_UNKNOWN_ERROR",
        }
    }
}

/// ドライバ呼び出しで発生しうるエラー種別。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("{call} が {name} ({status}) を返しました")]
    Api {
        call: &'static str,
        status: i32,
        name: &'static str,
    },
    #[error("プログラムのビルドに失敗しました")]
    BuildFailure { log: String },
    #[error("ドライバが {0} をサポートしていません")]
    Unsupported(&'static str),
}

impl DriverError {
    pub fn api(call: &'static str, status: i32) -> Self {
        Self::Api {
            call,
            status,
            name: status::name(status),
        }
    }

    /// 診断コード。
    pub fn code(&self) -> &'static str {
        match self {
            DriverError::Api { .. } => "DRV001",
            DriverError::BuildFailure { .. } => "DRV002",
            DriverError::Unsupported(_) => "DRV003",
        }
    }
}

/// ドライバライブラリの読み込みエラー。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryError {
    #[error("ドライバライブラリ '{name}' を読み込めません（利用可能: {available}）")]
    NotFound { name: String, available: String },
}

/// ドライバ呼び出しの結果型。
pub type DriverResult<T> = Result<T, DriverError>;

/// ネイティブハンドルの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Buffer,
    Image,
    Program,
    Kernel,
}

type ReleaseFn = Box<dyn FnOnce(u64)>;

/// ドライバが発行したハンドル。破棄時に登録された解放処理を 1 度だけ呼ぶ。
pub struct NativeHandle {
    id: u64,
    kind: HandleKind,
    release: Option<ReleaseFn>,
}

impl NativeHandle {
    pub fn new(id: u64, kind: HandleKind, release: impl FnOnce(u64) + 'static) -> Self {
        Self {
            id,
            kind,
            release: Some(Box::new(release)),
        }
    }

    /// 解放処理を持たないハンドル（テスト用・借用ハンドル用）。
    pub fn unmanaged(id: u64, kind: HandleKind) -> Self {
        Self {
            id,
            kind,
            release: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.id);
        }
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("managed", &self.release.is_some())
            .finish()
    }
}

/// 画像のチャネル並び。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    R,
    Ra,
    Rgb,
    Rgba,
}

impl ChannelOrder {
    pub const ALL: [ChannelOrder; 4] = [
        ChannelOrder::R,
        ChannelOrder::Ra,
        ChannelOrder::Rgb,
        ChannelOrder::Rgba,
    ];

    pub fn channels(self) -> usize {
        match self {
            ChannelOrder::R => 1,
            ChannelOrder::Ra => 2,
            ChannelOrder::Rgb => 3,
            ChannelOrder::Rgba => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelOrder::R => "cl_r",
            ChannelOrder::Ra => "cl_ra",
            ChannelOrder::Rgb => "cl_rgb",
            ChannelOrder::Rgba => "cl_rgba",
        }
    }

    /// 大文字小文字を区別せずに名前から引く。
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|order| order.name().eq_ignore_ascii_case(name))
    }
}

/// 画像のチャネル要素型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Half,
    Float,
}

impl ChannelType {
    /// 補完候補として使う名前の並び（`ALL` と同順）。
    pub const NAMES: [&'static str; 8] =
        ["char", "uchar", "short", "ushort", "int", "uint", "half", "float"];
    pub const ALL: [ChannelType; 8] = [
        ChannelType::Char,
        ChannelType::UChar,
        ChannelType::Short,
        ChannelType::UShort,
        ChannelType::Int,
        ChannelType::UInt,
        ChannelType::Half,
        ChannelType::Float,
    ];

    pub fn size(self) -> usize {
        match self {
            ChannelType::Char | ChannelType::UChar => 1,
            ChannelType::Short | ChannelType::UShort | ChannelType::Half => 2,
            ChannelType::Int | ChannelType::UInt | ChannelType::Float => 4,
        }
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self as usize]
    }
}

/// チャネル並びと要素型の組。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFormat {
    pub order: ChannelOrder,
    pub data_type: ChannelType,
}

impl ImageFormat {
    pub fn new(order: ChannelOrder, data_type: ChannelType) -> Self {
        Self { order, data_type }
    }

    /// 1 画素あたりのバイト数。
    pub fn pixel_size(&self) -> usize {
        self.order.channels() * self.data_type.size()
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.order.name(), self.data_type.name())
    }
}

/// 画像の次元。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Image1D,
    Image2D,
}

/// 画像の寸法。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub image_type: ImageType,
    pub width: usize,
    pub height: usize,
}

impl ImageDesc {
    /// 高さが 1 以下なら 1 次元、それ以外は 2 次元の記述子を作る。
    pub fn new(width: usize, height: usize) -> Self {
        if height <= 1 {
            Self {
                image_type: ImageType::Image1D,
                width,
                height: 1,
            }
        } else {
            Self {
                image_type: ImageType::Image2D,
                width,
                height,
            }
        }
    }

    /// 画像全体の領域 `[width, height, 1]`。
    pub fn region(&self) -> [usize; 3] {
        [self.width, self.height.max(1), 1]
    }

    /// 指定形式で画像全体が占めるバイト数。
    pub fn byte_size(&self, format: &ImageFormat) -> usize {
        self.width
            .saturating_mul(self.height.max(1))
            .saturating_mul(format.pixel_size())
    }
}

/// カーネル引数として渡す値。
#[derive(Debug, Clone, Copy)]
pub enum KernelArg<'a> {
    Memory(&'a MemoryObject),
    Bytes(&'a [u8]),
}

/// プラットフォーム情報。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub name: String,
    pub vendor: String,
    pub version: String,
}

/// デバイス情報。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub compute_units: u32,
    pub global_memory: u64,
}

/// 現在選択中のプラットフォームとデバイスの添字。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub platform: usize,
    pub device: usize,
}

/// 計算 API ドライバの操作一覧。
pub trait Driver {
    /// 読み込んだライブラリ名。
    fn library_name(&self) -> &str;

    fn platforms(&self) -> DriverResult<Vec<PlatformInfo>>;
    /// 選択中プラットフォームのデバイス一覧。
    fn devices(&self) -> DriverResult<Vec<DeviceInfo>>;
    fn selection(&self) -> Selection;
    /// プラットフォームを切り替え、デバイスを先頭に戻す。
    fn select_platform(&mut self, index: usize) -> DriverResult<()>;
    fn select_device(&mut self, index: usize) -> DriverResult<()>;

    /// 投入した操作の完了を待つかどうか。
    fn blocking(&self) -> bool;
    fn set_blocking(&mut self, blocking: bool);

    fn create_buffer(&mut self, size: usize) -> DriverResult<MemoryObject>;
    fn write_buffer(&mut self, mem: &MemoryObject, offset: usize, data: &[u8]) -> DriverResult<()>;
    fn read_buffer(&mut self, mem: &MemoryObject, offset: usize, out: &mut [u8])
        -> DriverResult<()>;
    fn copy_buffer(
        &mut self,
        src: &MemoryObject,
        dst: &MemoryObject,
        src_offset: usize,
        dst_offset: usize,
        len: usize,
    ) -> DriverResult<()>;

    fn create_image(
        &mut self,
        format: ImageFormat,
        desc: ImageDesc,
        data: Option<&[u8]>,
    ) -> DriverResult<MemoryObject>;
    fn write_image(
        &mut self,
        mem: &MemoryObject,
        origin: [usize; 3],
        region: [usize; 3],
        data: &[u8],
    ) -> DriverResult<()>;
    fn read_image(
        &mut self,
        mem: &MemoryObject,
        origin: [usize; 3],
        region: [usize; 3],
        out: &mut [u8],
    ) -> DriverResult<()>;
    fn copy_image(
        &mut self,
        src: &MemoryObject,
        dst: &MemoryObject,
        src_origin: [usize; 3],
        dst_origin: [usize; 3],
        region: [usize; 3],
    ) -> DriverResult<()>;

    fn create_program(&mut self, source: &str) -> DriverResult<ProgramObject>;
    fn create_program_binary(&mut self, binary: &[u8]) -> DriverResult<ProgramObject>;
    /// ビルドする。失敗時は `DriverError::BuildFailure` にビルドログを載せる。
    fn build_program(&mut self, program: &ProgramObject, options: &str) -> DriverResult<()>;
    fn program_binary(&self, program: &ProgramObject) -> DriverResult<Vec<u8>>;

    fn create_kernel(&mut self, program: &ProgramObject, name: &str) -> DriverResult<KernelObject>;
    fn clone_kernel(&mut self, kernel: &KernelObject) -> DriverResult<KernelObject>;
    fn set_kernel_arg(
        &mut self,
        kernel: &KernelObject,
        index: u32,
        arg: KernelArg<'_>,
    ) -> DriverResult<()>;
    fn enqueue_kernel(
        &mut self,
        kernel: &KernelObject,
        global: &[usize],
        local: Option<&[usize]>,
    ) -> DriverResult<()>;

    fn flush(&mut self) -> DriverResult<()>;
    fn finish(&mut self) -> DriverResult<()>;
}

/// ライブラリ名からドライバを構築する。
pub trait DriverLoader {
    /// 引数なしの `load` で読み込む既定ライブラリ。
    fn default_library(&self) -> &str;
    fn load(&self, name: &str) -> Result<Box<dyn Driver>, LibraryError>;
}

/// 組み込みドライバだけを知っているローダ。
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinLoader;

impl BuiltinLoader {
    const SIM_NAMES: [&'static str; 3] = ["sim", "simulator", "dummy"];
}

impl DriverLoader for BuiltinLoader {
    fn default_library(&self) -> &str {
        Self::SIM_NAMES[0]
    }

    fn load(&self, name: &str) -> Result<Box<dyn Driver>, LibraryError> {
        if Self::SIM_NAMES
            .iter()
            .any(|known| known.eq_ignore_ascii_case(name))
        {
            return Ok(Box::new(SimDriver::new()));
        }
        Err(LibraryError::NotFound {
            name: name.to_string(),
            available: Self::SIM_NAMES.join(", "),
        })
    }
}
