// パス: src/object.rs
// 役割: 式の評価結果となるオブジェクトの閉じた集合を定義する
// 意図: 実行時の型判定を列挙体と明示的な絞り込みメソッドに置き換える
// 関連ファイル: src/env.rs, src/evaluator/mod.rs, src/driver/mod.rs
//! オブジェクトモデル
//!
//! - `Data`: 所有バイト列（型付き配列・ファイル内容）。
//! - `Image`: 画像形式と寸法を伴うバイト列。`as_data` でも取り出せる。
//! - `Memory` / `Program` / `Kernel`: ドライバが所有するハンドル。破棄時に解放される。
//!
//! 評価中のオブジェクトは `Rc` で共有し、名前が付かない一時値でも
//! それに対して発行した操作より長く生存させる。

use std::fmt;
use std::rc::Rc;

use crate::driver::{ImageDesc, ImageFormat, NativeHandle};

/// 共有所有されるオブジェクト。
pub type ObjectRef = Rc<Object>;

/// ホスト側のバイト列とその表示ラベル。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObject {
    bytes: Vec<u8>,
    label: String,
}

impl DataObject {
    pub fn new(bytes: Vec<u8>, label: impl Into<String>) -> Self {
        Self {
            bytes,
            label: label.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// 画像として解釈できるホスト側データ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageObject {
    data: DataObject,
    format: ImageFormat,
    desc: ImageDesc,
}

impl ImageObject {
    pub fn new(data: DataObject, format: ImageFormat, desc: ImageDesc) -> Self {
        Self { data, format, desc }
    }

    pub fn data(&self) -> &DataObject {
        &self.data
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn desc(&self) -> ImageDesc {
        self.desc
    }
}

/// ドライバ上のバッファまたは画像。
#[derive(Debug)]
pub struct MemoryObject {
    handle: NativeHandle,
    size: usize,
    image: Option<(ImageFormat, ImageDesc)>,
}

impl MemoryObject {
    pub fn buffer(handle: NativeHandle, size: usize) -> Self {
        Self {
            handle,
            size,
            image: None,
        }
    }

    pub fn image(handle: NativeHandle, format: ImageFormat, desc: ImageDesc) -> Self {
        Self {
            handle,
            size: desc.byte_size(&format),
            image: Some((format, desc)),
        }
    }

    pub fn handle(&self) -> &NativeHandle {
        &self.handle
    }

    /// バイト単位の大きさ。
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn image_format(&self) -> Option<ImageFormat> {
        self.image.map(|(format, _)| format)
    }

    pub fn image_desc(&self) -> Option<ImageDesc> {
        self.image.map(|(_, desc)| desc)
    }

    /// 画像の幅。バッファでは 0。
    pub fn width(&self) -> usize {
        self.image.map_or(0, |(_, desc)| desc.width)
    }

    pub fn is_image(&self) -> bool {
        self.width() != 0
    }
}

/// ドライバ上のプログラム。
#[derive(Debug)]
pub struct ProgramObject {
    handle: NativeHandle,
}

impl ProgramObject {
    pub fn new(handle: NativeHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &NativeHandle {
        &self.handle
    }
}

/// ドライバ上のカーネル。
#[derive(Debug)]
pub struct KernelObject {
    handle: NativeHandle,
    name: String,
}

impl KernelObject {
    pub fn new(handle: NativeHandle, name: impl Into<String>) -> Self {
        Self {
            handle,
            name: name.into(),
        }
    }

    pub fn handle(&self) -> &NativeHandle {
        &self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 評価結果の閉じた集合。
#[derive(Debug)]
pub enum Object {
    Data(DataObject),
    Image(ImageObject),
    Memory(MemoryObject),
    Program(ProgramObject),
    Kernel(KernelObject),
}

impl Object {
    pub fn into_ref(self) -> ObjectRef {
        Rc::new(self)
    }

    /// ホスト側のバイト列を持つか（画像データも含む）。
    pub fn is_data(&self) -> bool {
        self.as_data().is_some()
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Object::Image(_))
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Object::Memory(_))
    }

    pub fn is_program(&self) -> bool {
        matches!(self, Object::Program(_))
    }

    pub fn is_kernel(&self) -> bool {
        matches!(self, Object::Kernel(_))
    }

    /// ドライバの切り替えで無効になるオブジェクトか。
    pub fn is_driver_owned(&self) -> bool {
        matches!(
            self,
            Object::Memory(_) | Object::Program(_) | Object::Kernel(_)
        )
    }

    pub fn as_data(&self) -> Option<&DataObject> {
        match self {
            Object::Data(data) => Some(data),
            Object::Image(image) => Some(image.data()),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageObject> {
        match self {
            Object::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_memory(&self) -> Option<&MemoryObject> {
        match self {
            Object::Memory(mem) => Some(mem),
            _ => None,
        }
    }

    pub fn as_program(&self) -> Option<&ProgramObject> {
        match self {
            Object::Program(program) => Some(program),
            _ => None,
        }
    }

    pub fn as_kernel(&self) -> Option<&KernelObject> {
        match self {
            Object::Kernel(kernel) => Some(kernel),
            _ => None,
        }
    }

    /// `list` に表示する型タグ。
    pub fn type_tag(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Data(data) => f.write_str(data.label()),
            Object::Image(image) => write!(f, "{} ({})", image.data().label(), image.format()),
            Object::Memory(mem) if mem.is_image() => f.write_str("Image"),
            Object::Memory(_) => f.write_str("Buffer"),
            Object::Program(_) => f.write_str("Program"),
            Object::Kernel(kernel) => write!(f, "Kernel({})", kernel.name()),
        }
    }
}

impl From<DataObject> for Object {
    fn from(data: DataObject) -> Self {
        Object::Data(data)
    }
}

impl From<ImageObject> for Object {
    fn from(image: ImageObject) -> Self {
        Object::Image(image)
    }
}

impl From<MemoryObject> for Object {
    fn from(mem: MemoryObject) -> Self {
        Object::Memory(mem)
    }
}

impl From<ProgramObject> for Object {
    fn from(program: ProgramObject) -> Self {
        Object::Program(program)
    }
}

impl From<KernelObject> for Object {
    fn from(kernel: KernelObject) -> Self {
        Object::Kernel(kernel)
    }
}
