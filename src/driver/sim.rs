// パス: src/driver/sim.rs
// 役割: ホストメモリ上で動作する組み込みドライバ
// 意図: 実デバイスなしで式言語とコマンドの全経路を動かし、テストから観測できるようにする
// 関連ファイル: src/driver/mod.rs, src/object.rs, tests/driver_sim.rs
//! シミュレーションドライバ
//!
//! バッファと画像はバイト列として保持し、プログラムはソースを覚えておく。
//! カーネルは実行せず、引数の検証と起動記録だけを行う。
//! 発行したハンドルは状態への弱参照を持ち、破棄時に自分自身を登録から外す。

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::{
    status, DeviceInfo, Driver, DriverError, DriverResult, HandleKind, ImageDesc, ImageFormat,
    KernelArg, NativeHandle, PlatformInfo, Selection,
};
use crate::object::{KernelObject, MemoryObject, ProgramObject};

/// シミュレータのプログラムバイナリの先頭に付くマジック。
pub const SIM_BINARY_MAGIC: &[u8] = b"SIMBIN1\n";

const PLATFORM_NAMES: [&str; 1] = ["Sim Platform"];
const DEVICE_NAMES: [&str; 2] = ["Sim CPU", "Sim GPU"];

/// 記録されたカーネル起動。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub kernel: String,
    pub global: Vec<usize>,
    pub local: Option<Vec<usize>>,
    pub args: Vec<SimArg>,
}

/// カーネルに設定された引数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimArg {
    Memory(u64),
    Bytes(Vec<u8>),
}

#[derive(Debug)]
struct SimMemory {
    bytes: Vec<u8>,
    image: Option<(ImageFormat, ImageDesc)>,
}

#[derive(Debug, Clone)]
struct KernelSignature {
    name: String,
    params: usize,
}

#[derive(Debug)]
struct SimProgram {
    source: String,
    built: bool,
    signatures: Vec<KernelSignature>,
}

#[derive(Debug, Clone)]
struct SimKernel {
    name: String,
    args: Vec<Option<SimArg>>,
}

#[derive(Debug, Default)]
struct SimState {
    next_id: u64,
    memories: HashMap<u64, SimMemory>,
    programs: HashMap<u64, SimProgram>,
    kernels: HashMap<u64, SimKernel>,
    launches: Vec<Launch>,
    flushes: usize,
    finishes: usize,
}

impl SimState {
    fn release(&mut self, id: u64, kind: HandleKind) {
        let removed = match kind {
            HandleKind::Buffer | HandleKind::Image => self.memories.remove(&id).is_some(),
            HandleKind::Program => self.programs.remove(&id).is_some(),
            HandleKind::Kernel => self.kernels.remove(&id).is_some(),
        };
        debug!(id, ?kind, removed, "sim: release");
    }

    fn live_objects(&self) -> usize {
        self.memories.len() + self.programs.len() + self.kernels.len()
    }

    fn memory(&self, mem: &MemoryObject) -> DriverResult<&SimMemory> {
        self.memories
            .get(&mem.handle().id())
            .ok_or(DriverError::api("clGetMemObjectInfo", status::INVALID_MEM_OBJECT))
    }

    fn memory_mut(&mut self, mem: &MemoryObject) -> DriverResult<&mut SimMemory> {
        self.memories
            .get_mut(&mem.handle().id())
            .ok_or(DriverError::api("clGetMemObjectInfo", status::INVALID_MEM_OBJECT))
    }
}

/// テストや診断から状態を覗くための共有参照。
#[derive(Debug, Clone)]
pub struct SimProbe {
    state: Rc<RefCell<SimState>>,
}

impl SimProbe {
    /// 解放されていないバッファ・画像・プログラム・カーネルの数。
    pub fn live_objects(&self) -> usize {
        self.state.borrow().live_objects()
    }

    pub fn launches(&self) -> Vec<Launch> {
        self.state.borrow().launches.clone()
    }

    /// 指定ハンドルのメモリ内容の写し。
    pub fn memory_contents(&self, id: u64) -> Option<Vec<u8>> {
        self.state.borrow().memories.get(&id).map(|m| m.bytes.clone())
    }

    pub fn flushes(&self) -> usize {
        self.state.borrow().flushes
    }

    pub fn finishes(&self) -> usize {
        self.state.borrow().finishes
    }
}

/// ホストメモリ上のドライバ。
#[derive(Debug)]
pub struct SimDriver {
    state: Rc<RefCell<SimState>>,
    selection: Selection,
    blocking: bool,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState::default())),
            selection: Selection::default(),
            blocking: true,
        }
    }

    pub fn probe(&self) -> SimProbe {
        SimProbe {
            state: Rc::clone(&self.state),
        }
    }

    fn allocate(&self, kind: HandleKind) -> NativeHandle {
        let id = {
            let mut state = self.state.borrow_mut();
            state.next_id += 1;
            state.next_id
        };
        let weak: Weak<RefCell<SimState>> = Rc::downgrade(&self.state);
        NativeHandle::new(id, kind, move |id| {
            if let Some(state) = weak.upgrade() {
                if let Ok(mut state) = state.try_borrow_mut() {
                    state.release(id, kind);
                }
            }
        })
    }
}

/// ソースから `kernel void NAME(...)` 形式の宣言を拾う。
fn parse_signatures(source: &str) -> Vec<KernelSignature> {
    let mut found = Vec::new();
    let mut offset = 0;
    while let Some(pos) = source[offset..].find("kernel") {
        let start = offset + pos;
        offset = start + "kernel".len();
        let prefix = &source[..start];
        let at_word_start = prefix
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
            || prefix.ends_with("__");
        if !at_word_start {
            continue;
        }
        if let Some(signature) = parse_declaration(&source[offset..]) {
            found.push(signature);
        }
    }
    found
}

fn parse_declaration(text: &str) -> Option<KernelSignature> {
    let text = text.strip_prefix(char::is_whitespace)?.trim_start();
    let text = text.strip_prefix("void")?;
    if !text.starts_with(char::is_whitespace) {
        return None;
    }
    let text = text.trim_start();
    let name_len = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    if name_len == 0 {
        return None;
    }
    let name = &text[..name_len];
    let text = text[name_len..].trim_start().strip_prefix('(')?;
    let params = text[..text.find(')')?].trim();
    let params = if params.is_empty() || params == "void" {
        0
    } else {
        params.split(',').count()
    };
    Some(KernelSignature {
        name: name.to_string(),
        params,
    })
}

/// 画像の矩形領域を行ごとの (開始オフセット, 長さ) に分解する。
fn image_rows(
    format: &ImageFormat,
    desc: &ImageDesc,
    origin: [usize; 3],
    region: [usize; 3],
) -> DriverResult<Vec<(usize, usize)>> {
    let pixel = format.pixel_size();
    let height = desc.height.max(1);
    let fits = origin[0].checked_add(region[0]).map_or(false, |x| x <= desc.width)
        && origin[1].checked_add(region[1]).map_or(false, |y| y <= height)
        && origin[2] == 0
        && region[2] == 1;
    if !fits || region[0] == 0 || region[1] == 0 {
        return Err(DriverError::api("clEnqueueImage", status::INVALID_VALUE));
    }
    let row_pitch = desc.width * pixel;
    Ok((0..region[1])
        .map(|row| ((origin[1] + row) * row_pitch + origin[0] * pixel, region[0] * pixel))
        .collect())
}

fn image_info(mem: &SimMemory) -> DriverResult<(ImageFormat, ImageDesc)> {
    mem.image
        .ok_or(DriverError::api("clEnqueueImage", status::INVALID_MEM_OBJECT))
}

/// 0 で埋めたバイト列を確保する。確保できなければホストメモリ不足の状態を返す。
fn zeroed(call: &'static str, size: usize) -> DriverResult<Vec<u8>> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(size)
        .map_err(|_| DriverError::api(call, status::OUT_OF_HOST_MEMORY))?;
    bytes.resize(size, 0);
    Ok(bytes)
}

fn buffer_range(mem: &SimMemory, offset: usize, len: usize) -> DriverResult<std::ops::Range<usize>> {
    if mem.image.is_some() {
        return Err(DriverError::api("clEnqueueBuffer", status::INVALID_MEM_OBJECT));
    }
    match offset.checked_add(len) {
        Some(end) if end <= mem.bytes.len() => Ok(offset..end),
        _ => Err(DriverError::api("clEnqueueBuffer", status::INVALID_VALUE)),
    }
}

impl Driver for SimDriver {
    fn library_name(&self) -> &str {
        "sim"
    }

    fn platforms(&self) -> DriverResult<Vec<PlatformInfo>> {
        Ok(PLATFORM_NAMES
            .iter()
            .map(|name| PlatformInfo {
                name: name.to_string(),
                vendor: "cltb".to_string(),
                version: "OpenCL 1.2 sim".to_string(),
            })
            .collect())
    }

    fn devices(&self) -> DriverResult<Vec<DeviceInfo>> {
        Ok(DEVICE_NAMES
            .iter()
            .enumerate()
            .map(|(index, name)| DeviceInfo {
                name: name.to_string(),
                vendor: "cltb".to_string(),
                version: "OpenCL 1.2 sim".to_string(),
                compute_units: 4 << index,
                global_memory: 256 << 20,
            })
            .collect())
    }

    fn selection(&self) -> Selection {
        self.selection
    }

    fn select_platform(&mut self, index: usize) -> DriverResult<()> {
        if index >= PLATFORM_NAMES.len() {
            return Err(DriverError::api("clGetPlatformIDs", status::INVALID_PLATFORM));
        }
        self.selection = Selection {
            platform: index,
            device: 0,
        };
        Ok(())
    }

    fn select_device(&mut self, index: usize) -> DriverResult<()> {
        if index >= DEVICE_NAMES.len() {
            return Err(DriverError::api("clGetDeviceIDs", status::INVALID_DEVICE));
        }
        self.selection.device = index;
        Ok(())
    }

    fn blocking(&self) -> bool {
        self.blocking
    }

    fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
    }

    fn create_buffer(&mut self, size: usize) -> DriverResult<MemoryObject> {
        if size == 0 {
            return Err(DriverError::api("clCreateBuffer", status::INVALID_BUFFER_SIZE));
        }
        let bytes = zeroed("clCreateBuffer", size)?;
        let handle = self.allocate(HandleKind::Buffer);
        debug!(id = handle.id(), size, "sim: create buffer");
        self.state.borrow_mut().memories.insert(
            handle.id(),
            SimMemory {
                bytes,
                image: None,
            },
        );
        Ok(MemoryObject::buffer(handle, size))
    }

    fn write_buffer(&mut self, mem: &MemoryObject, offset: usize, data: &[u8]) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        let target = state.memory_mut(mem)?;
        let range = buffer_range(target, offset, data.len())?;
        target.bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&mut self, mem: &MemoryObject, offset: usize, out: &mut [u8]) -> DriverResult<()> {
        let state = self.state.borrow();
        let source = state.memory(mem)?;
        let range = buffer_range(source, offset, out.len())?;
        out.copy_from_slice(&source.bytes[range]);
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        src: &MemoryObject,
        dst: &MemoryObject,
        src_offset: usize,
        dst_offset: usize,
        len: usize,
    ) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        let source = state.memory(src)?;
        let range = buffer_range(source, src_offset, len)?;
        let chunk = source.bytes[range].to_vec();
        let target = state.memory_mut(dst)?;
        let range = buffer_range(target, dst_offset, len)?;
        target.bytes[range].copy_from_slice(&chunk);
        Ok(())
    }

    fn create_image(
        &mut self,
        format: ImageFormat,
        desc: ImageDesc,
        data: Option<&[u8]>,
    ) -> DriverResult<MemoryObject> {
        let size = desc.byte_size(&format);
        if desc.width == 0 || size == 0 {
            return Err(DriverError::api("clCreateImage", status::INVALID_IMAGE_SIZE));
        }
        if data.map_or(false, |data| data.len() < size) {
            return Err(DriverError::api("clCreateImage", status::INVALID_VALUE));
        }
        let mut bytes = zeroed("clCreateImage", size)?;
        if let Some(data) = data {
            bytes.copy_from_slice(&data[..size]);
        }
        let handle = self.allocate(HandleKind::Image);
        debug!(id = handle.id(), %format, width = desc.width, height = desc.height, "sim: create image");
        self.state.borrow_mut().memories.insert(
            handle.id(),
            SimMemory {
                bytes,
                image: Some((format, desc)),
            },
        );
        Ok(MemoryObject::image(handle, format, desc))
    }

    fn write_image(
        &mut self,
        mem: &MemoryObject,
        origin: [usize; 3],
        region: [usize; 3],
        data: &[u8],
    ) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        let target = state.memory_mut(mem)?;
        let (format, desc) = image_info(target)?;
        let rows = image_rows(&format, &desc, origin, region)?;
        let needed: usize = rows.iter().map(|(_, len)| len).sum();
        if data.len() < needed {
            return Err(DriverError::api("clEnqueueWriteImage", status::INVALID_VALUE));
        }
        let mut cursor = 0;
        for (start, len) in rows {
            target.bytes[start..start + len].copy_from_slice(&data[cursor..cursor + len]);
            cursor += len;
        }
        Ok(())
    }

    fn read_image(
        &mut self,
        mem: &MemoryObject,
        origin: [usize; 3],
        region: [usize; 3],
        out: &mut [u8],
    ) -> DriverResult<()> {
        let state = self.state.borrow();
        let source = state.memory(mem)?;
        let (format, desc) = image_info(source)?;
        let rows = image_rows(&format, &desc, origin, region)?;
        let needed: usize = rows.iter().map(|(_, len)| len).sum();
        if out.len() < needed {
            return Err(DriverError::api("clEnqueueReadImage", status::INVALID_VALUE));
        }
        let mut cursor = 0;
        for (start, len) in rows {
            out[cursor..cursor + len].copy_from_slice(&source.bytes[start..start + len]);
            cursor += len;
        }
        Ok(())
    }

    fn copy_image(
        &mut self,
        src: &MemoryObject,
        dst: &MemoryObject,
        src_origin: [usize; 3],
        dst_origin: [usize; 3],
        region: [usize; 3],
    ) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        let source = state.memory(src)?;
        let (src_format, src_desc) = image_info(source)?;
        let src_rows = image_rows(&src_format, &src_desc, src_origin, region)?;
        let chunks: Vec<Vec<u8>> = src_rows
            .iter()
            .map(|&(start, len)| source.bytes[start..start + len].to_vec())
            .collect();
        let target = state.memory_mut(dst)?;
        let (dst_format, dst_desc) = image_info(target)?;
        if dst_format != src_format {
            return Err(DriverError::api(
                "clEnqueueCopyImage",
                status::INVALID_IMAGE_FORMAT_DESCRIPTOR,
            ));
        }
        let dst_rows = image_rows(&dst_format, &dst_desc, dst_origin, region)?;
        for ((start, len), chunk) in dst_rows.into_iter().zip(chunks) {
            target.bytes[start..start + len].copy_from_slice(&chunk);
        }
        Ok(())
    }

    fn create_program(&mut self, source: &str) -> DriverResult<ProgramObject> {
        if source.trim().is_empty() {
            return Err(DriverError::api("clCreateProgramWithSource", status::INVALID_VALUE));
        }
        let handle = self.allocate(HandleKind::Program);
        debug!(id = handle.id(), bytes = source.len(), "sim: create program");
        self.state.borrow_mut().programs.insert(
            handle.id(),
            SimProgram {
                source: source.to_string(),
                built: false,
                signatures: Vec::new(),
            },
        );
        Ok(ProgramObject::new(handle))
    }

    fn create_program_binary(&mut self, binary: &[u8]) -> DriverResult<ProgramObject> {
        let Some(body) = binary.strip_prefix(SIM_BINARY_MAGIC) else {
            return Err(DriverError::api("clCreateProgramWithBinary", status::INVALID_BINARY));
        };
        let source = String::from_utf8_lossy(body);
        self.create_program(&source)
    }

    fn build_program(&mut self, program: &ProgramObject, options: &str) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        let entry = state
            .programs
            .get_mut(&program.handle().id())
            .ok_or(DriverError::api("clBuildProgram", status::INVALID_PROGRAM))?;
        let errors: Vec<&str> = entry
            .source
            .lines()
            .filter(|line| line.trim_start().starts_with("#error"))
            .collect();
        if !errors.is_empty() {
            entry.built = false;
            debug!(id = program.handle().id(), "sim: build failed");
            return Err(DriverError::BuildFailure {
                log: errors.join("\n"),
            });
        }
        entry.signatures = parse_signatures(&entry.source);
        entry.built = true;
        debug!(
            id = program.handle().id(),
            kernels = entry.signatures.len(),
            options,
            "sim: build program"
        );
        Ok(())
    }

    fn program_binary(&self, program: &ProgramObject) -> DriverResult<Vec<u8>> {
        let state = self.state.borrow();
        let entry = state
            .programs
            .get(&program.handle().id())
            .ok_or(DriverError::api("clGetProgramInfo", status::INVALID_PROGRAM))?;
        if !entry.built {
            return Err(DriverError::api(
                "clGetProgramInfo",
                status::INVALID_PROGRAM_EXECUTABLE,
            ));
        }
        let mut binary = SIM_BINARY_MAGIC.to_vec();
        binary.extend_from_slice(entry.source.as_bytes());
        Ok(binary)
    }

    fn create_kernel(&mut self, program: &ProgramObject, name: &str) -> DriverResult<KernelObject> {
        let params = {
            let state = self.state.borrow();
            let entry = state
                .programs
                .get(&program.handle().id())
                .ok_or(DriverError::api("clCreateKernel", status::INVALID_PROGRAM))?;
            if !entry.built {
                return Err(DriverError::api(
                    "clCreateKernel",
                    status::INVALID_PROGRAM_EXECUTABLE,
                ));
            }
            entry
                .signatures
                .iter()
                .find(|sig| sig.name == name)
                .map(|sig| sig.params)
                .ok_or(DriverError::api("clCreateKernel", status::INVALID_KERNEL_NAME))?
        };
        let handle = self.allocate(HandleKind::Kernel);
        debug!(id = handle.id(), name, params, "sim: create kernel");
        self.state.borrow_mut().kernels.insert(
            handle.id(),
            SimKernel {
                name: name.to_string(),
                args: vec![None; params],
            },
        );
        Ok(KernelObject::new(handle, name))
    }

    fn clone_kernel(&mut self, kernel: &KernelObject) -> DriverResult<KernelObject> {
        let copy = self
            .state
            .borrow()
            .kernels
            .get(&kernel.handle().id())
            .cloned()
            .ok_or(DriverError::api("clCloneKernel", status::INVALID_KERNEL))?;
        let handle = self.allocate(HandleKind::Kernel);
        debug!(id = handle.id(), from = kernel.handle().id(), "sim: clone kernel");
        let name = copy.name.clone();
        self.state.borrow_mut().kernels.insert(handle.id(), copy);
        Ok(KernelObject::new(handle, name))
    }

    fn set_kernel_arg(
        &mut self,
        kernel: &KernelObject,
        index: u32,
        arg: KernelArg<'_>,
    ) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        let value = match arg {
            KernelArg::Memory(mem) => {
                state.memory(mem)?;
                SimArg::Memory(mem.handle().id())
            }
            KernelArg::Bytes(bytes) => SimArg::Bytes(bytes.to_vec()),
        };
        let entry = state
            .kernels
            .get_mut(&kernel.handle().id())
            .ok_or(DriverError::api("clSetKernelArg", status::INVALID_KERNEL))?;
        let slot = entry
            .args
            .get_mut(index as usize)
            .ok_or(DriverError::api("clSetKernelArg", status::INVALID_ARG_INDEX))?;
        *slot = Some(value);
        Ok(())
    }

    fn enqueue_kernel(
        &mut self,
        kernel: &KernelObject,
        global: &[usize],
        local: Option<&[usize]>,
    ) -> DriverResult<()> {
        const CALL: &str = "clEnqueueNDRangeKernel";
        if global.is_empty() || global.len() > 3 {
            return Err(DriverError::api(CALL, status::INVALID_WORK_DIMENSION));
        }
        if global.contains(&0) {
            return Err(DriverError::api(CALL, status::INVALID_GLOBAL_WORK_SIZE));
        }
        if let Some(local) = local {
            if local.len() != global.len() {
                return Err(DriverError::api(CALL, status::INVALID_WORK_DIMENSION));
            }
            if local.iter().zip(global).any(|(l, g)| *l == 0 || g % l != 0) {
                return Err(DriverError::api(CALL, status::INVALID_WORK_GROUP_SIZE));
            }
        }
        let mut state = self.state.borrow_mut();
        let entry = state
            .kernels
            .get(&kernel.handle().id())
            .ok_or(DriverError::api(CALL, status::INVALID_KERNEL))?;
        let args = entry
            .args
            .iter()
            .cloned()
            .collect::<Option<Vec<_>>>()
            .ok_or(DriverError::api(CALL, status::INVALID_KERNEL_ARGS))?;
        let launch = Launch {
            kernel: entry.name.clone(),
            global: global.to_vec(),
            local: local.map(<[usize]>::to_vec),
            args,
        };
        debug!(kernel = %launch.kernel, global = ?launch.global, local = ?launch.local, "sim: enqueue");
        state.launches.push(launch);
        Ok(())
    }

    fn flush(&mut self) -> DriverResult<()> {
        self.state.borrow_mut().flushes += 1;
        Ok(())
    }

    fn finish(&mut self) -> DriverResult<()> {
        self.state.borrow_mut().finishes += 1;
        Ok(())
    }
}
