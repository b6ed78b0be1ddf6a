// パス: tests/file_io.rs
// 役割: file 構築子と save コマンドの統合テスト
// 意図: 実ファイルを介してデータ・画像・プログラムが保存と読み込みで往復できることを確認する
// 関連ファイル: src/evaluator/file.rs, src/repl/commands.rs, src/fileio/raster.rs
#[path = "test_support.rs"]
mod support;

use cltb::driver::sim::SIM_BINARY_MAGIC;
use cltb::Outcome;
use support::{quoted, session, session_without_driver, write_temp};

const GRAY_2X2: &[u8] = b"P5\n2 2\n255\n\x01\x02\x03\x04";

#[test]
/// データを保存すると生のバイト列になり、file で読み戻せる。
fn save_data_then_load_it_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("numbers.bin");
    let mut s = session_without_driver();
    s.run_all(&[
        "d = ushort(1, 0x203)",
        &format!("save d {}", quoted(&path)),
        &format!("e = file({})", quoted(&path)),
    ]);
    let mut expected = 1u16.to_ne_bytes().to_vec();
    expected.extend_from_slice(&0x203u16.to_ne_bytes());
    assert_eq!(std::fs::read(&path).unwrap(), expected);

    let e = s.bench.env().lookup("e").unwrap();
    assert_eq!(e.as_data().unwrap().bytes(), expected.as_slice());
    assert_eq!(e.type_tag(), path.display().to_string());
}

#[test]
/// 開始位置と長さで一部だけを読み、末尾を超える長さは切り詰める。
fn file_slices_with_offset_and_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(dir.path(), "bytes.bin", &[10, 11, 12, 13, 14]);
    let mut s = session_without_driver();
    s.run_all(&[
        &format!("mid = file({}, 1, 2)", quoted(&path)),
        &format!("tail = file({}, 3, 100)", quoted(&path)),
    ]);
    let env = s.bench.env();
    assert_eq!(env.lookup("mid").unwrap().as_data().unwrap().bytes(), &[11, 12]);
    assert_eq!(env.lookup("tail").unwrap().as_data().unwrap().bytes(), &[13, 14]);
    assert!(s.out.take().contains("100"));
}

#[test]
/// 末尾を超える開始位置と存在しないファイルは入出力エラー。
fn file_errors_point_at_the_cause() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(dir.path(), "short.bin", &[1, 2]);
    let mut s = session_without_driver();
    s.bench.options_mut().caret = false;
    s.run(&format!("a = file({}, 9)", quoted(&path)), Outcome::Fail);
    assert!(s.err.take().starts_with("[IO001]"));
    s.run(&format!("b = file({})", quoted(&dir.path().join("none.bin"))), Outcome::Fail);
    assert!(s.err.take().starts_with("[IO001]"));
    s.run(&format!("c = file({}, 0, 0)", quoted(&path)), Outcome::Fail);
    assert!(s.err.take().starts_with("[SEM031]"));
}

#[test]
/// PGM は画像として読み込み、デバイス画像を経由して同じ画素で保存できる。
fn pgm_round_trip_through_device_image() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_temp(dir.path(), "gray.pgm", GRAY_2X2);
    let target = dir.path().join("copy.pgm");
    let raw = dir.path().join("raw.bin");
    let mut s = session();
    s.run_all(&[
        &format!("img = file({})", quoted(&source)),
        "dev = image(img)",
        &format!("save dev {}", quoted(&target)),
        &format!("save dev {}", quoted(&raw)),
        &format!("back = file({})", quoted(&target)),
    ]);
    assert_eq!(s.bench.env().lookup("img").unwrap().type_tag(), "gray.pgm (cl_r/uchar)");
    assert!(std::fs::read(&target).unwrap().starts_with(b"P5"));
    let back = s.bench.env().lookup("back").unwrap();
    assert_eq!(back.type_tag(), "copy.pgm (cl_r/uchar)");
    assert_eq!(back.as_image().unwrap().data().bytes(), &[1, 2, 3, 4]);
    assert_eq!(std::fs::read(&raw).unwrap(), vec![1, 2, 3, 4]);
}

#[test]
/// RGBA 画像を PNG で保存し、同じ形式と画素で読み戻せる。
fn png_round_trip_keeps_rgba_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("frame.png");
    let mut s = session();
    s.run_all(&[
        "dev = image(uchar(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16), 2, 2, cl_rgba, uchar)",
        &format!("save dev {}", quoted(&target)),
        &format!("img = file({})", quoted(&target)),
    ]);
    assert!(std::fs::read(&target).unwrap().starts_with(b"\x89PNG"));
    let img = s.bench.env().lookup("img").unwrap();
    assert_eq!(img.type_tag(), "frame.png (cl_rgba/uchar)");
    let expected: Vec<u8> = (1..=16).collect();
    assert_eq!(img.as_image().unwrap().data().bytes(), expected.as_slice());

    s.run("again = image(img)", Outcome::Good);
}

#[test]
/// 寸法が桁あふれするヘッダは画像エラーとして報告し、束縛を作らない。
fn overflowing_image_header_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(dir.path(), "big.pgm", b"P5\n4294967296 4294967296\n255\n\x01");
    let mut s = session_without_driver();
    s.bench.options_mut().caret = false;
    s.run(&format!("x = file({})", quoted(&path)), Outcome::Fail);
    assert!(s.err.take().starts_with("[IMG001]"));
    assert!(!s.bench.env().contains("x"));

    let broken = write_temp(dir.path(), "broken.png", b"\x89PNG\r\n\x1a\n\0\0");
    s.run(&format!("y = file({})", quoted(&broken)), Outcome::Fail);
    assert!(s.err.take().starts_with("[IMG001]"));
}

#[test]
/// 開始位置を指定すると画像として解釈しない。
fn offset_disables_image_decoding() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_temp(dir.path(), "gray.pgm", GRAY_2X2);
    let mut s = session_without_driver();
    s.run(&format!("hdr = file({}, 0, 2)", quoted(&source)), Outcome::Good);
    let hdr = s.bench.env().lookup("hdr").unwrap();
    assert_eq!(hdr.as_data().unwrap().bytes(), b"P5");
}

#[test]
/// プログラムはバイナリとして保存し、binary で作り直せる。
fn program_binary_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.bin");
    let mut s = session();
    s.run_all(&[
        r#"p = program("kernel void copy(global uchar* a, global uchar* b) { }")"#,
        &format!("save p {}", quoted(&path)),
        &format!("q = binary(file({}))", quoted(&path)),
        "k = kernel(q, copy)",
    ]);
    assert!(std::fs::read(&path).unwrap().starts_with(SIM_BINARY_MAGIC));

    s.run(r#"bad = binary(uchar(1, 2, 3))"#, Outcome::Fail);
    assert!(s.err.take().contains("CL_INVALID_BINARY"));
}

#[test]
/// バッファは内容を、カーネルは保存できない旨を返す。
fn save_buffer_and_reject_kernel() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("buf.bin");
    let mut s = session();
    s.run_all(&[
        "m = buffer(uchar(5, 6, 7))",
        &format!("save m {}", quoted(&path)),
        r#"p = program("kernel void f() { }")"#,
        "k = kernel(p, f)",
    ]);
    assert_eq!(std::fs::read(&path).unwrap(), vec![5, 6, 7]);
    s.run(&format!("save k {}", quoted(&dir.path().join("k.bin"))), Outcome::Fail);
    assert!(s.err.take().contains("[SEM064]"));
}
