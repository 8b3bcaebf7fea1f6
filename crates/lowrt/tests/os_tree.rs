use std::path::Path;

use lowrt::config::RuntimeConfig;
use lowrt::sys::{Native, OpenMode};
use lowrt::Fs;

fn b(p: &Path) -> &[u8] {
    p.as_os_str().as_encoded_bytes()
}

fn small_buffers() -> Fs {
    let cfg = RuntimeConfig {
        dir_buf_bytes: 512,
        io_chunk_bytes: 64,
        ..RuntimeConfig::default()
    };
    Fs::with_config(Native, &cfg)
}

#[test]
fn build_list_and_remove_a_wide_tree() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let fs = small_buffers();
    let root = tmp.path().join("wide");
    fs.mkdir_all(b(&root.join("inner").join("deeper"))).expect("mkdir_all");

    // Enough entries that one 512-byte directory read cannot hold them all.
    let mut expected: Vec<Vec<u8>> = (0..40)
        .map(|i| format!("file-with-a-longish-name-{i:03}.txt").into_bytes())
        .collect();
    for name in &expected {
        let path = root.join(String::from_utf8_lossy(name).as_ref());
        fs.write_file(b(&path), name).expect("write");
    }
    expected.push(b"inner".to_vec());
    expected.sort();

    let mut listed = fs.list_dir(b(&root)).expect("list");
    listed.sort_by(|x, y| x.name.cmp(&y.name));
    let names: Vec<Vec<u8>> = listed.iter().map(|e| e.name.clone()).collect();
    assert_eq!(names, expected);
    for e in &listed {
        assert_eq!(e.is_dir, e.name == b"inner");
    }

    fs.remove_all(b(&root)).expect("remove_all");
    assert!(!root.exists());
}

#[test]
fn whole_file_reads_cross_many_chunks() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let fs = small_buffers();
    let path = tmp.path().join("big.bin");
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    fs.write_file(b(&path), &data).expect("write");
    fs.append_file(b(&path), b"tail").expect("append");

    let back = fs.read_file(b(&path)).expect("read");
    assert_eq!(back.len(), data.len() + 4);
    assert_eq!(&back[..data.len()], &data[..]);
    assert!(back.ends_with(b"tail"));
    assert_eq!(fs.stat(b(&path)).expect("stat").size, back.len() as u64);
}

#[test]
fn open_missing_file_is_not_found() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let err = Fs::native()
        .open(b(&tmp.path().join("absent")), OpenMode::Read)
        .expect_err("absent");
    assert!(err.is_not_found());
    assert!(err.raw_code().is_some());
}

#[test]
fn mkdir_all_is_idempotent_and_remove_all_tolerates_absence() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let fs = Fs::native();
    let path = tmp.path().join("a").join("b");
    fs.mkdir_all(b(&path)).expect("first");
    fs.mkdir_all(b(&path)).expect("second");
    assert!(fs.stat(b(&path)).expect("stat").is_dir);
    fs.remove_all(b(&tmp.path().join("a"))).expect("remove");
    fs.remove_all(b(&tmp.path().join("a"))).expect("remove again");
}
