use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

use fcheck::disk_format::inode::ROOT_INODE;
use fcheck::storage::ImageBuilder;
use tempfile::NamedTempFile;

fn fcheck(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fcheck"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn write_image(builder: &ImageBuilder) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&builder.build().unwrap()).unwrap();
    file.flush().unwrap();
    file
}

fn check_file(path: &Path) -> Output {
    fcheck(&[path.to_str().unwrap()])
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn consistent_image_is_silent() {
    let mut builder = ImageBuilder::new();
    let dir = builder.add_directory(ROOT_INODE, "usr").unwrap();
    builder.add_file(dir, "cat", 3).unwrap();
    let image = write_image(&builder);

    let output = check_file(image.path());
    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
    assert!(output.stderr.is_empty());
}

#[test]
fn missing_argument_is_a_usage_error() {
    let output = fcheck(&[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Usage"));
}

#[test]
fn help_exits_successfully() {
    let output = fcheck(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage"));
}

#[test]
fn missing_image_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = check_file(&dir.path().join("fs.img"));

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stderr(&output), "image not found\n");
}

#[test]
fn bitmap_mismatch_is_reported() {
    let mut builder = ImageBuilder::new();
    let root_block = builder.inode(ROOT_INODE).unwrap().addrs[0] as usize;
    builder.set_block_in_use(root_block, false).unwrap();
    let image = write_image(&builder);

    let output = check_file(image.path());
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        stderr(&output),
        "ERROR: address used by inode but marked free in bitmap.\n"
    );
}

#[test]
fn leaked_block_is_reported() {
    let mut builder = ImageBuilder::new();
    builder.set_block_in_use(50, true).unwrap();
    let image = write_image(&builder);

    let output = check_file(image.path());
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        stderr(&output),
        "ERROR: bitmap marks block in use but it is not in use.\n"
    );
}

#[test]
fn truncated_image_is_reported() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&[0; 100]).unwrap();
    file.flush().unwrap();

    let output = check_file(file.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("ERROR: image is too small"));
}

#[test]
fn repeated_runs_agree() {
    let mut builder = ImageBuilder::new();
    let file = builder.add_file(ROOT_INODE, "f", 1).unwrap();
    builder.update_inode(file, |inode| inode.nlink = 3).unwrap();
    let image = write_image(&builder);

    let first = check_file(image.path());
    let second = check_file(image.path());

    assert_eq!(first.status.code(), Some(1));
    assert_eq!(stderr(&first), "ERROR: bad reference count for file.\n");
    assert_eq!(first.status.code(), second.status.code());
    assert_eq!(first.stderr, second.stderr);
}
