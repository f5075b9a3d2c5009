// End-to-end runs of the mfsutil binary against a temporary image

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

fn mfsutil(image: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mfsutil"))
        .arg("--disk")
        .arg(image)
        .args(args)
        .output()
        .expect("run mfsutil")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// A freshly formatted 16MB image inside `dir`
fn formatted_image(dir: &Path) -> PathBuf {
    let image = dir.join("disk.img");
    let created = mfsutil(&image, &["create-image", image.to_str().unwrap(), "--size-mb", "16"]);
    assert!(created.status.success(), "{}", stderr(&created));
    let formatted = mfsutil(&image, &["format", "0"]);
    assert!(formatted.status.success(), "{}", stderr(&formatted));
    image
}

#[test]
fn test_format_write_list() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("disk.img");
    let host_file = dir.path().join("hello.txt");
    std::fs::write(&host_file, b"hello mfs").unwrap();

    let created = mfsutil(&image, &["create-image", image.to_str().unwrap(), "--size-mb", "16"]);
    assert!(created.status.success());

    let formatted = mfsutil(&image, &["format", "0", "--name", "Test"]);
    assert!(formatted.status.success(), "{}", String::from_utf8_lossy(&formatted.stderr));
    assert!(stdout(&formatted).contains("Format completed"));

    let written = mfsutil(&image, &["write", host_file.to_str().unwrap(), "0", "--dest", "/docs/hello.txt"]);
    assert!(written.status.success(), "{}", String::from_utf8_lossy(&written.stderr));

    let root = mfsutil(&image, &["ls", "/", "0"]);
    assert!(stdout(&root).contains("Dir: docs"));

    let docs = mfsutil(&image, &["ls", "/docs", "0"]);
    assert!(stdout(&docs).contains("File: hello.txt (9 Bytes)"));

    let cat = mfsutil(&image, &["cat", "/docs/hello.txt", "0"]);
    assert_eq!(stdout(&cat), "hello mfs");

    let verify = mfsutil(&image, &["verify", "0"]);
    assert!(verify.status.success());
    assert!(stdout(&verify).contains("Status: VALID"));
}

#[test]
fn test_argument_errors_exit_255() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("disk.img");

    let output = mfsutil(&image, &["format"]);
    assert_eq!(output.status.code(), Some(255));

    let help = mfsutil(&image, &["--help"]);
    assert_eq!(help.status.code(), Some(0));
}

#[test]
fn test_missing_disk_index_fails() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("disk.img");
    std::fs::write(&image, vec![0u8; 1024 * 1024]).unwrap();

    let output = mfsutil(&image, &["ls", "/", "3"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_mkdir_and_stat_json() {
    let dir = tempfile::tempdir().unwrap();
    let image = formatted_image(dir.path());
    let host_file = dir.path().join("kernel.mos");
    std::fs::write(&host_file, b"kernel image").unwrap();

    let created = mfsutil(&image, &["mkdir", "/system", "0", "--system"]);
    assert!(created.status.success(), "{}", stderr(&created));
    assert!(stdout(&created).contains("/system: Created"));

    let again = mfsutil(&image, &["mkdir", "/system", "0"]);
    assert!(again.status.success());
    assert!(stdout(&again).contains("/system: Unchanged"));

    let written = mfsutil(&image, &["write", host_file.to_str().unwrap(), "0", "--dest", "/system/kernel.mos"]);
    assert!(written.status.success(), "{}", stderr(&written));

    let stat = mfsutil(&image, &["stat", "/SYSTEM/KERNEL.MOS", "0", "--json"]);
    assert!(stat.status.success(), "{}", stderr(&stat));
    let record: serde_json::Value = serde_json::from_str(&stdout(&stat)).unwrap();
    assert_eq!(record["name"], "kernel.mos");
    assert_eq!(record["size"], 12);

    let stat_dir = mfsutil(&image, &["stat", "/system", "0"]);
    assert!(stdout(&stat_dir).contains("Type: Directory"));

    let over_file = mfsutil(&image, &["mkdir", "/system/kernel.mos", "0"]);
    assert_eq!(over_file.status.code(), Some(1));
}

#[test]
fn test_install_tree() {
    let dir = tempfile::tempdir().unwrap();
    let image = formatted_image(dir.path());
    let host = dir.path().join("hdd");
    std::fs::create_dir_all(host.join("system/drivers")).unwrap();
    std::fs::write(host.join("system/kernel.mos"), vec![0x5Au8; 9000]).unwrap();
    std::fs::write(host.join("system/drivers/ahci.dll"), b"driver").unwrap();
    std::fs::write(host.join("readme.txt"), b"read me").unwrap();

    let installed = mfsutil(&image, &["install", "0", "--root", host.to_str().unwrap()]);
    assert!(installed.status.success(), "{}", stderr(&installed));
    assert!(stdout(&installed).contains("Installed 3 files (9013 bytes), 2 new directories"));

    let drivers = mfsutil(&image, &["ls", "/system/drivers", "0"]);
    assert!(stdout(&drivers).contains("File: ahci.dll (6 Bytes)"));

    let readme = mfsutil(&image, &["cat", "/readme.txt", "0"]);
    assert_eq!(stdout(&readme), "read me");

    let verify = mfsutil(&image, &["verify", "0"]);
    assert!(verify.status.success(), "{}", stdout(&verify));

    let missing = mfsutil(&image, &["install", "0", "--root", dir.path().join("nope").to_str().unwrap()]);
    assert_eq!(missing.status.code(), Some(1));
}

#[test]
fn test_shell_session() {
    let dir = tempfile::tempdir().unwrap();
    let image = formatted_image(dir.path());
    let host_file = dir.path().join("notes.txt");
    std::fs::write(&host_file, b"shell notes").unwrap();

    let script = format!(
        "ls / 0\nwrite {} 0\nls /missing 0\nbogus\nls / 0\nquit\nls / 0\n",
        host_file.display()
    );
    let mut child = Command::new(env!("CARGO_BIN_EXE_mfsutil"))
        .arg("--disk")
        .arg(&image)
        .arg("shell")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn mfsutil shell");
    child.stdin.take().unwrap().write_all(script.as_bytes()).unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("mfs> "));
    assert!(out.contains("(empty)"));
    assert!(out.contains("Wrote /notes.txt (11 bytes)"));
    assert_eq!(out.matches("File: notes.txt (11 Bytes)").count(), 1);
    assert!(stderr(&output).contains("Error:"));
}

#[test]
fn test_shell_ends_at_end_of_input() {
    let dir = tempfile::tempdir().unwrap();
    let image = formatted_image(dir.path());

    let mut child = Command::new(env!("CARGO_BIN_EXE_mfsutil"))
        .arg("--disk")
        .arg(&image)
        .arg("shell")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn mfsutil shell");
    child.stdin.take().unwrap().write_all(b"ls / 0\n").unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("(empty)"));
}
