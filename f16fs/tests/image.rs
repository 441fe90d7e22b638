use f16fs::config::IMAGE_SIZE;
use f16fs::{FileSystem, FileType, FsError, Whence};
use std::fs::OpenOptions;
use tempfile::TempDir;

#[test]
fn image_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let image = dir.path().join("fs.img");

    let mut fs = FileSystem::format_path(&image).unwrap();
    assert_eq!(std::fs::metadata(&image).unwrap().len(), IMAGE_SIZE as u64);
    fs.create("/notes", FileType::Directory).unwrap();
    fs.create("/notes/today", FileType::Regular).unwrap();
    let fd = fs.open("/notes/today").unwrap();
    assert_eq!(fs.write(fd, b"buy milk").unwrap(), 8);
    fs.unmount().unwrap();

    let mut fs = FileSystem::mount_path(&image).unwrap();
    let fd = fs.open("/notes/today").unwrap();
    assert_eq!(fs.seek(fd, 0, Whence::End).unwrap(), 8);
    fs.seek(fd, 4, Whence::Set).unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], b"milk");
}

#[test]
fn missing_image_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let result = FileSystem::mount_path(dir.path().join("absent.img"));
    assert!(matches!(result, Err(FsError::DeviceUnavailable)));
}

#[test]
fn wrong_sized_image_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let image = dir.path().join("short.img");
    OpenOptions::new()
        .write(true)
        .create(true)
        .open(&image)
        .unwrap()
        .set_len(4096)
        .unwrap();
    assert!(matches!(FileSystem::mount_path(&image), Err(FsError::DeviceUnavailable)));
}

#[test]
fn zeroed_image_is_not_a_file_system() {
    let dir = TempDir::new().unwrap();
    let image = dir.path().join("blank.img");
    OpenOptions::new()
        .write(true)
        .create(true)
        .open(&image)
        .unwrap()
        .set_len(IMAGE_SIZE as u64)
        .unwrap();
    assert!(matches!(FileSystem::mount_path(&image), Err(FsError::InvalidImage)));
}
