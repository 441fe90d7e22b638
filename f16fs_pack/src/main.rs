use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use f16fs::{FileSystem, FileType, FsError};
use std::fs::{read_dir, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::process;

fn fs_error(e: FsError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

#[derive(Debug, Default, PartialEq, Eq)]
struct PackStats {
    files: usize,
    dirs: usize,
    bytes: usize,
    skipped: usize,
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Copy the host directory `host` into `path`, depth first, entries sorted by name.
fn pack_dir(fs: &mut FileSystem, host: &Path, path: &str, stats: &mut PackStats) -> io::Result<()> {
    let mut entries = read_dir(host)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());
    for entry in entries {
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(name) => {
                log::warn!("skipping {:?}: not UTF-8", name);
                stats.skipped += 1;
                continue;
            }
        };
        let target = child_path(path, &name);
        let file_type = if entry.file_type()?.is_dir() {
            FileType::Directory
        } else {
            FileType::Regular
        };
        match fs.create(&target, file_type) {
            Ok(()) => {}
            Err(e @ (FsError::DirectoryFull | FsError::InvalidName | FsError::NoFreeInode | FsError::NoSpace)) => {
                log::warn!("skipping {}: {}", target, e);
                stats.skipped += 1;
                continue;
            }
            Err(e) => return Err(fs_error(e)),
        }
        match file_type {
            FileType::Directory => {
                stats.dirs += 1;
                pack_dir(fs, &entry.path(), &target, stats)?;
            }
            FileType::Regular => {
                let mut data = Vec::new();
                File::open(entry.path())?.read_to_end(&mut data)?;
                let fd = fs.open(&target).map_err(fs_error)?;
                let written = fs.write(fd, &data).map_err(fs_error)?;
                fs.close(fd).map_err(fs_error)?;
                if written < data.len() {
                    log::warn!("{} truncated to {} of {} bytes", target, written, data.len());
                }
                log::info!("{}: {} bytes", target, written);
                stats.files += 1;
                stats.bytes += written;
            }
        }
    }
    Ok(())
}

fn pack(source: &Path, image: &Path) -> io::Result<PackStats> {
    let mut fs = FileSystem::format_path(image).map_err(fs_error)?;
    let mut stats = PackStats::default();
    pack_dir(&mut fs, source, "/", &mut stats)?;
    log::info!("{} blocks left free", fs.free_blocks());
    fs.unmount().map_err(fs_error)?;
    Ok(stats)
}

fn list(image: &Path, path: &str, out: &mut impl Write) -> io::Result<()> {
    let mut fs = FileSystem::mount_path(image).map_err(fs_error)?;
    for record in fs.get_dir(path).map_err(fs_error)? {
        let tag = match record.file_type {
            FileType::Directory => 'd',
            FileType::Regular => '-',
        };
        writeln!(out, "{} {}", tag, record.name)?;
    }
    Ok(())
}

fn cat(image: &Path, path: &str, out: &mut impl Write) -> io::Result<()> {
    let mut fs = FileSystem::mount_path(image).map_err(fs_error)?;
    let fd = fs.open(path).map_err(fs_error)?;
    let mut buf = [0u8; 4096];
    loop {
        let n = fs.read(fd, &mut buf).map_err(fs_error)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
    }
    fs.close(fd).map_err(fs_error)
}

fn image_arg() -> Arg<'static, 'static> {
    Arg::with_name("target")
        .short("t")
        .long("target")
        .takes_value(true)
        .default_value("fs.img")
        .help("Image file")
}

fn run(matches: &ArgMatches) -> io::Result<()> {
    match matches.subcommand() {
        ("pack", Some(sub)) => {
            let source = sub.value_of("source").unwrap_or(".");
            let target = sub.value_of("target").unwrap_or("fs.img");
            log::info!("packing {} into {}", source, target);
            let stats = pack(Path::new(source), Path::new(target))?;
            println!(
                "packed {} files ({} bytes) and {} directories, skipped {}",
                stats.files, stats.bytes, stats.dirs, stats.skipped
            );
            Ok(())
        }
        ("ls", Some(sub)) => {
            let target = sub.value_of("target").unwrap_or("fs.img");
            let path = sub.value_of("path").unwrap_or("/");
            list(Path::new(target), path, &mut io::stdout().lock())
        }
        ("cat", Some(sub)) => {
            let target = sub.value_of("target").unwrap_or("fs.img");
            let path = sub.value_of("path").unwrap_or("/");
            cat(Path::new(target), path, &mut io::stdout().lock())
        }
        _ => Ok(()),
    }
}

fn main() {
    env_logger::init();
    let matches = App::new("F16FS packer")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("pack")
                .about("Format an image and copy a host directory into it")
                .arg(
                    Arg::with_name("source")
                        .short("s")
                        .long("source")
                        .takes_value(true)
                        .required(true)
                        .help("Host directory to copy"),
                )
                .arg(image_arg()),
        )
        .subcommand(
            SubCommand::with_name("ls")
                .about("List a directory of an image")
                .arg(image_arg())
                .arg(Arg::with_name("path").default_value("/")),
        )
        .subcommand(
            SubCommand::with_name("cat")
                .about("Print a file of an image")
                .arg(image_arg())
                .arg(Arg::with_name("path").required(true)),
        )
        .get_matches();
    if let Err(e) = run(&matches) {
        eprintln!("f16fs_pack: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn pack_then_inspect() {
        let host = TempDir::new().unwrap();
        fs::create_dir(host.path().join("bin")).unwrap();
        fs::write(host.path().join("bin/init"), vec![0x7fu8; 5000]).unwrap();
        fs::write(host.path().join("motd"), b"welcome\n").unwrap();

        let out = TempDir::new().unwrap();
        let image = out.path().join("fs.img");
        let stats = pack(host.path(), &image).unwrap();
        assert_eq!(
            stats,
            PackStats {
                files: 2,
                dirs: 1,
                bytes: 5008,
                skipped: 0
            }
        );

        let mut listing = Vec::new();
        list(&image, "/", &mut listing).unwrap();
        assert_eq!(String::from_utf8(listing).unwrap(), "d bin\n- motd\n");

        let mut text = Vec::new();
        cat(&image, "/motd", &mut text).unwrap();
        assert_eq!(text, b"welcome\n");
        let mut init = Vec::new();
        cat(&image, "/bin/init", &mut init).unwrap();
        assert_eq!(init, vec![0x7fu8; 5000]);
    }

    #[test]
    fn crowded_directory_is_trimmed() {
        let host = TempDir::new().unwrap();
        for i in 0..9 {
            fs::write(host.path().join(format!("f{}", i)), [i as u8]).unwrap();
        }
        let out = TempDir::new().unwrap();
        let image = out.path().join("fs.img");
        let stats = pack(host.path(), &image).unwrap();
        assert_eq!(stats.files, 7);
        assert_eq!(stats.skipped, 2);

        let mut text = Vec::new();
        cat(&image, "/f6", &mut text).unwrap();
        assert_eq!(text, [6u8]);
        assert!(cat(&image, "/f8", &mut Vec::new()).is_err());
    }

    #[test]
    fn child_paths_join() {
        assert_eq!(child_path("/", "a"), "/a");
        assert_eq!(child_path("/a", "b"), "/a/b");
    }
}
