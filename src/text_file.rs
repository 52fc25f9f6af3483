//! UTF-8 text file helpers built on `cap-std` ambient directories.
//!
//! Every read and write goes through a directory handle opened on the
//! parent of the target path.

use std::io;

use camino::Utf8Path;
use cap_std::{
    ambient_authority,
    fs_utf8::{Dir, OpenOptions},
};

fn parent_of(path: &Utf8Path) -> &Utf8Path {
    path.parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."))
}

fn file_name_of(path: &Utf8Path) -> io::Result<&str> {
    path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{path} does not name a file"),
        )
    })
}

/// Returns `true` when `path` names an existing entry.
pub(crate) fn exists(path: &Utf8Path) -> io::Result<bool> {
    let file_name = file_name_of(path)?;
    match Dir::open_ambient_dir(parent_of(path), ambient_authority()) {
        Ok(dir) => dir.try_exists(file_name),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Reads `path` as UTF-8 text.
pub(crate) fn read_text(path: &Utf8Path) -> io::Result<String> {
    let file_name = file_name_of(path)?;
    let dir = Dir::open_ambient_dir(parent_of(path), ambient_authority())?;
    dir.read_to_string(file_name)
}

/// Writes `contents` to `path`, creating missing parent directories.
pub(crate) fn write_text(path: &Utf8Path, contents: &str) -> io::Result<()> {
    let file_name = file_name_of(path)?;
    let parent = parent_of(path);
    Dir::create_ambient_dir_all(parent, ambient_authority())?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    dir.write(file_name, contents)
}

/// Opens `path` for appending, creating it and its parent directories.
pub(crate) fn open_append(path: &Utf8Path) -> io::Result<std::fs::File> {
    let file_name = file_name_of(path)?;
    let parent = parent_of(path);
    Dir::create_ambient_dir_all(parent, ambient_authority())?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    Ok(dir.open_with(file_name, &options)?.into_std())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn temp_root(tmp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()))
    }

    #[test]
    fn write_text_creates_parent_directories() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = temp_root(&tmp).join("nested").join("deeper").join("out.txt");

        write_text(&path, "ip route default gateway 192.168.1.254\n")
            .unwrap_or_else(|err| panic!("write: {err}"));

        let contents = read_text(&path).unwrap_or_else(|err| panic!("read: {err}"));
        assert_eq!(contents, "ip route default gateway 192.168.1.254\n");
    }

    #[test]
    fn open_append_keeps_existing_lines() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = temp_root(&tmp).join("logs").join("rtxconfig.log");
        write_text(&path, "first\n").unwrap_or_else(|err| panic!("seed: {err}"));

        let mut file = open_append(&path).unwrap_or_else(|err| panic!("open: {err}"));
        io::Write::write_all(&mut file, b"second\n").unwrap_or_else(|err| panic!("append: {err}"));

        let contents = read_text(&path).unwrap_or_else(|err| panic!("read: {err}"));
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn exists_reports_false_for_missing_parent() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = temp_root(&tmp).join("absent").join("file.txt");

        assert!(!exists(&path).unwrap_or_else(|err| panic!("exists: {err}")));
    }
}
