use anyhow::{Context, Result, anyhow, bail};
use camino::{Utf8Path, Utf8PathBuf};
use oskit::os;
use rust_embed::RustEmbed;

const MAX_LINK_HOPS: usize = 40;

#[derive(RustEmbed)]
#[folder = "templates"]
struct Templates;

pub fn get_bytes(path: &str) -> Result<Vec<u8>> {
    let file = Templates::get(path).ok_or_else(|| anyhow!("embedded template `{}` missing", path))?;
    Ok(file.data.as_ref().to_vec())
}

/// Replaces `destination` with `bytes`, creating parent directories as needed.
/// A symlink at `destination` is kept and its target is replaced instead.
pub fn write_to(destination: &Utf8Path, bytes: &[u8]) -> Result<()> {
    let target = resolve_links(destination)?;
    if let Some(parent) = target.parent().filter(|p| !p.as_str().is_empty()) {
        os::create_directory(parent, os::DEFAULT_DIRECTORY_MODE)
            .with_context(|| format!("creating directory {}", parent))?;
    }
    let mut file = os::create_empty_file_write_only(&target)
        .with_context(|| format!("creating {}", target))?;
    file.write_fully(bytes)
        .with_context(|| format!("writing {}", target))?;
    file.flush_close()
        .with_context(|| format!("closing {}", target))
}

/// Follows symlinks at `path` until reaching something that isn't one. The
/// final target doesn't have to exist.
fn resolve_links(path: &Utf8Path) -> Result<Utf8PathBuf> {
    let mut current = path.to_owned();
    for _ in 0..MAX_LINK_HOPS {
        match current.symlink_metadata() {
            Ok(meta) if meta.file_type().is_symlink() => {
                let link = current
                    .read_link_utf8()
                    .with_context(|| format!("reading link {}", current))?;
                current = match current.parent() {
                    Some(parent) if link.is_relative() => parent.join(link),
                    _ => link,
                };
            }
            _ => return Ok(current),
        }
    }
    bail!("too many levels of symbolic links at {}", path)
}

pub fn write_template(destination: &Utf8Path, template: &str) -> Result<()> {
    let bytes = get_bytes(template)?;
    write_to(destination, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn example_config_is_embedded() {
        let bytes = get_bytes("config/example.config.toml").unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("[directories]"));
    }

    #[test]
    fn write_to_creates_parents_and_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let dest = root.join("nested").join("deeper").join("out.txt");

        write_to(&dest, b"first version").unwrap();
        write_to(&dest, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "second");
    }

    #[test]
    fn write_to_keeps_symlinks_and_replaces_their_target() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let real = root.join("dotfiles").join("config.toml");
        let link = root.join("config.toml");
        write_to(&real, b"old").unwrap();
        std::os::unix::fs::symlink("dotfiles/config.toml", &link).unwrap();

        write_to(&link, b"new").unwrap();

        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(&real).unwrap(), "new");
    }

    #[test]
    fn write_to_follows_a_dangling_link() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let link = root.join("pointer");
        let target = root.join("later").join("file");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        write_to(&link, b"made").unwrap();

        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "made");
    }

    #[test]
    fn write_to_rejects_symlink_loops() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let a = root.join("a");
        let b = root.join("b");
        std::os::unix::fs::symlink(&b, &a).unwrap();
        std::os::unix::fs::symlink(&a, &b).unwrap();

        assert!(write_to(&a, b"x").is_err());
    }
}
