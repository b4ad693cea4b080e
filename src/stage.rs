//! Content staging onto mounted partitions.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::assets::AssetRef;
use crate::error::{ProvisionError, Result};
use crate::progress::ProgressSink;

const COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// Copy each asset into `destination_dir`, keeping its file name.
///
/// Stops at the first failure; later assets are not attempted. Returns the
/// staged file names in copy order.
pub fn stage(
    assets: &[&AssetRef],
    destination_dir: &Path,
    progress: &dyn ProgressSink,
) -> Result<Vec<String>> {
    let mut staged = Vec::with_capacity(assets.len());
    for asset in assets {
        let name = asset.file_name();
        if name.is_empty() {
            return Err(ProvisionError::AssetUnavailable {
                key: asset.key,
                reason: format!("{} has no file name", asset.path.display()),
            });
        }
        copy_with_progress(&asset.path, &destination_dir.join(&name), progress)?;
        staged.push(name);
    }
    Ok(staged)
}

/// Byte-for-byte copy in 1 MiB chunks, reporting each chunk.
pub fn copy_with_progress(src: &Path, dst: &Path, progress: &dyn ProgressSink) -> Result<u64> {
    let copy_err = |what: &str, e: std::io::Error| {
        ProvisionError::io(
            format!("{} while copying {} to {}", what, src.display(), dst.display()),
            e,
        )
    };

    let input = File::open(src).map_err(|e| copy_err("open failed", e))?;
    let total = input.metadata().map(|m| m.len()).ok();
    let output = File::create(dst).map_err(|e| copy_err("create failed", e))?;

    let mut reader = BufReader::new(input);
    let mut writer = BufWriter::new(output);
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut copied = 0u64;

    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    progress.start(&format!("Copying {}", name), total);

    loop {
        let n = reader.read(&mut buf).map_err(|e| copy_err("read failed", e))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .map_err(|e| copy_err("write failed", e))?;
        copied += n as u64;
        progress.advance(n as u64);
    }

    writer.flush().map_err(|e| copy_err("flush failed", e))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| copy_err("sync failed", e))?;
    progress.finish();

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetKey;
    use crate::progress::NullProgress;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn asset(key: AssetKey, path: PathBuf) -> AssetRef {
        AssetRef {
            key,
            path,
            source_url: None,
            resolved: true,
        }
    }

    #[test]
    fn test_copy_is_byte_for_byte() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("wtg.img");
        let data: Vec<u8> = (0..(COPY_CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        fs::write(&src, &data).unwrap();

        let dst = temp.path().join("copy.img");
        let copied = copy_with_progress(&src, &dst, &NullProgress).unwrap();

        assert_eq!(copied, data.len() as u64);
        assert_eq!(fs::read(&dst).unwrap(), data);
    }

    #[test]
    fn test_stage_preserves_names_and_order() {
        let temp = TempDir::new().unwrap();
        let src_dir = temp.path().join("src");
        let dest = temp.path().join("dest");
        fs::create_dir_all(&src_dir).unwrap();
        fs::create_dir_all(&dest).unwrap();

        fs::write(src_dir.join("ubuntu.iso"), "ubuntu").unwrap();
        fs::write(src_dir.join("kali.iso"), "kali").unwrap();
        let a = asset(AssetKey::PrimaryImage, src_dir.join("ubuntu.iso"));
        let b = asset(AssetKey::PersistenceImage, src_dir.join("kali.iso"));

        let staged = stage(&[&a, &b], &dest, &NullProgress).unwrap();
        assert_eq!(staged, vec!["ubuntu.iso", "kali.iso"]);
        assert_eq!(fs::read_to_string(dest.join("kali.iso")).unwrap(), "kali");
    }

    #[test]
    fn test_stage_aborts_on_first_failure() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("dest");
        fs::create_dir_all(&dest).unwrap();
        fs::write(temp.path().join("windows.iso"), "win").unwrap();

        let missing = asset(AssetKey::PrimaryImage, temp.path().join("missing.iso"));
        let present = asset(AssetKey::WindowsImage, temp.path().join("windows.iso"));

        let err = stage(&[&missing, &present], &dest, &NullProgress).unwrap_err();
        assert!(matches!(err, ProvisionError::Io { .. }));
        assert!(!dest.join("windows.iso").exists());
    }
}
