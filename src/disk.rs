//! Disk usage accounting for the `status` command: how much of the volume
//! the offline content occupies versus everything else.

use std::io;
use std::path::{Path, PathBuf};

/// Breakdown of the volume holding the offline root.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskSpace {
    pub total: u64,
    pub available: u64,
    /// Bytes under the offline root.
    pub app_used: u64,
    /// Everything else in use on the volume.
    pub other_used: u64,
}

/// Measure the volume and walk the offline root. Runs on the blocking pool;
/// the walk touches every artifact on disk.
pub async fn measure(offline_root: &Path) -> io::Result<DiskSpace> {
    let root: PathBuf = offline_root.to_path_buf();
    tokio::task::spawn_blocking(move || measure_blocking(&root))
        .await
        .map_err(io::Error::other)?
}

fn measure_blocking(root: &Path) -> io::Result<DiskSpace> {
    // Before the first sync the root may not exist yet; stat the nearest
    // existing ancestor for the volume numbers.
    let mut probe = root;
    while !probe.exists() {
        probe = probe.parent().unwrap_or(Path::new("/"));
    }
    let total = fs4::total_space(probe)?;
    let available = fs4::available_space(probe)?;
    let app_used = dir_size(root)?;
    let other_used = total.saturating_sub(available).saturating_sub(app_used);
    Ok(DiskSpace {
        total,
        available,
        app_used,
        other_used,
    })
}

fn dir_size(path: &Path) -> io::Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    let mut sum = 0;
    let mut dirs = vec![path.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if meta.is_dir() {
                dirs.push(entry.path());
            } else {
                sum += meta.len();
            }
        }
    }
    Ok(sum)
}

/// Human-readable byte count, base 1024.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_size_sums_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.bin"), [0u8; 100]).unwrap();
        let nested = tmp.path().join("x/y");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("b.bin"), [0u8; 50]).unwrap();
        assert_eq!(dir_size(tmp.path()).unwrap(), 150);
    }

    #[test]
    fn dir_size_of_missing_path_is_zero() {
        assert_eq!(dir_size(Path::new("/nonexistent/offline")).unwrap(), 0);
    }

    #[tokio::test]
    async fn measure_reports_consistent_volume_numbers() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.bin"), [0u8; 100]).unwrap();
        let space = measure(tmp.path()).await.unwrap();
        assert!(space.total > 0);
        assert!(space.available <= space.total);
        assert_eq!(space.app_used, 100);
    }

    #[tokio::test]
    async fn measure_tolerates_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("not/created/yet");
        let space = measure(&missing).await.unwrap();
        assert_eq!(space.app_used, 0);
        assert!(space.total > 0);
    }

    #[test]
    fn format_bytes_picks_sensible_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
