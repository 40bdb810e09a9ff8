//! tools::host
//!
//! [`HostProbe`] for the running Linux host.

use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::HostProbe;

#[derive(Debug, Default)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }
}

impl HostProbe for SystemHost {
    fn is_root(&self) -> bool {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }

    fn find_program(&self, name: &str) -> Option<PathBuf> {
        let candidate = Path::new(name);
        if candidate.components().count() > 1 {
            return is_executable(candidate).then(|| candidate.to_path_buf());
        }
        let path = env::var_os("PATH")?;
        env::split_paths(&path)
            .map(|dir| dir.join(name))
            .find(|p| is_executable(p))
    }

    fn package_installed(&self, package: &str) -> bool {
        Command::new("dpkg-query")
            .args(["-W", "-f=${Status}", package])
            .output()
            .map(|out| {
                out.status.success()
                    && String::from_utf8_lossy(&out.stdout).contains("install ok installed")
            })
            .unwrap_or(false)
    }

    fn is_mount_point(&self, path: &Path) -> bool {
        let Ok(table) = fs::read_to_string("/proc/self/mountinfo") else {
            return false;
        };
        let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let found = mount_points(&table).any(|p| p == target);
        found
    }
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Mount points listed in a `/proc/self/mountinfo` table (field 5).
fn mount_points(table: &str) -> impl Iterator<Item = PathBuf> + '_ {
    table
        .lines()
        .filter_map(|line| line.split(' ').nth(4))
        .map(|field| PathBuf::from(unescape_mount_field(field)))
}

/// Undo the octal escaping mountinfo applies to space, tab, newline and `\`.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(v) = u8::try_from(value) {
                    out.push(v);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTINFO: &str = "\
22 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw
61 22 7:0 / /home/op/tiny11_work/iso_mount ro,relatime shared:33 - iso9660 /dev/loop0 ro
62 22 0:55 / /home/op/my\\040work/wim_mount rw,nosuid,nodev shared:34 - fuse.wimlib wimlib rw
";

    #[test]
    fn parses_mount_points() {
        let points: Vec<_> = mount_points(MOUNTINFO).collect();
        assert_eq!(points.len(), 3);
        assert_eq!(points[1], PathBuf::from("/home/op/tiny11_work/iso_mount"));
    }

    #[test]
    fn unescapes_spaces() {
        let points: Vec<_> = mount_points(MOUNTINFO).collect();
        assert_eq!(points[2], PathBuf::from("/home/op/my work/wim_mount"));
    }

    #[test]
    fn finds_sh_on_path() {
        assert!(SystemHost::new().find_program("sh").is_some());
        assert!(SystemHost::new()
            .find_program("definitely-not-a-real-program-t11")
            .is_none());
    }

    #[test]
    fn root_directory_is_a_mount_point() {
        assert!(SystemHost::new().is_mount_point(Path::new("/")));
    }

    #[test]
    fn plain_directory_is_not_a_mount_point() {
        let dir = tempfile::TempDir::new().unwrap();
        let inner = dir.path().join("wim_mount");
        fs::create_dir(&inner).unwrap();
        assert!(!SystemHost::new().is_mount_point(&inner));
    }
}
