//! core::catalog
//!
//! Fixed lists of what gets removed from, and patched into, the image.
//!
//! All paths are relative to the root of a mounted OS image and use `/`
//! separators; the image is mounted on a Linux host.
//!
//! # Known imprecision
//!
//! Bloatware is matched by case-insensitive substring on the package
//! directory name, so an unrelated package whose name contains one of the
//! entries is removed as well. `Microsoft.Xbox` for instance covers every
//! Xbox overlay package, and would also cover any future `Microsoft.Xbox*`
//! package.

use std::num::NonZeroU32;

use crate::core::types::{ImageIndex, RegistryPatch};

/// Directory holding provisioned store packages.
pub const APPS_DIR: &str = "Program Files/WindowsApps";

/// Package-name substrings removed from [`APPS_DIR`].
pub const BLOATWARE: &[&str] = &[
    "Clipchamp",
    "Microsoft.BingNews",
    "Microsoft.BingWeather",
    "Microsoft.GamingApp",
    "Microsoft.GetHelp",
    "Microsoft.Getstarted",
    "Microsoft.MicrosoftOfficeHub",
    "Microsoft.MicrosoftSolitaireCollection",
    "Microsoft.People",
    "Microsoft.PowerAutomateDesktop",
    "Microsoft.Todos",
    "Microsoft.WindowsAlarms",
    "microsoft.windowscommunicationsapps",
    "Microsoft.WindowsFeedbackHub",
    "Microsoft.WindowsMaps",
    "Microsoft.WindowsSoundRecorder",
    "Microsoft.Xbox",
    "Microsoft.YourPhone",
    "Microsoft.ZuneMusic",
    "Microsoft.ZuneVideo",
    "MicrosoftTeams",
];

/// Browser install tree and the WebView runtime that ships beside it.
pub const BROWSER_PATHS: &[&str] = &[
    "Program Files (x86)/Microsoft/Edge",
    "Program Files (x86)/Microsoft/EdgeUpdate",
    "Program Files (x86)/Microsoft/EdgeCore",
    "Windows/System32/Microsoft-Edge-Webview",
];

/// Cloud-sync client installer run at first logon.
pub const CLOUD_SYNC_SETUP: &str = "Windows/System32/OneDriveSetup.exe";

/// Telemetry and diagnostics scheduled-task definitions.
pub const SCHEDULED_TASKS: &[&str] = &[
    "Windows/System32/Tasks/Microsoft/Windows/Customer Experience Improvement Program",
    "Windows/System32/Tasks/Microsoft/Windows/Application Experience",
];

/// SYSTEM hive inside an OS image.
pub const SYSTEM_HIVE: &str = "Windows/System32/config/SYSTEM";

/// Where setup looks for an answer file inside the installed image.
pub const SETUP_ANSWER_DIR: &str = "Windows/System32/Sysprep";

/// Answer file name, both inside the image and at the ISO root.
pub const ANSWER_FILE_NAME: &str = "autounattend.xml";

/// Default location of the answer file.
pub const ANSWER_FILE_URL: &str =
    "https://raw.githubusercontent.com/ntdevlabs/tiny11builder/main/autounattend.xml";

/// Install containers, relative to the staged ISO tree.
pub const INSTALL_WIM: &str = "sources/install.wim";
pub const INSTALL_ESD: &str = "sources/install.esd";

/// Boot container, relative to the staged ISO tree.
pub const BOOT_WIM: &str = "sources/boot.wim";

/// Image inside [`BOOT_WIM`] that runs Windows Setup.
pub const BOOT_SETUP_INDEX: ImageIndex = match NonZeroU32::new(2) {
    Some(index) => ImageIndex::from_nonzero(index),
    None => unreachable!(),
};

/// BIOS El Torito loader, relative to the staged ISO tree.
pub const BIOS_LOADER: &str = "boot/etfsboot.com";

/// EFI El Torito boot image, relative to the staged ISO tree.
pub const EFI_LOADER: &str = "efi/microsoft/boot/efisys.bin";

/// Default output file name, created in the invocation directory.
pub const OUTPUT_NAME: &str = "tiny11.iso";

/// The hardware-check bypass applied to both the install and boot images.
pub fn bypass_patch() -> RegistryPatch {
    RegistryPatch {
        root: "HKEY_LOCAL_MACHINE\\SYSTEM".to_string(),
        key: "Setup\\LabConfig".to_string(),
        comment: "EULA bypass: disable TPM/Secure-Boot/RAM/storage/CPU checks".to_string(),
        values: [
            "BypassTPMCheck",
            "BypassSecureBootCheck",
            "BypassRAMCheck",
            "BypassStorageCheck",
            "BypassCPUCheck",
        ]
        .iter()
        .map(|name| (name.to_string(), 1))
        .collect(),
    }
}

/// Returns true if a package directory name matches the bloatware list.
pub fn is_bloatware(name: &str) -> bool {
    let lower = name.to_lowercase();
    BLOATWARE
        .iter()
        .any(|needle| lower.contains(&needle.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bloatware_matches_case_insensitively() {
        assert!(is_bloatware(
            "Microsoft.BingNews_4.2.27001.0_neutral_~_8wekyb3d8bbwe"
        ));
        assert!(is_bloatware(
            "MICROSOFT.WINDOWSCOMMUNICATIONSAPPS_16005.14326.21538.0_x64__8wekyb3d8bbwe"
        ));
        assert!(is_bloatware("Microsoft.XboxGamingOverlay_2.622.3232.0_x64"));
    }

    #[test]
    fn bloatware_keeps_system_packages() {
        assert!(!is_bloatware("Microsoft.WindowsStore_22301.1401.6.0_x64"));
        assert!(!is_bloatware("Microsoft.VCLibs.140.00_14.0.30704.0_x64"));
        assert!(!is_bloatware("Microsoft.WindowsTerminal_1.17.11461.0_x64"));
    }

    #[test]
    fn bloatware_list_size() {
        assert_eq!(BLOATWARE.len(), 21);
    }

    #[test]
    fn boot_setup_index_is_two() {
        assert_eq!(BOOT_SETUP_INDEX.get(), 2);
    }

    #[test]
    fn bypass_patch_sets_five_flags() {
        let patch = bypass_patch();
        assert_eq!(patch.full_key(), "HKEY_LOCAL_MACHINE\\SYSTEM\\Setup\\LabConfig");
        assert_eq!(patch.values.len(), 5);
        assert!(patch.values.iter().all(|(_, v)| *v == 1));
    }
}
