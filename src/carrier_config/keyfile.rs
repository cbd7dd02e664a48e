//! Carrier-config mapping file (spec §6): a keyfile with a single group,
//! `generic` plus one `<MCCMNC> = <description>` entry per PLMN.

use std::collections::HashMap;
use std::path::Path;

use configparser::ini::Ini;
use log::info;

use crate::config::DeviceConfig;
use crate::error::Error;

pub struct CarrierMapping {
    entries: HashMap<String, String>,
}

impl CarrierMapping {
    /// Load the mapping file named by a device's configuration, if any (spec
    /// SPEC_FULL.md §E).
    pub fn load_from_config(config: &DeviceConfig) -> Result<Option<Self>, Error> {
        match &config.carrier_config_mapping {
            Some(path) => Self::load(path).map(Some),
            None => Ok(None),
        }
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        info!("loading carrier-config mapping from {}", path.display());
        let path_str = path.to_str().ok_or_else(|| Error::validation("carrier-config mapping path is not valid UTF-8"))?;
        let mut ini = Ini::new();
        let sections = ini.load(path_str).map_err(Error::validation)?;

        let mut entries = HashMap::new();
        for props in sections.into_values() {
            for (key, value) in props {
                if let Some(value) = value {
                    entries.insert(key, value);
                }
            }
        }

        if entries.is_empty() {
            return Err(Error::validation("carrier-config mapping file is empty"));
        }

        Ok(Self { entries })
    }

    /// Resolve `imsi` against the mapping: the 6-digit MCC+MNC entry first,
    /// then 5-digit, plus the `generic` fallback (spec §4.5, §6).
    pub fn resolve(&self, imsi: &str) -> (Option<&str>, Option<&str>) {
        let requested = imsi
            .get(0..6)
            .and_then(|p| self.entries.get(p))
            .or_else(|| imsi.get(0..5).and_then(|p| self.entries.get(p)));
        let fallback = self.entries.get("generic");
        (requested.map(String::as_str), fallback.map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(contents: &str) -> tempfile_path::TempFile {
        tempfile_path::TempFile::with_contents(contents)
    }

    mod tempfile_path {
        use std::io::Write;
        use std::path::{Path, PathBuf};
        use std::sync::atomic::{AtomicU32, Ordering};

        static NEXT_ID: AtomicU32 = AtomicU32::new(0);

        pub struct TempFile {
            path: PathBuf,
        }

        impl TempFile {
            pub fn with_contents(contents: &str) -> Self {
                let mut path = std::env::temp_dir();
                let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
                path.push(format!("qmi-carrier-mapping-{}-{id}.ini", std::process::id()));
                let mut file = std::fs::File::create(&path).unwrap();
                file.write_all(contents.as_bytes()).unwrap();
                Self { path }
            }

            pub fn path(&self) -> &Path {
                &self.path
            }
        }

        impl Drop for TempFile {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn resolves_six_digit_entry_before_five() {
        let fixture = write_fixture(
            "[carriers]\n310260 = att\n31026 = generic-att\ngeneric = fallback\n",
        );
        let mapping = CarrierMapping::load(fixture.path()).unwrap();
        let (requested, fallback) = mapping.resolve("310260123456789");
        assert_eq!(requested, Some("att"));
        assert_eq!(fallback, Some("fallback"));
    }

    #[test]
    fn falls_back_to_five_digit_entry() {
        let fixture = write_fixture("[carriers]\n31026 = att-five\ngeneric = fallback\n");
        let mapping = CarrierMapping::load(fixture.path()).unwrap();
        let (requested, _) = mapping.resolve("310260123456789");
        assert_eq!(requested, Some("att-five"));
    }

    #[test]
    fn empty_file_is_a_validation_error() {
        let fixture = write_fixture("");
        assert!(matches!(CarrierMapping::load(fixture.path()), Err(Error::Validation(_))));
    }
}
