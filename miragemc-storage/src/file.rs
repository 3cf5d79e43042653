//! Flat-file region store: one gzip-compressed NBT document per region.

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use async_trait::async_trait;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::{RegionStore, SavedRegion};

const REGION_EXT: &str = "mrg";

pub struct FileRegionStore {
    dir: PathBuf,
}

impl FileRegionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        // Region names become file names; keep them boring.
        let key = name.to_lowercase();
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            bail!("invalid region name '{name}'");
        }
        Ok(self.dir.join(format!("{key}.{REGION_EXT}")))
    }

    fn encode(region: &SavedRegion) -> Result<Vec<u8>> {
        let nbt = fastnbt::to_bytes(region).context("serializing region NBT")?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&nbt)?;
        Ok(encoder.finish()?)
    }

    fn decode(bytes: &[u8]) -> Result<SavedRegion> {
        let mut nbt = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut nbt)
            .context("decompressing region file")?;
        fastnbt::from_bytes(&nbt).context("parsing region NBT")
    }
}

#[async_trait]
impl RegionStore for FileRegionStore {
    async fn save_region(&self, region: &SavedRegion) -> Result<()> {
        let path = self.path_for(&region.name)?;
        let bytes = Self::encode(region)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating region dir {:?}", self.dir))?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing region file {path:?}"))?;
        log::debug!("saved region '{}' ({} blocks)", region.name, region.blocks.len());
        Ok(())
    }

    async fn load_region(&self, name: &str) -> Result<Option<SavedRegion>> {
        let path = self.path_for(name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading region file {path:?}"));
            }
        };
        Self::decode(&bytes).map(Some)
    }

    async fn delete_region(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("deleting region file {path:?}")),
        }
    }

    async fn list_regions(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(err) => {
                return Err(err).with_context(|| format!("listing region dir {:?}", self.dir));
            }
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(REGION_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SavedBlock;

    fn temp_store(tag: &str) -> FileRegionStore {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .subsec_nanos();
        let dir = std::env::temp_dir().join(format!(
            "miragemc-regions-{tag}-{}-{nanos}",
            std::process::id()
        ));
        FileRegionStore::new(dir)
    }

    fn region(name: &str) -> SavedRegion {
        SavedRegion {
            name: name.to_string(),
            world: 0,
            blocks: vec![
                SavedBlock { x: 10, y: 64, z: 10, material: 1, variant: 0, block_light: 0, sky_light: 15 },
                SavedBlock { x: -5, y: 12, z: 300, material: 35, variant: 14, block_light: 7, sky_light: 0 },
            ],
        }
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let store = temp_store("roundtrip");
        let saved = region("Castle");
        store.save_region(&saved).await.unwrap();

        // Lookup is case-insensitive, like context names.
        let loaded = store.load_region("castle").await.unwrap().unwrap();
        assert_eq!(loaded, saved);

        assert!(store.delete_region("CASTLE").await.unwrap());
        assert!(store.load_region("castle").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_region_is_none_not_error() {
        let store = temp_store("missing");
        assert!(store.load_region("nothing-here").await.unwrap().is_none());
        assert!(!store.delete_region("nothing-here").await.unwrap());
        assert!(store.list_regions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_path_traversal_names() {
        let store = temp_store("names");
        assert!(store.load_region("../etc/passwd").await.is_err());
        assert!(store.load_region("").await.is_err());
    }

    #[tokio::test]
    async fn test_list_regions() {
        let store = temp_store("list");
        store.save_region(&region("beta")).await.unwrap();
        store.save_region(&region("alpha")).await.unwrap();
        assert_eq!(store.list_regions().await.unwrap(), vec!["alpha", "beta"]);
    }
}
