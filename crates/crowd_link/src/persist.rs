use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A file format for state that outlives a session.
pub trait Persist<T>
where
    for<'de> T: Deserialize<'de> + Serialize,
{
    fn decode(data: &[u8]) -> anyhow::Result<T>;
    fn encode(item: &T) -> anyhow::Result<Vec<u8>>;

    /// Reads `path`. A missing file is `Ok(None)`, anything else unreadable is an error.
    fn load<P>(path: P) -> anyhow::Result<Option<T>>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("cannot read '{}'", path.display()))
            }
        };

        Self::decode(&data)
            .with_context(|| format!("cannot deserialize '{}'", path.display()))
            .map(Some)
    }

    /// Writes through a sibling temporary file so a failed save leaves the old file intact.
    fn save<P>(path: P, item: &T) -> anyhow::Result<()>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let data = Self::encode(item)?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data).with_context(|| format!("cannot save to '{}'", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("cannot move '{}' to '{}'", tmp.display(), path.display()))
    }
}

pub struct Json;

impl<T> Persist<T> for Json
where
    for<'de> T: Deserialize<'de> + Serialize,
{
    fn decode(data: &[u8]) -> anyhow::Result<T> {
        serde_json::from_slice(data).map_err(Into::into)
    }

    fn encode(item: &T) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec_pretty(item).map_err(Into::into)
    }
}

pub struct Toml;

impl<T> Persist<T> for Toml
where
    for<'de> T: Deserialize<'de> + Serialize,
{
    fn decode(data: &[u8]) -> anyhow::Result<T> {
        toml::from_slice(data).map_err(Into::into)
    }

    fn encode(item: &T) -> anyhow::Result<Vec<u8>> {
        Ok(toml::to_string_pretty(item)?.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let res: Option<Vec<u32>> = Json::load(dir.path().join("missing.json")).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let res: anyhow::Result<Option<Vec<u32>>> = Json::load(&path);
        let err = res.unwrap_err();
        assert!(format!("{:#}", err).contains("bad.json"));
    }

    #[test]
    fn save_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        Json::save(&path, &vec![1_u32, 2]).unwrap();
        Json::save(&path, &vec![3_u32]).unwrap();
        let res: Option<Vec<u32>> = Json::load(&path).unwrap();
        assert_eq!(res, Some(vec![3]));
        assert!(!path.with_extension("tmp").exists());
    }
}
