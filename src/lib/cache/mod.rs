//! URL → file download cache (§4.C).

use crate::util::error::{Error, Result};
use md5::{Digest, Md5};
use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};
use url::Url;

#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub directory: Option<PathBuf>,
    pub namespace: Option<String>,
    pub offline: bool,
    pub fallback: bool,
    pub hash_name: bool,
}

impl CacheConfig {
    /// §9 Open Question 2: a cache that's enabled (has knobs set) but lacks
    /// a directory is a configuration error, not a silent no-op.
    pub fn validate(&self) -> Result<()> {
        if self.directory.is_none() && (self.offline || self.fallback || self.hash_name) {
            return Err(Error::BadConfigValue(
                "buildout".to_string(),
                "download-cache".to_string(),
                "cache behavior requested without a cache directory".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

pub struct Cache {
    config: CacheConfig,
    logger: slog::Logger,
}

impl Cache {
    pub fn new(config: CacheConfig, logger: slog::Logger) -> Result<Self> {
        config.validate()?;
        Ok(Cache { config, logger })
    }

    fn cache_dir(&self) -> Option<PathBuf> {
        let base = self.config.directory.as_ref()?;
        Some(match &self.config.namespace {
            Some(ns) => base.join(ns),
            None => base.clone(),
        })
    }

    fn cache_name(&self, url: &Url) -> String {
        if self.config.hash_name {
            let mut hasher = Md5::new();
            hasher.update(url.as_str().as_bytes());
            hex::encode(hasher.finalize())
        } else {
            url.path_segments()
                .and_then(|mut segs| segs.next_back())
                .filter(|s| !s.is_empty())
                .unwrap_or("download")
                .to_string()
        }
    }

    /// `fetch(url, md5, dest) -> (path, is_temp)` (§4.C).
    ///
    /// `downloader` performs the actual network GET into a writer; it's
    /// injected so tests never touch the network.
    pub fn fetch(
        &self,
        url: &Url,
        expected_md5: Option<&str>,
        downloader: &dyn Fn(&Url, &mut dyn Write) -> Result<()>,
    ) -> Result<(PathBuf, bool)> {
        if url.scheme() == "file" {
            let path = PathBuf::from(url.path());
            self.verify_checksum(&path, expected_md5)?;
            return Ok((path, false));
        }

        match self.cache_dir() {
            Some(dir) if !self.config.fallback => {
                fs::create_dir_all(&dir)?;
                let dest = dir.join(self.cache_name(url));
                if dest.exists() {
                    slog::debug!(self.logger, "cache hit"; "url" => url.as_str());
                    self.verify_checksum(&dest, expected_md5)?;
                    return Ok((dest, false));
                }
                if self.config.offline {
                    return Err(Error::Offline(url.to_string()).into());
                }
                slog::debug!(self.logger, "cache miss, downloading"; "url" => url.as_str());
                self.download_atomic(url, &dest, downloader)?;
                self.verify_checksum(&dest, expected_md5)?;
                Ok((dest, false))
            }
            Some(dir) => {
                // fallback: best-effort live download into the cache,
                // tolerating network failures, but still verifying bytes
                // that are present.
                fs::create_dir_all(&dir)?;
                let dest = dir.join(self.cache_name(url));
                if !dest.exists() {
                    if self.config.offline {
                        return Err(Error::Offline(url.to_string()).into());
                    }
                    let _ = self.download_atomic(url, &dest, downloader);
                }
                if dest.exists() {
                    self.verify_checksum(&dest, expected_md5)?;
                    Ok((dest, false))
                } else {
                    Err(Error::Offline(url.to_string()).into())
                }
            }
            None => {
                if self.config.offline {
                    return Err(Error::Offline(url.to_string()).into());
                }
                let dest = std::env::temp_dir().join(self.cache_name(url));
                self.download_atomic(url, &dest, downloader)?;
                self.verify_checksum(&dest, expected_md5)?;
                Ok((dest, true))
            }
        }
    }

    fn download_atomic(
        &self,
        url: &Url,
        dest: &Path,
        downloader: &dyn Fn(&Url, &mut dyn Write) -> Result<()>,
    ) -> Result<()> {
        let tmp = dest.with_extension("part");
        {
            let mut f = File::create(&tmp)?;
            if let Err(e) = downloader(url, &mut f) {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        }
        fs::rename(&tmp, dest)?;
        Ok(())
    }

    fn verify_checksum(&self, path: &Path, expected_md5: Option<&str>) -> Result<()> {
        let expected = match expected_md5 {
            Some(e) => e,
            None => return Ok(()),
        };
        let mut file = File::open(path)?;
        let mut hasher = Md5::new();
        io::copy(&mut file, &mut hasher)?;
        let actual = hex::encode(hasher.finalize());
        if actual.eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            Err(Error::BadChecksum(path.display().to_string()).into())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn offline_without_cache_fails() {
        let cfg = CacheConfig {
            directory: Some(PathBuf::from("/tmp/does-not-matter")),
            offline: true,
            ..Default::default()
        };
        let cache = Cache::new(cfg, slog::Logger::root(slog::Discard, slog::o!())).unwrap();
        let url = Url::parse("http://example.com/a.tar.gz").unwrap();
        let err = cache
            .fetch(&url, None, &|_, _| Ok(()))
            .unwrap_err();
        assert!(err.downcast_ref::<Error>().is_some());
    }

    #[test]
    fn cache_without_directory_rejected_when_configured() {
        let cfg = CacheConfig {
            directory: None,
            offline: true,
            ..Default::default()
        };
        assert!(Cache::new(cfg, slog::Logger::root(slog::Discard, slog::o!())).is_err());
    }

    #[test]
    fn file_scheme_checks_checksum() {
        let dir = TempDir::new("cache-test").unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();
        let mut hasher = Md5::new();
        hasher.update(b"hello");
        let md5 = hex::encode(hasher.finalize());

        let cache = Cache::new(CacheConfig::default(), slog::Logger::root(slog::Discard, slog::o!())).unwrap();
        let url = Url::from_file_path(&file).unwrap();
        let (path, is_temp) = cache.fetch(&url, Some(&md5), &|_, _| Ok(())).unwrap();
        assert_eq!(path, file);
        assert!(!is_temp);

        let bad = cache.fetch(&url, Some("deadbeef"), &|_, _| Ok(()));
        assert!(bad.is_err());
    }

    #[test]
    fn caches_by_basename_and_reuses() {
        let dir = TempDir::new("cache-test").unwrap();
        let cfg = CacheConfig {
            directory: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let cache = Cache::new(cfg, slog::Logger::root(slog::Discard, slog::o!())).unwrap();
        let url = Url::parse("http://example.com/pkg-1.0.tar.gz").unwrap();

        let calls = std::cell::RefCell::new(0);
        let downloader = |_: &Url, w: &mut dyn Write| {
            *calls.borrow_mut() += 1;
            w.write_all(b"data").map_err(failure::Error::from)
        };

        let (p1, _) = cache.fetch(&url, None, &downloader).unwrap();
        let (p2, _) = cache.fetch(&url, None, &downloader).unwrap();
        assert_eq!(p1, p2);
        assert_eq!(*calls.borrow(), 1);
    }
}
