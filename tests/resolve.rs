use crucible::cache::{Cache, CacheConfig};
use crucible::distribution::{store::Store, version::Requirement, WorkingSet};
use crucible::index::{Index, Indices, RemoteDist};
use crucible::resolve::{InstallerConfig, Resolver};
use crucible::util::error::Error;
use semver::{Version, VersionReq};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tempdir::TempDir;
use url::Url;

fn discard_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

fn store(root: &Path) -> Store {
    let store = Store::new(root.join("eggs"), root.join("develop-eggs"));
    store.ensure_dirs().unwrap();
    store
}

struct EmptyIndex;
impl Index for EmptyIndex {
    fn obtain(&self, _project: &str, _req: &VersionReq) -> crucible::Result<Option<RemoteDist>> {
        Ok(None)
    }
    fn candidates(&self, _project: &str) -> crucible::Result<Vec<RemoteDist>> {
        Ok(vec![])
    }
    fn download(&self, _dist: &RemoteDist, _dir: &Path) -> crucible::Result<PathBuf> {
        unreachable!("offline scenario never reaches a download")
    }
}

/// S5: two develop dists, `sampley` requiring `demoneeded=1.0.0` and
/// `samplez` requiring `demoneeded=1.1.0`, resolved as two parts against a
/// shared working set. Whichever resolves second reports the conflict with
/// both the held version and the incoming requirement.
#[test]
fn version_conflict_reports_both_requirements() {
    let root = TempDir::new("resolve-test").unwrap();
    let store = store(root.path());

    fs::create_dir_all(store.eggs_dir.join("demoneeded-1.1.0")).unwrap();

    let sampley = root.path().join("sampley");
    fs::create_dir_all(&sampley).unwrap();
    fs::write(sampley.join("requires.txt"), "demoneeded =1.0.0\n").unwrap();
    store.add_develop(&sampley).unwrap();

    let samplez = root.path().join("samplez");
    fs::create_dir_all(&samplez).unwrap();
    fs::write(samplez.join("requires.txt"), "demoneeded =1.1.0\n").unwrap();
    store.add_develop(&samplez).unwrap();

    let indices = Indices::new(EmptyIndex);
    let cache = Cache::new(CacheConfig::default(), discard_logger()).unwrap();
    let config = InstallerConfig::default();
    let resolver = Resolver::new(&store, &indices, &cache, &config, discard_logger());

    let mut ws = WorkingSet::new();
    resolver
        .resolve(vec![Requirement::parse("samplez", "").unwrap()], &mut ws, "root")
        .unwrap();
    assert_eq!(ws.get("demoneeded").unwrap().version, Version::new(1, 1, 0));

    let err = resolver
        .resolve(vec![Requirement::parse("sampley", "").unwrap()], &mut ws, "root")
        .unwrap_err();

    match err.downcast_ref::<Error>() {
        Some(Error::VersionConflict {
            have,
            requirer,
            requirement,
        }) => {
            assert_eq!(have, "demoneeded 1.1.0");
            assert_eq!(requirer, "sampley");
            assert!(requirement.contains("demoneeded"));
            assert!(requirement.contains("1.0.0"));
        }
        other => panic!("expected VersionConflict, got {:?}", other),
    }
}

/// S6: offline mode fails a remote fetch with `Offline`, and the store is
/// left untouched (no partial eggs directory, no cached download).
#[test]
fn offline_mode_blocks_remote_fetch_without_side_effects() {
    struct OneRemote;
    impl Index for OneRemote {
        fn obtain(&self, project: &str, _req: &VersionReq) -> crucible::Result<Option<RemoteDist>> {
            Ok(Some(RemoteDist {
                project: project.to_string(),
                version: Version::new(1, 0, 0),
                url: Url::parse("https://example.invalid/demo-1.0.0.tar.gz").unwrap(),
                zip_safe: false,
            }))
        }
        fn candidates(&self, _project: &str) -> crucible::Result<Vec<RemoteDist>> {
            Ok(vec![])
        }
        fn download(&self, _dist: &RemoteDist, _dir: &Path) -> crucible::Result<PathBuf> {
            panic!("offline mode must never reach the index's own download")
        }
    }

    let root = TempDir::new("resolve-test").unwrap();
    let store = store(root.path());
    let indices = Indices::new(OneRemote);
    let cache = Cache::new(
        CacheConfig {
            directory: Some(root.path().join("download-cache")),
            offline: true,
            ..Default::default()
        },
        discard_logger(),
    )
    .unwrap();
    let config = InstallerConfig::default();
    let resolver = Resolver::new(&store, &indices, &cache, &config, discard_logger());

    let mut ws = WorkingSet::new();
    let err = resolver
        .resolve(vec![Requirement::parse("demo", "").unwrap()], &mut ws, "root")
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Offline(_))));

    assert!(store.scan().unwrap().is_empty());
    assert!(!root.path().join("download-cache").exists() || fs::read_dir(root.path().join("download-cache")).unwrap().next().is_none());
}

/// Invariant 3: a develop distribution's signature follows its tracked
/// source, ignoring `.pyc`/`.svn` contents.
#[test]
fn develop_signature_tracks_source_but_ignores_vcs_and_bytecode() {
    let root = TempDir::new("resolve-test").unwrap();
    let store = store(root.path());

    let source = root.path().join("foo");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("main.py"), "print('v1')\n").unwrap();
    let dist = store.add_develop(&source).unwrap();
    let sig1 = store.develop_signature(&dist).unwrap();

    fs::create_dir_all(source.join(".svn")).unwrap();
    fs::write(source.join(".svn").join("entries"), "junk").unwrap();
    fs::write(source.join("main.pyc"), "junk").unwrap();
    let sig2 = store.develop_signature(&dist).unwrap();
    assert_eq!(sig1, sig2, "VCS metadata and bytecode must not affect the signature");

    fs::write(source.join("main.py"), "print('v2')\n").unwrap();
    let sig3 = store.develop_signature(&dist).unwrap();
    assert_ne!(sig1, sig3, "a real source change must change the signature");
}
