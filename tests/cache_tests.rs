use keyhole::{Buffer, CacheError, FileCache, MemoryFile, SystemResolver};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn fixture_cache() -> (TempDir, FileCache) {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("style.css"), "body { color: blue; }").unwrap();
    fs::write(dir.path().join("app.js"), "console.log('hi');").unwrap();
    let cache = FileCache::with_resolver(SystemResolver::new(dir.path()));
    (dir, cache)
}

#[cfg(test)]
mod add_and_get_tests {
    use super::*;

    #[test]
    fn test_resolver_backed_add_then_get() {
        let (_dir, cache) = fixture_cache();
        cache.add("style.css").unwrap();

        let file = cache.get("style.css").unwrap();
        assert_eq!(file.content.bytes(), b"body { color: blue; }");
        assert_eq!(file.mime, "text/css");
    }

    #[test]
    fn test_add_is_not_idempotent() {
        let (_dir, cache) = fixture_cache();
        cache.add("style.css").unwrap();
        assert!(matches!(
            cache.add("style.css"),
            Err(CacheError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_add_without_resolver_fails() {
        let cache = FileCache::new();
        assert!(matches!(cache.add("x.txt"), Err(CacheError::NoResolver)));
    }

    #[test]
    fn test_try_add_swallows_failures() {
        let (_dir, cache) = fixture_cache();
        assert!(cache.try_add("style.css"));
        assert!(!cache.try_add("style.css"));
        assert!(!cache.try_add("missing.css"));
        assert!(!FileCache::new().try_add("style.css"));
    }

    #[test]
    fn test_direct_buffer_insert_round_trips_exactly() {
        let cache = FileCache::new();
        let payload: Vec<u8> = (0u8..=255).collect();
        cache.add_buffer("raw/blob.png", Buffer::new(payload.clone())).unwrap();

        let file = cache.get("raw/blob.png").unwrap();
        assert_eq!(file.content.bytes(), payload.as_slice());
        assert_eq!(file.mime, "image/png");
    }

    #[test]
    fn test_keys_are_case_and_slash_normalized() {
        let cache = FileCache::new();
        cache
            .add_file("Gfx\\Tile.PNG", MemoryFile::new(Buffer::new(vec![1]), ".png"))
            .unwrap();
        assert!(cache.has("gfx/tile.png"));
        assert!(cache.get("GFX/TILE.png").is_ok());
        assert!(matches!(
            cache.add_file("gfx/tile.png", MemoryFile::new(Buffer::new(vec![2]), ".png")),
            Err(CacheError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_get_of_absent_key_fails_and_try_get_is_none() {
        let (_dir, cache) = fixture_cache();
        assert!(matches!(
            cache.get("nope.txt"),
            Err(CacheError::NotCached { .. })
        ));
        assert!(cache.try_get("nope.txt").is_none());
    }
}

#[cfg(test)]
mod get_or_add_tests {
    use super::*;

    #[test]
    fn test_lazily_populates_through_the_resolver() {
        let (_dir, cache) = fixture_cache();
        assert!(!cache.has("app.js"));

        let file = cache.get_or_add("app.js").unwrap();
        assert_eq!(file.mime, "text/javascript");
        assert!(cache.has("app.js"));

        // Second fetch is served from the cache even if the disk changes.
        let file = cache.get_or_add("app.js").unwrap();
        assert_eq!(file.content.bytes(), b"console.log('hi');");
    }

    #[test]
    fn test_unresolvable_subpath_fails_without_inserting() {
        let (_dir, cache) = fixture_cache();
        assert!(cache.get_or_add("missing.js").is_err());
        assert!(cache.try_get_or_add("missing.js").is_none());
        assert!(!cache.has("missing.js"));
    }

    #[test]
    fn test_concurrent_callers_agree_and_leave_one_entry() {
        let (_dir, cache) = fixture_cache();
        let cache = Arc::new(cache);

        let mut workers = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            workers.push(std::thread::spawn(move || {
                cache.get_or_add("style.css").expect("get_or_add")
            }));
        }
        for worker in workers {
            let file = worker.join().expect("worker panicked");
            assert_eq!(file.content.bytes(), b"body { color: blue; }");
        }

        assert_eq!(cache.len(), 1);
        assert!(cache.has("style.css"));
    }
}

#[cfg(test)]
mod refresh_tests {
    use super::*;

    #[test]
    fn test_refresh_of_unknown_key_always_fails() {
        let (_dir, cache) = fixture_cache();
        assert!(matches!(
            cache.refresh("ghost.css"),
            Err(CacheError::NotCached { .. })
        ));
        assert!(matches!(
            cache.refresh_file("ghost.css", MemoryFile::new(Buffer::new(vec![0]), ".css")),
            Err(CacheError::NotCached { .. })
        ));
        assert!(matches!(
            cache.refresh_buffer("ghost.css", Buffer::new(vec![0])),
            Err(CacheError::NotCached { .. })
        ));
        assert!(!cache.has("ghost.css"));
    }

    #[test]
    fn test_refresh_rereads_from_the_resolver() {
        let (dir, cache) = fixture_cache();
        cache.add("style.css").unwrap();

        fs::write(dir.path().join("style.css"), "body { color: red; }").unwrap();
        cache.refresh("style.css").unwrap();

        let file = cache.get("style.css").unwrap();
        assert_eq!(file.content.bytes(), b"body { color: red; }");
    }

    #[test]
    fn test_refresh_buffer_keeps_the_mime_type() {
        let cache = FileCache::new();
        cache.add_buffer("a.css", Buffer::new(b"old".to_vec())).unwrap();

        cache.refresh_buffer("a.css", Buffer::new(b"new".to_vec())).unwrap();
        let file = cache.get("a.css").unwrap();
        assert_eq!(file.content.bytes(), b"new");
        assert_eq!(file.mime, "text/css");
    }
}

#[cfg(test)]
mod clear_and_enumerate_tests {
    use super::*;

    #[test]
    fn test_clear_empties_everything() {
        let (_dir, cache) = fixture_cache();
        cache.add("style.css").unwrap();
        cache.add("app.js").unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.has("style.css"));
    }

    #[test]
    fn test_entries_snapshot_all_pairs() {
        let (_dir, cache) = fixture_cache();
        cache.add("style.css").unwrap();
        cache.add("app.js").unwrap();

        let mut keys: Vec<String> = cache.entries().into_iter().map(|(key, _)| key).collect();
        keys.sort();
        assert_eq!(keys, vec!["app.js", "style.css"]);
    }

    #[test]
    fn test_enumeration_survives_concurrent_clear() {
        let (_dir, cache) = fixture_cache();
        cache.add("style.css").unwrap();
        let cache = Arc::new(cache);

        let snapshot = cache.entries();
        cache.clear();
        // The snapshot stays intact after the cache is emptied.
        assert_eq!(snapshot.len(), 1);
        assert!(cache.is_empty());
    }
}
