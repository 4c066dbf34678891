//! Integration tests for the exporter
//!
//! These tests populate a temporary cache by hand and materialize it with a
//! path rule, the way `morsel export` does after a crawl.

use morsel::export::Exporter;
use morsel::page::{Block, Page, Value};
use morsel::storage::{FileStorage, Storage};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

/// Builds the cache for an album "X" with one track "Y" whose download is
/// the file `s.mp3`. The file route shares the `track` name so a token
/// chain like `{track:title}.{track:ext}` can hop from the track page to
/// its downloadable file.
fn populate_album_cache(storage: &FileStorage) {
    let mut album_tree = Block::new();
    album_tree.set_field("title", vec![Value::Text("X".to_string())]);
    album_tree.set_field("track", vec![Value::Text("/t/1".to_string())]);
    let mut album = Page::new("album", "/album");
    album.tree = Some(album_tree);
    storage.put(&album);

    let mut track_tree = Block::new();
    track_tree.set_field("title", vec![Value::Text("Y".to_string())]);
    track_tree.set_field("track", vec![Value::Text("/f/1".to_string())]);
    let mut track = Page::new("track", "/t/1");
    track.tree = Some(track_tree);
    storage.put(&track);

    let mut audio = Page::file("track", "/f/1");
    audio.file_name = Some("s.mp3".to_string());
    audio.body = b"AUDIO-BYTES".to_vec();
    storage.put(&audio);
}

#[test]
fn test_export_album_track_file() {
    let cache = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let storage = Arc::new(FileStorage::new(cache.path()));
    populate_album_cache(&storage);

    let rule = format!(
        "{}/{{album:title}}/{{track:title}}.{{track:ext}}",
        out.path().display()
    );
    let exporter = Exporter::new(storage, &rule).unwrap();
    exporter.export();

    let exported = out.path().join("X").join("Y.mp3");
    assert_eq!(fs::read(&exported).unwrap(), b"AUDIO-BYTES");

    // Nothing else materialized
    let count = walk_files(out.path());
    assert_eq!(count, 1);
}

#[test]
fn test_export_is_idempotent() {
    let cache = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let storage = Arc::new(FileStorage::new(cache.path()));
    populate_album_cache(&storage);

    let rule = format!(
        "{}/{{album:title}}/{{track:file}}",
        out.path().display()
    );

    let exporter = Exporter::new(Arc::clone(&storage), &rule).unwrap();
    exporter.export();
    let exported = out.path().join("X").join("s.mp3");
    let first = fs::read(&exported).unwrap();

    let again = Exporter::new(storage, &rule).unwrap();
    again.export();
    let second = fs::read(&exported).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_export_sanitizes_path_separators_in_values() {
    let cache = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let storage = Arc::new(FileStorage::new(cache.path()));

    let mut tree = Block::new();
    tree.set_field("title", vec![Value::Text("AC/DC".to_string())]);
    tree.set_field("track", vec![Value::Text("/f/1".to_string())]);
    let mut album = Page::new("album", "/album");
    album.tree = Some(tree);
    storage.put(&album);

    let mut audio = Page::file("track", "/f/1");
    audio.file_name = Some("s.mp3".to_string());
    audio.body = b"bytes".to_vec();
    storage.put(&audio);

    let rule = format!(
        "{}/{{album:title}}/{{track:file}}",
        out.path().display()
    );
    Exporter::new(storage, &rule).unwrap().export();

    assert!(out.path().join("AC-DC").join("s.mp3").exists());
}

#[test]
fn test_export_skips_pages_not_matching_leading_token() {
    let cache = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let storage = Arc::new(FileStorage::new(cache.path()));

    let mut stray = Page::new("orphan", "/orphan");
    stray.tree = Some(Block::new());
    storage.put(&stray);

    let rule = format!("{}/{{album:title}}/{{track:file}}", out.path().display());
    Exporter::new(storage, &rule).unwrap().export();

    assert_eq!(walk_files(out.path()), 0);
}

#[test]
fn test_export_branch_with_missing_child_continues() {
    let cache = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let storage = Arc::new(FileStorage::new(cache.path()));

    // Album references two files; only one is cached
    let mut tree = Block::new();
    tree.set_field("title", vec![Value::Text("X".to_string())]);
    tree.set_field(
        "track",
        vec![
            Value::Text("/f/missing".to_string()),
            Value::Text("/f/present".to_string()),
        ],
    );
    let mut album = Page::new("album", "/album");
    album.tree = Some(tree);
    storage.put(&album);

    let mut audio = Page::file("track", "/f/present");
    audio.file_name = Some("here.mp3".to_string());
    audio.body = b"ok".to_vec();
    storage.put(&audio);

    let rule = format!("{}/{{album:title}}/{{track:file}}", out.path().display());
    Exporter::new(storage, &rule).unwrap().export();

    assert!(out.path().join("X").join("here.mp3").exists());
    assert_eq!(walk_files(out.path()), 1);
}

#[test]
fn test_export_rejects_malformed_rule() {
    let cache = TempDir::new().unwrap();
    let storage = Arc::new(FileStorage::new(cache.path()));

    assert!(Exporter::new(storage, "out/{album}").is_err());
}

fn walk_files(dir: &std::path::Path) -> usize {
    let mut count = 0;
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            count += walk_files(&path);
        } else {
            count += 1;
        }
    }
    count
}
