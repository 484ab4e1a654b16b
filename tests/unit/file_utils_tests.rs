/*!
 * Tests for file utility functions
 */

use std::fs;
use std::path::Path;
use anyhow::Result;
use subtrans::file_utils::FileManager;
use crate::common;

/// Test that file_exists returns true for existing files
#[test]
fn test_file_exists_withExistingFile_shouldReturnTrue() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let test_file = common::create_test_file(temp_dir.path(), "test_file_exists.tmp", "test content")?;

    assert!(FileManager::file_exists(&test_file));
    assert!(!FileManager::dir_exists(&test_file));

    Ok(())
}

/// Test that file_exists returns false for non-existent files
#[test]
fn test_file_exists_withNonExistentFile_shouldReturnFalse() {
    assert!(!FileManager::file_exists("non_existent_file.tmp"));
}

/// Test that generate_output_path keeps the directory and appends the suffix
#[test]
fn test_generate_output_path_withSuffix_shouldStaySideBySide() {
    let output_path = FileManager::generate_output_path(Path::new("/tmp/input/episode01.srt"), "_vi");
    assert_eq!(output_path, Path::new("/tmp/input/episode01_vi.srt"));
}

/// Test that a bare file name resolves next to the current directory
#[test]
fn test_generate_output_path_withBareFileName_shouldUseCurrentDir() {
    let output_path = FileManager::generate_output_path("movie.srt", ".fr");
    assert_eq!(output_path, Path::new("./movie.fr.srt"));
}

/// Test that find_files walks subdirectories and matches the extension case-insensitively
#[test]
fn test_find_files_withNestedDirs_shouldReturnSortedMatches() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let season = temp_dir.path().join("season1");
    fs::create_dir(&season)?;

    common::create_test_file(temp_dir.path(), "b.srt", "x")?;
    common::create_test_file(temp_dir.path(), "a.SRT", "x")?;
    common::create_test_file(temp_dir.path(), "notes.txt", "x")?;
    common::create_test_file(&season, "e01.srt", "x")?;

    let files = FileManager::find_files(temp_dir.path(), "srt")?;
    let names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();

    assert_eq!(names, vec!["a.SRT", "b.srt", "e01.srt"]);
    Ok(())
}

/// Test that write_atomic creates missing parent directories and replaces content
#[test]
fn test_write_atomic_withMissingParent_shouldCreateAndOverwrite() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let target = temp_dir.path().join("deep").join("nested").join("out.srt");

    FileManager::write_atomic(&target, "first")?;
    FileManager::write_atomic(&target, "second")?;

    assert_eq!(fs::read_to_string(&target)?, "second");
    // no temp files left behind
    assert_eq!(fs::read_dir(target.parent().unwrap())?.count(), 1);
    Ok(())
}

/// Test that remove_if_exists reports whether something was removed
#[test]
fn test_remove_if_exists_withMissingFile_shouldReturnFalse() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let file = common::create_test_file(temp_dir.path(), "gone.txt", "x")?;

    assert!(FileManager::remove_if_exists(&file)?);
    assert!(!FileManager::remove_if_exists(&file)?);
    Ok(())
}

/// Test that require_file rejects directories and missing paths
#[test]
fn test_require_file_withDirectoryOrMissing_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let file = common::create_test_file(temp_dir.path(), "present.srt", "x")?;

    assert!(FileManager::require_file(&file).is_ok());
    assert!(FileManager::require_file(temp_dir.path()).is_err());
    assert!(FileManager::require_file(temp_dir.path().join("absent.srt")).is_err());
    Ok(())
}
