use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::{IMAGE_EXTENSIONS, IMAGE_LIST_FILENAME};

#[derive(Error, Debug)]
pub enum ImageListError {
    #[error("image directory not found: {0}")]
    MissingImages(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes `<data_root>/<dataset>/img_list.txt` listing every image in
/// `<data_root>/<dataset>/images/`, one file stem per line in sorted order.
///
/// An existing list is replaced. Returns the path of the written list.
pub fn create_image_list(data_root: &Path, dataset: &str) -> Result<PathBuf, ImageListError> {
    let dataset_dir = data_root.join(dataset);
    let images_dir = dataset_dir.join("images");
    if !images_dir.is_dir() {
        return Err(ImageListError::MissingImages(images_dir));
    }

    let stems = image_stems(&images_dir)?;
    let list_path = dataset_dir.join(IMAGE_LIST_FILENAME);
    let write_err = |e| ImageListError::Write {
        path: list_path.clone(),
        source: e,
    };

    let mut file = fs::File::create(&list_path).map_err(write_err)?;
    for stem in &stems {
        writeln!(file, "{stem}").map_err(write_err)?;
    }
    file.flush().map_err(write_err)?;

    log::info!("Listed {} images in {}", stems.len(), list_path.display());
    Ok(list_path)
}

fn image_stems(images_dir: &Path) -> Result<Vec<String>, ImageListError> {
    let read_err = |e| ImageListError::Read {
        path: images_dir.to_path_buf(),
        source: e,
    };

    let mut stems = Vec::new();
    for entry in fs::read_dir(images_dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if !path.is_file() || !is_image(&path) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }
    stems.sort();
    Ok(stems)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn dataset(files: &[&str]) -> TempDir {
        let root = TempDir::new().unwrap();
        let images = root.path().join("FDDB").join("images");
        fs::create_dir_all(&images).unwrap();
        for name in files {
            fs::write(images.join(name), b"").unwrap();
        }
        root
    }

    #[test]
    fn test_lists_sorted_stems() {
        let root = dataset(&["b.jpg", "a.png", "c.JPEG"]);
        let list = create_image_list(root.path(), "FDDB").unwrap();

        assert_eq!(list, root.path().join("FDDB").join("img_list.txt"));
        assert_eq!(fs::read_to_string(&list).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn test_skips_non_images_and_subdirectories() {
        let root = dataset(&["face.jpg", "notes.txt", "README"]);
        fs::create_dir(root.path().join("FDDB/images/nested.jpg")).unwrap();

        let list = create_image_list(root.path(), "FDDB").unwrap();
        assert_eq!(fs::read_to_string(list).unwrap(), "face\n");
    }

    #[test]
    fn test_replaces_existing_list() {
        let root = dataset(&["one.jpg"]);
        let list = root.path().join("FDDB/img_list.txt");
        fs::write(&list, "stale\nentries\n").unwrap();

        create_image_list(root.path(), "FDDB").unwrap();
        assert_eq!(fs::read_to_string(list).unwrap(), "one\n");
    }

    #[test]
    fn test_empty_folder_writes_empty_list() {
        let root = dataset(&[]);
        let list = create_image_list(root.path(), "FDDB").unwrap();
        assert_eq!(fs::read_to_string(list).unwrap(), "");
    }

    #[test]
    fn test_missing_images_dir_is_an_error() {
        let root = TempDir::new().unwrap();
        assert!(matches!(
            create_image_list(root.path(), "PASCAL"),
            Err(ImageListError::MissingImages(_))
        ));
    }

    #[rstest]
    #[case("x.jpg", true)]
    #[case("x.Png", true)]
    #[case("x.webp", true)]
    #[case("x.txt", false)]
    #[case("x", false)]
    fn test_is_image(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_image(Path::new(name)), expected);
    }
}
