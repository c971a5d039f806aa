use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),
    #[error("model {name} is not cached in {dir} and no download URL was given")]
    NotCached { name: String, dir: PathBuf },
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Where to look for the FaceBoxes checkpoint.
#[derive(Clone, Debug, Default)]
pub struct ModelSource {
    /// Explicit file; when set, nothing else is consulted.
    pub path: Option<PathBuf>,
    /// File name inside the model cache directory.
    pub name: String,
    /// Fetched into the cache when the named file is missing.
    pub url: Option<String>,
}

/// Resolve the model file, downloading it into the cache if needed.
///
/// Resolution order:
/// 1. Explicit path (must exist)
/// 2. `<cache_dir>/<name>`
/// 3. Download `url` into the cache
pub fn resolve(
    source: &ModelSource,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(path) = &source.path {
        return if path.exists() {
            Ok(path.clone())
        } else {
            Err(ModelResolveError::NotFound(path.clone()))
        };
    }
    resolve_in(&model_cache_dir()?, source, progress)
}

fn resolve_in(
    cache_dir: &Path,
    source: &ModelSource,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cached_path = cache_dir.join(&source.name);
    if cached_path.exists() {
        log::debug!("Using cached model {}", cached_path.display());
        return Ok(cached_path);
    }

    let Some(url) = &source.url else {
        return Err(ModelResolveError::NotCached {
            name: source.name.clone(),
            dir: cache_dir.to_path_buf(),
        });
    };
    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading {} from {url}", source.name);
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/FaceBoxes/models/`
/// - Linux: `$XDG_CACHE_HOME/FaceBoxes/models/` or `~/.cache/FaceBoxes/models/`
/// - Windows: `%LOCALAPPDATA%/FaceBoxes/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("FaceBoxes").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("FaceBoxes").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = stream_to_file(url, dest, &temp_path, progress);

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn stream_to_file(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |e: std::io::Error| ModelResolveError::Write { path, source: e }
    };

    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut file = fs::File::create(temp_path).map_err(write_err(temp_path))?;

    let mut buf = vec![0u8; 256 * 1024];
    loop {
        let n = response.read(&mut buf).map_err(write_err(temp_path))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err(temp_path))?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(write_err(temp_path))?;
    drop(file);

    fs::rename(temp_path, dest).map_err(write_err(dest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn named(name: &str, url: Option<&str>) -> ModelSource {
        ModelSource {
            path: None,
            name: name.to_string(),
            url: url.map(str::to_string),
        }
    }

    #[test]
    fn test_explicit_path_is_returned() {
        let tmp = TempDir::new().unwrap();
        let model = tmp.path().join("FaceBoxes.onnx");
        fs::write(&model, b"weights").unwrap();

        let source = ModelSource {
            path: Some(model.clone()),
            ..named("ignored.onnx", None)
        };
        assert_eq!(resolve(&source, None).unwrap(), model);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let source = ModelSource {
            path: Some(PathBuf::from("/nonexistent/FaceBoxes.onnx")),
            ..named("FaceBoxes.onnx", None)
        };
        assert!(matches!(
            resolve(&source, None),
            Err(ModelResolveError::NotFound(_))
        ));
    }

    #[test]
    fn test_cached_file_is_found() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("FaceBoxes.onnx"), b"weights").unwrap();

        let path = resolve_in(tmp.path(), &named("FaceBoxes.onnx", None), None).unwrap();
        assert_eq!(path, tmp.path().join("FaceBoxes.onnx"));
    }

    #[test]
    fn test_uncached_without_url_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let result = resolve_in(tmp.path(), &named("FaceBoxes.onnx", None), None);
        assert!(matches!(result, Err(ModelResolveError::NotCached { .. })));
    }

    #[test]
    fn test_model_cache_dir_returns_path() {
        let path = model_cache_dir().unwrap();
        assert!(path.to_string_lossy().contains("FaceBoxes"));
        assert!(path.to_string_lossy().contains("models"));
    }

    #[test]
    fn test_download_failure_leaves_no_partial_file() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let result = download("http://invalid.nonexistent.example.com/model", &dest, None);
        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }
}
