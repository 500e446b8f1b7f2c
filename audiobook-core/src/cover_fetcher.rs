//! Cover Fetcher (component §4.J): scoped HTTP download of a candidate cover
//! image, cached once under the library root.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;

use crate::error::{CoreError, Result};

const MAX_COVER_BYTES: u64 = 10 * 1024 * 1024;
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CoverFetcher {
    client: reqwest::Client,
    library_root: PathBuf,
}

impl CoverFetcher {
    pub fn new(library_root: PathBuf) -> Self {
        Self {
            client: reqwest::Client::builder().timeout(FETCH_TIMEOUT).build().expect("reqwest client builds"),
            library_root,
        }
    }

    /// Downloads `url` into `<library-root>/covers/<book_id>.<ext>`, gated on
    /// an `image/*` content-type and a 10 MB body cap (§4.J). A no-op if the
    /// cache file is already present — callers don't need to check first.
    pub async fn fetch(&self, book_id: &str, url: &str) -> Result<PathBuf> {
        let covers_dir = self.library_root.join("covers");

        if let Some(existing) = find_cached(&covers_dir, book_id) {
            return Ok(existing);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::Provider { provider: "cover".into(), message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(CoreError::Provider {
                provider: "cover".into(),
                message: format!("unexpected status {}", response.status()),
            });
        }

        let content_type =
            response.headers().get(reqwest::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or("");
        if !content_type.starts_with("image/") {
            return Err(CoreError::Validation(format!("cover content-type is not an image: {content_type}")));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_COVER_BYTES {
                return Err(CoreError::Validation(format!("cover body too large: {len} bytes")));
            }
        }

        let ext = extension_for_content_type(content_type);
        std::fs::create_dir_all(&covers_dir)?;
        let dest = covers_dir.join(format!("{book_id}.{ext}"));
        let tmp = covers_dir.join(format!("{book_id}.{ext}.part"));

        let mut file = std::fs::File::create(&tmp)?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CoreError::Provider { provider: "cover".into(), message: e.to_string() })?;
            written += chunk.len() as u64;
            if written > MAX_COVER_BYTES {
                let _ = std::fs::remove_file(&tmp);
                return Err(CoreError::Validation(format!("cover body exceeded {MAX_COVER_BYTES} bytes")));
            }
            use std::io::Write;
            file.write_all(&chunk)?;
        }
        drop(file);

        std::fs::rename(&tmp, &dest)?;
        Ok(dest)
    }
}

fn find_cached(covers_dir: &Path, book_id: &str) -> Option<PathBuf> {
    for ext in ["jpg", "jpeg", "png", "gif", "webp"] {
        let candidate = covers_dir.join(format!("{book_id}.{ext}"));
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

fn extension_for_content_type(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_cached_cover_by_any_known_extension() {
        let dir = tempfile::tempdir().unwrap();
        let covers = dir.path().join("covers");
        std::fs::create_dir_all(&covers).unwrap();
        std::fs::write(covers.join("book-1.png"), b"fake png").unwrap();

        assert_eq!(find_cached(&covers, "book-1"), Some(covers.join("book-1.png")));
        assert_eq!(find_cached(&covers, "book-2"), None);
    }

    #[test]
    fn maps_known_content_types_to_extensions() {
        assert_eq!(extension_for_content_type("image/png"), "png");
        assert_eq!(extension_for_content_type("image/jpeg"), "jpg");
        assert_eq!(extension_for_content_type("image/webp"), "webp");
    }

    #[tokio::test]
    async fn fetch_skips_network_when_already_cached() {
        let dir = tempfile::tempdir().unwrap();
        let covers = dir.path().join("covers");
        std::fs::create_dir_all(&covers).unwrap();
        std::fs::write(covers.join("book-1.jpg"), b"cached bytes").unwrap();

        let fetcher = CoverFetcher::new(dir.path().to_path_buf());
        let path = fetcher.fetch("book-1", "http://example.invalid/unreachable").await.unwrap();
        assert_eq!(path, covers.join("book-1.jpg"));
    }
}
