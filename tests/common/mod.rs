//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use tempfile::TempDir;
use tokio::net::TcpListener;
use upload_shield::config::{AppConfig, StaticFilesConfig, UploadConfig};
use upload_shield::{HttpServer, Shutdown};

/// A config rooted in a fresh temp directory: `<tmp>/public` is the static
/// root and `<tmp>/public/temp` the upload directory.
pub fn test_config() -> (TempDir, AppConfig) {
    let tmp = tempfile::tempdir().unwrap();
    let public = tmp.path().join("public");
    std::fs::create_dir_all(&public).unwrap();

    let mut config = AppConfig::default();
    config.static_files = StaticFilesConfig {
        root: public.to_string_lossy().into_owned(),
    };
    config.upload = UploadConfig {
        dir: public.join("temp").to_string_lossy().into_owned(),
        ..UploadConfig::default()
    };
    (tmp, config)
}

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn public(&self) -> PathBuf {
        self.dir.path().join("public")
    }

    pub fn uploads(&self) -> PathBuf {
        self.public().join("temp")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server from `test_config()`, letting the caller adjust it first.
pub async fn spawn_server(customize: impl FnOnce(&mut AppConfig)) -> TestServer {
    let (dir, mut config) = test_config();
    customize(&mut config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).await.unwrap();

    let wait = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, wait).await.unwrap();
    });

    TestServer {
        addr,
        shutdown,
        dir,
        client: reqwest::Client::new(),
    }
}

/// Encode a noise image, which compresses poorly and so keeps a predictable size.
pub fn noise_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let mut n = x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663);
        n ^= n >> 13;
        n = n.wrapping_mul(0x5bd1_e995);
        n ^= n >> 15;
        image::Rgb([n as u8, (n >> 8) as u8, (n >> 16) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// Number of entries in a directory.
pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// Multipart form with a single file part.
pub fn file_form(field: &str, name: &str, mime: &str, bytes: Vec<u8>) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(name.to_string())
        .mime_str(mime)
        .unwrap();
    reqwest::multipart::Form::new().part(field.to_string(), part)
}
