//! Directory-traversal-safe static file resolution.
//!
//! # Responsibilities
//! - Map a request path onto a file below the static root
//! - Refuse anything that would land outside the root, before touching disk
//! - Fall through to routing for missing files and directories
//!
//! # Design Decisions
//! - Resolution is lexical: `..` pops a component, root and prefix
//!   components in the request are ignored, so the result always extends the
//!   base and containment is a component-wise prefix check
//! - Percent-decoding happens first, so encoded separators are separators
//! - Only GET and HEAD are intercepted

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

use crate::error::ApiError;
use crate::observability::metrics;

/// Resolves request paths against a fixed base directory.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    base: PathBuf,
}

impl StaticResolver {
    /// Create a resolver rooted at `base_dir`. Relative roots are taken from
    /// the current working directory.
    pub fn new(base_dir: impl AsRef<Path>) -> io::Result<Self> {
        let absolute = std::path::absolute(base_dir.as_ref())?;
        Ok(Self {
            base: normalize(&absolute),
        })
    }

    /// The normalized absolute base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Lexically resolve `request_path`. `None` means the path is not ours.
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let decoded = urlencoding::decode(request_path).ok()?;
        if decoded.contains('\0') {
            return None;
        }

        let mut resolved = self.base.clone();
        for component in Path::new(decoded.as_ref()).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }

        resolved.starts_with(&self.base).then_some(resolved)
    }

    /// Resolve and confirm a regular file exists there.
    pub async fn locate(&self, request_path: &str) -> Option<PathBuf> {
        let path = self.resolve(request_path)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Stream a file. Open and metadata errors are returned; read errors abort the body.
pub async fn send_file(path: &Path, head_only: bool) -> io::Result<Response> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    let body = if head_only {
        Body::empty()
    } else {
        Body::from_stream(ReaderStream::new(file))
    };

    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    Ok(response)
}

/// Serve files from the static root, deferring everything else.
pub async fn serve_static(
    State(resolver): State<Arc<StaticResolver>>,
    request: Request,
    next: Next,
) -> Response {
    let head_only = match *request.method() {
        Method::GET => false,
        Method::HEAD => true,
        _ => return next.run(request).await,
    };

    let Some(path) = resolver.locate(request.uri().path()).await else {
        return next.run(request).await;
    };

    match send_file(&path, head_only).await {
        Ok(response) => {
            tracing::debug!(path = %path.display(), "Serving static file");
            metrics::record_static_served();
            response
        }
        Err(e) => ApiError::StaticIo(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, Router};
    use tower::ServiceExt;

    struct Fixture {
        _root: tempfile::TempDir,
        public: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let public = root.path().join("base");
        std::fs::create_dir_all(public.join("temp")).unwrap();
        std::fs::create_dir_all(root.path().join("base-evil")).unwrap();
        std::fs::write(public.join("temp/pic.png"), b"png-bytes").unwrap();
        std::fs::write(root.path().join("secret.txt"), b"top secret").unwrap();
        std::fs::write(root.path().join("base-evil/leak.txt"), b"leak").unwrap();
        Fixture { _root: root, public }
    }

    #[test]
    fn test_resolve_inside_base() {
        let fx = fixture();
        let resolver = StaticResolver::new(&fx.public).unwrap();
        assert_eq!(
            resolver.resolve("/temp/pic.png"),
            Some(resolver.base().join("temp/pic.png"))
        );
        assert_eq!(
            resolver.resolve("/temp/./x/../pic.png"),
            Some(resolver.base().join("temp/pic.png"))
        );
    }

    #[test]
    fn test_traversal_rejected() {
        let fx = fixture();
        let resolver = StaticResolver::new(&fx.public).unwrap();
        for attempt in [
            "/../secret.txt",
            "/temp/../../secret.txt",
            "/%2e%2e/secret.txt",
            "/..%2fsecret.txt",
            "/%2E%2E%2F%2E%2E%2Fsecret.txt",
            "/../base-evil/leak.txt",
        ] {
            assert_eq!(resolver.resolve(attempt), None, "{attempt} escaped the base");
        }
    }

    #[test]
    fn test_absolute_looking_paths_stay_inside() {
        let fx = fixture();
        let resolver = StaticResolver::new(&fx.public).unwrap();
        let resolved = resolver.resolve("//etc/passwd").unwrap();
        assert!(resolved.starts_with(resolver.base()));
    }

    #[test]
    fn test_nul_and_invalid_utf8_rejected() {
        let fx = fixture();
        let resolver = StaticResolver::new(&fx.public).unwrap();
        assert_eq!(resolver.resolve("/temp/pic.png%00.txt"), None);
        assert_eq!(resolver.resolve("/%ff%fe"), None);
    }

    #[tokio::test]
    async fn test_locate_skips_missing_and_directories() {
        let fx = fixture();
        let resolver = StaticResolver::new(&fx.public).unwrap();
        assert!(resolver.locate("/temp/pic.png").await.is_some());
        assert!(resolver.locate("/temp/missing.png").await.is_none());
        assert!(resolver.locate("/temp").await.is_none());
        assert!(resolver.locate("/").await.is_none());
    }

    fn app(fx: &Fixture) -> Router {
        let resolver = Arc::new(StaticResolver::new(&fx.public).unwrap());
        Router::new()
            .fallback(|| async { (StatusCode::NOT_FOUND, "routed") })
            .layer(middleware::from_fn_with_state(resolver, serve_static))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_serves_existing_file() {
        let fx = fixture();
        let response = app(&fx)
            .oneshot(Request::builder().uri("/temp/pic.png").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "9");
        assert_eq!(body_text(response).await, "png-bytes");
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let fx = fixture();
        let response = app(&fx)
            .oneshot(
                Request::builder()
                    .method(Method::HEAD)
                    .uri("/temp/pic.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn test_traversal_falls_through_to_routing() {
        let fx = fixture();
        let response = app(&fx)
            .oneshot(
                Request::builder()
                    .uri("/%2e%2e/secret.txt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "routed");
    }

    #[tokio::test]
    async fn test_other_methods_defer() {
        let fx = fixture();
        let response = app(&fx)
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/temp/pic.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "routed");
    }
}
