//! Resource and resource template registration, and the file resource
//! handler.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use mcpkit_core::error::{McpError, McpResultExt};
use mcpkit_core::methods;
use mcpkit_core::types::{ReadResourceParams, ReadResourceResult, Resource, ResourceContents, ResourceTemplate};
use mcpkit_session::Context;
use tracing::debug;
use url::Url;

use super::template::UriTemplate;
use crate::session::ServerSession;

/// Handles `resources/read` for one resource or template.
pub type ResourceHandler = Arc<
    dyn Fn(Context, Arc<ServerSession>, ReadResourceParams) -> BoxFuture<'static, Result<ReadResourceResult, McpError>>
        + Send
        + Sync,
>;

fn boxed<F, Fut>(handler: F) -> ResourceHandler
where
    F: Fn(Context, Arc<ServerSession>, ReadResourceParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ReadResourceResult, McpError>> + Send + 'static,
{
    Arc::new(move |ctx, session, params| Box::pin(handler(ctx, session, params)))
}

/// A resource declaration and its handler.
#[derive(Clone)]
pub struct ServerResource {
    /// The declaration advertised in `resources/list`.
    pub resource: Resource,
    /// The handler run by `resources/read`.
    pub handler: ResourceHandler,
}

impl fmt::Debug for ServerResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerResource")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl ServerResource {
    /// A resource served by `handler`.
    pub fn new<F, Fut>(resource: Resource, handler: F) -> Self
    where
        F: Fn(Context, Arc<ServerSession>, ReadResourceParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReadResourceResult, McpError>> + Send + 'static,
    {
        Self {
            resource,
            handler: boxed(handler),
        }
    }

    /// A resource served by an already boxed handler, such as
    /// [`file_resource_handler`].
    #[must_use]
    pub fn with_handler(resource: Resource, handler: ResourceHandler) -> Self {
        Self { resource, handler }
    }

    /// The resource URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.resource.uri
    }
}

pub(crate) fn resource_key(resource: &ServerResource) -> &str {
    &resource.resource.uri
}

/// Check that `uri` parses and carries a scheme.
pub(crate) fn validate_uri(uri: &str) -> Result<Url, McpError> {
    let parsed = Url::parse(uri).map_err(|e| {
        McpError::invalid_params(methods::RESOURCES_LIST, format!("invalid resource URI {uri:?}: {e}"))
    })?;
    if parsed.scheme().is_empty() {
        return Err(McpError::invalid_params(
            methods::RESOURCES_LIST,
            format!("resource URI {uri:?} has no scheme"),
        ));
    }
    Ok(parsed)
}

/// A resource template and its handler.
#[derive(Clone)]
pub struct ServerResourceTemplate {
    /// The declaration advertised in `resources/templates/list`.
    pub template: ResourceTemplate,
    /// The handler run by `resources/read` for matching URIs.
    pub handler: ResourceHandler,
    pattern: UriTemplate,
}

impl fmt::Debug for ServerResourceTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerResourceTemplate")
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl ServerResourceTemplate {
    /// A template served by `handler`. Fails if the URI template is
    /// malformed.
    pub fn new<F, Fut>(template: ResourceTemplate, handler: F) -> Result<Self, McpError>
    where
        F: Fn(Context, Arc<ServerSession>, ReadResourceParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReadResourceResult, McpError>> + Send + 'static,
    {
        Self::with_handler(template, boxed(handler))
    }

    /// A template served by an already boxed handler.
    pub fn with_handler(template: ResourceTemplate, handler: ResourceHandler) -> Result<Self, McpError> {
        let pattern = UriTemplate::parse(&template.uri_template)?;
        Ok(Self {
            template,
            handler,
            pattern,
        })
    }

    /// Whether `uri` is an instance of this template.
    #[must_use]
    pub fn matches(&self, uri: &str) -> bool {
        self.pattern.matches(uri).is_some()
    }
}

pub(crate) fn template_key(template: &ServerResourceTemplate) -> &str {
    &template.template.uri_template
}

/// Fill in the URI and MIME type of returned contents from the declaration.
pub(crate) fn fill_contents(contents: &mut [ResourceContents], uri: &str, mime_type: Option<&str>) {
    for content in contents {
        if content.uri.is_empty() {
            content.uri = uri.to_string();
        }
        if content.mime_type.is_none() {
            content.mime_type = mime_type.map(str::to_string);
        }
    }
}

/// A handler that serves `file://` URIs from under `base_dir`.
///
/// The request path is taken relative to `base_dir`. On every read the
/// client is asked for its roots, and the file must lie strictly under one
/// of them. Contents are returned as a blob.
pub fn file_resource_handler(base_dir: impl AsRef<Path>) -> io::Result<ResourceHandler> {
    let base = std::path::absolute(base_dir.as_ref())?;
    let base = Arc::new(base);
    Ok(boxed(move |ctx, session: Arc<ServerSession>, params: ReadResourceParams| {
        let base = Arc::clone(&base);
        async move {
            let listed = session
                .list_roots(&ctx)
                .await
                .context("asking the client for its roots")?;
            let roots = listed
                .roots
                .iter()
                .map(|root| file_root(&root.uri))
                .collect::<Result<Vec<_>, _>>()?;
            let path = resolve_file_path(&base, &roots, &params.uri)?;
            let data = read_file(&path, &roots, &params.uri).await?;
            Ok(ReadResourceResult::new(vec![ResourceContents::blob(
                params.uri.clone(),
                &data,
            )]))
        }
    }))
}

fn read_error(uri: &str, message: impl fmt::Display) -> McpError {
    McpError::invalid_params(methods::RESOURCES_READ, format!("{uri}: {message}"))
}

/// The absolute path of a `file://` root.
fn file_root(uri: &str) -> Result<PathBuf, McpError> {
    let url = Url::parse(uri).map_err(|e| read_error(uri, format!("invalid root: {e}")))?;
    if url.scheme() != "file" {
        return Err(read_error(uri, "root is not a file URI"));
    }
    let path = url.path();
    if path.is_empty() || !path.starts_with('/') {
        return Err(read_error(uri, "root has no absolute path"));
    }
    url.to_file_path()
        .map_err(|()| read_error(uri, "root is not a local path"))
}

/// Map a `file://` request URI to a path under `base`, and check it lies
/// strictly under one of `roots`.
pub(crate) fn resolve_file_path(base: &Path, roots: &[PathBuf], uri: &str) -> Result<PathBuf, McpError> {
    let url = Url::parse(uri).map_err(|e| read_error(uri, format!("invalid URI: {e}")))?;
    if url.scheme() != "file" {
        return Err(read_error(uri, "not a file URI"));
    }
    let raw = url.path();
    if raw.is_empty() || raw == "/" {
        return Err(read_error(uri, "empty path"));
    }

    let local = url
        .to_file_path()
        .map_err(|()| read_error(uri, "not a local path"))?;

    let mut relative = PathBuf::new();
    for component in local.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::RootDir | Component::CurDir => {}
            _ => return Err(read_error(uri, "path escapes the base directory")),
        }
    }
    if roots.is_empty() {
        return Err(read_error(uri, "client declared no roots"));
    }

    let path = base.join(relative);
    if !is_under_any(&path, roots) {
        return Err(read_error(uri, "not under any root"));
    }
    Ok(path)
}

fn is_under_any(path: &Path, roots: &[PathBuf]) -> bool {
    roots
        .iter()
        .any(|root| path != root.as_path() && path.starts_with(root))
}

async fn read_file(path: &Path, roots: &[PathBuf], uri: &str) -> Result<Vec<u8>, McpError> {
    // Resolve symlinks and re-check, so a link cannot point outside the roots.
    let real = match tokio::fs::canonicalize(path).await {
        Ok(real) => real,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(McpError::resource_not_found(uri));
        }
        Err(e) => return Err(read_error(uri, e)),
    };
    let mut real_roots = Vec::with_capacity(roots.len());
    for root in roots {
        real_roots.push(tokio::fs::canonicalize(root).await.unwrap_or_else(|_| root.clone()));
    }
    if !is_under_any(&real, &real_roots) {
        debug!(path = %path.display(), real = %real.display(), "symlink escapes roots");
        return Err(read_error(uri, "not under any root"));
    }

    match tokio::fs::read(&real).await {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(McpError::resource_not_found(uri)),
        Err(e) => Err(read_error(uri, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn roots() -> Vec<PathBuf> {
        ["file:///files/public", "file:///files/shared"]
            .iter()
            .map(|uri| file_root(uri).unwrap())
            .collect()
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_file_path() {
        let base = Path::new("/files");

        let path = resolve_file_path(base, &roots(), "file:///public/file").unwrap();
        assert_eq!(path, PathBuf::from("/files/public/file"));

        let cases = [
            ("file:///secret/file", "not under any root"),
            ("http:///foo", "not a file"),
            ("file://foo", "empty path"),
        ];
        for (uri, want) in cases {
            let err = resolve_file_path(base, &roots(), uri).unwrap_err();
            assert!(err.to_string().contains(want), "{uri}: {err}");
        }

        let err = resolve_file_path(base, &[], "file:///public/file").unwrap_err();
        assert!(err.to_string().contains("no roots"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn test_root_itself_is_not_under_root() {
        let err = resolve_file_path(Path::new("/files"), &roots(), "file:///public").unwrap_err();
        assert!(err.to_string().contains("not under any root"), "{err}");
    }

    #[test]
    fn test_roots_must_be_file_uris() {
        assert!(file_root("https://example.com/x").is_err());
        assert!(file_root("file://host").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_file_maps_missing_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("public");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("file"), b"data").unwrap();
        let roots = vec![root.clone()];

        let data = read_file(&root.join("file"), &roots, "file:///public/file")
            .await
            .unwrap();
        assert_eq!(data, b"data");

        let err = read_file(&root.join("missing"), &roots, "file:///public/missing")
            .await
            .unwrap_err();
        assert_eq!(err.code(), mcpkit_core::error::codes::RESOURCE_NOT_FOUND);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("public");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(dir.path().join("secret"), b"s").unwrap();
        std::os::unix::fs::symlink(dir.path().join("secret"), root.join("link")).unwrap();

        let err = read_file(&root.join("link"), &[root], "file:///public/link")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not under any root"), "{err}");
    }

    #[test]
    fn test_fill_contents() {
        let mut contents = vec![
            ResourceContents::text("", "a"),
            ResourceContents::text("file:///other", "b").with_mime_type("text/markdown"),
        ];
        fill_contents(&mut contents, "file:///info.txt", Some("text/plain"));
        assert_eq!(contents[0].uri, "file:///info.txt");
        assert_eq!(contents[0].mime_type.as_deref(), Some("text/plain"));
        assert_eq!(contents[1].uri, "file:///other");
        assert_eq!(contents[1].mime_type.as_deref(), Some("text/markdown"));
    }

    #[test]
    fn test_validate_uri() {
        assert!(validate_uri("file:///info.txt").is_ok());
        assert!(validate_uri("no scheme").is_err());
        assert!(validate_uri("/just/a/path").is_err());
    }
}
