//! Serving files from a directory on disk.

use std::path::{Component, Path, PathBuf};

use http::header::CONTENT_TYPE;
use tracing::debug;

use crate::context::Context;
use crate::error::Result;
use crate::handler::{BoxFuture, ErasedHandle};
use crate::response::ContentType;
use crate::status::Status;

/// Serves `root/<catch-all>`; directories answer with their `index.html`.
pub(crate) struct StaticDir {
    root: PathBuf,
    param: String,
}

impl StaticDir {
    pub(crate) fn new(root: PathBuf, param: &str) -> Self {
        Self { root, param: param.to_owned() }
    }

    /// Maps the requested relative path below the root. Absolute paths and
    /// `..` components are refused.
    fn resolve(&self, requested: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for component in Path::new(requested.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(path)
    }

    async fn serve(&self, ctx: &mut Context) -> Result<()> {
        let requested = ctx.path.get(&self.param).unwrap_or_default().to_owned();
        let Some(mut path) = self.resolve(&requested) else {
            debug!(path = %requested, "static path rejected");
            ctx.write_string(Status::NotFound, "404 page not found");
            return Ok(());
        };

        if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            path.push("index.html");
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let content_type = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map_or(ContentType::OctetStream, ContentType::from_extension);
                ctx.set_header(CONTENT_TYPE.as_str(), content_type.as_str())?;
                ctx.write(Status::Ok, bytes);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ctx.write_string(Status::NotFound, "404 page not found");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

impl ErasedHandle for StaticDir {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.serve(ctx))
    }
}
