use std::{env, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use futures::{stream::BoxStream, Stream, StreamExt, TryStreamExt};
use object_store::{
    aws::AmazonS3Builder,
    parse_url,
    path::Path,
    Attribute,
    Attributes,
    ObjectStore,
    ObjectStoreScheme,
    PutMultipartOpts,
    WriteMultipart,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_CONTAINER: &str = "files";

fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStorageConfig {
    /// Root URL of the store, e.g. `file:///var/lib/blobs`, `memory:///` or
    /// `s3://bucket/prefix`.
    pub path: String,
    /// Container that uploaded objects are written into.
    #[serde(default = "default_container")]
    pub container: String,
}

impl BlobStorageConfig {
    pub fn new(path: &str) -> Self {
        BlobStorageConfig {
            path: format!("file://{}", path),
            container: default_container(),
        }
    }
}

impl Default for BlobStorageConfig {
    fn default() -> Self {
        let blob_store_path = format!(
            "file://{}",
            env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("filestore_storage/blobs")
                .display()
        );
        BlobStorageConfig {
            path: blob_store_path,
            container: default_container(),
        }
    }
}

/// Opaque durable blob store. Objects live under `<root>/<container>/<name>`.
#[derive(Clone)]
pub struct BlobStorage {
    object_store: Arc<dyn ObjectStore>,
    path: Path,
    local_root: Option<PathBuf>,
    supports_attributes: bool,
}

impl BlobStorage {
    pub fn new(config: &BlobStorageConfig) -> Result<Self> {
        let url = config
            .path
            .parse::<Url>()
            .with_context(|| format!("invalid blob storage url: {}", config.path))?;
        let (scheme, _) = ObjectStoreScheme::parse(&url)?;
        let (object_store, path) = Self::build_object_store(&url, &scheme)?;
        let local_root = match scheme {
            ObjectStoreScheme::Local => Some(
                url.to_file_path()
                    .map_err(|_| anyhow!("blob storage url is not a local path: {}", url))?,
            ),
            _ => None,
        };
        info!("using blob store path: {}", config.path);
        Ok(Self {
            object_store: Arc::from(object_store),
            path,
            // LocalFileSystem rejects object attributes.
            supports_attributes: !matches!(scheme, ObjectStoreScheme::Local),
            local_root,
        })
    }

    fn build_object_store(
        url: &Url,
        scheme: &ObjectStoreScheme,
    ) -> Result<(Box<dyn ObjectStore>, Path)> {
        match scheme {
            ObjectStoreScheme::AmazonS3 => {
                // Credentials, region and endpoint come from AWS_* variables.
                let store = AmazonS3Builder::from_env()
                    .with_url(url.as_str())
                    .build()
                    .context("failed to create s3 object store")?;
                let (_, path) = ObjectStoreScheme::parse(url)?;
                Ok((Box::new(store), path))
            }
            _ => Ok(parse_url(url)?),
        }
    }

    /// Location of `object_name` inside `container`. The first segment of the
    /// name is kept as a directory, the remainder is encoded as one segment.
    pub fn object_path(&self, container: &str, object_name: &str) -> Path {
        let container_path = self.path.child(container);
        match object_name.split_once('/') {
            Some((prefix, rest)) => container_path.child(prefix).child(rest),
            None => container_path.child(object_name),
        }
    }

    /// Filesystem location of an object when the store is backed by local
    /// disk.
    pub fn local_file_path(&self, location: &Path) -> Option<PathBuf> {
        self.local_root.as_ref()?;
        Some(PathBuf::from("/").join(location.as_ref()))
    }

    /// Creates the container if the store needs it. Safe to call
    /// concurrently and repeatedly.
    pub async fn ensure_container(&self, container: &str) -> Result<()> {
        if let Some(root) = &self.local_root {
            let dir = root.join(container);
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("failed to create container {}", dir.display()))?;
        }
        Ok(())
    }

    /// Streams `data` into the object at `location` and returns the number of
    /// bytes written. Nothing is committed if the stream fails or `cancel`
    /// fires before the upload completes.
    pub async fn put(
        &self,
        location: &Path,
        content_type: &str,
        mut data: impl Stream<Item = Result<Bytes>> + Send + Unpin,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut attributes = Attributes::new();
        if self.supports_attributes {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let opts = PutMultipartOpts {
            attributes,
            ..Default::default()
        };
        let m = self.object_store.put_multipart_opts(location, opts).await?;
        let mut w = WriteMultipart::new(m);
        let mut size_bytes = 0;
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    w.abort().await?;
                    return Err(anyhow!("upload of {} cancelled", location));
                }
                chunk = data.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    w.abort().await?;
                    return Err(e.context(format!("error reading content for {}", location)));
                }
            };
            w.wait_for_capacity(1).await?;
            size_bytes += chunk.len() as u64;
            w.write(&chunk);
        }
        w.finish().await?;
        debug!(location = %location, size_bytes, "object written");
        Ok(size_bytes)
    }

    /// Size of the committed object, or `None` if it does not exist.
    pub async fn size(&self, location: &Path) -> Result<Option<u64>> {
        match self.object_store.head(location).await {
            Ok(meta) => Ok(Some(meta.size as u64)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(anyhow!("can't head object {:?}: {:?}", location, e)),
        }
    }

    /// Content of the object, or `None` if it does not exist.
    pub async fn get(&self, location: &Path) -> Result<Option<BoxStream<'static, Result<Bytes>>>> {
        let get_result = match self.object_store.get(location).await {
            Ok(get_result) => get_result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(anyhow!("can't get object {:?}: {:?}", location, e)),
        };
        let path = location.to_string();
        let stream = get_result
            .into_stream()
            .map_err(move |e| anyhow!("error reading object {:?}: {:?}", path, e));
        Ok(Some(stream.boxed()))
    }

    /// Deletes the object. Deleting a missing object succeeds.
    pub async fn delete(&self, location: &Path) -> Result<()> {
        match self.object_store.delete(location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(anyhow!("can't delete object {:?}: {:?}", location, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn local_storage(dir: &tempfile::TempDir) -> BlobStorage {
        let config = BlobStorageConfig::new(dir.path().join("blobs").to_str().unwrap());
        BlobStorage::new(&config).unwrap()
    }

    async fn read_bytes(storage: &BlobStorage, location: &Path) -> Result<Bytes> {
        let stream = storage
            .get(location)
            .await?
            .ok_or_else(|| anyhow!("object not found: {}", location))?;
        let chunks: Vec<Bytes> = stream.try_collect().await?;
        Ok(chunks.concat().into())
    }

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes>> + Send + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_put_get_delete() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = local_storage(&dir);
        storage.ensure_container(DEFAULT_CONTAINER).await?;
        let location = storage.object_path(DEFAULT_CONTAINER, "abc/report.txt");

        let written = storage
            .put(
                &location,
                "text/plain",
                chunks(&[b"hello ", b"world"]),
                &CancellationToken::new(),
            )
            .await?;
        assert_eq!(written, 11);
        assert_eq!(storage.size(&location).await?, Some(11));
        assert_eq!(read_bytes(&storage, &location).await?, Bytes::from("hello world"));

        storage.delete(&location).await?;
        assert_eq!(storage.size(&location).await?, None);
        assert!(storage.get(&location).await?.is_none());
        // deleting again is not an error
        storage.delete(&location).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_put_commits_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = local_storage(&dir);
        let location = storage.object_path(DEFAULT_CONTAINER, "abc/never.bin");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let res = storage
            .put(&location, "application/octet-stream", chunks(&[b"data"]), &cancel)
            .await;
        assert!(res.is_err());
        assert_eq!(storage.size(&location).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_put_cancelled_mid_stream_commits_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = local_storage(&dir);
        storage.ensure_container(DEFAULT_CONTAINER).await?;
        let location = storage.object_path(DEFAULT_CONTAINER, "abc/partial.bin");
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        let data = stream::iter(vec![Ok(Bytes::from_static(b"first"))])
            .chain(stream::once(async move {
                token.cancel();
                std::future::pending::<Result<Bytes>>().await
            }))
            .boxed();
        let res = storage
            .put(&location, "application/octet-stream", data, &cancel)
            .await;
        assert!(res.is_err());
        assert_eq!(storage.size(&location).await?, None);

        let object_dir = dir.path().join("blobs").join(DEFAULT_CONTAINER).join("abc");
        if object_dir.exists() {
            assert_eq!(std::fs::read_dir(&object_dir)?.count(), 0);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_store() -> Result<()> {
        let storage = BlobStorage::new(&BlobStorageConfig {
            path: "memory:///".to_string(),
            container: DEFAULT_CONTAINER.to_string(),
        })?;
        assert!(storage.local_file_path(&Path::from("x")).is_none());
        storage.ensure_container(DEFAULT_CONTAINER).await?;
        let location = storage.object_path(DEFAULT_CONTAINER, "id/photo.png");
        storage
            .put(&location, "image/png", chunks(&[b"png"]), &CancellationToken::new())
            .await?;
        assert_eq!(storage.size(&location).await?, Some(3));
        Ok(())
    }

    #[test]
    fn test_object_path_encodes_filename_as_one_segment() {
        let storage = BlobStorage::new(&BlobStorageConfig {
            path: "memory:///".to_string(),
            container: DEFAULT_CONTAINER.to_string(),
        })
        .unwrap();
        let location = storage.object_path("files", "id/nested/name.txt");
        assert_eq!(location.parts().count(), 3);
    }
}
