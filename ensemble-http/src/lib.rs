//! A concrete implementation of the `ensemble::Mapper` interface for chunk stores served over
//! HTTP(S).
//!
//! Objects live at `{base}/{cid}`. They are read with `GET`, sized with `HEAD` and written with
//! `PUT`.
//!
use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::io::{AsyncRead, Cursor};
use reqwest::{header::CONTENT_LENGTH, Client, Response, StatusCode};
use thiserror::Error;
use tracing::{debug, info};

use ensemble::{BufferedWrite, Catalog, Cid, Mapper, ObjectSink, StoreLocation, StoreWrite};

#[derive(Debug, Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Ensemble(#[from] ensemble::Error),

    #[error("not an http(s) url: {0}")]
    Url(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct HttpMapper {
    client: Client,
    base: String,
}

impl HttpMapper {
    pub fn new(base: &str) -> Result<Self> {
        if !is_url(base) {
            return Err(Error::Url(base.to_string()));
        }

        Ok(Self {
            client: Client::builder().build()?,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url_for(&self, cid: &Cid) -> String {
        format!("{}/{cid}", self.base)
    }
}

fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn to_io(err: reqwest::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

/// `None` for a 404, the response for any other success, an error otherwise
fn found(response: Response) -> io::Result<Option<Response>> {
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }

    response.error_for_status().map(Some).map_err(to_io)
}

#[async_trait]
impl ObjectSink for HttpMapper {
    async fn put(&self, cid: &Cid, object: Vec<u8>) -> io::Result<()> {
        let size = object.len();
        self.client
            .put(self.url_for(cid))
            .body(object)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(to_io)?;
        debug!(%cid, size, "uploaded object");

        Ok(())
    }
}

#[async_trait]
impl Mapper for HttpMapper {
    /// Objects are buffered in RAM and uploaded when the write is finished
    async fn store(&self) -> Box<dyn StoreWrite + '_> {
        Box::new(BufferedWrite::new(self, false))
    }

    async fn hash(&self) -> Box<dyn StoreWrite + '_> {
        Box::new(BufferedWrite::new(self, true))
    }

    async fn load(&self, cid: &Cid) -> io::Result<Option<Box<dyn AsyncRead + Unpin + Send + '_>>> {
        let response = self
            .client
            .get(self.url_for(cid))
            .send()
            .await
            .map_err(to_io)?;
        let Some(response) = found(response)? else {
            return Ok(None);
        };
        let object: Bytes = response.bytes().await.map_err(to_io)?;
        debug!(%cid, size = object.len(), "fetched object");

        Ok(Some(Box::new(Cursor::new(object))))
    }

    async fn size_of(&self, cid: &Cid) -> io::Result<Option<u64>> {
        let response = self
            .client
            .head(self.url_for(cid))
            .send()
            .await
            .map_err(to_io)?;
        let Some(response) = found(response)? else {
            return Ok(None);
        };
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("no content length for {cid}"),
                )
            })?;

        Ok(Some(size))
    }
}

/// Fetch a catalog over HTTP(S). Relative stores resolve against the catalog's own directory.
///
pub async fn fetch_catalog(url: &str) -> Result<Catalog> {
    if !is_url(url) {
        return Err(Error::Url(url.to_string()));
    }
    let text = reqwest::get(url).await?.error_for_status()?.text().await?;
    let base = match url.rsplit_once('/') {
        Some((directory, _)) if is_url(directory) && !directory.ends_with('/') => directory,
        _ => url,
    };
    info!(url, "fetched catalog");

    Ok(Catalog::from_yaml(&text)?.with_base(StoreLocation::parse(base)))
}

/// Read a catalog from a URL or a local path
///
pub async fn open_catalog(location: &str) -> Result<Catalog> {
    if is_url(location) {
        fetch_catalog(location).await
    } else {
        Ok(Catalog::open(location).await?)
    }
}

/// A `Mapper` for any store location: local directories and HTTP(S) stores alike
///
pub fn open_store(location: &StoreLocation) -> Result<Box<dyn Mapper>> {
    match location {
        StoreLocation::Url(url) => Ok(Box::new(HttpMapper::new(url)?)),
        StoreLocation::Directory(_) => Ok(ensemble::open_local_store(location)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use futures::{AsyncReadExt, AsyncWriteExt};
    use tokio::{
        io::{AsyncReadExt as _, AsyncWriteExt as _},
        net::{TcpListener, TcpStream},
    };

    type Objects = Arc<Mutex<HashMap<String, Vec<u8>>>>;

    /// A bare bones object server: PUT stores a body under its path, GET and HEAD return it
    async fn server() -> (String, Objects) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let objects = Objects::default();
        let served = Arc::clone(&objects);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(respond(socket, Arc::clone(&served)));
            }
        });

        (format!("http://{address}"), objects)
    }

    async fn respond(mut socket: TcpStream, objects: Objects) {
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
            if let Some(at) = request.windows(4).position(|window| window == b"\r\n\r\n") {
                break at + 4;
            }
        };

        let head = String::from_utf8_lossy(&request[..header_end]).to_string();
        let mut request_line = head.split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let path = request_line
            .next()
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string();
        let length: usize = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse().ok())
            .unwrap_or(0);

        let mut body = request[header_end..].to_vec();
        while body.len() < length {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            body.extend_from_slice(&buf[..n]);
        }

        let response = match method.as_str() {
            "PUT" => {
                objects.lock().unwrap().insert(path, body);
                response("201 Created", b"", false)
            }
            "GET" | "HEAD" => {
                let stored = objects.lock().unwrap().get(&path).cloned();
                match stored {
                    Some(object) => response("200 OK", &object, method == "HEAD"),
                    None => response("404 Not Found", b"", false),
                }
            }
            _ => response("405 Method Not Allowed", b"", false),
        };
        socket.write_all(&response).await.unwrap();
    }

    fn response(status: &str, body: &[u8], head: bool) -> Vec<u8> {
        let mut response = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        if !head {
            response.extend_from_slice(body);
        }

        response
    }

    #[tokio::test]
    async fn test_store_and_load() -> io::Result<()> {
        let (url, objects) = server().await;
        let mapper = HttpMapper::new(&format!("{url}/store/")).unwrap();
        assert_eq!(mapper.base(), format!("{url}/store"));

        let mut stream = mapper.store().await;
        stream.write_all(b"daily precipitation").await?;
        let cid = stream.finish().await?;
        assert_eq!(cid, ensemble::cid_for(b"daily precipitation")?);
        assert!(objects
            .lock()
            .unwrap()
            .contains_key(&format!("store/{cid}")));

        let mut object = Vec::new();
        mapper
            .load(&cid)
            .await?
            .expect("object should be stored")
            .read_to_end(&mut object)
            .await?;
        assert_eq!(object, b"daily precipitation");
        assert_eq!(mapper.size_of(&cid).await?, Some(19));

        let mut stream = mapper.hash().await;
        stream.write_all(b"never stored").await?;
        let cid = stream.finish().await?;
        assert!(mapper.load(&cid).await?.is_none());
        assert_eq!(mapper.size_of(&cid).await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_server_error() {
        let (url, _) = server().await;
        let mapper = HttpMapper::new(&url).unwrap();
        let cid = ensemble::cid_for(b"t_mean").unwrap();

        // The canned server refuses anything it doesn't know, like a DELETE would be
        let response = mapper
            .client
            .delete(mapper.url_for(&cid))
            .send()
            .await
            .unwrap();
        assert!(found(response).is_err());
    }

    #[tokio::test]
    async fn test_dataset_over_http() -> Result<()> {
        let (url, _) = server().await;
        let resolver = Arc::new(ensemble::Resolver::new(
            open_store(&StoreLocation::parse(&url))?,
            1 << 24,
        ));
        let config = ensemble::SynthConfig {
            days: 20,
            rows: 4,
            cols: 4,
            chunk_shape: [1, 20, 4, 4],
            ..ensemble::SynthConfig::default()
        };
        let written = ensemble::synthesize(&resolver, &config).await?;
        let cid = written.cid.expect("synthesized datasets are committed");

        // A fresh resolver has nothing cached, so everything comes back over the wire
        let resolver = Arc::new(ensemble::Resolver::new(Box::new(HttpMapper::new(&url)?), 0));
        let dataset = resolver.get_dataset(&cid).await?;
        assert_eq!(dataset.title, written.title);
        assert_eq!(dataset.variables.len(), 4);

        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_catalog() -> Result<()> {
        let (url, objects) = server().await;
        let cid = ensemble::cid_for(b"dataset")?;
        objects.lock().unwrap().insert(
            String::from("catalogs/catalog.yaml"),
            format!("metadata: {{store: chunks}}\nsources: {{daily: {{cid: {cid}}}}}").into_bytes(),
        );

        let catalog = open_catalog(&format!("{url}/catalogs/catalog.yaml")).await?;
        let entry = catalog.resolve("daily")?;
        assert_eq!(entry.cid, cid);
        assert_eq!(
            entry.store,
            StoreLocation::Url(format!("{url}/catalogs/chunks"))
        );

        assert!(matches!(
            fetch_catalog(&format!("{url}/catalogs/missing.yaml")).await,
            Err(Error::Http(_))
        ));
        assert!(matches!(
            fetch_catalog("catalog.yaml").await,
            Err(Error::Url(_))
        ));

        Ok(())
    }

    #[test]
    fn test_open_store() -> Result<()> {
        assert!(open_store(&StoreLocation::parse("https://chunks.example.com")).is_ok());
        assert!(matches!(HttpMapper::new("ftp://example.com"), Err(Error::Url(_))));

        Ok(())
    }
}
