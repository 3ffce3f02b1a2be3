//! Blocking HTTP [`BucketClient`] for the Google Cloud Storage JSON API.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::trace;

use crate::bucket::{BucketClient, BucketError, ListPage, ObjectAttrs};
use crate::config::RemoteConfig;

const USER_AGENT: &str = concat!("stash-store/", env!("CARGO_PKG_VERSION"));

/// Object resource as returned by the JSON API. Sizes arrive as strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    updated: Option<DateTime<Utc>>,
}

impl TryFrom<ObjectResource> for ObjectAttrs {
    type Error = BucketError;

    fn try_from(resource: ObjectResource) -> Result<Self, Self::Error> {
        let size = match resource.size.as_deref() {
            None => 0,
            Some(raw) => raw.parse().map_err(|_| {
                BucketError::Protocol(format!("invalid size {raw:?} for {}", resource.name))
            })?,
        };
        Ok(Self {
            key: resource.name,
            size,
            updated: resource.updated,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl TryFrom<ObjectList> for ListPage {
    type Error = BucketError;

    fn try_from(list: ObjectList) -> Result<Self, Self::Error> {
        let items = list
            .items
            .into_iter()
            .map(ObjectAttrs::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            items,
            next_page_token: list.next_page_token,
        })
    }
}

/// [`BucketClient`] speaking the GCS JSON API over blocking `reqwest`.
pub struct HttpBucketClient {
    client: Client,
    endpoint: Url,
    project: Option<String>,
    token: Option<String>,
    page_size: u32,
}

impl HttpBucketClient {
    /// Build a client from the remote section of the store configuration.
    pub fn new(config: &RemoteConfig) -> Result<Self, BucketError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|err| {
            BucketError::Protocol(format!("invalid endpoint {:?}: {err}", config.endpoint))
        })?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            project: config.project.clone(),
            token: config.token.clone(),
            page_size: config.page_size,
        })
    }

    /// `<endpoint>/<segments...>`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, BucketError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| BucketError::Protocol(format!("endpoint {} cannot be a base", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn bucket_url(&self, bucket: &str) -> Result<Url, BucketError> {
        self.url(&["storage", "v1", "b", bucket])
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url, BucketError> {
        self.url(&["storage", "v1", "b", bucket, "o", key])
    }

    fn list_url(&self, bucket: &str, prefix: &str, page_token: Option<&str>) -> Result<Url, BucketError> {
        let mut url = self.url(&["storage", "v1", "b", bucket, "o"])?;
        {
            let mut query = url.query_pairs_mut();
            if !prefix.is_empty() {
                query.append_pair("prefix", prefix);
            }
            query.append_pair("maxResults", &self.page_size.to_string());
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    fn upload_url(&self, bucket: &str, key: &str) -> Result<Url, BucketError> {
        let mut url = self.url(&["upload", "storage", "v1", "b", bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        Ok(url)
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, BucketError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send()?;
        let status = response.status();
        trace!(%status, what, "bucket request");
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().unwrap_or_default();
        Err(if status == StatusCode::NOT_FOUND {
            BucketError::NotFound(what.to_string())
        } else if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
            BucketError::Forbidden(format!("{what}: {message}"))
        } else {
            BucketError::Status {
                status: status.as_u16(),
                message,
            }
        })
    }
}

impl std::fmt::Debug for HttpBucketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBucketClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("project", &self.project)
            .field("page_size", &self.page_size)
            // Skip `token`.
            .finish_non_exhaustive()
    }
}

impl BucketClient for HttpBucketClient {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, BucketError> {
        let request = self.client.get(self.bucket_url(bucket)?);
        match self.send(request, bucket) {
            Ok(_) => Ok(true),
            Err(BucketError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn create_bucket(&self, bucket: &str) -> Result<(), BucketError> {
        let mut url = self.url(&["storage", "v1", "b"])?;
        if let Some(project) = &self.project {
            url.query_pairs_mut().append_pair("project", project);
        }
        let body = serde_json::json!({ "name": bucket });
        self.send(self.client.post(url).json(&body), bucket)?;
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BucketError> {
        let mut url = self.object_url(bucket, key)?;
        url.query_pairs_mut().append_pair("alt", "media");
        let response = self.send(self.client.get(url), key)?;
        Ok(response.bytes()?.to_vec())
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<ObjectAttrs, BucketError> {
        let request = self
            .client
            .post(self.upload_url(bucket, key)?)
            .header(CONTENT_TYPE, content_type)
            .body(data.to_vec());
        let resource: ObjectResource = self.send(request, key)?.json()?;
        ObjectAttrs::try_from(resource)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BucketError> {
        self.send(self.client.delete(self.object_url(bucket, key)?), key)?;
        Ok(())
    }

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, BucketError> {
        let url = self.list_url(bucket, prefix, page_token)?;
        let list: ObjectList = self.send(self.client.get(url), bucket)?.json()?;
        ListPage::try_from(list)
    }
}
