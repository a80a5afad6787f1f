//! Cloudflare R2 through its S3-compatible API: ListObjectsV2, PutObject and
//! DeleteObject with path-style addressing and AWS Signature Version 4.

use crate::config::{AppConfig, R2Config};
use crate::error::AppError;
use crate::store::{ObjectPage, ObjectStore, RemoteObject};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, Method};
use sha2::{Digest, Sha256};
use url::Url;

const SERVICE: &str = "s3";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

type HmacSha256 = Hmac<Sha256>;

pub struct R2Store {
    client: Client,
    endpoint: Url,
    bucket: String,
    region: String,
    access_key_id: String,
    secret_access_key: String,
    page_size: usize,
}

impl R2Store {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let r2: &R2Config = &config.r2;
        let missing = r2.missing_keys();
        if !missing.is_empty() {
            return Err(AppError::Config(config::ConfigError::Message(format!(
                "missing required keys in .r2config [r2] section: {}",
                missing.join(", ")
            ))));
        }

        let endpoint = match &r2.endpoint {
            Some(endpoint) => Url::parse(endpoint)?,
            None => Url::parse(&format!("https://{}.r2.cloudflarestorage.com", r2.account_id))?,
        };
        log::debug!("Using R2 bucket '{}' at {}", r2.bucket_name, endpoint);

        Ok(Self {
            client: Client::new(),
            endpoint,
            bucket: r2.bucket_name.clone(),
            region: r2.region.clone(),
            access_key_id: r2.access_key_id.clone(),
            secret_access_key: r2.secret_access_key.clone(),
            page_size: config.remote.page_size.clamp(1, 1000),
        })
    }

    fn host(&self) -> String {
        match (self.endpoint.host_str(), self.endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        }
    }

    fn object_uri(&self, key: &str) -> String {
        let encoded: Vec<String> = key.split('/').map(|s| urlencoding::encode(s).into_owned()).collect();
        format!("/{}/{}", urlencoding::encode(&self.bucket), encoded.join("/"))
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        query: &[(&str, String)],
        body: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let canonical_query = canonical_query(query);
        let payload_hash = hex::encode(Sha256::digest(&body));
        let request = SigningRequest {
            method: method.as_str(),
            uri,
            query: &canonical_query,
            host: &self.host(),
            payload_hash: &payload_hash,
        };
        let authorization = authorization_header(
            &request,
            &self.access_key_id,
            &self.secret_access_key,
            &self.region,
            now,
        )?;

        let mut url = format!(
            "{}://{}{}",
            self.endpoint.scheme(),
            request.host,
            uri
        );
        if !canonical_query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query);
        }

        let mut builder = self
            .client
            .request(method.clone(), url.as_str())
            .header("x-amz-date", amz_datetime(now))
            .header("x-amz-content-sha256", &payload_hash)
            .header("authorization", authorization);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }

        log::trace!("{} {}", method, url);
        let response = builder.body(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AppError::Remote {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl ObjectStore for R2Store {
    fn describe(&self) -> String {
        format!("R2 bucket '{}'", self.bucket)
    }

    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ObjectPage, AppError> {
        let mut query = vec![
            ("list-type", "2".to_string()),
            ("max-keys", self.page_size.to_string()),
        ];
        if !prefix.is_empty() {
            query.push(("prefix", prefix.to_string()));
        }
        if let Some(token) = continuation {
            query.push(("continuation-token", token));
        }
        let uri = format!("/{}", urlencoding::encode(&self.bucket));
        let xml = self.send(Method::GET, &uri, &query, Vec::new(), None).await?;
        parse_list_response(&xml)
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), AppError> {
        let content_type = mime_guess::from_path(key).first_or_octet_stream().to_string();
        self.send(Method::PUT, &self.object_uri(key), &[], body, Some(content_type))
            .await?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), AppError> {
        self.send(Method::DELETE, &self.object_uri(key), &[], Vec::new(), None)
            .await?;
        Ok(())
    }
}

struct SigningRequest<'a> {
    method: &'a str,
    uri: &'a str,
    query: &'a str,
    host: &'a str,
    payload_hash: &'a str,
}

fn amz_datetime(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Query parameters sorted by name, names and values percent-encoded.
fn canonical_query(params: &[(&str, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (urlencoding::encode(k).into_owned(), urlencoding::encode(v).into_owned()))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac(key: &[u8], data: &str) -> Result<Vec<u8>, AppError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| AppError::Generic(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>, AppError> {
    let k_date = hmac(format!("AWS4{}", secret).as_bytes(), date)?;
    let k_region = hmac(&k_date, region)?;
    let k_service = hmac(&k_region, service)?;
    hmac(&k_service, "aws4_request")
}

fn authorization_header(
    request: &SigningRequest,
    access_key_id: &str,
    secret: &str,
    region: &str,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    let amz_date = amz_datetime(now);
    let date = now.format("%Y%m%d").to_string();
    let scope = format!("{}/{}/{}/aws4_request", date, region, SERVICE);

    let canonical_request = format!(
        "{}\n{}\n{}\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n\n{}\n{}",
        request.method,
        request.uri,
        request.query,
        request.host,
        request.payload_hash,
        amz_date,
        SIGNED_HEADERS,
        request.payload_hash,
    );
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );
    let key = signing_key(secret, &date, region, SERVICE)?;
    let signature = hex::encode(hmac(&key, &string_to_sign)?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, access_key_id, scope, SIGNED_HEADERS, signature
    ))
}

/// Parses a ListObjectsV2 response body.
fn parse_list_response(xml: &str) -> Result<ObjectPage, AppError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = ObjectPage::default();
    let mut truncated = false;
    let mut current: Option<(Option<String>, Option<u64>, Option<DateTime<Utc>>)> = None;
    let mut element = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                element = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if element == "Contents" {
                    current = Some((None, None, None));
                }
            }
            Event::Text(e) => {
                let text = e.unescape()?.into_owned();
                match (element.as_str(), current.as_mut()) {
                    ("Key", Some(object)) => object.0 = Some(text),
                    ("Size", Some(object)) => object.1 = text.parse().ok(),
                    ("LastModified", Some(object)) => {
                        object.2 = DateTime::parse_from_rfc3339(&text).ok().map(|d| d.with_timezone(&Utc));
                    }
                    ("IsTruncated", None) => truncated = text == "true",
                    ("NextContinuationToken", None) => page.next = Some(text),
                    _ => {}
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"Contents" {
                    // An entry without a usable size or timestamp cannot be diffed.
                    match current.take() {
                        Some((Some(key), Some(size), Some(last_modified))) => {
                            page.objects.push(RemoteObject { key, size, last_modified });
                        }
                        Some((key, _, _)) => {
                            log::warn!("Skipping listed object {:?} with unreadable Size or LastModified", key);
                        }
                        None => {}
                    }
                }
                element.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !truncated {
        page.next = None;
    }
    Ok(page)
}
