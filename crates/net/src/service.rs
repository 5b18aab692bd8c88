//! PhoneGap Build implementation of the build service
//!
//! Talks to the REST API v1. Every request authenticates with the
//! `auth_token` query parameter; URLs are never logged with their query.

use crate::archive;
use crate::client::{check_status, NetClient};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use pgb_config::Config;
use pgb_errors::{BuildError, Error, NetworkError};
use pgb_events::{AppEvent, EventEmitter, EventSender, RemoteEvent};
use pgb_step::{BuildService, BuildSession, KeyUnlock, SessionBinding};
use pgb_types::{
    Artifact, BuildReport, Platform, PlatformResult, PlatformStatus, RemoteApp,
};
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use url::Url;

/// Where and how the service is reached
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub base_url: String,
    pub poll_interval: Duration,
    /// Artifact directory, relative to the workspace
    pub output_dir: PathBuf,
    /// Platforms whose artifacts are downloaded
    pub platforms: Vec<Platform>,
}

impl From<&Config> for ServiceOptions {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.service.base_url.clone(),
            poll_interval: config.poll_interval(),
            output_dir: config.service.output_dir.clone(),
            platforms: config.service.platforms.clone(),
        }
    }
}

/// Endpoint builder shared by the service and its sessions
#[derive(Debug, Clone)]
struct Api {
    root: Url,
}

impl Api {
    fn new(base_url: &str) -> Result<Self, Error> {
        let root = Url::parse(&format!("{}/api/v1/", base_url.trim_end_matches('/')))
            .map_err(|e| NetworkError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self { root })
    }

    fn url(&self, path: &str, token: &SecretString) -> Result<Url, Error> {
        let mut url = self
            .root
            .join(path)
            .map_err(|e| NetworkError::InvalidUrl(format!("{path}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("auth_token", token.expose_secret());
        Ok(url)
    }
}

#[derive(Deserialize)]
struct CreatedApp {
    id: u64,
}

/// Build service backed by PhoneGap Build
#[derive(Clone)]
pub struct PgbService {
    client: NetClient,
    api: Api,
    options: ServiceOptions,
}

impl PgbService {
    /// Create a service for `options.base_url`
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::InvalidUrl` if the base URL cannot be parsed.
    pub fn new(client: NetClient, options: ServiceOptions) -> Result<Self, Error> {
        let api = Api::new(&options.base_url)?;
        Ok(Self {
            client,
            api,
            options,
        })
    }

    #[must_use]
    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Fetch the current record of an app
    ///
    /// # Errors
    ///
    /// Returns a network error if the request fails or the app does not
    /// exist, and `NetworkError::InvalidResponse` if the body is not an app.
    pub async fn fetch_app(&self, api_token: &SecretString, app_id: &str) -> Result<RemoteApp, Error> {
        fetch_app(&self.client, &self.api, api_token, app_id).await
    }
}

async fn fetch_app(
    client: &NetClient,
    api: &Api,
    token: &SecretString,
    app_id: &str,
) -> Result<RemoteApp, Error> {
    let url = api.url(&format!("apps/{app_id}"), token)?;
    let response = check_status(client.get(url.as_str()).await?).await?;
    json_body(response).await
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, Error> {
    response
        .json::<T>()
        .await
        .map_err(|e| NetworkError::InvalidResponse(e.without_url().to_string()).into())
}

fn zip_part(bytes: Bytes, file_name: &'static str) -> Part {
    let len = bytes.len() as u64;
    Part::stream_with_length(bytes, len).file_name(file_name)
}

#[async_trait]
impl BuildService for PgbService {
    type Session = PgbSession;

    async fn create_app(
        &self,
        api_token: &SecretString,
        events: &EventSender,
    ) -> Result<String, Error> {
        let url = self.api.url("apps", api_token)?;
        let placeholder = archive::placeholder()?;
        let data = json!({ "title": "pgb", "create_method": "file" }).to_string();

        events.emit_debug("registering a new app with the build service");
        // Never resent: a lost response may still have created the app
        let response = self
            .client
            .execute_once(|c| {
                let form = Form::new()
                    .text("data", data)
                    .part("file", zip_part(placeholder, "placeholder.zip"));
                c.post(url).multipart(form)
            })
            .await?;
        let created: CreatedApp = json_body(check_status(response).await?).await?;
        tracing::debug!(app_id = created.id, "app record created");
        Ok(created.id.to_string())
    }

    fn session(&self, binding: SessionBinding) -> PgbSession {
        PgbSession {
            client: self.client.clone(),
            api: self.api.clone(),
            options: self.options.clone(),
            binding,
            file_base_name: None,
            version: None,
            app_name: None,
        }
    }
}

/// One build of one app on PhoneGap Build
pub struct PgbSession {
    client: NetClient,
    api: Api,
    options: ServiceOptions,
    binding: SessionBinding,
    file_base_name: Option<String>,
    version: Option<String>,
    app_name: Option<String>,
}

impl PgbSession {
    fn events(&self) -> &EventSender {
        &self.binding.events
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        self.api.url(path, &self.binding.api_token)
    }

    fn base_name(&self) -> String {
        self.file_base_name
            .clone()
            .unwrap_or_else(|| format!("app-{}", self.binding.app_id))
    }

    /// `data` field of the upload: override values plus the keys to sign with
    fn upload_data(&self) -> serde_json::Value {
        let mut data = serde_json::Map::new();
        if let Some(name) = &self.app_name {
            data.insert("title".to_string(), json!(name));
        }
        if let Some(version) = &self.version {
            data.insert("version".to_string(), json!(version));
        }

        let mut keys = serde_json::Map::new();
        if let Some(id) = &self.binding.android_key_id {
            keys.insert("android".to_string(), json!({ "id": key_id_value(id) }));
        }
        if let Some(id) = &self.binding.ios_key_id {
            keys.insert("ios".to_string(), json!({ "id": key_id_value(id) }));
        }
        if !keys.is_empty() {
            data.insert("keys".to_string(), serde_json::Value::Object(keys));
        }
        serde_json::Value::Object(data)
    }

    async fn upload(&self, workspace: &Path) -> Result<(), Error> {
        let exclude = workspace.join(&self.options.output_dir);
        let packed = archive::pack_workspace(workspace, &exclude).await?;
        self.events().emit(AppEvent::Remote(RemoteEvent::ArchiveCreated {
            files: packed.files,
            bytes: packed.len(),
        }));

        let url = self.url(&format!("apps/{}", self.binding.app_id))?;
        let data = self.upload_data().to_string();

        self.events().emit(AppEvent::Remote(RemoteEvent::UploadStarted {
            app_id: self.binding.app_id.clone(),
            bytes: packed.len(),
        }));
        let response = self
            .client
            .execute(|c| {
                let form = Form::new()
                    .text("data", data.clone())
                    .part("file", zip_part(packed.bytes.clone(), "workspace.zip"));
                c.put(url.clone()).multipart(form)
            })
            .await?;
        check_status(response).await?;
        self.events().emit(AppEvent::Remote(RemoteEvent::UploadCompleted {
            app_id: self.binding.app_id.clone(),
        }));
        Ok(())
    }

    async fn trigger_build(&self) -> Result<(), Error> {
        let url = self.url(&format!("apps/{}/build", self.binding.app_id))?;
        let platforms: Vec<&str> = self.options.platforms.iter().map(|p| p.as_str()).collect();
        let data = json!({ "platforms": platforms }).to_string();
        let response = self
            .client
            .execute_once(|c| c.post(url).form(&[("data", data.as_str())]))
            .await?;
        check_status(response).await?;
        self.events().emit(AppEvent::Remote(RemoteEvent::BuildQueued {
            app_id: self.binding.app_id.clone(),
        }));
        Ok(())
    }

    /// Poll until no platform is pending, reporting every status change
    async fn wait_for_build(&self) -> Result<RemoteApp, Error> {
        let mut seen: BTreeMap<Platform, PlatformStatus> = BTreeMap::new();
        let mut attempt: u32 = 0;

        loop {
            let app = fetch_app(
                &self.client,
                &self.api,
                &self.binding.api_token,
                &self.binding.app_id,
            )
            .await?;

            for platform in Platform::ALL {
                let status = app.platform_status(platform);
                if status == PlatformStatus::Unrequested {
                    continue;
                }
                if seen.insert(platform, status) != Some(status) {
                    self.events().emit_platform_status(platform, status);
                }
            }

            if app.is_settled() {
                return Ok(app);
            }

            attempt += 1;
            let pending: Vec<Platform> = Platform::ALL
                .into_iter()
                .filter(|p| app.platform_status(*p) == PlatformStatus::Pending)
                .collect();
            self.events()
                .emit(AppEvent::Remote(RemoteEvent::PollWaiting { attempt, pending }));
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    async fn download(&self, platform: Platform, workspace: &Path) -> Result<Artifact, Error> {
        let failed = |message: String| BuildError::ArtifactFailed {
            platform: platform.to_string(),
            message,
        };

        let dir = workspace.join(&self.options.output_dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| failed(format!("Failed to create {}: {e}", dir.display())))?;
        let path = dir.join(format!(
            "{}.{}",
            self.base_name(),
            platform.artifact_extension()
        ));

        let url = self.url(&format!("apps/{}/{}", self.binding.app_id, platform.as_str()))?;
        let response = check_status(self.client.get(url.as_str()).await?).await?;

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| failed(format!("Failed to create {}: {e}", path.display())))?;
        let mut stream = response.bytes_stream();
        let mut size = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| failed(e.without_url().to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| failed(e.to_string()))?;
            size += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| failed(e.to_string()))?;

        self.events()
            .emit_artifact_downloaded(platform, path.clone(), size);
        Ok(Artifact {
            platform,
            path,
            size,
        })
    }
}

#[async_trait]
impl BuildSession for PgbSession {
    fn set_file_base_name(&mut self, name: String) {
        self.file_base_name = Some(name);
    }

    fn set_version(&mut self, version: String) {
        self.version = Some(version);
    }

    fn set_app_name(&mut self, name: String) {
        self.app_name = Some(name);
    }

    async fn unlock_keys(&mut self, keys: &[KeyUnlock]) -> Result<(), Error> {
        for key in keys {
            let platform = key.platform();
            let data = match key {
                KeyUnlock::Android {
                    key_password,
                    keystore_password,
                    ..
                } => json!({
                    "key_pw": key_password.expose_secret(),
                    "keystore_pw": keystore_password.expose_secret(),
                }),
                KeyUnlock::Ios { password, .. } => json!({ "password": password.expose_secret() }),
            }
            .to_string();

            let url = self.url(&format!("keys/{}/{}", platform.as_str(), key.key_id()))?;
            let result = match self
                .client
                .execute(|c| c.put(url.clone()).form(&[("data", data.as_str())]))
                .await
            {
                Ok(response) => check_status(response).await.map(|_| ()),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    self.events().emit(AppEvent::Remote(RemoteEvent::KeyUnlocked {
                        platform,
                        key_id: key.key_id().to_string(),
                    }));
                }
                Err(Error::Network(NetworkError::Unauthorized)) => {
                    return Err(NetworkError::Unauthorized.into());
                }
                Err(e) => {
                    return Err(BuildError::KeyUnlockFailed {
                        platform: platform.to_string(),
                        message: e.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    async fn build_app(&mut self, workspace: &Path) -> Result<BuildReport, Error> {
        let started = Instant::now();

        self.upload(workspace).await?;
        self.trigger_build().await?;
        let app = self.wait_for_build().await?;

        let platforms: Vec<PlatformResult> = Platform::ALL
            .into_iter()
            .filter_map(|platform| {
                let status = app.platform_status(platform);
                (status != PlatformStatus::Unrequested).then(|| PlatformResult {
                    platform,
                    status,
                    message: app.platform_error(platform).map(str::to_string),
                })
            })
            .collect();

        let mut artifacts = Vec::new();
        for platform in &self.options.platforms {
            if app.platform_status(*platform) == PlatformStatus::Complete {
                artifacts.push(self.download(*platform, workspace).await?);
            }
        }

        Ok(BuildReport {
            app_id: self.binding.app_id.clone(),
            platforms,
            artifacts,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

/// Key ids are numeric on the service; anything else is passed through
fn key_id_value(id: &str) -> serde_json::Value {
    id.parse::<u64>().map_or_else(|_| json!(id), |n| json!(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_carries_token() {
        let api = Api::new("https://build.phonegap.com/").unwrap();
        let url = api
            .url("apps/42/build", &SecretString::from("T"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://build.phonegap.com/api/v1/apps/42/build?auth_token=T"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            Api::new("not a url"),
            Err(Error::Network(NetworkError::InvalidUrl(_)))
        ));
    }

    #[test]
    fn test_key_id_value() {
        assert_eq!(key_id_value("77"), json!(77));
        assert_eq!(key_id_value("abc"), json!("abc"));
    }
}
