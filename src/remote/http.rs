//! JSON-over-HTTP fetcher for the project-management API.
//!
//! Endpoints:
//! - `GET {base}/projects` lists containers (`[{"id": "...", "name": "..."}]`)
//! - `GET {base}/projects/{id}/dockets[?modified_since=<rfc3339>]` lists dockets
//!
//! Containers are queried one after another.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{FetchProgress, FetchRequest, FetchResult, RemoteFetcher};
use crate::{
   Result,
   config::Config,
   error::{ConfigError, RemoteError},
   model::Docket,
};

#[derive(Debug, Deserialize)]
struct RemoteProject {
   id: String,
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
   client:   Client,
   base_url: String,
   token:    Option<String>,
   timeout:  Duration,
}

impl HttpFetcher {
   pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
      let client = Client::builder()
         .timeout(timeout)
         .build()
         .map_err(RemoteError::from)?;
      let base_url = base_url.into().trim_end_matches('/').to_string();
      Ok(Self { client, base_url, token, timeout })
   }

   pub fn from_config(cfg: &Config) -> Result<Self> {
      let base_url = cfg
         .remote_base_url
         .clone()
         .filter(|u| !u.trim().is_empty())
         .ok_or(ConfigError::MissingRemote)?;
      Self::new(base_url, cfg.remote_token.clone(), cfg.remote_timeout())
   }

   async fn get_json<T: for<'de> Deserialize<'de>>(
      &self,
      url: &str,
      query: &[(&str, String)],
   ) -> Result<T, RemoteError> {
      let mut request = self.client.get(url).query(query);
      if let Some(token) = &self.token {
         request = request.bearer_auth(token);
      }
      let response = request.send().await.map_err(|e| self.classify(e))?;
      match response.status() {
         status if status.is_success() => {},
         StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(RemoteError::Unauthorized),
         status => {
            return Err(RemoteError::HttpStatus { status: status.as_u16(), url: url.to_string() });
         },
      }
      let body = response.bytes().await.map_err(|e| self.classify(e))?;
      serde_json::from_slice(&body).map_err(|e| RemoteError::Decode(format!("{url}: {e}")))
   }

   fn classify(&self, err: reqwest::Error) -> RemoteError {
      if err.is_timeout() {
         RemoteError::Timeout { ms: self.timeout.as_millis() as u64 }
      } else if err.is_connect() {
         RemoteError::Unavailable(err.to_string())
      } else {
         RemoteError::Request(err)
      }
   }

   async fn list_projects(&self) -> Result<Vec<RemoteProject>, RemoteError> {
      self
         .get_json(&format!("{}/projects", self.base_url), &[])
         .await
   }

   async fn project_dockets(
      &self,
      project_id: &str,
      request: &FetchRequest,
   ) -> Result<Vec<Docket>, RemoteError> {
      let mut query = Vec::new();
      if let Some(since) = request.modified_since {
         query.push(("modified_since", since.to_rfc3339()));
      }
      self
         .get_json(&format!("{}/projects/{project_id}/dockets", self.base_url), &query)
         .await
   }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
   async fn fetch(
      &self,
      request: &FetchRequest,
      on_progress: &mut FetchProgress<'_>,
   ) -> Result<FetchResult, RemoteError> {
      let was_discovery = request.discovers();
      let scope_ids: Vec<String> = if was_discovery {
         on_progress(0.0, "Discovering projects");
         let projects = self.list_projects().await?;
         tracing::debug!(projects = projects.len(), "discovered remote projects");
         projects.into_iter().map(|p| p.id).collect()
      } else {
         request.scope.clone().unwrap_or_default()
      };

      let total = scope_ids.len().max(1);
      let mut dockets = Vec::new();
      let mut bearing = Vec::new();
      for (i, project_id) in scope_ids.iter().enumerate() {
         on_progress(i as f64 / total as f64, "Fetching changes");
         let batch = self.project_dockets(project_id, request).await?;
         if !batch.is_empty() {
            bearing.push(project_id.clone());
         }
         dockets.extend(batch);
      }
      on_progress(1.0, "Fetched");

      // An incremental discovery only sees changed records, so empty projects
      // may still hold dockets; keep every listed project in the hint.
      let queried_scope_ids = if was_discovery && request.modified_since.is_none() {
         bearing
      } else {
         scope_ids.clone()
      };

      Ok(FetchResult {
         dockets,
         queried_scope_ids,
         scopes_queried: scope_ids.len(),
         was_discovery,
      })
   }
}
