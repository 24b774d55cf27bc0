//! ---
//! metron_section: "03-export"
//! metron_subsection: "module"
//! metron_type: "source"
//! metron_scope: "code"
//! metron_description: "Blocking Pushgateway client."
//! metron_version: "v0.0.0-prealpha"
//! metron_owner: "tbd"
//! ---
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use prometheus::{Registry, TextEncoder};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

use crate::{MetricsError, Result};

/// How a push treats metrics already stored under the same grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushMethod {
    /// `PUT`: replace every metric in the group.
    #[default]
    Replace,
    /// `POST`: replace only metrics with the same name.
    Add,
}

/// Pushes a registry to a Prometheus Pushgateway under a job grouping key.
///
/// Uses a blocking HTTP client; call from a plain thread or
/// `tokio::task::spawn_blocking`, never from inside an async task.
#[derive(Debug, Clone)]
pub struct PushGateway {
    client: Client,
    endpoint: Url,
    job: String,
    method: PushMethod,
}

impl PushGateway {
    /// Client pushing to `base` as `job`, with optional extra grouping labels.
    pub fn new<'g>(
        base: &Url,
        job: &str,
        grouping: impl IntoIterator<Item = (&'g str, &'g str)>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = grouping_url(base, job, grouping)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            job: job.to_owned(),
            method: PushMethod::default(),
        })
    }

    /// Use `method` instead of [`PushMethod::Replace`].
    pub fn with_method(mut self, method: PushMethod) -> Self {
        self.method = method;
        self
    }

    /// Fully qualified grouping URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Job name in the grouping key.
    pub fn job(&self) -> &str {
        &self.job
    }

    /// Encode and push everything currently in `registry`.
    pub fn push(&self, registry: &Registry) -> Result<()> {
        let body = TextEncoder::new().encode_to_string(&registry.gather())?;
        let request = match self.method {
            PushMethod::Replace => self.client.put(self.endpoint.clone()),
            PushMethod::Add => self.client.post(self.endpoint.clone()),
        };
        let response = request
            .header(CONTENT_TYPE, prometheus::TEXT_FORMAT)
            .body(body)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(MetricsError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(endpoint = %self.endpoint, job = %self.job, status = status.as_u16(), "pushed registry");
        Ok(())
    }
}

/// Build `<base>/metrics/job/<job>{/<label>/<value>}`.
///
/// Values containing `/` and empty values use the Pushgateway base64 form.
pub fn grouping_url<'g>(
    base: &Url,
    job: &str,
    grouping: impl IntoIterator<Item = (&'g str, &'g str)>,
) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| MetricsError::InvalidUrl(base.to_string()))?;
        segments.pop_if_empty().push("metrics");
        push_label(&mut segments, "job", job);
        for (label, value) in grouping {
            push_label(&mut segments, label, value);
        }
    }
    Ok(url)
}

fn push_label(segments: &mut url::PathSegmentsMut<'_>, label: &str, value: &str) {
    if value.is_empty() {
        segments.push(&format!("{label}@base64")).push("=");
    } else if value.contains('/') {
        segments
            .push(&format!("{label}@base64"))
            .push(&URL_SAFE.encode(value));
    } else {
        segments.push(label).push(value);
    }
}
