use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Known drive host that requires the confirm-token handshake (§4.B, resolved
/// against `original_source/app/services/s3_uploader.py`).
const DRIVE_HOST: &str = "drive.google.com";

static DRIVE_FILE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"file/d/([a-zA-Z0-9_-]+)/").unwrap());
static CONFIRM_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"confirm=([0-9A-Za-z]+)").unwrap());

/// Thin wrapper over a shared `reqwest::Client`, matching the teacher's
/// pattern of a single client reused across calls (see
/// `pdf_processing::HTTP_CLIENT`).
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// HEAD probe with a bounded total timeout. Returns the status code;
    /// non-2xx is a failure, not an exception (§4.B).
    pub async fn head(&self, url: &str, timeout: Duration) -> anyhow::Result<u16> {
        debug!("HEAD {}", url);
        let resp = self.client.head(url).timeout(timeout).send().await?;
        Ok(resp.status().as_u16())
    }

    /// GET download of an arbitrary URL, applying the drive-host handshake
    /// when the URL matches `DRIVE_HOST`. Binary responses short-circuit.
    pub async fn get(&self, url: &str, timeout: Duration) -> anyhow::Result<Vec<u8>> {
        if url.contains(DRIVE_HOST) {
            return self.get_via_drive_handshake(url, timeout).await;
        }

        let resp = self.client.get(url).timeout(timeout).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("GET {} returned HTTP {}", url, resp.status());
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn get_via_drive_handshake(&self, url: &str, timeout: Duration) -> anyhow::Result<Vec<u8>> {
        let file_id = DRIVE_FILE_ID_RE
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| anyhow::anyhow!("could not extract drive file id from {url}"))?;

        let download_url = format!("https://drive.google.com/uc?export=download&id={file_id}");
        let resp = self.client.get(&download_url).timeout(timeout).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("drive download returned HTTP {}", resp.status());
        }

        let is_html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);

        if !is_html {
            return Ok(resp.bytes().await?.to_vec());
        }

        let html = resp.text().await?;
        let token = CONFIRM_TOKEN_RE
            .captures(&html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| anyhow::anyhow!("no confirm token found for drive url {url}"))?;

        let confirmed_url = format!("{download_url}&confirm={token}");
        info!("Retrying drive download with confirm token for {}", url);
        let resp = self.client.get(&confirmed_url).timeout(timeout).send().await?;
        if !resp.status().is_success() {
            warn!("drive confirm retry returned HTTP {}", resp.status());
            anyhow::bail!("drive confirm retry returned HTTP {}", resp.status());
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_file_id_extraction() {
        let url = "https://drive.google.com/file/d/1AbCdEfGhIjK/view?usp=sharing";
        let caps = DRIVE_FILE_ID_RE.captures(url).unwrap();
        assert_eq!(&caps[1], "1AbCdEfGhIjK");
    }

    #[test]
    fn confirm_token_extraction() {
        let html = r#"<a href="/uc?export=download&confirm=T0aB&id=xyz">Download</a>"#;
        let caps = CONFIRM_TOKEN_RE.captures(html).unwrap();
        assert_eq!(&caps[1], "T0aB");
    }
}
