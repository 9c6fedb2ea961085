use headless_chrome::{Browser, LaunchOptions, Tab};
use object_store_client::{ObjectStoreClient, UploadSource};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const LINK_WAIT: Duration = Duration::from_secs(15);
const DOWNLOAD_WAIT: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One discovered and stored attachment.
#[derive(Debug, Clone)]
pub struct ScrapedDocument {
    pub file_name: String,
    pub url: String,
}

/// §4.C driver. One browser instance per invocation, released on every exit
/// path (the `Browser` handle is dropped at the end of the blocking task,
/// which tears the Chrome process down).
pub struct DocumentScraper {
    download_dir: PathBuf,
}

impl DocumentScraper {
    pub fn new(download_dir: PathBuf) -> Self {
        Self { download_dir }
    }

    /// Drive a headless browser to `landing_url`, discover PDF links,
    /// download them, and hand each to the object store. Returns `None` if
    /// no PDF links were found (stateless between calls).
    ///
    /// The headless-browser driver is synchronous; the whole thing runs
    /// inside `spawn_blocking` so it never stalls the cooperative scheduler
    /// (§5).
    pub async fn scrape(
        &self,
        landing_url: &str,
        tender_id: &str,
        store: &ObjectStoreClient,
    ) -> Option<Vec<ScrapedDocument>> {
        if landing_url.is_empty() {
            return None;
        }

        let owned_url = landing_url.to_string();
        let links = tokio::task::spawn_blocking(move || discover_pdf_links(&owned_url))
            .await
            .ok()?;

        let (links, download_dir) = match links {
            Ok(links) => (links, self.download_dir.clone()),
            Err(e) => {
                warn!("Scrape failed for {}: {}", tender_id, e);
                return None;
            }
        };

        if links.is_empty() {
            warn!("No PDF links found on {}", landing_url);
            return None;
        }

        let mut docs = Vec::new();
        for (idx, (href, clicked_ok)) in links.into_iter().enumerate() {
            let file_name = derive_file_name(&href, idx);
            let local_path = download_dir.join(&file_name);

            let downloaded = if clicked_ok {
                wait_for_file(&local_path).await
            } else {
                false
            };

            let canonical = if downloaded {
                let bytes = match tokio::fs::read(&local_path).await {
                    Ok(b) => b,
                    Err(e) => {
                        warn!("Could not read downloaded file {:?}: {}", local_path, e);
                        continue;
                    }
                };
                let url = store
                    .upload(UploadSource::Bytes(bytes), &file_name, tender_id)
                    .await;
                let _ = tokio::fs::remove_file(&local_path).await;
                url
            } else {
                store
                    .upload(UploadSource::Url(&href), &file_name, tender_id)
                    .await
            };

            match canonical {
                Some(url) => docs.push(ScrapedDocument {
                    file_name,
                    url,
                }),
                None => warn!("Failed to store scraped document {}", href),
            }
        }

        if docs.is_empty() {
            None
        } else {
            info!("Scraped {} document(s) from {}", docs.len(), landing_url);
            Some(docs)
        }
    }
}

/// Runs entirely on a blocking thread: launches Chrome, waits up to 15s for
/// at least one `a[href$=.pdf]`, and attempts a click-driven download for
/// each. Returns `(href, click_succeeded)` pairs.
fn discover_pdf_links(landing_url: &str) -> anyhow::Result<Vec<(String, bool)>> {
    let options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .build()?;
    let browser = Browser::new(options)?;
    let tab = browser.new_tab()?;

    tab.navigate_to(landing_url)?;
    tab.wait_until_navigated()?;

    let links = wait_for_pdf_links(&tab)?;
    if links.is_empty() {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    for href in links {
        let clicked = click_download(&tab, &href).is_ok();
        results.push((href, clicked));
    }

    Ok(results)
}

fn wait_for_pdf_links(tab: &Arc<Tab>) -> anyhow::Result<Vec<String>> {
    let deadline = Instant::now() + LINK_WAIT;
    loop {
        let elements = tab.find_elements("a").unwrap_or_default();
        let mut hrefs = Vec::new();
        for el in &elements {
            if let Ok(Some(href)) = el.get_attribute_value("href") {
                if href.to_lowercase().ends_with(".pdf") {
                    hrefs.push(href);
                }
            }
        }
        if !hrefs.is_empty() {
            return Ok(hrefs);
        }
        if Instant::now() >= deadline {
            return Ok(Vec::new());
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn click_download(tab: &Arc<Tab>, href: &str) -> anyhow::Result<()> {
    let selector = format!("a[href=\"{href}\"]");
    let element = tab.find_element(&selector)?;
    element.click()?;
    Ok(())
}

async fn wait_for_file(path: &std::path::Path) -> bool {
    let deadline = Instant::now() + DOWNLOAD_WAIT;
    loop {
        if tokio::fs::metadata(path).await.is_ok() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// File name is the URL path's last segment, or a synthesized name.
fn derive_file_name(url: &str, index: usize) -> String {
    url.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("document_{}.pdf", index + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_from_url_path() {
        assert_eq!(
            derive_file_name("https://host/tender/docs/spec.pdf", 0),
            "spec.pdf"
        );
    }

    #[test]
    fn synthesized_file_name_when_path_empty() {
        assert_eq!(derive_file_name("https://host/", 2), "document_3.pdf");
    }
}
