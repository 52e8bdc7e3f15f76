//! Zone enumeration across paginated listing responses.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::api::types::{ResultInfo, Zone};
use crate::api::{ApiRequest, ApiTransport};
use crate::error::{ProvisionerError, Result};

/// One listing response: the zones it carried plus pagination metadata.
#[derive(Debug, Clone)]
struct ZonePage {
    zones: Vec<Zone>,
    info: ResultInfo,
}

/// Discovers every zone belonging to a named account.
pub struct ZoneEnumerator<T: ApiTransport> {
    transport: Arc<T>,
}

impl<T: ApiTransport> ZoneEnumerator<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Return the ids of all zones of the account, in page then listing order.
    pub async fn enumerate_zones(&self, account_name: &str) -> Result<Vec<String>> {
        let zones = self.enumerate_zone_records(account_name).await?;
        Ok(zones.into_iter().map(|zone| zone.id).collect())
    }

    /// Return all zone records of the account, in page then listing order.
    ///
    /// The first page is requested without a `page` parameter; pages
    /// `2..=total_pages` follow. Any failed page aborts the enumeration.
    #[instrument(skip(self))]
    pub async fn enumerate_zone_records(&self, account_name: &str) -> Result<Vec<Zone>> {
        let first = self.fetch_page(account_name, None).await?;
        let total_pages = first.info.total_pages;
        let mut zones = first.zones;

        for page in 2..=total_pages {
            let next = self.fetch_page(account_name, Some(page)).await?;
            zones.extend(next.zones);
        }

        info!(
            account = account_name,
            pages = total_pages.max(1),
            zones = zones.len(),
            "Zone enumeration complete"
        );

        Ok(zones)
    }

    async fn fetch_page(&self, account_name: &str, page: Option<u32>) -> Result<ZonePage> {
        let mut request = ApiRequest::get("/zones").with_query("account.name", account_name);
        if let Some(page) = page {
            request = request.with_query("page", page);
        }

        let response = self
            .transport
            .send(request)
            .await?
            .require_success("zone listing")?;

        let zones: Vec<Zone> = response.result("zone listing")?;
        let info = response
            .body
            .get("result_info")
            .cloned()
            .ok_or_else(|| {
                ProvisionerError::UnexpectedResponse("zone listing: missing `result_info`".into())
            })
            .and_then(|value| {
                serde_json::from_value::<ResultInfo>(value).map_err(|e| {
                    ProvisionerError::UnexpectedResponse(format!(
                        "zone listing: malformed `result_info`: {}",
                        e
                    ))
                })
            })?;

        debug!(
            page = page.unwrap_or(1),
            total_pages = info.total_pages,
            zones = zones.len(),
            "Fetched zone page"
        );

        Ok(ZonePage { zones, info })
    }
}
