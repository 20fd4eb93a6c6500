//! Blocking HTTP transport for the public flight-number search.
//!
//! The site needs two form posts: the flight number lands on a per-flight
//! page, then the date is posted to that page to get the day's listings.
//! No authentication. Every request is bounded by a global timeout; nothing
//! is retried within a run.

use chrono::NaiveDate;
use http::StatusCode;
use log::debug;
use std::time::Duration;
use ureq::{Agent, ResponseExt};

use crate::error::ScrapeFailure;
use crate::models::flight::FlightNumber;
use crate::stores::FlightPageSource;

pub const DEFAULT_SEARCH_URL: &str = "https://aviability.com/flight-number/index.php";
const USER_AGENT: &str = concat!("flight-sheet-sync/", env!("CARGO_PKG_VERSION"));

pub struct AviabilityClient {
    agent: Agent,
    search_url: String,
}

impl AviabilityClient {
    pub fn new(timeout: Duration) -> Self {
        Self::with_search_url(DEFAULT_SEARCH_URL, timeout)
    }

    pub fn with_search_url(search_url: impl Into<String>, timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        AviabilityClient {
            agent: Agent::new_with_config(config),
            search_url: search_url.into(),
        }
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<(String, String), ScrapeFailure> {
        let mut resp = self
            .agent
            .post(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "text/html")
            .send_form(form.iter().copied())
            .map_err(transport_error)?;

        let final_url = resp.get_uri().to_string();
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ScrapeFailure::NotFound(format!("{url} returned 404")));
        }
        if !status.is_success() {
            return Err(ScrapeFailure::TransportError(format!("{url} returned http {}", status.as_u16())));
        }
        let body = resp.body_mut().read_to_string().map_err(transport_error)?;
        Ok((final_url, body))
    }
}

impl FlightPageSource for AviabilityClient {
    fn fetch(&self, flight: &FlightNumber, date: NaiveDate) -> Result<String, ScrapeFailure> {
        let (flight_url, _) = self.post_form(&self.search_url, &[("FlightNumber", flight.as_str())])?;
        debug!("{flight}: flight page at {flight_url}");

        let day = date.format("%Y-%m-%d").to_string();
        let (_, body) = self.post_form(&flight_url, &[("_date", day.as_str())])?;
        Ok(body)
    }
}

fn transport_error(err: ureq::Error) -> ScrapeFailure {
    match err {
        ureq::Error::Timeout(t) => ScrapeFailure::TransportError(format!("timed out ({t})")),
        other => ScrapeFailure::TransportError(other.to_string()),
    }
}
