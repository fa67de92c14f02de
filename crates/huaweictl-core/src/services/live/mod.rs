//! Live (media live streaming) resources and data sources

mod channel;
mod data_sources;
mod domain;
mod ip_acl;
mod recording;
mod referer_validation;
mod snapshot;
mod transcoding;
mod url_authentication;

pub use channel::LiveChannel;
pub use data_sources::{LiveChannels, LiveDomains};
pub use domain::LiveDomain;
pub use ip_acl::LiveIpAcl;
pub use recording::LiveRecording;
pub use referer_validation::LiveRefererValidation;
pub use snapshot::LiveSnapshot;
pub use transcoding::LiveTranscoding;
pub use url_authentication::LiveUrlAuthentication;

use crate::schema::ResourceData;

pub(crate) const SERVICE: &str = "live";

/// `<domain_name>/<app_name>` ID of per-application settings
fn app_id(d: &ResourceData) -> String {
    format!("{}/{}", d.get_str("domain_name"), d.get_str("app_name"))
}
