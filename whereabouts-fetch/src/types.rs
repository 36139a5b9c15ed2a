//! Response shapes for the about-page GraphQL endpoint.

use serde::Deserialize;

/// Top-level response envelope for `AboutAccountQuery`.
///
/// Every level is optional: the service omits subtrees freely (suspended
/// accounts, missing about-profiles), and a missing field means "no
/// location", not a protocol error.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AboutResponse {
    #[serde(default)]
    pub data: Option<AboutData>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AboutData {
    #[serde(default)]
    pub user_result_by_screen_name: Option<UserResult>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UserResult {
    #[serde(default)]
    pub result: Option<UserAbout>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UserAbout {
    #[serde(default)]
    pub about_profile: Option<AboutProfile>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AboutProfile {
    #[serde(default)]
    pub account_based_in: Option<String>,
}

impl AboutResponse {
    /// Walk the envelope down to the raw `account_based_in` string.
    pub(crate) fn account_based_in(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .user_result_by_screen_name
            .as_ref()?
            .result
            .as_ref()?
            .about_profile
            .as_ref()?
            .account_based_in
            .as_deref()
    }
}
