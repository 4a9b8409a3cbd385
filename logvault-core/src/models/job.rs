use serde::{Deserialize, Serialize};

/// A named build configuration as listed by `GET {server}/api/json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub url: String,
}

impl Job {
    /// URL of this job's build listing. Jenkins job URLs end with a slash,
    /// but one is added when a proxy strips it.
    pub fn api_url(&self) -> String {
        format!("{}api/json", with_trailing_slash(&self.url))
    }
}

pub(crate) fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}
