use serde::{Deserialize, Serialize};

use super::job::with_trailing_slash;

/// One execution of a job. Identity is `(job_name, number)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub job_name: String,
    pub number: u64,
    pub url: String,
}

impl Build {
    /// Key used for the fetched log and as the archive blob prefix.
    pub fn log_id(&self) -> String {
        format!("{}_{}", self.job_name, self.number)
    }

    pub fn console_url(&self) -> String {
        format!("{}consoleText", with_trailing_slash(&self.url))
    }
}
