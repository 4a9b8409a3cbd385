use super::build::Build;

/// The console text of one build, held whole in memory until uploaded.
///
/// Only constructed from a successful, non-empty fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub job_name: String,
    pub build_number: u64,
    pub content: String,
}

impl LogRecord {
    pub fn new(build: &Build, content: String) -> Self {
        Self {
            job_name: build.job_name.clone(),
            build_number: build.number,
            content,
        }
    }

    pub fn id(&self) -> String {
        format!("{}_{}", self.job_name, self.build_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_matches_build_log_id() {
        let build = Build {
            job_name: "A".to_string(),
            number: 7,
            url: "http://ci.local/job/A/7/".to_string(),
        };
        let record = LogRecord::new(&build, "ok".to_string());
        assert_eq!(record.id(), "A_7");
        assert_eq!(record.id(), build.log_id());
        assert_eq!(build.console_url(), "http://ci.local/job/A/7/consoleText");
    }
}
