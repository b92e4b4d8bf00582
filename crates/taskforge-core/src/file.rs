// Product files produced by tools during a request

use serde::{Deserialize, Serialize};

/// An artifact a tool uploaded while working on the request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    #[serde(default)]
    pub oss_url: String,
    #[serde(default)]
    pub domain_url: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub origin_file_name: String,
    #[serde(default)]
    pub origin_oss_url: String,
    #[serde(default)]
    pub origin_domain_url: String,
    /// Internal files are intermediate artifacts, never shown as deliverables
    #[serde(default)]
    pub is_internal_file: bool,
}

impl File {
    pub fn new(file_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, oss_url: impl Into<String>) -> Self {
        self.oss_url = oss_url.into();
        self
    }

    pub fn internal(mut self) -> Self {
        self.is_internal_file = true;
        self
    }

    /// URL shown to the model: the original upload location wins when present
    pub fn display_url(&self) -> &str {
        if self.origin_oss_url.trim().is_empty() {
            &self.oss_url
        } else {
            &self.origin_oss_url
        }
    }
}

/// Render files as `fileName:.. fileDesc:.. fileUrl:..` lines for prompt injection
pub fn format_file_info(files: &[File], filter_internal: bool) -> String {
    files
        .iter()
        .filter(|f| !(filter_internal && f.is_internal_file))
        .map(|f| {
            format!(
                "fileName:{} fileDesc:{} fileUrl:{}\n",
                f.file_name,
                f.description,
                f.display_url()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prefers_origin_url() {
        let mut file = File::new("report.md", "final report").with_url("oss://a");
        file.origin_oss_url = "https://origin/report.md".to_string();

        let text = format_file_info(&[file], false);
        assert_eq!(
            text,
            "fileName:report.md fileDesc:final report fileUrl:https://origin/report.md\n"
        );
    }

    #[test]
    fn test_format_filters_internal() {
        let files = vec![
            File::new("scratch.txt", "notes").internal(),
            File::new("out.html", "page"),
        ];
        let text = format_file_info(&files, true);
        assert!(!text.contains("scratch.txt"));
        assert!(text.contains("out.html"));
    }
}
