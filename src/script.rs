//! Validated script and article inputs.
//!
//! Scripts arrive from the script-generation collaborator as loosely shaped JSON. They are
//! normalized exactly once here: blank and whitespace-only entries are discarded, and a script
//! with nothing left to show is rejected with [`ReelError::EmptyScript`].

use crate::error::{ReelError, ReelResult};

/// The narrated text of one video, in display order, with blank entries already removed.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "ScriptDoc", into = "ScriptDoc")]
pub struct Script {
    hook: Option<String>,
    segments: Vec<String>,
    conclusion: Option<String>,
}

impl Script {
    pub fn new(
        hook: impl Into<String>,
        segments: impl IntoIterator<Item = impl Into<String>>,
        conclusion: impl Into<String>,
    ) -> ReelResult<Self> {
        let script = Self {
            hook: non_blank(hook.into()),
            segments: segments
                .into_iter()
                .filter_map(|s| non_blank(s.into()))
                .collect(),
            conclusion: non_blank(conclusion.into()),
        };
        if script.body_len() == 0 {
            return Err(ReelError::EmptyScript);
        }
        Ok(script)
    }

    pub fn hook(&self) -> Option<&str> {
        self.hook.as_deref()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn conclusion(&self) -> Option<&str> {
        self.conclusion.as_deref()
    }

    /// Hook, segments and conclusion in display order.
    pub fn body_entries(&self) -> impl Iterator<Item = &str> {
        self.hook
            .as_deref()
            .into_iter()
            .chain(self.segments.iter().map(String::as_str))
            .chain(self.conclusion.as_deref())
    }

    /// Number of non-blank body entries. Always at least one.
    pub fn body_len(&self) -> usize {
        usize::from(self.hook.is_some())
            + self.segments.len()
            + usize::from(self.conclusion.is_some())
    }
}

fn non_blank(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

/// Wire shape of a script document. Every key is optional.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScriptDoc {
    pub hook: String,
    pub segments: Vec<String>,
    pub conclusion: String,
}

impl TryFrom<ScriptDoc> for Script {
    type Error = ReelError;

    fn try_from(doc: ScriptDoc) -> ReelResult<Self> {
        Script::new(doc.hook, doc.segments, doc.conclusion)
    }
}

impl From<Script> for ScriptDoc {
    fn from(script: Script) -> Self {
        Self {
            hook: script.hook.unwrap_or_default(),
            segments: script.segments,
            conclusion: script.conclusion.unwrap_or_default(),
        }
    }
}

/// The news item a video is made from.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Article {
    pub title: String,
    /// Local path or URL of a lead image, if the article has one.
    #[serde(default, alias = "image_url")]
    pub image: Option<String>,
}

impl Article {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// File name used when the caller does not choose one: the first 30 characters of the
    /// title restricted to alphanumerics, space, `-` and `_`, with spaces turned into `_`.
    pub fn default_video_file_name(&self) -> String {
        let safe: String = self
            .title
            .chars()
            .take(30)
            .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
            .collect();
        let stem = safe.replace(' ', "_");
        if stem.is_empty() {
            "video.mp4".to_string()
        } else {
            format!("{stem}.mp4")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_entries_are_dropped_in_order() {
        let s = Script::new("  hook ", ["a", "   ", "", "b"], "\t").unwrap();
        assert_eq!(s.body_entries().collect::<Vec<_>>(), vec!["  hook ", "a", "b"]);
        assert_eq!(s.body_len(), 3);
        assert_eq!(s.conclusion(), None);
    }

    #[test]
    fn all_blank_script_is_rejected() {
        let err = Script::new(" ", [" ", "\n"], "").unwrap_err();
        assert!(matches!(err, ReelError::EmptyScript));

        let err = Script::new("", Vec::<String>::new(), "").unwrap_err();
        assert!(matches!(err, ReelError::EmptyScript));
    }

    #[test]
    fn json_with_missing_keys_goes_through_validation() {
        let s: Script = serde_json::from_str(r#"{"segments": ["only one"]}"#).unwrap();
        assert_eq!(s.body_len(), 1);
        assert_eq!(s.hook(), None);

        let err = serde_json::from_str::<Script>(r#"{"hook": "  "}"#).unwrap_err();
        assert!(err.to_string().contains("empty script"));
    }

    #[test]
    fn article_accepts_image_url_alias() {
        let a: Article =
            serde_json::from_str(r#"{"title": "T", "image_url": "https://x/y.jpg"}"#).unwrap();
        assert_eq!(a.image.as_deref(), Some("https://x/y.jpg"));
    }

    #[test]
    fn default_file_name_is_sanitized() {
        let a = Article::new("AI chips: what's next? (2025 edition, part two)");
        assert_eq!(a.default_video_file_name(), "AI_chips_whats_next_2025_e.mp4");
        assert_eq!(Article::new("???").default_video_file_name(), "video.mp4");
    }
}
