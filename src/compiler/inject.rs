//! Structural injection around `<head>` / `<body>` tags.
//!
//! Only the first matching tag is touched. Injection is not idempotent:
//! running it twice inserts the fragment twice.

use super::error::BuildError;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static RE_BODY_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</body\s*>").unwrap());
static RE_HEAD_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</head\s*>").unwrap());
static RE_BODY_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<body(\s[^>]*)?>").unwrap());
static RE_HEAD_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<head(\s[^>]*)?>").unwrap());

/// Named structural location inside a page.
///
/// Declaration order is the order a rule applies its injections in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionPoint {
    PreBodyClose,
    PreHeadClose,
    PostBodyOpen,
    PostHeadOpen,
}

impl InjectionPoint {
    /// Tag named in [`BuildError::MissingTag`].
    pub const fn tag(self) -> &'static str {
        match self {
            Self::PreBodyClose => "</body>",
            Self::PreHeadClose => "</head>",
            Self::PostBodyOpen => "<body>",
            Self::PostHeadOpen => "<head>",
        }
    }

    fn regex(self) -> &'static Regex {
        match self {
            Self::PreBodyClose => &RE_BODY_CLOSE,
            Self::PreHeadClose => &RE_HEAD_CLOSE,
            Self::PostBodyOpen => &RE_BODY_OPEN,
            Self::PostHeadOpen => &RE_HEAD_OPEN,
        }
    }

    /// Insert `part` at this point of `html`.
    ///
    /// Closing tags are normalized to their plain form (`</body >` becomes
    /// `</body>`); opening tags keep their attributes.
    pub fn inject(self, html: &str, part: &str, file: &str) -> Result<String, BuildError> {
        let re = self.regex();
        if !re.is_match(html) {
            return Err(BuildError::MissingTag {
                tag: self.tag(),
                file: file.to_string(),
            });
        }

        let out = match self {
            Self::PreBodyClose | Self::PreHeadClose => {
                let tag = self.tag();
                re.replacen(html, 1, |_: &Captures| format!("{part}\n{tag}"))
            }
            Self::PostBodyOpen | Self::PostHeadOpen => {
                re.replacen(html, 1, |caps: &Captures| format!("{}\n{part}", &caps[0]))
            }
        };
        Ok(out.into_owned())
    }
}
