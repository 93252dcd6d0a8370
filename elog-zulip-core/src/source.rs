//! Entry-source kinds.
//!
//! Logbooks differ in how an entry is announced in chat and in which entries are worth
//! publishing at all. [`SourceKind`] captures both per logbook.

use serde::Deserialize;

use crate::entry::{ATTR_AUTHOR, ATTR_SUBJECT, Attributes};

/// Topic used when the configured topic renders empty.
pub const FALLBACK_TOPIC: &str = "no topic";

/// How one entry is introduced in chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatting {
    pub subject: String,
    pub prefix: String,
    pub topic: String,
    pub quote: bool,
}

/// Which entries of a logbook are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Every unpublished entry, oldest first.
    AllNew,
    /// The newest entry, if it is not published yet.
    LatestOnly,
}

/// The kind of logbook an entry comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Generic,
    /// Operation logbook: author and group in the subject line.
    Operation,
    /// Shift-crew logbook: leader, deputy and DRC in the subject line.
    Doc,
    /// Experiment coordination logbook.
    Xo,
}

impl SourceKind {
    /// Formatting used when the logbook config does not override it.
    pub fn default_formatting(&self, attributes: &Attributes, entry_url: &str) -> Formatting {
        let subject = match self {
            SourceKind::Generic | SourceKind::Xo => {
                let subject = attributes.get(ATTR_SUBJECT).unwrap_or("no subject");
                format!("[{}]({}):", subject, entry_url)
            }
            SourceKind::Operation => {
                let group = match attributes.get("Group") {
                    Some(group) if !group.is_empty() => format!(" ({})", group),
                    _ => String::new(),
                };
                format!(
                    "[{}{}: {}]({}):",
                    attributes.get_or_empty(ATTR_AUTHOR),
                    group,
                    attributes.get_or_empty(ATTR_SUBJECT),
                    entry_url
                )
            }
            SourceKind::Doc => format!(
                "[{}, {} (DRC: {}): {}]({})",
                attributes.get_or_empty("DOC Shift Leader"),
                attributes.get_or_empty("DOC Shift Deputy"),
                attributes.get_or_empty("DRC"),
                attributes.get_or_empty(ATTR_SUBJECT),
                entry_url
            ),
        };

        Formatting {
            subject,
            prefix: String::new(),
            topic: String::new(),
            quote: true,
        }
    }

    pub fn selection(&self) -> Selection {
        match self {
            SourceKind::Generic | SourceKind::Operation => Selection::AllNew,
            SourceKind::Doc | SourceKind::Xo => Selection::LatestOnly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://elog.example.org/Ops/3";

    #[test]
    fn test_generic_subject() {
        let attributes: Attributes = [("Subject", "Beam dump")].into_iter().collect();
        let formatting = SourceKind::Generic.default_formatting(&attributes, URL);
        assert_eq!(formatting.subject, format!("[Beam dump]({URL}):"));
        assert!(formatting.quote);

        let formatting = SourceKind::Xo.default_formatting(&Attributes::new(), URL);
        assert_eq!(formatting.subject, format!("[no subject]({URL}):"));
    }

    #[test]
    fn test_operation_subject_with_and_without_group() {
        let mut attributes: Attributes =
            [("Author", "Ada"), ("Subject", "Tuning")].into_iter().collect();
        let formatting = SourceKind::Operation.default_formatting(&attributes, URL);
        assert_eq!(formatting.subject, format!("[Ada: Tuning]({URL}):"));

        attributes.insert("Group", "RF");
        let formatting = SourceKind::Operation.default_formatting(&attributes, URL);
        assert_eq!(formatting.subject, format!("[Ada (RF): Tuning]({URL}):"));
    }

    #[test]
    fn test_doc_subject() {
        let attributes: Attributes = [
            ("DOC Shift Leader", "Ada"),
            ("DOC Shift Deputy", "Grace"),
            ("DRC", "Linus"),
            ("Subject", "Night shift"),
        ]
        .into_iter()
        .collect();
        let formatting = SourceKind::Doc.default_formatting(&attributes, URL);
        assert_eq!(formatting.subject, format!("[Ada, Grace (DRC: Linus): Night shift]({URL})"));
    }

    #[test]
    fn test_selection_policy() {
        assert_eq!(SourceKind::Generic.selection(), Selection::AllNew);
        assert_eq!(SourceKind::Operation.selection(), Selection::AllNew);
        assert_eq!(SourceKind::Doc.selection(), Selection::LatestOnly);
        assert_eq!(SourceKind::Xo.selection(), Selection::LatestOnly);
    }
}
