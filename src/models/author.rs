use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Author {
    pub author_id: i64,
    pub author_name: String,
    pub author_email: Option<String>,
    pub author_affiliation: Option<String>,
    pub user_id: Option<i64>,
}

/// One entry of the `authors` array on a paper submission.
///
/// Field aliases accept the PascalCase keys sent by the upload form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCandidate {
    #[serde(alias = "AuthorName", default)]
    pub name: String,
    #[serde(alias = "AuthorEmail", default)]
    pub email: Option<String>,
    #[serde(alias = "AuthorAffiliation", default)]
    pub affiliation: Option<String>,
}

impl AuthorCandidate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = Some(affiliation.into());
        self
    }

    /// Email with blank values treated as absent.
    pub fn email(&self) -> Option<&str> {
        non_blank(self.email.as_deref())
    }

    pub fn affiliation(&self) -> Option<&str> {
        non_blank(self.affiliation.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
