//! Raw developer activity and the collaborator interfaces that supply it.
//!
//! The core never talks to a forge directly. It consumes an [`ActivitySource`]
//! returning commit records for one repository, plus an identity context that
//! says whether the subject may analyze that repository at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Errors raised while fetching activity.
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("Subject {subject} has no access to repository {repository}")]
    AccessDenied { subject: String, repository: String },

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Activity source failed: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse activity file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Address-like identity token of the developer a credential is about.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `0x` followed by exactly 40 hex characters.
    pub fn is_well_formed(&self) -> bool {
        match self.0.strip_prefix("0x") {
            Some(rest) => rest.len() == 40 && rest.chars().all(|c| c.is_ascii_hexdigit()),
            None => false,
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Permission a subject holds on a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

/// One commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub timestamp: DateTime<Utc>,
    pub lines_added: u64,
    pub lines_removed: u64,
    /// Opaque author identity token.
    pub author: String,
    pub repository: String,
    /// Paths touched, when the source knows them.
    #[serde(default)]
    pub paths: Vec<String>,
}

impl ActivityRecord {
    pub fn new(
        repository: impl Into<String>,
        author: impl Into<String>,
        timestamp: DateTime<Utc>,
        lines_added: u64,
        lines_removed: u64,
    ) -> Self {
        Self {
            timestamp,
            lines_added,
            lines_removed,
            author: author.into(),
            repository: repository.into(),
            paths: Vec::new(),
        }
    }

    /// Commit size in changed lines.
    pub fn size(&self) -> u64 {
        self.lines_added + self.lines_removed
    }
}

/// Lines of code attributed to one language in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageUsage {
    pub name: String,
    pub lines: u64,
}

/// Everything the analyzer needs about one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryActivity {
    pub repository: String,
    pub records: Vec<ActivityRecord>,
    #[serde(default)]
    pub languages: Vec<LanguageUsage>,
}

impl RepositoryActivity {
    pub fn commit_count(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn lines_of_code(&self) -> u64 {
        self.records.iter().map(|r| r.lines_added).sum()
    }

    /// Distinct author tokens.
    pub fn collaborators(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.author.as_str()).collect()
    }

    /// Records sorted oldest first.
    pub fn chronological(&self) -> Vec<ActivityRecord> {
        let mut records = self.records.clone();
        records.sort_by_key(|r| r.timestamp);
        records
    }
}

/// Filters passed through to the activity source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityQuery {
    pub author: Option<String>,
    pub path_prefix: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Zero-based page index; `None` returns everything.
    pub page: Option<usize>,
    pub per_page: usize,
}

impl ActivityQuery {
    pub fn matches(&self, record: &ActivityRecord) -> bool {
        if let Some(author) = &self.author {
            if &record.author != author {
                return false;
            }
        }
        if let Some(prefix) = &self.path_prefix {
            if !record.paths.iter().any(|p| p.starts_with(prefix.as_str())) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Supplier of commit history.
///
/// Implementations return records ordered most recent first.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn commits(
        &self,
        repository: &str,
        query: &ActivityQuery,
    ) -> Result<Vec<ActivityRecord>, ActivityError>;

    async fn languages(&self, repository: &str) -> Result<Vec<LanguageUsage>, ActivityError>;

    /// Permission `subject` holds on `repository`, `None` meaning no access.
    async fn permission(
        &self,
        repository: &str,
        subject: &SubjectId,
    ) -> Result<Option<AccessLevel>, ActivityError>;
}

/// Fetch a repository after checking the subject may see it.
///
/// Missing access is a hard precondition failure.
pub async fn collect_repository(
    source: &dyn ActivitySource,
    subject: &SubjectId,
    repository: &str,
    query: &ActivityQuery,
) -> Result<RepositoryActivity, ActivityError> {
    if source.permission(repository, subject).await?.is_none() {
        return Err(ActivityError::AccessDenied {
            subject: subject.to_string(),
            repository: repository.to_string(),
        });
    }

    let records = source.commits(repository, query).await?;
    let languages = source.languages(repository).await?;

    Ok(RepositoryActivity {
        repository: repository.to_string(),
        records,
        languages,
    })
}

/// On-disk layout read by [`JsonActivitySource`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityFile {
    pub repositories: Vec<RepositoryEntry>,
}

/// One repository in an activity file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryEntry {
    pub repository: String,
    #[serde(default)]
    pub languages: Vec<LanguageUsage>,
    /// Subject token to permission.
    #[serde(default)]
    pub permissions: HashMap<String, AccessLevel>,
    pub commits: Vec<ActivityRecord>,
}

/// Activity source over an exported JSON file or an in-memory fixture.
#[derive(Debug, Clone, Default)]
pub struct JsonActivitySource {
    repositories: HashMap<String, RepositoryEntry>,
}

impl JsonActivitySource {
    pub fn from_file(path: &Path) -> Result<Self, ActivityError> {
        let contents = std::fs::read_to_string(path)?;
        let file: ActivityFile = serde_json::from_str(&contents)?;
        Ok(Self::from_entries(file.repositories))
    }

    pub fn from_entries(entries: Vec<RepositoryEntry>) -> Self {
        Self {
            repositories: entries
                .into_iter()
                .map(|e| (e.repository.clone(), e))
                .collect(),
        }
    }

    pub fn repository_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.repositories.keys().cloned().collect();
        names.sort();
        names
    }

    fn entry(&self, repository: &str) -> Result<&RepositoryEntry, ActivityError> {
        self.repositories
            .get(repository)
            .ok_or_else(|| ActivityError::RepositoryNotFound(repository.to_string()))
    }
}

#[async_trait]
impl ActivitySource for JsonActivitySource {
    async fn commits(
        &self,
        repository: &str,
        query: &ActivityQuery,
    ) -> Result<Vec<ActivityRecord>, ActivityError> {
        let mut records: Vec<ActivityRecord> = self
            .entry(repository)?
            .commits
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        if let Some(page) = query.page {
            let per_page = query.per_page.max(1);
            records = records
                .into_iter()
                .skip(page * per_page)
                .take(per_page)
                .collect();
        }

        Ok(records)
    }

    async fn languages(&self, repository: &str) -> Result<Vec<LanguageUsage>, ActivityError> {
        Ok(self.entry(repository)?.languages.clone())
    }

    async fn permission(
        &self,
        repository: &str,
        subject: &SubjectId,
    ) -> Result<Option<AccessLevel>, ActivityError> {
        Ok(self
            .entry(repository)?
            .permissions
            .get(subject.as_str())
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const SUBJECT: &str = "0x1111111111111111111111111111111111111111";

    fn fixture() -> JsonActivitySource {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let commits = (0..5)
            .map(|i| {
                let mut r = ActivityRecord::new(
                    "org/app",
                    if i % 2 == 0 { "alice" } else { "bob" },
                    start + Duration::days(i),
                    10,
                    2,
                );
                r.paths = vec![format!("src/module{}.rs", i)];
                r
            })
            .collect();
        let mut permissions = HashMap::new();
        permissions.insert(SUBJECT.to_string(), AccessLevel::Write);
        JsonActivitySource::from_entries(vec![RepositoryEntry {
            repository: "org/app".to_string(),
            languages: vec![LanguageUsage {
                name: "Rust".to_string(),
                lines: 1200,
            }],
            permissions,
            commits,
        }])
    }

    #[test]
    fn test_subject_format() {
        assert!(SubjectId::from(SUBJECT).is_well_formed());
        assert!(!SubjectId::from("0x1234").is_well_formed());
        assert!(!SubjectId::from("1111111111111111111111111111111111111111").is_well_formed());
        assert!(!SubjectId::from("0xZZ11111111111111111111111111111111111111").is_well_formed());
    }

    #[tokio::test]
    async fn test_collect_requires_access() {
        let source = fixture();
        let stranger = SubjectId::from("0x2222222222222222222222222222222222222222");
        let result =
            collect_repository(&source, &stranger, "org/app", &ActivityQuery::default()).await;
        assert!(matches!(result, Err(ActivityError::AccessDenied { .. })));
    }

    #[tokio::test]
    async fn test_commits_are_most_recent_first_and_filtered() {
        let source = fixture();
        let all = source
            .commits("org/app", &ActivityQuery::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
        assert!(all[0].timestamp > all[4].timestamp);

        let alice = ActivityQuery {
            author: Some("alice".to_string()),
            ..Default::default()
        };
        assert_eq!(source.commits("org/app", &alice).await.unwrap().len(), 3);

        let paged = ActivityQuery {
            page: Some(1),
            per_page: 2,
            ..Default::default()
        };
        assert_eq!(source.commits("org/app", &paged).await.unwrap().len(), 2);

        let by_path = ActivityQuery {
            path_prefix: Some("src/module4".to_string()),
            ..Default::default()
        };
        assert_eq!(source.commits("org/app", &by_path).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repository_aggregates() {
        let source = fixture();
        let subject = SubjectId::from(SUBJECT);
        let repo = collect_repository(&source, &subject, "org/app", &ActivityQuery::default())
            .await
            .unwrap();
        assert_eq!(repo.commit_count(), 5);
        assert_eq!(repo.lines_of_code(), 50);
        assert_eq!(repo.collaborators().len(), 2);
        assert_eq!(repo.languages.len(), 1);
        let sorted = repo.chronological();
        assert!(sorted[0].timestamp < sorted[4].timestamp);
    }

    #[tokio::test]
    async fn test_unknown_repository() {
        let source = fixture();
        let result = source.languages("org/missing").await;
        assert!(matches!(result, Err(ActivityError::RepositoryNotFound(_))));
    }
}
