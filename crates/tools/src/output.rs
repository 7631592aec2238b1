//! Where generated files land, and the URLs clients fetch them from.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use studiobot_config::OutputConfig;
use studiobot_memory::{ProjectPathError, ProjectPaths};

/// Resolves output directories, optionally inside a configured project folder.
pub struct OutputLayout {
    config: OutputConfig,
    projects: Arc<ProjectPaths>,
}

/// Directories a project key resolves to.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPaths {
    pub project_key: Option<String>,
    pub documents_dir: PathBuf,
    pub images_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(config: OutputConfig, projects: Arc<ProjectPaths>) -> Self {
        Self { config, projects }
    }

    pub fn projects(&self) -> &Arc<ProjectPaths> {
        &self.projects
    }

    /// Blank keys count as no key.
    pub fn normalize_key(project_key: Option<&str>) -> Option<&str> {
        project_key.map(str::trim).filter(|k| !k.is_empty())
    }

    async fn project_root(&self, project_key: Option<&str>) -> Result<Option<PathBuf>, ProjectPathError> {
        match Self::normalize_key(project_key) {
            Some(key) => self.projects.require(key).await.map(Some),
            None => Ok(None),
        }
    }

    /// Documents directory. Does not create it.
    pub async fn documents_dir(&self, project_key: Option<&str>) -> Result<PathBuf, ProjectPathError> {
        Ok(match self.project_root(project_key).await? {
            Some(root) => root.join(&self.config.documents_dir),
            None => self.config.root.join(&self.config.documents_dir),
        })
    }

    /// Images directory. An absolute `images_dir` is used as is inside a project.
    pub async fn images_dir(&self, project_key: Option<&str>) -> Result<PathBuf, ProjectPathError> {
        Ok(match self.project_root(project_key).await? {
            Some(root) => root.join(&self.config.images_dir),
            None => self.config.root.join("images"),
        })
    }

    pub async fn resolve(&self, project_key: Option<&str>) -> Result<ResolvedPaths, ProjectPathError> {
        Ok(ResolvedPaths {
            project_key: Self::normalize_key(project_key).map(String::from),
            documents_dir: self.documents_dir(project_key).await?,
            images_dir: self.images_dir(project_key).await?,
        })
    }
}

fn with_project_query(base: String, project_key: Option<&str>) -> String {
    match OutputLayout::normalize_key(project_key) {
        Some(key) => format!("{base}?project_key={key}"),
        None => base,
    }
}

pub fn download_url(filename: &str, project_key: Option<&str>) -> String {
    with_project_query(format!("/downloads/{filename}"), project_key)
}

pub fn image_url(filename: &str, project_key: Option<&str>) -> String {
    with_project_query(format!("/images/{filename}"), project_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(tmp: &TempDir) -> OutputLayout {
        let config = OutputConfig {
            root: tmp.path().join("output"),
            ..OutputConfig::default()
        };
        let projects = Arc::new(ProjectPaths::open(tmp.path().join("project_paths.json")));
        OutputLayout::new(config, projects)
    }

    #[tokio::test]
    async fn shared_dirs_without_project() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let paths = layout.resolve(None).await.unwrap();
        assert_eq!(paths.documents_dir, tmp.path().join("output").join("gen"));
        assert_eq!(paths.images_dir, tmp.path().join("output").join("images"));
        assert!(paths.project_key.is_none());

        let blank = layout.resolve(Some("  ")).await.unwrap();
        assert!(blank.project_key.is_none());
    }

    #[tokio::test]
    async fn project_dirs_live_under_project_root() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let game = tmp.path().join("game");
        layout
            .projects()
            .set("space-game", game.to_str().unwrap())
            .await
            .unwrap();

        let paths = layout.resolve(Some("space-game")).await.unwrap();
        assert_eq!(paths.documents_dir, game.join("gen"));
        assert_eq!(paths.images_dir, game.join("Images"));
    }

    #[tokio::test]
    async fn unknown_or_bad_project_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        assert!(matches!(
            layout.documents_dir(Some("missing")).await,
            Err(ProjectPathError::NotConfigured(_))
        ));
        assert!(matches!(
            layout.images_dir(Some("../etc")).await,
            Err(ProjectPathError::InvalidKey(_))
        ));
    }

    #[test]
    fn urls_carry_project_key() {
        assert_eq!(download_url("a.pdf", None), "/downloads/a.pdf");
        assert_eq!(
            image_url("b.png", Some("demo")),
            "/images/b.png?project_key=demo"
        );
    }
}
