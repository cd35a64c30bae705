// Problem definitions stored as JSON files in a directory
use crate::types::{Problem, ProblemSummary};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ProblemError {
    #[error("Problem not found: {0}")]
    NotFound(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read-only view over a directory of `<id>.json` problem files.
///
/// Files are read on every call so problems can be added without a restart.
#[derive(Debug, Clone)]
pub struct ProblemStore {
    dir: PathBuf,
}

impl ProblemStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load a problem by id: `<id>.json` first, then any file whose `id` matches
    pub fn load_problem(&self, id: &str) -> Result<Problem, ProblemError> {
        if is_plain_id(id) {
            let direct = self.dir.join(format!("{}.json", id));
            if direct.is_file() {
                return read_problem(&direct);
            }
        }

        for path in self.problem_files()? {
            let problem = read_problem(&path)?;
            if problem.id == id {
                return Ok(problem);
            }
        }

        Err(ProblemError::NotFound(id.to_string()))
    }

    /// `{id, title}` of every problem, ordered by file name
    pub fn list_problems(&self) -> Result<Vec<ProblemSummary>, ProblemError> {
        self.problem_files()?
            .iter()
            .map(|path| read_problem(path).map(|p| p.summary()))
            .collect()
    }

    /// Every problem file with its own parse outcome, ordered by file name.
    /// One broken file does not hide the others.
    pub fn scan(&self) -> Result<Vec<(PathBuf, Result<Problem, ProblemError>)>, ProblemError> {
        Ok(self
            .problem_files()?
            .into_iter()
            .map(|path| {
                let problem = read_problem(&path);
                (path, problem)
            })
            .collect())
    }

    fn problem_files(&self) -> Result<Vec<PathBuf>, ProblemError> {
        let io_err = |source| ProblemError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Ids are only used as file names when they cannot escape the directory
fn is_plain_id(id: &str) -> bool {
    !id.is_empty()
        && !id.contains(['/', '\\'])
        && id != "."
        && id != ".."
}

fn read_problem(path: &Path) -> Result<Problem, ProblemError> {
    let content = fs::read_to_string(path).map_err(|source| ProblemError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ProblemError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
