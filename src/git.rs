//! Integração com Git via libgit2 para commits automáticos dos artefatos gerados.
//!
//! O [`GitManager`] faz stage apenas do arquivo gerado pela execução, nunca da
//! árvore inteira, e cria o commit sobre o HEAD atual.

use git2::{Repository, Signature};
use std::path::{Path, PathBuf};

use crate::error::ForgeError;

/// Gerenciador de operações Git usando a biblioteca libgit2.
pub struct GitManager {
    repo: Repository,
}

impl GitManager {
    /// Abre o repositório que contém `path` (procura nos diretórios pais).
    pub fn open(path: &Path) -> Result<Self, ForgeError> {
        let repo = Repository::discover(path)?;
        Ok(Self { repo })
    }

    /// Adiciona `paths` ao stage e cria um commit, retornando o hash curto.
    ///
    /// Os caminhos podem ser absolutos ou relativos ao diretório atual; precisam
    /// estar dentro da working tree do repositório.
    pub fn commit_paths(&self, paths: &[&Path], message: &str) -> Result<String, ForgeError> {
        let mut index = self.repo.index()?;
        for path in paths {
            index.add_path(&self.relative_to_workdir(path)?)?;
        }
        index.write()?;

        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        let sig = self
            .repo
            .signature()
            .or_else(|_| Signature::now("sprintforge", "sprintforge@localhost"))?;

        // Repositório recém-criado ainda não tem HEAD.
        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let commit_oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        let short = &commit_oid.to_string()[..7];
        Ok(short.to_string())
    }

    /// Commita somente o artefato gerado.
    ///
    /// Formato da mensagem de commit: `sprintforge: generated <arquivo>`
    pub fn commit_artifact(&self, artifact: &Path) -> Result<String, ForgeError> {
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| artifact.display().to_string());
        self.commit_paths(&[artifact], &format!("sprintforge: generated {name}"))
    }

    /// Retorna o nome da branch atual.
    pub fn current_branch(&self) -> Result<String, ForgeError> {
        let head = self.repo.head()?;
        let name = head
            .shorthand()
            .ok_or_else(|| ForgeError::Config("branch name is not valid UTF-8".into()))?
            .to_string();
        Ok(name)
    }

    fn relative_to_workdir(&self, path: &Path) -> Result<PathBuf, ForgeError> {
        let workdir = self
            .repo
            .workdir()
            .ok_or_else(|| ForgeError::Config("bare repositories are not supported".into()))?;
        let workdir = workdir.canonicalize()?;
        let absolute = path.canonicalize()?;
        absolute
            .strip_prefix(&workdir)
            .map(Path::to_path_buf)
            .map_err(|_| {
                ForgeError::Config(format!(
                    "{} is outside the repository at {}",
                    path.display(),
                    workdir.display()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn open_fails_on_non_repo_path() {
        let tmp = TempDir::new().unwrap();
        let result = GitManager::open(tmp.path());
        assert!(result.is_err());
    }

    /// Auxiliar: cria um repositório temporário com um commit inicial para que HEAD exista.
    fn setup_temp_repo() -> (TempDir, GitManager) {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::init(tmp.path()).unwrap();

        let sig = Signature::now("test", "test@test.com").unwrap();
        let mut index = repo.index().unwrap();
        let tree_oid = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_oid).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();

        drop(tree);
        drop(repo);
        let gm = GitManager::open(tmp.path()).unwrap();
        (tmp, gm)
    }

    #[test]
    fn commit_artifact_stages_only_the_artifact() {
        let (tmp, gm) = setup_temp_repo();
        fs::create_dir_all(tmp.path().join("generated")).unwrap();
        let artifact = tmp.path().join("generated/fsm_gen_20250101_120000.dart");
        fs::write(&artifact, "class A {}").unwrap();
        fs::write(tmp.path().join("unrelated.txt"), "leave me").unwrap();

        let hash = gm.commit_artifact(&artifact).unwrap();
        assert_eq!(hash.len(), 7);

        let repo = Repository::open(tmp.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(
            head.message().unwrap(),
            "sprintforge: generated fsm_gen_20250101_120000.dart"
        );
        let tree = head.tree().unwrap();
        assert!(
            tree.get_path(Path::new("generated/fsm_gen_20250101_120000.dart"))
                .is_ok()
        );
        assert!(tree.get_path(Path::new("unrelated.txt")).is_err());
    }

    #[test]
    fn commit_works_without_initial_commit() {
        let tmp = TempDir::new().unwrap();
        Repository::init(tmp.path()).unwrap();
        let artifact = tmp.path().join("out.dart");
        fs::write(&artifact, "x").unwrap();

        let gm = GitManager::open(tmp.path()).unwrap();
        let hash = gm.commit_artifact(&artifact).unwrap();
        assert_eq!(hash.len(), 7);
    }

    #[test]
    fn artifact_outside_repo_is_rejected() {
        let (_tmp, gm) = setup_temp_repo();
        let outside = TempDir::new().unwrap();
        let artifact = outside.path().join("stray.dart");
        fs::write(&artifact, "x").unwrap();

        assert!(gm.commit_artifact(&artifact).is_err());
    }

    #[test]
    fn current_branch_after_commit() {
        let (_tmp, gm) = setup_temp_repo();
        let branch = gm.current_branch().unwrap();
        assert!(!branch.is_empty());
    }
}
