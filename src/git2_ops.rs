//! git2 wrapper for the read-only repository queries the branch tree needs.
//!
//! Every query is timed into [`crate::stats`] so `--stats` can report where an
//! invocation spent its time.

use std::{collections::BTreeMap, path::Path, time::Instant};

use git2::{BranchType, ErrorCode, Oid, Repository};

use crate::{
    error::RepositoryError,
    stats::record_query,
    tree::{Branch, CommitGraph},
};

pub struct GitRepo {
    repo: Repository,
}

impl GitRepo {
    /// Open the repository containing `path`, searching parent directories
    /// the way the git CLI does.
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let start = Instant::now();
        let repo = Repository::discover(path).map_err(|source| {
            if source.code() == ErrorCode::NotFound {
                RepositoryError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                RepositoryError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        record_query("open", start.elapsed());
        tracing::debug!(path = %repo.path().display(), "Opened repository");
        Ok(Self { repo })
    }

    /// All local branches, sorted by name. Remote-tracking refs, tags and a
    /// detached HEAD are not branches and never appear here.
    pub fn list_branches(&self) -> Result<Vec<Branch>, RepositoryError> {
        let start = Instant::now();
        let refs = self
            .repo
            .branches(Some(BranchType::Local))
            .map_err(|source| RepositoryError::Refs { source })?;

        let mut branches = Vec::new();
        for entry in refs {
            let (branch, _) = entry.map_err(|source| RepositoryError::Refs { source })?;
            let name = match branch.name() {
                Ok(Some(name)) => name.to_string(),
                _ => {
                    tracing::warn!(
                        reference = %String::from_utf8_lossy(branch.get().name_bytes()),
                        "Skipping branch whose name is not valid UTF-8"
                    );
                    continue;
                }
            };
            let tip = match branch.get().peel_to_commit() {
                Ok(commit) => Some(commit.id()),
                Err(error) => {
                    tracing::debug!(branch = %name, %error, "Branch tip is not a readable commit");
                    None
                }
            };
            branches.push(Branch { name, tip });
        }
        branches.sort_by(|a, b| a.name.cmp(&b.name));

        record_query("list-branches", start.elapsed());
        Ok(branches)
    }

    /// Name of the checked-out branch. `None` for a detached or unborn HEAD.
    pub fn current_branch(&self) -> Option<String> {
        let start = Instant::now();
        let head = self.repo.head().ok();
        let name = head
            .as_ref()
            .filter(|head| head.is_branch())
            .and_then(|head| head.shorthand())
            .map(str::to_string);
        record_query("current-branch", start.elapsed());
        name
    }

    /// Upstreams of `branches` that are themselves local branches. Branches
    /// tracking a remote, or tracking nothing, are left out.
    pub fn local_upstreams(&self, branches: &[Branch]) -> BTreeMap<String, String> {
        let start = Instant::now();
        let mut upstreams = BTreeMap::new();
        for branch in branches {
            let Ok(local) = self.repo.find_branch(&branch.name, BranchType::Local) else {
                continue;
            };
            let Ok(upstream) = local.upstream() else {
                continue;
            };
            if !upstream.get().is_branch() {
                tracing::debug!(
                    branch = %branch.name,
                    upstream = ?upstream.get().shorthand(),
                    "Upstream is remote-tracking; treating branch as a root"
                );
                continue;
            }
            if let Ok(Some(name)) = upstream.name() {
                upstreams.insert(branch.name.clone(), name.to_string());
            }
        }
        record_query("upstreams", start.elapsed());
        upstreams
    }
}

impl CommitGraph for GitRepo {
    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool, git2::Error> {
        if ancestor == descendant {
            return Ok(true);
        }
        let start = Instant::now();
        let result = self.repo.graph_descendant_of(descendant, ancestor);
        record_query("is-ancestor", start.elapsed());
        result
    }

    fn distance(&self, ancestor: Oid, descendant: Oid) -> Result<usize, git2::Error> {
        let start = Instant::now();
        let result = self.repo.graph_ahead_behind(descendant, ancestor);
        record_query("ahead-behind", start.elapsed());
        let (ahead, _behind) = result?;
        Ok(ahead)
    }

    fn verify_history(&self, tip: Oid) -> Result<(), git2::Error> {
        let start = Instant::now();
        let result = self.walk_history(tip);
        record_query("verify-history", start.elapsed());
        result
    }
}

impl GitRepo {
    fn walk_history(&self, tip: Oid) -> Result<(), git2::Error> {
        let mut walk = self.repo.revwalk()?;
        walk.push(tip)?;
        for commit in walk {
            commit?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use git2::{Commit, Signature};
    use tempfile::TempDir;

    use super::*;
    use crate::tree::build_forest;

    /// A scratch repository built directly through git2.
    struct TestRepo {
        dir: TempDir,
        repo: Repository,
    }

    impl TestRepo {
        fn new() -> Self {
            let dir = TempDir::new().expect("failed to create temp dir");
            let repo = Repository::init(dir.path()).expect("failed to init repo");
            Self { dir, repo }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn git(&self) -> GitRepo {
            GitRepo::open(self.path()).expect("failed to open test repo")
        }

        /// Create a commit with an empty tree and the given parents.
        fn commit(&self, parents: &[Oid], message: &str) -> Oid {
            let signature = Signature::now("Test User", "test@example.com").unwrap();
            let tree_id = self.repo.treebuilder(None).unwrap().write().unwrap();
            let tree = self.repo.find_tree(tree_id).unwrap();
            let parents: Vec<Commit> = parents
                .iter()
                .map(|id| self.repo.find_commit(*id).unwrap())
                .collect();
            let parents: Vec<&Commit> = parents.iter().collect();
            self.repo
                .commit(None, &signature, &signature, message, &tree, &parents)
                .unwrap()
        }

        fn branch(&self, name: &str, target: Oid) {
            let commit = self.repo.find_commit(target).unwrap();
            self.repo.branch(name, &commit, false).unwrap();
        }

        fn checkout(&self, name: &str) {
            self.repo.set_head(&format!("refs/heads/{name}")).unwrap();
        }

        /// Point a branch at an object that does not exist.
        fn dangling_branch(&self, name: &str) {
            let ref_path = self.repo.path().join("refs/heads").join(name);
            std::fs::write(ref_path, "0123456789abcdef0123456789abcdef01234567\n").unwrap();
        }

        fn set_upstream(&self, name: &str, upstream: &str) {
            let mut branch = self.repo.find_branch(name, BranchType::Local).unwrap();
            branch.set_upstream(Some(upstream)).unwrap();
        }

        /// Delete the loose object file backing `id`.
        fn delete_object(&self, id: Oid) {
            let hex = id.to_string();
            let path = self.repo.path().join("objects").join(&hex[..2]).join(&hex[2..]);
            std::fs::remove_file(path).unwrap();
        }

        /// Build the branch layout shown in the README.
        fn readme_layout(&self) {
            let master = self.commit(&[], "initial");
            let test_branch = self.commit(&[master], "test branch");
            let fun_branch = self.commit(&[test_branch], "fun");
            let test_two = self.commit(&[test_branch], "two");
            let test_zoo = self.commit(&[master], "zoo");
            let orphan = self.commit(&[], "unrelated history");
            self.branch("master", master);
            self.branch("test_branch", test_branch);
            self.branch("fun_branch", fun_branch);
            self.branch("test_two", test_two);
            self.branch("test_zoo", test_zoo);
            self.branch("branch_no_upstream", orphan);
        }
    }

    #[test]
    fn test_open_missing_repository() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");
        match GitRepo::open(&missing) {
            Err(RepositoryError::NotFound { path }) => assert_eq!(path, missing),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened a repository that does not exist"),
        }
    }

    #[test]
    fn test_open_from_subdirectory() {
        let test_repo = TestRepo::new();
        let nested = test_repo.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        assert!(GitRepo::open(&nested).is_ok());
    }

    #[test]
    fn test_empty_repository_has_no_branches() {
        let test_repo = TestRepo::new();
        let git = test_repo.git();
        assert!(git.list_branches().unwrap().is_empty());
        assert_eq!(git.current_branch(), None);
    }

    #[test]
    fn test_list_branches_sorted_and_local_only() {
        let test_repo = TestRepo::new();
        let root = test_repo.commit(&[], "initial");
        test_repo.branch("zoo", root);
        test_repo.branch("alpha", root);
        test_repo
            .repo
            .reference("refs/remotes/origin/alpha", root, true, "test")
            .unwrap();
        let object = test_repo.repo.find_object(root, None).unwrap();
        test_repo.repo.tag_lightweight("v1", &object, false).unwrap();

        let names: Vec<String> = test_repo
            .git()
            .list_branches()
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, ["alpha", "zoo"]);
    }

    #[test]
    fn test_detached_head_has_no_current_branch() {
        let test_repo = TestRepo::new();
        let root = test_repo.commit(&[], "initial");
        test_repo.branch("main", root);
        test_repo.checkout("main");
        assert_eq!(test_repo.git().current_branch().as_deref(), Some("main"));

        test_repo.repo.set_head_detached(root).unwrap();
        assert_eq!(test_repo.git().current_branch(), None);
    }

    #[test]
    fn test_dangling_branch_has_no_tip() {
        let test_repo = TestRepo::new();
        let root = test_repo.commit(&[], "initial");
        test_repo.branch("main", root);
        test_repo.dangling_branch("broken");

        let branches = test_repo.git().list_branches().unwrap();
        assert_eq!(
            branches,
            [Branch::without_tip("broken"), Branch::new("main", root)]
        );
    }

    #[test]
    fn test_is_ancestor_and_distance() {
        let test_repo = TestRepo::new();
        let root = test_repo.commit(&[], "initial");
        let middle = test_repo.commit(&[root], "middle");
        let tip = test_repo.commit(&[middle], "tip");
        let git = test_repo.git();

        assert!(git.is_ancestor(root, tip).unwrap());
        assert!(git.is_ancestor(tip, tip).unwrap());
        assert!(!git.is_ancestor(tip, root).unwrap());
        assert_eq!(git.distance(root, tip).unwrap(), 2);
        assert_eq!(git.distance(tip, tip).unwrap(), 0);
    }

    #[test]
    fn test_missing_parent_object_fails_only_its_branch() {
        let test_repo = TestRepo::new();
        let main = test_repo.commit(&[], "initial");
        let feature = test_repo.commit(&[main], "feature");
        let lost = test_repo.commit(&[main], "lost");
        let damaged = test_repo.commit(&[lost], "damaged");
        test_repo.branch("main", main);
        test_repo.branch("feature", feature);
        test_repo.branch("damaged", damaged);
        test_repo.delete_object(lost);

        let git = test_repo.git();
        assert!(git.verify_history(feature).is_ok());
        assert!(git.verify_history(damaged).is_err());

        let branches = git.list_branches().unwrap();
        let forest = build_forest(&git, &branches);
        let roots: Vec<&str> = forest.roots().map(|n| n.branch.name.as_str()).collect();
        assert_eq!(roots, ["damaged", "main"]);
        assert_eq!(forest.ancestors("feature"), ["main"]);
        assert_eq!(forest.failures().count(), 1);
        assert!(forest.node("damaged").unwrap().error.is_some());
    }

    #[test]
    fn test_readme_forest_from_real_repository() {
        let test_repo = TestRepo::new();
        test_repo.readme_layout();
        let git = test_repo.git();
        let branches = git.list_branches().unwrap();
        let forest = build_forest(&git, &branches);

        let roots: Vec<&str> = forest.roots().map(|n| n.branch.name.as_str()).collect();
        assert_eq!(roots, ["branch_no_upstream", "master"]);
        assert_eq!(forest.ancestors("fun_branch"), ["test_branch", "master"]);
        assert_eq!(forest.ancestors("test_zoo"), ["master"]);
    }

    #[test]
    fn test_local_upstreams_skip_remote_tracking() {
        let test_repo = TestRepo::new();
        let root = test_repo.commit(&[], "initial");
        let feature = test_repo.commit(&[root], "feature");
        test_repo.branch("main", root);
        test_repo.branch("feature", feature);
        test_repo
            .repo
            .remote("origin", "https://example.com/repo.git")
            .unwrap();
        test_repo
            .repo
            .reference("refs/remotes/origin/main", root, true, "test")
            .unwrap();
        test_repo.set_upstream("main", "origin/main");
        test_repo.set_upstream("feature", "main");

        let git = test_repo.git();
        let branches = git.list_branches().unwrap();
        let upstreams = git.local_upstreams(&branches);
        assert_eq!(upstreams.len(), 1);
        assert_eq!(upstreams.get("feature").map(String::as_str), Some("main"));
    }
}
