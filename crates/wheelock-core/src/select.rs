//! Deterministic best-file choice for one resolved package version.

use crate::oracle::{Environment, EnvironmentOracle, Specificity};
use crate::CoreError;
use std::cmp::Ordering;
use wheelock_schema::PackageFile;

struct Ranked<'a> {
    file: &'a PackageFile,
    specificity: Specificity,
    algorithm: &'a str,
    digest: &'a str,
}

impl Ranked<'_> {
    /// Better candidates sort first: higher specificity, then smaller digest.
    fn order(&self, other: &Self) -> Ordering {
        other
            .specificity
            .cmp(&self.specificity)
            .then_with(|| self.digest.cmp(other.digest))
            .then_with(|| self.algorithm.cmp(other.algorithm))
    }
}

/// Pick the best file of `files` for `env`.
///
/// Candidates are files whose tags the oracle accepts, whose
/// `requires-python` holds and that record a digest we can check. They are
/// ordered by oracle specificity (higher wins), then by primary digest
/// (lexicographically smaller wins). Input
/// order never matters. Two top candidates sharing rank and primary digest
/// are a data-integrity anomaly and fail with `DuplicateDigest`.
///
/// Returns `None` when no file is a candidate.
pub fn select<'a>(
    files: &'a [PackageFile],
    env: &Environment,
    oracle: &dyn EnvironmentOracle,
) -> Result<Option<&'a PackageFile>, CoreError> {
    let mut ranked: Vec<Ranked<'a>> = files
        .iter()
        .filter_map(|file| {
            let specificity = oracle.tag_compatible(&file.tag_set()?, env)?;
            if let Some(ref rp) = file.requires_python {
                if !oracle.python_satisfies(rp, env) {
                    return None;
                }
            }
            let (algorithm, digest) = file.primary_digest()?;
            Some(Ranked {
                file,
                specificity,
                algorithm,
                digest: digest.as_str(),
            })
        })
        .collect();
    ranked.sort_by(Ranked::order);

    match ranked.as_slice() {
        [] => Ok(None),
        [best, second, ..] if best.order(second) == Ordering::Equal => {
            Err(CoreError::DuplicateDigest {
                first: best.file.filename().to_owned(),
                second: second.file.filename().to_owned(),
                digest: format!("{}:{}", best.algorithm, best.digest),
            })
        }
        [best, ..] => {
            tracing::trace!(
                "selected {} (specificity {}, {}:{})",
                best.file.filename(),
                best.specificity.0,
                best.algorithm,
                best.digest
            );
            Ok(Some(best.file))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::tests::linux_env;
    use crate::oracle::ProfileOracle;
    use wheelock_schema::{FileLocation, HexDigest, PythonConstraint};

    fn wheel(name: &str, sha256: &str) -> PackageFile {
        let mut file = PackageFile::new(FileLocation::Path(name.to_owned()));
        file.hashes
            .insert("sha256".to_owned(), HexDigest::new(sha256));
        file
    }

    #[test]
    fn more_specific_tag_wins_over_digest() {
        let files = vec![
            wheel("a-1-py3-none-any.whl", "0000"),
            wheel("a-1-cp312-cp312-manylinux_2_17_x86_64.whl", "ffff"),
        ];
        let chosen = select(&files, &linux_env(), &ProfileOracle).unwrap().unwrap();
        assert_eq!(chosen.filename(), "a-1-cp312-cp312-manylinux_2_17_x86_64.whl");
    }

    #[test]
    fn equal_rank_breaks_tie_on_smaller_digest() {
        let files = vec![
            wheel("a-1-py3-none-any.whl", "bbbb"),
            wheel("a-1-1build-py3-none-any.whl", "aaaa"),
        ];
        let chosen = select(&files, &linux_env(), &ProfileOracle).unwrap().unwrap();
        assert_eq!(chosen.hashes["sha256"], "aaaa");
    }

    #[test]
    fn independent_of_input_order() {
        let mut files = vec![
            wheel("a-1-py3-none-any.whl", "cccc"),
            wheel("a-1-1-py3-none-any.whl", "aaaa"),
            wheel("a-1-2-py3-none-any.whl", "bbbb"),
            wheel("a-1-cp312-cp312-win_amd64.whl", "0000"),
        ];
        let env = linux_env();
        let first = select(&files, &env, &ProfileOracle).unwrap().unwrap().clone();
        files.reverse();
        let second = select(&files, &env, &ProfileOracle).unwrap().unwrap().clone();
        files.swap(0, 2);
        let third = select(&files, &env, &ProfileOracle).unwrap().unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(first.hashes["sha256"], "aaaa");
    }

    #[test]
    fn nothing_compatible_is_none() {
        let mut py27 = wheel("a-1-py3-none-any.whl", "01");
        py27.requires_python = Some(PythonConstraint::new("<3"));
        let files = vec![
            wheel("a-1-cp312-cp312-win_amd64.whl", "00"),
            wheel("a-1.tar.gz", "02"),
            py27,
        ];
        assert!(select(&files, &linux_env(), &ProfileOracle)
            .unwrap()
            .is_none());
        assert!(select(&[], &linux_env(), &ProfileOracle).unwrap().is_none());
    }

    #[test]
    fn unverifiable_file_never_beats_a_verifiable_one() {
        let mut md5_only = PackageFile::new(FileLocation::Path("a-1-1-py3-none-any.whl".to_owned()));
        md5_only
            .hashes
            .insert("md5".to_owned(), HexDigest::new("0000"));
        let files = vec![md5_only.clone(), wheel("a-1-py3-none-any.whl", "ffff")];
        let chosen = select(&files, &linux_env(), &ProfileOracle).unwrap().unwrap();
        assert_eq!(chosen.filename(), "a-1-py3-none-any.whl");

        assert!(select(&[md5_only], &linux_env(), &ProfileOracle)
            .unwrap()
            .is_none());
    }

    #[test]
    fn identical_primary_digest_at_equal_rank_is_an_anomaly() {
        let files = vec![
            wheel("a-1-py3-none-any.whl", "abab"),
            wheel("a-1-1-py3-none-any.whl", "abab"),
        ];
        let err = select(&files, &linux_env(), &ProfileOracle).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateDigest { .. }));
    }

    #[test]
    fn duplicate_digest_below_the_winner_is_ignored() {
        let files = vec![
            wheel("a-1-cp312-cp312-manylinux_2_17_x86_64.whl", "ffff"),
            wheel("a-1-py3-none-any.whl", "abab"),
            wheel("a-1-1-py3-none-any.whl", "abab"),
        ];
        let chosen = select(&files, &linux_env(), &ProfileOracle).unwrap().unwrap();
        assert_eq!(chosen.hashes["sha256"], "ffff");
    }
}
