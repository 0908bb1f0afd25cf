//! Truncation selection.
//!
//! Candidates are ranked by descending fitness. Equal fitness keeps
//! population order, so selection is deterministic and re-running it on the
//! same scores yields the same survivors. Candidates that hard-failed every
//! test case are never selected.

use crate::population::{Candidate, ScoredCandidate};
use crate::{Error, Result};

/// Rank viable candidates, best first, ties by population index.
pub fn rank(scored: &[ScoredCandidate]) -> Vec<&ScoredCandidate> {
    let mut ranked: Vec<&ScoredCandidate> = scored.iter().filter(|s| s.is_viable()).collect();
    ranked.sort_by(|a, b| {
        b.fitness
            .total_cmp(&a.fitness)
            .then_with(|| a.index.cmp(&b.index))
    });
    ranked
}

/// Keep the `survivor_count` best viable candidates.
///
/// `generation` is only used for the error report.
///
/// # Errors
///
/// [`Error::NoSurvivors`] when nothing survives, either because every
/// candidate hard-failed or because `survivor_count` is zero.
pub fn select(
    scored: &[ScoredCandidate],
    survivor_count: usize,
    generation: usize,
) -> Result<Vec<Candidate>> {
    let survivors: Vec<Candidate> = rank(scored)
        .into_iter()
        .take(survivor_count)
        .map(|s| s.candidate.clone())
        .collect();

    if survivors.is_empty() {
        return Err(Error::NoSurvivors { generation });
    }
    Ok(survivors)
}

/// The single best viable candidate, if any.
pub fn best(scored: &[ScoredCandidate]) -> Option<&ScoredCandidate> {
    rank(scored).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::prompt_echo_factory;

    fn scored(entries: &[(&str, f64, usize)]) -> Vec<ScoredCandidate> {
        let factory = prompt_echo_factory();
        entries
            .iter()
            .enumerate()
            .map(|(index, (prompt, fitness, failed))| ScoredCandidate {
                candidate: Candidate::new(*prompt, &factory),
                fitness: *fitness,
                index,
                failed_cases: *failed,
                total_cases: 1,
            })
            .collect()
    }

    fn prompts(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(Candidate::prompt).collect()
    }

    #[test]
    fn test_selects_top_k_descending() {
        let list = scored(&[("a", 0.2, 0), ("b", 0.9, 0), ("c", 0.5, 0), ("d", 0.7, 0)]);
        let survivors = select(&list, 2, 0).unwrap();
        assert_eq!(prompts(&survivors), vec!["b", "d"]);
    }

    #[test]
    fn test_ties_keep_population_order() {
        let list = scored(&[("a", 0.5, 0), ("b", 0.8, 0), ("c", 0.5, 0), ("d", 0.5, 0)]);
        let survivors = select(&list, 3, 0).unwrap();
        assert_eq!(prompts(&survivors), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_returns_min_of_k_and_len() {
        let list = scored(&[("a", 0.1, 0), ("b", 0.2, 0)]);
        assert_eq!(select(&list, 5, 0).unwrap().len(), 2);
    }

    #[test]
    fn test_selection_is_idempotent() {
        let list = scored(&[("a", 0.3, 0), ("b", 0.3, 0), ("c", 0.9, 0)]);
        let first = select(&list, 2, 0).unwrap();
        let second = select(&list, 2, 0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_viable_candidates_are_skipped() {
        let list = scored(&[("a", 0.0, 1), ("b", 0.1, 0)]);
        let survivors = select(&list, 2, 0).unwrap();
        assert_eq!(prompts(&survivors), vec!["b"]);
    }

    #[test]
    fn test_no_survivors_is_fatal() {
        let list = scored(&[("a", 0.0, 1), ("b", 0.0, 1)]);
        let err = select(&list, 2, 4).unwrap_err();
        assert!(matches!(err, Error::NoSurvivors { generation: 4 }));
        assert!(err.is_fatal());

        assert!(select(&[], 3, 0).is_err());
        let list = scored(&[("a", 1.0, 0)]);
        assert!(select(&list, 0, 0).is_err());
    }

    #[test]
    fn test_best() {
        let list = scored(&[("a", 0.4, 0), ("b", 0.9, 1), ("c", 0.6, 0), ("d", 0.6, 0)]);
        assert_eq!(best(&list).map(|s| s.prompt()), Some("c"));
        assert!(best(&[]).is_none());
    }
}
