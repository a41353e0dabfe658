//! Question selection policy.
//!
//! Adaptive mode picks one question per call, widening its search in three
//! steps before reporting exhaustion:
//!
//! 1. same subject and type, exact target difficulty
//! 2. same subject and type, within ±1 of the target
//! 3. same subject, any type and difficulty
//!
//! Candidates are ranked by distance to the target. Trap questions move to
//! the front of their distance tier when requested, and the final pick is a
//! uniform draw from the closest few so sessions are not predictable.
//!
//! Batch mode pre-draws a whole session against a single seed difficulty.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{Question, QuestionType, Subject, SubjectQuota};
use crate::traits::QuestionRepository;

/// Maximum number of equally-close candidates drawn from.
pub const TIE_GROUP_CAP: usize = 3;

/// Which widening step produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionTier {
    Exact,
    Adjacent,
    AnyInSubject,
}

/// Inputs for one adaptive selection.
#[derive(Debug, Clone)]
pub struct SelectionRequest<'a> {
    pub target: u8,
    pub subject: Subject,
    pub question_type: QuestionType,
    pub prefer_trap: bool,
    /// Ids already served in this session.
    pub excluded: &'a HashSet<String>,
}

/// A selected question and the step that found it.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'r> {
    pub question: &'r Question,
    pub tier: SelectionTier,
}

/// Adaptive selector with an injectable random source.
#[derive(Debug, Clone)]
pub struct QuestionSelector<R = StdRng> {
    rng: R,
}

impl QuestionSelector<StdRng> {
    /// Selector seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible selector.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> QuestionSelector<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Select the next question, or report exhaustion for the slot.
    pub fn select<'r>(
        &mut self,
        repository: &'r dyn QuestionRepository,
        request: &SelectionRequest<'_>,
    ) -> Result<Selection<'r>, EngineError> {
        let available = |q: &&Question| !request.excluded.contains(&q.id);
        let slot: Vec<&Question> = repository
            .questions_for(request.subject, request.question_type)
            .into_iter()
            .filter(available)
            .collect();

        let ladder = [(SelectionTier::Exact, 0u8), (SelectionTier::Adjacent, 1u8)];
        for (tier, band) in ladder {
            let candidates: Vec<&Question> = slot
                .iter()
                .copied()
                .filter(|q| q.distance_to(request.target) <= band)
                .collect();
            if let Some(question) = self.pick(candidates, request) {
                return Ok(Selection { question, tier });
            }
        }

        let widened: Vec<&Question> = repository
            .questions_in_subject(request.subject)
            .into_iter()
            .filter(available)
            .collect();
        if let Some(question) = self.pick(widened, request) {
            tracing::debug!(
                subject = %request.subject,
                target = request.target,
                picked = question.difficulty,
                "selection widened to any difficulty"
            );
            return Ok(Selection {
                question,
                tier: SelectionTier::AnyInSubject,
            });
        }

        Err(EngineError::NoQuestionAvailable {
            subject: request.subject,
            question_type: request.question_type,
        })
    }

    fn pick<'r>(
        &mut self,
        candidates: Vec<&'r Question>,
        request: &SelectionRequest<'_>,
    ) -> Option<&'r Question> {
        let group = closest_group(candidates, request.target, request.prefer_trap);
        if group.is_empty() {
            return None;
        }
        let index = self.rng.random_range(0..group.len());
        Some(group[index])
    }
}

fn rank_key(question: &Question, target: u8, prefer_trap: bool) -> (u8, bool) {
    (question.distance_to(target), prefer_trap && !question.trap)
}

/// Rank candidates by distance to `target`, traps first within a tier when
/// `prefer_trap` is set. The sort is stable, so pool order breaks ties.
pub fn rank_candidates<'r>(
    mut candidates: Vec<&'r Question>,
    target: u8,
    prefer_trap: bool,
) -> Vec<&'r Question> {
    candidates.sort_by_key(|q| rank_key(q, target, prefer_trap));
    candidates
}

/// The closest distance tier, capped at [`TIE_GROUP_CAP`] entries.
///
/// With `prefer_trap`, traps lead the tier, so they survive the cap ahead
/// of equally close non-trap questions.
pub fn closest_group<'r>(
    candidates: Vec<&'r Question>,
    target: u8,
    prefer_trap: bool,
) -> Vec<&'r Question> {
    let ranked = rank_candidates(candidates, target, prefer_trap);
    let Some(best) = ranked.first().map(|q| q.distance_to(target)) else {
        return Vec::new();
    };
    ranked
        .into_iter()
        .take_while(|q| q.distance_to(target) == best)
        .take(TIE_GROUP_CAP)
        .collect()
}

/// Pre-draw a whole session.
///
/// Each quota slot takes the questions closest to `seed_difficulty`.
/// Passage-grouped questions are drawn as one contiguous block in pool
/// order, and a block that does not fit the remaining quota is skipped
/// rather than split.
pub fn draw_batch<'r>(
    repository: &'r dyn QuestionRepository,
    quotas: &[SubjectQuota],
    seed_difficulty: u8,
) -> Vec<&'r Question> {
    let mut drawn: Vec<&Question> = Vec::new();
    let mut taken: HashSet<&str> = HashSet::new();

    for quota in quotas {
        for question_type in QuestionType::ALL {
            let wanted = quota.count_for(question_type) as usize;
            if wanted == 0 {
                continue;
            }
            let slot = repository.questions_for(quota.subject, question_type);
            let mut sorted = slot.clone();
            sorted.sort_by_key(|q| q.distance_to(seed_difficulty));

            let mut remaining = wanted;
            let mut visited_groups: HashSet<&str> = HashSet::new();
            for question in sorted {
                if remaining == 0 {
                    break;
                }
                if taken.contains(question.id.as_str()) {
                    continue;
                }
                match question.passage_group.as_deref() {
                    None => {
                        taken.insert(question.id.as_str());
                        drawn.push(question);
                        remaining -= 1;
                    }
                    Some(group) => {
                        if !visited_groups.insert(group) {
                            continue;
                        }
                        let block: Vec<&Question> = slot
                            .iter()
                            .copied()
                            .filter(|q| q.passage_group.as_deref() == Some(group))
                            .filter(|q| !taken.contains(q.id.as_str()))
                            .collect();
                        if block.len() > remaining {
                            tracing::debug!(
                                group,
                                size = block.len(),
                                remaining,
                                "passage block does not fit quota, skipping"
                            );
                            continue;
                        }
                        for member in block {
                            taken.insert(member.id.as_str());
                            drawn.push(member);
                            remaining -= 1;
                        }
                    }
                }
            }
            if remaining > 0 {
                tracing::warn!(
                    subject = %quota.subject,
                    question_type = %question_type,
                    missing = remaining,
                    "batch draw could not fill quota"
                );
            }
        }
    }

    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionPool;

    fn question(
        id: &str,
        subject: Subject,
        question_type: QuestionType,
        difficulty: u8,
    ) -> Question {
        Question {
            id: id.into(),
            subject,
            question_type,
            difficulty,
            prompt: "p".into(),
            options: vec![String::new(); question_type.option_count()],
            correct: vec![0],
            topic: String::new(),
            explanation: String::new(),
            trap: false,
            passage_group: None,
        }
    }

    fn trap(mut q: Question) -> Question {
        q.trap = true;
        q
    }

    fn grouped(mut q: Question, group: &str) -> Question {
        q.passage_group = Some(group.into());
        q
    }

    fn request(target: u8, excluded: &HashSet<String>) -> SelectionRequest<'_> {
        SelectionRequest {
            target,
            subject: Subject::Logic,
            question_type: QuestionType::Single,
            prefer_trap: false,
            excluded,
        }
    }

    #[test]
    fn exact_difficulty_first() {
        let pool = QuestionPool::new(
            "p",
            "P",
            vec![
                question("a", Subject::Logic, QuestionType::Single, 4),
                question("b", Subject::Logic, QuestionType::Single, 5),
                question("c", Subject::Logic, QuestionType::Single, 6),
            ],
        );
        let excluded = HashSet::new();
        let mut selector = QuestionSelector::seeded(7);
        let selection = selector.select(&pool, &request(5, &excluded)).unwrap();
        assert_eq!(selection.question.id, "b");
        assert_eq!(selection.tier, SelectionTier::Exact);
    }

    #[test]
    fn widens_to_adjacent_then_any_type() {
        let pool = QuestionPool::new(
            "p",
            "P",
            vec![
                question("a", Subject::Logic, QuestionType::Single, 4),
                question("m", Subject::Logic, QuestionType::Multiple, 9),
            ],
        );
        let mut excluded = HashSet::new();
        let mut selector = QuestionSelector::seeded(1);

        let selection = selector.select(&pool, &request(5, &excluded)).unwrap();
        assert_eq!(selection.question.id, "a");
        assert_eq!(selection.tier, SelectionTier::Adjacent);

        excluded.insert("a".to_string());
        let selection = selector.select(&pool, &request(5, &excluded)).unwrap();
        assert_eq!(selection.question.id, "m");
        assert_eq!(selection.tier, SelectionTier::AnyInSubject);

        excluded.insert("m".to_string());
        let err = selector.select(&pool, &request(5, &excluded)).unwrap_err();
        assert_eq!(
            err,
            EngineError::NoQuestionAvailable {
                subject: Subject::Logic,
                question_type: QuestionType::Single
            }
        );
    }

    #[test]
    fn never_crosses_subjects() {
        let pool = QuestionPool::new(
            "p",
            "P",
            vec![question("r", Subject::Reading, QuestionType::Single, 5)],
        );
        let excluded = HashSet::new();
        let mut selector = QuestionSelector::seeded(1);
        assert!(selector.select(&pool, &request(5, &excluded)).is_err());
    }

    #[test]
    fn traps_lead_their_distance_tier() {
        let a = question("a", Subject::Logic, QuestionType::Single, 5);
        let b = trap(question("b", Subject::Logic, QuestionType::Single, 5));
        let c = trap(question("c", Subject::Logic, QuestionType::Single, 6));
        let ranked = rank_candidates(vec![&a, &c, &b], 5, true);
        let ids: Vec<&str> = ranked.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        let ranked = rank_candidates(vec![&a, &c, &b], 5, false);
        let ids: Vec<&str> = ranked.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn preferred_traps_share_the_closest_tier() {
        let a = question("a", Subject::Logic, QuestionType::Single, 5);
        let b = question("b", Subject::Logic, QuestionType::Single, 5);
        let t = trap(question("t", Subject::Logic, QuestionType::Single, 5));
        let far = trap(question("far", Subject::Logic, QuestionType::Single, 4));
        let group = closest_group(vec![&a, &b, &t, &far], 5, true);
        let ids: Vec<&str> = group.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["t", "a", "b"]);

        let group = closest_group(vec![&a, &far], 5, true);
        let ids: Vec<&str> = group.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn preferred_traps_survive_the_cap() {
        let qs: Vec<Question> = (0..4)
            .map(|i| question(&format!("q{i}"), Subject::Logic, QuestionType::Single, 5))
            .chain([trap(question("t", Subject::Logic, QuestionType::Single, 5))])
            .collect();
        let preferred = closest_group(qs.iter().collect(), 5, true);
        let ids: Vec<&str> = preferred.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["t", "q0", "q1"]);

        let plain = closest_group(qs.iter().collect(), 5, false);
        assert!(plain.iter().all(|q| !q.trap));
    }

    #[test]
    fn tie_group_is_capped() {
        let qs: Vec<Question> = (0..6)
            .map(|i| question(&format!("q{i}"), Subject::Logic, QuestionType::Single, 5))
            .collect();
        let group = closest_group(qs.iter().collect(), 5, false);
        assert_eq!(group.len(), TIE_GROUP_CAP);
        assert_eq!(group[0].id, "q0");
    }

    #[test]
    fn same_seed_same_choices() {
        let qs: Vec<Question> = (0..3)
            .map(|i| question(&format!("q{i}"), Subject::Logic, QuestionType::Single, 5))
            .collect();
        let pool = QuestionPool::new("p", "P", qs);
        let excluded = HashSet::new();
        let picks = |seed| {
            let mut selector = QuestionSelector::seeded(seed);
            (0..10)
                .map(|_| {
                    selector
                        .select(&pool, &request(5, &excluded))
                        .unwrap()
                        .question
                        .id
                        .clone()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(picks(42), picks(42));
    }

    #[test]
    fn batch_takes_closest_per_slot() {
        let pool = QuestionPool::new(
            "p",
            "P",
            vec![
                question("far", Subject::Logic, QuestionType::Single, 10),
                question("near", Subject::Logic, QuestionType::Single, 5),
                question("mid", Subject::Logic, QuestionType::Single, 7),
                question("multi", Subject::Logic, QuestionType::Multiple, 5),
            ],
        );
        let drawn = draw_batch(&pool, &[SubjectQuota::new(Subject::Logic, 2, 1)], 5);
        let ids: Vec<&str> = drawn.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "multi"]);
    }

    #[test]
    fn batch_keeps_passage_blocks_contiguous() {
        let pool = QuestionPool::new(
            "p",
            "P",
            vec![
                grouped(question("p1", Subject::Reading, QuestionType::Single, 9), "g"),
                question("solo", Subject::Reading, QuestionType::Single, 5),
                grouped(question("p2", Subject::Reading, QuestionType::Single, 5), "g"),
                grouped(question("p3", Subject::Reading, QuestionType::Single, 2), "g"),
                question("other", Subject::Reading, QuestionType::Single, 6),
            ],
        );
        let drawn = draw_batch(&pool, &[SubjectQuota::new(Subject::Reading, 4, 0)], 5);
        let ids: Vec<&str> = drawn.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["solo", "p1", "p2", "p3"]);
    }

    #[test]
    fn batch_skips_blocks_that_do_not_fit() {
        let pool = QuestionPool::new(
            "p",
            "P",
            vec![
                grouped(question("p1", Subject::Reading, QuestionType::Single, 5), "g"),
                grouped(question("p2", Subject::Reading, QuestionType::Single, 5), "g"),
                question("solo", Subject::Reading, QuestionType::Single, 8),
            ],
        );
        let drawn = draw_batch(&pool, &[SubjectQuota::new(Subject::Reading, 1, 0)], 5);
        let ids: Vec<&str> = drawn.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["solo"]);
    }
}
